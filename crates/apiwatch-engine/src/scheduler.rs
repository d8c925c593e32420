//! Cron-driven passes.
//!
//! Each [`CronJob`] owns a 6-field cron schedule evaluated in the reporting
//! timezone. A job runs its pass inline, so a slow pass delays the next
//! fire of the same job instead of overlapping it.

use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

use apiwatch_config::Config;
use chrono::{DateTime, FixedOffset, Utc};
use cron::Schedule;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info};

use crate::error::EngineError;
use crate::service::{MonitorService, SweepReport};

/// The passes the scheduler knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    Sweep,
    DailyReport,
    TokenBalance,
}

impl Job {
    pub fn name(&self) -> &'static str {
        match self {
            Job::Sweep => "sweep",
            Job::DailyReport => "daily_report",
            Job::TokenBalance => "token_balance",
        }
    }

    /// Run the pass once.
    pub async fn execute(&self, service: &MonitorService) -> Result<SweepReport, EngineError> {
        match self {
            Job::Sweep => service.evaluate_all().await,
            Job::DailyReport => service.send_daily_report().await,
            Job::TokenBalance => service.check_token_balances().await,
        }
    }
}

/// A named cron schedule.
#[derive(Debug, Clone)]
pub struct CronJob {
    name: String,
    expr: String,
    schedule: Schedule,
    timezone: FixedOffset,
}

impl CronJob {
    /// Parse `expr` (`second minute hour day_of_month month day_of_week`).
    pub fn new(name: impl Into<String>, expr: &str, timezone: FixedOffset) -> Result<Self, EngineError> {
        let name = name.into();
        let schedule = Schedule::from_str(expr)
            .map_err(|e| EngineError::Scheduler(format!("invalid cron for {}: '{}': {}", name, expr, e)))?;
        Ok(Self {
            name,
            expr: expr.to_string(),
            schedule,
            timezone,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn expr(&self) -> &str {
        &self.expr
    }

    /// First fire strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule
            .after(&after.with_timezone(&self.timezone))
            .next()
            .map(|next| next.with_timezone(&Utc))
    }

    /// Run `task` at every fire until `token` is cancelled.
    pub fn spawn<F, Fut>(self, token: CancellationToken, task: F) -> JoinHandle<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let span = tracing::info_span!("cron_job", job = %self.name);
        tokio::spawn(
            async move {
                let mut last_fire: Option<DateTime<Utc>> = None;
                loop {
                    // Never fire the same boundary twice, even if the pass
                    // finished before the wall clock moved past it.
                    let from = match last_fire {
                        Some(last) => last.max(Utc::now()),
                        None => Utc::now(),
                    };
                    let Some(next) = self.next_after(from) else {
                        info!(expr = %self.expr, "No upcoming fire, stopping");
                        return;
                    };
                    let delay = (next - Utc::now()).to_std().unwrap_or_default();
                    debug!(next = %next.to_rfc3339(), "Scheduled");

                    tokio::select! {
                        _ = token.cancelled() => {
                            debug!("Cancelled");
                            return;
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }

                    last_fire = Some(next);
                    task().await;
                }
            }
            .instrument(span),
        )
    }
}

/// Owns the cron jobs of a running monitor.
pub struct Scheduler {
    service: Arc<MonitorService>,
    jobs: Vec<(Job, CronJob)>,
    token: CancellationToken,
}

impl Scheduler {
    pub fn from_config(config: &Config, service: Arc<MonitorService>) -> Result<Self, EngineError> {
        let timezone = config.schedule.timezone();
        let jobs = [
            (Job::Sweep, config.schedule.sweep.as_str()),
            (Job::DailyReport, config.schedule.daily_report.as_str()),
            (Job::TokenBalance, config.schedule.token_balance.as_str()),
        ]
        .into_iter()
        .map(|(job, expr)| Ok((job, CronJob::new(job.name(), expr, timezone)?)))
        .collect::<Result<Vec<_>, EngineError>>()?;

        Ok(Self {
            service,
            jobs,
            token: CancellationToken::new(),
        })
    }

    /// Cancelling this token stops the scheduler.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn jobs(&self) -> impl Iterator<Item = &CronJob> {
        self.jobs.iter().map(|(_, cron)| cron)
    }

    /// Run every job until the shutdown token is cancelled, then wait for
    /// in-flight passes and stop the recovery watchers.
    pub async fn run(self) {
        let mut handles = Vec::with_capacity(self.jobs.len());
        for (job, cron) in self.jobs {
            info!(job = job.name(), expr = %cron.expr(), "Starting cron job");
            let service = self.service.clone();
            handles.push(cron.spawn(self.token.child_token(), move || {
                let service = service.clone();
                async move {
                    if let Err(e) = job.execute(&service).await {
                        error!(job = job.name(), "Pass failed: {}", e);
                    }
                }
            }));
        }

        self.token.cancelled().await;
        info!("Scheduler stopping");
        for handle in futures::future::join_all(handles).await {
            if let Err(e) = handle {
                error!("Cron job task failed: {}", e);
            }
        }
        self.service.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn ist() -> FixedOffset {
        FixedOffset::east_opt(330 * 60).unwrap()
    }

    #[test]
    fn test_next_fire_in_reporting_timezone() {
        let job = CronJob::new("daily_report", "0 0 9,21 * * *", ist()).unwrap();
        let after = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();

        // 09:00 IST is 03:30 UTC.
        assert_eq!(
            job.next_after(after),
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 3, 30, 0).unwrap())
        );
        let later = Utc.with_ymd_and_hms(2024, 5, 1, 3, 30, 0).unwrap();
        assert_eq!(
            job.next_after(later),
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 15, 30, 0).unwrap())
        );
    }

    #[test]
    fn test_sweep_every_five_minutes() {
        let job = CronJob::new("sweep", "0 */5 * * * *", ist()).unwrap();
        let after = Utc.with_ymd_and_hms(2024, 5, 1, 10, 2, 30).unwrap();
        assert_eq!(
            job.next_after(after),
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 10, 5, 0).unwrap())
        );
    }

    #[test]
    fn test_invalid_cron() {
        let err = CronJob::new("sweep", "every five minutes", ist()).unwrap_err();
        assert!(matches!(err, EngineError::Scheduler(_)));
        assert!(err.to_string().contains("sweep"));
    }

    #[test]
    fn test_scheduler_rejects_bad_config() {
        use crate::repository::MemoryEndpointRepository;
        use crate::watcher::RecoveryWatcherPool;
        use apiwatch_notify::RecordingNotifier;

        let mut config = Config::default();
        config.schedule.token_balance = "nope".to_string();
        let service = MonitorService::new(
            &config,
            Arc::new(MemoryEndpointRepository::new()),
            Arc::new(RecordingNotifier::new()),
            Arc::new(RecoveryWatcherPool::new(Duration::from_secs(10))),
        )
        .unwrap();

        let err = Scheduler::from_config(&config, Arc::new(service)).err().unwrap();
        assert!(err.to_string().contains("token_balance"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_fires_until_cancelled() {
        let job = CronJob::new("tick", "* * * * * *", ist()).unwrap();
        let fired = Arc::new(AtomicUsize::new(0));
        let token = CancellationToken::new();

        let counter = fired.clone();
        let handle = job.spawn(token.clone(), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(fired.load(Ordering::SeqCst) >= 2);

        token.cancel();
        handle.await.unwrap();
        let after_cancel = fired.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fired.load(Ordering::SeqCst), after_cancel);
    }
}
