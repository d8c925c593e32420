//! Evaluation passes.
//!
//! [`MonitorService`] loads endpoints, evaluates them with bounded
//! parallelism, applies the state machine, persists the result and
//! dispatches alerts. Evaluation of one endpoint never runs concurrently
//! with itself, and a recovery watcher recording a resync takes the same
//! per-endpoint lock.

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use apiwatch_config::Config;
use apiwatch_notify::{Alert, AlertKind, Notifier};
use chrono::Utc;
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::error::{EngineError, EvaluationFailure};
use crate::evaluators::{SyncCheck, Evaluate, Evaluator, EvaluatorContext};
use crate::model::{EndpointKind, MonitoredEndpoint, WatcherKey};
use crate::policy::MonitorPolicy;
use crate::repository::EndpointRepository;
use crate::state_machine::{StatusStateMachine, Transition};
use crate::watcher::{PollOutcome, RecoveryWatcherPool};

/// Counters of one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub evaluated: usize,
    pub alerts: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PassMode {
    Regular,
    DailyUsage,
}

/// Runs evaluation passes against the endpoint store.
pub struct MonitorService {
    repository: Arc<dyn EndpointRepository>,
    notifier: Arc<dyn Notifier>,
    context: Arc<EvaluatorContext>,
    policy: MonitorPolicy,
    watchers: Arc<RecoveryWatcherPool>,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
    max_concurrency: usize,
    sync_tolerance: u64,
}

impl MonitorService {
    pub fn new(
        config: &Config,
        repository: Arc<dyn EndpointRepository>,
        notifier: Arc<dyn Notifier>,
        watchers: Arc<RecoveryWatcherPool>,
    ) -> Result<Self, EngineError> {
        let context = EvaluatorContext::from_config(config)?;
        Ok(Self {
            repository,
            notifier,
            context: Arc::new(context),
            policy: MonitorPolicy::from_config(config),
            watchers,
            locks: Arc::new(DashMap::new()),
            max_concurrency: config.fetch.max_concurrency.max(1),
            sync_tolerance: config.watcher.sync_tolerance,
        })
    }

    pub fn policy(&self) -> &MonitorPolicy {
        &self.policy
    }

    pub fn watchers(&self) -> &Arc<RecoveryWatcherPool> {
        &self.watchers
    }

    /// Evaluate every endpoint except token balances, which have their own
    /// cadence.
    pub async fn evaluate_all(&self) -> Result<SweepReport, EngineError> {
        let endpoints: Vec<_> = self
            .repository
            .find_all()
            .await?
            .into_iter()
            .filter(|e| e.kind != EndpointKind::TokenBalance)
            .collect();
        let report = self.run_pass("sweep", endpoints, PassMode::Regular).await;
        self.prune_locks();
        Ok(report)
    }

    /// Evaluate every token-balance endpoint.
    pub async fn check_token_balances(&self) -> Result<SweepReport, EngineError> {
        let endpoints = self.repository.find_by_kind(EndpointKind::TokenBalance).await?;
        let report = self.run_pass("token-balance", endpoints, PassMode::Regular).await;
        self.prune_locks();
        Ok(report)
    }

    /// Heartbeat plus a usage summary for every CDN endpoint.
    pub async fn send_daily_report(&self) -> Result<SweepReport, EngineError> {
        self.notifier.notify(&Alert::monitor_active()).await;
        let endpoints = self.repository.find_by_kind(EndpointKind::Cloudflare).await?;
        let report = self.run_pass("daily-report", endpoints, PassMode::DailyUsage).await;
        self.prune_locks();
        Ok(report)
    }

    /// Evaluate a single endpoint and apply the outcome.
    pub async fn evaluate_endpoint(&self, endpoint: &MonitoredEndpoint) -> Result<Transition, EngineError> {
        self.process(endpoint, PassMode::Regular).await
    }

    /// Cancel every recovery watcher.
    pub fn shutdown(&self) {
        self.watchers.shutdown();
    }

    /// Drop per-endpoint locks nobody holds.
    ///
    /// An entry is only removed while the map shard is write-locked and no
    /// clone of its mutex exists, so a pass or watcher that already took the
    /// lock keeps it, and the next one creates a fresh mutex for the id.
    fn prune_locks(&self) {
        let before = self.locks.len();
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        let pruned = before.saturating_sub(self.locks.len());
        if pruned > 0 {
            debug!(pruned, "Pruned idle endpoint locks");
        }
    }

    async fn run_pass(&self, pass: &str, endpoints: Vec<MonitoredEndpoint>, mode: PassMode) -> SweepReport {
        let evaluated = AtomicUsize::new(0);
        let alerts = AtomicUsize::new(0);
        let failed = AtomicUsize::new(0);

        stream::iter(endpoints)
            .for_each_concurrent(self.max_concurrency, |endpoint| {
                let (evaluated, alerts, failed) = (&evaluated, &alerts, &failed);
                async move {
                    evaluated.fetch_add(1, Ordering::Relaxed);
                    match self.process(&endpoint, mode).await {
                        Ok(transition) => {
                            alerts.fetch_add(transition.alerts.len(), Ordering::Relaxed);
                        }
                        Err(e) => {
                            failed.fetch_add(1, Ordering::Relaxed);
                            error!(endpoint = %endpoint.name, link = %endpoint.link, "Evaluation failed: {}", e);
                        }
                    }
                }
            })
            .await;

        let report = SweepReport {
            evaluated: evaluated.into_inner(),
            alerts: alerts.into_inner(),
            failed: failed.into_inner(),
        };
        info!(
            pass,
            evaluated = report.evaluated,
            alerts = report.alerts,
            failed = report.failed,
            "Pass complete"
        );
        report
    }

    async fn process(&self, endpoint: &MonitoredEndpoint, mode: PassMode) -> Result<Transition, EngineError> {
        let lock = endpoint_lock(&self.locks, &endpoint.id);
        let _guard = lock.lock().await;

        // Re-read under the lock so a queued pass sees the latest record.
        let prior = self
            .repository
            .find_by_id(&endpoint.id)
            .await?
            .unwrap_or_else(|| endpoint.clone());

        let evaluator = Evaluator::for_kind(prior.kind, self.context.clone());
        let outcome = evaluator.evaluate(&prior).await;
        match outcome {
            Ok(ref result) => debug!(
                endpoint = %prior.name,
                kind = %prior.kind,
                reachable = result.reachable,
                blocks_behind = ?result.blocks_behind,
                "Evaluated"
            ),
            Err(ref failure) => warn!(endpoint = %prior.name, kind = %prior.kind, "{}", failure),
        }

        let machine = StatusStateMachine::new(&self.policy);
        let now = Utc::now();
        let transition = match mode {
            PassMode::Regular => machine.apply(&prior, &outcome, now),
            PassMode::DailyUsage => machine.apply_daily_usage(&prior, &outcome, now),
        };

        if transition.changed {
            self.repository.save(&transition.endpoint).await?;
        }

        if let Some(ref key) = transition.unwatch {
            self.watchers.cancel(key);
        }
        for kind in &transition.alerts {
            let alert = Alert::new(&transition.endpoint.name, &transition.endpoint.link, kind.clone());
            self.notifier.notify(&alert).await;
        }
        if let Some(ref key) = transition.watch {
            self.start_watcher(key.clone(), &transition.endpoint);
        }

        match outcome {
            Err(failure @ EvaluationFailure::Data(_)) => Err(failure.into()),
            _ => Ok(transition),
        }
    }

    fn start_watcher(&self, key: WatcherKey, endpoint: &MonitoredEndpoint) {
        let Some(check) = SyncCheck::new(self.context.clone(), endpoint.clone()) else {
            return;
        };
        let notifier = self.notifier.clone();
        let repository = self.repository.clone();
        let locks = self.locks.clone();
        let tolerance = self.sync_tolerance;
        let id = endpoint.id.clone();
        let name = endpoint.name.clone();
        let link = endpoint.link.clone();

        self.watchers.register(key, move || {
            let check = check.clone();
            let notifier = notifier.clone();
            let repository = repository.clone();
            let locks = locks.clone();
            let id = id.clone();
            let name = name.clone();
            let link = link.clone();
            async move {
                let blocks_behind = match check.blocks_behind().await {
                    Ok(b) => b,
                    Err(e) => return PollOutcome::Failed(e.to_string()),
                };
                if blocks_behind.unsigned_abs() > tolerance {
                    debug!(blocks_behind, "Indexer still behind");
                    return PollOutcome::Pending;
                }

                // Record the resync so the next sweep does not announce it
                // again. Only `blocks_behind` is patched, on the record read
                // under the lock, so a pass that ran meanwhile keeps its status.
                {
                    let lock = endpoint_lock(&locks, &id);
                    let _guard = lock.lock().await;
                    match repository.find_by_id(&id).await {
                        Ok(Some(mut record)) => {
                            record.blocks_behind = Some(blocks_behind);
                            record.updated_at = Utc::now();
                            if let Err(e) = repository.save(&record).await {
                                warn!("Failed to record resync: {}", e);
                            }
                        }
                        Ok(None) => {}
                        Err(e) => warn!("Failed to load endpoint after resync: {}", e),
                    }
                }
                notifier.notify(&Alert::new(name, link, AlertKind::Synced)).await;
                PollOutcome::Resynced
            }
        });
    }
}

fn endpoint_lock(locks: &DashMap<String, Arc<Mutex<()>>>, id: &str) -> Arc<Mutex<()>> {
    locks.entry(id.to_string()).or_default().clone()
}
