//! Status and notification state machine.
//!
//! [`StatusStateMachine::apply`] is pure: it takes the prior record and the
//! outcome of one evaluation and returns the next record together with the
//! alerts to send and the watcher to start or stop. Persisting the record
//! and dispatching the alerts is the caller's job.

#[cfg(test)]
#[path = "state_machine_tests.rs"]
mod tests;

use apiwatch_notify::{AlertKind, UsageReport};
use chrono::{DateTime, Utc};

use crate::error::EvaluationFailure;
use crate::evaluators::EvaluationResult;
use crate::ladder::TokenBalanceLadder;
use crate::model::{EndpointKind, EndpointStatus, MonitoredEndpoint, WatcherKey};
use crate::policy::MonitorPolicy;

/// Result of applying one evaluation outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// Record to persist.
    pub endpoint: MonitoredEndpoint,
    /// Alerts in dispatch order.
    pub alerts: Vec<AlertKind>,
    /// Recovery watcher to register.
    pub watch: Option<WatcherKey>,
    /// Recovery watcher made redundant by this pass.
    pub unwatch: Option<WatcherKey>,
    /// Whether `endpoint` differs from the prior record.
    pub changed: bool,
}

impl Transition {
    pub(crate) fn unchanged(prior: &MonitoredEndpoint) -> Self {
        Self {
            endpoint: prior.clone(),
            alerts: Vec::new(),
            watch: None,
            unwatch: None,
            changed: false,
        }
    }

    pub(crate) fn updated(mut endpoint: MonitoredEndpoint, alerts: Vec<AlertKind>, now: DateTime<Utc>) -> Self {
        endpoint.updated_at = now;
        Self {
            endpoint,
            alerts,
            watch: None,
            unwatch: None,
            changed: true,
        }
    }
}

/// Record a successful pass.
pub(crate) fn mark_up(endpoint: &mut MonitoredEndpoint, now: DateTime<Utc>) {
    endpoint.status = EndpointStatus::Active;
    endpoint.last_uptime = Some(now);
    endpoint.downtime_count = 0;
}

/// Record a failed pass.
pub(crate) fn mark_down(endpoint: &mut MonitoredEndpoint, now: DateTime<Utc>) {
    endpoint.status = EndpointStatus::Inactive;
    endpoint.last_downtime = Some(now);
    endpoint.downtime_count = endpoint.downtime_count.saturating_add(1);
}

/// Decides status changes and which alerts fire.
pub struct StatusStateMachine<'a> {
    policy: &'a MonitorPolicy,
}

impl<'a> StatusStateMachine<'a> {
    pub fn new(policy: &'a MonitorPolicy) -> Self {
        Self { policy }
    }

    /// Apply one evaluation outcome to `prior`.
    pub fn apply(
        &self,
        prior: &MonitoredEndpoint,
        outcome: &Result<EvaluationResult, EvaluationFailure>,
        now: DateTime<Utc>,
    ) -> Transition {
        if prior.kind == EndpointKind::TokenBalance {
            return TokenBalanceLadder::new(self.policy.timezone).apply(prior, outcome, now);
        }

        match outcome {
            Err(EvaluationFailure::Data(_)) => Transition::unchanged(prior),
            Err(EvaluationFailure::Unreachable(_)) => self.unreachable(prior, now),
            Err(EvaluationFailure::RpcFailure(_)) => self.rpc_failure(prior, now),
            Ok(result) if !result.reachable => self.unreachable(prior, now),
            Ok(result) => self.reachable(prior, result, now),
        }
    }

    /// Daily usage report for a CDN endpoint.
    ///
    /// A successful read stores the percentage and emits the summary without
    /// touching the high-usage dedup flags. Failures take the regular path.
    pub fn apply_daily_usage(
        &self,
        prior: &MonitoredEndpoint,
        outcome: &Result<EvaluationResult, EvaluationFailure>,
        now: DateTime<Utc>,
    ) -> Transition {
        match outcome {
            Ok(EvaluationResult {
                reachable: true,
                usage: Some(report),
                ..
            }) => {
                let mut endpoint = prior.clone();
                endpoint.percentage = Some(report.percentage);
                mark_up(&mut endpoint, now);
                Transition::updated(
                    endpoint,
                    vec![AlertKind::DailyUsage {
                        report: report.clone(),
                    }],
                    now,
                )
            }
            _ => self.apply(prior, outcome, now),
        }
    }

    fn unreachable(&self, prior: &MonitoredEndpoint, now: DateTime<Utc>) -> Transition {
        let mut endpoint = prior.clone();
        let mut alerts = Vec::new();
        if !prior.is_inactive() {
            alerts.push(AlertKind::Inactive);
        }
        mark_down(&mut endpoint, now);
        Transition::updated(endpoint, alerts, now)
    }

    fn rpc_failure(&self, prior: &MonitoredEndpoint, now: DateTime<Utc>) -> Transition {
        let mut endpoint = prior.clone();
        let mut alerts = Vec::new();
        if prior.rpc_downtime_count >= 2 {
            alerts.push(AlertKind::RpcDown);
        }
        endpoint.rpc_downtime_count = prior.rpc_downtime_count.saturating_add(1);
        Transition::updated(endpoint, alerts, now)
    }

    fn reachable(&self, prior: &MonitoredEndpoint, result: &EvaluationResult, now: DateTime<Utc>) -> Transition {
        let trigger = self.policy.trigger_for(prior);
        let mut endpoint = prior.clone();
        let mut alerts = Vec::new();
        let mut watch = None;
        let mut unwatch = None;

        let height = if prior.kind.is_chain() {
            result.blocks_behind
        } else {
            None
        };

        if let Some(blocks_behind) = height {
            if blocks_behind > trigger {
                let recovering = prior.blocks_behind.is_some_and(|before| blocks_behind < before);
                alerts.push(AlertKind::OutOfSync {
                    blocks_behind,
                    updated_at: result
                        .updated_at
                        .clone()
                        .unwrap_or_else(|| self.policy.local_timestamp(now)),
                    recovering,
                });
                if recovering {
                    watch = prior.watcher_key();
                }
            }
            endpoint.blocks_behind = Some(blocks_behind);
            endpoint.rpc_downtime_count = 0;
        }

        if prior.kind == EndpointKind::Cloudflare {
            if let Some(ref report) = result.usage {
                self.usage_policy(&mut endpoint, report, now, &mut alerts);
            }
        }

        mark_up(&mut endpoint, now);

        if prior.is_inactive() {
            alerts.push(AlertKind::Active);
        }
        if let (Some(before), Some(after)) = (prior.blocks_behind, height) {
            if before > trigger && after <= trigger {
                alerts.push(AlertKind::Synced);
                unwatch = prior.watcher_key();
            }
        }
        if prior.rpc_downtime_count > 2 && height.is_some() {
            alerts.push(AlertKind::Active);
        }

        let mut transition = Transition::updated(endpoint, alerts, now);
        transition.watch = watch;
        transition.unwatch = unwatch;
        transition
    }

    /// High-usage alerting with a cooldown, and the all-clear when usage
    /// drops back under the limit.
    fn usage_policy(
        &self,
        endpoint: &mut MonitoredEndpoint,
        report: &UsageReport,
        now: DateTime<Utc>,
        alerts: &mut Vec<AlertKind>,
    ) {
        endpoint.percentage = Some(report.percentage);
        let limit = self.policy.usage_limit(report.kind());

        if report.percentage >= limit {
            let cooled_down = endpoint
                .notified_time
                .is_some_and(|at| now - at > self.policy.notified_cooldown);
            if !endpoint.is_notified || cooled_down {
                alerts.push(AlertKind::UsageHigh {
                    report: report.clone(),
                });
                endpoint.is_notified = true;
                endpoint.notified_time = Some(now);
            }
        } else if endpoint.is_notified {
            alerts.push(AlertKind::UsageInRange {
                report: report.clone(),
            });
            endpoint.is_notified = false;
        }
    }
}
