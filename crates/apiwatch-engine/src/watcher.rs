//! Recovery watcher pool.
//!
//! A keyed registry of short-lived pollers that follow a lagging indexer
//! until it is back in sync. At most one poller runs per key. A poller
//! removes its own entry when it finishes, and only its own: the entry
//! carries a generation id so a newer registration under the same key is
//! never removed by an older task.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, warn};
use uuid::Uuid;

use crate::model::WatcherKey;

/// Result of one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Still behind; poll again.
    Pending,
    /// Back within tolerance. The watcher stops.
    Resynced,
    /// Fetch failed. The watcher stops without alerting.
    Failed(String),
}

struct WatcherEntry {
    generation: Uuid,
    token: CancellationToken,
    started_at: DateTime<Utc>,
}

/// Keyed set of running recovery watchers.
pub struct RecoveryWatcherPool {
    watchers: Arc<DashMap<WatcherKey, WatcherEntry>>,
    interval: Duration,
    shutdown: CancellationToken,
}

impl RecoveryWatcherPool {
    pub fn new(interval: Duration) -> Self {
        Self {
            watchers: Arc::new(DashMap::new()),
            interval,
            shutdown: CancellationToken::new(),
        }
    }

    /// Start polling `key` unless a watcher for it is already running.
    ///
    /// `poll` runs immediately and then once per interval until it returns
    /// something other than [`PollOutcome::Pending`]. Returns whether a new
    /// watcher was started.
    pub fn register<F, Fut>(&self, key: WatcherKey, poll: F) -> bool
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = PollOutcome> + Send + 'static,
    {
        if self.shutdown.is_cancelled() {
            debug!(key = %key, "Watcher pool is shut down, not registering");
            return false;
        }

        let generation = Uuid::new_v4();
        let token = self.shutdown.child_token();
        match self.watchers.entry(key.clone()) {
            Entry::Occupied(_) => {
                debug!(key = %key, "Recovery watcher already running");
                return false;
            }
            Entry::Vacant(slot) => {
                slot.insert(WatcherEntry {
                    generation,
                    token: token.clone(),
                    started_at: Utc::now(),
                });
            }
        }

        info!(key = %key, interval_secs = self.interval.as_secs(), "Starting recovery watcher");
        let span = tracing::info_span!("recovery_watcher", key = %key, generation = %generation);
        tokio::spawn(
            run_watcher(
                self.watchers.clone(),
                key,
                generation,
                token,
                self.interval,
                poll,
            )
            .instrument(span),
        );
        true
    }

    /// Stop the watcher for `key`. Returns whether one was running.
    pub fn cancel(&self, key: &WatcherKey) -> bool {
        match self.watchers.remove(key) {
            Some((_, entry)) => {
                entry.token.cancel();
                debug!(key = %key, "Recovery watcher cancelled");
                true
            }
            None => false,
        }
    }

    pub fn is_watching(&self, key: &WatcherKey) -> bool {
        self.watchers.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.watchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watchers.is_empty()
    }

    /// Cancel every watcher and refuse new ones.
    pub fn shutdown(&self) {
        let live = self.watchers.len();
        self.shutdown.cancel();
        let now = Utc::now();
        for entry in self.watchers.iter() {
            info!(
                key = %entry.key(),
                running_secs = (now - entry.started_at).num_seconds(),
                "Stopping recovery watcher"
            );
        }
        self.watchers.clear();
        info!(live, "Recovery watcher pool shut down");
    }
}

async fn run_watcher<F, Fut>(
    watchers: Arc<DashMap<WatcherKey, WatcherEntry>>,
    key: WatcherKey,
    generation: Uuid,
    token: CancellationToken,
    interval: Duration,
    poll: F,
) where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = PollOutcome> + Send + 'static,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut polls: u32 = 0;

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        // A poll in flight when cancellation arrives is dropped unfinished.
        let outcome = tokio::select! {
            _ = token.cancelled() => break,
            outcome = poll() => outcome,
        };
        polls += 1;

        match outcome {
            PollOutcome::Pending => continue,
            PollOutcome::Resynced => {
                info!(polls, "Indexer resynced, stopping watcher");
                break;
            }
            PollOutcome::Failed(e) => {
                warn!(polls, "Recovery check failed, stopping watcher: {}", e);
                break;
            }
        }
    }

    watchers.remove_if(&key, |_, entry| entry.generation == generation);
}
