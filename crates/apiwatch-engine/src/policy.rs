//! Alerting thresholds derived from configuration.

use apiwatch_config::Config;
use apiwatch_notify::UsageKind;
use chrono::{DateTime, FixedOffset, TimeDelta, Utc};

use crate::model::MonitoredEndpoint;

/// Format of locally rendered timestamps, e.g. `May 1, 2024, 3:30:00 PM`.
const LOCAL_TIMESTAMP_FORMAT: &str = "%B %-d, %Y, %-I:%M:%S %p";

/// Thresholds the state machine evaluates against.
#[derive(Debug, Clone)]
pub struct MonitorPolicy {
    /// Default blocks-behind threshold.
    pub trigger_block: i64,
    pub image_percent_limit: f64,
    pub video_percent_limit: f64,
    /// Minimum time between repeated high-usage alerts.
    pub notified_cooldown: TimeDelta,
    pub timezone: FixedOffset,
}

impl MonitorPolicy {
    pub fn from_config(config: &Config) -> Self {
        let cooldown_ms = i64::try_from(config.cloudflare.notified_time_limit_ms).unwrap_or(i64::MAX);
        Self {
            trigger_block: config.trigger_block,
            image_percent_limit: config.cloudflare.image_percent_limit,
            video_percent_limit: config.cloudflare.video_percent_limit,
            notified_cooldown: TimeDelta::try_milliseconds(cooldown_ms).unwrap_or(TimeDelta::MAX),
            timezone: config.schedule.timezone(),
        }
    }

    /// Per-endpoint override, else the global default.
    pub fn trigger_for(&self, endpoint: &MonitoredEndpoint) -> i64 {
        endpoint.trigger_block.unwrap_or(self.trigger_block)
    }

    pub fn usage_limit(&self, kind: UsageKind) -> f64 {
        match kind {
            UsageKind::Image => self.image_percent_limit,
            UsageKind::Video => self.video_percent_limit,
        }
    }

    /// `now` rendered in the reporting timezone.
    pub fn local_timestamp(&self, now: DateTime<Utc>) -> String {
        now.with_timezone(&self.timezone)
            .format(LOCAL_TIMESTAMP_FORMAT)
            .to_string()
    }
}

impl Default for MonitorPolicy {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}
