//! Configuration schema definitions.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Global default blocks-behind threshold.
    #[serde(default = "default_trigger_block")]
    pub trigger_block: i64,

    /// Key appended to EVM base addresses (`<base>/v3/<key>`).
    #[serde(default)]
    pub infura_key: Option<String>,

    #[serde(default)]
    pub cloudflare: CloudflareConfig,

    #[serde(default)]
    pub telegram: TelegramConfig,

    #[serde(default)]
    pub slack: SlackConfig,

    #[serde(default)]
    pub schedule: ScheduleConfig,

    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub watcher: WatcherConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            trigger_block: default_trigger_block(),
            infura_key: None,
            cloudflare: CloudflareConfig::default(),
            telegram: TelegramConfig::default(),
            slack: SlackConfig::default(),
            schedule: ScheduleConfig::default(),
            fetch: FetchConfig::default(),
            watcher: WatcherConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_trigger_block() -> i64 {
    50
}

/// CDN usage API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudflareConfig {
    /// Bearer token sent to the usage endpoint.
    #[serde(default)]
    pub token: Option<String>,

    #[serde(default = "default_percent_limit")]
    pub image_percent_limit: f64,

    #[serde(default = "default_percent_limit")]
    pub video_percent_limit: f64,

    /// Minimum time between repeated high-usage alerts.
    #[serde(default = "default_notified_time_limit_ms")]
    pub notified_time_limit_ms: u64,
}

impl Default for CloudflareConfig {
    fn default() -> Self {
        Self {
            token: None,
            image_percent_limit: default_percent_limit(),
            video_percent_limit: default_percent_limit(),
            notified_time_limit_ms: default_notified_time_limit_ms(),
        }
    }
}

fn default_percent_limit() -> f64 {
    0.9
}

fn default_notified_time_limit_ms() -> u64 {
    3_600_000
}

/// Telegram bot settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub access_token: Option<String>,

    /// Chats that receive every alert.
    #[serde(default)]
    pub chat_ids: Vec<i64>,
}

/// Slack incoming webhook settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlackConfig {
    #[serde(default)]
    pub webhook_url: Option<String>,
}

/// Cron cadences (6-field, seconds first).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_sweep_cron")]
    pub sweep: String,

    #[serde(default = "default_daily_report_cron")]
    pub daily_report: String,

    #[serde(default = "default_token_balance_cron")]
    pub token_balance: String,

    /// Offset of the reporting timezone, in minutes east of UTC.
    #[serde(default = "default_utc_offset_minutes")]
    pub utc_offset_minutes: i32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            sweep: default_sweep_cron(),
            daily_report: default_daily_report_cron(),
            token_balance: default_token_balance_cron(),
            utc_offset_minutes: default_utc_offset_minutes(),
        }
    }
}

impl ScheduleConfig {
    /// Reporting timezone. Falls back to UTC when the offset is out of range.
    pub fn timezone(&self) -> FixedOffset {
        self.utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| Utc.fix())
    }
}

fn default_sweep_cron() -> String {
    "0 */5 * * * *".to_string()
}

fn default_daily_report_cron() -> String {
    "0 0 9,21 * * *".to_string()
}

fn default_token_balance_cron() -> String {
    "0 */30 * * * *".to_string()
}

fn default_utc_offset_minutes() -> i32 {
    330
}

/// Outbound fetch behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Linear backoff step; attempt `n` sleeps `n * backoff_base_ms`.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Endpoints evaluated in parallel during a sweep.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            timeout_secs: default_timeout_secs(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

impl FetchConfig {
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    200
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_concurrency() -> usize {
    8
}

/// Recovery watcher settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    #[serde(default = "default_watcher_interval")]
    pub interval_secs: u64,

    /// Maximum height difference considered resynced.
    #[serde(default = "default_sync_tolerance")]
    pub sync_tolerance: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_watcher_interval(),
            sync_tolerance: default_sync_tolerance(),
        }
    }
}

impl WatcherConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

fn default_watcher_interval() -> u64 {
    10
}

fn default_sync_tolerance() -> u64 {
    5
}

/// Endpoint storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("~/.apiwatch/apiwatch.db")
}

/// Log output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,

    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("~/.apiwatch/logs")
}

fn default_max_log_files() -> usize {
    30
}
