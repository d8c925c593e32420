//! Configuration validation.

use std::str::FromStr;

use crate::error::ConfigError;
use crate::schema::Config;

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;

/// Largest timezone offset accepted, in minutes.
const MAX_OFFSET_MINUTES: i32 = 14 * 60;

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    /// Convert the first error into a `ConfigError`.
    pub fn into_result(self) -> Result<Vec<ValidationWarning>, ConfigError> {
        match self.errors.into_iter().next() {
            Some(error) => Err(ConfigError::InvalidValue {
                field: error.path,
                message: error.message,
            }),
            None => Ok(self.warnings),
        }
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &Config) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_thresholds(config, &mut result);
        Self::validate_cloudflare(config, &mut result);
        Self::validate_channels(config, &mut result);
        Self::validate_schedule(config, &mut result);
        Self::validate_fetch(config, &mut result);
        Self::validate_watcher(config, &mut result);

        result
    }

    fn validate_thresholds(config: &Config, result: &mut ValidationResult) {
        if config.trigger_block < 0 {
            result.add_error(ValidationError::new(
                "trigger_block",
                "trigger_block cannot be negative",
            ));
        }

        if config.infura_key.as_deref().is_none_or(str::is_empty) {
            result.add_warning(ValidationWarning::new(
                "infura_key",
                "No infura_key configured, EVM chain heights will fail",
            ));
        }
    }

    fn validate_cloudflare(config: &Config, result: &mut ValidationResult) {
        let limits = [
            ("cloudflare.image_percent_limit", config.cloudflare.image_percent_limit),
            ("cloudflare.video_percent_limit", config.cloudflare.video_percent_limit),
        ];
        for (path, limit) in limits {
            if !(limit > 0.0 && limit <= 1.0) {
                result.add_error(ValidationError::new(path, "limit must be in (0, 1]"));
            }
        }

        if config.cloudflare.notified_time_limit_ms == 0 {
            result.add_warning(ValidationWarning::new(
                "cloudflare.notified_time_limit_ms",
                "Cooldown of 0 re-sends the usage alert on every pass",
            ));
        }
    }

    fn validate_channels(config: &Config, result: &mut ValidationResult) {
        if let Some(ref url) = config.slack.webhook_url {
            if !url.is_empty() && !url.starts_with("http://") && !url.starts_with("https://") {
                result.add_error(ValidationError::new(
                    "slack.webhook_url",
                    "webhook_url must start with http:// or https://",
                ));
            }
        }

        let telegram_ready = config
            .telegram
            .access_token
            .as_deref()
            .is_some_and(|t| !t.is_empty());
        if telegram_ready && config.telegram.chat_ids.is_empty() {
            result.add_warning(ValidationWarning::new(
                "telegram.chat_ids",
                "Telegram token set but no chat_ids, alerts will not be delivered",
            ));
        }

        let slack_ready = config
            .slack
            .webhook_url
            .as_deref()
            .is_some_and(|u| !u.is_empty());
        if !telegram_ready && !slack_ready {
            result.add_warning(ValidationWarning::new(
                "telegram",
                "No alert channel configured, alerts are only logged",
            ));
        }
    }

    fn validate_schedule(config: &Config, result: &mut ValidationResult) {
        let crons = [
            ("schedule.sweep", &config.schedule.sweep),
            ("schedule.daily_report", &config.schedule.daily_report),
            ("schedule.token_balance", &config.schedule.token_balance),
        ];
        for (path, expr) in crons {
            if let Err(e) = cron::Schedule::from_str(expr) {
                result.add_error(ValidationError::new(
                    path,
                    format!("invalid cron expression '{}': {}", expr, e),
                ));
            }
        }

        if config.schedule.utc_offset_minutes.abs() > MAX_OFFSET_MINUTES {
            result.add_error(ValidationError::new(
                "schedule.utc_offset_minutes",
                "offset must be within +/-14 hours",
            ));
        }
    }

    fn validate_fetch(config: &Config, result: &mut ValidationResult) {
        if config.fetch.max_attempts == 0 {
            result.add_error(ValidationError::new(
                "fetch.max_attempts",
                "max_attempts must be greater than 0",
            ));
        }

        if config.fetch.max_concurrency == 0 {
            result.add_error(ValidationError::new(
                "fetch.max_concurrency",
                "max_concurrency must be greater than 0",
            ));
        }

        if config.fetch.timeout_secs == 0 {
            result.add_error(ValidationError::new(
                "fetch.timeout_secs",
                "timeout_secs must be greater than 0",
            ));
        }

        if config.fetch.max_attempts > 10 {
            result.add_warning(ValidationWarning::new(
                "fetch.max_attempts",
                "max_attempts is very high (>10), a dead endpoint will stall its sweep slot",
            ));
        }
    }

    fn validate_watcher(config: &Config, result: &mut ValidationResult) {
        if config.watcher.interval_secs == 0 {
            result.add_error(ValidationError::new(
                "watcher.interval_secs",
                "interval_secs must be greater than 0",
            ));
        }
    }
}
