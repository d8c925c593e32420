//! Alert fan-out.

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{error, info};

use apiwatch_config::Config;

use crate::alerts::Alert;
use crate::channels::{AlertChannel, LogChannel, SlackChannel, TelegramChannel};
use crate::error::NotifyError;

/// Best-effort alert delivery.
///
/// Implementations never report failure to the caller; a lost alert must
/// not abort an evaluation pass.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, alert: &Alert);
}

/// Dispatches alerts to every configured channel.
pub struct AlertManager {
    channels: Vec<Box<dyn AlertChannel>>,
}

impl AlertManager {
    /// Create a manager that only logs.
    pub fn new() -> Self {
        Self {
            channels: vec![Box::new(LogChannel)],
        }
    }

    /// Create from config.
    ///
    /// Channel requests share the fetch timeout. A channel whose client
    /// cannot be built is logged and left out.
    pub fn from_config(config: &Config) -> Self {
        let mut manager = Self::new();
        let timeout = config.fetch.timeout();

        if let Some(ref token) = config.telegram.access_token {
            if !token.is_empty() {
                match TelegramChannel::new(token, config.telegram.chat_ids.clone(), timeout) {
                    Ok(channel) => {
                        info!(chats = config.telegram.chat_ids.len(), "Adding Telegram alert channel");
                        manager.add_channel(Box::new(channel));
                    }
                    Err(e) => error!("Telegram alert channel disabled: {}", e),
                }
            }
        }

        if let Some(ref webhook_url) = config.slack.webhook_url {
            if !webhook_url.is_empty() {
                match SlackChannel::new(webhook_url, timeout) {
                    Ok(channel) => {
                        info!("Adding Slack alert channel");
                        manager.add_channel(Box::new(channel));
                    }
                    Err(e) => error!("Slack alert channel disabled: {}", e),
                }
            }
        }

        manager
    }

    /// Add a channel.
    pub fn add_channel(&mut self, channel: Box<dyn AlertChannel>) {
        self.channels.push(channel);
    }

    /// Get list of channel names.
    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    /// Send an alert to all channels, returning the failures.
    pub async fn send(&self, alert: &Alert) -> Vec<NotifyError> {
        let mut errors = Vec::new();

        for channel in &self.channels {
            if let Err(e) = channel.send(alert).await {
                error!(
                    endpoint = %alert.name,
                    channel = channel.name(),
                    "Failed to send alert: {}",
                    e
                );
                errors.push(e);
            }
        }

        errors
    }
}

impl Default for AlertManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Notifier for AlertManager {
    async fn notify(&self, alert: &Alert) {
        self.send(alert).await;
    }
}

/// Notifier that keeps every alert in memory, for tests and dry runs.
#[derive(Default)]
pub struct RecordingNotifier {
    alerts: Mutex<Vec<Alert>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Alerts received so far.
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().clone()
    }

    /// Drain the received alerts.
    pub fn take(&self) -> Vec<Alert> {
        std::mem::take(&mut *self.alerts.lock())
    }

    pub fn len(&self) -> usize {
        self.alerts.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.lock().is_empty()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, alert: &Alert) {
        self.alerts.lock().push(alert.clone());
    }
}
