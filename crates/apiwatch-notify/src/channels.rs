//! Alert channel implementations (Slack, Telegram, log).

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::alerts::{Alert, AlertSeverity};
use crate::error::NotifyError;
use crate::templates::{render, Dialect};

const TELEGRAM_API: &str = "https://api.telegram.org";

/// Client with a per-request deadline, so an unresponsive webhook cannot
/// hold up the caller.
fn http_client(timeout: Duration) -> Result<reqwest::Client, NotifyError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| NotifyError::Client(format!("Failed to build HTTP client: {}", e)))
}

/// Alert channel trait.
#[async_trait]
pub trait AlertChannel: Send + Sync {
    /// Channel name.
    fn name(&self) -> &str;

    /// Send an alert.
    async fn send(&self, alert: &Alert) -> Result<(), NotifyError>;
}

/// Log channel (writes to tracing).
pub struct LogChannel;

#[async_trait]
impl AlertChannel for LogChannel {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, alert: &Alert) -> Result<(), NotifyError> {
        let text = render(alert, Dialect::Slack);
        match alert.severity() {
            AlertSeverity::Info => info!(endpoint = %alert.name, "[ALERT] {}", text),
            AlertSeverity::Warning => warn!(endpoint = %alert.name, "[ALERT] {}", text),
            AlertSeverity::Error => error!(endpoint = %alert.name, "[ALERT] {}", text),
        }
        Ok(())
    }
}

/// Slack incoming-webhook channel.
pub struct SlackChannel {
    webhook_url: String,
    client: reqwest::Client,
}

impl SlackChannel {
    /// Create a new Slack channel whose requests give up after `timeout`.
    pub fn new(webhook_url: impl Into<String>, timeout: Duration) -> Result<Self, NotifyError> {
        Ok(Self {
            webhook_url: webhook_url.into(),
            client: http_client(timeout)?,
        })
    }
}

#[async_trait]
impl AlertChannel for SlackChannel {
    fn name(&self) -> &str {
        "slack"
    }

    async fn send(&self, alert: &Alert) -> Result<(), NotifyError> {
        let payload = serde_json::json!({
            "text": render(alert, Dialect::Slack),
            "mrkdwn": true
        });

        let response = self
            .client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotifyError::Delivery(format!("Slack request failed: {}", e)))?;

        if response.status().is_success() {
            debug!("Slack alert sent successfully");
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(NotifyError::Delivery(format!(
                "Slack webhook returned {}: {}",
                status, body
            )))
        }
    }
}

/// Telegram bot channel, delivering to every configured chat.
pub struct TelegramChannel {
    bot_token: String,
    chat_ids: Vec<i64>,
    api_base: String,
    client: reqwest::Client,
}

impl TelegramChannel {
    /// Create a new Telegram channel whose requests give up after `timeout`.
    pub fn new(bot_token: impl Into<String>, chat_ids: Vec<i64>, timeout: Duration) -> Result<Self, NotifyError> {
        Ok(Self {
            bot_token: bot_token.into(),
            chat_ids,
            api_base: TELEGRAM_API.to_string(),
            client: http_client(timeout)?,
        })
    }

    /// Point the channel at a different Bot API host.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    async fn send_to(&self, chat_id: i64, text: &str) -> Result<(), NotifyError> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token);
        let payload = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown"
        });

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotifyError::Delivery(format!("Telegram request failed: {}", e)))?;

        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(NotifyError::Delivery(format!(
                "Telegram API returned {} for chat {}: {}",
                status, chat_id, body
            )))
        }
    }
}

#[async_trait]
impl AlertChannel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    /// Attempts every chat; reports the first failure after trying them all.
    async fn send(&self, alert: &Alert) -> Result<(), NotifyError> {
        if self.chat_ids.is_empty() {
            return Err(NotifyError::ChannelNotConfigured(
                "telegram has no chat_ids".to_string(),
            ));
        }

        let text = render(alert, Dialect::Telegram);
        let mut first_error = None;
        for chat_id in &self.chat_ids {
            if let Err(e) = self.send_to(*chat_id, &text).await {
                warn!(chat_id, "Telegram delivery failed: {}", e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                debug!(chats = self.chat_ids.len(), "Telegram alert sent successfully");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::AlertKind;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn alert() -> Alert {
        Alert::new("Indexer", "https://idx.example.com/health", AlertKind::Inactive)
    }

    #[test]
    fn test_channel_names() {
        assert_eq!(LogChannel.name(), "log");
        assert_eq!(SlackChannel::new("https://hooks.slack.com/x", TIMEOUT).unwrap().name(), "slack");
        assert_eq!(TelegramChannel::new("token", vec![1], TIMEOUT).unwrap().name(), "telegram");
    }

    #[tokio::test]
    async fn test_log_channel_never_fails() {
        assert!(LogChannel.send(&alert()).await.is_ok());
    }

    #[tokio::test]
    async fn test_slack_posts_mrkdwn_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_partial_json(serde_json::json!({"mrkdwn": true})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let channel = SlackChannel::new(format!("{}/hook", server.uri()), TIMEOUT).unwrap();
        channel.send(&alert()).await.unwrap();
    }

    #[tokio::test]
    async fn test_slack_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let channel = SlackChannel::new(server.uri(), TIMEOUT).unwrap();
        let err = channel.send(&alert()).await.unwrap_err();
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn test_slack_hanging_webhook_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
            .mount(&server)
            .await;

        let channel = SlackChannel::new(server.uri(), Duration::from_millis(200)).unwrap();
        let started = std::time::Instant::now();
        let err = channel.send(&alert()).await.unwrap_err();
        assert!(matches!(err, NotifyError::Delivery(_)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_telegram_hanging_api_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
            .mount(&server)
            .await;

        let channel = TelegramChannel::new("T0KEN", vec![11], Duration::from_millis(200))
            .unwrap()
            .with_api_base(server.uri());
        let started = std::time::Instant::now();
        assert!(channel.send(&alert()).await.is_err());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_telegram_sends_to_every_chat() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botT0KEN/sendMessage"))
            .and(body_partial_json(serde_json::json!({"parse_mode": "Markdown"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(2)
            .mount(&server)
            .await;

        let channel = TelegramChannel::new("T0KEN", vec![11, 22], TIMEOUT)
            .unwrap()
            .with_api_base(server.uri());
        channel.send(&alert()).await.unwrap();
    }

    #[tokio::test]
    async fn test_telegram_without_chats() {
        let channel = TelegramChannel::new("T0KEN", vec![], TIMEOUT).unwrap();
        let err = channel.send(&alert()).await.unwrap_err();
        assert!(matches!(err, NotifyError::ChannelNotConfigured(_)));
    }
}
