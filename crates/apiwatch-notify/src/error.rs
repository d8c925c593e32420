//! Notification errors.

use thiserror::Error;

/// Notification error types.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// Alert delivery failed.
    #[error("Alert delivery failed: {0}")]
    Delivery(String),

    /// HTTP client for a channel could not be built.
    #[error("Alert channel client error: {0}")]
    Client(String),

    /// Channel not configured.
    #[error("Alert channel not configured: {0}")]
    ChannelNotConfigured(String),
}
