//! # apiwatch Notify
//!
//! Alert model and best-effort delivery.
//!
//! ## Features
//!
//! - Alert codes with typed context
//! - Per-channel templates (Telegram and Slack markdown dialects)
//! - Fan-out notifier that logs and swallows delivery failures

pub mod error;
pub mod alerts;
pub mod templates;
pub mod channels;
pub mod notifier;

pub use error::NotifyError;
pub use alerts::{
    Alert, AlertKind, AlertSeverity, TokenAlert, TokenAlertCode, TokenBalanceContext,
    UsageCounters, UsageKind, UsageReport,
};
pub use channels::{AlertChannel, LogChannel, SlackChannel, TelegramChannel};
pub use notifier::{AlertManager, Notifier, RecordingNotifier};
pub use templates::{format_token_amount, render, Dialect};
