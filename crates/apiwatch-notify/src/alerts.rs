//! Alert types.
//!
//! Every alert is a code plus the context its template needs. Endpoint
//! alerts share one code space; token-balance alerts have their own.

#[cfg(test)]
#[path = "alerts_tests.rs"]
mod tests;

use chrono::{DateTime, FixedOffset, Utc};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

/// Alert severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    /// Informational.
    Info,
    /// Warning.
    Warning,
    /// Error.
    Error,
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertSeverity::Info => write!(f, "INFO"),
            AlertSeverity::Warning => write!(f, "WARNING"),
            AlertSeverity::Error => write!(f, "ERROR"),
        }
    }
}

/// Which CDN quota a usage figure refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageKind {
    Image,
    Video,
}

/// Raw counters behind a usage percentage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum UsageCounters {
    Image {
        current: f64,
        allowed: f64,
    },
    Video {
        video_count: String,
        total_storage_minutes: f64,
        total_storage_minutes_limit: f64,
    },
}

/// CDN usage figure with the counters it was computed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageReport {
    /// Ratio rounded to two decimals, `0.90` means 90%.
    pub percentage: f64,
    pub counters: UsageCounters,
}

impl UsageReport {
    pub fn kind(&self) -> UsageKind {
        match self.counters {
            UsageCounters::Image { .. } => UsageKind::Image,
            UsageCounters::Video { .. } => UsageKind::Video,
        }
    }
}

/// Token-balance alert codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenAlertCode {
    /// At or below the lowest bound, repeats every pass.
    Critical,
    /// At or below the middle bound.
    Low,
    /// At or below the upper bound.
    Warning,
    /// Balance went up since the previous pass.
    Recovered,
}

impl TokenAlertCode {
    pub fn code(&self) -> u8 {
        match self {
            TokenAlertCode::Critical => 1,
            TokenAlertCode::Low => 2,
            TokenAlertCode::Warning => 3,
            TokenAlertCode::Recovered => 4,
        }
    }
}

/// Wallet details rendered into token-balance alerts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenBalanceContext {
    pub chain_id: String,
    pub contract_address: String,
    pub wallet_address: String,
    /// Balance in base units (18 decimals).
    #[serde(with = "biguint_string")]
    pub balance: BigUint,
    #[serde(with = "opt_biguint_string")]
    pub minimum_required: Option<BigUint>,
    pub checked_at: DateTime<FixedOffset>,
}

/// A token-balance alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenAlert {
    pub code: TokenAlertCode,
    pub context: TokenBalanceContext,
}

/// What happened, with the data its message needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlertKind {
    /// Primary link unreachable.
    Inactive,
    /// Indexer caught up with the chain.
    Synced,
    /// Endpoint reachable again.
    Active,
    /// CDN usage dropped back under its limit.
    UsageInRange { report: UsageReport },
    /// Indexer behind the chain by more than the trigger block.
    OutOfSync {
        blocks_behind: i64,
        updated_at: String,
        recovering: bool,
    },
    /// Chain height source failing repeatedly.
    RpcDown,
    /// CDN usage at or above its limit.
    UsageHigh { report: UsageReport },
    Token { alert: TokenAlert },
    /// Scheduled heartbeat of the monitor itself.
    MonitorActive,
    /// Scheduled CDN usage summary.
    DailyUsage { report: UsageReport },
}

/// An alert about one monitored endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Display name of the endpoint.
    pub name: String,
    /// Endpoint link as stored.
    pub link: String,
    pub kind: AlertKind,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    /// Create a new alert.
    pub fn new(name: impl Into<String>, link: impl Into<String>, kind: AlertKind) -> Self {
        Self {
            name: name.into(),
            link: link.into(),
            kind,
            timestamp: Utc::now(),
        }
    }

    /// Heartbeat alert not tied to an endpoint.
    pub fn monitor_active() -> Self {
        Self::new("apiwatch", "", AlertKind::MonitorActive)
    }

    /// Numeric code of the endpoint alert namespace.
    ///
    /// Token alerts answer with their own namespace; heartbeat and daily
    /// summaries have no code.
    pub fn code(&self) -> Option<u8> {
        match &self.kind {
            AlertKind::Inactive => None,
            AlertKind::Synced => Some(1),
            AlertKind::Active => Some(2),
            AlertKind::UsageInRange { .. } => Some(3),
            AlertKind::OutOfSync { .. } => Some(7),
            AlertKind::RpcDown => Some(12),
            AlertKind::UsageHigh { .. } => Some(13),
            AlertKind::Token { alert } => Some(alert.code.code()),
            AlertKind::MonitorActive | AlertKind::DailyUsage { .. } => None,
        }
    }

    pub fn severity(&self) -> AlertSeverity {
        match &self.kind {
            AlertKind::Inactive | AlertKind::RpcDown => AlertSeverity::Error,
            AlertKind::OutOfSync { .. } | AlertKind::UsageHigh { .. } => AlertSeverity::Warning,
            AlertKind::Token { alert } => match alert.code {
                TokenAlertCode::Recovered => AlertSeverity::Info,
                _ => AlertSeverity::Warning,
            },
            _ => AlertSeverity::Info,
        }
    }

    /// Link with the health suffixes removed, as shown to humans.
    pub fn route(&self) -> String {
        self.link.replace("/status", "").replace("/health", "")
    }
}

mod biguint_string {
    use num_bigint::BigUint;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &BigUint, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<BigUint, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

mod opt_biguint_string {
    use num_bigint::BigUint;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<BigUint>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => s.serialize_some(&v.to_string()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<BigUint>, D::Error> {
        let s = Option::<String>::deserialize(d)?;
        s.map(|v| v.parse().map_err(serde::de::Error::custom))
            .transpose()
    }
}
