//! Monitored endpoint records.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What an endpoint is and therefore how it is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EndpointKind {
    /// Plain health check with a `success` flag.
    Http,
    /// CDN usage API.
    Cloudflare,
    /// Indexer backed by a Tendermint-style RPC node.
    RpcChain,
    /// Indexer backed by an EVM JSON-RPC node.
    EvmChain,
    /// ERC-20 balance of a wallet, read through an explorer API.
    TokenBalance,
}

impl EndpointKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointKind::Http => "http",
            EndpointKind::Cloudflare => "cloudflare",
            EndpointKind::RpcChain => "rpc-chain",
            EndpointKind::EvmChain => "evm-chain",
            EndpointKind::TokenBalance => "token-balance",
        }
    }

    /// Whether evaluation compares an indexer against a chain height.
    pub fn is_chain(&self) -> bool {
        matches!(self, EndpointKind::RpcChain | EndpointKind::EvmChain)
    }
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EndpointKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http" => Ok(EndpointKind::Http),
            "cloudflare" => Ok(EndpointKind::Cloudflare),
            "rpc-chain" => Ok(EndpointKind::RpcChain),
            "evm-chain" => Ok(EndpointKind::EvmChain),
            "token-balance" => Ok(EndpointKind::TokenBalance),
            other => Err(format!("unknown endpoint kind: {}", other)),
        }
    }
}

/// Persisted health status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointStatus {
    #[default]
    Active,
    Inactive,
}

/// Key of a recovery watcher: the indexer link plus its height source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WatcherKey {
    pub link: String,
    pub source: String,
}

impl WatcherKey {
    pub fn new(link: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            link: link.into(),
            source: source.into(),
        }
    }
}

impl fmt::Display for WatcherKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.link, self.source)
    }
}

/// The persistent unit under watch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredEndpoint {
    /// Generated when absent, so import files may omit it.
    #[serde(default = "new_id")]
    pub id: String,
    /// Display name used in every alert.
    pub name: String,
    /// Health-check URL, without trailing slash.
    pub link: String,
    pub kind: EndpointKind,

    /// Tendermint RPC node (`rpc-chain`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpc_address: Option<String>,
    /// EVM JSON-RPC base (`evm-chain`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<String>,
    /// Token contract (`token-balance`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_address: Option<String>,
    /// Wallet whose balance is watched (`token-balance`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Explorer base for balance lookups; falls back to `link`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    /// Per-endpoint blocks-behind threshold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_block: Option<i64>,

    #[serde(default)]
    pub status: EndpointStatus,
    #[serde(default)]
    pub blocks_behind: Option<i64>,
    #[serde(default)]
    pub downtime_count: u32,
    #[serde(default)]
    pub rpc_downtime_count: u32,
    #[serde(default)]
    pub last_uptime: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_downtime: Option<DateTime<Utc>>,

    /// Last CDN usage ratio.
    #[serde(default)]
    pub percentage: Option<f64>,
    /// Last token balance in whole tokens, six decimals.
    #[serde(default)]
    pub token_balance: Option<Decimal>,

    #[serde(default)]
    pub is_notified: bool,
    #[serde(default)]
    pub notified_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_alert_sent_for_1m: bool,
    #[serde(default)]
    pub is_alert_sent_for_2m: bool,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl MonitoredEndpoint {
    /// Create an active endpoint with a fresh id.
    pub fn new(name: impl Into<String>, link: &str, kind: EndpointKind) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            name: name.into(),
            link: normalize_link(link),
            kind,
            rpc_address: None,
            base_address: None,
            chain_id: None,
            contract_address: None,
            token_address: None,
            api_key: None,
            api_url: None,
            trigger_block: None,
            status: EndpointStatus::Active,
            blocks_behind: None,
            downtime_count: 0,
            rpc_downtime_count: 0,
            last_uptime: None,
            last_downtime: None,
            percentage: None,
            token_balance: None,
            is_notified: false,
            notified_time: None,
            is_alert_sent_for_1m: false,
            is_alert_sent_for_2m: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_rpc_address(mut self, rpc_address: &str) -> Self {
        self.rpc_address = Some(normalize_link(rpc_address));
        self
    }

    pub fn with_base_address(mut self, base_address: &str) -> Self {
        self.base_address = Some(normalize_link(base_address));
        self
    }

    pub fn with_trigger_block(mut self, trigger_block: i64) -> Self {
        self.trigger_block = Some(trigger_block);
        self
    }

    /// Set the explorer lookup fields of a token-balance endpoint.
    pub fn with_token(
        mut self,
        chain_id: impl Into<String>,
        contract_address: impl Into<String>,
        wallet_address: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        self.chain_id = Some(chain_id.into());
        self.contract_address = Some(contract_address.into());
        self.token_address = Some(wallet_address.into());
        self.api_key = Some(api_key.into());
        self
    }

    pub fn is_inactive(&self) -> bool {
        self.status == EndpointStatus::Inactive
    }

    /// Chain height source of a chain endpoint.
    pub fn height_source(&self) -> Option<&str> {
        match self.kind {
            EndpointKind::RpcChain => self.rpc_address.as_deref(),
            EndpointKind::EvmChain => self.base_address.as_deref(),
            _ => None,
        }
    }

    /// Recovery watcher key, for chain endpoints with a height source.
    pub fn watcher_key(&self) -> Option<WatcherKey> {
        self.height_source()
            .map(|source| WatcherKey::new(self.link.clone(), source))
    }

    /// Canonicalise links after deserialising externally supplied records.
    pub fn normalized(mut self) -> Self {
        self.link = normalize_link(&self.link);
        self.rpc_address = self.rpc_address.as_deref().map(normalize_link);
        self.base_address = self.base_address.as_deref().map(normalize_link);
        self
    }
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Strip trailing slashes and surrounding whitespace.
pub fn normalize_link(link: &str) -> String {
    link.trim().trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_link() {
        assert_eq!(normalize_link("https://a.example.com/status/"), "https://a.example.com/status");
        assert_eq!(normalize_link(" https://a.example.com// "), "https://a.example.com");
        assert_eq!(normalize_link("https://a.example.com"), "https://a.example.com");
    }

    #[test]
    fn test_kind_round_trips_through_str() {
        for kind in [
            EndpointKind::Http,
            EndpointKind::Cloudflare,
            EndpointKind::RpcChain,
            EndpointKind::EvmChain,
            EndpointKind::TokenBalance,
        ] {
            assert_eq!(kind.as_str().parse::<EndpointKind>().unwrap(), kind);
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
        assert!("ftp".parse::<EndpointKind>().is_err());
    }

    #[test]
    fn test_watcher_key_uses_kind_specific_source() {
        let rpc = MonitoredEndpoint::new("a", "https://idx.example.com/", EndpointKind::RpcChain)
            .with_rpc_address("https://rpc.example.com/");
        let key = rpc.watcher_key().unwrap();
        assert_eq!(key.to_string(), "https://idx.example.com-https://rpc.example.com");

        let evm = MonitoredEndpoint::new("b", "https://evm-idx.example.com", EndpointKind::EvmChain)
            .with_base_address("https://mainnet.example.io");
        assert_eq!(evm.watcher_key().unwrap().source, "https://mainnet.example.io");

        let http = MonitoredEndpoint::new("c", "https://h.example.com", EndpointKind::Http)
            .with_rpc_address("https://rpc.example.com");
        assert!(http.watcher_key().is_none());
    }

    #[test]
    fn test_minimal_document_deserializes_with_defaults() {
        let json = r#"{"id":"1","name":"Idx","link":"https://idx.example.com/","kind":"rpc-chain","rpc_address":"https://rpc.example.com"}"#;
        let endpoint: MonitoredEndpoint = serde_json::from_str(json).unwrap();
        let endpoint = endpoint.normalized();
        assert_eq!(endpoint.link, "https://idx.example.com");
        assert_eq!(endpoint.status, EndpointStatus::Active);
        assert_eq!(endpoint.downtime_count, 0);
        assert!(endpoint.blocks_behind.is_none());
        assert!(!endpoint.is_alert_sent_for_1m);
    }

    #[test]
    fn test_missing_id_is_generated() {
        let json = r#"{"name":"svc","link":"https://svc.example.com/health","kind":"http"}"#;
        let a: MonitoredEndpoint = serde_json::from_str(json).unwrap();
        let b: MonitoredEndpoint = serde_json::from_str(json).unwrap();
        assert!(!a.id.is_empty());
        assert_ne!(a.id, b.id);
    }
}
