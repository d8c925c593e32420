//! Health evaluators, one per endpoint kind.
//!
//! Every evaluator honours the same contract: a reachable upstream yields
//! `Ok(EvaluationResult)` (whose `reachable` flag mirrors the payload's own
//! success marker), anything else yields a classified
//! [`EvaluationFailure`].

mod cdn;
mod chain;
mod http;
mod token;

pub use cdn::CdnEvaluator;
pub use chain::{ChainEvaluator, HeightSource, SyncCheck};
pub use http::HttpEvaluator;
pub use token::{TokenBalanceEvaluator, balance_url};

use std::sync::Arc;

use apiwatch_config::Config;
use apiwatch_notify::UsageReport;
use async_trait::async_trait;
use num_bigint::BigUint;
use serde_json::Value;

use crate::error::{EngineError, EvaluationFailure};
use crate::fetcher::RetryingFetcher;
use crate::model::{EndpointKind, MonitoredEndpoint};

/// Outcome of one evaluator run. Lives for a single pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationResult {
    pub reachable: bool,
    /// Chain height minus indexer height.
    pub blocks_behind: Option<i64>,
    /// Indexer-reported update time, passed through as text.
    pub updated_at: Option<String>,
    pub usage: Option<UsageReport>,
    /// Token balance in base units.
    pub token_balance: Option<BigUint>,
    /// Upstream payload.
    pub raw: Value,
}

impl EvaluationResult {
    pub fn reachable(raw: Value) -> Self {
        Self {
            reachable: true,
            raw,
            ..Default::default()
        }
    }

    pub fn unreachable(raw: Value) -> Self {
        Self {
            reachable: false,
            raw,
            ..Default::default()
        }
    }
}

/// Evaluation contract shared by every endpoint kind.
#[async_trait]
pub trait Evaluate: Send + Sync {
    fn name(&self) -> &'static str;

    async fn evaluate(&self, endpoint: &MonitoredEndpoint) -> Result<EvaluationResult, EvaluationFailure>;
}

/// Shared dependencies of the evaluators.
#[derive(Debug, Clone)]
pub struct EvaluatorContext {
    pub fetcher: RetryingFetcher,
    pub infura_key: Option<String>,
    pub cloudflare_token: Option<String>,
}

impl EvaluatorContext {
    pub fn new(fetcher: RetryingFetcher) -> Self {
        Self {
            fetcher,
            infura_key: None,
            cloudflare_token: None,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, EngineError> {
        let fetcher = RetryingFetcher::from_config(&config.fetch)
            .map_err(|e| EngineError::Config(e.to_string()))?;
        Ok(Self {
            fetcher,
            infura_key: config.infura_key.clone().filter(|k| !k.is_empty()),
            cloudflare_token: config.cloudflare.token.clone().filter(|t| !t.is_empty()),
        })
    }
}

/// The closed set of evaluators, selected by endpoint kind.
pub enum Evaluator {
    Http(HttpEvaluator),
    Chain(ChainEvaluator),
    Cdn(CdnEvaluator),
    TokenBalance(TokenBalanceEvaluator),
}

impl Evaluator {
    pub fn for_kind(kind: EndpointKind, ctx: Arc<EvaluatorContext>) -> Self {
        match kind {
            EndpointKind::Http => Evaluator::Http(HttpEvaluator::new(ctx)),
            EndpointKind::RpcChain => Evaluator::Chain(ChainEvaluator::new(ctx, HeightSource::Tendermint)),
            EndpointKind::EvmChain => Evaluator::Chain(ChainEvaluator::new(ctx, HeightSource::Evm)),
            EndpointKind::Cloudflare => Evaluator::Cdn(CdnEvaluator::new(ctx)),
            EndpointKind::TokenBalance => Evaluator::TokenBalance(TokenBalanceEvaluator::new(ctx)),
        }
    }

    fn inner(&self) -> &dyn Evaluate {
        match self {
            Evaluator::Http(e) => e,
            Evaluator::Chain(e) => e,
            Evaluator::Cdn(e) => e,
            Evaluator::TokenBalance(e) => e,
        }
    }
}

#[async_trait]
impl Evaluate for Evaluator {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    async fn evaluate(&self, endpoint: &MonitoredEndpoint) -> Result<EvaluationResult, EvaluationFailure> {
        self.inner().evaluate(endpoint).await
    }
}

/// `success: true` in an upstream envelope.
pub(crate) fn success_flag(payload: &Value) -> bool {
    payload.get("success").and_then(Value::as_bool).unwrap_or(false)
}

/// Unsigned integer given either as a JSON number or a decimal string.
pub(crate) fn json_u64(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

/// Number given either as a JSON number or a string.
pub(crate) fn json_f64(value: &Value) -> Option<f64> {
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}
