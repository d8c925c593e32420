//! Indexer-versus-chain evaluators.
//!
//! The indexer status is fetched first; only a reachable indexer gets its
//! height compared against the chain. A failing height source is reported
//! as [`EvaluationFailure::RpcFailure`], never as unreachability.

use std::sync::Arc;

use async_trait::async_trait;
use num_bigint::BigUint;
use serde_json::{Value, json};

use super::{Evaluate, EvaluationResult, EvaluatorContext, json_u64, success_flag};
use crate::error::EvaluationFailure;
use crate::fetcher::FetchRequest;
use crate::model::{EndpointKind, MonitoredEndpoint};

/// Where the authoritative chain height comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeightSource {
    /// `GET <rpc_address>/block?height`, height at `result.block.header.height`.
    Tendermint,
    /// `eth_blockNumber` against `<base_address>/v3/<infura_key>`.
    Evm,
}

impl HeightSource {
    pub fn for_kind(kind: EndpointKind) -> Option<Self> {
        match kind {
            EndpointKind::RpcChain => Some(HeightSource::Tendermint),
            EndpointKind::EvmChain => Some(HeightSource::Evm),
            _ => None,
        }
    }

    /// Fetch the current chain height for `endpoint`.
    pub async fn height(
        &self,
        ctx: &EvaluatorContext,
        endpoint: &MonitoredEndpoint,
    ) -> Result<u64, EvaluationFailure> {
        match self {
            HeightSource::Tendermint => {
                let rpc = endpoint.rpc_address.as_deref().ok_or_else(|| {
                    EvaluationFailure::RpcFailure("no rpc_address configured".to_string())
                })?;
                let payload = ctx
                    .fetcher
                    .fetch_json(&FetchRequest::get(format!("{}/block?height", rpc)))
                    .await
                    .map_err(|e| EvaluationFailure::RpcFailure(e.to_string()))?;
                payload
                    .pointer("/result/block/header/height")
                    .and_then(json_u64)
                    .ok_or_else(|| {
                        EvaluationFailure::RpcFailure("block response has no header height".to_string())
                    })
            }
            HeightSource::Evm => {
                let base = endpoint.base_address.as_deref().ok_or_else(|| {
                    EvaluationFailure::RpcFailure("no base_address configured".to_string())
                })?;
                let key = ctx.infura_key.as_deref().ok_or_else(|| {
                    EvaluationFailure::RpcFailure("infura_key is not configured".to_string())
                })?;
                let body = json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "method": "eth_blockNumber",
                    "params": []
                });
                let payload = ctx
                    .fetcher
                    .fetch_json(&FetchRequest::post_json(format!("{}/v3/{}", base, key), body))
                    .await
                    .map_err(|e| EvaluationFailure::RpcFailure(e.to_string()))?;
                payload
                    .get("result")
                    .and_then(Value::as_str)
                    .and_then(parse_hex_height)
                    .ok_or_else(|| {
                        EvaluationFailure::RpcFailure("eth_blockNumber returned no usable result".to_string())
                    })
            }
        }
    }
}

/// Parse a `0x`-prefixed quantity.
fn parse_hex_height(hex: &str) -> Option<u64> {
    let digits = hex.strip_prefix("0x").or_else(|| hex.strip_prefix("0X"))?;
    let value = BigUint::parse_bytes(digits.as_bytes(), 16)?;
    u64::try_from(&value).ok()
}

/// Indexer status: the raw payload when `success` is set.
async fn indexer_status(
    ctx: &EvaluatorContext,
    endpoint: &MonitoredEndpoint,
) -> Result<Value, EvaluationFailure> {
    ctx.fetcher
        .fetch_json(&FetchRequest::get(&endpoint.link))
        .await
        .map_err(|e| EvaluationFailure::Unreachable(e.to_string()))
}

fn indexer_height(payload: &Value) -> Result<u64, EvaluationFailure> {
    payload
        .pointer("/result/height")
        .and_then(json_u64)
        .ok_or_else(|| EvaluationFailure::Data("indexer status has no result.height".to_string()))
}

fn difference(remote: u64, local: u64) -> i64 {
    (i128::from(remote) - i128::from(local)).clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
}

/// Evaluator for `rpc-chain` and `evm-chain` endpoints.
pub struct ChainEvaluator {
    ctx: Arc<EvaluatorContext>,
    source: HeightSource,
}

impl ChainEvaluator {
    pub fn new(ctx: Arc<EvaluatorContext>, source: HeightSource) -> Self {
        Self { ctx, source }
    }
}

#[async_trait]
impl Evaluate for ChainEvaluator {
    fn name(&self) -> &'static str {
        match self.source {
            HeightSource::Tendermint => "rpc-chain",
            HeightSource::Evm => "evm-chain",
        }
    }

    async fn evaluate(&self, endpoint: &MonitoredEndpoint) -> Result<EvaluationResult, EvaluationFailure> {
        let status = indexer_status(&self.ctx, endpoint).await?;
        if !success_flag(&status) {
            return Ok(EvaluationResult::unreachable(status));
        }

        let local = indexer_height(&status)?;
        let updated_at = status.pointer("/result/updatedAt").and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        });
        let remote = self.source.height(&self.ctx, endpoint).await?;

        let mut result = EvaluationResult::reachable(status);
        result.blocks_behind = Some(difference(remote, local));
        result.updated_at = updated_at;
        Ok(result)
    }
}

/// One recovery-watcher check: is the indexer back within tolerance?
#[derive(Clone)]
pub struct SyncCheck {
    ctx: Arc<EvaluatorContext>,
    endpoint: MonitoredEndpoint,
    source: HeightSource,
}

impl SyncCheck {
    /// `None` for endpoints that are not chain kinds.
    pub fn new(ctx: Arc<EvaluatorContext>, endpoint: MonitoredEndpoint) -> Option<Self> {
        let source = HeightSource::for_kind(endpoint.kind)?;
        Some(Self { ctx, endpoint, source })
    }

    /// Chain height minus indexer height. Any fetch failure is an error.
    pub async fn blocks_behind(&self) -> Result<i64, EvaluationFailure> {
        let status = indexer_status(&self.ctx, &self.endpoint).await?;
        let local = indexer_height(&status)?;
        let remote = self.source.height(&self.ctx, &self.endpoint).await?;
        Ok(difference(remote, local))
    }

    /// Whether both heights are within `tolerance` of each other.
    pub async fn is_synced(&self, tolerance: u64) -> Result<bool, EvaluationFailure> {
        Ok(self.blocks_behind().await?.unsigned_abs() <= tolerance)
    }
}
