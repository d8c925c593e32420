//! CDN usage evaluator.

use std::sync::Arc;

use apiwatch_notify::{UsageCounters, UsageReport};
use async_trait::async_trait;
use rust_decimal::prelude::*;
use serde_json::Value;

use super::{Evaluate, EvaluationResult, EvaluatorContext, json_f64, success_flag};
use crate::error::EvaluationFailure;
use crate::fetcher::FetchRequest;
use crate::model::MonitoredEndpoint;

/// Reads image or video quota usage from a Cloudflare-style usage API.
///
/// An image payload carries `result.count.{current,allowed}`; anything else
/// is read as video storage minutes.
pub struct CdnEvaluator {
    ctx: Arc<EvaluatorContext>,
}

impl CdnEvaluator {
    pub fn new(ctx: Arc<EvaluatorContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Evaluate for CdnEvaluator {
    fn name(&self) -> &'static str {
        "cloudflare"
    }

    async fn evaluate(&self, endpoint: &MonitoredEndpoint) -> Result<EvaluationResult, EvaluationFailure> {
        let mut request = FetchRequest::get(&endpoint.link);
        if let Some(ref token) = self.ctx.cloudflare_token {
            request = request.bearer(token.clone());
        }

        let payload = self
            .ctx
            .fetcher
            .fetch_json(&request)
            .await
            .map_err(|e| EvaluationFailure::Unreachable(e.to_string()))?;
        if !success_flag(&payload) {
            return Ok(EvaluationResult::unreachable(payload));
        }

        let usage = usage_report(&payload)?;
        let mut result = EvaluationResult::reachable(payload);
        result.usage = Some(usage);
        Ok(result)
    }
}

/// Build the usage report from a successful envelope.
pub(crate) fn usage_report(payload: &Value) -> Result<UsageReport, EvaluationFailure> {
    let result = payload
        .get("result")
        .ok_or_else(|| EvaluationFailure::Data("usage payload has no result".to_string()))?;

    if let Some(count) = result.get("count") {
        let current = number(count, "current")?;
        let allowed = number(count, "allowed")?;
        let percentage = ratio(current, allowed, "count.allowed")?;
        return Ok(UsageReport {
            percentage,
            counters: UsageCounters::Image { current, allowed },
        });
    }

    let minutes = number(result, "totalStorageMinutes")?;
    let limit = number(result, "totalStorageMinutesLimit")?;
    let video_count = match result.get("videoCount") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };
    let percentage = ratio(minutes, limit, "totalStorageMinutesLimit")?;
    Ok(UsageReport {
        percentage,
        counters: UsageCounters::Video {
            video_count,
            total_storage_minutes: minutes,
            total_storage_minutes_limit: limit,
        },
    })
}

fn number(value: &Value, field: &str) -> Result<f64, EvaluationFailure> {
    value
        .get(field)
        .and_then(json_f64)
        .ok_or_else(|| EvaluationFailure::Data(format!("usage payload has no numeric {}", field)))
}

/// `used / limit`, half-up to two decimals. A zero limit is a data error.
fn ratio(used: f64, limit: f64, field: &str) -> Result<f64, EvaluationFailure> {
    let invalid = || EvaluationFailure::Data(format!("{} is not a usable denominator", field));
    let used = Decimal::from_f64(used).ok_or_else(invalid)?;
    let limit = Decimal::from_f64(limit).ok_or_else(invalid)?;
    if limit.is_zero() {
        return Err(invalid());
    }
    used.checked_div(limit)
        .map(|r| r.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|r| r.to_f64())
        .ok_or_else(invalid)
}
