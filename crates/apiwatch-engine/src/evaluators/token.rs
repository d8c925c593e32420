//! Token balance evaluator.

use std::sync::Arc;

use async_trait::async_trait;
use num_bigint::BigUint;
use serde_json::Value;
use url::Url;

use super::{Evaluate, EvaluationResult, EvaluatorContext};
use crate::error::EvaluationFailure;
use crate::fetcher::FetchRequest;
use crate::model::MonitoredEndpoint;

/// Reads an ERC-20 balance through an Etherscan-style explorer API.
///
/// Reachable iff the payload's `status` is the string `"1"`.
pub struct TokenBalanceEvaluator {
    ctx: Arc<EvaluatorContext>,
}

impl TokenBalanceEvaluator {
    pub fn new(ctx: Arc<EvaluatorContext>) -> Self {
        Self { ctx }
    }
}

/// Explorer lookup URL for a token-balance endpoint.
pub fn balance_url(endpoint: &MonitoredEndpoint) -> Result<Url, EvaluationFailure> {
    let base = endpoint.api_url.as_deref().unwrap_or(&endpoint.link);
    let chain_id = required(&endpoint.chain_id, "chain_id")?;
    let contract = required(&endpoint.contract_address, "contract_address")?;
    let wallet = required(&endpoint.token_address, "token_address")?;
    let api_key = required(&endpoint.api_key, "api_key")?;

    Url::parse_with_params(
        base,
        &[
            ("chainid", chain_id),
            ("module", "account"),
            ("action", "tokenbalance"),
            ("contractaddress", contract),
            ("address", wallet),
            ("tag", "latest"),
            ("apikey", api_key),
        ],
    )
    .map_err(|e| EvaluationFailure::Data(format!("invalid explorer url {}: {}", base, e)))
}

fn required<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str, EvaluationFailure> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| EvaluationFailure::Data(format!("token-balance endpoint has no {}", field)))
}

#[async_trait]
impl Evaluate for TokenBalanceEvaluator {
    fn name(&self) -> &'static str {
        "token-balance"
    }

    async fn evaluate(&self, endpoint: &MonitoredEndpoint) -> Result<EvaluationResult, EvaluationFailure> {
        let url = balance_url(endpoint)?;
        let payload = self
            .ctx
            .fetcher
            .fetch_json(&FetchRequest::get(url.as_str()))
            .await
            .map_err(|e| EvaluationFailure::Unreachable(e.to_string()))?;

        if payload.get("status").and_then(Value::as_str) != Some("1") {
            return Ok(EvaluationResult::unreachable(payload));
        }

        let balance = payload
            .get("result")
            .and_then(Value::as_str)
            .and_then(|s| s.trim().parse::<BigUint>().ok())
            .ok_or_else(|| EvaluationFailure::Data("balance result is not an unsigned integer".to_string()))?;

        let mut result = EvaluationResult::reachable(payload);
        result.token_balance = Some(balance);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::{RetryPolicy, RetryingFetcher};
    use crate::model::EndpointKind;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn endpoint(base: &str) -> MonitoredEndpoint {
        MonitoredEndpoint::new("Treasury", base, EndpointKind::TokenBalance)
            .with_token("8453", "0xToken", "0xWallet", "KEY")
    }

    fn evaluator() -> TokenBalanceEvaluator {
        let fetcher = RetryingFetcher::new(
            RetryPolicy {
                max_attempts: 1,
                base_delay: Duration::from_millis(1),
            },
            Duration::from_secs(5),
        )
        .unwrap();
        TokenBalanceEvaluator::new(Arc::new(EvaluatorContext::new(fetcher)))
    }

    #[test]
    fn test_balance_url() {
        let url = balance_url(&endpoint("https://api.etherscan.io/v2/api")).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.etherscan.io/v2/api?chainid=8453&module=account&action=tokenbalance\
             &contractaddress=0xToken&address=0xWallet&tag=latest&apikey=KEY"
        );
    }

    #[test]
    fn test_balance_url_prefers_api_url() {
        let mut ep = endpoint("https://ignored.example.com");
        ep.api_url = Some("https://explorer.example.com/api".to_string());
        assert!(balance_url(&ep).unwrap().as_str().starts_with("https://explorer.example.com/api?"));
    }

    #[test]
    fn test_balance_url_requires_fields() {
        let ep = MonitoredEndpoint::new("t", "https://x.example.com", EndpointKind::TokenBalance);
        assert!(matches!(balance_url(&ep), Err(EvaluationFailure::Data(_))));
    }

    #[tokio::test]
    async fn test_balance_beyond_u64() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("action", "tokenbalance"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "1",
                "message": "OK",
                "result": "900000000000000000000000"
            })))
            .mount(&server)
            .await;

        let result = evaluator().evaluate(&endpoint(&server.uri())).await.unwrap();
        assert!(result.reachable);
        let expected = BigUint::from(900_000u64) * BigUint::from(10u32).pow(18);
        assert_eq!(result.token_balance, Some(expected));
    }

    #[tokio::test]
    async fn test_status_other_than_one_is_unreachable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "0",
                "message": "NOTOK",
                "result": "Invalid API Key"
            })))
            .mount(&server)
            .await;

        let result = evaluator().evaluate(&endpoint(&server.uri())).await.unwrap();
        assert!(!result.reachable);
        assert!(result.token_balance.is_none());
    }
}
