//! Plain health-check evaluator.

use std::sync::Arc;

use async_trait::async_trait;

use super::{Evaluate, EvaluationResult, EvaluatorContext, success_flag};
use crate::error::EvaluationFailure;
use crate::fetcher::FetchRequest;
use crate::model::MonitoredEndpoint;

/// Reachable iff the link answers with `success: true`.
pub struct HttpEvaluator {
    ctx: Arc<EvaluatorContext>,
}

impl HttpEvaluator {
    pub fn new(ctx: Arc<EvaluatorContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Evaluate for HttpEvaluator {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn evaluate(&self, endpoint: &MonitoredEndpoint) -> Result<EvaluationResult, EvaluationFailure> {
        let payload = self
            .ctx
            .fetcher
            .fetch_json(&FetchRequest::get(&endpoint.link))
            .await
            .map_err(|e| EvaluationFailure::Unreachable(e.to_string()))?;

        if success_flag(&payload) {
            Ok(EvaluationResult::reachable(payload))
        } else {
            Ok(EvaluationResult::unreachable(payload))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::{RetryPolicy, RetryingFetcher};
    use crate::model::EndpointKind;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn evaluator() -> HttpEvaluator {
        let fetcher = RetryingFetcher::new(
            RetryPolicy {
                max_attempts: 2,
                base_delay: Duration::from_millis(1),
            },
            Duration::from_secs(5),
        )
        .unwrap();
        HttpEvaluator::new(Arc::new(EvaluatorContext::new(fetcher)))
    }

    #[tokio::test]
    async fn test_success_flag_means_reachable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"success": true})))
            .mount(&server)
            .await;

        let endpoint = MonitoredEndpoint::new("svc", &format!("{}/health", server.uri()), EndpointKind::Http);
        let result = evaluator().evaluate(&endpoint).await.unwrap();
        assert!(result.reachable);
        assert!(result.blocks_behind.is_none());
    }

    #[tokio::test]
    async fn test_false_flag_is_unreachable_result() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"success": false})))
            .mount(&server)
            .await;

        let endpoint = MonitoredEndpoint::new("svc", &server.uri(), EndpointKind::Http);
        let result = evaluator().evaluate(&endpoint).await.unwrap();
        assert!(!result.reachable);
    }

    #[tokio::test]
    async fn test_transport_failure_is_unreachable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(2)
            .mount(&server)
            .await;

        let endpoint = MonitoredEndpoint::new("svc", &server.uri(), EndpointKind::Http);
        let err = evaluator().evaluate(&endpoint).await.unwrap_err();
        assert!(matches!(err, EvaluationFailure::Unreachable(_)));
    }
}
