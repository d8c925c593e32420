//! Outbound requests with linear-backoff retry.

use std::future::Future;
use std::time::Duration;

use apiwatch_config::FetchConfig;
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::FetchError;

/// Retry configuration.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Attempt `n` (from 1) is followed by a sleep of `n * base_delay`.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &FetchConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: config.backoff_base(),
        }
    }

    /// Delay after the given failed attempt.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

/// Run `operation` until it succeeds or `policy.max_attempts` is used up.
///
/// The last error is returned unchanged.
pub async fn retry<F, Fut, T, E>(policy: &RetryPolicy, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= attempts => return Err(e),
            Err(e) => {
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Fetch failed (attempt {}/{}): {}, retrying",
                    attempt,
                    attempts,
                    e
                );
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// HTTP method of a [`FetchRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// A request that can be replayed on every attempt.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    pub url: String,
    pub bearer: Option<String>,
    pub json: Option<Value>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            bearer: None,
            json: None,
        }
    }

    pub fn post_json(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            bearer: None,
            json: Some(body),
        }
    }

    pub fn bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }
}

/// HTTP client shared by the sweep and every watcher.
///
/// Cloning is cheap; clones share one connection pool.
#[derive(Debug, Clone)]
pub struct RetryingFetcher {
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl RetryingFetcher {
    pub fn new(policy: RetryPolicy, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Transport(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, policy })
    }

    pub fn from_config(config: &FetchConfig) -> Result<Self, FetchError> {
        Self::new(RetryPolicy::from_config(config), config.timeout())
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetch a body, retrying transport failures and non-2xx responses.
    pub async fn fetch(&self, request: &FetchRequest, max_attempts: u32) -> Result<String, FetchError> {
        let policy = RetryPolicy {
            max_attempts,
            ..self.policy.clone()
        };
        retry(&policy, move || self.send_once(request)).await
    }

    /// Fetch and decode JSON with the configured attempt count.
    ///
    /// A body that is not JSON is not retried.
    pub async fn fetch_json(&self, request: &FetchRequest) -> Result<Value, FetchError> {
        let body = self.fetch(request, self.policy.max_attempts).await?;
        serde_json::from_str(&body).map_err(|e| FetchError::Decode(e.to_string()))
    }

    async fn send_once(&self, request: &FetchRequest) -> Result<String, FetchError> {
        debug!(url = %request.url, "Fetching");
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };
        if let Some(ref token) = request.bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(ref body) = request.json {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        if status.is_success() {
            Ok(body)
        } else {
            Err(FetchError::Status {
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use parking_lot::Mutex;
    use tokio::time::Instant;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher(max_attempts: u32) -> RetryingFetcher {
        RetryingFetcher::new(
            RetryPolicy {
                max_attempts,
                base_delay: Duration::from_millis(1),
            },
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_delay_is_linear() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_sleeps_twice_with_increasing_delays() {
        let calls = AtomicU32::new(0);
        let seen: Mutex<Vec<Instant>> = Mutex::new(Vec::new());
        let policy = RetryPolicy::default();

        let result: Result<&str, String> = retry(&policy, || {
            seen.lock().push(Instant::now());
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(format!("failure {}", n))
                } else {
                    Ok("body")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "body");
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let seen = seen.lock();
        let first_gap = seen[1] - seen[0];
        let second_gap = seen[2] - seen[1];
        assert_eq!(first_gap, Duration::from_millis(200));
        assert_eq!(second_gap, Duration::from_millis(400));
        assert!(second_gap > first_gap);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_surfaces_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = retry(&RetryPolicy::default(), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { Err(format!("failure {}", n)) }
        })
        .await;

        assert_eq!(result.unwrap_err(), "failure 2");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_attempts_still_tries_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy {
            max_attempts: 0,
            ..Default::default()
        };
        let counter = calls.clone();
        let _: Result<(), String> = retry(&policy, || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err("no".to_string()) }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fetch_retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .expect(3)
            .mount(&server)
            .await;

        let err = fetcher(3)
            .fetch(&FetchRequest::get(format!("{}/status", server.uri())), 3)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            FetchError::Status {
                status: 502,
                body: "bad gateway".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_fetch_json_sends_bearer_and_decodes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("authorization", "Bearer s3cret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"success": true})))
            .expect(1)
            .mount(&server)
            .await;

        let value = fetcher(3)
            .fetch_json(&FetchRequest::get(server.uri()).bearer("s3cret"))
            .await
            .unwrap();
        assert_eq!(value["success"], true);
    }

    #[tokio::test]
    async fn test_fetch_json_does_not_retry_bad_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .expect(1)
            .mount(&server)
            .await;

        let err = fetcher(3)
            .fetch_json(&FetchRequest::post_json(server.uri(), serde_json::json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Decode(_)));
    }
}
