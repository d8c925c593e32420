//! Engine errors.

use thiserror::Error;

/// Failure of a single outbound request, after retries.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Connection, timeout or body read failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Non-2xx response.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Body was not the expected JSON.
    #[error("Decode error: {0}")]
    Decode(String),
}

/// Classified outcome of a failed evaluation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EvaluationFailure {
    /// Primary link could not be fetched or reported failure.
    #[error("Unreachable: {0}")]
    Unreachable(String),

    /// Primary link fine, chain height source failed.
    #[error("RPC failure: {0}")]
    RpcFailure(String),

    /// Payload malformed or unusable. Leaves the record untouched.
    #[error("Data error: {0}")]
    Data(String),
}

/// Engine error types.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Repository read or write failed.
    #[error("Repository error: {0}")]
    Repository(String),

    #[error("Evaluation failed: {0}")]
    Evaluation(#[from] EvaluationFailure),

    /// Bad cron expression or scheduler failure.
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    /// Engine could not be built from the given configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<tokio_rusqlite::Error> for EngineError {
    fn from(e: tokio_rusqlite::Error) -> Self {
        EngineError::Repository(e.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Repository(format!("document encoding: {}", e))
    }
}
