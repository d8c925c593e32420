//! # apiwatch engine
//!
//! The evaluate-and-alert loop.
//!
//! ## Pieces
//!
//! - Evaluators, one per endpoint kind, turning upstream responses into an
//!   [`EvaluationResult`] or a classified [`EvaluationFailure`]
//! - [`StatusStateMachine`] and [`TokenBalanceLadder`], pure functions from
//!   prior record and outcome to the next record plus the alerts to send
//! - [`RecoveryWatcherPool`], short-lived pollers for lagging indexers
//! - [`MonitorService`], which runs passes against an [`EndpointRepository`]
//! - [`Scheduler`], cron-driven pass triggers

pub mod error;
pub mod evaluators;
pub mod fetcher;
pub mod ladder;
pub mod model;
pub mod policy;
pub mod repository;
pub mod scheduler;
pub mod service;
pub mod sqlite;
pub mod state_machine;
pub mod watcher;

pub use error::{EngineError, EvaluationFailure, FetchError};
pub use evaluators::{Evaluate, EvaluationResult, Evaluator, EvaluatorContext};
pub use fetcher::{FetchRequest, RetryPolicy, RetryingFetcher};
pub use ladder::TokenBalanceLadder;
pub use model::{EndpointKind, EndpointStatus, MonitoredEndpoint, WatcherKey};
pub use policy::MonitorPolicy;
pub use repository::{EndpointRepository, MemoryEndpointRepository};
pub use scheduler::{CronJob, Job, Scheduler};
pub use service::{MonitorService, SweepReport};
pub use sqlite::SqliteEndpointRepository;
pub use state_machine::{StatusStateMachine, Transition};
pub use watcher::{PollOutcome, RecoveryWatcherPool};
