//! ReelPilot pipeline worker.
//!
//! Each invocation of the worker claims at most one production project,
//! runs a bounded amount of work for its current stage, persists the result
//! as a single conditional write, and exits. Long pipelines finish over many
//! short invocations instead of one long-running process.

pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod retry;
pub mod scenes;
pub mod stages;

pub use config::WorkerConfig;
pub use engine::{PipelineEngine, Ports};
pub use error::{WorkerError, WorkerResult};
pub use logging::ProjectLogger;
pub use retry::{run_with_retry, Budget, RetryConfig, RetryResult};
