//! Worker pool and runner supervisor.
//!
//! This crate provides:
//! - The concurrency-bounded worker pool that dequeues invocations and
//!   dispatches them to registered job handles
//! - Retry scheduling against the broker's delayed set
//! - The runner supervisor: runtime deadline, drain, grace period,
//!   ordered shutdown callbacks, process exit code

pub mod config;
pub mod error;
pub mod pool;
pub mod supervisor;

pub use config::RunnerConfig;
pub use error::{RunnerError, RunnerResult};
pub use pool::WorkerPool;
pub use supervisor::{Runner, RunnerState};
