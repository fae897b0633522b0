//! Shared data models for the vidtask runner.
//!
//! This crate provides Serde-serializable types for:
//! - Task identities, statuses, and queued invocations
//! - Execution results produced by job bodies
//! - Result-store records
//! - Feedback events sent to the external endpoint

pub mod feedback;
pub mod result;
pub mod task;

pub use feedback::FeedbackEvent;
pub use result::{ExecutionResult, TaskResult};
pub use task::{TaskId, TaskMessage, TaskStatus};
