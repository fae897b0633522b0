//! Feedback events delivered to the external endpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::task::{TaskId, TaskStatus};

/// Lifecycle event posted to the feedback endpoint.
///
/// Emitted when an attempt starts and when it reaches a terminal
/// outcome. Delivery is best effort; the event is never the authority
/// on invocation status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackEvent {
    /// Task ID of the invocation
    pub task_id: TaskId,
    /// Registered job name
    pub job_name: String,
    /// Status at the time of emission
    pub status: TaskStatus,
    /// Execution result or error detail
    pub payload: Value,
    /// Emission timestamp
    pub timestamp: DateTime<Utc>,
}

impl FeedbackEvent {
    pub fn new(
        task_id: TaskId,
        job_name: impl Into<String>,
        status: TaskStatus,
        payload: Value,
    ) -> Self {
        Self {
            task_id,
            job_name: job_name.into(),
            status,
            payload,
            timestamp: Utc::now(),
        }
    }

    /// Event for the start of an attempt.
    pub fn started(task_id: TaskId, job_name: impl Into<String>) -> Self {
        Self::new(task_id, job_name, TaskStatus::Started, Value::Null)
    }
}
