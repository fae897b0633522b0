//! Task identity, status, and queued invocation types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a task invocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    /// Generate a new random task ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status of a task invocation.
///
/// Serialized with the broker's uppercase labels. `Timeout` is a
/// client-side label as well: a submitter whose poll budget runs out
/// reports it without the broker ever storing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Waiting in the queue
    #[default]
    Pending,
    /// Picked up by a worker
    Started,
    /// Failed and scheduled for another attempt
    Retry,
    /// Completed successfully
    Success,
    /// Failed terminally
    Failure,
    /// Exceeded its execution timeout
    Timeout,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Started => "STARTED",
            TaskStatus::Retry => "RETRY",
            TaskStatus::Success => "SUCCESS",
            TaskStatus::Failure => "FAILURE",
            TaskStatus::Timeout => "TIMEOUT",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Success | TaskStatus::Failure | TaskStatus::Timeout
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A queued invocation of a registered job.
///
/// This is the payload stored in the broker stream. The attempt counter
/// starts at 1 and is incremented each time a retry is scheduled, so a
/// dequeued message always knows which attempt it represents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMessage {
    /// Unique task ID
    pub task_id: TaskId,
    /// Registered job name
    pub job_name: String,
    /// JSON object of job arguments
    pub args: serde_json::Value,
    /// Submission timestamp
    pub submitted_at: DateTime<Utc>,
    /// 1-based attempt number
    #[serde(default = "default_attempt")]
    pub attempt: u32,
}

fn default_attempt() -> u32 {
    1
}

impl TaskMessage {
    pub fn new(job_name: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            task_id: TaskId::new(),
            job_name: job_name.into(),
            args,
            submitted_at: Utc::now(),
            attempt: 1,
        }
    }

    /// Build the message for the next attempt of this invocation.
    pub fn next_attempt(&self) -> Self {
        Self {
            attempt: self.attempt + 1,
            ..self.clone()
        }
    }
}
