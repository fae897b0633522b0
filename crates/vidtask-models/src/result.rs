//! Execution results and result-store records.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::task::TaskStatus;

/// Outcome of one job-body execution.
///
/// Owned by the invocation that produced it; immutable once written to
/// the result store. Job bodies augment the raw command outcome with a
/// `task_info` map describing the resolved input arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// True iff the command exited with code 0
    pub success: bool,
    /// Exit code, absent when the process was killed
    pub exit_code: Option<i32>,
    /// Captured stdout
    pub stdout: String,
    /// Captured stderr
    pub stderr: String,
    /// The argv that was executed
    pub command: Vec<String>,
    /// Wall-clock execution time in milliseconds
    pub duration_ms: u64,
    /// Error message when the invocation failed before or during execution
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Resolved job arguments, filled in by the job body
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub task_info: Map<String, Value>,
}

impl ExecutionResult {
    /// A failed result with no command outcome (validation errors,
    /// missing executables, unknown jobs).
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            command: Vec::new(),
            duration_ms: 0,
            error: Some(error.into()),
            task_info: Map::new(),
        }
    }

    /// Attach resolved-argument metadata.
    pub fn with_task_info(mut self, task_info: Map<String, Value>) -> Self {
        self.task_info = task_info;
        self
    }
}

/// Record stored in the result store, keyed by task ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    /// Current invocation status
    pub status: TaskStatus,
    /// Terminal result payload, present once the invocation finishes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ExecutionResult>,
    /// Error detail for terminal failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskResult {
    pub fn pending() -> Self {
        Self {
            status: TaskStatus::Pending,
            result: None,
            error: None,
        }
    }

    pub fn with_status(status: TaskStatus) -> Self {
        Self {
            status,
            result: None,
            error: None,
        }
    }

    pub fn terminal(status: TaskStatus, result: ExecutionResult) -> Self {
        let error = result.error.clone();
        Self {
            status,
            result: Some(result),
            error,
        }
    }
}
