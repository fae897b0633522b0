//! Job error taxonomy.
//!
//! The variants map directly onto retry policy:
//! - `Validation` is deterministic and never retried
//! - `Transient` and `Timeout` are retried up to the declared count
//! - `Infrastructure` is fatal to the invocation and not retried

use thiserror::Error;

use vidtask_exec::ExecError;
use vidtask_models::TaskStatus;

pub type JobResult<T> = Result<T, JobError>;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("Invocation timed out after {0} seconds")]
    Timeout(u64),

    #[error("Infrastructure error: {0}")]
    Infrastructure(String),
}

impl JobError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    /// Whether another attempt of the same invocation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, JobError::Transient(_) | JobError::Timeout(_))
    }

    /// Terminal status when retries for this failure are exhausted.
    pub fn terminal_status(&self) -> TaskStatus {
        match self {
            JobError::Timeout(_) => TaskStatus::Timeout,
            _ => TaskStatus::Failure,
        }
    }
}

impl From<ExecError> for JobError {
    fn from(e: ExecError) -> Self {
        match e {
            ExecError::NotFound(program) => {
                JobError::Infrastructure(format!("Executable not found in PATH: {}", program))
            }
            ExecError::EmptyCommand => JobError::Validation("Empty command line".to_string()),
            ExecError::Timeout(secs) => JobError::Timeout(secs),
            ExecError::Io(e) => JobError::Transient(format!("IO error: {}", e)),
        }
    }
}

/// Invalid argument payloads are deterministic.
impl From<serde_json::Error> for JobError {
    fn from(e: serde_json::Error) -> Self {
        JobError::Validation(format!("Invalid arguments: {}", e))
    }
}
