//! Runner error types.

use thiserror::Error;

pub type RunnerResult<T> = Result<T, RunnerError>;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Queue error: {0}")]
    Queue(#[from] vidtask_queue::QueueError),

    #[error("Startup failed: {0}")]
    Startup(String),
}

impl RunnerError {
    pub fn startup(msg: impl Into<String>) -> Self {
        Self::Startup(msg.into())
    }
}
