//! Executor error types.

use thiserror::Error;

/// Result type for executor operations.
pub type ExecResult<T> = Result<T, ExecError>;

/// Errors that can occur while running an external command.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("Executable not found in PATH: {0}")]
    NotFound(String),

    #[error("Empty command line")]
    EmptyCommand,

    #[error("Command timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExecError {
    /// Whether replaying the same command could plausibly succeed.
    ///
    /// A missing executable or an empty argv is deterministic; timeouts
    /// and spawn IO failures are treated as transient.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExecError::Timeout(_) | ExecError::Io(_))
    }
}
