//! Feedback delivery error types.

use thiserror::Error;

pub type FeedbackResult<T> = Result<T, FeedbackError>;

#[derive(Debug, Error)]
pub enum FeedbackError {
    #[error("Endpoint rejected event with status {0}")]
    Rejected(reqwest::StatusCode),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Client build failed: {0}")]
    ClientBuild(String),
}
