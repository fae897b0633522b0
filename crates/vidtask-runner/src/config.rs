//! Runner configuration.

use std::time::Duration;

/// Runner configuration.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Maximum total process runtime before draining starts
    pub max_runtime: Duration,
    /// Grace period for in-flight invocations once draining starts
    pub shutdown_grace: Duration,
    /// Delay before a scheduled retry becomes eligible for dequeue
    pub retry_delay: Duration,
    /// Maximum concurrent invocations
    pub max_concurrent_jobs: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_runtime: Duration::from_secs(21600), // 6 hours
            shutdown_grace: Duration::from_secs(1800), // 30 minutes
            retry_delay: Duration::from_secs(300),
            max_concurrent_jobs: 4,
        }
    }
}

impl RunnerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            max_runtime: Duration::from_secs(
                std::env::var("MAX_RUNTIME_SECONDS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(21600),
            ),
            shutdown_grace: Duration::from_secs(
                std::env::var("SHUTDOWN_GRACE_PERIOD_SECONDS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1800),
            ),
            retry_delay: Duration::from_secs(
                std::env::var("RETRY_DELAY_SECONDS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(300),
            ),
            max_concurrent_jobs: std::env::var("WORKER_MAX_JOBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(4),
        }
    }
}
