//! Feedback event reporter.

use std::time::Duration;

use reqwest::Client;
use tracing::{debug, warn};

use vidtask_models::FeedbackEvent;

use crate::error::{FeedbackError, FeedbackResult};

/// Header carrying the shared API key.
pub const API_KEY_HEADER: &str = "X-Api-Key";

/// Reporter configuration.
#[derive(Debug, Clone)]
pub struct FeedbackConfig {
    /// Feedback endpoint URL
    pub url: String,
    /// Shared API key attached to each request
    pub api_key: String,
    /// Per-request timeout
    pub request_timeout: Duration,
    /// Total delivery attempts per event (initial + retries)
    pub max_attempts: u32,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:6000/gateway".to_string(),
            api_key: String::new(),
            request_timeout: Duration::from_secs(5),
            max_attempts: 2,
        }
    }
}

impl FeedbackConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("API_FEEDBACK_URL")
                .unwrap_or_else(|_| "http://localhost:6000/gateway".to_string()),
            api_key: std::env::var("API_KEY").unwrap_or_default(),
            ..Default::default()
        }
    }
}

/// Client for the external feedback endpoint.
#[derive(Clone)]
pub struct FeedbackReporter {
    http: Client,
    config: FeedbackConfig,
}

impl FeedbackReporter {
    /// Create a new reporter.
    pub fn new(config: FeedbackConfig) -> FeedbackResult<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| FeedbackError::ClientBuild(e.to_string()))?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> FeedbackResult<Self> {
        Self::new(FeedbackConfig::from_env())
    }

    /// Report an event without blocking the caller.
    ///
    /// Delivery runs on its own task; a failed delivery is logged and
    /// the event is dropped. Must be called from within a runtime.
    pub fn report(&self, event: FeedbackEvent) {
        let reporter = self.clone();
        tokio::spawn(async move {
            if let Err(e) = reporter.deliver(&event).await {
                warn!(
                    task_id = %event.task_id,
                    job_name = %event.job_name,
                    status = %event.status,
                    "Dropping feedback event after failed delivery: {}",
                    e
                );
            }
        });
    }

    /// Deliver an event, with one bounded re-attempt.
    ///
    /// Any non-2xx response counts as a failed attempt.
    pub async fn deliver(&self, event: &FeedbackEvent) -> FeedbackResult<()> {
        let mut last_err: Option<FeedbackError> = None;

        for attempt in 1..=self.config.max_attempts.max(1) {
            if attempt > 1 {
                tokio::time::sleep(Duration::from_millis(500)).await;
            }

            match self.post(event).await {
                Ok(()) => {
                    debug!(
                        task_id = %event.task_id,
                        status = %event.status,
                        "Delivered feedback event"
                    );
                    return Ok(());
                }
                Err(e) => {
                    debug!(
                        task_id = %event.task_id,
                        "Feedback delivery attempt {} failed: {}",
                        attempt,
                        e
                    );
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.expect("at least one attempt was made"))
    }

    async fn post(&self, event: &FeedbackEvent) -> FeedbackResult<()> {
        let response = self
            .http
            .post(&self.config.url)
            .header(API_KEY_HEADER, &self.config.api_key)
            .json(event)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(FeedbackError::Rejected(response.status()))
        }
    }
}
