//! Job registry and invocation wrapper.
//!
//! `register` turns a plain async job body into a [`JobHandle`] with
//! uniform behavior: a start feedback event, body execution under the
//! declared timeout, conversion of every failure into a structured
//! [`ExecutionResult`], and a terminal feedback event. The handle is
//! the fault boundary: nothing a body returns or raises reaches the
//! dispatcher as an unhandled fault.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde_json::Value;
use tracing::{debug, info, warn};

use vidtask_feedback::FeedbackReporter;
use vidtask_models::{ExecutionResult, FeedbackEvent, TaskMessage, TaskStatus};

use crate::error::JobResult;

/// Boxed async job body: JSON argument object in, execution result out.
pub type JobFn = Arc<dyn Fn(Value) -> BoxFuture<'static, JobResult<ExecutionResult>> + Send + Sync>;

/// Per-category policy defaults applied at registration.
#[derive(Debug, Clone)]
pub struct RegistryDefaults {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Per-invocation timeout
    pub timeout: Duration,
}

impl Default for RegistryDefaults {
    fn default() -> Self {
        Self {
            max_retries: 1,
            timeout: Duration::from_secs(3600),
        }
    }
}

impl RegistryDefaults {
    /// Create defaults from environment variables.
    pub fn from_env() -> Self {
        Self {
            max_retries: std::env::var("TASK_RETRY_COUNT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1),
            timeout: Duration::from_secs(
                std::env::var("JOB_TIMEOUT_SECONDS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3600),
            ),
        }
    }
}

/// Outcome of one attempt of an invocation.
#[derive(Debug)]
pub struct AttemptOutcome {
    /// Structured result (always present, failures included)
    pub result: ExecutionResult,
    /// Status of this attempt
    pub status: TaskStatus,
    /// Whether the dispatcher may schedule another attempt
    pub retryable: bool,
}

/// A registered, dispatchable job.
pub struct JobHandle {
    name: String,
    category: String,
    max_retries: u32,
    timeout: Duration,
    body: JobFn,
}

impl JobHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    /// Retries after the first attempt.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run one attempt of an invocation.
    ///
    /// Emits exactly one start and one terminal feedback event for the
    /// attempt. Body failures and timeouts come back as a failed
    /// [`ExecutionResult`], never as an error.
    pub async fn invoke(&self, task: &TaskMessage, reporter: &FeedbackReporter) -> AttemptOutcome {
        reporter.report(FeedbackEvent::started(task.task_id.clone(), &self.name));

        debug!(
            task_id = %task.task_id,
            job_name = %self.name,
            attempt = task.attempt,
            "Invoking job body"
        );

        let body = (self.body)(task.args.clone());
        let outcome = match tokio::time::timeout(self.timeout, body).await {
            Ok(Ok(result)) => {
                if result.success {
                    AttemptOutcome {
                        status: TaskStatus::Success,
                        retryable: false,
                        result,
                    }
                } else {
                    // Non-zero command exit: transient, eligible for retry.
                    AttemptOutcome {
                        status: TaskStatus::Failure,
                        retryable: true,
                        result,
                    }
                }
            }
            Ok(Err(e)) => {
                warn!(
                    task_id = %task.task_id,
                    job_name = %self.name,
                    "Job body failed: {}",
                    e
                );
                AttemptOutcome {
                    status: e.terminal_status(),
                    retryable: e.is_retryable(),
                    result: ExecutionResult::failed(e.to_string()),
                }
            }
            Err(_) => {
                warn!(
                    task_id = %task.task_id,
                    job_name = %self.name,
                    "Invocation timed out after {}s",
                    self.timeout.as_secs()
                );
                AttemptOutcome {
                    status: TaskStatus::Timeout,
                    retryable: true,
                    result: ExecutionResult::failed(format!(
                        "Invocation timed out after {} seconds",
                        self.timeout.as_secs()
                    )),
                }
            }
        };

        let payload = serde_json::to_value(&outcome.result).unwrap_or(Value::Null);
        reporter.report(FeedbackEvent::new(
            task.task_id.clone(),
            &self.name,
            outcome.status,
            payload,
        ));

        outcome
    }
}

/// Registry of job handles, keyed by job name.
pub struct JobRegistry {
    defaults: RegistryDefaults,
    handles: HashMap<String, Arc<JobHandle>>,
}

impl JobRegistry {
    pub fn new(defaults: RegistryDefaults) -> Self {
        Self {
            defaults,
            handles: HashMap::new(),
        }
    }

    /// Register a job body under a category.
    ///
    /// Registration is last-write-wins: re-registering a name replaces
    /// the previous handle, so a double registration cannot duplicate
    /// feedback events per invocation.
    pub fn register<F, Fut>(&mut self, category: &str, name: &str, body: F) -> Arc<JobHandle>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = JobResult<ExecutionResult>> + Send + 'static,
    {
        let handle = Arc::new(JobHandle {
            name: name.to_string(),
            category: category.to_string(),
            max_retries: self.defaults.max_retries,
            timeout: self.defaults.timeout,
            body: Arc::new(move |args| Box::pin(body(args))),
        });

        if self
            .handles
            .insert(name.to_string(), Arc::clone(&handle))
            .is_some()
        {
            info!("Replaced existing registration for job '{}'", name);
        } else {
            info!("Registered job '{}' in category '{}'", name, category);
        }

        handle
    }

    /// Look up a handle by job name.
    pub fn get(&self, name: &str) -> Option<Arc<JobHandle>> {
        self.handles.get(name).cloned()
    }

    /// Registered job names.
    pub fn names(&self) -> Vec<&str> {
        self.handles.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}
