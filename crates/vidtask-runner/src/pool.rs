//! Worker pool.
//!
//! Dequeues invocations from the broker as a consumer-group member and
//! dispatches them to registered job handles, up to a bounded number of
//! concurrent executions. Additional ready work stays in the broker;
//! nothing is buffered in-process. Deliveries stranded in the consumer
//! group's pending list by a crashed runner are periodically reclaimed.
//! Once the drain signal fires, the pool stops dequeuing and waits for
//! in-flight work.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use vidtask_feedback::FeedbackReporter;
use vidtask_jobs::JobRegistry;
use vidtask_models::{ExecutionResult, FeedbackEvent, TaskMessage, TaskResult, TaskStatus};
use vidtask_queue::JobQueue;

use crate::config::RunnerConfig;
use crate::error::RunnerResult;

/// How often the delayed-retry set is checked for due entries.
const RETRY_PUMP_INTERVAL: Duration = Duration::from_secs(1);

/// How often the group's pending list is scanned for stranded deliveries.
const CLAIM_INTERVAL: Duration = Duration::from_secs(30);

/// Idle threshold before another consumer's delivery is reclaimed.
const CLAIM_MIN_IDLE: Duration = Duration::from_secs(300);

/// Concurrency-bounded dispatcher for queued invocations.
pub struct WorkerPool {
    config: RunnerConfig,
    queue: Arc<JobQueue>,
    registry: Arc<JobRegistry>,
    reporter: FeedbackReporter,
    semaphore: Arc<Semaphore>,
    drain_rx: watch::Receiver<bool>,
    consumer_name: String,
}

impl WorkerPool {
    /// Create a new worker pool draining on `drain_rx`.
    pub fn new(
        config: RunnerConfig,
        queue: JobQueue,
        registry: JobRegistry,
        reporter: FeedbackReporter,
        drain_rx: watch::Receiver<bool>,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        let consumer_name = format!("runner-{}", Uuid::new_v4());

        Self {
            config,
            queue: Arc::new(queue),
            registry: Arc::new(registry),
            reporter,
            semaphore,
            drain_rx,
            consumer_name,
        }
    }

    /// Run the pool until drained.
    ///
    /// Returns once the drain signal has fired and all in-flight
    /// invocations have completed. A broker failure at startup is
    /// fatal; transient consume errors back off and continue.
    pub async fn run(&self) -> RunnerResult<()> {
        info!(
            "Starting worker pool '{}' with {} max concurrent jobs ({} jobs registered)",
            self.consumer_name,
            self.config.max_concurrent_jobs,
            self.registry.len()
        );

        self.queue.init().await?;

        // Move due retries back onto the stream on a coarse interval.
        let pump_queue = Arc::clone(&self.queue);
        let mut pump_drain = self.drain_rx.clone();
        let pump_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(RETRY_PUMP_INTERVAL);
            loop {
                tokio::select! {
                    _ = pump_drain.changed() => {
                        if *pump_drain.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        if let Err(e) = pump_queue.pump_due_retries().await {
                            warn!("Failed to pump due retries: {}", e);
                        }
                    }
                }
            }
        });

        // Recover deliveries stranded in the pending list by a crashed
        // or torn-down runner. Claimed work is handed to the main loop
        // so it lands in the same in-flight set.
        let (claim_tx, mut claim_rx) = mpsc::channel::<Vec<(String, TaskMessage)>>(4);
        let claim_queue = Arc::clone(&self.queue);
        let claim_consumer = self.consumer_name.clone();
        let mut claim_drain = self.drain_rx.clone();
        let claim_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(CLAIM_INTERVAL);
            loop {
                tokio::select! {
                    _ = claim_drain.changed() => {
                        if *claim_drain.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        match claim_queue
                            .claim_pending(&claim_consumer, CLAIM_MIN_IDLE, 5)
                            .await
                        {
                            Ok(claimed) if !claimed.is_empty() => {
                                info!("Claimed {} stranded deliveries", claimed.len());
                                if claim_tx.send(claimed).await.is_err() {
                                    break;
                                }
                            }
                            Ok(_) => {}
                            Err(e) => {
                                warn!("Failed to claim stranded deliveries: {}", e);
                            }
                        }
                    }
                }
            }
        });

        let mut drain_rx = self.drain_rx.clone();

        // In-flight invocations. Dropping the set aborts them, so an
        // aborted pool takes its running children down with it via
        // kill-on-drop.
        let mut in_flight = JoinSet::new();

        loop {
            tokio::select! {
                _ = drain_rx.changed() => {
                    if *drain_rx.borrow() {
                        info!("Drain signal received, no new invocations will be dequeued");
                        break;
                    }
                }
                Some(result) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = result {
                        if e.is_panic() {
                            error!("Invocation task panicked: {}", e);
                        }
                    }
                }
                Some(claimed) = claim_rx.recv() => {
                    self.dispatch(&mut in_flight, claimed).await;
                }
                result = self.consume_once() => {
                    match result {
                        Ok(tasks) => self.dispatch(&mut in_flight, tasks).await,
                        Err(e) => {
                            error!("Error consuming invocations: {}", e);
                            // Back off on broker errors
                            tokio::time::sleep(Duration::from_secs(5)).await;
                        }
                    }
                }
            }
        }

        pump_task.abort();
        claim_task.abort();

        info!("Waiting for in-flight invocations to complete...");
        while let Some(result) = in_flight.join_next().await {
            if let Err(e) = result {
                if e.is_panic() {
                    error!("Invocation task panicked: {}", e);
                }
            }
        }

        info!("Worker pool stopped");
        Ok(())
    }

    /// Dequeue up to the free worker slots.
    async fn consume_once(&self) -> RunnerResult<Vec<(String, TaskMessage)>> {
        let available = self.semaphore.available_permits();
        if available == 0 {
            // All slots busy; backpressure stays in the broker.
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(Vec::new());
        }

        let tasks = self
            .queue
            .consume(&self.consumer_name, 1000, available.min(5))
            .await?;

        if !tasks.is_empty() {
            debug!("Consumed {} invocations from queue", tasks.len());
        }

        Ok(tasks)
    }

    /// Spawn each invocation into the in-flight set under a worker permit.
    async fn dispatch(&self, in_flight: &mut JoinSet<()>, tasks: Vec<(String, TaskMessage)>) {
        for (message_id, task) in tasks {
            let queue = Arc::clone(&self.queue);
            let registry = Arc::clone(&self.registry);
            let reporter = self.reporter.clone();
            let retry_delay = self.config.retry_delay;

            let permit = match self.semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break, // semaphore closed, pool is going down
            };

            in_flight.spawn(async move {
                let _permit = permit;
                Self::execute_task(queue, registry, reporter, retry_delay, message_id, task).await;
            });
        }
    }

    /// Execute a single dequeued invocation with retry handling.
    async fn execute_task(
        queue: Arc<JobQueue>,
        registry: Arc<JobRegistry>,
        reporter: FeedbackReporter,
        retry_delay: Duration,
        message_id: String,
        task: TaskMessage,
    ) {
        let task_id = task.task_id.clone();

        let Some(handle) = registry.get(&task.job_name) else {
            // Deterministic, not retried.
            error!(
                task_id = %task_id,
                "Unknown job '{}', failing invocation",
                task.job_name
            );
            let result = ExecutionResult::failed(format!("Unknown job: {}", task.job_name));
            reporter.report(FeedbackEvent::new(
                task_id.clone(),
                &task.job_name,
                TaskStatus::Failure,
                serde_json::to_value(&result).unwrap_or_default(),
            ));
            if let Err(e) = queue
                .store_result(&task_id, &TaskResult::terminal(TaskStatus::Failure, result))
                .await
            {
                error!(task_id = %task_id, "Failed to store result: {}", e);
            }
            queue.ack(&message_id).await.ok();
            return;
        };

        info!(
            task_id = %task_id,
            job_name = %task.job_name,
            attempt = task.attempt,
            "Executing invocation"
        );

        if let Err(e) = queue.set_status(&task_id, TaskStatus::Started).await {
            warn!(task_id = %task_id, "Failed to record STARTED status: {}", e);
        }

        let outcome = handle.invoke(&task, &reporter).await;

        if outcome.status == TaskStatus::Success {
            info!(task_id = %task_id, "Invocation completed successfully");
            if let Err(e) = queue
                .store_result(
                    &task_id,
                    &TaskResult::terminal(TaskStatus::Success, outcome.result),
                )
                .await
            {
                error!(task_id = %task_id, "Failed to store result: {}", e);
            }
        } else if outcome.retryable && task.attempt <= handle.max_retries() {
            info!(
                task_id = %task_id,
                "Attempt {}/{} failed, scheduling retry",
                task.attempt,
                handle.max_retries() + 1
            );
            if let Err(e) = queue.schedule_retry(&task, retry_delay).await {
                // Could not schedule: fail terminally rather than lose
                // track of the invocation.
                error!(task_id = %task_id, "Failed to schedule retry: {}", e);
                queue
                    .store_result(
                        &task_id,
                        &TaskResult::terminal(outcome.status, outcome.result),
                    )
                    .await
                    .ok();
            }
        } else {
            warn!(
                task_id = %task_id,
                "Invocation failed terminally with status {} after {} attempt(s)",
                outcome.status,
                task.attempt
            );
            if let Err(e) = queue
                .store_result(
                    &task_id,
                    &TaskResult::terminal(outcome.status, outcome.result),
                )
                .await
            {
                error!(task_id = %task_id, "Failed to store result: {}", e);
            }
        }

        if let Err(e) = queue.ack(&message_id).await {
            error!(task_id = %task_id, "Failed to ack message: {}", e);
        }
    }
}
