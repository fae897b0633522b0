//! Runner supervisor.
//!
//! Top-level process lifecycle: CREATED → RUNNING → DRAINING → STOPPED.
//! Draining starts when the runtime deadline elapses or a stop signal
//! arrives; it stops new dequeues and gives in-flight work a grace
//! period. When the grace period expires first, remaining work is
//! aborted and the exit code reflects the forced stop.

use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;

use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::RunnerConfig;
use crate::error::RunnerError;
use crate::pool::WorkerPool;

/// Process lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    Created,
    Running,
    Draining,
    Stopped,
}

type ShutdownCallback = Box<dyn FnOnce() + Send + 'static>;

/// Supervises the worker pool for a bounded runtime.
pub struct Runner {
    config: RunnerConfig,
    state_tx: watch::Sender<RunnerState>,
    callbacks: Vec<ShutdownCallback>,
}

impl Runner {
    pub fn new(config: RunnerConfig) -> Self {
        let (state_tx, _) = watch::channel(RunnerState::Created);
        Self {
            config,
            state_tx,
            callbacks: Vec::new(),
        }
    }

    /// Current lifecycle phase.
    pub fn state(&self) -> RunnerState {
        *self.state_tx.borrow()
    }

    /// Receiver for observing lifecycle transitions.
    pub fn state_receiver(&self) -> watch::Receiver<RunnerState> {
        self.state_tx.subscribe()
    }

    /// Append a shutdown callback. Callbacks run in registration order
    /// when the runner reaches STOPPED; no deduplication.
    pub fn register_shutdown_callback(&mut self, callback: impl FnOnce() + Send + 'static) {
        self.callbacks.push(Box::new(callback));
    }

    /// Run the worker pool under supervision. Returns the process exit
    /// code: 0 for a clean drain, non-zero for a forced stop or a fatal
    /// pool error.
    pub async fn start(self, drain_tx: watch::Sender<bool>, pool: WorkerPool) -> i32 {
        self.supervise(drain_tx, async move { pool.run().await })
            .await
    }

    /// Supervise an arbitrary workload future.
    ///
    /// The workload is expected to finish soon after `drain_tx` fires;
    /// if it outlives the grace period it is aborted.
    pub async fn supervise<F>(mut self, drain_tx: watch::Sender<bool>, work: F) -> i32
    where
        F: Future<Output = Result<(), RunnerError>> + Send + 'static,
    {
        let started = Instant::now();
        self.state_tx.send_replace(RunnerState::Running);
        info!(
            "Runner started, draining after {}s (grace period {}s)",
            self.config.max_runtime.as_secs(),
            self.config.shutdown_grace.as_secs()
        );

        let mut handle = tokio::spawn(work);

        let mut clean = true;

        let early = tokio::select! {
            _ = tokio::time::sleep(self.config.max_runtime) => {
                info!("Runtime deadline elapsed, entering drain");
                None
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Stop signal received, entering drain");
                None
            }
            result = &mut handle => Some(result),
        };

        let forced = match early {
            Some(result) => {
                // The pool stopped on its own before any drain: either
                // a fatal broker error or a closed workload.
                match result {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        error!("Worker pool failed: {}", e);
                        clean = false;
                    }
                    Err(e) => {
                        error!("Worker pool panicked: {}", e);
                        clean = false;
                    }
                }
                false
            }
            None => {
                self.state_tx.send_replace(RunnerState::Draining);
                let _ = drain_tx.send(true);

                match tokio::time::timeout(self.config.shutdown_grace, &mut handle).await {
                    Ok(Ok(Ok(()))) => false,
                    Ok(Ok(Err(e))) => {
                        error!("Worker pool failed during drain: {}", e);
                        clean = false;
                        false
                    }
                    Ok(Err(e)) => {
                        error!("Worker pool panicked during drain: {}", e);
                        clean = false;
                        false
                    }
                    Err(_) => {
                        warn!(
                            "Grace period of {}s expired, aborting in-flight work",
                            self.config.shutdown_grace.as_secs()
                        );
                        handle.abort();
                        true
                    }
                }
            }
        };

        self.state_tx.send_replace(RunnerState::Stopped);
        info!(
            "Runner stopped after {}s ({})",
            started.elapsed().as_secs(),
            if forced { "forced" } else { "clean" }
        );

        Self::run_callbacks(std::mem::take(&mut self.callbacks));

        if forced || !clean {
            1
        } else {
            0
        }
    }

    /// Run shutdown callbacks in registration order. A panicking
    /// callback is logged and does not stop the rest.
    fn run_callbacks(callbacks: Vec<ShutdownCallback>) {
        for (index, callback) in callbacks.into_iter().enumerate() {
            if catch_unwind(AssertUnwindSafe(callback)).is_err() {
                error!("Shutdown callback {} panicked", index);
            }
        }
    }
}
