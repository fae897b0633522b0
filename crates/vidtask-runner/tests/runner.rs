//! End-to-end runner tests against a local broker.
//!
//! These tests require a local Redis instance.
//! Run with: `cargo test -p vidtask-runner -- --ignored`

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use vidtask_feedback::{FeedbackConfig, FeedbackReporter};
use vidtask_jobs::{JobError, JobRegistry, RegistryDefaults};
use vidtask_models::{ExecutionResult, TaskStatus};
use vidtask_queue::{BrokerConfig, JobQueue};
use vidtask_runner::{Runner, RunnerConfig, WorkerPool};

fn broker_config(suffix: &str) -> BrokerConfig {
    BrokerConfig {
        stream_name: format!("vidtask:test:runner:jobs:{}", suffix),
        consumer_group: format!("vidtask:test:runner:workers:{}", suffix),
        delayed_set: format!("vidtask:test:runner:delayed:{}", suffix),
        result_prefix: format!("vidtask:test:runner:result:{}:", suffix),
        ..BrokerConfig::from_env()
    }
}

fn runner_config() -> RunnerConfig {
    RunnerConfig {
        max_runtime: Duration::from_secs(60),
        shutdown_grace: Duration::from_secs(5),
        retry_delay: Duration::from_millis(0),
        max_concurrent_jobs: 2,
    }
}

fn silent_reporter() -> FeedbackReporter {
    FeedbackReporter::new(FeedbackConfig {
        url: "http://127.0.0.1:1/gateway".to_string(),
        api_key: String::new(),
        request_timeout: Duration::from_millis(100),
        max_attempts: 1,
    })
    .unwrap()
}

fn ok_result() -> ExecutionResult {
    ExecutionResult {
        success: true,
        exit_code: Some(0),
        stdout: String::new(),
        stderr: String::new(),
        command: vec!["true".into()],
        duration_ms: 1,
        error: None,
        task_info: Default::default(),
    }
}

#[tokio::test]
#[ignore = "requires redis"]
async fn transient_failures_retry_then_fail() {
    let attempts = Arc::new(AtomicU32::new(0));

    let mut registry = JobRegistry::new(RegistryDefaults {
        max_retries: 1,
        timeout: Duration::from_secs(5),
    });
    {
        let attempts = Arc::clone(&attempts);
        registry.register("test", "always_fails", move |_args| {
            let attempts = Arc::clone(&attempts);
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(JobError::transient("command exited with code 1"))
            }
        });
    }

    let queue = JobQueue::new(broker_config("retry")).unwrap();
    let client = JobQueue::new(broker_config("retry")).unwrap();
    client.init().await.expect("init failed");

    let (drain_tx, drain_rx) = watch::channel(false);
    let pool = WorkerPool::new(runner_config(), queue, registry, silent_reporter(), drain_rx);
    let pool_handle = tokio::spawn(async move { pool.run().await });

    let task_id = client
        .submit("always_fails", serde_json::json!({}))
        .await
        .unwrap();

    let record = client
        .poll(&task_id, Duration::from_secs(15))
        .await
        .unwrap();

    assert_eq!(record.status, TaskStatus::Failure);
    // declared retry count (1) + the original attempt
    assert_eq!(attempts.load(Ordering::SeqCst), 2);

    drain_tx.send(true).unwrap();
    pool_handle.await.unwrap().unwrap();
}

#[tokio::test]
#[ignore = "requires redis"]
async fn unknown_job_fails_without_retry() {
    let registry = JobRegistry::new(RegistryDefaults::default());

    let queue = JobQueue::new(broker_config("unknown")).unwrap();
    let client = JobQueue::new(broker_config("unknown")).unwrap();
    client.init().await.expect("init failed");

    let (drain_tx, drain_rx) = watch::channel(false);
    let pool = WorkerPool::new(runner_config(), queue, registry, silent_reporter(), drain_rx);
    let pool_handle = tokio::spawn(async move { pool.run().await });

    let task_id = client
        .submit("no_such_job", serde_json::json!({}))
        .await
        .unwrap();

    let record = client
        .poll(&task_id, Duration::from_secs(10))
        .await
        .unwrap();

    assert_eq!(record.status, TaskStatus::Failure);
    assert!(record.error.unwrap().contains("Unknown job"));

    drain_tx.send(true).unwrap();
    pool_handle.await.unwrap().unwrap();
}

#[tokio::test]
#[ignore = "requires redis"]
async fn successful_invocation_reaches_success() {
    let mut registry = JobRegistry::new(RegistryDefaults::default());
    registry.register("test", "echoes_args", |args| async move {
        let mut result = ok_result();
        result.task_info = args.as_object().cloned().unwrap_or_default();
        Ok(result)
    });

    let queue = JobQueue::new(broker_config("success")).unwrap();
    let client = JobQueue::new(broker_config("success")).unwrap();
    client.init().await.expect("init failed");

    let (drain_tx, drain_rx) = watch::channel(false);
    let pool = WorkerPool::new(runner_config(), queue, registry, silent_reporter(), drain_rx);
    let pool_handle = tokio::spawn(async move { pool.run().await });

    let task_id = client
        .submit("echoes_args", serde_json::json!({"input_file": "a.mp4"}))
        .await
        .unwrap();

    let record = client
        .poll(&task_id, Duration::from_secs(10))
        .await
        .unwrap();

    assert_eq!(record.status, TaskStatus::Success);
    let result = record.result.unwrap();
    assert_eq!(
        result.task_info.get("input_file").and_then(|v| v.as_str()),
        Some("a.mp4")
    );

    drain_tx.send(true).unwrap();
    pool_handle.await.unwrap().unwrap();
}

/// Sets its flag when the owning future is dropped.
struct TornDown(Arc<AtomicBool>);

impl Drop for TornDown {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[tokio::test]
#[ignore = "requires redis"]
async fn forced_stop_with_long_invocation_in_flight() {
    let torn_down = Arc::new(AtomicBool::new(false));

    let mut registry = JobRegistry::new(RegistryDefaults {
        max_retries: 0,
        timeout: Duration::from_secs(60),
    });
    {
        let torn_down = Arc::clone(&torn_down);
        registry.register("test", "long_sleep", move |_args| {
            let torn_down = Arc::clone(&torn_down);
            async move {
                let _guard = TornDown(torn_down);
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(ok_result())
            }
        });
    }

    let queue = JobQueue::new(broker_config("forced")).unwrap();
    let client = JobQueue::new(broker_config("forced")).unwrap();

    client
        .init()
        .await
        .expect("init failed");
    client
        .submit("long_sleep", serde_json::json!({}))
        .await
        .unwrap();

    let config = RunnerConfig {
        max_runtime: Duration::from_secs(1),
        shutdown_grace: Duration::from_secs(1),
        retry_delay: Duration::from_secs(300),
        max_concurrent_jobs: 2,
    };

    let (drain_tx, drain_rx) = watch::channel(false);
    let pool = WorkerPool::new(config.clone(), queue, registry, silent_reporter(), drain_rx);
    let runner = Runner::new(config);

    let start = std::time::Instant::now();
    let code = runner.start(drain_tx, pool).await;

    assert_ne!(code, 0);
    // deadline (1s) + grace (1s), with scheduling slack
    assert!(start.elapsed() < Duration::from_secs(6));

    // The abort cascades into the in-flight invocation instead of
    // leaving it running until process exit.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(torn_down.load(Ordering::SeqCst));
}
