//! Broker integration tests.
//!
//! These tests require a local Redis instance.
//! Run with: `cargo test -p vidtask-queue -- --ignored`

use std::time::Duration;

use vidtask_models::{ExecutionResult, TaskMessage, TaskResult, TaskStatus};
use vidtask_queue::{BrokerConfig, JobQueue};

fn test_queue(suffix: &str) -> JobQueue {
    let config = BrokerConfig {
        stream_name: format!("vidtask:test:jobs:{}", suffix),
        consumer_group: format!("vidtask:test:workers:{}", suffix),
        delayed_set: format!("vidtask:test:delayed:{}", suffix),
        result_prefix: format!("vidtask:test:result:{}:", suffix),
        ..BrokerConfig::from_env()
    };
    JobQueue::new(config).expect("Failed to create queue client")
}

#[tokio::test]
#[ignore = "requires redis"]
async fn enqueue_consume_ack_roundtrip() {
    let queue = test_queue("roundtrip");
    queue.init().await.expect("init failed");

    let task = TaskMessage::new("convert_video_format", serde_json::json!({"input_file": "a.mp4"}));
    queue.enqueue(&task).await.expect("enqueue failed");

    let consumed = queue
        .consume("test-consumer", 1000, 5)
        .await
        .expect("consume failed");
    assert_eq!(consumed.len(), 1);

    let (message_id, got) = &consumed[0];
    assert_eq!(got.task_id, task.task_id);
    assert_eq!(got.job_name, "convert_video_format");
    assert_eq!(got.attempt, 1);

    queue.ack(message_id).await.expect("ack failed");
    assert_eq!(queue.len().await.unwrap(), 0);

    // Enqueue of attempt 1 seeds the result store as PENDING
    let record = queue.get_result(&task.task_id).await.unwrap().unwrap();
    assert_eq!(record.status, TaskStatus::Pending);
}

#[tokio::test]
#[ignore = "requires redis"]
async fn stranded_delivery_is_claimed_by_another_consumer() {
    let queue = test_queue("claim");
    queue.init().await.expect("init failed");

    let task = TaskMessage::new("compress_video", serde_json::json!({"input_file": "a.mp4"}));
    queue.enqueue(&task).await.expect("enqueue failed");

    // Delivered but never acked, as if the consumer died mid-execution
    let delivered = queue
        .consume("dead-consumer", 1000, 5)
        .await
        .expect("consume failed");
    assert_eq!(delivered.len(), 1);

    // Not idle long enough to be considered stranded
    let early = queue
        .claim_pending("survivor", Duration::from_secs(300), 5)
        .await
        .expect("claim failed");
    assert!(early.is_empty());

    let claimed = queue
        .claim_pending("survivor", Duration::from_millis(0), 5)
        .await
        .expect("claim failed");
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].1.task_id, task.task_id);
    assert_eq!(claimed[0].1.attempt, 1);

    queue.ack(&claimed[0].0).await.expect("ack failed");

    // Nothing left in the pending list once acknowledged
    let after = queue
        .claim_pending("survivor", Duration::from_millis(0), 5)
        .await
        .expect("claim failed");
    assert!(after.is_empty());
}

#[tokio::test]
#[ignore = "requires redis"]
async fn scheduled_retry_is_not_eligible_early() {
    let queue = test_queue("retry");
    queue.init().await.expect("init failed");

    let task = TaskMessage::new("compress_video", serde_json::json!({"input_file": "a.mp4"}));
    queue
        .schedule_retry(&task, Duration::from_secs(300))
        .await
        .expect("schedule failed");

    // Delay has not elapsed, nothing moves
    assert_eq!(queue.pump_due_retries().await.unwrap(), 0);
    assert_eq!(queue.delayed_len().await.unwrap(), 1);

    let record = queue.get_result(&task.task_id).await.unwrap().unwrap();
    assert_eq!(record.status, TaskStatus::Retry);
}

#[tokio::test]
#[ignore = "requires redis"]
async fn due_retry_returns_with_incremented_attempt() {
    let queue = test_queue("due");
    queue.init().await.expect("init failed");

    let task = TaskMessage::new("extract_frames", serde_json::json!({"input_file": "a.mp4"}));
    queue
        .schedule_retry(&task, Duration::from_millis(0))
        .await
        .expect("schedule failed");

    assert_eq!(queue.pump_due_retries().await.unwrap(), 1);

    let consumed = queue
        .consume("test-consumer", 1000, 5)
        .await
        .expect("consume failed");
    assert_eq!(consumed.len(), 1);
    assert_eq!(consumed[0].1.attempt, 2);
    assert_eq!(consumed[0].1.task_id, task.task_id);
}

#[tokio::test]
#[ignore = "requires redis"]
async fn poll_times_out_client_side() {
    let queue = test_queue("poll");
    queue.init().await.expect("init failed");

    let task_id = queue
        .submit("convert_video_format", serde_json::json!({"input_file": "a.mp4"}))
        .await
        .expect("submit failed");

    // No worker is running, so the poll budget expires
    let record = queue
        .poll(&task_id, Duration::from_millis(600))
        .await
        .expect("poll failed");
    assert_eq!(record.status, TaskStatus::Timeout);

    // A terminal record is returned as-is
    let result = ExecutionResult {
        success: true,
        exit_code: Some(0),
        stdout: String::new(),
        stderr: String::new(),
        command: vec!["ffmpeg".into()],
        duration_ms: 5,
        error: None,
        task_info: Default::default(),
    };
    queue
        .store_result(&task_id, &TaskResult::terminal(TaskStatus::Success, result))
        .await
        .expect("store failed");

    let record = queue
        .poll(&task_id, Duration::from_secs(2))
        .await
        .expect("poll failed");
    assert_eq!(record.status, TaskStatus::Success);
    assert!(record.result.is_some());
}
