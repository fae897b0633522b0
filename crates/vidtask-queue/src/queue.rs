//! Task queue using Redis Streams.

use std::time::Duration;

use redis::AsyncCommands;
use tracing::{debug, info, warn};

use vidtask_models::{TaskId, TaskMessage, TaskResult, TaskStatus};

use crate::config::BrokerConfig;
use crate::error::{QueueError, QueueResult};

/// Broker client: queue stream, delayed retry set, result store.
pub struct JobQueue {
    client: redis::Client,
    config: BrokerConfig,
}

impl JobQueue {
    /// Create a new queue client.
    pub fn new(config: BrokerConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(BrokerConfig::from_env())
    }

    /// Initialize the queue (create consumer group if not exists).
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        // Create consumer group (ignore error if already exists)
        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => info!("Created consumer group: {}", self.config.consumer_group),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!(
                    "Consumer group already exists: {}",
                    self.config.consumer_group
                );
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }

        Ok(())
    }

    /// Enqueue a task for immediate dequeue eligibility.
    pub async fn enqueue(&self, task: &TaskMessage) -> QueueResult<String> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let message_id = self.xadd(&mut conn, task).await?;

        if task.attempt == 1 {
            self.write_result(&mut conn, &task.task_id, &TaskResult::pending())
                .await?;
        }

        info!(
            task_id = %task.task_id,
            job_name = %task.job_name,
            attempt = task.attempt,
            "Enqueued task with message ID {}",
            message_id
        );

        Ok(message_id)
    }

    async fn xadd(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        task: &TaskMessage,
    ) -> QueueResult<String> {
        let payload = serde_json::to_string(task)?;
        let message_id: String = redis::cmd("XADD")
            .arg(&self.config.stream_name)
            .arg("*")
            .arg("task")
            .arg(&payload)
            .query_async(conn)
            .await?;
        Ok(message_id)
    }

    /// Consume tasks from the queue as a consumer-group member.
    /// Returns (message_id, task) pairs.
    pub async fn consume(
        &self,
        consumer_name: &str,
        block_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<(String, TaskMessage)>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let result: redis::streams::StreamReadReply = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block_ms)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(">") // Only new messages
            .query_async(&mut conn)
            .await?;

        let mut tasks = Vec::new();

        for stream_key in result.keys {
            for entry in stream_key.ids {
                let message_id = entry.id.clone();

                if let Some(redis::Value::BulkString(payload)) = entry.map.get("task") {
                    let payload_str = String::from_utf8_lossy(payload);
                    match serde_json::from_str::<TaskMessage>(&payload_str) {
                        Ok(task) => {
                            debug!("Consumed task {} from stream", task.task_id);
                            tasks.push((message_id, task));
                        }
                        Err(e) => {
                            warn!("Failed to parse task payload: {}", e);
                            // Ack the malformed message to prevent reprocessing
                            self.ack(&message_id).await.ok();
                        }
                    }
                }
            }
        }

        Ok(tasks)
    }

    /// Claim deliveries another consumer left unacknowledged.
    ///
    /// A runner that crashes (or is torn down) between dequeue and ack
    /// leaves its entries in the group's pending list. Once such an
    /// entry has been idle for `min_idle` it can be claimed here and
    /// executed again.
    pub async fn claim_pending(
        &self,
        consumer_name: &str,
        min_idle: Duration,
        count: usize,
    ) -> QueueResult<Vec<(String, TaskMessage)>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let reply: redis::streams::StreamAutoClaimReply = redis::cmd("XAUTOCLAIM")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg(min_idle.as_millis() as u64)
            .arg("0-0")
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        let mut tasks = Vec::new();

        for entry in reply.claimed {
            let message_id = entry.id.clone();

            if let Some(redis::Value::BulkString(payload)) = entry.map.get("task") {
                let payload_str = String::from_utf8_lossy(payload);
                match serde_json::from_str::<TaskMessage>(&payload_str) {
                    Ok(task) => {
                        info!(
                            task_id = %task.task_id,
                            "Claimed stranded delivery {}",
                            message_id
                        );
                        tasks.push((message_id, task));
                    }
                    Err(e) => {
                        warn!("Failed to parse claimed payload: {}", e);
                        self.ack(&message_id).await.ok();
                    }
                }
            }
        }

        Ok(tasks)
    }

    /// Acknowledge a task (remove it from the stream).
    pub async fn ack(&self, message_id: &str) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        redis::cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        redis::cmd("XDEL")
            .arg(&self.config.stream_name)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        debug!("Acknowledged task message: {}", message_id);
        Ok(())
    }

    /// Schedule the next attempt of a failed task.
    ///
    /// The message lands in a sorted set scored by eligibility time and
    /// is moved back onto the stream by [`pump_due_retries`] once the
    /// delay has passed, so a retry is never dequeued early.
    ///
    /// [`pump_due_retries`]: JobQueue::pump_due_retries
    pub async fn schedule_retry(&self, task: &TaskMessage, delay: Duration) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let retry = task.next_attempt();
        let payload = serde_json::to_string(&retry)?;
        let eligible_at = chrono::Utc::now().timestamp_millis() + delay.as_millis() as i64;

        conn.zadd::<_, _, _, ()>(&self.config.delayed_set, &payload, eligible_at)
            .await?;

        self.write_result(
            &mut conn,
            &task.task_id,
            &TaskResult::with_status(TaskStatus::Retry),
        )
        .await?;

        info!(
            task_id = %task.task_id,
            attempt = retry.attempt,
            "Scheduled retry eligible in {}s",
            delay.as_secs()
        );

        Ok(())
    }

    /// Move retries whose delay has elapsed back onto the stream.
    /// Returns the number of tasks re-enqueued.
    pub async fn pump_due_retries(&self) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let now = chrono::Utc::now().timestamp_millis();
        let due: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(&self.config.delayed_set)
            .arg("-inf")
            .arg(now)
            .arg("LIMIT")
            .arg(0)
            .arg(16)
            .query_async(&mut conn)
            .await?;

        let mut moved = 0u64;
        for payload in due {
            // Only the member that wins the ZREM re-enqueues; concurrent
            // pumps cannot duplicate a retry.
            let removed: u64 = conn.zrem(&self.config.delayed_set, &payload).await?;
            if removed == 0 {
                continue;
            }

            match serde_json::from_str::<TaskMessage>(&payload) {
                Ok(task) => {
                    self.xadd(&mut conn, &task).await?;
                    debug!(task_id = %task.task_id, "Retry became eligible, re-enqueued");
                    moved += 1;
                }
                Err(e) => {
                    warn!("Dropping malformed delayed payload: {}", e);
                }
            }
        }

        Ok(moved)
    }

    /// Record the current status of a task without a result payload.
    pub async fn set_status(&self, task_id: &TaskId, status: TaskStatus) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        self.write_result(&mut conn, task_id, &TaskResult::with_status(status))
            .await
    }

    /// Store a result-store record for a task.
    pub async fn store_result(&self, task_id: &TaskId, record: &TaskResult) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        self.write_result(&mut conn, task_id, record).await
    }

    async fn write_result(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        task_id: &TaskId,
        record: &TaskResult,
    ) -> QueueResult<()> {
        let key = self.config.result_key(task_id.as_str());
        let payload = serde_json::to_string(record)?;
        conn.set_ex::<_, _, ()>(&key, payload, self.config.result_ttl.as_secs())
            .await?;
        Ok(())
    }

    /// Fetch the result-store record for a task.
    pub async fn get_result(&self, task_id: &TaskId) -> QueueResult<Option<TaskResult>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let key = self.config.result_key(task_id.as_str());
        let payload: Option<String> = conn.get(&key).await?;

        match payload {
            Some(p) => Ok(Some(serde_json::from_str(&p)?)),
            None => Ok(None),
        }
    }

    /// Submit a new invocation of a named job. Returns its task ID.
    pub async fn submit(
        &self,
        job_name: impl Into<String>,
        args: serde_json::Value,
    ) -> QueueResult<TaskId> {
        let task = TaskMessage::new(job_name, args);
        let task_id = task.task_id.clone();
        self.enqueue(&task).await?;
        Ok(task_id)
    }

    /// Wait for a task to reach a terminal status.
    ///
    /// Returns a record labeled `TIMEOUT` when the wait budget runs out
    /// first. That label is client-side only; the broker record is left
    /// untouched and the task may still complete later.
    pub async fn poll(&self, task_id: &TaskId, budget: Duration) -> QueueResult<TaskResult> {
        let deadline = tokio::time::Instant::now() + budget;

        loop {
            if let Some(record) = self.get_result(task_id).await? {
                if record.status.is_terminal() {
                    return Ok(record);
                }
            }

            if tokio::time::Instant::now() >= deadline {
                return Ok(TaskResult::with_status(TaskStatus::Timeout));
            }

            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }

    /// Get queue length.
    pub async fn len(&self) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: u64 = conn.xlen(&self.config.stream_name).await?;
        Ok(len)
    }

    /// Get the number of scheduled (not yet eligible) retries.
    pub async fn delayed_len(&self) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: u64 = conn.zcard(&self.config.delayed_set).await?;
        Ok(len)
    }
}
