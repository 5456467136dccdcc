//! Job queue using Redis Streams.
//!
//! Two streams share one consumer group name: a priority lane for messages
//! at or above `priority_threshold` and a normal lane for the rest.
//! Consumers drain the priority lane first without blocking.

use std::time::Duration;

use redis::AsyncCommands;
use tracing::{debug, info, warn};

use crate::error::{QueueError, QueueResult};
use crate::job::AnalyzeMediaJob;

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Normal lane stream
    pub stream_name: String,
    /// Priority lane stream
    pub priority_stream_name: String,
    /// Consumer group name (created on both lanes)
    pub consumer_group: String,
    /// Dead letter stream
    pub dlq_stream_name: String,
    /// Max deliveries before DLQ
    pub max_retries: u32,
    /// Priority at or above which messages go to the priority lane
    pub priority_threshold: u8,
    /// How long an enqueued job ID is remembered for deduplication
    pub dedup_ttl: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            stream_name: "fv:analysis".to_string(),
            priority_stream_name: "fv:analysis:priority".to_string(),
            consumer_group: "fv:workers".to_string(),
            dlq_stream_name: "fv:analysis:dlq".to_string(),
            max_retries: 3,
            priority_threshold: 7,
            dedup_ttl: Duration::from_secs(3600),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            stream_name: std::env::var("QUEUE_STREAM").unwrap_or(defaults.stream_name),
            priority_stream_name: std::env::var("QUEUE_PRIORITY_STREAM")
                .unwrap_or(defaults.priority_stream_name),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP")
                .unwrap_or(defaults.consumer_group),
            dlq_stream_name: std::env::var("QUEUE_DLQ_STREAM").unwrap_or(defaults.dlq_stream_name),
            max_retries: std::env::var("QUEUE_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
            priority_threshold: std::env::var("QUEUE_PRIORITY_THRESHOLD")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.priority_threshold),
            dedup_ttl: defaults.dedup_ttl,
        }
    }

    /// Stream a job with `priority` is appended to.
    pub fn lane_for(&self, priority: u8) -> &str {
        if priority >= self.priority_threshold {
            &self.priority_stream_name
        } else {
            &self.stream_name
        }
    }
}

/// A consumed message together with the lane it came from.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub stream: String,
    pub message_id: String,
    pub job: AnalyzeMediaJob,
}

/// Job queue client.
pub struct JobQueue {
    client: redis::Client,
    config: QueueConfig,
}

impl JobQueue {
    /// Create a new job queue.
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    fn lanes(&self) -> [&str; 2] {
        [
            self.config.priority_stream_name.as_str(),
            self.config.stream_name.as_str(),
        ]
    }

    /// Initialize the queue (create consumer groups if they don't exist).
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        for stream in self.lanes() {
            let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
                .arg("CREATE")
                .arg(stream)
                .arg(&self.config.consumer_group)
                .arg("0")
                .arg("MKSTREAM")
                .query_async(&mut conn)
                .await;

            match result {
                Ok(_) => info!(
                    "Created consumer group {} on {}",
                    self.config.consumer_group, stream
                ),
                Err(e) if e.to_string().contains("BUSYGROUP") => {
                    debug!("Consumer group already exists on {}", stream);
                }
                Err(e) => return Err(QueueError::Redis(e)),
            }
        }

        Ok(())
    }

    /// Enqueue an analysis job on the lane chosen by its priority.
    pub async fn enqueue(&self, job: &AnalyzeMediaJob) -> QueueResult<String> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let payload = serde_json::to_string(job)?;
        let idempotency_key = job.idempotency_key();

        let dedup_key = format!("fv:dedup:{}", idempotency_key);
        let exists: bool = conn.exists(&dedup_key).await?;
        if exists {
            warn!("Duplicate job rejected: {}", idempotency_key);
            return Err(QueueError::enqueue_failed("Duplicate job"));
        }

        let stream = self.config.lane_for(job.priority);
        let message_id: String = redis::cmd("XADD")
            .arg(stream)
            .arg("*")
            .arg("job")
            .arg(&payload)
            .arg("priority")
            .arg(job.priority)
            .query_async(&mut conn)
            .await?;

        conn.set_ex::<_, _, ()>(&dedup_key, "1", self.config.dedup_ttl.as_secs())
            .await?;

        info!(
            "Enqueued job {} on {} with message ID {}",
            job.job_id, stream, message_id
        );

        Ok(message_id)
    }

    /// Acknowledge and delete a message.
    pub async fn ack(&self, delivery: &Delivery) -> QueueResult<()> {
        self.ack_raw(&delivery.stream, &delivery.message_id).await?;
        self.clear_retry(&delivery.message_id).await
    }

    async fn ack_raw(&self, stream: &str, message_id: &str) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        redis::cmd("XACK")
            .arg(stream)
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        redis::cmd("XDEL")
            .arg(stream)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        debug!("Acknowledged message {} on {}", message_id, stream);
        Ok(())
    }

    /// Move a message to the dead letter stream and acknowledge it.
    pub async fn dlq(&self, delivery: &Delivery, error: &str) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let payload = serde_json::to_string(&delivery.job)?;

        redis::cmd("XADD")
            .arg(&self.config.dlq_stream_name)
            .arg("*")
            .arg("job")
            .arg(&payload)
            .arg("error")
            .arg(error)
            .arg("original_id")
            .arg(&delivery.message_id)
            .arg("original_stream")
            .arg(&delivery.stream)
            .query_async::<()>(&mut conn)
            .await?;

        self.ack(delivery).await?;

        warn!("Moved job {} to DLQ: {}", delivery.job.job_id, error);
        Ok(())
    }

    /// Get total length of both lanes.
    pub async fn len(&self) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let mut total = 0u64;
        for stream in self.lanes() {
            let len: u64 = conn.xlen(stream).await?;
            total += len;
        }
        Ok(total)
    }

    /// Get DLQ length.
    pub async fn dlq_len(&self) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: u64 = conn.xlen(&self.config.dlq_stream_name).await?;
        Ok(len)
    }

    /// Consume up to `count` new messages.
    ///
    /// The priority lane is read first without blocking; remaining capacity
    /// is filled from the normal lane, blocking up to `block_ms` only when
    /// the priority lane was empty.
    pub async fn consume(
        &self,
        consumer_name: &str,
        block_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        if count == 0 {
            return Ok(Vec::new());
        }

        let mut deliveries = self
            .read_lane(&self.config.priority_stream_name, consumer_name, None, count)
            .await?;

        let remaining = count - deliveries.len().min(count);
        if remaining > 0 {
            let block = if deliveries.is_empty() {
                Some(block_ms)
            } else {
                None
            };
            let normal = self
                .read_lane(&self.config.stream_name, consumer_name, block, remaining)
                .await?;
            deliveries.extend(normal);
        }

        Ok(deliveries)
    }

    async fn read_lane(
        &self,
        stream: &str,
        consumer_name: &str,
        block_ms: Option<u64>,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg("COUNT")
            .arg(count);
        if let Some(ms) = block_ms {
            cmd.arg("BLOCK").arg(ms);
        }
        cmd.arg("STREAMS").arg(stream).arg(">");

        // Nil reply when nothing arrived within the block window
        let result: Option<redis::streams::StreamReadReply> = cmd.query_async(&mut conn).await?;

        let mut deliveries = Vec::new();
        for stream_key in result.map(|r| r.keys).unwrap_or_default() {
            for entry in stream_key.ids {
                if let Some(delivery) = self.parse_entry(stream, entry).await {
                    debug!("Consumed job {} from {}", delivery.job.job_id, stream);
                    deliveries.push(delivery);
                }
            }
        }

        Ok(deliveries)
    }

    /// Decode a stream entry; malformed payloads are acked so they are not redelivered.
    async fn parse_entry(&self, stream: &str, entry: redis::streams::StreamId) -> Option<Delivery> {
        let message_id = entry.id.clone();
        let payload = match entry.map.get("job") {
            Some(redis::Value::BulkString(bytes)) => String::from_utf8_lossy(bytes).into_owned(),
            _ => {
                warn!("Message {} on {} has no job payload", message_id, stream);
                self.ack_raw(stream, &message_id).await.ok();
                return None;
            }
        };

        match serde_json::from_str::<AnalyzeMediaJob>(&payload) {
            Ok(job) => Some(Delivery {
                stream: stream.to_string(),
                message_id,
                job,
            }),
            Err(e) => {
                warn!("Failed to parse job payload {}: {}", message_id, e);
                self.ack_raw(stream, &message_id).await.ok();
                None
            }
        }
    }

    /// Claim messages that have been pending longer than `min_idle_ms`.
    /// This recovers jobs held by crashed workers.
    pub async fn claim_pending(
        &self,
        consumer_name: &str,
        min_idle_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let mut claimed = Vec::new();

        for stream in self.lanes() {
            if claimed.len() >= count {
                break;
            }
            let mut conn = self.client.get_multiplexed_async_connection().await?;

            let pending: redis::streams::StreamPendingCountReply = redis::cmd("XPENDING")
                .arg(stream)
                .arg(&self.config.consumer_group)
                .arg("-")
                .arg("+")
                .arg(count - claimed.len())
                .query_async(&mut conn)
                .await?;

            let idle_ids: Vec<String> = pending
                .ids
                .into_iter()
                .filter(|p| p.last_delivered_ms as u64 >= min_idle_ms)
                .map(|p| p.id)
                .collect();

            if idle_ids.is_empty() {
                continue;
            }

            let result: redis::streams::StreamClaimReply = redis::cmd("XCLAIM")
                .arg(stream)
                .arg(&self.config.consumer_group)
                .arg(consumer_name)
                .arg(min_idle_ms)
                .arg(&idle_ids)
                .query_async(&mut conn)
                .await?;

            for entry in result.ids {
                if let Some(delivery) = self.parse_entry(stream, entry).await {
                    info!("Claimed pending job {} from {}", delivery.job.job_id, stream);
                    claimed.push(delivery);
                }
            }
        }

        Ok(claimed)
    }

    /// Get retry count for a message.
    pub async fn get_retry_count(&self, message_id: &str) -> QueueResult<u32> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let key = format!("fv:retry:{}", message_id);
        let count: Option<u32> = conn.get(&key).await?;
        Ok(count.unwrap_or(0))
    }

    /// Increment retry count for a message.
    pub async fn increment_retry(&self, message_id: &str) -> QueueResult<u32> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let key = format!("fv:retry:{}", message_id);
        let count: u32 = conn.incr(&key, 1).await?;
        conn.expire::<_, ()>(&key, 86400).await?;
        Ok(count)
    }

    async fn clear_retry(&self, message_id: &str) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.del::<_, ()>(format!("fv:retry:{}", message_id)).await?;
        Ok(())
    }

    /// Get max retries from config.
    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }
}
