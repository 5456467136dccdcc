//! Queue executor.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use fv_models::{ErrorCode, JobError, JobId, JobRecord, JobStatus, Stage};
use fv_queue::{Delivery, JobQueue, ProgressEvent};
use fv_store::JobStore;

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::metrics;
use crate::pipeline::{AnalysisPipeline, JobOutcome};
use crate::retry::{retry_async, FailureTracker, RetryConfig};
use crate::state::force_fail;

/// Maximum messages taken in a single claim pass.
const CLAIM_BATCH: usize = 5;

/// What to do with a message whose execution hit an infrastructure error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Leave it pending; it is claimed again after the idle timeout.
    Redeliver { attempt: u32, max_retries: u32 },
    /// Mark the job failed and move the message to the dead-letter stream.
    DeadLetter,
}

pub fn retry_decision(retry_count: u32, max_retries: u32) -> RetryDecision {
    if retry_count >= max_retries {
        RetryDecision::DeadLetter
    } else {
        RetryDecision::Redeliver {
            attempt: retry_count,
            max_retries,
        }
    }
}

/// Leave the job record terminal so its message can be dead-lettered.
///
/// `Err` means the store never took the write and the message must stay
/// pending. `Ok(None)` means there is no record to update.
pub(crate) async fn settle_before_dead_letter(
    store: &dyn JobStore,
    job_id: &JobId,
    error: &JobError,
    retry: &RetryConfig,
) -> WorkerResult<Option<JobRecord>> {
    retry_async(retry, || force_fail(store, job_id, error.clone()))
        .await
        .into_result()
}

/// Pulls analysis jobs off the queue and runs them through the pipeline.
pub struct JobExecutor {
    config: WorkerConfig,
    queue: Arc<JobQueue>,
    pipeline: Arc<AnalysisPipeline>,
    job_semaphore: Arc<Semaphore>,
    shutdown: tokio::sync::watch::Sender<bool>,
    consumer_name: String,
}

impl JobExecutor {
    pub fn new(config: WorkerConfig, queue: JobQueue, pipeline: AnalysisPipeline) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(config.prefetch));
        let (shutdown, _) = tokio::sync::watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());

        Self {
            config,
            queue: Arc::new(queue),
            pipeline: Arc::new(pipeline),
            job_semaphore,
            shutdown,
            consumer_name,
        }
    }

    pub fn consumer_name(&self) -> &str {
        &self.consumer_name
    }

    /// Run until [`shutdown`](Self::shutdown) is called, then drain.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting job executor '{}' with prefetch {}",
            self.consumer_name, self.config.prefetch
        );

        self.queue.init().await?;

        let mut shutdown_rx = self.shutdown.subscribe();
        let claim_task = self.spawn_claim_task();

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume_jobs() => {
                    if let Err(e) = result {
                        error!("Error consuming jobs: {}", e);
                        // Back off on error
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }

        claim_task.abort();

        info!("Waiting for in-flight jobs to complete...");
        if tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_jobs())
            .await
            .is_err()
        {
            warn!(
                "In-flight jobs still running after {:?}, leaving them for redelivery",
                self.config.shutdown_timeout
            );
        }

        info!("Job executor stopped");
        Ok(())
    }

    /// Periodically claim messages orphaned by crashed consumers.
    fn spawn_claim_task(&self) -> tokio::task::JoinHandle<()> {
        let queue = Arc::clone(&self.queue);
        let pipeline = Arc::clone(&self.pipeline);
        let semaphore = Arc::clone(&self.job_semaphore);
        let consumer_name = self.consumer_name.clone();
        let mut shutdown_rx = self.shutdown.subscribe();
        let claim_interval = self.config.claim_interval;
        let min_idle_ms = self.config.claim_min_idle.as_millis() as u64;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(claim_interval);
            let mut failures = FailureTracker::new(3);
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        let count = semaphore.available_permits().min(CLAIM_BATCH);
                        if count == 0 {
                            continue;
                        }
                        match queue.claim_pending(&consumer_name, min_idle_ms, count).await {
                            Ok(deliveries) => {
                                failures.record_success();
                                if !deliveries.is_empty() {
                                    info!("Claimed {} pending jobs", deliveries.len());
                                }
                                for delivery in deliveries {
                                    let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                                        break;
                                    };
                                    let pipeline = Arc::clone(&pipeline);
                                    let queue = Arc::clone(&queue);
                                    tokio::spawn(async move {
                                        let _permit = permit;
                                        Self::execute_job(pipeline, queue, delivery).await;
                                    });
                                }
                            }
                            Err(e) => {
                                if failures.record_failure() {
                                    warn!("Failed to claim pending jobs: {}", e);
                                }
                            }
                        }
                    }
                }
            }
        })
    }

    /// Read as many messages as there are free execution slots.
    async fn consume_jobs(&self) -> WorkerResult<()> {
        let available = self.job_semaphore.available_permits();
        if available == 0 {
            // All slots busy, wait a bit
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let deliveries = self
            .queue
            .consume(&self.consumer_name, self.config.block_ms, available)
            .await?;

        if deliveries.is_empty() {
            return Ok(());
        }

        debug!("Consumed {} jobs from queue", deliveries.len());

        for delivery in deliveries {
            let pipeline = Arc::clone(&self.pipeline);
            let queue = Arc::clone(&self.queue);
            let permit = Arc::clone(&self.job_semaphore)
                .acquire_owned()
                .await
                .map_err(|_| WorkerError::queue_failed("Semaphore closed"))?;

            tokio::spawn(async move {
                let _permit = permit;
                Self::execute_job(pipeline, queue, delivery).await;
            });
        }

        Ok(())
    }

    /// Run one delivery and settle the message.
    async fn execute_job(pipeline: Arc<AnalysisPipeline>, queue: Arc<JobQueue>, delivery: Delivery) {
        let job_id = delivery.job.job_id.clone();
        info!("Executing job {} ({})", job_id, delivery.message_id);

        match pipeline.run(&delivery.job).await {
            Ok(outcome) => {
                match &outcome {
                    JobOutcome::Completed(_) => info!("Job {} completed", job_id),
                    JobOutcome::Failed(e) => info!("Job {} failed: {}", job_id, e),
                    JobOutcome::Cancelled => info!("Job {} cancelled", job_id),
                    JobOutcome::Skipped(status) => {
                        debug!("Job {} already {}, dropping message", job_id, status)
                    }
                    JobOutcome::Orphaned => warn!("Job {} has no record, dropping message", job_id),
                }
                if let Err(e) = queue.ack(&delivery).await {
                    error!("Failed to ack job {}: {}", job_id, e);
                }
            }
            Err(e) => {
                error!("Job {} hit an infrastructure error: {}", job_id, e);

                let retry_count = match queue.increment_retry(&delivery.message_id).await {
                    Ok(count) => count,
                    Err(retry_err) => {
                        error!("Failed to record retry for job {}: {}", job_id, retry_err);
                        return;
                    }
                };

                match retry_decision(retry_count, queue.max_retries()) {
                    RetryDecision::Redeliver {
                        attempt,
                        max_retries,
                    } => {
                        info!(
                            "Job {} will be retried (attempt {}/{})",
                            job_id, attempt, max_retries
                        );
                    }
                    RetryDecision::DeadLetter => {
                        warn!(
                            "Job {} exceeded max retries ({}), moving to DLQ",
                            job_id,
                            queue.max_retries()
                        );
                        Self::dead_letter(&pipeline, &queue, &delivery, &e).await;
                    }
                }
            }
        }
    }

    async fn dead_letter(
        pipeline: &AnalysisPipeline,
        queue: &JobQueue,
        delivery: &Delivery,
        cause: &WorkerError,
    ) {
        let job_id = &delivery.job.job_id;
        let error = JobError::new(
            ErrorCode::ProcessingError,
            format!("Analysis failed after {} attempts", queue.max_retries()),
        );

        let retry = RetryConfig::new("mark_failed").with_max_retries(3);
        let record = match settle_before_dead_letter(pipeline.store().as_ref(), job_id, &error, &retry).await {
            Ok(record) => record,
            Err(e) => {
                // Leave the message pending; the next claim tries again
                error!(
                    "Failed to mark job {} failed, not dead-lettering yet: {}",
                    job_id, e
                );
                return;
            }
        };

        if let (Some(record), Some(events)) = (record, pipeline.progress_channel()) {
            if record.status == JobStatus::Failed {
                let event =
                    ProgressEvent::new(job_id.clone(), JobStatus::Failed, record.progress, Stage::Failed)
                        .with_error(error);
                if let Err(e) = events.publish(&event).await {
                    warn!("Failed to publish failure for job {}: {}", job_id, e);
                }
            }
        }

        if let Err(e) = queue.dlq(delivery, &cause.to_string()).await {
            error!("Failed to move job {} to DLQ: {}", job_id, e);
            return;
        }
        metrics::record_dead_lettered();
    }

    /// Wait for all in-flight jobs to complete.
    async fn wait_for_jobs(&self) {
        loop {
            let available = self.job_semaphore.available_permits();
            if available == self.config.prefetch {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fv_models::{AnalysisOptions, JobUpdate, SourceDescriptor};
    use fv_store::MemoryJobStore;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_retry_decision() {
        assert_eq!(
            retry_decision(1, 3),
            RetryDecision::Redeliver {
                attempt: 1,
                max_retries: 3
            }
        );
        assert_eq!(
            retry_decision(2, 3),
            RetryDecision::Redeliver {
                attempt: 2,
                max_retries: 3
            }
        );
        assert_eq!(retry_decision(3, 3), RetryDecision::DeadLetter);
        assert_eq!(retry_decision(7, 3), RetryDecision::DeadLetter);
    }

    #[test]
    fn test_zero_retries_dead_letters_immediately() {
        assert_eq!(retry_decision(1, 0), RetryDecision::DeadLetter);
    }

    async fn processing_job(store: &MemoryJobStore) -> JobId {
        let record = JobRecord::new(
            JobId::new(),
            SourceDescriptor::url("https://youtu.be/dQw4w9WgXcQ"),
            AnalysisOptions::default(),
        );
        store.create(&record).await.unwrap();
        store
            .apply(
                &record.id,
                &JobUpdate::new()
                    .with_status(JobStatus::Processing)
                    .with_stage(Stage::Scoring)
                    .with_progress(42),
            )
            .await
            .unwrap();
        record.id
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig::new("mark_failed")
            .with_max_retries(3)
            .with_base_delay(Duration::from_millis(1))
    }

    fn exhausted() -> JobError {
        JobError::new(ErrorCode::ProcessingError, "Analysis failed after 3 attempts")
    }

    #[tokio::test]
    async fn test_store_outage_blocks_dead_letter() {
        let store = MemoryJobStore::new();
        let job_id = processing_job(&store).await;

        // Every attempt, including retries, hits the outage
        store.fail_next_writes(4);
        let settled = settle_before_dead_letter(&store, &job_id, &exhausted(), &fast_retry()).await;
        assert_err!(settled);

        let record = store.require(&job_id).await.unwrap();
        assert_eq!(record.status, JobStatus::Processing);
        assert!(record.error.is_none());
    }

    #[tokio::test]
    async fn test_dead_letter_marks_failed_after_transient_outage() {
        let store = MemoryJobStore::new();
        let job_id = processing_job(&store).await;

        store.fail_next_writes(2);
        let record = assert_ok!(
            settle_before_dead_letter(&store, &job_id, &exhausted(), &fast_retry()).await
        )
        .unwrap();
        assert_eq!(record.status, JobStatus::Failed);
        assert_eq!(record.progress, 42);

        let stored = store.require(&job_id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.error.unwrap().code, ErrorCode::ProcessingError);
    }

    #[tokio::test]
    async fn test_dead_letter_leaves_cancelled_job_alone() {
        let store = MemoryJobStore::new();
        let job_id = processing_job(&store).await;
        store.cancel(&job_id).await.unwrap();

        let record = settle_before_dead_letter(&store, &job_id, &exhausted(), &fast_retry())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status, JobStatus::Cancelled);
        assert!(record.error.is_none());
    }
}
