//! The job-record capability.

use async_trait::async_trait;

use fv_models::{JobId, JobRecord, JobStatus, JobUpdate, Stage};

use crate::error::{StoreError, StoreResult};

/// Shared job-record datastore.
///
/// `apply` is a last-writer-wins merge of every field present in the
/// update, written as one unit. Ordering rules (monotonic progress,
/// terminal immutability) belong to the caller.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new record. Fails if one already exists.
    async fn create(&self, record: &JobRecord) -> StoreResult<()>;

    /// Fetch a record, `None` when it doesn't exist.
    async fn get(&self, job_id: &JobId) -> StoreResult<Option<JobRecord>>;

    /// Merge `update` into an existing record.
    async fn apply(&self, job_id: &JobId, update: &JobUpdate) -> StoreResult<()>;

    /// Fetch a record that must exist.
    async fn require(&self, job_id: &JobId) -> StoreResult<JobRecord> {
        self.get(job_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(job_id.clone()))
    }

    /// API-side cancel. Only pending or processing jobs can be cancelled;
    /// progress is left as is.
    async fn cancel(&self, job_id: &JobId) -> StoreResult<JobRecord> {
        let mut record = self.require(job_id).await?;
        if !record.status.can_transition_to(JobStatus::Cancelled) {
            return Err(StoreError::InvalidTransition {
                job_id: job_id.clone(),
                from: record.status,
                to: JobStatus::Cancelled,
            });
        }

        let update = JobUpdate::new()
            .with_status(JobStatus::Cancelled)
            .with_stage(Stage::Cancelled)
            .completed_now();
        self.apply(job_id, &update).await?;
        record.apply(&update);
        Ok(record)
    }
}
