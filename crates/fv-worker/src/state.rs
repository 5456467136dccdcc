//! Job state machine.
//!
//! All writes to a job record made while a worker holds it go through
//! [`JobStateMachine`]:
//! - pickup is idempotent: only a `pending` record is claimed
//! - progress never decreases
//! - nothing is written after a terminal state
//! - terminal writes carry status, stage, progress and error/result together

use std::sync::Arc;

use tracing::{debug, warn};

use fv_models::{
    AnalysisResult, JobError, JobId, JobRecord, JobStatus, JobUpdate, MediaInfo, Stage,
};
use fv_queue::{ProgressChannel, ProgressEvent};
use fv_store::JobStore;

use crate::error::{WorkerError, WorkerResult};

/// Result of trying to take ownership of a job.
pub enum Claim {
    /// The job moved to `processing` and this execution owns it.
    Acquired(JobStateMachine),
    /// The record is not `pending`; the message is a duplicate.
    Skip(JobStatus),
    /// No record exists for the job.
    Orphaned,
}

/// Owner of one job's record for the duration of an execution.
pub struct JobStateMachine {
    store: Arc<dyn JobStore>,
    events: Option<Arc<ProgressChannel>>,
    job_id: JobId,
    progress: u8,
    stage: Stage,
    terminal: Option<JobStatus>,
}

impl JobStateMachine {
    /// Claim `job_id` if it is still `pending`.
    pub async fn claim(
        store: Arc<dyn JobStore>,
        events: Option<Arc<ProgressChannel>>,
        job_id: &JobId,
    ) -> WorkerResult<Claim> {
        let Some(record) = store.get(job_id).await? else {
            return Ok(Claim::Orphaned);
        };
        if record.status != JobStatus::Pending {
            debug!(job_id = %job_id, status = %record.status, "Job not pending, skipping");
            return Ok(Claim::Skip(record.status));
        }

        let update = JobUpdate::new()
            .with_status(JobStatus::Processing)
            .with_progress(0)
            .with_stage(Stage::Acquiring)
            .started_now();
        store.apply(job_id, &update).await?;

        let machine = Self {
            store,
            events,
            job_id: job_id.clone(),
            progress: 0,
            stage: Stage::Acquiring,
            terminal: None,
        };
        machine.publish(JobStatus::Processing, None).await;
        Ok(Claim::Acquired(machine))
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    fn ensure_live(&self) -> WorkerResult<()> {
        match self.terminal {
            Some(status) => Err(WorkerError::TerminalState {
                job_id: self.job_id.clone(),
                status,
            }),
            None => Ok(()),
        }
    }

    /// Enter `stage` at `progress` (or the current progress if higher).
    pub async fn advance(&mut self, stage: Stage, progress: u8) -> WorkerResult<()> {
        self.advance_with(stage, progress, None).await
    }

    /// Enter `stage` and record acquired media metadata in the same write.
    pub async fn advance_with_media(
        &mut self,
        stage: Stage,
        progress: u8,
        media: MediaInfo,
    ) -> WorkerResult<()> {
        self.advance_with(stage, progress, Some(media)).await
    }

    async fn advance_with(
        &mut self,
        stage: Stage,
        progress: u8,
        media: Option<MediaInfo>,
    ) -> WorkerResult<()> {
        self.ensure_live()?;
        let progress = progress.max(self.progress);

        // Status is left alone so a concurrent cancel isn't overwritten
        let mut update = JobUpdate::new().with_progress(progress).with_stage(stage);
        if let Some(media) = media {
            update = update.with_media(media);
        }
        self.store.apply(&self.job_id, &update).await?;

        self.progress = progress;
        self.stage = stage;
        self.publish(JobStatus::Processing, None).await;
        Ok(())
    }

    /// Report progress within the current stage. Writes only when it rises.
    pub async fn report_progress(&mut self, progress: u8) -> WorkerResult<()> {
        self.ensure_live()?;
        let progress = progress.min(100);
        if progress <= self.progress {
            return Ok(());
        }

        self.store
            .apply(&self.job_id, &JobUpdate::new().with_progress(progress))
            .await?;
        self.progress = progress;
        self.publish(JobStatus::Processing, None).await;
        Ok(())
    }

    /// Re-read the record and report whether it was cancelled.
    pub async fn is_cancelled(&mut self) -> WorkerResult<bool> {
        self.ensure_live()?;
        let record = self.store.require(&self.job_id).await?;
        if record.status == JobStatus::Cancelled {
            self.terminal = Some(JobStatus::Cancelled);
            self.stage = Stage::Cancelled;
            return Ok(true);
        }
        Ok(false)
    }

    /// Store the result and move to `completed` at 100%.
    pub async fn complete(&mut self, result: AnalysisResult) -> WorkerResult<()> {
        self.ensure_live()?;
        let update = JobUpdate::new()
            .with_status(JobStatus::Completed)
            .with_progress(100)
            .with_stage(Stage::Completed)
            .with_result(result)
            .completed_now();
        self.store.apply(&self.job_id, &update).await?;

        self.progress = 100;
        self.stage = Stage::Completed;
        self.terminal = Some(JobStatus::Completed);
        self.publish(JobStatus::Completed, None).await;
        Ok(())
    }

    /// Move to `failed`, keeping the last progress value.
    pub async fn fail(&mut self, error: JobError) -> WorkerResult<()> {
        self.ensure_live()?;
        let update = JobUpdate::new()
            .with_status(JobStatus::Failed)
            .with_progress(self.progress)
            .with_stage(Stage::Failed)
            .with_error(error.clone())
            .completed_now();
        self.store.apply(&self.job_id, &update).await?;

        self.stage = Stage::Failed;
        self.terminal = Some(JobStatus::Failed);
        self.publish(JobStatus::Failed, Some(error)).await;
        Ok(())
    }

    async fn publish(&self, status: JobStatus, error: Option<JobError>) {
        let Some(events) = &self.events else {
            return;
        };
        let mut event = ProgressEvent::new(self.job_id.clone(), status, self.progress, self.stage);
        if let Some(error) = error {
            event = event.with_error(error);
        }
        if let Err(e) = events.publish(&event).await {
            warn!(job_id = %self.job_id, "Failed to publish progress event: {}", e);
        }
    }
}

/// Write `failed` for a job nobody holds anymore, unless it is already terminal.
///
/// Used before dead-lettering a message whose executions kept hitting
/// infrastructure errors. Returns the stored record, or `None` if the job
/// doesn't exist.
pub async fn force_fail(
    store: &dyn JobStore,
    job_id: &JobId,
    error: JobError,
) -> WorkerResult<Option<JobRecord>> {
    let Some(mut record) = store.get(job_id).await? else {
        return Ok(None);
    };
    if record.is_terminal() {
        return Ok(Some(record));
    }

    let update = JobUpdate::new()
        .with_status(JobStatus::Failed)
        .with_stage(Stage::Failed)
        .with_error(error)
        .completed_now();
    store.apply(job_id, &update).await?;
    record.apply(&update);
    Ok(Some(record))
}
