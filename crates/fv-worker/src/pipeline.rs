//! Analysis pipeline orchestrator.
//!
//! Runs acquisition, sampling, per-frame scoring and aggregation strictly in
//! sequence for one job, and reports each stage transition to the
//! [`JobStateMachine`]. Progress sub-ranges:
//!
//! | stage        | progress |
//! |--------------|----------|
//! | acquiring    | 0        |
//! | downloading  | 5        |
//! | sampling     | 20       |
//! | scoring      | 30-90, linear in frames scored |
//! | aggregating  | 90       |
//! | completed    | 100      |
//!
//! Cancellation is checked between stages only.

use std::sync::Arc;
use std::time::Instant;

use tracing::{warn, Instrument};

use fv_detect::{build_result, score_frame, FrameScorer, ReportContext, ScoreOptions};
use fv_media::{sample_frames, FrameDecoder, MediaHandle, SamplingPlan, SourceAcquirer};
use fv_models::{AnalysisResult, ErrorCode, JobError, JobStatus, Stage};
use fv_queue::{AnalyzeMediaJob, ProgressChannel};
use fv_store::JobStore;

use crate::config::PipelineConfig;
use crate::error::{StageFailure, WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::retry::{retry_async, RetryConfig};
use crate::state::{force_fail, Claim, JobStateMachine};

const SCORING_START: u8 = 30;
const SCORING_SPAN: usize = 60;

/// How one delivery of a job ended. Every variant means the message can be
/// acknowledged.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed(AnalysisResult),
    Failed(JobError),
    /// Cancelled by the API layer; observed at a stage boundary.
    Cancelled,
    /// The record was not pending, so this delivery was a duplicate.
    Skipped(JobStatus),
    /// No record exists for the job.
    Orphaned,
}

impl JobOutcome {
    /// Metric label.
    pub fn label(&self) -> &'static str {
        match self {
            JobOutcome::Completed(_) => "completed",
            JobOutcome::Failed(_) => "failed",
            JobOutcome::Cancelled => "cancelled",
            JobOutcome::Skipped(_) => "skipped",
            JobOutcome::Orphaned => "orphaned",
        }
    }
}

/// What the stages produced before the terminal write.
enum StageOutcome {
    Completed(AnalysisResult),
    Failed(StageFailure),
    Cancelled,
}

impl From<StageFailure> for StageOutcome {
    fn from(failure: StageFailure) -> Self {
        StageOutcome::Failed(failure)
    }
}

/// One shared pipeline for the queue worker and the inline demo path.
pub struct AnalysisPipeline {
    config: PipelineConfig,
    acquirer: SourceAcquirer,
    decoder: Arc<dyn FrameDecoder>,
    scorer: Arc<dyn FrameScorer>,
    store: Arc<dyn JobStore>,
    events: Option<Arc<ProgressChannel>>,
}

impl AnalysisPipeline {
    pub fn new(
        config: PipelineConfig,
        acquirer: SourceAcquirer,
        decoder: Arc<dyn FrameDecoder>,
        scorer: Arc<dyn FrameScorer>,
        store: Arc<dyn JobStore>,
    ) -> Self {
        Self {
            config,
            acquirer,
            decoder,
            scorer,
            store,
            events: None,
        }
    }

    /// Also publish every record write on the progress channel.
    pub fn with_progress_channel(mut self, events: Arc<ProgressChannel>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    pub fn progress_channel(&self) -> Option<&Arc<ProgressChannel>> {
        self.events.as_ref()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run one delivery of `job` to a terminal state.
    ///
    /// `Err` means the record could not be read or claimed; the caller
    /// should leave the message for redelivery. Once the job is claimed,
    /// every path ends in a terminal write.
    pub async fn run(&self, job: &AnalyzeMediaJob) -> WorkerResult<JobOutcome> {
        let logger = JobLogger::new(&job.job_id, "analyze_media");
        let span = logger.create_span();

        async {
            let started = Instant::now();
            metrics::job_started();
            let result = self.run_claimed(job, &logger).await;
            metrics::job_finished();

            if let Ok(outcome) = &result {
                metrics::record_job(outcome.label(), started.elapsed().as_secs_f64());
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run_claimed(&self, job: &AnalyzeMediaJob, logger: &JobLogger) -> WorkerResult<JobOutcome> {
        let claim =
            JobStateMachine::claim(Arc::clone(&self.store), self.events.clone(), &job.job_id)
                .await?;
        let mut machine = match claim {
            Claim::Acquired(machine) => machine,
            Claim::Skip(status) => {
                logger.log_warning(&format!("job is {}, acknowledging duplicate delivery", status));
                return Ok(JobOutcome::Skipped(status));
            }
            Claim::Orphaned => {
                logger.log_warning("no job record, acknowledging orphaned message");
                return Ok(JobOutcome::Orphaned);
            }
        };

        logger.log_start(&format!(
            "{} source, {} profile",
            job.source.kind.as_str(),
            job.profile.as_str()
        ));

        match self.finish(&mut machine, job, logger).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => self.abandon(job, logger, e).await,
        }
    }

    async fn finish(
        &self,
        machine: &mut JobStateMachine,
        job: &AnalyzeMediaJob,
        logger: &JobLogger,
    ) -> WorkerResult<JobOutcome> {
        let outcome = self.execute(machine, job, logger).await?;
        // A cancel that landed mid-stage wins over the stage's own result
        if !matches!(outcome, StageOutcome::Cancelled) && machine.is_cancelled().await? {
            logger.log_progress("cancelled during the last stage, discarding its result");
            return Ok(JobOutcome::Cancelled);
        }

        match outcome {
            StageOutcome::Completed(result) => {
                machine.complete(result.clone()).await?;
                logger.log_completion(&format!(
                    "{} ({:.2}) over {} frames",
                    result.verdict, result.confidence, result.frame_count
                ));
                Ok(JobOutcome::Completed(result))
            }
            StageOutcome::Failed(failure) => {
                logger.log_error(&failure.to_string());
                let error = failure.to_job_error();
                machine.fail(error.clone()).await?;
                Ok(JobOutcome::Failed(error))
            }
            StageOutcome::Cancelled => {
                logger.log_progress("cancelled, stopping at stage boundary");
                Ok(JobOutcome::Cancelled)
            }
        }
    }

    /// The store failed after the job was claimed. Try to leave it `failed`
    /// instead of stuck in `processing`.
    async fn abandon(
        &self,
        job: &AnalyzeMediaJob,
        logger: &JobLogger,
        cause: WorkerError,
    ) -> WorkerResult<JobOutcome> {
        if let WorkerError::TerminalState { status, .. } = &cause {
            logger.log_warning(&format!("job became {} during execution", status));
            return Ok(JobOutcome::Cancelled);
        }
        logger.log_error(&format!("infrastructure error: {}", cause));

        let error = JobError::new(
            ErrorCode::ProcessingError,
            "Analysis could not be completed. Please try again",
        );
        let retry = RetryConfig::new("mark_failed").with_max_retries(3);
        let store = self.store.as_ref();
        match retry_async(&retry, || force_fail(store, &job.job_id, error.clone()))
            .await
            .into_result()
        {
            Ok(None) => Ok(JobOutcome::Orphaned),
            Ok(Some(record)) if record.status == JobStatus::Cancelled => Ok(JobOutcome::Cancelled),
            Ok(Some(_)) => Ok(JobOutcome::Failed(error)),
            Err(e) => {
                warn!(job_id = %job.job_id, "Could not record failure: {}", e);
                Err(cause)
            }
        }
    }

    async fn execute(
        &self,
        machine: &mut JobStateMachine,
        job: &AnalyzeMediaJob,
        logger: &JobLogger,
    ) -> WorkerResult<StageOutcome> {
        let limits = self
            .config
            .limits_for(job.profile)
            .acquisition(job.options.max_duration);

        let probed = match self.acquirer.inspect(&job.job_id, &job.source, &limits).await {
            Ok(probed) => probed,
            Err(e) => return Ok(StageFailure::from(e).into()),
        };

        if machine.is_cancelled().await? {
            return Ok(StageOutcome::Cancelled);
        }
        machine.advance(Stage::Downloading, 5).await?;
        logger.log_stage(Stage::Downloading, machine.progress());

        let handle = match self.acquirer.download(&job.job_id, probed, &limits).await {
            Ok(handle) => handle,
            Err(e) => return Ok(StageFailure::from(e).into()),
        };

        // The scratch directory goes away on every path out of here
        let outcome = self.analyze_media(machine, job, &handle, logger).await;
        handle.release().await;
        outcome
    }

    async fn analyze_media(
        &self,
        machine: &mut JobStateMachine,
        job: &AnalyzeMediaJob,
        handle: &MediaHandle,
        logger: &JobLogger,
    ) -> WorkerResult<StageOutcome> {
        if machine.is_cancelled().await? {
            return Ok(StageOutcome::Cancelled);
        }
        machine
            .advance_with_media(Stage::Sampling, 20, handle.media_info())
            .await?;
        logger.log_stage(Stage::Sampling, machine.progress());

        let plan = SamplingPlan {
            rate: self.config.sampling_rate(job.options.sampling_rate),
            max_frames: self.config.limits_for(job.profile).max_frames,
        };
        let frames = match self.decoder.open(&handle.path).await {
            Ok(mut source) => match sample_frames(source.as_mut(), plan).await {
                Ok(frames) => frames,
                Err(e) => return Ok(StageFailure::from(e).into()),
            },
            Err(e) => return Ok(StageFailure::from(e).into()),
        };
        logger.log_progress(&format!("sampled {} frames at {} fps", frames.len(), plan.rate));

        if machine.is_cancelled().await? {
            return Ok(StageOutcome::Cancelled);
        }
        machine.advance(Stage::Scoring, SCORING_START).await?;
        logger.log_stage(Stage::Scoring, machine.progress());

        let detail_level = job.options.detail_level();
        let options = ScoreOptions { detail_level };
        let total = frames.len();
        let mut scores = Vec::with_capacity(total);
        for (i, frame) in frames.iter().enumerate() {
            let score = match score_frame(
                self.scorer.as_ref(),
                frame,
                &options,
                self.config.score_timeout,
            )
            .await
            {
                Ok(score) => score,
                Err(e) => return Ok(StageFailure::from(e).into()),
            };
            scores.push(score);
            machine.report_progress(scoring_progress(i + 1, total)).await?;
        }
        metrics::record_frames_scored(total as u64);
        drop(frames);

        if machine.is_cancelled().await? {
            return Ok(StageOutcome::Cancelled);
        }
        machine.advance(Stage::Aggregating, 90).await?;
        logger.log_stage(Stage::Aggregating, machine.progress());

        let ctx = ReportContext {
            source_id: handle.source_id.clone(),
            title: handle.title.clone(),
            duration_seconds: handle.duration_seconds,
            scorer: self.scorer.name().to_string(),
            detail_level,
            aggregation: self.config.aggregation,
        };
        Ok(StageOutcome::Completed(build_result(&scores, &ctx)))
    }
}

/// `30 + floor(60 * done / total)`
fn scoring_progress(done: usize, total: usize) -> u8 {
    if total == 0 {
        return SCORING_START;
    }
    let span = SCORING_SPAN * done.min(total) / total;
    SCORING_START + span as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use image::RgbImage;

    use fv_detect::{DetectError, DetectResult, ScorerOutput};
    use fv_media::{
        AcquireError, AcquireResult, AcquisitionLimits, FetchTarget, Frame, FrameSource,
        MediaError, MediaResult, SourceFetcher, SourceMetadata,
    };
    use fv_models::{
        AnalysisOptions, AnalysisProfile, JobId, JobRecord, RiskLevel, SourceDescriptor, Verdict,
    };
    use fv_store::MemoryJobStore;
    use tokio_test::assert_ok;

    const URL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";

    struct FakeFetcher {
        duration: f64,
        bytes: usize,
        downloads: AtomicUsize,
        last_dest: std::sync::Mutex<Option<PathBuf>>,
        /// Cancel this job through the store while the transfer is running
        cancel_during_fetch: std::sync::Mutex<Option<(Arc<MemoryJobStore>, JobId)>>,
        fail_fetch: bool,
    }

    impl FakeFetcher {
        fn new(duration: f64, bytes: usize) -> Self {
            Self {
                duration,
                bytes,
                downloads: AtomicUsize::new(0),
                last_dest: std::sync::Mutex::new(None),
                cancel_during_fetch: std::sync::Mutex::new(None),
                fail_fetch: false,
            }
        }

        fn cancel_during_fetch(&self, store: Arc<MemoryJobStore>, job_id: JobId) {
            *self.cancel_during_fetch.lock().unwrap() = Some((store, job_id));
        }

        fn scratch_parent(&self) -> Option<PathBuf> {
            self.last_dest
                .lock()
                .unwrap()
                .as_ref()
                .and_then(|p| p.parent().map(Path::to_path_buf))
        }
    }

    #[async_trait]
    impl SourceFetcher for FakeFetcher {
        async fn probe(&self, target: &FetchTarget) -> AcquireResult<SourceMetadata> {
            Ok(SourceMetadata {
                source_id: target.source_id(),
                title: Some("Test clip".to_string()),
                duration_seconds: Some(self.duration),
                height: Some(720),
                fps: Some(10.0),
            })
        }

        async fn fetch(
            &self,
            _target: &FetchTarget,
            dest: &Path,
            _limits: &AcquisitionLimits,
        ) -> AcquireResult<()> {
            self.downloads.fetch_add(1, Ordering::SeqCst);
            *self.last_dest.lock().unwrap() = Some(dest.to_path_buf());

            let cancel = self.cancel_during_fetch.lock().unwrap().take();
            if let Some((store, job_id)) = cancel {
                store.cancel(&job_id).await.unwrap();
            }
            if self.fail_fetch {
                return Err(AcquireError::download_failed("HTTP Error 503"));
            }
            tokio::fs::write(dest, vec![0u8; self.bytes])
                .await
                .map_err(|e| AcquireError::download_failed(e.to_string()))
        }
    }

    /// Decoder emitting `total` frames at 10 fps, or failing on open.
    struct FakeDecoder {
        total: usize,
        fail: bool,
    }

    struct FakeSource {
        remaining: usize,
    }

    #[async_trait]
    impl FrameSource for FakeSource {
        fn fps(&self) -> f64 {
            10.0
        }

        async fn next_frame(&mut self) -> MediaResult<Option<RgbImage>> {
            if self.remaining == 0 {
                return Ok(None);
            }
            self.remaining -= 1;
            Ok(Some(RgbImage::new(4, 4)))
        }

        async fn close(&mut self) -> MediaResult<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl FrameDecoder for FakeDecoder {
        async fn open(&self, _path: &Path) -> MediaResult<Box<dyn FrameSource>> {
            if self.fail {
                return Err(MediaError::invalid_video("moov atom not found"));
            }
            Ok(Box::new(FakeSource {
                remaining: self.total,
            }))
        }
    }

    /// Returns queued probabilities in order; optionally stalls on one frame.
    struct ScriptedScorer {
        probabilities: std::sync::Mutex<VecDeque<f64>>,
        stall_at: Option<u64>,
    }

    impl ScriptedScorer {
        fn new(probabilities: &[f64]) -> Self {
            Self {
                probabilities: std::sync::Mutex::new(probabilities.iter().copied().collect()),
                stall_at: None,
            }
        }
    }

    #[async_trait]
    impl FrameScorer for ScriptedScorer {
        async fn score(&self, frame: &Frame, _options: &ScoreOptions) -> DetectResult<ScorerOutput> {
            if self.stall_at == Some(frame.index) {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            let p = self
                .probabilities
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| DetectError::scorer_failed("script exhausted"))?;
            Ok(ScorerOutput::Probability {
                ai_probability: p,
                confidence: None,
            })
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    struct Harness {
        store: Arc<MemoryJobStore>,
        fetcher: Arc<FakeFetcher>,
        pipeline: AnalysisPipeline,
        _work: tempfile::TempDir,
    }

    fn harness(fetcher: FakeFetcher, decoder: FakeDecoder, scorer: ScriptedScorer) -> Harness {
        let work = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryJobStore::new());
        let fetcher = Arc::new(fetcher);
        let config = PipelineConfig {
            score_timeout: Duration::from_millis(100),
            ..PipelineConfig::default()
        };
        let pipeline = AnalysisPipeline::new(
            config,
            SourceAcquirer::new(fetcher.clone(), work.path()),
            Arc::new(decoder),
            Arc::new(scorer),
            store.clone(),
        );
        Harness {
            store,
            fetcher,
            pipeline,
            _work: work,
        }
    }

    async fn submit(store: &MemoryJobStore, profile: AnalysisProfile) -> AnalyzeMediaJob {
        let options = AnalysisOptions {
            sampling_rate: Some(1.0),
            ..Default::default()
        };
        let record = JobRecord::new(JobId::new(), SourceDescriptor::url(URL), options.clone());
        store.create(&record).await.unwrap();
        AnalyzeMediaJob::new(record.id, record.source)
            .with_options(options)
            .with_profile(profile)
    }

    fn ramp() -> Vec<f64> {
        let mut p = vec![0.1; 5];
        p.extend(vec![0.8; 5]);
        p
    }

    #[tokio::test]
    async fn test_successful_run_completes_with_monotonic_progress() {
        // 100 frames at 10 fps sampled at 1 fps: indices 0, 10, ..., 90
        let h = harness(
            FakeFetcher::new(10.0, 128),
            FakeDecoder {
                total: 100,
                fail: false,
            },
            ScriptedScorer::new(&ramp()),
        );
        let job = submit(&h.store, AnalysisProfile::Standard).await;

        let outcome = assert_ok!(h.pipeline.run(&job).await);
        let JobOutcome::Completed(result) = outcome else {
            panic!("expected completion, got {:?}", outcome);
        };
        assert_eq!(result.frame_count, 10);
        assert_eq!(result.segments.len(), 1);
        assert_eq!(result.segments[0].start, 5.0);
        assert_eq!(result.segments[0].end, 9.0);
        assert_eq!(result.verdict, Verdict::LikelyAi);
        assert_eq!(result.risk_level, RiskLevel::Medium);
        assert_eq!(result.scorer, "scripted");

        let record = h.store.require(&job.job_id).await.unwrap();
        assert_eq!(record.status, JobStatus::Completed);
        assert_eq!(record.stage, Stage::Completed);
        assert_eq!(record.progress, 100);
        assert_eq!(record.media.as_ref().unwrap().resolution, "720p");
        assert!(record.processing_completed_at.is_some());

        let progress = h.store.progress_history(&job.job_id).await;
        assert!(progress.windows(2).all(|w| w[0] <= w[1]), "{:?}", progress);
        assert_eq!(progress.last(), Some(&100));
        assert!(progress.contains(&20) && progress.contains(&90));

        let scratch = h.fetcher.scratch_parent().unwrap();
        assert!(!scratch.exists());
    }

    #[tokio::test]
    async fn test_demo_ceiling_fails_before_download() {
        let h = harness(
            FakeFetcher::new(400.0, 128),
            FakeDecoder {
                total: 10,
                fail: false,
            },
            ScriptedScorer::new(&[]),
        );
        let job = submit(&h.store, AnalysisProfile::Demo).await;

        let outcome = h.pipeline.run(&job).await.unwrap();
        let JobOutcome::Failed(error) = outcome else {
            panic!("expected failure");
        };
        assert_eq!(error.code, ErrorCode::SourceTooLong);
        assert_eq!(error.message, "Video exceeds 20 second limit");
        assert_eq!(h.fetcher.downloads.load(Ordering::SeqCst), 0);

        let record = h.store.require(&job.job_id).await.unwrap();
        assert_eq!(record.status, JobStatus::Failed);
        assert_eq!(record.stage, Stage::Failed);
        assert!(record.result.is_none());
    }

    #[tokio::test]
    async fn test_oversized_download_fails_and_cleans_up() {
        let h = harness(
            FakeFetcher::new(10.0, 2048),
            FakeDecoder {
                total: 10,
                fail: false,
            },
            ScriptedScorer::new(&[]),
        );
        let job = submit(&h.store, AnalysisProfile::Standard).await;

        // Shrink the byte cap so the fake file is over it
        let mut config = h.pipeline.config().clone();
        config.standard.max_file_size_bytes = 1024;
        let pipeline = AnalysisPipeline::new(
            config,
            SourceAcquirer::new(h.fetcher.clone(), h._work.path()),
            Arc::new(FakeDecoder {
                total: 10,
                fail: false,
            }),
            Arc::new(ScriptedScorer::new(&[])),
            h.store.clone(),
        );

        let outcome = pipeline.run(&job).await.unwrap();
        assert!(matches!(
            outcome,
            JobOutcome::Failed(ref e) if e.code == ErrorCode::FileTooLarge
        ));
        assert!(!h.fetcher.scratch_parent().unwrap().exists());
    }

    #[tokio::test]
    async fn test_decode_error_is_terminal() {
        let h = harness(
            FakeFetcher::new(10.0, 128),
            FakeDecoder {
                total: 0,
                fail: true,
            },
            ScriptedScorer::new(&[]),
        );
        let job = submit(&h.store, AnalysisProfile::Standard).await;

        let outcome = h.pipeline.run(&job).await.unwrap();
        assert!(matches!(
            outcome,
            JobOutcome::Failed(ref e) if e.code == ErrorCode::MediaDecodeError
        ));
        let record = h.store.require(&job.job_id).await.unwrap();
        assert_eq!(record.progress, 20);
        assert!(!h.fetcher.scratch_parent().unwrap().exists());
    }

    #[tokio::test]
    async fn test_scoring_timeout_fails_job_without_result() {
        let mut scorer = ScriptedScorer::new(&ramp());
        scorer.stall_at = Some(30);
        let h = harness(
            FakeFetcher::new(10.0, 128),
            FakeDecoder {
                total: 100,
                fail: false,
            },
            scorer,
        );
        let job = submit(&h.store, AnalysisProfile::Standard).await;

        let outcome = h.pipeline.run(&job).await.unwrap();
        assert!(matches!(
            outcome,
            JobOutcome::Failed(ref e) if e.code == ErrorCode::ScoringError
        ));

        let record = h.store.require(&job.job_id).await.unwrap();
        assert_eq!(record.status, JobStatus::Failed);
        assert!(record.result.is_none());
        // Three frames scored before the stall: 30 + 60 * 3 / 10
        assert_eq!(record.progress, 48);
    }

    #[tokio::test]
    async fn test_zero_frames_completes_authentic() {
        let h = harness(
            FakeFetcher::new(0.0, 128),
            FakeDecoder {
                total: 0,
                fail: false,
            },
            ScriptedScorer::new(&[]),
        );
        let job = submit(&h.store, AnalysisProfile::Standard).await;

        let outcome = h.pipeline.run(&job).await.unwrap();
        let JobOutcome::Completed(result) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(result.frame_count, 0);
        assert_eq!(result.verdict, Verdict::Authentic);
    }

    #[tokio::test]
    async fn test_duplicate_delivery_is_skipped() {
        let h = harness(
            FakeFetcher::new(10.0, 128),
            FakeDecoder {
                total: 20,
                fail: false,
            },
            ScriptedScorer::new(&[0.2, 0.2]),
        );
        let job = submit(&h.store, AnalysisProfile::Standard).await;

        assert!(matches!(
            h.pipeline.run(&job).await.unwrap(),
            JobOutcome::Completed(_)
        ));
        assert_eq!(
            h.pipeline.run(&job).await.unwrap(),
            JobOutcome::Skipped(JobStatus::Completed)
        );
        assert_eq!(h.fetcher.downloads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_job_is_left_alone() {
        let h = harness(
            FakeFetcher::new(10.0, 128),
            FakeDecoder {
                total: 20,
                fail: false,
            },
            ScriptedScorer::new(&[0.2, 0.2]),
        );
        let job = submit(&h.store, AnalysisProfile::Standard).await;
        h.store.cancel(&job.job_id).await.unwrap();

        assert_eq!(
            h.pipeline.run(&job).await.unwrap(),
            JobOutcome::Skipped(JobStatus::Cancelled)
        );
        assert_eq!(h.fetcher.downloads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stage_failure_after_cancel_keeps_cancelled() {
        let mut fetcher = FakeFetcher::new(10.0, 128);
        fetcher.fail_fetch = true;
        let h = harness(
            fetcher,
            FakeDecoder {
                total: 20,
                fail: false,
            },
            ScriptedScorer::new(&[]),
        );
        let job = submit(&h.store, AnalysisProfile::Standard).await;
        h.fetcher.cancel_during_fetch(h.store.clone(), job.job_id.clone());

        assert_eq!(h.pipeline.run(&job).await.unwrap(), JobOutcome::Cancelled);

        let record = h.store.require(&job.job_id).await.unwrap();
        assert_eq!(record.status, JobStatus::Cancelled);
        assert!(record.error.is_none());
        let statuses: Vec<JobStatus> = h
            .store
            .history(&job.job_id)
            .await
            .iter()
            .map(|r| r.status)
            .collect();
        assert_eq!(statuses.last(), Some(&JobStatus::Cancelled));
        assert!(!statuses.contains(&JobStatus::Failed), "{:?}", statuses);
    }

    #[tokio::test]
    async fn test_cancel_between_stages_stops_and_cleans_up() {
        let h = harness(
            FakeFetcher::new(10.0, 128),
            FakeDecoder {
                total: 20,
                fail: false,
            },
            ScriptedScorer::new(&[0.2, 0.2]),
        );
        let job = submit(&h.store, AnalysisProfile::Standard).await;
        h.fetcher.cancel_during_fetch(h.store.clone(), job.job_id.clone());

        assert_eq!(h.pipeline.run(&job).await.unwrap(), JobOutcome::Cancelled);

        let record = h.store.require(&job.job_id).await.unwrap();
        assert_eq!(record.status, JobStatus::Cancelled);
        assert!(record.result.is_none());
        assert!(record.media.is_none());
        // Nothing past the downloading stage was written
        assert_eq!(record.progress, 5);
        assert!(!h.fetcher.scratch_parent().unwrap().exists());
    }

    #[tokio::test]
    async fn test_missing_record_is_orphaned() {
        let h = harness(
            FakeFetcher::new(10.0, 128),
            FakeDecoder {
                total: 1,
                fail: false,
            },
            ScriptedScorer::new(&[]),
        );
        let job = AnalyzeMediaJob::new(JobId::new(), SourceDescriptor::url(URL));
        assert_eq!(h.pipeline.run(&job).await.unwrap(), JobOutcome::Orphaned);
    }

    #[tokio::test]
    async fn test_store_outage_after_claim_marks_failed() {
        let h = harness(
            FakeFetcher::new(10.0, 128),
            FakeDecoder {
                total: 20,
                fail: false,
            },
            ScriptedScorer::new(&[0.2, 0.2]),
        );
        let job = submit(&h.store, AnalysisProfile::Standard).await;

        // Claim succeeds, then the next write hits an outage
        let claim = JobStateMachine::claim(h.store.clone(), None, &job.job_id)
            .await
            .unwrap();
        let Claim::Acquired(mut machine) = claim else {
            panic!("expected claim");
        };
        h.store.fail_next_writes(1);
        let err = machine.advance(Stage::Downloading, 5).await.unwrap_err();

        let logger = JobLogger::new(&job.job_id, "test");
        let outcome = h.pipeline.abandon(&job, &logger, err).await.unwrap();
        assert!(matches!(
            outcome,
            JobOutcome::Failed(ref e) if e.code == ErrorCode::ProcessingError
        ));
        let record = h.store.require(&job.job_id).await.unwrap();
        assert_eq!(record.status, JobStatus::Failed);
    }

    #[test]
    fn test_scoring_progress() {
        assert_eq!(scoring_progress(0, 0), 30);
        assert_eq!(scoring_progress(1, 10), 36);
        assert_eq!(scoring_progress(10, 10), 90);
        assert_eq!(scoring_progress(1, 3), 50);
        assert_eq!(scoring_progress(20, 10), 90);
    }
}
