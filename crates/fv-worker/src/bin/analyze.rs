//! Inline analysis without a queue.
//!
//! ```text
//! fv-analyze <url|path> [--upload] [--full] [--standard]
//! ```
//!
//! Runs the demo profile unless `--standard` is given and prints the final
//! job record as JSON. Exits non-zero when the job does not complete.

use std::sync::Arc;

use anyhow::{bail, Context};

use fv_detect::StatisticalScorer;
use fv_media::{CliFetcher, FfmpegDecoder, SourceAcquirer};
use fv_models::{AnalysisOptions, AnalysisProfile, JobId, JobRecord, JobStatus, SourceDescriptor};
use fv_queue::AnalyzeMediaJob;
use fv_store::{JobStore, MemoryJobStore};
use fv_worker::{init_tracing, AnalysisPipeline, PipelineConfig, WorkerConfig};

const USAGE: &str = "usage: fv-analyze <url|path> [--upload] [--full] [--standard]";

struct Args {
    locator: String,
    upload: bool,
    full: bool,
    profile: AnalysisProfile,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut locator = None;
    let mut upload = false;
    let mut full = false;
    let mut profile = AnalysisProfile::Demo;

    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--upload" => upload = true,
            "--full" => full = true,
            "--standard" => profile = AnalysisProfile::Standard,
            "-h" | "--help" => bail!(USAGE),
            flag if flag.starts_with("--") => bail!("unknown flag {}\n{}", flag, USAGE),
            _ if locator.is_some() => bail!("more than one source given\n{}", USAGE),
            _ => locator = Some(arg.clone()),
        }
    }

    Ok(Args {
        locator: locator.context(USAGE)?,
        upload,
        full,
        profile,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let args = parse_args()?;
    let worker_config = WorkerConfig::from_env();
    let pipeline_config = PipelineConfig::from_env();

    let source = if args.upload {
        SourceDescriptor::upload(args.locator)
    } else {
        SourceDescriptor::url(args.locator)
    };
    let options = AnalysisOptions {
        detail_level: args.full.then(|| "full".to_string()),
        ..Default::default()
    };

    let store = Arc::new(MemoryJobStore::new());
    let record = JobRecord::new(JobId::new(), source, options.clone());
    store.create(&record).await?;

    let pipeline = AnalysisPipeline::new(
        pipeline_config.clone(),
        SourceAcquirer::new(Arc::new(CliFetcher::new()), &worker_config.work_dir),
        Arc::new(FfmpegDecoder::new(pipeline_config.frame_max_dimension)),
        Arc::new(StatisticalScorer::new()),
        store.clone(),
    );

    let job = AnalyzeMediaJob::new(record.id.clone(), record.source.clone())
        .with_options(options)
        .with_profile(args.profile);
    pipeline.run(&job).await?;

    let finished = store.require(&record.id).await?;
    println!("{}", serde_json::to_string_pretty(&finished)?);

    if finished.status != JobStatus::Completed {
        std::process::exit(1);
    }
    Ok(())
}
