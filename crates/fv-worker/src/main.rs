//! Media analysis worker binary.

use std::sync::Arc;

use tracing::{error, info};

use fv_detect::StatisticalScorer;
use fv_media::{CliFetcher, FfmpegDecoder, SourceAcquirer};
use fv_queue::{JobQueue, ProgressChannel, QueueConfig};
use fv_store::RedisJobStore;
use fv_worker::{init_tracing, metrics, AnalysisPipeline, JobExecutor, PipelineConfig, WorkerConfig};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    info!("Starting fv-worker");

    let config = WorkerConfig::from_env();
    let pipeline_config = PipelineConfig::from_env();
    info!("Worker config: {:?}", config);
    info!("Pipeline config: {:?}", pipeline_config);

    if let Some(port) = config.metrics_port {
        if let Err(e) = metrics::install_exporter(port) {
            error!("Failed to install metrics exporter: {}", e);
            std::process::exit(1);
        }
        info!("Serving metrics on port {}", port);
    }

    let queue_config = QueueConfig::from_env();
    let events = match ProgressChannel::new(&queue_config.redis_url) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            error!("Failed to create progress channel: {}", e);
            std::process::exit(1);
        }
    };

    let queue = match JobQueue::new(queue_config) {
        Ok(q) => q,
        Err(e) => {
            error!("Failed to create job queue: {}", e);
            std::process::exit(1);
        }
    };

    let store = match RedisJobStore::from_env() {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!("Failed to create job store: {}", e);
            std::process::exit(1);
        }
    };

    let pipeline = AnalysisPipeline::new(
        pipeline_config.clone(),
        SourceAcquirer::new(Arc::new(CliFetcher::new()), &config.work_dir),
        Arc::new(FfmpegDecoder::new(pipeline_config.frame_max_dimension)),
        Arc::new(StatisticalScorer::new()),
        store,
    )
    .with_progress_channel(events);

    let executor = Arc::new(JobExecutor::new(config, queue, pipeline));

    let shutdown_executor = Arc::clone(&executor);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            shutdown_executor.shutdown();
        }
    });

    if let Err(e) = executor.run().await {
        error!("Executor error: {}", e);
        std::process::exit(1);
    }

    info!("Worker shutdown complete");
}
