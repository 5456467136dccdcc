//! Redis job store integration tests.

use fv_models::{
    AnalysisOptions, ErrorCode, JobError, JobId, JobRecord, JobStatus, JobUpdate, SourceDescriptor,
    Stage,
};
use fv_store::{JobStore, RedisJobStore, StoreConfig, StoreError};

fn store() -> RedisJobStore {
    dotenvy::dotenv().ok();
    let config = StoreConfig {
        key_prefix: "fv:test:job".to_string(),
        ..StoreConfig::from_env()
    };
    RedisJobStore::new(config).expect("Failed to create store")
}

fn record() -> JobRecord {
    JobRecord::new(
        JobId::new(),
        SourceDescriptor::url("https://youtu.be/dQw4w9WgXcQ"),
        AnalysisOptions::default(),
    )
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_create_apply_get() {
    let store = store();
    let job = record();
    store.create(&job).await.expect("Failed to create");
    assert!(matches!(
        store.create(&job).await,
        Err(StoreError::AlreadyExists(_))
    ));

    store
        .apply(
            &job.id,
            &JobUpdate::new()
                .with_status(JobStatus::Processing)
                .with_progress(30)
                .with_stage(Stage::Scoring)
                .started_now(),
        )
        .await
        .expect("Failed to apply");

    let stored = store.require(&job.id).await.unwrap();
    assert_eq!(stored.status, JobStatus::Processing);
    assert_eq!(stored.progress, 30);
    assert_eq!(stored.stage, Stage::Scoring);
    assert!(stored.processing_started_at.is_some());
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_failure_fields_and_missing_record() {
    let store = store();
    let job = record();
    store.create(&job).await.unwrap();

    store
        .apply(
            &job.id,
            &JobUpdate::new()
                .with_status(JobStatus::Failed)
                .with_stage(Stage::Failed)
                .with_error(JobError::new(ErrorCode::DownloadFailed, "Failed to download video. Please try again")),
        )
        .await
        .unwrap();

    let stored = store.require(&job.id).await.unwrap();
    assert_eq!(stored.error.map(|e| e.code), Some(ErrorCode::DownloadFailed));

    let missing = store
        .apply(&JobId::new(), &JobUpdate::new().with_progress(1))
        .await;
    assert!(matches!(missing, Err(StoreError::NotFound(_))));
    assert!(store.get(&JobId::new()).await.unwrap().is_none());
}
