//! Redis-backed job store.
//!
//! Each job is a hash at `{prefix}:{job_id}`. Scalar fields (`status`,
//! `progress`, `current_stage`, `error_code`, `error_message`, timestamps)
//! are stored as plain strings so pollers can read them with HGET; nested
//! values (`source`, `options`, `media`, `result`) are JSON.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::{AsyncCommands, Script};
use tracing::debug;

use fv_models::{ErrorCode, JobError, JobId, JobRecord, JobStatus, JobUpdate, Stage};

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::store::JobStore;

/// `ARGV[1]` is the mode, `ARGV[2]` the number of field/value pairs that
/// follow; any trailing arguments are fields to delete. Mode "update"
/// requires the hash to exist and "create" requires it not to.
const WRITE_SCRIPT: &str = r#"
local exists = redis.call('EXISTS', KEYS[1]) == 1
local mode = ARGV[1]
if (mode == 'update' and not exists) or (mode == 'create' and exists) then
    return 0
end
local n = tonumber(ARGV[2])
local i = 3
if n > 0 then
    local args = {}
    for j = 0, n * 2 - 1 do
        args[#args + 1] = ARGV[i + j]
    end
    redis.call('HSET', KEYS[1], unpack(args))
end
i = i + n * 2
if #ARGV >= i then
    local dels = {}
    for j = i, #ARGV do
        dels[#dels + 1] = ARGV[j]
    end
    redis.call('HDEL', KEYS[1], unpack(dels))
end
return 1
"#;

type Fields = Vec<(&'static str, String)>;

/// Job store over Redis hashes.
#[derive(Clone)]
pub struct RedisJobStore {
    client: redis::Client,
    config: StoreConfig,
}

impl RedisJobStore {
    pub fn new(config: StoreConfig) -> StoreResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> StoreResult<Self> {
        Self::new(StoreConfig::from_env())
    }

    fn key(&self, job_id: &JobId) -> String {
        format!("{}:{}", self.config.key_prefix, job_id)
    }

    async fn write(
        &self,
        job_id: &JobId,
        mode: &str,
        set: Fields,
        del: Vec<&'static str>,
    ) -> StoreResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let script = Script::new(WRITE_SCRIPT);
        let mut invocation = script.key(self.key(job_id));
        invocation.arg(mode).arg(set.len());
        for (field, value) in &set {
            invocation.arg(*field).arg(value);
        }
        for field in &del {
            invocation.arg(*field);
        }

        let written: i32 = invocation.invoke_async(&mut conn).await?;
        Ok(written == 1)
    }
}

fn ts(at: &DateTime<Utc>) -> String {
    at.to_rfc3339()
}

/// Field writes and deletions for an update. `updated_at` is always set.
pub(crate) fn update_fields(update: &JobUpdate) -> StoreResult<(Fields, Vec<&'static str>)> {
    let mut set: Fields = Vec::new();
    let mut del = Vec::new();

    if let Some(status) = update.status {
        set.push(("status", status.as_str().to_string()));
        if status != JobStatus::Failed && update.error.is_none() {
            del.push("error_code");
            del.push("error_message");
        }
    }
    if let Some(progress) = update.progress {
        set.push(("progress", progress.min(100).to_string()));
    }
    if let Some(stage) = update.stage {
        set.push(("current_stage", stage.as_str().to_string()));
    }
    if let Some(error) = &update.error {
        set.push(("error_code", error.code.as_str().to_string()));
        set.push(("error_message", error.message.clone()));
    }
    if let Some(media) = &update.media {
        set.push(("media", serde_json::to_string(media)?));
    }
    if let Some(result) = &update.result {
        set.push(("result", serde_json::to_string(result)?));
    }
    if let Some(at) = &update.processing_started_at {
        set.push(("processing_started_at", ts(at)));
    }
    if let Some(at) = &update.processing_completed_at {
        set.push(("processing_completed_at", ts(at)));
    }
    set.push(("updated_at", ts(&Utc::now())));

    Ok((set, del))
}

/// All fields of a freshly created record.
pub(crate) fn record_fields(record: &JobRecord) -> StoreResult<Fields> {
    let mut set: Fields = vec![
        ("id", record.id.to_string()),
        ("source", serde_json::to_string(&record.source)?),
        ("options", serde_json::to_string(&record.options)?),
        ("status", record.status.as_str().to_string()),
        ("progress", record.progress.to_string()),
        ("current_stage", record.stage.as_str().to_string()),
        ("created_at", ts(&record.created_at)),
        ("updated_at", ts(&record.updated_at)),
    ];
    if let Some(error) = &record.error {
        set.push(("error_code", error.code.as_str().to_string()));
        set.push(("error_message", error.message.clone()));
    }
    if let Some(media) = &record.media {
        set.push(("media", serde_json::to_string(media)?));
    }
    if let Some(result) = &record.result {
        set.push(("result", serde_json::to_string(result)?));
    }
    if let Some(at) = &record.processing_started_at {
        set.push(("processing_started_at", ts(at)));
    }
    if let Some(at) = &record.processing_completed_at {
        set.push(("processing_completed_at", ts(at)));
    }
    Ok(set)
}

/// Rebuild a record from its hash fields.
pub(crate) fn record_from_hash(
    job_id: &JobId,
    mut hash: HashMap<String, String>,
) -> StoreResult<JobRecord> {
    let mut take = |field: &str| hash.remove(field);

    let required = |value: Option<String>, field: &str| {
        value.ok_or_else(|| StoreError::corrupt(job_id, format!("missing field {}", field)))
    };
    let parse_ts = |value: &str, field: &str| {
        DateTime::parse_from_rfc3339(value)
            .map(|d| d.with_timezone(&Utc))
            .map_err(|e| StoreError::corrupt(job_id, format!("bad {}: {}", field, e)))
    };

    let source = serde_json::from_str(&required(take("source"), "source")?)?;
    let options = match take("options") {
        Some(raw) => serde_json::from_str(&raw)?,
        None => Default::default(),
    };

    let status_raw = required(take("status"), "status")?;
    let status = JobStatus::parse(&status_raw)
        .ok_or_else(|| StoreError::corrupt(job_id, format!("unknown status {}", status_raw)))?;
    let progress = take("progress")
        .and_then(|p| p.parse::<u8>().ok())
        .unwrap_or(0)
        .min(100);
    let stage = take("current_stage")
        .and_then(|s| Stage::parse(&s))
        .unwrap_or_default();

    let error = match (take("error_code"), take("error_message")) {
        (Some(code), message) => Some(JobError::new(
            ErrorCode::parse(&code),
            message.unwrap_or_default(),
        )),
        (None, _) => None,
    };
    let media = take("media").map(|m| serde_json::from_str(&m)).transpose()?;
    let result = take("result").map(|r| serde_json::from_str(&r)).transpose()?;

    let created_at = parse_ts(&required(take("created_at"), "created_at")?, "created_at")?;
    let updated_at = match take("updated_at") {
        Some(raw) => parse_ts(&raw, "updated_at")?,
        None => created_at,
    };
    let processing_started_at = take("processing_started_at")
        .map(|raw| parse_ts(&raw, "processing_started_at"))
        .transpose()?;
    let processing_completed_at = take("processing_completed_at")
        .map(|raw| parse_ts(&raw, "processing_completed_at"))
        .transpose()?;

    Ok(JobRecord {
        id: job_id.clone(),
        source,
        options,
        status,
        progress,
        stage,
        error,
        media,
        result,
        created_at,
        updated_at,
        processing_started_at,
        processing_completed_at,
    })
}

#[async_trait]
impl JobStore for RedisJobStore {
    async fn create(&self, record: &JobRecord) -> StoreResult<()> {
        let fields = record_fields(record)?;
        if !self.write(&record.id, "create", fields, Vec::new()).await? {
            return Err(StoreError::AlreadyExists(record.id.clone()));
        }
        debug!(job_id = %record.id, "Created job record");
        Ok(())
    }

    async fn get(&self, job_id: &JobId) -> StoreResult<Option<JobRecord>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let hash: HashMap<String, String> = conn.hgetall(self.key(job_id)).await?;
        if hash.is_empty() {
            return Ok(None);
        }
        record_from_hash(job_id, hash).map(Some)
    }

    async fn apply(&self, job_id: &JobId, update: &JobUpdate) -> StoreResult<()> {
        let (set, del) = update_fields(update)?;
        if !self.write(job_id, "update", set, del).await? {
            return Err(StoreError::NotFound(job_id.clone()));
        }
        debug!(job_id = %job_id, "Applied job update");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fv_models::{AnalysisOptions, MediaInfo, SourceDescriptor};

    fn to_hash(fields: Fields) -> HashMap<String, String> {
        fields
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    fn record() -> JobRecord {
        JobRecord::new(
            JobId::from_string("job-1"),
            SourceDescriptor::url("https://youtu.be/dQw4w9WgXcQ"),
            AnalysisOptions {
                sampling_rate: Some(2.0),
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_record_hash_round_trip() {
        let mut job = record();
        job.apply(
            &JobUpdate::new()
                .with_status(JobStatus::Processing)
                .with_progress(20)
                .with_stage(Stage::Sampling)
                .with_media(MediaInfo {
                    source_id: "dQw4w9WgXcQ".to_string(),
                    title: "Clip".to_string(),
                    duration_seconds: 12.5,
                    resolution: "720p".to_string(),
                    fps: 30.0,
                    size_bytes: 1024,
                })
                .started_now(),
        );

        let hash = to_hash(record_fields(&job).unwrap());
        assert_eq!(hash["status"], "processing");
        assert_eq!(hash["current_stage"], "sampling");
        assert_eq!(hash["progress"], "20");

        let back = record_from_hash(&job.id, hash).unwrap();
        assert_eq!(back.status, JobStatus::Processing);
        assert_eq!(back.progress, 20);
        assert_eq!(back.media, job.media);
        assert_eq!(back.options, job.options);
        assert_eq!(back.processing_started_at, job.processing_started_at);
    }

    #[test]
    fn test_failed_update_writes_error_fields() {
        let update = JobUpdate::new()
            .with_status(JobStatus::Failed)
            .with_stage(Stage::Failed)
            .with_error(JobError::new(ErrorCode::SourceTooLong, "Video exceeds 20 second limit"));
        let (set, del) = update_fields(&update).unwrap();
        let hash = to_hash(set);

        assert_eq!(hash["status"], "failed");
        assert_eq!(hash["error_code"], "SOURCE_TOO_LONG");
        assert_eq!(hash["error_message"], "Video exceeds 20 second limit");
        assert!(hash.contains_key("updated_at"));
        assert!(del.is_empty());
        assert!(!hash.contains_key("progress"));
    }

    #[test]
    fn test_non_failed_status_clears_error() {
        let update = JobUpdate::new().with_status(JobStatus::Processing);
        let (_, del) = update_fields(&update).unwrap();
        assert_eq!(del, vec!["error_code", "error_message"]);
    }

    #[test]
    fn test_corrupt_status_rejected() {
        let mut hash = to_hash(record_fields(&record()).unwrap());
        hash.insert("status".to_string(), "exploded".to_string());
        let err = record_from_hash(&JobId::from_string("job-1"), hash).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }
}
