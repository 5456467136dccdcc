//! In-memory job store.
//!
//! Used by the inline demo path and by tests. Every successful write is
//! kept as a snapshot so tests can assert on the sequence pollers would
//! have observed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use fv_models::{JobId, JobRecord, JobUpdate};

use crate::error::{StoreError, StoreResult};
use crate::store::JobStore;

#[derive(Default)]
struct Inner {
    records: HashMap<JobId, JobRecord>,
    history: HashMap<JobId, Vec<JobRecord>>,
}

/// Job store backed by a mutex-guarded map.
#[derive(Default)]
pub struct MemoryJobStore {
    inner: Mutex<Inner>,
    /// Number of upcoming writes that fail with `Unavailable`
    failing_writes: AtomicU32,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` calls to `apply` fail as if the store were down.
    pub fn fail_next_writes(&self, count: u32) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    /// Every record state written for `job_id`, oldest first.
    pub async fn history(&self, job_id: &JobId) -> Vec<JobRecord> {
        let inner = self.inner.lock().await;
        inner.history.get(job_id).cloned().unwrap_or_default()
    }

    /// Progress values in write order.
    pub async fn progress_history(&self, job_id: &JobId) -> Vec<u8> {
        self.history(job_id)
            .await
            .iter()
            .map(|r| r.progress)
            .collect()
    }

    fn take_failure(&self) -> bool {
        self.failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, record: &JobRecord) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.records.contains_key(&record.id) {
            return Err(StoreError::AlreadyExists(record.id.clone()));
        }
        inner.records.insert(record.id.clone(), record.clone());
        inner
            .history
            .insert(record.id.clone(), vec![record.clone()]);
        Ok(())
    }

    async fn get(&self, job_id: &JobId) -> StoreResult<Option<JobRecord>> {
        let inner = self.inner.lock().await;
        Ok(inner.records.get(job_id).cloned())
    }

    async fn apply(&self, job_id: &JobId, update: &JobUpdate) -> StoreResult<()> {
        if self.take_failure() {
            return Err(StoreError::unavailable("injected write failure"));
        }

        let mut inner = self.inner.lock().await;
        let snapshot = {
            let record = inner
                .records
                .get_mut(job_id)
                .ok_or_else(|| StoreError::NotFound(job_id.clone()))?;
            record.apply(update);
            record.clone()
        };
        inner
            .history
            .entry(job_id.clone())
            .or_default()
            .push(snapshot);
        Ok(())
    }
}
