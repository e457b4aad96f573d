//! In-memory fakes for storage traits (testing only)
//!
//! Provides `MemoryJobStore`, `MemorySampleStore`, and `MemoryBlobStore`
//! that satisfy the trait contracts without any external dependencies.
//! Each fake can be switched into a failing mode to exercise error paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::StorageError;
use crate::storage_traits::*;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// MemoryJobStore
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct JobState {
    record: JobRecord,
    history: Vec<JobRecord>,
}

/// In-memory job store backed by a `HashMap<job_id, JobState>`.
///
/// Every accepted write is appended to a per-job history so tests can
/// inspect the exact sequence of checkpoints a job went through.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<String, JobState>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All snapshots written for a job, oldest first (insert included).
    pub fn history(&self, job_id: &JobId) -> Vec<JobRecord> {
        lock(&self.jobs)
            .get(&job_id.0)
            .map(|state| state.history.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, record: JobRecord) -> StorageResult<()> {
        let mut jobs = lock(&self.jobs);
        if jobs.contains_key(&record.job_id.0) {
            return Err(StorageError::DuplicateJob {
                job_id: record.job_id.0.clone(),
            });
        }
        jobs.insert(
            record.job_id.0.clone(),
            JobState {
                history: vec![record.clone()],
                record,
            },
        );
        Ok(())
    }

    async fn update(&self, job_id: &JobId, patch: JobPatch) -> StorageResult<JobRecord> {
        let mut jobs = lock(&self.jobs);
        let state = jobs
            .get_mut(&job_id.0)
            .ok_or_else(|| StorageError::JobNotFound {
                job_id: job_id.0.clone(),
            })?;
        let mut next = state.record.clone();
        next.apply(&patch)?;
        state.record = next.clone();
        state.history.push(next.clone());
        Ok(next)
    }

    async fn get(&self, job_id: &JobId) -> StorageResult<Option<JobRecord>> {
        Ok(lock(&self.jobs).get(&job_id.0).map(|s| s.record.clone()))
    }
}

// ---------------------------------------------------------------------------
// MemorySampleStore
// ---------------------------------------------------------------------------

/// In-memory panel store backed by a `HashMap<sample_id, PanelRecord>`.
#[derive(Debug, Default)]
pub struct MemorySampleStore {
    panels: Mutex<HashMap<String, PanelRecord>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemorySampleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `get_panel` fail with a backend error.
    pub fn set_failing_reads(&self, failing: bool) {
        self.fail_reads.store(failing, Ordering::SeqCst);
    }

    /// Make every subsequent `put_panel` fail with a backend error.
    pub fn set_failing_writes(&self, failing: bool) {
        self.fail_writes.store(failing, Ordering::SeqCst);
    }

    /// Number of panels written by `put_panel` or a winning
    /// `insert_panel_if_absent`.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SampleStore for MemorySampleStore {
    async fn get_panel(&self, sample_id: &str) -> StorageResult<Option<PanelRecord>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("sample store unavailable".to_string()));
        }
        Ok(lock(&self.panels).get(sample_id).cloned())
    }

    async fn insert_panel_if_absent(&self, panel: PanelRecord) -> StorageResult<PanelInsert> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("sample store rejected write".to_string()));
        }
        let mut panels = lock(&self.panels);
        if let Some(existing) = panels.get(&panel.sample_id) {
            return Ok(PanelInsert::Existing(existing.clone()));
        }
        panels.insert(panel.sample_id.clone(), panel.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(PanelInsert::Created(panel))
    }

    async fn put_panel(&self, panel: PanelRecord) -> StorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("sample store rejected write".to_string()));
        }
        lock(&self.panels).insert(panel.sample_id.clone(), panel);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryBlobStore
// ---------------------------------------------------------------------------

/// In-memory blob store; URLs take the form `memory://<path>`.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    fail_uploads: AtomicBool,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent upload fail.
    pub fn set_failing(&self, failing: bool) {
        self.fail_uploads.store(failing, Ordering::SeqCst);
    }

    /// Bytes stored under `path`, if any.
    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        lock(&self.blobs).get(path).cloned()
    }

    /// Paths uploaded so far, sorted.
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = lock(&self.blobs).keys().cloned().collect();
        paths.sort();
        paths
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(&self, path: &str, bytes: Vec<u8>) -> StorageResult<String> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(StorageError::Blob {
                path: path.to_string(),
                reason: "blob store unavailable".to_string(),
            });
        }
        lock(&self.blobs).insert(path.to_string(), bytes);
        Ok(format!("memory://{path}"))
    }
}
