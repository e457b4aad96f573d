//! Storage trait definitions for PsycSim
//!
//! These traits define the collaborator boundaries of the simulation pipeline:
//! - `JobStore`: Job-state records read by polling clients
//! - `SampleStore`: Persona panels persisted per sample
//! - `BlobStore`: Durable storage for finished report artifacts
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// JobStore: job state records
// ---------------------------------------------------------------------------

/// Caller-supplied opaque job identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        JobId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of a simulation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Started,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    /// Completed and Failed accept no further writes.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Started => "Started",
            JobStatus::Running => "Running",
            JobStatus::Completed => "Completed",
            JobStatus::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summed token counters for one pipeline stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenTally {
    pub prompt_tokens: u64,
    pub response_tokens: u64,
    pub total_tokens: u64,
}

/// Token usage of a finished job, split by stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageTotals {
    pub generation: TokenTally,
    pub evaluation: TokenTally,
}

/// Full job record as seen by polling clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: JobId,
    pub status: JobStatus,
    /// Percentage in `[0, 100]`; only ever moves forward.
    pub progress: u8,
    pub owner_id: String,
    pub sample_name: String,
    pub simulation_name: String,
    /// Run configuration as submitted. Never rewritten after insert.
    pub spec: serde_json::Value,
    /// Public URL of the report artifact, present once Completed.
    pub result_location: Option<String>,
    /// Message of the failure that moved the job to Failed.
    pub error: Option<String>,
    pub usage: Option<UsageTotals>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    /// Create a record in the `Started` state at 0%.
    pub fn started(
        job_id: JobId,
        owner_id: impl Into<String>,
        sample_name: impl Into<String>,
        simulation_name: impl Into<String>,
        spec: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            status: JobStatus::Started,
            progress: 0,
            owner_id: owner_id.into(),
            sample_name: sample_name.into(),
            simulation_name: simulation_name.into(),
            spec,
            result_location: None,
            error: None,
            usage: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a patch, enforcing the job lifecycle invariants.
    ///
    /// Every store routes updates through this method, so the rules live in
    /// one place:
    /// - terminal jobs (Completed, Failed) accept no further patches
    /// - progress never decreases and never exceeds 100
    /// - a job cannot move back to Started
    /// - the patch that fails a job leaves progress where it was
    /// - Completed requires progress 100 and a result location
    pub fn apply(&mut self, patch: &JobPatch) -> StorageResult<()> {
        let reject = |reason: String| StorageError::InvalidTransition {
            job_id: self.job_id.0.clone(),
            reason,
        };

        if self.status.is_terminal() {
            return Err(reject(format!("job is already {}", self.status)));
        }

        let next_status = patch.status.unwrap_or(self.status);
        let next_progress = patch.progress.unwrap_or(self.progress);

        if next_progress > 100 {
            return Err(reject(format!("progress {next_progress} exceeds 100")));
        }
        if next_progress < self.progress {
            return Err(reject(format!(
                "progress cannot move from {} back to {}",
                self.progress, next_progress
            )));
        }
        if next_status == JobStatus::Started && self.status != JobStatus::Started {
            return Err(reject(format!("cannot return to Started from {}", self.status)));
        }
        if next_status == JobStatus::Failed && next_progress != self.progress {
            return Err(reject("a failing patch must not change progress".to_string()));
        }
        if next_status == JobStatus::Completed {
            let has_location =
                patch.result_location.is_some() || self.result_location.is_some();
            if next_progress != 100 || !has_location {
                return Err(reject(
                    "Completed requires progress 100 and a result location".to_string(),
                ));
            }
        }

        self.status = next_status;
        self.progress = next_progress;
        if let Some(location) = &patch.result_location {
            self.result_location = Some(location.clone());
        }
        if let Some(error) = &patch.error {
            self.error = Some(error.clone());
        }
        if let Some(usage) = patch.usage {
            self.usage = Some(usage);
        }
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Partial update of a job record. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub progress: Option<u8>,
    pub result_location: Option<String>,
    pub error: Option<String>,
    pub usage: Option<UsageTotals>,
}

impl JobPatch {
    /// A `Running` checkpoint at the given percentage.
    pub fn checkpoint(progress: u8) -> Self {
        Self {
            status: Some(JobStatus::Running),
            progress: Some(progress),
            ..Self::default()
        }
    }

    /// The final `Completed` write: 100%, location and usage together.
    pub fn completed(result_location: impl Into<String>, usage: UsageTotals) -> Self {
        Self {
            status: Some(JobStatus::Completed),
            progress: Some(100),
            result_location: Some(result_location.into()),
            usage: Some(usage),
            ..Self::default()
        }
    }

    /// Move to `Failed`, keeping progress frozen.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Failed),
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// Keyed job-state store.
///
/// Guarantees:
/// - `insert` fails with `DuplicateJob` if the id is already present.
/// - `update` is atomic per record and validated by [`JobRecord::apply`].
/// - `get` never mutates.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a freshly created job record.
    async fn insert(&self, record: JobRecord) -> StorageResult<()>;

    /// Apply a partial update, returning the resulting record.
    async fn update(&self, job_id: &JobId, patch: JobPatch) -> StorageResult<JobRecord>;

    /// Fetch a job record, or `None` when the id is unknown.
    async fn get(&self, job_id: &JobId) -> StorageResult<Option<JobRecord>>;
}

// ---------------------------------------------------------------------------
// SampleStore: persona panels
// ---------------------------------------------------------------------------

/// The persisted persona panel of one sample.
///
/// Personas are stored as opaque JSON objects; the core crate owns their
/// shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelRecord {
    pub sample_id: String,
    pub personas: Vec<serde_json::Value>,
    pub generated_at: DateTime<Utc>,
}

impl PanelRecord {
    pub fn new(sample_id: impl Into<String>, personas: Vec<serde_json::Value>) -> Self {
        Self {
            sample_id: sample_id.into(),
            personas,
            generated_at: Utc::now(),
        }
    }
}

/// Outcome of [`SampleStore::insert_panel_if_absent`].
#[derive(Debug, Clone, PartialEq)]
pub enum PanelInsert {
    /// The offered panel was stored.
    Created(PanelRecord),
    /// The sample already had a panel; it is returned unchanged.
    Existing(PanelRecord),
}

/// Per-sample persona panel persistence.
///
/// Semantics:
/// - `get_panel` returns `None` while the sample has no panel.
/// - `insert_panel_if_absent` is create-only: of two concurrent inserts for
///   one sample exactly one is stored, and the other caller gets that panel
///   back as [`PanelInsert::Existing`].
/// - `put_panel` replaces the whole panel in one write; partial panels are
///   never observable.
#[async_trait]
pub trait SampleStore: Send + Sync {
    async fn get_panel(&self, sample_id: &str) -> StorageResult<Option<PanelRecord>>;

    async fn insert_panel_if_absent(&self, panel: PanelRecord) -> StorageResult<PanelInsert>;

    async fn put_panel(&self, panel: PanelRecord) -> StorageResult<()>;
}

// ---------------------------------------------------------------------------
// BlobStore: report artifacts
// ---------------------------------------------------------------------------

/// Durable blob storage for report artifacts.
///
/// Upload either succeeds and returns a public URL, or fails; there is no
/// versioning or deletion contract.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload(&self, path: &str, bytes: Vec<u8>) -> StorageResult<String>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record() -> JobRecord {
        JobRecord::started(JobId::new("job-1"), "owner", "sample", "sim", json!({}))
    }

    #[test]
    fn checkpoints_move_forward() {
        let mut job = record();
        job.apply(&JobPatch::checkpoint(10)).unwrap();
        job.apply(&JobPatch::checkpoint(30)).unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.progress, 30);
    }

    #[test]
    fn progress_regression_is_rejected() {
        let mut job = record();
        job.apply(&JobPatch::checkpoint(60)).unwrap();
        let err = job.apply(&JobPatch::checkpoint(30)).unwrap_err();
        assert!(matches!(err, StorageError::InvalidTransition { .. }));
        assert_eq!(job.progress, 60);
    }

    #[test]
    fn failed_job_is_frozen() {
        let mut job = record();
        job.apply(&JobPatch::checkpoint(30)).unwrap();
        job.apply(&JobPatch::failed("boom")).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.progress, 30);
        assert_eq!(job.error.as_deref(), Some("boom"));

        assert!(job.apply(&JobPatch::checkpoint(60)).is_err());
        assert_eq!(job.progress, 30);
    }

    #[test]
    fn failing_patch_cannot_move_progress() {
        let mut job = record();
        let patch = JobPatch {
            progress: Some(50),
            ..JobPatch::failed("boom")
        };
        assert!(job.apply(&patch).is_err());
    }

    #[test]
    fn completion_requires_location_and_full_progress() {
        let mut job = record();
        let bare = JobPatch {
            status: Some(JobStatus::Completed),
            progress: Some(100),
            ..JobPatch::default()
        };
        assert!(job.apply(&bare).is_err());

        job.apply(&JobPatch::completed("memory://llm/report.json", UsageTotals::default()))
            .unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert!(job.result_location.is_some());
        assert!(job.usage.is_some());
    }

    #[test]
    fn cannot_return_to_started() {
        let mut job = record();
        job.apply(&JobPatch::checkpoint(10)).unwrap();
        let patch = JobPatch {
            status: Some(JobStatus::Started),
            ..JobPatch::default()
        };
        assert!(job.apply(&patch).is_err());
    }

    #[test]
    fn job_status_serializes_capitalized() {
        let value = serde_json::to_value(JobStatus::Completed).unwrap();
        assert_eq!(value, json!("Completed"));
    }
}
