//! End-to-end pipeline runs over in-memory stores and a scripted capability.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use psycsim_core::report::{Workbook, METRICS_SHEET, RESPONSES_SHEET};
use psycsim_core::{CoreError, Orchestrator, SimulationConfig};
use psycsim_llm::fakes::ScriptedCapability;
use psycsim_llm::{ResponseSchema, TokenUsage};
use psycsim_state::fakes::{MemoryBlobStore, MemoryJobStore, MemorySampleStore};
use psycsim_state::{
    JobId, JobPatch, JobRecord, JobStatus, JobStore, StorageError, StorageResult,
};
use serde_json::{json, Value};
use tempfile::TempDir;

struct Harness {
    jobs: Arc<MemoryJobStore>,
    samples: Arc<MemorySampleStore>,
    blobs: Arc<MemoryBlobStore>,
    capability: Arc<ScriptedCapability>,
    artifacts: TempDir,
}

impl Harness {
    fn new() -> Self {
        let capability = ScriptedCapability::new(|request| {
            if request.schema == ResponseSchema::score_sheet() {
                Ok(json!({"metric": ["Clarity"], "score": [4]}))
            } else {
                Ok(json!({"type": ["text"], "response": "A thoughtful answer.\nWith a second line."}))
            }
        })
        .with_usage(TokenUsage {
            prompt_tokens: 10,
            response_tokens: 5,
            total_tokens: 15,
        });

        Self {
            jobs: Arc::new(MemoryJobStore::new()),
            samples: Arc::new(MemorySampleStore::new()),
            blobs: Arc::new(MemoryBlobStore::new()),
            capability: Arc::new(capability),
            artifacts: tempfile::tempdir().unwrap(),
        }
    }

    fn orchestrator(&self) -> Orchestrator {
        self.orchestrator_with_jobs(self.jobs.clone())
    }

    fn orchestrator_with_jobs(&self, jobs: Arc<dyn JobStore>) -> Orchestrator {
        let config = SimulationConfig {
            artifact_dir: self.artifacts.path().to_path_buf(),
            seed: Some(42),
            generation_workers: 2,
            evaluation_workers: 1,
            ..SimulationConfig::default()
        };
        Orchestrator::new(
            jobs,
            self.samples.clone(),
            self.blobs.clone(),
            self.capability.clone(),
            config,
        )
    }

    fn artifacts_empty(&self) -> bool {
        std::fs::read_dir(self.artifacts.path())
            .unwrap()
            .next()
            .is_none()
    }
}

fn run_spec() -> Value {
    let clarity = json!({
        "title": "Clarity",
        "description": "How clear the answer is",
        "range": "1 - 5",
        "desiredValues": [{"label": "Very clear", "value": 5}],
    });
    json!({
        "title": "Idea study",
        "user_id": "researcher-1",
        "sample": {"id": "sample-free", "name": "Free text", "attributes": []},
        "steps": [
            {"label": "Seed", "instructions": "Propose an idea.", "temperature": 60, "measures": [clarity.clone()]},
            {"label": "Elaborate", "instructions": "Develop your idea.", "temperature": 80, "measures": [clarity]},
        ],
        "iters": 2,
    })
}

#[tokio::test]
async fn test_full_run_completes_with_ordered_report() {
    let harness = Harness::new();
    let orchestrator = harness.orchestrator();
    let job_id = JobId::new("job-e2e");

    let submission = orchestrator
        .submit(job_id.clone(), run_spec())
        .await
        .expect("submit job");
    assert_eq!(submission.receipt.status, "started");
    assert_eq!(submission.receipt.task_id, "job-e2e");

    let status = submission.handle.await.expect("pipeline task");
    assert_eq!(status, JobStatus::Completed);

    let history = harness.jobs.history(&job_id);
    let progress: Vec<u8> = history.iter().map(|r| r.progress).collect();
    assert_eq!(progress, vec![0, 10, 30, 60, 80, 90, 100]);
    assert_eq!(history[0].status, JobStatus::Started);
    assert!(history[1..6].iter().all(|r| r.status == JobStatus::Running));

    let record = history.last().unwrap();
    assert_eq!(record.status, JobStatus::Completed);
    assert_eq!(record.owner_id, "researcher-1");
    assert_eq!(record.simulation_name, "Idea study");
    assert_eq!(record.sample_name, "Free text");

    let usage = record.usage.unwrap();
    assert_eq!(usage.generation.total_tokens, 4 * 15);
    assert_eq!(usage.evaluation.total_tokens, 4 * 15);

    let url = record.result_location.clone().unwrap();
    let blob_path = url.strip_prefix("memory://").unwrap();
    assert!(blob_path.starts_with("llm/simulation_job-e2e_"));

    let book: Workbook = serde_json::from_slice(&harness.blobs.get(blob_path).unwrap()).unwrap();
    let responses = book.sheet(RESPONSES_SHEET).unwrap();
    assert_eq!(responses.columns, vec!["ID", "Seed", "Elaborate"]);
    assert_eq!(responses.rows.len(), 2);
    assert_eq!(responses.rows[0][0], 1);
    assert_eq!(responses.rows[1][0], 2);
    assert_eq!(responses.rows[0][1], "A thoughtful answer. With a second line.");

    let metrics = book.sheet(METRICS_SHEET).unwrap();
    assert_eq!(metrics.columns, vec!["ID", "Seed_Clarity", "Elaborate_Clarity"]);
    for row in &metrics.rows {
        for score in &row[1..] {
            let value = score.as_f64().unwrap();
            assert!((1.0..=5.0).contains(&value));
        }
    }

    assert!(harness.artifacts_empty());
    assert_eq!(harness.samples.write_count(), 1);
}

#[tokio::test]
async fn test_invalid_spec_fails_at_zero() {
    let harness = Harness::new();
    let orchestrator = harness.orchestrator();
    let job_id = JobId::new("job-invalid");

    let mut spec = run_spec();
    spec["steps"] = json!([]);

    let submission = orchestrator.submit(job_id.clone(), spec).await.unwrap();
    assert_eq!(submission.handle.await.unwrap(), JobStatus::Failed);

    let record = orchestrator
        .progress()
        .get(&job_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, JobStatus::Failed);
    assert_eq!(record.progress, 0);
    assert!(record.error.unwrap().contains("at least one step"));
    assert_eq!(harness.capability.call_count(), 0);
}

#[tokio::test]
async fn test_panel_persist_failure_does_not_fail_job() {
    let harness = Harness::new();
    harness.samples.set_failing_writes(true);
    let orchestrator = harness.orchestrator();

    let submission = orchestrator
        .submit(JobId::new("job-unsaved"), run_spec())
        .await
        .unwrap();

    assert_eq!(submission.handle.await.unwrap(), JobStatus::Completed);
    assert_eq!(harness.samples.write_count(), 0);
}

#[tokio::test]
async fn test_upload_failure_fails_job_and_cleans_up() {
    let harness = Harness::new();
    harness.blobs.set_failing(true);
    let orchestrator = harness.orchestrator();
    let job_id = JobId::new("job-upload");

    let submission = orchestrator.submit(job_id.clone(), run_spec()).await.unwrap();
    assert_eq!(submission.handle.await.unwrap(), JobStatus::Failed);

    let record = orchestrator
        .progress()
        .wait_for_terminal(&job_id, Duration::from_millis(5))
        .await
        .unwrap();
    assert_eq!(record.status, JobStatus::Failed);
    assert_eq!(record.progress, 80);
    assert!(record.result_location.is_none());
    assert!(harness.artifacts_empty());
}

#[tokio::test]
async fn test_duplicate_job_id_is_rejected() {
    let harness = Harness::new();
    let orchestrator = harness.orchestrator();
    let job_id = JobId::new("job-dup");

    let first = orchestrator.submit(job_id.clone(), run_spec()).await.unwrap();
    let err = orchestrator
        .submit(job_id.clone(), run_spec())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CoreError::Storage(StorageError::DuplicateJob { .. })
    ));
    assert_eq!(first.handle.await.unwrap(), JobStatus::Completed);
}

#[tokio::test]
async fn test_second_run_reuses_sample_panel() {
    let harness = Harness::new();
    let orchestrator = harness.orchestrator();

    for id in ["job-a", "job-b"] {
        let submission = orchestrator.submit(JobId::new(id), run_spec()).await.unwrap();
        assert_eq!(submission.handle.await.unwrap(), JobStatus::Completed);
    }

    assert_eq!(harness.samples.write_count(), 1);
}

/// Job store that accepts inserts but rejects every update.
struct ReadOnlyJobStore {
    inner: MemoryJobStore,
}

#[async_trait]
impl JobStore for ReadOnlyJobStore {
    async fn insert(&self, record: JobRecord) -> StorageResult<()> {
        self.inner.insert(record).await
    }

    async fn update(&self, _job_id: &JobId, _patch: JobPatch) -> StorageResult<JobRecord> {
        Err(StorageError::Backend("updates disabled".to_string()))
    }

    async fn get(&self, job_id: &JobId) -> StorageResult<Option<JobRecord>> {
        self.inner.get(job_id).await
    }
}

#[tokio::test]
async fn test_unwritable_job_store_fails_without_panicking() {
    let harness = Harness::new();
    let jobs = Arc::new(ReadOnlyJobStore {
        inner: MemoryJobStore::new(),
    });
    let orchestrator = harness.orchestrator_with_jobs(jobs.clone());
    let job_id = JobId::new("job-readonly");

    let submission = orchestrator.submit(job_id.clone(), run_spec()).await.unwrap();
    assert_eq!(submission.handle.await.unwrap(), JobStatus::Failed);

    let record = jobs.get(&job_id).await.unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Started);
    assert_eq!(harness.capability.call_count(), 0);
}
