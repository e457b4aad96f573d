//! Job orchestrator
//!
//! `submit` records the job, hands the pipeline to a background task and
//! returns at once. The pipeline writes a checkpoint after every stage:
//!
//! ```text
//! Started(0) -> Running(10) personas -> Running(30) generation
//!            -> Running(60) evaluation -> Running(80) artifact
//!            -> Running(90) uploaded -> Completed(100)
//! ```
//!
//! Any stage-level error moves the job to `Failed` with progress frozen.

use std::sync::Arc;
use std::time::Instant;

use psycsim_llm::{GenerationCapability, TokenUsage};
use psycsim_state::{
    BlobStore, JobId, JobPatch, JobRecord, JobStatus, JobStore, SampleStore, TokenTally,
    UsageTotals,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::SimulationConfig;
use crate::domain::{CoreResult, RunSpec};
use crate::evaluation::EvaluationStage;
use crate::generation::GenerationStage;
use crate::metrics::METRICS;
use crate::obs::{self, JobSpan};
use crate::persona::{PanelOrigin, PersonaProvisioner};
use crate::progress::ProgressReader;
use crate::report::ReportAssembler;

pub const PROGRESS_PERSONAS: u8 = 10;
pub const PROGRESS_GENERATED: u8 = 30;
pub const PROGRESS_EVALUATED: u8 = 60;
pub const PROGRESS_ASSEMBLED: u8 = 80;
pub const PROGRESS_UPLOADED: u8 = 90;

/// Immediate answer to a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitReceipt {
    pub status: String,
    pub task_id: String,
}

/// A dispatched job: the receipt plus the pipeline task.
#[derive(Debug)]
pub struct Submission {
    pub receipt: SubmitReceipt,
    /// Resolves to the terminal status once the pipeline is done.
    pub handle: JoinHandle<JobStatus>,
}

/// Owns the stores and the capability and runs simulation jobs.
#[derive(Clone)]
pub struct Orchestrator {
    jobs: Arc<dyn JobStore>,
    samples: Arc<dyn SampleStore>,
    blobs: Arc<dyn BlobStore>,
    capability: Arc<dyn GenerationCapability>,
    config: SimulationConfig,
}

impl Orchestrator {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        samples: Arc<dyn SampleStore>,
        blobs: Arc<dyn BlobStore>,
        capability: Arc<dyn GenerationCapability>,
        config: SimulationConfig,
    ) -> Self {
        Self {
            jobs,
            samples,
            blobs,
            capability,
            config,
        }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Progress reader over the same job store.
    pub fn progress(&self) -> ProgressReader {
        ProgressReader::new(Arc::clone(&self.jobs))
    }

    /// Record the job as Started and dispatch its pipeline.
    ///
    /// Fails only when the record cannot be inserted, e.g. a duplicate
    /// `job_id`. Spec problems surface later as a Failed job.
    pub async fn submit(&self, job_id: JobId, spec: Value) -> CoreResult<Submission> {
        let owner_id = peek_str(&spec, &["user_id", "userId"]);
        let sample_name = spec
            .get("sample")
            .map(|sample| peek_str(sample, &["name"]))
            .unwrap_or_default();
        let simulation_name = peek_str(&spec, &["title"]);

        let record = JobRecord::started(
            job_id.clone(),
            owner_id.clone(),
            sample_name,
            simulation_name.clone(),
            spec.clone(),
        );
        self.jobs.insert(record).await?;
        obs::emit_job_started(job_id.as_str(), &simulation_name, &owner_id);

        let pipeline = self.clone();
        let task_job_id = job_id.clone();
        let handle = tokio::spawn(
            JobSpan::new(job_id.as_str()).instrument(async move { pipeline.drive(task_job_id, spec).await }),
        );

        Ok(Submission {
            receipt: SubmitReceipt {
                status: "started".to_string(),
                task_id: job_id.0,
            },
            handle,
        })
    }

    async fn drive(self, job_id: JobId, spec: Value) -> JobStatus {
        let started = Instant::now();

        let status = match self.execute(&job_id, spec).await {
            Ok(()) => {
                METRICS.inc_jobs_completed();
                JobStatus::Completed
            }
            Err(e) => {
                METRICS.inc_jobs_failed();
                if let Err(write_err) = self.jobs.update(&job_id, JobPatch::failed(e.to_string())).await {
                    obs::emit_finalize_error(job_id.as_str(), &write_err);
                }
                warn!(job_id = %job_id, error = %e, "job failed");
                JobStatus::Failed
            }
        };

        obs::emit_job_finished(job_id.as_str(), status, started.elapsed().as_millis() as u64);
        METRICS.flush();
        status
    }

    async fn execute(&self, job_id: &JobId, spec: Value) -> CoreResult<()> {
        let run = RunSpec::from_value(&spec)?.validate(self.config.panel_size)?;

        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let provisioned = PersonaProvisioner::new(Arc::clone(&self.samples))
            .provision(&run.sample, run.panel_size, &mut rng)
            .await;
        let personas = provisioned.personas;

        let panel_size = if provisioned.origin == PanelOrigin::Reused && personas.len() != run.panel_size {
            warn!(
                job_id = %job_id,
                stored = personas.len(),
                requested = run.panel_size,
                "stored panel size differs from requested size, using stored panel"
            );
            personas.len()
        } else {
            run.panel_size
        };
        self.checkpoint(job_id, PROGRESS_PERSONAS).await?;

        let generation = GenerationStage::new(
            Arc::clone(&self.capability),
            self.config.generation_workers,
        )
        .run(&run.steps, &personas, panel_size)
        .await?;
        self.checkpoint(job_id, PROGRESS_GENERATED).await?;

        let evaluation = EvaluationStage::new(
            Arc::clone(&self.capability),
            self.config.evaluation_workers,
            self.config.evaluation_temperature,
        )
        .run(&generation.table, &run.steps)
        .await?;
        self.checkpoint(job_id, PROGRESS_EVALUATED).await?;

        let usage = UsageTotals {
            generation: tally(&generation.usage),
            evaluation: tally(&evaluation.usage),
        };

        let assembler = ReportAssembler::new(self.config.artifact_dir.clone());
        let artifact = assembler.assemble(
            job_id.as_str(),
            &generation.table,
            &evaluation.table,
            &personas,
            &run.steps,
            usage,
        )?;
        if let Err(e) = self.checkpoint(job_id, PROGRESS_ASSEMBLED).await {
            if let Err(rm) = tokio::fs::remove_file(&artifact.path).await {
                warn!(path = %artifact.path.display(), error = %rm, "failed to remove local report");
            }
            return Err(e);
        }

        let url = assembler
            .publish(artifact, self.blobs.as_ref(), &self.config.blob_prefix)
            .await?;
        self.checkpoint(job_id, PROGRESS_UPLOADED).await?;

        let record = self.jobs.update(job_id, JobPatch::completed(url, usage)).await?;
        obs::emit_checkpoint(job_id.as_str(), record.status, record.progress);
        info!(
            job_id = %job_id,
            generation_tokens = usage.generation.total_tokens,
            evaluation_tokens = usage.evaluation.total_tokens,
            "job completed"
        );
        Ok(())
    }

    async fn checkpoint(&self, job_id: &JobId, progress: u8) -> CoreResult<()> {
        let record = self.jobs.update(job_id, JobPatch::checkpoint(progress)).await?;
        obs::emit_checkpoint(job_id.as_str(), record.status, record.progress);
        Ok(())
    }
}

fn peek_str(value: &Value, keys: &[&str]) -> String {
    keys.iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .unwrap_or_default()
        .to_string()
}

fn tally(usage: &[TokenUsage]) -> TokenTally {
    let total: TokenUsage = usage.iter().sum();
    TokenTally {
        prompt_tokens: total.prompt_tokens,
        response_tokens: total.response_tokens,
        total_tokens: total.total_tokens,
    }
}
