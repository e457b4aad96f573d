//! PsycSim CLI
//!
//! The `psycsim` command runs persona-conditioned simulations from a JSON
//! run spec and inspects their progress.
//!
//! ## Commands
//!
//! - `run`: submit a run spec and wait for the job to finish
//! - `progress`: print the current record of a job
//! - `draft-steps`: ask the model to draft study steps from a description

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use psycsim_core::telemetry::{init_tracing, LogFormat};
use psycsim_core::{draft_steps, Orchestrator, ProgressReader, SimulationConfig, StepDraftRequest};
use psycsim_llm::GeminiClient;
use psycsim_state::{FsBlobStore, JobId, JobStatus, SurrealStateStore};
use serde_json::Value;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "psycsim")]
#[command(author = "PsycSim Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Persona-conditioned LLM simulations for psychology studies", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a run spec and wait until the job is Completed or Failed
    Run {
        /// Path to the run spec (JSON)
        #[arg(short, long)]
        spec: PathBuf,

        /// Job id to record the run under (default: random UUID)
        #[arg(long)]
        job_id: Option<String>,

        /// Polling interval in milliseconds
        #[arg(long, default_value = "1000", env = "PSYCSIM_POLL_MS")]
        poll_ms: u64,
    },

    /// Show the current state of a job
    Progress {
        /// Job id returned by `run`
        job_id: String,
    },

    /// Draft study steps from a free-text description
    DraftSteps {
        /// What the study should ask participants to do
        #[arg(short, long)]
        prompt: String,

        /// Study title, used as context
        #[arg(long, default_value = "")]
        title: String,

        /// Study introduction, used as context
        #[arg(long, default_value = "")]
        introduction: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(LogFormat::from_json_flag(cli.json), level);

    match cli.command {
        Commands::Run {
            spec,
            job_id,
            poll_ms,
        } => cmd_run(&spec, job_id, Duration::from_millis(poll_ms)).await,
        Commands::Progress { job_id } => cmd_progress(&job_id).await,
        Commands::DraftSteps {
            prompt,
            title,
            introduction,
        } => {
            cmd_draft_steps(StepDraftRequest {
                prompt,
                title,
                introduction,
            })
            .await
        }
    }
}

/// Submit a run and block until it reaches a terminal state
async fn cmd_run(spec_path: &Path, job_id: Option<String>, poll: Duration) -> Result<()> {
    let spec = read_spec(spec_path)?;
    let config = SimulationConfig::from_env().context("Invalid simulation configuration")?;

    let capability = GeminiClient::from_env().context("Failed to configure Gemini client")?;
    let store = Arc::new(
        SurrealStateStore::from_env()
            .await
            .context("Failed to connect to PsycSim database")?,
    );
    let blobs = FsBlobStore::from_env().context("Failed to prepare blob directory")?;

    let orchestrator = Orchestrator::new(
        store.clone(),
        store,
        Arc::new(blobs),
        Arc::new(capability),
        config,
    );

    let job_id = JobId::new(job_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()));
    let submission = orchestrator
        .submit(job_id.clone(), spec)
        .await
        .with_context(|| format!("Failed to submit job {job_id}"))?;
    println!("{}", serde_json::to_string_pretty(&submission.receipt)?);

    let record = orchestrator
        .progress()
        .wait_for_terminal(&job_id, poll)
        .await
        .context("Failed to poll job progress")?;
    let _ = submission.handle.await;

    println!("{}", serde_json::to_string_pretty(&record)?);
    match record.status {
        JobStatus::Completed => {
            info!(job_id = %job_id, url = ?record.result_location, "simulation finished");
            Ok(())
        }
        _ => bail!(
            "Job {} failed: {}",
            job_id,
            record.error.as_deref().unwrap_or("unknown error")
        ),
    }
}

/// Print a job record, or "not found"
async fn cmd_progress(job_id: &str) -> Result<()> {
    let store = SurrealStateStore::from_env()
        .await
        .context("Failed to connect to PsycSim database")?;
    let reader = ProgressReader::new(Arc::new(store));

    match reader.get(&JobId::new(job_id)).await? {
        Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
        None => println!("Job '{}' not found", job_id),
    }
    Ok(())
}

/// Draft steps and print them as JSON
async fn cmd_draft_steps(request: StepDraftRequest) -> Result<()> {
    let capability = GeminiClient::from_env().context("Failed to configure Gemini client")?;
    let steps = draft_steps(&capability, &request)
        .await
        .context("Failed to draft steps")?;
    println!("{}", serde_json::to_string_pretty(&steps)?);
    Ok(())
}

fn read_spec(path: &Path) -> Result<Value> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read run spec {:?}", path))?;
    let spec: Value = serde_json::from_str(&raw)
        .with_context(|| format!("Run spec {:?} is not valid JSON", path))?;
    if !spec.is_object() {
        bail!("Run spec {:?} must be a JSON object", path);
    }
    Ok(spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_args_parse() {
        let cli = Cli::try_parse_from([
            "psycsim", "--json", "run", "--spec", "study.json", "--job-id", "job-7",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Run { spec, job_id, .. } => {
                assert_eq!(spec, PathBuf::from("study.json"));
                assert_eq!(job_id.as_deref(), Some("job-7"));
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn test_draft_steps_requires_prompt() {
        assert!(Cli::try_parse_from(["psycsim", "draft-steps"]).is_err());
    }

    #[test]
    fn test_read_spec_accepts_object() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spec.json");
        std::fs::write(&path, r#"{"title": "t", "steps": []}"#).unwrap();
        let spec = read_spec(&path).unwrap();
        assert_eq!(spec["title"], "t");
    }

    #[test]
    fn test_read_spec_rejects_non_object() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spec.json");
        std::fs::write(&path, "[1, 2]").unwrap();
        let err = read_spec(&path).unwrap_err();
        assert!(format!("{err:#}").contains("must be a JSON object"));
    }

    #[test]
    fn test_read_spec_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_spec(&dir.path().join("absent.json")).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to read run spec"));
    }
}
