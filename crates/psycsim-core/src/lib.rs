//! PsycSim Core Library
//!
//! The simulation pipeline: persona panels, chained generation, per-cell
//! evaluation, report assembly and the job orchestrator that ties them to
//! the job-state store.
//!
//! ## Layer 1 - Pipeline
//!
//! - [`PersonaProvisioner`]: draw, persist and reuse a sample's panel
//! - [`GenerationStage`]: one sequential chain per persona, bounded pool
//! - [`EvaluationStage`]: one scoring call per (persona, step) cell
//! - [`ReportAssembler`]: JSON workbook, uploaded to blob storage
//! - [`Orchestrator`]: checkpoints a job from Started to Completed or Failed
//! - [`ProgressReader`]: read-only job lookup for polling clients
//! - [`draft_steps`]: capability-drafted study steps

pub mod config;
pub mod domain;
pub mod evaluation;
pub mod generation;
pub mod metrics;
pub mod obs;
pub mod orchestrator;
pub mod persona;
pub mod progress;
pub mod prompts;
pub mod report;
pub mod step_authoring;
pub mod telemetry;

pub use config::SimulationConfig;
pub use domain::{
    AttributePool, CoreError, CoreResult, DesiredValue, MeasureSpec, Persona, PersonaProfile,
    ResponseCell, ResponseRow, ResponseTable, RunSpec, SampleSpec, Score, ScoreCell, ScoreColumn,
    ScoreRow, ScoreTable, StepSpec, ValidatedRun,
};
pub use evaluation::{EvaluationOutcome, EvaluationStage};
pub use generation::{GenerationOutcome, GenerationStage, GENERATION_SENTINEL};
pub use orchestrator::{Orchestrator, Submission, SubmitReceipt};
pub use persona::{PanelOrigin, PersonaProvisioner, ProvisionOutcome};
pub use progress::ProgressReader;
pub use report::{ReportArtifact, ReportAssembler, Sheet, Workbook};
pub use step_authoring::{draft_steps, parse_draft_steps, DraftStep, StepDraftRequest};
