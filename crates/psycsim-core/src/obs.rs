//! Structured observability hooks for the simulation job lifecycle.
//!
//! This module provides:
//! - Job-scoped tracing spans via `JobSpan`
//! - Emission functions for key lifecycle events: start, checkpoint,
//!   contained cell failure, panel persistence, finish
//!
//! Events are emitted at `info!` level unless they describe a contained
//! failure (`warn!`) or a failed job (`error!`).

use std::future::Future;

use psycsim_state::JobStatus;
use tracing::instrument::Instrumented;
use tracing::{error, info, warn, Instrument, Span};

/// A span tagged with the job id that the whole pipeline runs inside.
///
/// The pipeline runs on a spawned task, so the span is attached to the
/// future rather than entered on the current thread.
///
/// # Example
///
/// ```ignore
/// let fut = JobSpan::new("job-123").instrument(run_pipeline(...));
/// tokio::spawn(fut);
/// ```
pub struct JobSpan {
    span: Span,
}

impl JobSpan {
    pub fn new(job_id: &str) -> Self {
        Self {
            span: tracing::info_span!("psycsim.job", job_id = %job_id),
        }
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Run `fut` inside this span.
    pub fn instrument<F: Future>(self, fut: F) -> Instrumented<F> {
        fut.instrument(self.span)
    }
}

/// Emit event: job accepted and pipeline dispatched.
pub fn emit_job_started(job_id: &str, simulation_name: &str, owner_id: &str) {
    info!(
        event = "job.started",
        job_id = %job_id,
        simulation = %simulation_name,
        owner_id = %owner_id,
    );
}

/// Emit event: progress checkpoint written.
pub fn emit_checkpoint(job_id: &str, status: JobStatus, progress: u8) {
    info!(
        event = "job.checkpoint",
        job_id = %job_id,
        status = %status,
        progress = progress,
    );
}

/// Emit event: one cell failed and was replaced by a sentinel.
pub fn emit_cell_failed(stage: &str, persona: u32, step: &str, error: &dyn std::fmt::Display) {
    warn!(
        event = "cell.failed",
        stage = %stage,
        persona = persona,
        step = %step,
        error = %error,
    );
}

/// Emit event: a freshly generated panel could not be persisted.
pub fn emit_panel_persist_failed(sample_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "panel.persist_failed", sample_id = %sample_id, error = %error);
}

/// Emit event: job finished with its terminal status.
pub fn emit_job_finished(job_id: &str, status: JobStatus, duration_ms: u64) {
    match status {
        JobStatus::Completed => info!(
            event = "job.finished",
            job_id = %job_id,
            status = %status,
            duration_ms = duration_ms,
        ),
        _ => error!(
            event = "job.finished",
            job_id = %job_id,
            status = %status,
            duration_ms = duration_ms,
        ),
    }
}

/// Emit event: the terminal write itself failed (job state may be stale).
pub fn emit_finalize_error(job_id: &str, error: &dyn std::fmt::Display) {
    error!(event = "job.finalize_error", job_id = %job_id, error = %error);
}
