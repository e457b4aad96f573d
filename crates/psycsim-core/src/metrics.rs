//! Global atomic counters for PsycSim observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at the end of a job).

use std::sync::atomic::{AtomicU64, Ordering};

use psycsim_llm::TokenUsage;

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Process-wide atomic counters.
pub struct Metrics {
    capability_calls: AtomicU64,
    generation_cell_failures: AtomicU64,
    evaluation_cell_failures: AtomicU64,
    prompt_tokens: AtomicU64,
    response_tokens: AtomicU64,
    jobs_completed: AtomicU64,
    jobs_failed: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            capability_calls: AtomicU64::new(0),
            generation_cell_failures: AtomicU64::new(0),
            evaluation_cell_failures: AtomicU64::new(0),
            prompt_tokens: AtomicU64::new(0),
            response_tokens: AtomicU64::new(0),
            jobs_completed: AtomicU64::new(0),
            jobs_failed: AtomicU64::new(0),
        }
    }

    /// Count one capability call and the tokens it reported.
    pub fn record_call(&self, usage: &TokenUsage) {
        self.capability_calls.fetch_add(1, Ordering::Relaxed);
        self.prompt_tokens
            .fetch_add(usage.prompt_tokens, Ordering::Relaxed);
        self.response_tokens
            .fetch_add(usage.response_tokens, Ordering::Relaxed);
        tracing::trace!(metric = "capability_calls", "counter incremented");
    }

    /// Count a failed call that produced no usage.
    pub fn record_failed_call(&self) {
        self.capability_calls.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "capability_calls", "counter incremented");
    }

    pub fn inc_generation_failures(&self) {
        self.generation_cell_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "generation_cell_failures", "counter incremented");
    }

    pub fn inc_evaluation_failures(&self) {
        self.evaluation_cell_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "evaluation_cell_failures", "counter incremented");
    }

    pub fn inc_jobs_completed(&self) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_jobs_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Emit all current counter values as a single `info!` event.
    ///
    /// Call this at natural boundaries (end of a job) rather than on every
    /// increment.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            capability_calls = self.capability_calls(),
            generation_cell_failures = self.generation_cell_failures(),
            evaluation_cell_failures = self.evaluation_cell_failures(),
            prompt_tokens = self.prompt_tokens(),
            response_tokens = self.response_tokens(),
            jobs_completed = self.jobs_completed(),
            jobs_failed = self.jobs_failed(),
        );
    }

    pub fn capability_calls(&self) -> u64 {
        self.capability_calls.load(Ordering::Relaxed)
    }

    pub fn generation_cell_failures(&self) -> u64 {
        self.generation_cell_failures.load(Ordering::Relaxed)
    }

    pub fn evaluation_cell_failures(&self) -> u64 {
        self.evaluation_cell_failures.load(Ordering::Relaxed)
    }

    pub fn prompt_tokens(&self) -> u64 {
        self.prompt_tokens.load(Ordering::Relaxed)
    }

    pub fn response_tokens(&self) -> u64 {
        self.response_tokens.load(Ordering::Relaxed)
    }

    pub fn jobs_completed(&self) -> u64 {
        self.jobs_completed.load(Ordering::Relaxed)
    }

    pub fn jobs_failed(&self) -> u64 {
        self.jobs_failed.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        for counter in [
            &self.capability_calls,
            &self.generation_cell_failures,
            &self.evaluation_cell_failures,
            &self.prompt_tokens,
            &self.response_tokens,
            &self.jobs_completed,
            &self.jobs_failed,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calls_accumulate_tokens() {
        let m = Metrics::new();
        m.record_call(&TokenUsage {
            prompt_tokens: 10,
            response_tokens: 4,
            total_tokens: 14,
        });
        m.record_failed_call();
        assert_eq!(m.capability_calls(), 2);
        assert_eq!(m.prompt_tokens(), 10);
        assert_eq!(m.response_tokens(), 4);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.inc_generation_failures();
        m.inc_evaluation_failures();
        m.inc_jobs_completed();
        m.inc_jobs_failed();
        m.reset();
        assert_eq!(m.generation_cell_failures(), 0);
        assert_eq!(m.evaluation_cell_failures(), 0);
        assert_eq!(m.jobs_completed(), 0);
        assert_eq!(m.jobs_failed(), 0);
    }
}
