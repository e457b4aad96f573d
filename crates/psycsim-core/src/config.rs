//! Simulation configuration
//!
//! Loaded from `PSYCSIM_*` environment variables with defaults for every
//! field.

use std::path::PathBuf;
use std::str::FromStr;

use crate::domain::{CoreError, CoreResult};

/// Pipeline sizing and artifact settings
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    /// Panel size when a run spec has no `iters` (default: 10)
    pub panel_size: usize,
    /// Concurrent persona chains during generation (default: 8)
    pub generation_workers: usize,
    /// Concurrent cell evaluations (default: 3)
    pub evaluation_workers: usize,
    /// Directory for transient report files (default: system temp dir)
    pub artifact_dir: PathBuf,
    /// Blob path prefix for uploaded reports (default: "llm")
    pub blob_prefix: String,
    /// Sampling temperature for evaluation calls (default: 1.0)
    pub evaluation_temperature: f32,
    /// Fixed RNG seed for persona generation; random when unset
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            panel_size: 10,
            generation_workers: 8,
            evaluation_workers: 3,
            artifact_dir: std::env::temp_dir(),
            blob_prefix: "llm".to_string(),
            evaluation_temperature: 1.0,
            seed: None,
        }
    }
}

impl SimulationConfig {
    /// Load from environment variables, falling back to defaults
    pub fn from_env() -> CoreResult<Self> {
        let defaults = Self::default();
        let config = SimulationConfig {
            panel_size: env_or("PSYCSIM_PANEL_SIZE", defaults.panel_size)?,
            generation_workers: env_or("PSYCSIM_GENERATION_WORKERS", defaults.generation_workers)?,
            evaluation_workers: env_or("PSYCSIM_EVALUATION_WORKERS", defaults.evaluation_workers)?,
            artifact_dir: std::env::var("PSYCSIM_ARTIFACT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.artifact_dir),
            blob_prefix: std::env::var("PSYCSIM_BLOB_PREFIX").unwrap_or(defaults.blob_prefix),
            evaluation_temperature: env_or(
                "PSYCSIM_EVALUATION_TEMPERATURE",
                defaults.evaluation_temperature,
            )?,
            seed: match std::env::var("PSYCSIM_SEED") {
                Ok(raw) => Some(parse_var("PSYCSIM_SEED", &raw)?),
                Err(_) => None,
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Check sizing and temperature bounds.
    ///
    /// - panel and both pools hold at least one
    /// - the evaluation pool is smaller than the generation pool (equal only
    ///   when both are 1)
    /// - `evaluation_temperature` lies in `0.0..=1.0`
    pub fn validate(&self) -> CoreResult<()> {
        if self.panel_size == 0 {
            return Err(CoreError::Config("panel_size must be at least 1".to_string()));
        }
        if self.generation_workers == 0 || self.evaluation_workers == 0 {
            return Err(CoreError::Config(
                "worker pools must have at least one worker".to_string(),
            ));
        }
        let max_evaluation = self.generation_workers.saturating_sub(1).max(1);
        if self.evaluation_workers > max_evaluation {
            return Err(CoreError::Config(format!(
                "evaluation_workers ({}) must be smaller than generation_workers ({})",
                self.evaluation_workers, self.generation_workers
            )));
        }
        if !(0.0..=1.0).contains(&self.evaluation_temperature) {
            return Err(CoreError::Config(format!(
                "evaluation_temperature {} is outside 0.0..=1.0",
                self.evaluation_temperature
            )));
        }
        Ok(())
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> CoreResult<T> {
    match std::env::var(name) {
        Ok(raw) => parse_var(name, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_var<T: FromStr>(name: &str, raw: &str) -> CoreResult<T> {
    raw.trim()
        .parse()
        .map_err(|_| CoreError::Config(format!("{name} has an invalid value: {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = SimulationConfig::default();
        assert_eq!(config.panel_size, 10);
        assert!(config.evaluation_workers < config.generation_workers);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_workers_rejected() {
        let config = SimulationConfig {
            evaluation_workers: 0,
            ..SimulationConfig::default()
        };
        assert!(matches!(config.validate(), Err(CoreError::Config(_))));
    }

    #[test]
    fn evaluation_pool_must_be_smaller() {
        let equal = SimulationConfig {
            generation_workers: 4,
            evaluation_workers: 4,
            ..SimulationConfig::default()
        };
        assert!(matches!(equal.validate(), Err(CoreError::Config(_))));

        let larger = SimulationConfig {
            generation_workers: 1,
            evaluation_workers: 2,
            ..SimulationConfig::default()
        };
        assert!(matches!(larger.validate(), Err(CoreError::Config(_))));

        let single = SimulationConfig {
            generation_workers: 1,
            evaluation_workers: 1,
            ..SimulationConfig::default()
        };
        assert!(single.validate().is_ok());
    }

    #[test]
    fn evaluation_temperature_bounds() {
        for bad in [-0.1, 1.5, f32::NAN] {
            let config = SimulationConfig {
                evaluation_temperature: bad,
                ..SimulationConfig::default()
            };
            assert!(matches!(config.validate(), Err(CoreError::Config(_))));
        }
        let config = SimulationConfig {
            evaluation_temperature: 0.0,
            ..SimulationConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_var_reports_name() {
        let err = parse_var::<usize>("PSYCSIM_PANEL_SIZE", "ten").unwrap_err();
        assert!(err.to_string().contains("PSYCSIM_PANEL_SIZE"));
    }
}
