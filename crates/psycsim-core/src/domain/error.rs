//! Domain-level error taxonomy for PsycSim.
//!
//! Cell-level capability failures never surface here; they become sentinel
//! values inside the result tables. Everything in [`CoreError`] is a
//! stage-level failure that moves a job to `Failed`.

use psycsim_llm::LlmError;
use psycsim_state::StorageError;

/// PsycSim domain errors.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid run spec: {0}")]
    InvalidSpec(String),

    #[error("panel size mismatch: expected {expected} personas, got {actual}")]
    PanelSizeMismatch { expected: usize, actual: usize },

    #[error("response columns {actual:?} do not match step labels {expected:?}")]
    ColumnMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("step authoring failed: {0}")]
    StepAuthoring(String),

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("worker task failed: {0}")]
    Worker(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("capability error: {0}")]
    Llm(#[from] LlmError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for PsycSim domain operations.
pub type CoreResult<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_error_display() {
        let err = CoreError::InvalidSpec("at least one step is required".to_string());
        assert!(err.to_string().contains("invalid run spec"));

        let err = CoreError::PanelSizeMismatch {
            expected: 10,
            actual: 3,
        };
        assert_eq!(
            err.to_string(),
            "panel size mismatch: expected 10 personas, got 3"
        );
    }

    #[test]
    fn test_storage_error_converts() {
        let err: CoreError = StorageError::JobNotFound {
            job_id: "j".to_string(),
        }
        .into();
        assert!(matches!(err, CoreError::Storage(_)));
    }
}
