//! Read-only view of job progress for polling clients.

use std::sync::Arc;
use std::time::Duration;

use psycsim_state::{JobId, JobRecord, JobStore};
use tracing::debug;

use crate::domain::{CoreError, CoreResult};

/// Looks up job records; never writes.
#[derive(Clone)]
pub struct ProgressReader {
    jobs: Arc<dyn JobStore>,
}

impl ProgressReader {
    pub fn new(jobs: Arc<dyn JobStore>) -> Self {
        Self { jobs }
    }

    /// The current record, or `None` for an unknown job.
    pub async fn get(&self, job_id: &JobId) -> CoreResult<Option<JobRecord>> {
        Ok(self.jobs.get(job_id).await?)
    }

    /// Poll every `interval` until the job is Completed or Failed.
    pub async fn wait_for_terminal(&self, job_id: &JobId, interval: Duration) -> CoreResult<JobRecord> {
        loop {
            let record = self
                .get(job_id)
                .await?
                .ok_or_else(|| CoreError::JobNotFound(job_id.to_string()))?;
            if record.status.is_terminal() {
                return Ok(record);
            }
            debug!(job_id = %job_id, status = %record.status, progress = record.progress, "waiting");
            tokio::time::sleep(interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use psycsim_state::fakes::MemoryJobStore;
    use psycsim_state::{JobPatch, JobStatus};
    use serde_json::json;

    #[tokio::test]
    async fn unknown_job_is_none_then_not_found() {
        let reader = ProgressReader::new(Arc::new(MemoryJobStore::new()));
        let id = JobId::new("missing");
        assert!(reader.get(&id).await.unwrap().is_none());
        let err = reader
            .wait_for_terminal(&id, Duration::from_millis(1))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::JobNotFound(_)));
    }

    #[tokio::test]
    async fn wait_returns_failed_record() {
        let store = Arc::new(MemoryJobStore::new());
        let id = JobId::new("j1");
        store
            .insert(JobRecord::started(id.clone(), "o", "s", "t", json!({})))
            .await
            .unwrap();
        store.update(&id, JobPatch::failed("boom")).await.unwrap();

        let record = ProgressReader::new(store)
            .wait_for_terminal(&id, Duration::from_millis(1))
            .await
            .unwrap();
        assert_eq!(record.status, JobStatus::Failed);
        assert_eq!(record.error.as_deref(), Some("boom"));
    }
}
