//! SurrealDB-backed JobStore and SampleStore
//!
//! Uses `schema::DbJob` and `schema::DbPanel` for persistence, converting
//! to/from `storage_traits` types at the boundary.

use async_trait::async_trait;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::debug;

use crate::error::StorageError;
use crate::handle;
use crate::schema::{DbJob, DbPanel};
use crate::storage_traits::{
    JobId, JobPatch, JobRecord, JobStore, PanelInsert, PanelRecord, SampleStore, StorageResult,
};

/// SurrealDB implementation of [`JobStore`] and [`SampleStore`].
///
/// Updates read the current row, validate the patch with
/// [`JobRecord::apply`] and write the whole row back. The pipeline is the
/// only writer of a given job, so this read-modify-write does not race.
#[derive(Clone)]
pub struct SurrealStateStore {
    db: Surreal<Any>,
}

impl SurrealStateStore {
    /// Wrap an already-initialized connection.
    pub fn new(db: Surreal<Any>) -> Self {
        Self { db }
    }

    /// Create an in-memory instance for testing.
    pub async fn in_memory() -> crate::Result<Self> {
        Ok(Self::new(handle::connect_memory().await?))
    }

    /// Create from environment variables (see [`handle::connect_from_env`]).
    pub async fn from_env() -> crate::Result<Self> {
        Ok(Self::new(handle::connect_from_env().await?))
    }

    async fn fetch_job(&self, job_id: &str) -> StorageResult<Option<DbJob>> {
        let mut res = self
            .db
            .query("SELECT * FROM jobs WHERE job_id = $jid")
            .bind(("jid", job_id.to_string()))
            .await?;
        let rows: Vec<DbJob> = res.take(0)?;
        Ok(rows.into_iter().next())
    }
}

#[async_trait]
impl JobStore for SurrealStateStore {
    async fn insert(&self, record: JobRecord) -> StorageResult<()> {
        if self.fetch_job(record.job_id.as_str()).await?.is_some() {
            return Err(StorageError::DuplicateJob {
                job_id: record.job_id.0.clone(),
            });
        }

        debug!(job_id = %record.job_id, "creating job");
        let job_id = record.job_id.0.clone();
        let created: Result<Option<DbJob>, surrealdb::Error> =
            self.db.create("jobs").content(DbJob::from(record)).await;

        // The unique index catches a concurrent insert of the same id.
        created.map_err(|e| {
            if e.to_string().contains("idx_job_id") {
                StorageError::DuplicateJob { job_id }
            } else {
                StorageError::from(e)
            }
        })?;
        Ok(())
    }

    async fn update(&self, job_id: &JobId, patch: JobPatch) -> StorageResult<JobRecord> {
        let row = self
            .fetch_job(job_id.as_str())
            .await?
            .ok_or_else(|| StorageError::JobNotFound {
                job_id: job_id.0.clone(),
            })?;
        let mut record = JobRecord::try_from(row)?;
        record.apply(&patch)?;

        let updated = DbJob::from(record.clone());

        self.db
            .query("UPDATE jobs CONTENT $row WHERE job_id = $jid")
            .bind(("row", updated))
            .bind(("jid", job_id.0.clone()))
            .await?
            .check()?;

        debug!(job_id = %job_id, status = %record.status, progress = record.progress, "job updated");
        Ok(record)
    }

    async fn get(&self, job_id: &JobId) -> StorageResult<Option<JobRecord>> {
        self.fetch_job(job_id.as_str())
            .await?
            .map(JobRecord::try_from)
            .transpose()
    }
}

#[async_trait]
impl SampleStore for SurrealStateStore {
    async fn get_panel(&self, sample_id: &str) -> StorageResult<Option<PanelRecord>> {
        let mut res = self
            .db
            .query("SELECT * FROM sample_panels WHERE sample_id = $sid")
            .bind(("sid", sample_id.to_string()))
            .await?;
        let rows: Vec<DbPanel> = res.take(0)?;
        Ok(rows.into_iter().next().map(PanelRecord::from))
    }

    async fn insert_panel_if_absent(&self, panel: PanelRecord) -> StorageResult<PanelInsert> {
        let sample_id = panel.sample_id.clone();
        debug!(sample_id = %sample_id, personas = panel.personas.len(), "creating panel");

        let created: Result<Option<DbPanel>, surrealdb::Error> = self
            .db
            .create("sample_panels")
            .content(DbPanel::from(panel.clone()))
            .await;

        match created {
            Ok(_) => Ok(PanelInsert::Created(panel)),
            // idx_sample_id rejects the second writer
            Err(e) if e.to_string().contains("idx_sample_id") => {
                let existing = self.get_panel(&sample_id).await?.ok_or_else(|| {
                    StorageError::Backend(format!(
                        "panel for sample {sample_id} conflicted but could not be read"
                    ))
                })?;
                Ok(PanelInsert::Existing(existing))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn put_panel(&self, panel: PanelRecord) -> StorageResult<()> {
        let sample_id = panel.sample_id.clone();
        debug!(sample_id = %sample_id, personas = panel.personas.len(), "storing panel");

        self.db
            .query(
                "BEGIN TRANSACTION;
                 DELETE sample_panels WHERE sample_id = $sid;
                 CREATE sample_panels CONTENT $row;
                 COMMIT TRANSACTION;",
            )
            .bind(("sid", sample_id))
            .bind(("row", DbPanel::from(panel)))
            .await?
            .check()?;
        Ok(())
    }
}
