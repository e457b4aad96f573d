//! Row definitions for PsycSim SurrealDB tables
//!
//! Tables:
//! - jobs: One row per simulation job, keyed by the caller's job id
//! - sample_panels: The persisted persona panel of each sample
//!
//! Rows are converted to and from `storage_traits` types at the boundary so
//! the trait types stay free of database identifiers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::storage_traits::{JobId, JobRecord, JobStatus, PanelRecord, UsageTotals};

/// Serialize chrono DateTime as a native SurrealDB datetime
mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

/// Job row - mirrors [`JobRecord`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbJob {
    /// SurrealDB record ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    /// Caller-supplied job id (unique)
    pub job_id: String,
    /// "Started" | "Running" | "Completed" | "Failed"
    pub status: String,
    pub progress: u8,
    pub owner_id: String,
    pub sample_name: String,
    pub simulation_name: String,
    /// Submitted run configuration
    pub spec: serde_json::Value,
    pub result_location: Option<String>,
    pub error: Option<String>,
    pub usage: Option<UsageTotals>,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "surreal_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl From<JobRecord> for DbJob {
    fn from(record: JobRecord) -> Self {
        DbJob {
            id: None,
            job_id: record.job_id.0,
            status: record.status.as_str().to_string(),
            progress: record.progress,
            owner_id: record.owner_id,
            sample_name: record.sample_name,
            simulation_name: record.simulation_name,
            spec: record.spec,
            result_location: record.result_location,
            error: record.error,
            usage: record.usage,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

impl TryFrom<DbJob> for JobRecord {
    type Error = StorageError;

    fn try_from(row: DbJob) -> Result<Self, Self::Error> {
        let status = match row.status.as_str() {
            "Started" => JobStatus::Started,
            "Running" => JobStatus::Running,
            "Completed" => JobStatus::Completed,
            "Failed" => JobStatus::Failed,
            other => {
                return Err(StorageError::Backend(format!(
                    "unknown job status: {other}"
                )))
            }
        };

        Ok(JobRecord {
            job_id: JobId(row.job_id),
            status,
            progress: row.progress,
            owner_id: row.owner_id,
            sample_name: row.sample_name,
            simulation_name: row.simulation_name,
            spec: row.spec,
            result_location: row.result_location,
            error: row.error,
            usage: row.usage,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Persona panel row - mirrors [`PanelRecord`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbPanel {
    /// SurrealDB record ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    /// Sample this panel belongs to (unique)
    pub sample_id: String,
    /// Personas as JSON objects, ordered by number
    pub personas: Vec<serde_json::Value>,
    #[serde(with = "surreal_datetime")]
    pub generated_at: DateTime<Utc>,
}

impl From<PanelRecord> for DbPanel {
    fn from(panel: PanelRecord) -> Self {
        DbPanel {
            id: None,
            sample_id: panel.sample_id,
            personas: panel.personas,
            generated_at: panel.generated_at,
        }
    }
}

impl From<DbPanel> for PanelRecord {
    fn from(row: DbPanel) -> Self {
        PanelRecord {
            sample_id: row.sample_id,
            personas: row.personas,
            generated_at: row.generated_at,
        }
    }
}
