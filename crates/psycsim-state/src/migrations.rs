//! SurrealDB schema initialization
//!
//! Defines the `jobs` and `sample_panels` tables with their unique indexes.
//! Safe to call on every connection (idempotent).

use crate::Result;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

/// Initialize all PsycSim tables in SurrealDB
pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    info!("Initializing PsycSim SurrealDB schema");

    init_jobs_table(db).await?;
    init_sample_panels_table(db).await?;

    info!("PsycSim schema initialization complete");
    Ok(())
}

/// Initialize `jobs` table
///
/// Schema:
/// ```text
/// TABLE jobs {
///   job_id:           STRING (unique)
///   status:           STRING (Started | Running | Completed | Failed)
///   progress:         INT (0..=100, never decreases)
///   owner_id:         STRING (indexed)
///   sample_name:      STRING
///   simulation_name:  STRING
///   spec:             OBJECT
///   result_location:  STRING?
///   error:            STRING?
///   usage:            OBJECT?
///   created_at:       DATETIME
///   updated_at:       DATETIME
/// }
/// ```
///
/// Status and progress transitions are enforced by `JobRecord::apply`.
async fn init_jobs_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing jobs table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS jobs SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update FULL
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_job_id ON TABLE jobs COLUMNS job_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_job_owner ON TABLE jobs COLUMNS owner_id;
    "#;

    db.query(sql).await?.check()?;
    debug!("jobs table initialized");
    Ok(())
}

/// Initialize `sample_panels` table
///
/// One row per sample. `idx_sample_id` makes `insert_panel_if_absent`
/// create-only; `put_panel` replaces the row inside a transaction.
async fn init_sample_panels_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing sample_panels table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS sample_panels SCHEMALESS;

        DEFINE INDEX IF NOT EXISTS idx_sample_id ON TABLE sample_panels COLUMNS sample_id UNIQUE;
    "#;

    db.query(sql).await?.check()?;
    debug!("sample_panels table initialized");
    Ok(())
}
