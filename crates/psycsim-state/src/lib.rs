//! PsycSim State: persistence for the simulation pipeline
//!
//! This crate owns every durable write the pipeline makes: job-state records
//! polled by clients, persona panels persisted per sample, and finished
//! report artifacts.
//!
//! ## Layer 0 - Data/Persistence
//!
//! ## Key Components
//!
//! - `JobStore` / `SampleStore` / `BlobStore`: backend-agnostic traits
//! - `SurrealStateStore`: SurrealDB implementation of the job and panel stores
//! - `FsBlobStore`: filesystem blob store with atomic writes
//! - `fakes`: in-memory implementations for tests

mod error;
pub mod fakes;
pub mod fs_blob;
pub mod handle;
mod migrations;
mod schema;
pub mod storage_traits;
pub mod surreal_store;

pub use error::{StateError, StorageError};
pub use fs_blob::FsBlobStore;
pub use handle::CloudConfig;
pub use storage_traits::{
    BlobStore, JobId, JobPatch, JobRecord, JobStatus, JobStore, PanelInsert, PanelRecord,
    SampleStore, StorageResult, TokenTally, UsageTotals,
};
pub use surreal_store::SurrealStateStore;

/// Result type for psycsim-state setup operations
pub type Result<T> = std::result::Result<T, StateError>;
