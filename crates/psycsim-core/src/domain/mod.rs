//! Domain models for PsycSim.
//!
//! Canonical definitions for the core entities:
//! - `RunSpec` / `ValidatedRun`: the submitted run configuration
//! - `StepSpec` / `MeasureSpec`: steps and their scoring criteria
//! - `Persona`: a synthetic participant
//! - `ResponseTable` / `ScoreTable`: stage outputs

pub mod error;
pub mod persona;
pub mod spec;
pub mod table;

pub use error::{CoreError, CoreResult};
pub use persona::{Persona, PersonaProfile};
pub use spec::{
    AttributePool, DesiredValue, MeasureSpec, RunSpec, SampleSpec, StepSpec, ValidatedRun,
};
pub use table::{
    ResponseCell, ResponseRow, ResponseTable, Score, ScoreCell, ScoreColumn, ScoreRow,
    ScoreTable, PERSONA_COLUMN,
};
