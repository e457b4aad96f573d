//! Persona panel provisioning.
//!
//! - `provision`: draw, persist and reuse the panel of a sample
//! - `catalog`: free-text personas for samples without attribute pools

pub mod catalog;
pub mod provision;

pub use provision::{
    draw_from_catalog, generate_panel, parse_age_range, PanelOrigin, PersonaProvisioner,
    ProvisionOutcome,
};
