//! PsycSim LLM: the generation capability boundary
//!
//! The simulation pipeline depends only on [`GenerationCapability`]: a prompt,
//! a sampling temperature and a response schema go in; structured JSON and
//! token counts come out.
//!
//! ## Layer 2 - External model access
//!
//! - [`GeminiClient`]: REST `generateContent` with enforced JSON output
//! - [`fakes::ScriptedCapability`]: closure-driven fake for tests

pub mod capability;
mod error;
pub mod fakes;
pub mod gemini;

pub use capability::{
    FieldKind, Generation, GenerationCapability, GenerationRequest, ResponseSchema, SchemaField,
    TokenUsage,
};
pub use error::LlmError;
pub use gemini::{GeminiClient, GeminiConfig};

/// Result type for capability calls
pub type LlmResult<T> = std::result::Result<T, LlmError>;
