//! The generation capability contract
//!
//! A capability turns a prompt plus a response schema into structured JSON
//! and reports the tokens it spent. The pipeline only ever talks to this
//! trait; concrete backends live in [`crate::gemini`] and [`crate::fakes`].

use std::iter::Sum;
use std::ops::{Add, AddAssign};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::LlmResult;

/// Token counts for one capability call (or a sum of calls).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub response_tokens: u64,
    pub total_tokens: u64,
}

impl Add for TokenUsage {
    type Output = TokenUsage;

    fn add(self, rhs: TokenUsage) -> TokenUsage {
        TokenUsage {
            prompt_tokens: self.prompt_tokens + rhs.prompt_tokens,
            response_tokens: self.response_tokens + rhs.response_tokens,
            total_tokens: self.total_tokens + rhs.total_tokens,
        }
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: TokenUsage) {
        *self = *self + rhs;
    }
}

impl Sum for TokenUsage {
    fn sum<I: Iterator<Item = TokenUsage>>(iter: I) -> TokenUsage {
        iter.fold(TokenUsage::default(), Add::add)
    }
}

impl<'a> Sum<&'a TokenUsage> for TokenUsage {
    fn sum<I: Iterator<Item = &'a TokenUsage>>(iter: I) -> TokenUsage {
        iter.copied().sum()
    }
}

/// Type of one field in a structured response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Number,
    StringArray,
    NumberArray,
}

/// A named, required field of a structured response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaField {
    pub name: String,
    pub kind: FieldKind,
}

/// Shape the caller expects the JSON reply to have.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseSchema {
    /// A JSON object with exactly these required fields.
    Object(Vec<SchemaField>),
    /// Any JSON value; only the MIME type is constrained.
    FreeForm,
}

impl ResponseSchema {
    pub fn object<'a>(fields: impl IntoIterator<Item = (&'a str, FieldKind)>) -> Self {
        ResponseSchema::Object(
            fields
                .into_iter()
                .map(|(name, kind)| SchemaField {
                    name: name.to_string(),
                    kind,
                })
                .collect(),
        )
    }

    /// `{type: string[], response: string}` used for chained step replies.
    pub fn step_response() -> Self {
        Self::object([
            ("type", FieldKind::StringArray),
            ("response", FieldKind::String),
        ])
    }

    /// `{metric: string[], score: number[]}` used for measure scoring.
    pub fn score_sheet() -> Self {
        Self::object([
            ("metric", FieldKind::StringArray),
            ("score", FieldKind::NumberArray),
        ])
    }

    /// OpenAPI-style schema as accepted by Gemini's `responseSchema`.
    ///
    /// Returns `None` for [`ResponseSchema::FreeForm`].
    pub fn to_openapi(&self) -> Option<Value> {
        let fields = match self {
            ResponseSchema::Object(fields) => fields,
            ResponseSchema::FreeForm => return None,
        };

        let mut properties = serde_json::Map::new();
        for field in fields {
            let schema = match field.kind {
                FieldKind::String => json!({"type": "STRING"}),
                FieldKind::Number => json!({"type": "NUMBER"}),
                FieldKind::StringArray => json!({"type": "ARRAY", "items": {"type": "STRING"}}),
                FieldKind::NumberArray => json!({"type": "ARRAY", "items": {"type": "NUMBER"}}),
            };
            properties.insert(field.name.clone(), schema);
        }
        let required: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();

        Some(json!({
            "type": "OBJECT",
            "properties": properties,
            "required": required,
        }))
    }
}

/// One structured-generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub system_instruction: Option<String>,
    /// Sampling temperature in `[0, 1]` for pipeline calls.
    pub temperature: f32,
    pub schema: ResponseSchema,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, temperature: f32, schema: ResponseSchema) -> Self {
        Self {
            prompt: prompt.into(),
            system_instruction: None,
            temperature,
            schema,
        }
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }
}

/// Structured output of one call.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub json: Value,
    pub usage: TokenUsage,
}

/// A backend able to produce structured JSON from a prompt.
///
/// Implementations must be shareable across worker tasks.
#[async_trait]
pub trait GenerationCapability: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> LlmResult<Generation>;
}
