//! Step authoring
//!
//! Asks the capability to draft study steps from a free-text description.
//! Drafts are suggestions for the researcher to edit, not a validated run.

use psycsim_llm::{GenerationCapability, GenerationRequest, ResponseSchema};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, instrument, warn};

use crate::domain::{CoreError, CoreResult};
use crate::prompts;

/// Sampling temperature for drafting.
pub const DRAFT_TEMPERATURE: f32 = 0.7;

/// Titles containing any of these are dropped as introductory.
pub const INTRODUCTION_KEYWORDS: &[&str] = &[
    "introduction",
    "welcome",
    "overview",
    "context",
    "background",
    "purpose",
];

/// What the researcher asks for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDraftRequest {
    pub prompt: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub introduction: String,
}

/// One drafted step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftStep {
    /// `step01`, `step02`, ... after filtering.
    pub id: String,
    pub title: String,
    pub instructions: String,
}

/// Draft steps for a study description with one capability call.
#[instrument(skip_all, fields(stage = "step_authoring"))]
pub async fn draft_steps(
    capability: &dyn GenerationCapability,
    request: &StepDraftRequest,
) -> CoreResult<Vec<DraftStep>> {
    if request.prompt.trim().is_empty() {
        return Err(CoreError::InvalidSpec(
            "a study description is required to draft steps".to_string(),
        ));
    }

    let generation = capability
        .generate(GenerationRequest::new(
            prompts::step_authoring_prompt(&request.prompt, &request.title, &request.introduction),
            DRAFT_TEMPERATURE,
            ResponseSchema::FreeForm,
        ))
        .await?;

    let steps = parse_draft_steps(generation.json)?;
    info!(steps = steps.len(), "steps drafted");
    Ok(steps)
}

/// Normalise a drafted-steps reply.
///
/// `step*` keys are read in sorted order. `description` stands in for a
/// missing `instructions`. Introductory steps are dropped and the rest are
/// renumbered from `step01`.
pub fn parse_draft_steps(reply: Value) -> CoreResult<Vec<DraftStep>> {
    let Value::Object(object) = reply else {
        return Err(CoreError::StepAuthoring(
            "reply is not a JSON object".to_string(),
        ));
    };

    let mut keys: Vec<&String> = object.keys().filter(|k| k.starts_with("step")).collect();
    if keys.is_empty() {
        return Err(CoreError::StepAuthoring(
            "reply contains no step01, step02, ... keys".to_string(),
        ));
    }
    keys.sort();

    let mut steps = Vec::new();
    for key in keys {
        let Some(step) = object.get(key).and_then(Value::as_object) else {
            warn!(key = %key, "skipping drafted step that is not an object");
            continue;
        };

        let title = text_field(step, "title");
        if is_introductory(&title) {
            warn!(key = %key, title = %title, "dropping introductory step");
            continue;
        }

        let instructions = match step.get("instructions") {
            Some(_) => text_field(step, "instructions"),
            None => text_field(step, "description"),
        };

        steps.push(DraftStep {
            id: format!("step{:02}", steps.len() + 1),
            title,
            instructions,
        });
    }

    if steps.is_empty() {
        return Err(CoreError::StepAuthoring(
            "every drafted step was introductory; describe actual tasks".to_string(),
        ));
    }
    Ok(steps)
}

fn text_field(step: &Map<String, Value>, key: &str) -> String {
    match step.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn is_introductory(title: &str) -> bool {
    let title = title.trim().to_lowercase();
    INTRODUCTION_KEYWORDS.iter().any(|kw| title.contains(kw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalises_filters_and_renumbers() {
        let steps = parse_draft_steps(json!({
            "step02": {"title": "Recall", "description": "List what you remember."},
            "step01": {"title": "Welcome and Overview", "instructions": "Hi"},
            "step03": {"title": "Rate", "instructions": "Rate it.", "description": "ignored"},
            "notes": "not a step",
        }))
        .unwrap();

        assert_eq!(
            steps,
            vec![
                DraftStep {
                    id: "step01".to_string(),
                    title: "Recall".to_string(),
                    instructions: "List what you remember.".to_string(),
                },
                DraftStep {
                    id: "step02".to_string(),
                    title: "Rate".to_string(),
                    instructions: "Rate it.".to_string(),
                },
            ]
        );
    }

    #[test]
    fn no_step_keys_is_an_error() {
        let err = parse_draft_steps(json!({"intro": {}})).unwrap_err();
        assert!(matches!(err, CoreError::StepAuthoring(_)));
    }

    #[test]
    fn all_introductory_is_an_error() {
        let err = parse_draft_steps(json!({"step01": {"title": "BACKGROUND"}})).unwrap_err();
        assert!(matches!(err, CoreError::StepAuthoring(_)));
    }

    #[test]
    fn non_object_reply_is_an_error() {
        assert!(parse_draft_steps(json!(["step01"])).is_err());
    }
}
