//! Gemini REST client
//!
//! Calls `POST {endpoint}/models/{model}:generateContent` with JSON output
//! enforced through `responseMimeType` and `responseSchema`.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, instrument, warn};

use crate::capability::{Generation, GenerationCapability, GenerationRequest, TokenUsage};
use crate::error::LlmError;
use crate::LlmResult;

const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Gemini configuration
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// API key sent as `x-goog-api-key`
    pub api_key: String,
    /// Model name (default: "gemini-2.0-flash")
    pub model: String,
    /// API base URL
    pub endpoint: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl GeminiConfig {
    /// Create a config for an explicit API key with default model and endpoint
    pub fn new(api_key: impl Into<String>) -> Self {
        GeminiConfig {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Load from `GEMINI_KEY`, `GEMINI_MODEL`, `GEMINI_ENDPOINT`,
    /// `GEMINI_TIMEOUT_SECS`
    pub fn from_env() -> LlmResult<Self> {
        let api_key = std::env::var("GEMINI_KEY")
            .map_err(|_| LlmError::MissingCredential("GEMINI_KEY not set".to_string()))?;
        let mut config = Self::new(api_key);

        if let Ok(model) = std::env::var("GEMINI_MODEL") {
            config.model = model;
        }
        if let Ok(endpoint) = std::env::var("GEMINI_ENDPOINT") {
            config.endpoint = endpoint;
        }
        if let Ok(secs) = std::env::var("GEMINI_TIMEOUT_SECS") {
            let secs: u64 = secs.parse().map_err(|_| {
                LlmError::Config(format!("GEMINI_TIMEOUT_SECS is not a number: {secs}"))
            })?;
            config.timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }

    /// Override the model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Override the per-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.endpoint.trim_end_matches('/'),
            self.model
        )
    }
}

/// Gemini-backed [`GenerationCapability`]
pub struct GeminiClient {
    config: GeminiConfig,
    http_client: reqwest::Client,
}

impl GeminiClient {
    /// Create a new client
    pub fn new(config: GeminiConfig) -> LlmResult<Self> {
        if config.api_key.trim().is_empty() {
            return Err(LlmError::MissingCredential("empty Gemini API key".to_string()));
        }
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("psycsim-llm/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(GeminiClient {
            config,
            http_client,
        })
    }

    /// Create client from environment variables
    pub fn from_env() -> LlmResult<Self> {
        Self::new(GeminiConfig::from_env()?)
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }
}

#[async_trait]
impl GenerationCapability for GeminiClient {
    #[instrument(skip(self, request), fields(model = %self.config.model, temperature = request.temperature))]
    async fn generate(&self, request: GenerationRequest) -> LlmResult<Generation> {
        let body = request_body(&request);

        let response = self
            .http_client
            .post(self.config.url())
            .header("x-goog-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            warn!(status = status.as_u16(), "Gemini request failed");
            return Err(LlmError::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        let generation = parse_response(&text)?;
        debug!(
            prompt_tokens = generation.usage.prompt_tokens,
            response_tokens = generation.usage.response_tokens,
            "Gemini call complete"
        );
        Ok(generation)
    }
}

/// Build the `generateContent` request body.
fn request_body(request: &GenerationRequest) -> Value {
    let mut generation_config = json!({
        "temperature": request.temperature,
        "responseMimeType": "application/json",
    });
    if let Some(schema) = request.schema.to_openapi() {
        generation_config["responseSchema"] = schema;
    }

    let mut body = json!({
        "contents": [{"role": "user", "parts": [{"text": request.prompt}]}],
        "generationConfig": generation_config,
    });
    if let Some(instruction) = &request.system_instruction {
        body["systemInstruction"] = json!({"parts": [{"text": instruction}]});
    }
    body
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct UsageMetadata {
    prompt_token_count: u64,
    candidates_token_count: u64,
    total_token_count: u64,
}

/// Extract the JSON payload and token counts from a raw response body.
fn parse_response(raw: &str) -> LlmResult<Generation> {
    let response: GenerateContentResponse = serde_json::from_str(raw)?;

    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect::<String>())
        .ok_or_else(|| LlmError::MalformedOutput("response has no candidates".to_string()))?;

    let json = parse_json_text(&text)?;
    let usage = response.usage_metadata.unwrap_or_default();

    Ok(Generation {
        json,
        usage: TokenUsage {
            prompt_tokens: usage.prompt_token_count,
            response_tokens: usage.candidates_token_count,
            total_tokens: usage.total_token_count,
        },
    })
}

/// Parse model text as JSON, tolerating a surrounding Markdown code fence.
pub fn parse_json_text(text: &str) -> LlmResult<Value> {
    let trimmed = text.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed);
    serde_json::from_str(unfenced.trim())
        .map_err(|e| LlmError::MalformedOutput(format!("{e}: {}", preview(trimmed))))
}

fn preview(text: &str) -> String {
    text.chars().take(120).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::ResponseSchema;

    #[test]
    fn body_carries_schema_and_system_instruction() {
        let request = GenerationRequest::new("hello", 0.25, ResponseSchema::step_response())
            .with_system_instruction("be brief");
        let body = request_body(&request);

        assert_eq!(body["contents"][0]["parts"][0]["text"], "hello");
        assert_eq!(body["generationConfig"]["temperature"], 0.25);
        assert_eq!(
            body["generationConfig"]["responseMimeType"],
            "application/json"
        );
        assert_eq!(
            body["generationConfig"]["responseSchema"]["properties"]["response"]["type"],
            "STRING"
        );
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be brief");
    }

    #[test]
    fn free_form_body_has_no_schema() {
        let request = GenerationRequest::new("hi", 0.7, ResponseSchema::FreeForm);
        let body = request_body(&request);
        assert!(body["generationConfig"].get("responseSchema").is_none());
        assert!(body.get("systemInstruction").is_none());
    }

    #[test]
    fn parses_candidate_text_and_usage() {
        let raw = r#"{
            "candidates": [{"content": {"parts": [{"text": "{\"response\": \"ok\", \"type\": []}"}]}}],
            "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 4, "totalTokenCount": 16}
        }"#;
        let generation = parse_response(raw).unwrap();
        assert_eq!(generation.json["response"], "ok");
        assert_eq!(generation.usage.prompt_tokens, 12);
        assert_eq!(generation.usage.response_tokens, 4);
        assert_eq!(generation.usage.total_tokens, 16);
    }

    #[test]
    fn missing_candidates_is_malformed() {
        let err = parse_response(r#"{"candidates": []}"#).unwrap_err();
        assert!(matches!(err, LlmError::MalformedOutput(_)));
    }

    #[test]
    fn fenced_json_is_accepted() {
        let value = parse_json_text("```json\n{\"score\": [1, 2]}\n```").unwrap();
        assert_eq!(value["score"][1], 2);
    }

    #[test]
    fn non_json_text_is_malformed() {
        assert!(matches!(
            parse_json_text("I cannot answer that"),
            Err(LlmError::MalformedOutput(_))
        ));
    }

    #[test]
    fn empty_key_is_rejected() {
        assert!(matches!(
            GeminiClient::new(GeminiConfig::new("  ")),
            Err(LlmError::MissingCredential(_))
        ));
    }

    #[test]
    fn url_joins_endpoint_and_model() {
        let config = GeminiConfig {
            endpoint: "http://localhost:8080/v1/".to_string(),
            ..GeminiConfig::new("k").with_model("gemini-test")
        };
        assert_eq!(
            config.url(),
            "http://localhost:8080/v1/models/gemini-test:generateContent"
        );
    }
}
