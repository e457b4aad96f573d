//! Generation stage
//!
//! Each persona walks the steps in order, and every step's prompt replays the
//! persona's earlier answers. Chains for different personas run concurrently
//! on a bounded pool; a chain never runs two of its own steps at once.

use std::sync::Arc;

use psycsim_llm::{GenerationCapability, GenerationRequest, LlmError, ResponseSchema, TokenUsage};
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info, instrument};

use crate::domain::{CoreError, CoreResult, Persona, ResponseRow, ResponseTable, StepSpec};
use crate::metrics::METRICS;
use crate::obs;
use crate::prompts::{self, TranscriptEntry};

/// Text stored in place of a response that could not be generated.
pub const GENERATION_SENTINEL: &str = "Error generating response, ignore in simulation";

/// Generation output: one row per persona, in completion order.
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub table: ResponseTable,
    /// Token usage per persona chain, in the same order as `table.rows`.
    pub usage: Vec<TokenUsage>,
}

/// Runs chained step generation for a panel.
pub struct GenerationStage {
    capability: Arc<dyn GenerationCapability>,
    workers: usize,
}

impl GenerationStage {
    pub fn new(capability: Arc<dyn GenerationCapability>, workers: usize) -> Self {
        Self {
            capability,
            workers: workers.max(1),
        }
    }

    /// Generate one response per (persona, step).
    ///
    /// Fails only when `personas` does not hold exactly `panel_size` entries
    /// or a worker task panics. Call failures become [`GENERATION_SENTINEL`].
    #[instrument(skip_all, fields(stage = "generation", personas = personas.len(), steps = steps.len()))]
    pub async fn run(
        &self,
        steps: &[StepSpec],
        personas: &[Persona],
        panel_size: usize,
    ) -> CoreResult<GenerationOutcome> {
        if personas.len() != panel_size {
            return Err(CoreError::PanelSizeMismatch {
                expected: panel_size,
                actual: personas.len(),
            });
        }

        let steps: Arc<Vec<StepSpec>> = Arc::new(steps.to_vec());
        let results: Arc<Mutex<Vec<(ResponseRow, TokenUsage)>>> =
            Arc::new(Mutex::new(Vec::with_capacity(personas.len())));
        let sem = Arc::new(Semaphore::new(self.workers));

        let mut tasks = Vec::with_capacity(personas.len());
        for persona in personas.iter().cloned() {
            let capability = Arc::clone(&self.capability);
            let steps = Arc::clone(&steps);
            let results = Arc::clone(&results);
            let sem = Arc::clone(&sem);

            tasks.push(tokio::spawn(async move {
                let _permit = sem.acquire_owned().await.ok();
                let (row, usage) = run_chain(capability.as_ref(), &steps, persona).await;
                results.lock().await.push((row, usage));
            }));
        }

        for task in tasks {
            task.await
                .map_err(|e| CoreError::Worker(format!("generation task failed: {e}")))?;
        }

        let collected = std::mem::take(&mut *results.lock().await);
        let mut table = ResponseTable::new(steps.iter().map(|s| s.label.clone()).collect());
        let mut usage = Vec::with_capacity(collected.len());
        for (row, tokens) in collected {
            table.rows.push(row);
            usage.push(tokens);
        }

        info!(rows = table.len(), "generation finished");
        Ok(GenerationOutcome { table, usage })
    }
}

/// Walk one persona through every step, strictly in order.
async fn run_chain(
    capability: &dyn GenerationCapability,
    steps: &[StepSpec],
    persona: Persona,
) -> (ResponseRow, TokenUsage) {
    let mut transcript: Vec<TranscriptEntry> = Vec::with_capacity(steps.len());
    let mut usage = TokenUsage::default();

    for step in steps {
        let request = GenerationRequest::new(
            prompts::generation_prompt(&persona, &transcript, step),
            step.sampling_temperature(),
            ResponseSchema::step_response(),
        )
        .with_system_instruction(prompts::GENERATION_SYSTEM);

        let text = match generate_step(capability, request).await {
            Ok((text, tokens)) => {
                METRICS.record_call(&tokens);
                usage += tokens;
                debug!(persona = persona.number, step = %step.label, "step generated");
                text
            }
            Err(e) => {
                METRICS.record_failed_call();
                METRICS.inc_generation_failures();
                obs::emit_cell_failed("generation", persona.number, &step.label, &e);
                GENERATION_SENTINEL.to_string()
            }
        };

        transcript.push(TranscriptEntry {
            label: step.label.clone(),
            instructions: step.instructions.clone(),
            response: text,
        });
    }

    let responses = transcript.into_iter().map(|entry| entry.response).collect();
    (ResponseRow { persona, responses }, usage)
}

async fn generate_step(
    capability: &dyn GenerationCapability,
    request: GenerationRequest,
) -> Result<(String, TokenUsage), LlmError> {
    let generation = capability.generate(request).await?;
    let text = generation
        .json
        .get("response")
        .and_then(|v| v.as_str())
        .ok_or_else(|| LlmError::MalformedOutput("reply has no string `response` field".to_string()))?;
    Ok((text.to_string(), generation.usage))
}
