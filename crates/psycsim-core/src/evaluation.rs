//! Evaluation stage
//!
//! Every (persona, step) response is scored against the step's measures by
//! one capability call. Cells run on their own bounded pool, sized smaller
//! than generation's, and a failing cell only ever affects its own scores.

use std::collections::HashMap;
use std::sync::Arc;

use psycsim_llm::{GenerationCapability, GenerationRequest, LlmError, ResponseSchema, TokenUsage};
use serde_json::Value;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info, instrument};

use crate::domain::{
    CoreError, CoreResult, ResponseTable, Score, ScoreColumn, ScoreRow, ScoreTable, StepSpec,
};
use crate::metrics::METRICS;
use crate::obs;
use crate::prompts;

/// Evaluation output.
#[derive(Debug, Clone)]
pub struct EvaluationOutcome {
    pub table: ScoreTable,
    /// Token usage per evaluated cell, in completion order.
    pub usage: Vec<TokenUsage>,
}

/// Scores generated responses against step measures.
pub struct EvaluationStage {
    capability: Arc<dyn GenerationCapability>,
    workers: usize,
    temperature: f32,
}

struct CellResult {
    persona_number: u32,
    step_index: usize,
    scores: Vec<Score>,
    usage: Option<TokenUsage>,
}

impl EvaluationStage {
    pub fn new(capability: Arc<dyn GenerationCapability>, workers: usize, temperature: f32) -> Self {
        Self {
            capability,
            workers: workers.max(1),
            temperature,
        }
    }

    /// Score every response cell.
    ///
    /// The table's step columns must equal the step labels, in order, and
    /// every row must carry one response per step; column `i` is scored with
    /// step `i`. Steps without measures make no calls.
    #[instrument(skip_all, fields(stage = "evaluation", rows = responses.len(), steps = steps.len()))]
    pub async fn run(
        &self,
        responses: &ResponseTable,
        steps: &[StepSpec],
    ) -> CoreResult<EvaluationOutcome> {
        let labels: Vec<String> = steps.iter().map(|s| s.label.clone()).collect();
        if responses.step_labels != labels {
            return Err(CoreError::ColumnMismatch {
                expected: labels,
                actual: responses.step_labels.clone(),
            });
        }
        if let Some(row) = responses.rows.iter().find(|r| r.responses.len() != labels.len()) {
            return Err(CoreError::ColumnMismatch {
                expected: labels,
                actual: vec![format!(
                    "persona {} has {} responses",
                    row.persona.number,
                    row.responses.len()
                )],
            });
        }

        let steps: Arc<Vec<StepSpec>> = Arc::new(steps.to_vec());
        let results: Arc<Mutex<Vec<CellResult>>> = Arc::new(Mutex::new(Vec::new()));
        let sem = Arc::new(Semaphore::new(self.workers));

        let mut tasks = Vec::new();
        for row in &responses.rows {
            for (step_index, text) in row.responses.iter().enumerate() {
                if steps[step_index].measures.is_empty() {
                    continue;
                }

                let capability = Arc::clone(&self.capability);
                let steps = Arc::clone(&steps);
                let results = Arc::clone(&results);
                let sem = Arc::clone(&sem);
                let persona_number = row.persona.number;
                let text = text.clone();
                let temperature = self.temperature;

                tasks.push(tokio::spawn(async move {
                    let _permit = sem.acquire_owned().await.ok();
                    let step = &steps[step_index];
                    let cell = evaluate_cell(capability.as_ref(), step, &text, temperature).await;

                    let (scores, usage) = match cell {
                        Ok((scores, usage)) => {
                            METRICS.record_call(&usage);
                            debug!(persona = persona_number, step = %step.label, "cell scored");
                            (scores, Some(usage))
                        }
                        Err(e) => {
                            METRICS.record_failed_call();
                            METRICS.inc_evaluation_failures();
                            obs::emit_cell_failed("evaluation", persona_number, &step.label, &e);
                            (vec![Score::Error; step.measures.len()], None)
                        }
                    };

                    results.lock().await.push(CellResult {
                        persona_number,
                        step_index,
                        scores,
                        usage,
                    });
                }));
            }
        }

        for task in tasks {
            task.await
                .map_err(|e| CoreError::Worker(format!("evaluation task failed: {e}")))?;
        }

        let cells = std::mem::take(&mut *results.lock().await);
        let table = assemble_table(responses, &steps, &cells);
        let usage = cells.iter().filter_map(|c| c.usage).collect();

        info!(rows = table.rows.len(), columns = table.columns.len(), "evaluation finished");
        Ok(EvaluationOutcome { table, usage })
    }
}

async fn evaluate_cell(
    capability: &dyn GenerationCapability,
    step: &StepSpec,
    response: &str,
    temperature: f32,
) -> Result<(Vec<Score>, TokenUsage), LlmError> {
    let request = GenerationRequest::new(
        prompts::evaluation_prompt(step, response),
        temperature,
        ResponseSchema::score_sheet(),
    )
    .with_system_instruction(prompts::evaluation_system(&step.measures));

    let generation = capability.generate(request).await?;
    let scores = parse_scores(&generation.json, step.measures.len())?;
    Ok((scores, generation.usage))
}

/// Map a score sheet reply onto `measure_count` positional scores.
///
/// A reply without a `score` array scores every measure as poorly defined;
/// a short array leaves the trailing measures poorly defined; non-numeric
/// entries are not scored.
pub fn parse_scores(reply: &Value, measure_count: usize) -> Result<Vec<Score>, LlmError> {
    let object = reply
        .as_object()
        .ok_or_else(|| LlmError::MalformedOutput("score sheet is not a JSON object".to_string()))?;

    let entries: &[Value] = match object.get("score") {
        None | Some(Value::Null) => &[],
        Some(Value::Array(entries)) => entries,
        Some(_) => {
            return Err(LlmError::MalformedOutput(
                "`score` is not an array".to_string(),
            ))
        }
    };

    Ok((0..measure_count)
        .map(|idx| match entries.get(idx) {
            Some(entry) => entry.as_f64().map(Score::Value).unwrap_or(Score::NotScored),
            None => Score::PoorlyDefinedCriteria,
        })
        .collect())
}

fn assemble_table(responses: &ResponseTable, steps: &[StepSpec], cells: &[CellResult]) -> ScoreTable {
    let mut columns = Vec::new();
    let mut offsets = Vec::with_capacity(steps.len());
    for step in steps {
        offsets.push(columns.len());
        for measure in &step.measures {
            columns.push(ScoreColumn {
                step_label: step.label.clone(),
                measure_title: measure.title.clone(),
            });
        }
    }

    let by_cell: HashMap<(u32, usize), &CellResult> = cells
        .iter()
        .map(|c| ((c.persona_number, c.step_index), c))
        .collect();

    let rows = responses
        .rows
        .iter()
        .map(|row| {
            let mut scores = vec![Score::Error; columns.len()];
            for (step_index, step) in steps.iter().enumerate() {
                if let Some(cell) = by_cell.get(&(row.persona.number, step_index)) {
                    let offset = offsets[step_index];
                    scores[offset..offset + step.measures.len()].copy_from_slice(&cell.scores);
                }
            }
            ScoreRow {
                persona_number: row.persona.number,
                scores,
            }
        })
        .collect();

    ScoreTable { columns, rows }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn short_score_array_is_poorly_defined() {
        let scores = parse_scores(&json!({"metric": ["a", "b"], "score": [2, 9]}), 3).unwrap();
        assert_eq!(
            scores,
            vec![
                Score::Value(2.0),
                Score::Value(9.0),
                Score::PoorlyDefinedCriteria
            ]
        );
    }

    #[test]
    fn missing_score_key_marks_every_measure() {
        let scores = parse_scores(&json!({"metric": []}), 2).unwrap();
        assert_eq!(scores, vec![Score::PoorlyDefinedCriteria; 2]);
    }

    #[test]
    fn non_numeric_entry_is_not_scored() {
        let scores = parse_scores(&json!({"score": ["high", 3.5]}), 2).unwrap();
        assert_eq!(scores, vec![Score::NotScored, Score::Value(3.5)]);
    }

    #[test]
    fn malformed_replies_are_errors() {
        assert!(parse_scores(&json!([1, 2]), 2).is_err());
        assert!(parse_scores(&json!({"score": 4}), 1).is_err());
    }
}
