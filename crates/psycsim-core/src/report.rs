//! Report assembly and publishing.
//!
//! The report is a JSON workbook with four sheets: the step catalog, the
//! persona panel, the responses and the scores. Every sheet is ordered by
//! persona number, whatever order the stages finished in.

use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use psycsim_state::{BlobStore, UsageTotals};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument, warn};

use crate::domain::{CoreError, CoreResult, Persona, PersonaProfile, ResponseTable, ScoreTable, StepSpec};

pub const STEPS_SHEET: &str = "Simulation Steps";
pub const PERSONAS_SHEET: &str = "Personas";
pub const RESPONSES_SHEET: &str = "Responses";
pub const METRICS_SHEET: &str = "Metrics";

/// Placeholder for an attribute a persona does not have.
pub const MISSING_ATTRIBUTE: &str = "N/A";

/// One named table of the workbook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sheet {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// The full report artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workbook {
    pub generated_at: DateTime<Utc>,
    pub job_id: String,
    pub usage: UsageTotals,
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }
}

/// Build the workbook. Rows are sorted by persona number here.
pub fn build_workbook(
    job_id: &str,
    responses: &ResponseTable,
    scores: &ScoreTable,
    personas: &[Persona],
    steps: &[StepSpec],
    usage: UsageTotals,
) -> Workbook {
    let mut responses = responses.clone();
    responses.sort_by_persona();
    let mut scores = scores.clone();
    scores.sort_by_persona();
    let mut personas = personas.to_vec();
    personas.sort_by_key(|p| p.number);

    Workbook {
        generated_at: Utc::now(),
        job_id: job_id.to_string(),
        usage,
        sheets: vec![
            steps_sheet(steps),
            personas_sheet(&personas),
            responses_sheet(&responses),
            metrics_sheet(&scores),
        ],
    }
}

fn steps_sheet(steps: &[StepSpec]) -> Sheet {
    let rows = steps
        .iter()
        .map(|step| {
            let measures = step
                .measures
                .iter()
                .map(|m| format!("{}: {} (Range: {})", m.title, m.description, m.range))
                .collect::<Vec<_>>()
                .join("; ");
            vec![
                Value::from(step.label.as_str()),
                Value::from(step.instructions.as_str()),
                Value::from(step.temperature),
                Value::from(measures),
            ]
        })
        .collect();

    Sheet {
        name: STEPS_SHEET.to_string(),
        columns: ["Label", "Instructions", "Temperature", "Measures"]
            .iter()
            .map(|c| c.to_string())
            .collect(),
        rows,
    }
}

fn personas_sheet(personas: &[Persona]) -> Sheet {
    let keys: BTreeSet<&str> = personas
        .iter()
        .filter_map(Persona::attributes)
        .flat_map(|attrs| attrs.keys().map(String::as_str))
        .collect();
    let has_free_text = personas
        .iter()
        .any(|p| matches!(p.profile, PersonaProfile::Description { .. }));

    let mut columns = vec!["ID".to_string()];
    columns.extend(keys.iter().map(|k| k.to_string()));
    if has_free_text {
        columns.push("Persona".to_string());
    }

    let rows = personas
        .iter()
        .enumerate()
        .map(|(idx, persona)| {
            let mut row = vec![Value::from(idx + 1)];
            for key in &keys {
                let value = persona
                    .attributes()
                    .and_then(|attrs| attrs.get(*key))
                    .map(String::as_str)
                    .unwrap_or(MISSING_ATTRIBUTE);
                row.push(Value::from(value));
            }
            if has_free_text {
                let text = match &persona.profile {
                    PersonaProfile::Description { description } => description.as_str(),
                    PersonaProfile::Attributes { .. } => MISSING_ATTRIBUTE,
                };
                row.push(Value::from(text));
            }
            row
        })
        .collect();

    Sheet {
        name: PERSONAS_SHEET.to_string(),
        columns,
        rows,
    }
}

fn responses_sheet(responses: &ResponseTable) -> Sheet {
    let mut columns = vec!["ID".to_string()];
    columns.extend(responses.step_labels.iter().cloned());

    let rows = responses
        .rows
        .iter()
        .enumerate()
        .map(|(idx, row)| {
            std::iter::once(Value::from(idx + 1))
                .chain(row.responses.iter().map(|text| Value::from(strip_newlines(text))))
                .collect()
        })
        .collect();

    Sheet {
        name: RESPONSES_SHEET.to_string(),
        columns,
        rows,
    }
}

fn metrics_sheet(scores: &ScoreTable) -> Sheet {
    let mut columns = vec!["ID".to_string()];
    columns.extend(scores.column_names());

    let rows = scores
        .rows
        .iter()
        .enumerate()
        .map(|(idx, row)| {
            std::iter::once(Value::from(idx + 1))
                .chain(row.scores.iter().map(|s| s.to_json()))
                .collect()
        })
        .collect();

    Sheet {
        name: METRICS_SHEET.to_string(),
        columns,
        rows,
    }
}

fn strip_newlines(text: &str) -> String {
    text.replace("\r\n", " ").replace(['\n', '\r'], " ")
}

/// Keep ASCII alphanumerics, `-` and `_`; replace everything else.
fn sanitize_file_component(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Artifact file name: `simulation_<job_id>_<UTC timestamp>.json`.
pub fn artifact_file_name(job_id: &str, at: DateTime<Utc>) -> String {
    format!(
        "simulation_{}_{}.json",
        sanitize_file_component(job_id),
        at.format("%Y%m%dT%H%M%SZ")
    )
}

/// A report written to a transient local file.
#[derive(Debug)]
pub struct ReportArtifact {
    pub path: PathBuf,
    pub file_name: String,
}

/// Writes workbooks to local files and publishes them to blob storage.
#[derive(Debug, Clone)]
pub struct ReportAssembler {
    artifact_dir: PathBuf,
}

impl ReportAssembler {
    pub fn new(artifact_dir: impl Into<PathBuf>) -> Self {
        Self {
            artifact_dir: artifact_dir.into(),
        }
    }

    pub fn artifact_dir(&self) -> &Path {
        &self.artifact_dir
    }

    /// Build the workbook and write it to a local file.
    #[instrument(skip_all, fields(stage = "report", job_id = %job_id))]
    pub fn assemble(
        &self,
        job_id: &str,
        responses: &ResponseTable,
        scores: &ScoreTable,
        personas: &[Persona],
        steps: &[StepSpec],
        usage: UsageTotals,
    ) -> CoreResult<ReportArtifact> {
        let workbook = build_workbook(job_id, responses, scores, personas, steps, usage);
        let file_name = artifact_file_name(job_id, workbook.generated_at);
        let path = self.artifact_dir.join(&file_name);

        std::fs::create_dir_all(&self.artifact_dir)?;
        let mut tmp = NamedTempFile::new_in(&self.artifact_dir)?;
        serde_json::to_writer_pretty(&mut tmp, &workbook)?;
        tmp.flush()?;
        tmp.persist(&path).map_err(|e| CoreError::Io(e.error))?;

        debug!(path = %path.display(), "report written");
        Ok(ReportArtifact { path, file_name })
    }

    /// Upload the artifact to `<prefix>/<file name>` and return its public URL.
    ///
    /// The local file is removed whether or not the upload succeeds; a
    /// failed removal is only logged.
    #[instrument(skip_all, fields(stage = "publish", file = %artifact.file_name))]
    pub async fn publish(
        &self,
        artifact: ReportArtifact,
        blobs: &dyn BlobStore,
        prefix: &str,
    ) -> CoreResult<String> {
        let blob_path = match prefix.trim_matches('/') {
            "" => artifact.file_name.clone(),
            prefix => format!("{prefix}/{}", artifact.file_name),
        };

        let uploaded = match tokio::fs::read(&artifact.path).await {
            Ok(bytes) => blobs.upload(&blob_path, bytes).await.map_err(CoreError::from),
            Err(e) => Err(CoreError::from(e)),
        };

        if let Err(e) = tokio::fs::remove_file(&artifact.path).await {
            warn!(path = %artifact.path.display(), error = %e, "failed to remove local report");
        }

        let url = uploaded?;
        info!(url = %url, "report published");
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MeasureSpec, ResponseRow, Score, ScoreColumn, ScoreRow};
    use std::collections::BTreeMap;

    fn attrs(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn file_name_is_sanitized_and_timestamped() {
        let at = DateTime::parse_from_rfc3339("2026-03-01T12:30:45Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(
            artifact_file_name("job/42 x", at),
            "simulation_job_42_x_20260301T123045Z.json"
        );
    }

    #[test]
    fn personas_sheet_flattens_sorted_keys() {
        let personas = vec![
            Persona::with_attributes(2, attrs(&[("Region", "North")])),
            Persona::with_attributes(1, attrs(&[("Age", "30"), ("Region", "South")])),
        ];
        let mut sorted = personas.clone();
        sorted.sort_by_key(|p| p.number);
        let sheet = personas_sheet(&sorted);

        assert_eq!(sheet.columns, vec!["ID", "Age", "Region"]);
        assert_eq!(sheet.rows[0], vec![Value::from(1), "30".into(), "South".into()]);
        assert_eq!(sheet.rows[1], vec![Value::from(2), "N/A".into(), "North".into()]);
    }

    #[test]
    fn workbook_sorts_rows_and_strips_newlines() {
        let steps = vec![StepSpec {
            label: "Seed".to_string(),
            instructions: "go".to_string(),
            temperature: 70.0,
            measures: vec![MeasureSpec {
                title: "Clarity".to_string(),
                description: "clear".to_string(),
                range: "1 - 5".to_string(),
                desired_values: Vec::new(),
            }],
        }];
        let mut responses = ResponseTable::new(vec!["Seed".to_string()]);
        for n in [2, 1] {
            responses.rows.push(ResponseRow {
                persona: Persona::with_description(n, format!("p{n}")),
                responses: vec![format!("line one\nline {n}")],
            });
        }
        let scores = ScoreTable {
            columns: vec![ScoreColumn {
                step_label: "Seed".to_string(),
                measure_title: "Clarity".to_string(),
            }],
            rows: vec![
                ScoreRow {
                    persona_number: 2,
                    scores: vec![Score::Error],
                },
                ScoreRow {
                    persona_number: 1,
                    scores: vec![Score::Value(4.0)],
                },
            ],
        };
        let personas: Vec<Persona> = responses.rows.iter().map(|r| r.persona.clone()).collect();

        let book = build_workbook("j1", &responses, &scores, &personas, &steps, UsageTotals::default());

        let steps_sheet = book.sheet(STEPS_SHEET).unwrap();
        assert_eq!(steps_sheet.rows[0][3], "Clarity: clear (Range: 1 - 5)");

        let responses_sheet = book.sheet(RESPONSES_SHEET).unwrap();
        assert_eq!(responses_sheet.rows[0][1], "line one line 1");
        assert_eq!(responses_sheet.rows[1][1], "line one line 2");

        let metrics = book.sheet(METRICS_SHEET).unwrap();
        assert_eq!(metrics.columns, vec!["ID", "Seed_Clarity"]);
        assert_eq!(metrics.rows[0][1], 4.0);
        assert_eq!(metrics.rows[1][1], "error");

        let personas_sheet = book.sheet(PERSONAS_SHEET).unwrap();
        assert_eq!(personas_sheet.columns, vec!["ID", "Persona"]);
        assert_eq!(personas_sheet.rows[0][1], "p1");
    }
}
