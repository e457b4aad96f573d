//! Response and score tables produced by the pipeline stages.
//!
//! Rows arrive in completion order. Anything positional must call
//! `sort_by_persona` first; persona number is the only authoritative order.

use serde::{Serialize, Serializer};

use super::persona::Persona;

/// Name of the identifier column in a response table.
pub const PERSONA_COLUMN: &str = "persona";

/// One generated response.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseCell {
    pub persona_number: u32,
    pub step_label: String,
    pub text: String,
}

/// One persona's chained responses, positional per step.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseRow {
    pub persona: Persona,
    pub responses: Vec<String>,
}

/// Generation output: a persona column plus one column per step label.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseTable {
    pub step_labels: Vec<String>,
    pub rows: Vec<ResponseRow>,
}

impl ResponseTable {
    pub fn new(step_labels: Vec<String>) -> Self {
        Self {
            step_labels,
            rows: Vec::new(),
        }
    }

    /// `["persona", step_label_1, ...]`
    pub fn columns(&self) -> Vec<String> {
        std::iter::once(PERSONA_COLUMN.to_string())
            .chain(self.step_labels.iter().cloned())
            .collect()
    }

    pub fn sort_by_persona(&mut self) {
        self.rows.sort_by_key(|row| row.persona.number);
    }

    /// Every (persona, step) cell, row by row.
    pub fn cells(&self) -> impl Iterator<Item = ResponseCell> + '_ {
        self.rows.iter().flat_map(move |row| {
            self.step_labels
                .iter()
                .zip(&row.responses)
                .map(move |(label, text)| ResponseCell {
                    persona_number: row.persona.number,
                    step_label: label.clone(),
                    text: text.clone(),
                })
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A measure score, or the sentinel that replaced it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Score {
    Value(f64),
    /// The reply had fewer scores than the step has measures.
    PoorlyDefinedCriteria,
    /// The cell's evaluation call or its parsing failed.
    Error,
    /// The reply had an entry for this measure, but not a number.
    NotScored,
}

impl Score {
    pub const POORLY_DEFINED: &'static str = "poorly defined criteria";
    pub const ERROR: &'static str = "error";
    pub const NOT_SCORED: &'static str = "not scored";

    pub fn value(&self) -> Option<f64> {
        match self {
            Score::Value(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.value().is_none()
    }

    /// Numeric scores as JSON numbers, sentinels as their fixed text.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Score::Value(v) => serde_json::json!(v),
            Score::PoorlyDefinedCriteria => Self::POORLY_DEFINED.into(),
            Score::Error => Self::ERROR.into(),
            Score::NotScored => Self::NOT_SCORED.into(),
        }
    }
}

impl Serialize for Score {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Score::Value(v) => serializer.serialize_f64(*v),
            Score::PoorlyDefinedCriteria => serializer.serialize_str(Self::POORLY_DEFINED),
            Score::Error => serializer.serialize_str(Self::ERROR),
            Score::NotScored => serializer.serialize_str(Self::NOT_SCORED),
        }
    }
}

/// One scored measure.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreCell {
    pub persona_number: u32,
    pub step_label: String,
    pub measure_title: String,
    pub score: Score,
}

/// One persona's scores, positional per score column.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreRow {
    pub persona_number: u32,
    pub scores: Vec<Score>,
}

/// A score column: `"{step_label}_{measure_title}"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreColumn {
    pub step_label: String,
    pub measure_title: String,
}

impl ScoreColumn {
    pub fn name(&self) -> String {
        format!("{}_{}", self.step_label, self.measure_title)
    }
}

/// Evaluation output: one row per persona, one column per (step, measure).
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreTable {
    pub columns: Vec<ScoreColumn>,
    pub rows: Vec<ScoreRow>,
}

impl ScoreTable {
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(ScoreColumn::name).collect()
    }

    pub fn sort_by_persona(&mut self) {
        self.rows.sort_by_key(|row| row.persona_number);
    }

    pub fn row(&self, persona_number: u32) -> Option<&ScoreRow> {
        self.rows.iter().find(|r| r.persona_number == persona_number)
    }

    pub fn cells(&self) -> impl Iterator<Item = ScoreCell> + '_ {
        self.rows.iter().flat_map(move |row| {
            self.columns
                .iter()
                .zip(&row.scores)
                .map(move |(column, score)| ScoreCell {
                    persona_number: row.persona_number,
                    step_label: column.step_label.clone(),
                    measure_title: column.measure_title.clone(),
                    score: *score,
                })
        })
    }
}
