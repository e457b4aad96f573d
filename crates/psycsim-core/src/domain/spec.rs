//! Run specification: the payload a researcher submits for one simulation.
//!
//! A [`RunSpec`] is parsed from JSON as submitted and then validated once
//! into a [`ValidatedRun`]. Every later stage works only on the validated
//! form, so label uniqueness and value ranges are never re-checked.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::error::{CoreError, CoreResult};

/// Temperature used when a step omits one (percent scale).
pub const DEFAULT_STEP_TEMPERATURE: f64 = 70.0;

/// Measure range used when the textual range cannot be parsed.
pub const FALLBACK_RANGE: (f64, f64) = (0.0, 10.0);

fn default_step_temperature() -> f64 {
    DEFAULT_STEP_TEMPERATURE
}

/// Full run configuration as submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSpec {
    pub title: String,
    #[serde(alias = "userId")]
    pub user_id: String,
    pub sample: SampleSpec,
    pub steps: Vec<StepSpec>,
    /// Panel size; the configured default applies when absent.
    #[serde(default)]
    pub iters: Option<usize>,
}

/// The sample whose persona panel the run uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleSpec {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Attribute pools; empty means free-text personas from the catalog.
    #[serde(default)]
    pub attributes: Vec<AttributePool>,
}

/// One labelled attribute and the candidate values a persona may draw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributePool {
    pub label: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub values: Vec<String>,
}

/// One step of the simulated process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSpec {
    #[serde(default)]
    pub label: String,
    pub instructions: String,
    /// Percent scale, `0..=100`; divided by 100 before use.
    #[serde(default = "default_step_temperature")]
    pub temperature: f64,
    #[serde(default)]
    pub measures: Vec<MeasureSpec>,
}

impl StepSpec {
    /// Sampling temperature on the capability's `[0, 1]` scale.
    pub fn sampling_temperature(&self) -> f32 {
        (self.temperature / 100.0) as f32
    }
}

/// A scoring criterion attached to a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasureSpec {
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Textual range such as `"1 - 5"`.
    #[serde(default)]
    pub range: String,
    #[serde(default, rename = "desiredValues", alias = "desired_values")]
    pub desired_values: Vec<DesiredValue>,
}

impl MeasureSpec {
    /// Numeric bounds parsed from `range`, or [`FALLBACK_RANGE`].
    ///
    /// Accepts `"min - max"` and `"min-max"`.
    pub fn bounds(&self) -> (f64, f64) {
        parse_range(&self.range).unwrap_or(FALLBACK_RANGE)
    }
}

fn parse_range(range: &str) -> Option<(f64, f64)> {
    let parts: Vec<&str> = if range.contains(" - ") {
        range.split(" - ").collect()
    } else if range.contains('-') {
        range.split('-').collect()
    } else {
        return None;
    };
    match parts.as_slice() {
        [min, max] => Some((min.trim().parse().ok()?, max.trim().parse().ok()?)),
        _ => None,
    }
}

/// An anchor point for a measure (e.g. "Excellent" at 5).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesiredValue {
    pub label: String,
    pub value: serde_json::Value,
}

impl DesiredValue {
    /// The anchor value as display text.
    pub fn value_text(&self) -> String {
        match &self.value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// A run spec that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRun {
    pub title: String,
    pub owner_id: String,
    pub sample: SampleSpec,
    /// Steps with unique, non-empty labels and unique measure titles.
    pub steps: Vec<StepSpec>,
    pub panel_size: usize,
}

impl ValidatedRun {
    pub fn step_labels(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.label.clone()).collect()
    }
}

impl RunSpec {
    /// Parse a submitted JSON payload.
    pub fn from_value(value: &serde_json::Value) -> CoreResult<Self> {
        RunSpec::deserialize(value).map_err(|e| CoreError::InvalidSpec(e.to_string()))
    }

    /// Validate and normalise into a [`ValidatedRun`].
    ///
    /// - at least one step
    /// - panel size (from `iters` or `default_panel_size`) at least 1
    /// - temperatures within `0..=100`
    /// - empty labels become `Step_<n>`; duplicate labels get `_2`, `_3`, ...
    /// - duplicate measure titles within a step are suffixed the same way
    pub fn validate(self, default_panel_size: usize) -> CoreResult<ValidatedRun> {
        if self.steps.is_empty() {
            return Err(CoreError::InvalidSpec(
                "at least one step is required".to_string(),
            ));
        }

        let panel_size = self.iters.unwrap_or(default_panel_size);
        if panel_size == 0 {
            return Err(CoreError::InvalidSpec(
                "panel size must be at least 1".to_string(),
            ));
        }

        for (idx, step) in self.steps.iter().enumerate() {
            if !(0.0..=100.0).contains(&step.temperature) {
                return Err(CoreError::InvalidSpec(format!(
                    "step {} temperature {} is outside 0..=100",
                    idx + 1,
                    step.temperature
                )));
            }
        }

        let mut used_labels = HashSet::new();
        let steps = self
            .steps
            .into_iter()
            .enumerate()
            .map(|(idx, mut step)| {
                let base = match step.label.trim() {
                    "" => format!("Step_{}", idx + 1),
                    label => label.to_string(),
                };
                step.label = unique_name(&base, &mut used_labels);

                let mut used_titles = HashSet::new();
                for measure in &mut step.measures {
                    measure.title = unique_name(measure.title.trim(), &mut used_titles);
                }
                step
            })
            .collect();

        Ok(ValidatedRun {
            title: self.title,
            owner_id: self.user_id,
            sample: self.sample,
            steps,
            panel_size,
        })
    }
}

/// Return `base`, or `base_<n>` for the smallest `n >= 2` not yet used.
fn unique_name(base: &str, used: &mut HashSet<String>) -> String {
    let mut candidate = base.to_string();
    let mut counter = 2;
    while used.contains(&candidate) {
        candidate = format!("{base}_{counter}");
        counter += 1;
    }
    used.insert(candidate.clone());
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(steps: serde_json::Value) -> RunSpec {
        RunSpec::from_value(&json!({
            "title": "Wellbeing",
            "user_id": "u1",
            "sample": {"id": "s1", "name": "Adults", "attributes": []},
            "steps": steps,
        }))
        .unwrap()
    }

    #[test]
    fn duplicate_labels_become_unique() {
        let run = spec(json!([
            {"label": "Reflect", "instructions": "a"},
            {"label": "Reflect", "instructions": "b"},
            {"label": "Reflect_2", "instructions": "c"},
            {"label": "", "instructions": "d"},
        ]))
        .validate(10)
        .unwrap();

        assert_eq!(
            run.step_labels(),
            vec!["Reflect", "Reflect_2", "Reflect_2_2", "Step_4"]
        );
    }

    #[test]
    fn duplicate_measure_titles_become_unique() {
        let run = spec(json!([{
            "label": "A",
            "instructions": "a",
            "measures": [{"title": "Clarity"}, {"title": "Clarity"}],
        }]))
        .validate(10)
        .unwrap();

        let titles: Vec<&str> = run.steps[0]
            .measures
            .iter()
            .map(|m| m.title.as_str())
            .collect();
        assert_eq!(titles, vec!["Clarity", "Clarity_2"]);
    }

    #[test]
    fn empty_steps_rejected() {
        let err = spec(json!([])).validate(10).unwrap_err();
        assert!(matches!(err, CoreError::InvalidSpec(_)));
    }

    #[test]
    fn temperature_out_of_range_rejected() {
        let err = spec(json!([{"label": "A", "instructions": "a", "temperature": 150}]))
            .validate(10)
            .unwrap_err();
        assert!(err.to_string().contains("temperature"));
    }

    #[test]
    fn panel_size_defaults_and_rejects_zero() {
        assert_eq!(
            spec(json!([{"instructions": "a"}]))
                .validate(7)
                .unwrap()
                .panel_size,
            7
        );

        let mut zero = spec(json!([{"instructions": "a"}]));
        zero.iters = Some(0);
        assert!(zero.validate(7).is_err());
    }

    #[test]
    fn sampling_temperature_is_scaled() {
        let step = StepSpec {
            label: "A".to_string(),
            instructions: String::new(),
            temperature: 50.0,
            measures: Vec::new(),
        };
        assert!((step.sampling_temperature() - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn range_parsing() {
        let measure = |range: &str| MeasureSpec {
            title: "m".to_string(),
            description: String::new(),
            range: range.to_string(),
            desired_values: Vec::new(),
        };
        assert_eq!(measure("1 - 5").bounds(), (1.0, 5.0));
        assert_eq!(measure("0-100").bounds(), (0.0, 100.0));
        assert_eq!(measure("-5 - 5").bounds(), (-5.0, 5.0));
        assert_eq!(measure("low to high").bounds(), FALLBACK_RANGE);
        assert_eq!(measure("1-2-3").bounds(), FALLBACK_RANGE);
        assert_eq!(measure("").bounds(), FALLBACK_RANGE);
    }

    #[test]
    fn camel_case_fields_accepted() {
        let run = RunSpec::from_value(&json!({
            "title": "t",
            "userId": "u",
            "sample": {"id": "s"},
            "steps": [{"label": "A", "instructions": "a", "temperature": 20,
                       "measures": [{"title": "M", "range": "1-5",
                                     "desiredValues": [{"label": "Great", "value": 5}]}]}],
            "iters": 3,
        }))
        .unwrap();
        assert_eq!(run.user_id, "u");
        assert_eq!(run.steps[0].measures[0].desired_values[0].value_text(), "5");
        assert_eq!(run.iters, Some(3));
    }

    #[test]
    fn malformed_payload_is_invalid_spec() {
        let err = RunSpec::from_value(&json!({"title": 3})).unwrap_err();
        assert!(matches!(err, CoreError::InvalidSpec(_)));
    }
}
