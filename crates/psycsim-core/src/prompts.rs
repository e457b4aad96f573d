//! Prompt construction for generation, evaluation and step authoring.
//!
//! Builders here are pure string functions; the stages decide what to send
//! and how to interpret the reply.

use std::fmt::Write as _;

use crate::domain::{MeasureSpec, Persona, StepSpec};

/// System instruction for chained step generation.
pub const GENERATION_SYSTEM: &str = "You are role-playing a participant in a research study. \
Stay in character as the persona you are given and answer each step the way that person would. \
Reply in plain text as a single paragraph, with no headings and no commentary about the task.";

/// A completed step in a persona's chain.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptEntry {
    pub label: String,
    pub instructions: String,
    pub response: String,
}

/// Persona preamble opening every generation prompt.
pub fn persona_preamble(persona: &Persona) -> String {
    format!(
        "You are {}, taking part in a psychology study on everyday thinking and decision making. \
Answer as this person, in plain text, as a single paragraph, without explanatory notes.\n\n",
        persona.describe()
    )
}

/// Prompt for one step: preamble, prior transcript (if any), then the
/// current step's instructions.
pub fn generation_prompt(persona: &Persona, transcript: &[TranscriptEntry], step: &StepSpec) -> String {
    let mut prompt = persona_preamble(persona);

    if !transcript.is_empty() {
        prompt.push_str("Given the previous steps with responses:\n");
        for entry in transcript {
            let _ = write!(
                prompt,
                "\nStep: {}\nInstructions: {}\nResponse: {}\n",
                entry.label, entry.instructions, entry.response
            );
        }
        prompt.push('\n');
    }

    let _ = write!(
        prompt,
        "Current step: {}\nInstructions: {}\n",
        step.label, step.instructions
    );
    prompt
}

/// Scoring guidance for a step's measures: description, numeric bounds and
/// anchors for each.
pub fn measures_block(measures: &[MeasureSpec]) -> String {
    let mut block = String::new();
    for measure in measures {
        let (min, max) = measure.bounds();
        let _ = write!(
            block,
            "\n### {}\nDescription: {}\nRange: {} (minimum: {min}, maximum: {max})\n",
            measure.title, measure.description, measure.range
        );
        if measure.desired_values.is_empty() {
            let _ = writeln!(
                block,
                "Scoring: use the full range from {min} to {max} according to quality"
            );
        } else {
            block.push_str("Scoring reference points:\n");
            for anchor in &measure.desired_values {
                let _ = writeln!(
                    block,
                    "  - {}: use {} as the anchor for this quality level",
                    anchor.label,
                    anchor.value_text()
                );
            }
        }
    }
    block
}

/// System instruction for scoring one response.
pub fn evaluation_system(measures: &[MeasureSpec]) -> String {
    format!(
        "You are an expert rater scoring a participant's response in a research study. \
Score the response on each measure below, staying inside each measure's range. \
Return the measure titles in `metric` and one number per measure in `score`, in the order listed.\n{}",
        measures_block(measures)
    )
}

/// User prompt for scoring one (persona, step) response.
pub fn evaluation_prompt(step: &StepSpec, response: &str) -> String {
    let mut measure_list = String::new();
    for (idx, measure) in step.measures.iter().enumerate() {
        let _ = writeln!(measure_list, "{}. {}", idx + 1, measure.title);
    }
    format!(
        "Step: {}\nInstructions given to the participant: {}\n\nParticipant response:\n{}\n\n\
Measures to score, in order:\n{}",
        step.label, step.instructions, response, measure_list
    )
}

/// Prompt asking for draft study steps as a JSON object.
pub fn step_authoring_prompt(prompt: &str, title: &str, introduction: &str) -> String {
    let mut out = String::from(
        "You design step-by-step procedures for psychology studies run with simulated participants.\n",
    );
    if !title.trim().is_empty() {
        let _ = writeln!(out, "Study title: {}", title.trim());
    }
    if !introduction.trim().is_empty() {
        let _ = writeln!(out, "Study introduction: {}", introduction.trim());
    }
    let _ = write!(
        out,
        "\nStudy description:\n{}\n\n\
Return a JSON object whose keys are step01, step02, ... in order. \
Each value is an object with a `title` and `instructions` addressed to the participant. \
Do not include an introduction or welcome step; start with the first task.",
        prompt.trim()
    );
    out
}
