//! GutenOCR task prompts.
//!
//! GutenOCR is trained on a small set of fixed instructions, one per (task,
//! output format) pair. We pick the instruction here.

use std::fmt;

use clap::ValueEnum;
use schemars::JsonSchema;

use crate::prelude::*;

/// Instruction used when a (task, format) pair has no prompt of its own.
pub const FALLBACK_PROMPT: &str = "Read all text in the image.";

/// What we want the model to do.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, JsonSchema, PartialEq, Eq, Serialize, ValueEnum,
)]
#[serde(rename_all = "snake_case")]
#[clap(rename_all = "snake_case")]
pub enum TaskType {
    /// Read the text in the image.
    #[default]
    Reading,
    /// Find text regions.
    Detection,
    /// Read the text in a specific region.
    LocalizedReading,
    /// Find regions matching a text query.
    ConditionalDetection,
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskType::Reading => "reading",
            TaskType::Detection => "detection",
            TaskType::LocalizedReading => "localized_reading",
            TaskType::ConditionalDetection => "conditional_detection",
        };
        f.write_str(name)
    }
}

/// How we want the model to format its output.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, JsonSchema, PartialEq, Eq, Serialize, ValueEnum,
)]
pub enum OutputFormat {
    /// Plain text, linearized left-to-right, top-to-bottom.
    #[default]
    #[serde(rename = "TEXT")]
    #[clap(name = "TEXT")]
    Text,
    /// Layout-preserving text.
    #[serde(rename = "TEXT2D")]
    #[clap(name = "TEXT2D")]
    Text2D,
    /// Lines with bounding boxes.
    #[serde(rename = "LINES")]
    #[clap(name = "LINES")]
    Lines,
    /// Words with bounding boxes.
    #[serde(rename = "WORDS")]
    #[clap(name = "WORDS")]
    Words,
    /// Paragraphs with bounding boxes.
    #[serde(rename = "PARAGRAPHS")]
    #[clap(name = "PARAGRAPHS")]
    Paragraphs,
    /// LaTeX expressions with bounding boxes.
    #[serde(rename = "LATEX")]
    #[clap(name = "LATEX")]
    Latex,
    /// Bounding boxes only.
    #[serde(rename = "BOX")]
    #[clap(name = "BOX")]
    Boxes,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputFormat::Text => "TEXT",
            OutputFormat::Text2D => "TEXT2D",
            OutputFormat::Lines => "LINES",
            OutputFormat::Words => "WORDS",
            OutputFormat::Paragraphs => "PARAGRAPHS",
            OutputFormat::Latex => "LATEX",
            OutputFormat::Boxes => "BOX",
        };
        f.write_str(name)
    }
}

/// Look up the instruction for a (task, format) pair.
///
/// Pairs the model wasn't trained on fall back to [`FALLBACK_PROMPT`] rather
/// than failing.
pub fn prompt_for(task: TaskType, format: OutputFormat) -> &'static str {
    use OutputFormat as F;
    use TaskType as T;
    match (task, format) {
        (T::Reading, F::Text) => {
            "Read all text in the image and return a single TEXT string, linearized left-to-right/top-to-bottom."
        }
        (T::Reading, F::Text2D) => {
            "Return a layout-sensitive TEXT2D representation of the image."
        }
        (T::Reading, F::Lines) => "Return line-by-line OCR as LINES with bounding boxes.",
        (T::Reading, F::Words) => "Return word-by-word OCR as WORDS with bounding boxes.",
        (T::Reading, F::Paragraphs) => {
            "Return paragraph-wise OCR as PARAGRAPHS with bounding boxes."
        }
        (T::Reading, F::Latex) => "Extract all LaTeX expressions with bounding boxes.",
        (T::Detection, F::Boxes) => {
            "Highlight all text regions in the image by returning their bounding boxes as a JSON array."
        }
        (T::LocalizedReading, F::Text) => {
            "What does it say in the specified region of the image?"
        }
        (T::ConditionalDetection, F::Boxes) => {
            "Find and return bounding boxes for the specified text query."
        }
        _ => {
            debug!(%task, %format, "No dedicated prompt, using fallback");
            FALLBACK_PROMPT
        }
    }
}
