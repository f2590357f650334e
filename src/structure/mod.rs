//! Document-structure extraction (headings, tables, pages), independent of
//! OCR.

use schemars::JsonSchema;

use crate::prelude::*;

pub mod docling;

/// A table pulled out of a document.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
pub struct ExtractedTable {
    /// Cell text, row by row.
    pub data: Vec<Vec<String>>,

    /// The table caption, or an empty string.
    #[serde(default)]
    pub caption: String,
}

impl ExtractedTable {
    /// Render the table as pipe-separated rows.
    pub fn to_text(&self) -> String {
        self.data
            .iter()
            .map(|row| row.join(" | "))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// One top-level element of the document body.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
pub struct StructureElement {
    /// Element kind, such as `section_header`, `text` or `table`.
    pub label: String,

    /// The page the element starts on, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u64>,
}

/// Layout summary.
#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize)]
pub struct DocumentStructure {
    /// Number of pages.
    pub pages: usize,

    /// Top-level body elements, in reading order.
    pub elements: Vec<StructureElement>,
}

/// The output of a structure extractor.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
pub struct StructureResult {
    /// The document as Markdown.
    pub text: String,

    /// Layout summary.
    pub structure: DocumentStructure,

    /// Tables, if table extraction was requested.
    pub tables: Vec<ExtractedTable>,

    /// Whatever document metadata the extractor reported.
    pub metadata: Value,
}

/// Interface to a structure extractor.
#[async_trait]
pub trait StructureExtractor: Send + Sync + 'static {
    /// A short name for logs and capability reports.
    fn name(&self) -> &str;

    /// Extract structure (and optionally tables) from a file.
    async fn extract(&self, path: &Path, extract_tables: bool) -> Result<StructureResult>;
}
