//! A structure extractor that calls the `docling` CLI.
//!
//! We ask Docling for Markdown (our text) and for its JSON document model,
//! which we mine for page counts, body elements and tables. Docling's own OCR
//! is switched off, because GutenOCR handles that.

use tokio::process::Command;

use crate::{async_utils::check_for_command_failure, prelude::*};

use super::{
    DocumentStructure, ExtractedTable, StructureElement, StructureExtractor,
    StructureResult,
};

/// Structure extractor wrapping the `docling` CLI tool.
#[derive(Debug)]
pub struct DoclingCliExtractor {
    /// The command to run. Normally just `docling`.
    program: String,
}

impl DoclingCliExtractor {
    /// Look for a working `docling` on the `PATH`. Returns `None` (and logs a
    /// warning) if it isn't installed.
    pub async fn detect() -> Option<Self> {
        Self::detect_program("docling").await
    }

    /// Like [`Self::detect`], but with an explicit program name.
    pub async fn detect_program(program: &str) -> Option<Self> {
        match Command::new(program).arg("--version").output().await {
            Ok(output) if output.status.success() => {
                let version = String::from_utf8_lossy(&output.stdout);
                info!(version = %version.trim(), "Docling initialized successfully");
                Some(Self {
                    program: program.to_owned(),
                })
            }
            Ok(output) => {
                warn!(
                    status = %output.status,
                    "Could not initialize Docling; using GutenOCR only"
                );
                None
            }
            Err(err) => {
                warn!("Docling not available ({err}); using GutenOCR only");
                None
            }
        }
    }
}

#[async_trait]
impl StructureExtractor for DoclingCliExtractor {
    fn name(&self) -> &str {
        "docling"
    }

    #[instrument(level = "debug", skip_all, fields(path = %path.display()))]
    async fn extract(&self, path: &Path, extract_tables: bool) -> Result<StructureResult> {
        let tmpdir = tempfile::TempDir::with_prefix("docling")?;
        let output = Command::new(&self.program)
            .arg(path)
            .args(["--to", "md", "--to", "json", "--no-ocr"])
            .arg("--output")
            .arg(tmpdir.path())
            .output()
            .await
            .with_context(|| format!("cannot run docling on {:?}", path.display()))?;
        check_for_command_failure("docling", &output, None)?;

        let stem = path
            .file_stem()
            .ok_or_else(|| anyhow!("no file name in {:?}", path.display()))?
            .to_string_lossy()
            .into_owned();
        let md_path = tmpdir.path().join(format!("{stem}.md"));
        let json_path = tmpdir.path().join(format!("{stem}.json"));
        let text = tokio::fs::read_to_string(&md_path)
            .await
            .context("cannot read docling Markdown output")?;
        let json = tokio::fs::read_to_string(&json_path)
            .await
            .context("cannot read docling JSON output")?;
        let doc = serde_json::from_str::<Value>(&json)
            .context("cannot parse docling JSON output")?;
        Ok(structure_from_docling_json(text, &doc, extract_tables))
    }
}

/// Build a [`StructureResult`] from Docling's Markdown and its JSON document
/// model.
///
/// The document model is read leniently. Anything we don't recognize is
/// skipped rather than treated as an error.
pub fn structure_from_docling_json(
    text: String,
    doc: &Value,
    extract_tables: bool,
) -> StructureResult {
    let pages = doc
        .get("pages")
        .and_then(Value::as_object)
        .map(|pages| pages.len())
        .unwrap_or(0);

    let elements: Vec<StructureElement> = doc
        .pointer("/body/children")
        .and_then(Value::as_array)
        .map(|children| {
            children
                .iter()
                .filter_map(|child| resolve_ref(doc, child))
                .map(|item| StructureElement {
                    label: item
                        .get("label")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown")
                        .to_owned(),
                    page: item.pointer("/prov/0/page_no").and_then(Value::as_u64),
                })
                .collect()
        })
        .unwrap_or_default();

    let tables: Vec<ExtractedTable> = if extract_tables {
        doc.get("tables")
            .and_then(Value::as_array)
            .map(|tables| tables.iter().map(|t| table_from_docling(doc, t)).collect())
            .unwrap_or_default()
    } else {
        vec![]
    };

    let metadata = doc
        .get("origin")
        .filter(|origin| origin.is_object())
        .cloned()
        .unwrap_or_else(|| json!({}));

    StructureResult {
        text,
        structure: DocumentStructure { pages, elements },
        tables,
        metadata,
    }
}

/// Follow a `{"$ref": "#/texts/3"}` pointer within a Docling document.
fn resolve_ref<'doc>(doc: &'doc Value, reference: &Value) -> Option<&'doc Value> {
    let pointer = reference.get("$ref")?.as_str()?.strip_prefix('#')?;
    doc.pointer(pointer)
}

/// Convert one Docling table item into an [`ExtractedTable`].
fn table_from_docling(doc: &Value, table: &Value) -> ExtractedTable {
    let data: Vec<Vec<String>> = table
        .pointer("/data/grid")
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .map(|row| {
                    row.as_array()
                        .map(|cells| {
                            cells
                                .iter()
                                .map(|cell| {
                                    cell.get("text")
                                        .and_then(Value::as_str)
                                        .unwrap_or_default()
                                        .to_owned()
                                })
                                .collect::<Vec<String>>()
                        })
                        .unwrap_or_default()
                })
                .collect()
        })
        .unwrap_or_default();

    let caption = table
        .get("captions")
        .and_then(Value::as_array)
        .map(|captions| {
            captions
                .iter()
                .filter_map(|c| resolve_ref(doc, c))
                .filter_map(|c| c.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default();

    ExtractedTable { data, caption }
}
