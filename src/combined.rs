//! Combined processing: document structure from a structure extractor plus
//! GutenOCR text, merged into one record per file.

use std::{fmt, sync::Arc};

use schemars::JsonSchema;

use crate::{
    files::{FileProcessor, IMAGE_EXTENSIONS, ResultRecord, SaveFormat, iso_timestamp},
    model::{DeviceInfo, ModelOpts},
    ocr::{OcrEngine, OcrResult, OutputFormat, TaskType},
    pages::PageOpts,
    prelude::*,
    structure::{StructureExtractor, StructureResult, docling::DoclingCliExtractor},
    ui::{ProgressConfig, Ui},
};

/// Which stages contributed to the combined text.
#[derive(Clone, Copy, Debug, Deserialize, JsonSchema, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMode {
    /// Structure and OCR both succeeded.
    Combined,
    /// Only the structure extractor succeeded.
    DoclingOnly,
    /// Only OCR succeeded.
    GutenocrOnly,
}

impl fmt::Display for ProcessingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProcessingMode::Combined => "combined",
            ProcessingMode::DoclingOnly => "docling_only",
            ProcessingMode::GutenocrOnly => "gutenocr_only",
        };
        f.write_str(name)
    }
}

/// Bookkeeping about which stages ran.
#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize)]
pub struct ProcessingMetadata {
    /// Absent if no stage succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_mode: Option<ProcessingMode>,

    /// Did structure extraction succeed?
    pub docling_processed: bool,

    /// Did OCR succeed?
    pub gutenocr_processed: bool,
}

/// The result of processing one document.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
pub struct ProcessingResult {
    pub file_path: PathBuf,

    /// When processing finished, in local ISO-8601.
    pub timestamp: String,

    /// Structure extractor output, if that stage succeeded.
    pub docling_structure: Option<StructureResult>,

    /// The OCR record, if OCR was enabled. Failed records are kept.
    pub gutenocr_ocr: Option<OcrResult>,

    /// Merged text.
    pub combined_text: String,

    pub metadata: ProcessingMetadata,

    /// False if any enabled stage failed.
    pub success: bool,

    /// Stage errors, joined by `"; "`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResultRecord for ProcessingResult {
    fn source_path(&self) -> &Path {
        &self.file_path
    }

    fn is_success(&self) -> bool {
        self.success
    }

    fn text(&self) -> &str {
        &self.combined_text
    }

    fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn task_label(&self) -> Option<String> {
        Some("document".to_owned())
    }

    fn format_label(&self) -> Option<String> {
        self.metadata.processing_mode.map(|m| m.to_string())
    }
}

/// What this processor can do.
#[derive(Clone, Debug, JsonSchema, Serialize)]
pub struct Capabilities {
    pub docling_available: bool,
    pub gutenocr_model: String,
    pub device_info: DeviceInfo,
    pub supported_formats: Vec<String>,
}

/// Runs a structure extractor and GutenOCR over documents.
pub struct CombinedProcessor {
    ocr: OcrEngine,
    extractor: Option<Arc<dyn StructureExtractor>>,
}

impl CombinedProcessor {
    /// Create a processor. If `use_docling` is set, we look for Docling and
    /// quietly fall back to OCR only if it's missing.
    pub async fn new(
        model_opts: &ModelOpts,
        page_opts: &PageOpts,
        use_docling: bool,
    ) -> Result<Self> {
        let ocr = OcrEngine::new(model_opts, page_opts).await?;
        let extractor = if use_docling {
            DoclingCliExtractor::detect()
                .await
                .map(|e| Arc::new(e) as Arc<dyn StructureExtractor>)
        } else {
            None
        };
        Ok(Self::with_parts(ocr, extractor))
    }

    /// Build a processor from existing parts.
    pub fn with_parts(ocr: OcrEngine, extractor: Option<Arc<dyn StructureExtractor>>) -> Self {
        Self { ocr, extractor }
    }

    /// Do we have a structure extractor?
    pub fn docling_available(&self) -> bool {
        self.extractor.is_some()
    }

    /// Process a single document. Stage failures are recorded in the result,
    /// never returned.
    #[instrument(level = "debug", skip_all, fields(path = %path.display()))]
    pub async fn process_document(
        &self,
        path: &Path,
        extract_structure: bool,
        extract_tables: bool,
        ocr_images: bool,
    ) -> ProcessingResult {
        let mut errors = vec![];

        let mut structure = None;
        if let (true, Some(extractor)) = (extract_structure, &self.extractor) {
            info!("Processing with {}: {}", extractor.name(), path.display());
            match extractor.extract(path, extract_tables).await {
                Ok(result) => structure = Some(result),
                Err(err) => {
                    error!("{} failed on {}: {:#}", extractor.name(), path.display(), err);
                    errors.push(format!("{}: {err:#}", extractor.name()));
                }
            }
        }

        let ocr = if ocr_images {
            info!("Processing with GutenOCR: {}", path.display());
            let result = self
                .ocr
                .process_image(
                    path,
                    TaskType::Reading,
                    OutputFormat::Text2D,
                    self.ocr.max_new_tokens(),
                    None,
                )
                .await;
            if !result.success {
                let msg = result.error.as_deref().unwrap_or("unknown error");
                errors.push(format!("gutenocr: {msg}"));
            }
            Some(result)
        } else {
            None
        };

        let ocr_text = ocr
            .as_ref()
            .filter(|r| r.success)
            .map(|r| r.text.as_deref().unwrap_or_default());
        let (combined_text, processing_mode) = merge_results(structure.as_ref(), ocr_text);
        let metadata = ProcessingMetadata {
            processing_mode,
            docling_processed: structure.is_some(),
            gutenocr_processed: ocr_text.is_some(),
        };

        ProcessingResult {
            file_path: path.to_owned(),
            timestamp: iso_timestamp(),
            docling_structure: structure,
            gutenocr_ocr: ocr,
            combined_text,
            metadata,
            success: errors.is_empty(),
            error: if errors.is_empty() {
                None
            } else {
                Some(errors.join("; "))
            },
        }
    }

    /// Process every supported file under the input directory, and write
    /// `combined_results_<timestamp>.json` to the output directory.
    pub async fn batch_process(
        &self,
        ui: &Ui,
        files: &FileProcessor,
        extract_structure: bool,
        extract_tables: bool,
        ocr_images: bool,
    ) -> Result<(Vec<ProcessingResult>, PathBuf)> {
        let paths = files.discover(true)?;
        let pb = ui.new_progress_bar(
            &ProgressConfig {
                emoji: "📄",
                msg: "Processing documents",
                done_msg: "Processed documents",
            },
            paths.len() as u64,
        );
        let mut results = Vec::with_capacity(paths.len());
        for path in &paths {
            results.push(
                self.process_document(path, extract_structure, extract_tables, ocr_images)
                    .await,
            );
            pb.inc(1);
        }
        pb.finish();

        let output = files
            .save_results_as("combined_results", &results, SaveFormat::Json, true)
            .await?;
        Ok((results, output))
    }

    /// Describe what this processor can do.
    pub fn capabilities(&self) -> Capabilities {
        let supported_formats = if self.docling_available() {
            [
                "PDF", "DOCX", "PPTX", "PNG", "JPG", "JPEG", "TIFF", "BMP", "GIF", "WEBP",
                "HTML", "MD",
            ]
            .iter()
            .map(|s| (*s).to_owned())
            .collect()
        } else {
            IMAGE_EXTENSIONS
                .iter()
                .filter(|ext| **ext != "tif")
                .map(|ext| ext.to_uppercase())
                .collect()
        };
        Capabilities {
            docling_available: self.docling_available(),
            gutenocr_model: self.ocr.model_id(),
            device_info: self.ocr.device_info(),
            supported_formats,
        }
    }
}

/// Merge structure and OCR output. Returns the text and the mode.
pub fn merge_results(
    structure: Option<&StructureResult>,
    ocr_text: Option<&str>,
) -> (String, Option<ProcessingMode>) {
    match (structure, ocr_text) {
        (Some(structure), Some(ocr_text)) => {
            let mut parts = vec![];
            if !structure.text.is_empty() {
                parts.push("=== DOCUMENT STRUCTURE (Docling) ===\n".to_owned());
                parts.push(structure.text.clone());
                parts.push("\n".to_owned());
            }
            if !structure.tables.is_empty() {
                parts.push("\n=== EXTRACTED TABLES ===\n".to_owned());
                for (idx, table) in structure.tables.iter().enumerate() {
                    parts.push(format!("\nTable {}:", idx + 1));
                    if !table.caption.is_empty() {
                        parts.push(format!("Caption: {}", table.caption));
                    }
                    parts.push(table.to_text());
                    parts.push("\n".to_owned());
                }
            }
            parts.push("\n=== OCR CONTENT (GutenOCR) ===\n".to_owned());
            parts.push(ocr_text.to_owned());
            (parts.join("\n"), Some(ProcessingMode::Combined))
        }
        (Some(structure), None) => (structure.text.clone(), Some(ProcessingMode::DoclingOnly)),
        (None, Some(ocr_text)) => (ocr_text.to_owned(), Some(ProcessingMode::GutenocrOnly)),
        (None, None) => (String::new(), None),
    }
}
