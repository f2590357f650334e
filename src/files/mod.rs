//! Finding input files and writing result files.

use std::{collections::HashSet, fs};

use clap::ValueEnum;

use crate::{
    async_utils::io::{write_json_pretty, write_text},
    ocr::OcrResult,
    prelude::*,
};

pub mod stats;

pub use self::stats::{Statistics, get_statistics};

/// Extensions we can OCR directly.
pub const IMAGE_EXTENSIONS: &[&str] =
    &["png", "jpg", "jpeg", "tiff", "tif", "bmp", "gif", "webp", "pdf"];

/// Extensions we can only handle with a structure extractor.
pub const DOCUMENT_EXTENSIONS: &[&str] = &["docx", "pptx", "html", "htm", "md"];

/// The horizontal rule between records in text reports.
const RULE_WIDTH: usize = 80;

/// File format for combined result files.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum SaveFormat {
    /// A pretty-printed JSON array.
    #[default]
    Json,
    /// One human-readable block per result.
    Txt,
    /// One CSV row per result.
    Csv,
}

impl SaveFormat {
    fn extension(self) -> &'static str {
        match self {
            SaveFormat::Json => "json",
            SaveFormat::Txt => "txt",
            SaveFormat::Csv => "csv",
        }
    }
}

/// File format for per-input result files.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum IndividualFormat {
    /// A text file with a short header.
    #[default]
    Txt,
    /// The full result record.
    Json,
}

/// Something we can write into our result files.
pub trait ResultRecord: Serialize {
    /// The input file this record describes.
    fn source_path(&self) -> &Path;

    /// Did processing succeed?
    fn is_success(&self) -> bool;

    /// The extracted text, or `""`.
    fn text(&self) -> &str;

    /// The error message, if any.
    fn error(&self) -> Option<&str>;

    /// What we were asked to do, for report headers.
    fn task_label(&self) -> Option<String>;

    /// The output format, for report headers.
    fn format_label(&self) -> Option<String>;
}

impl ResultRecord for OcrResult {
    fn source_path(&self) -> &Path {
        &self.image_path
    }

    fn is_success(&self) -> bool {
        self.success
    }

    fn text(&self) -> &str {
        self.text.as_deref().unwrap_or_default()
    }

    fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn task_label(&self) -> Option<String> {
        self.task_type.map(|t| t.to_string())
    }

    fn format_label(&self) -> Option<String> {
        self.output_format.map(|f| f.to_string())
    }
}

/// Knows where our input and output directories are.
#[derive(Clone, Debug)]
pub struct FileProcessor {
    input_dir: PathBuf,
    output_dir: PathBuf,
    extensions: Vec<&'static str>,
}

impl FileProcessor {
    /// Create a new processor, creating both directories if needed.
    pub fn new(input_dir: &Path, output_dir: &Path) -> Result<Self> {
        for dir in [input_dir, output_dir] {
            fs::create_dir_all(dir)
                .with_context(|| format!("cannot create directory {:?}", dir.display()))?;
        }
        Ok(Self {
            input_dir: input_dir.to_owned(),
            output_dir: output_dir.to_owned(),
            extensions: IMAGE_EXTENSIONS.to_vec(),
        })
    }

    /// Also accept office and markup documents.
    pub fn with_document_extensions(mut self) -> Self {
        self.extensions.extend_from_slice(DOCUMENT_EXTENSIONS);
        self
    }

    /// Our input directory.
    pub fn input_dir(&self) -> &Path {
        &self.input_dir
    }

    /// Our output directory.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Is this a file we know how to handle?
    pub fn is_supported(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                self.extensions
                    .iter()
                    .any(|known| known.eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false)
    }

    /// Find all supported files in the input directory, sorted by path.
    pub fn discover(&self, recursive: bool) -> Result<Vec<PathBuf>> {
        let mut found = vec![];
        self.walk(&self.input_dir, recursive, &mut found)?;
        found.sort_by(|a, b| a.as_os_str().cmp(b.as_os_str()));
        found.dedup();
        info!(
            "Found {} supported files in {}",
            found.len(),
            self.input_dir.display()
        );
        Ok(found)
    }

    fn walk(&self, dir: &Path, recursive: bool, found: &mut Vec<PathBuf>) -> Result<()> {
        let entries = fs::read_dir(dir)
            .with_context(|| format!("cannot read directory {:?}", dir.display()))?;
        for entry in entries {
            let entry = entry
                .with_context(|| format!("cannot read directory {:?}", dir.display()))?;
            let path = entry.path();
            // Symlinked directories are not followed.
            if entry.file_type()?.is_dir() {
                if recursive {
                    self.walk(&path, recursive, found)?;
                }
            } else if path.is_file() && self.is_supported(&path) {
                found.push(path);
            }
        }
        Ok(())
    }

    /// Write all results into a single `ocr_results` file.
    pub async fn save_results<R: ResultRecord>(
        &self,
        results: &[R],
        format: SaveFormat,
        timestamped: bool,
    ) -> Result<PathBuf> {
        self.save_results_as("ocr_results", results, format, timestamped)
            .await
    }

    /// Write all results into a single file named after `prefix`.
    pub async fn save_results_as<R: ResultRecord>(
        &self,
        prefix: &str,
        results: &[R],
        format: SaveFormat,
        timestamped: bool,
    ) -> Result<PathBuf> {
        let name = if timestamped {
            format!("{prefix}_{}.{}", file_timestamp(), format.extension())
        } else {
            format!("{prefix}.{}", format.extension())
        };
        let path = self.output_dir.join(name);
        match format {
            SaveFormat::Json => write_json_pretty(&path, results).await?,
            SaveFormat::Txt => write_text(&path, &results_to_txt(results)).await?,
            SaveFormat::Csv => write_text(&path, &results_to_csv(results)?).await?,
        }
        info!("Results saved to {}", path.display());
        Ok(path)
    }

    /// Write one file per result, named after its input file.
    pub async fn save_individual_results<R: ResultRecord>(
        &self,
        results: &[R],
        format: IndividualFormat,
    ) -> Result<Vec<PathBuf>> {
        let timestamp = file_timestamp();
        let mut used = HashSet::new();
        let mut saved = Vec::with_capacity(results.len());
        for result in results {
            let stem = result
                .source_path()
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "result".to_owned());
            let ext = match format {
                IndividualFormat::Txt => "txt",
                IndividualFormat::Json => "json",
            };
            // Two inputs in different directories can share a stem.
            let mut name = format!("{stem}_{timestamp}.{ext}");
            let mut n = 2;
            while !used.insert(name.clone()) {
                name = format!("{stem}_{timestamp}_{n}.{ext}");
                n += 1;
            }
            let path = self.output_dir.join(name);
            match format {
                IndividualFormat::Txt => {
                    write_text(&path, &individual_txt(result)).await?
                }
                IndividualFormat::Json => write_json_pretty(&path, result).await?,
            }
            saved.push(path);
        }
        info!("Saved {} individual result files", saved.len());
        Ok(saved)
    }

    /// Write a human-readable summary of a run.
    pub async fn create_summary_report<R: ResultRecord>(
        &self,
        results: &[R],
        stats: &Statistics,
    ) -> Result<PathBuf> {
        let path = self
            .output_dir
            .join(format!("summary_report_{}.txt", file_timestamp()));
        write_text(&path, &summary_report(results, stats)?).await?;
        info!("Summary report saved to {}", path.display());
        Ok(path)
    }
}

/// A timestamp suitable for file names.
pub fn file_timestamp() -> String {
    chrono::Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// The current local time in ISO-8601.
pub fn iso_timestamp() -> String {
    chrono::Local::now().to_rfc3339()
}

fn rule() -> String {
    "=".repeat(RULE_WIDTH)
}

fn results_to_txt<R: ResultRecord>(results: &[R]) -> String {
    let mut out = String::new();
    for result in results {
        out.push_str(&rule());
        out.push('\n');
        out.push_str(&format!("File: {}\n", result.source_path().display()));
        if result.is_success() {
            out.push_str("Status: Success\n");
            out.push_str(&format!("Text:\n{}\n", result.text()));
        } else {
            out.push_str("Status: Failed\n");
            out.push_str(&format!(
                "Error: {}\n",
                result.error().unwrap_or("Unknown error")
            ));
        }
        out.push_str(&rule());
        out.push_str("\n\n");
    }
    out
}

/// Render results as CSV. The header comes from the first record, so records
/// with extra fields are rejected.
fn results_to_csv<R: ResultRecord>(results: &[R]) -> Result<String> {
    let rows = results
        .iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<_>, _>>()
        .context("cannot serialize results for CSV")?;
    let Some(first) = rows.first() else {
        return Ok(String::new());
    };
    let header = first
        .as_object()
        .ok_or_else(|| anyhow!("result records must serialize as JSON objects"))?
        .keys()
        .cloned()
        .collect::<Vec<_>>();

    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(&header)?;
    for (idx, row) in rows.iter().enumerate() {
        let obj = row
            .as_object()
            .ok_or_else(|| anyhow!("result records must serialize as JSON objects"))?;
        if let Some(extra) = obj.keys().find(|k| !header.contains(k)) {
            return Err(anyhow!(
                "CSV record {} has field {:?}, which is not in the header",
                idx + 1,
                extra
            ));
        }
        let cells = header
            .iter()
            .map(|key| csv_cell(obj.get(key)))
            .collect::<Vec<_>>();
        wtr.write_record(&cells)?;
    }
    let bytes = wtr
        .into_inner()
        .map_err(|err| anyhow!("cannot finish CSV output: {err}"))?;
    String::from_utf8(bytes).context("CSV output is not UTF-8")
}

fn csv_cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn individual_txt<R: ResultRecord>(result: &R) -> String {
    let mut out = String::new();
    out.push_str(&format!("Source: {}\n", result.source_path().display()));
    out.push_str(&format!("Processed: {}\n", iso_timestamp()));
    out.push_str(&format!(
        "Task: {}\n",
        result.task_label().as_deref().unwrap_or("Unknown")
    ));
    out.push_str(&format!(
        "Format: {}\n",
        result.format_label().as_deref().unwrap_or("Unknown")
    ));
    out.push_str(&"-".repeat(50));
    out.push_str("\n\n");
    if result.is_success() {
        out.push_str(result.text());
    } else {
        out.push_str(&format!(
            "Error: {}",
            result.error().unwrap_or("Unknown error")
        ));
    }
    out.push('\n');
    out
}

fn summary_report<R: ResultRecord>(results: &[R], stats: &Statistics) -> Result<String> {
    let mut out = String::new();
    out.push_str("GutenOCR Processing Summary Report\n");
    out.push_str(&rule());
    out.push_str("\n\n");

    let stats = serde_json::to_value(stats).context("cannot serialize statistics")?;
    if let Some(fields) = stats.as_object() {
        for (key, value) in fields {
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            out.push_str(&format!("{}: {}\n", title_case(key), value));
        }
    }

    out.push('\n');
    out.push_str("Detailed Results:\n");
    out.push_str(&"-".repeat(40));
    out.push('\n');
    for (idx, result) in results.iter().enumerate() {
        let name = result
            .source_path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| result.source_path().display().to_string());
        out.push_str(&format!("{}. {}\n", idx + 1, name));
        if result.is_success() {
            out.push_str("   Status: ✓ Success\n");
        } else {
            out.push_str("   Status: ✗ Failed\n");
            out.push_str(&format!(
                "   Error: {}\n",
                result.error().unwrap_or("Unknown error")
            ));
        }
        out.push('\n');
    }
    Ok(out)
}

/// `total_characters` → `Total Characters`.
fn title_case(key: &str) -> String {
    key.split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
