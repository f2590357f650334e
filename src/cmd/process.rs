//! The `process` subcommand: structure extraction plus OCR.

use clap::Args;

use super::{DirOpts, StageOpts, display_name};
use crate::{
    async_utils::io::write_json_pretty,
    combined::{CombinedProcessor, ProcessingResult},
    files::{file_timestamp, get_statistics},
    model::ModelOpts,
    pages::PageOpts,
    prelude::*,
    ui::Ui,
};

/// Options for the `process` subcommand.
#[derive(Args, Debug)]
pub struct ProcessOpts {
    /// The document to process. The merged text is written to stdout.
    #[clap(value_name = "FILE", required_unless_present = "batch")]
    pub file: Option<PathBuf>,

    /// Process every supported file under the input directory instead.
    #[clap(long, conflicts_with = "file")]
    pub batch: bool,

    #[clap(flatten)]
    pub stage_opts: StageOpts,

    #[clap(flatten)]
    pub model_opts: ModelOpts,

    #[clap(flatten)]
    pub page_opts: PageOpts,

    #[clap(flatten)]
    pub dir_opts: DirOpts,
}

/// The `process` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_process(ui: Ui, opts: &ProcessOpts) -> Result<()> {
    let processor = CombinedProcessor::new(
        &opts.model_opts,
        &opts.page_opts,
        opts.stage_opts.use_docling(),
    )
    .await?;
    match &opts.file {
        Some(file) if !opts.batch => process_one(&ui, &processor, opts, file).await,
        _ => process_batch(&ui, &processor, opts).await,
    }
}

async fn process_one(
    ui: &Ui,
    processor: &CombinedProcessor,
    opts: &ProcessOpts,
    file: &Path,
) -> Result<()> {
    let stages = &opts.stage_opts;
    let result = processor
        .process_document(
            file,
            stages.extract_structure(),
            stages.extract_tables(),
            stages.ocr_images(),
        )
        .await;

    // Failed records are saved too, the same as in a batch.
    let files = opts.dir_opts.file_processor()?;
    let output_path = files
        .output_dir()
        .join(format!("docling_result_{}.json", file_timestamp()));
    write_json_pretty(&output_path, &result).await?;

    let status = if result.success {
        "✅ Processing complete!".to_owned()
    } else {
        format!(
            "❌ Processing failed: {}",
            result.error.as_deref().unwrap_or("Unknown error")
        )
    };
    ui.display(&format!(
        "{status}\n\nFile: {}\nProcessing mode: {}\nOutput saved to: {}",
        display_name(file),
        mode_label(&result),
        output_path.display()
    ));
    if result.success {
        println!("{}", format_result(&result));
    }
    Ok(())
}

async fn process_batch(ui: &Ui, processor: &CombinedProcessor, opts: &ProcessOpts) -> Result<()> {
    let mut files = opts.dir_opts.file_processor()?;
    if processor.docling_available() {
        files = files.with_document_extensions();
    }
    let stages = &opts.stage_opts;
    let (results, output_path) = processor
        .batch_process(
            ui,
            &files,
            stages.extract_structure(),
            stages.extract_tables(),
            stages.ocr_images(),
        )
        .await?;

    let stats = get_statistics(&results);
    let mut summary = format!(
        "✅ Batch processing complete!

Statistics:
- Total files: {}
- Successful: {}
- Failed: {}

Results saved to: {}

Processed files:
",
        stats.total_files,
        stats.successful,
        stats.failed,
        output_path.display(),
    );
    for result in &results {
        let status = if result.success { "✅" } else { "❌" };
        summary.push_str(&format!(
            "\n{status} {} ({})",
            display_name(&result.file_path),
            mode_label(result)
        ));
    }
    ui.display(&summary);
    Ok(())
}

fn mode_label(result: &ProcessingResult) -> String {
    result
        .metadata
        .processing_mode
        .map(|m| m.to_string())
        .unwrap_or_else(|| "unknown".to_owned())
}

/// Render a result for the terminal.
fn format_result(result: &ProcessingResult) -> String {
    let mut lines = vec![
        "=== PROCESSING METADATA ===\n".to_owned(),
        format!("File: {}", display_name(&result.file_path)),
        format!("Timestamp: {}", result.timestamp),
        format!("Mode: {}", mode_label(result)),
        String::new(),
    ];
    if !result.combined_text.is_empty() {
        lines.push("=== EXTRACTED CONTENT ===\n".to_owned());
        lines.push(result.combined_text.clone());
    }
    lines.join("\n")
}
