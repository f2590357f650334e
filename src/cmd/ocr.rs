//! The `ocr` subcommand.

use clap::Args;

use super::{DirOpts, display_name};
use crate::{
    files::{IndividualFormat, ResultRecord as _, SaveFormat, get_statistics},
    model::ModelOpts,
    ocr::{OcrEngine, OutputFormat, TaskType},
    pages::PageOpts,
    prelude::*,
    ui::Ui,
};

/// Options for the `ocr` subcommand.
#[derive(Args, Debug)]
pub struct OcrOpts {
    /// The image or PDF to OCR. The text is written to stdout.
    #[clap(value_name = "IMAGE", required_unless_present = "batch")]
    pub image: Option<PathBuf>,

    /// OCR every supported file in the input directory instead.
    #[clap(long, conflicts_with = "image")]
    pub batch: bool,

    /// What to ask the model to do.
    #[clap(long, value_enum, default_value_t = TaskType::default())]
    pub task: TaskType,

    /// How the model should format its output.
    #[clap(long, value_enum, default_value_t = OutputFormat::default())]
    pub format: OutputFormat,

    /// Use this instruction instead of the built-in one.
    #[clap(long)]
    pub prompt: Option<String>,

    /// Format for the combined batch results file.
    #[clap(long, value_enum, default_value_t = SaveFormat::default())]
    pub save_format: SaveFormat,

    /// Format for the per-file batch results.
    #[clap(long, value_enum, default_value_t = IndividualFormat::default())]
    pub individual_format: IndividualFormat,

    #[clap(flatten)]
    pub model_opts: ModelOpts,

    #[clap(flatten)]
    pub page_opts: PageOpts,

    #[clap(flatten)]
    pub dir_opts: DirOpts,
}

/// The `ocr` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_ocr(ui: Ui, opts: &OcrOpts) -> Result<()> {
    let engine = OcrEngine::new(&opts.model_opts, &opts.page_opts).await?;
    match &opts.image {
        Some(image) if !opts.batch => ocr_one(&ui, &engine, opts, image).await,
        _ => ocr_batch(&ui, &engine, opts).await,
    }
}

/// OCR a single file, printing the text to stdout.
async fn ocr_one(ui: &Ui, engine: &OcrEngine, opts: &OcrOpts, image: &Path) -> Result<()> {
    let result = engine
        .process_image(
            image,
            opts.task,
            opts.format,
            engine.max_new_tokens(),
            opts.prompt.as_deref(),
        )
        .await;
    if result.success {
        let text = result.text();
        println!("{text}");
        ui.display(&format!(
            "✓ Processing successful\n\nTask: {}\nFormat: {}\n\nCharacters: {}",
            opts.task,
            opts.format,
            text.chars().count()
        ));
    } else {
        ui.display(&format!(
            "Error: {}\n✗ Processing failed",
            result.error().unwrap_or("Unknown error")
        ));
    }
    Ok(())
}

/// OCR every file in the input directory and write result files.
async fn ocr_batch(ui: &Ui, engine: &OcrEngine, opts: &OcrOpts) -> Result<()> {
    let files = opts.dir_opts.file_processor()?;
    let images = files.discover(true)?;
    if images.is_empty() {
        ui.display(&format!(
            "No images found in {} directory",
            files.input_dir().display()
        ));
        return Ok(());
    }

    let results = engine
        .batch_process(
            ui,
            &images,
            opts.task,
            opts.format,
            engine.max_new_tokens(),
            opts.prompt.as_deref(),
        )
        .await;

    // A failed combined file shouldn't cost us the per-file results.
    let combined_line = match files.save_results(&results, opts.save_format, true).await {
        Ok(path) => format!("- Combined results: {}", path.display()),
        Err(err) => {
            error!("Could not save combined results: {err:#}");
            format!("- Combined results: ✗ Error: {err:#}")
        }
    };
    let stats = get_statistics(&results);
    let summary_path = files.create_summary_report(&results, &stats).await?;
    let individual = files
        .save_individual_results(&results, opts.individual_format)
        .await?;

    for result in results.iter().filter(|r| !r.success) {
        warn!(
            "{} failed: {}",
            display_name(&result.image_path),
            result.error().unwrap_or("Unknown error")
        );
    }

    ui.display(&format!(
        "✓ Batch processing complete!

Processed: {} images
Success: {} ({})
Failed: {}

Output files:
{}
- Summary report: {}
- Individual files: {} files saved

Total characters extracted: {}
Average per image: {}",
        stats.total_files,
        stats.successful,
        stats.success_rate,
        stats.failed,
        combined_line,
        summary_path.display(),
        individual.len(),
        stats.total_characters,
        stats.average_characters,
    ));
    Ok(())
}
