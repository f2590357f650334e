use std::str::FromStr;

use clap::{Parser, Subcommand};
use tracing_subscriber::{
    EnvFilter, Layer as _, filter::Directive, fmt::format::FmtSpan, layer::SubscriberExt,
    util::SubscriberInitExt as _,
};

use self::{prelude::*, ui::Ui};

mod async_utils;
mod cmd;
mod combined;
mod data_url;
mod files;
mod llm_client;
mod model;
mod ocr;
mod pages;
mod prelude;
mod structure;
mod ui;

/// OCR images and documents with GutenOCR, optionally merged with document
/// structure from Docling.
#[derive(Debug, Parser)]
#[clap(
    version,
    author,
    after_help = r#"
Environment Variables:
  - OPENAI_API_BASE (optional): The URL of an OpenAI-compatible server
    hosting the GutenOCR model.
  - OPENAI_API_KEY: The API key for that server.
  - RUST_LOG (optional): Log filter, such as `debug` or `gutenocr=trace`.

  These variables may be set in a standard `.env` file.

External Tools:
  - pdftocairo (poppler-utils) is needed to OCR PDFs.
  - docling is used for document structure, if installed.
"#
)]
struct Opts {
    #[clap(subcommand)]
    subcmd: Cmd,
}

/// The subcommands we support.
#[derive(Debug, Subcommand)]
enum Cmd {
    /// OCR a single image or PDF, or a whole directory with `--batch`.
    Ocr(cmd::ocr::OcrOpts),
    /// Extract structure and OCR a document, or a whole directory with
    /// `--batch`.
    Process(cmd::process::ProcessOpts),
    /// Show which models, devices and formats are available.
    Capabilities(cmd::capabilities::CapabilitiesOpts),
    /// Print schemas for output formats.
    Schema(cmd::schema::SchemaOpts),
}

impl Cmd {
    /// Are we using stdout for output?
    fn using_stdout_for_output(&self) -> bool {
        match self {
            Cmd::Ocr(opts) => !opts.batch,
            Cmd::Process(opts) => !opts.batch,
            Cmd::Capabilities(_) => true,
            Cmd::Schema(opts) => opts.output_path.is_none(),
        }
    }
}

/// Our entry point, which can return an error. [`anyhow::Result`] will
/// automatically print a nice error message with optional backtrace.
#[tokio::main]
async fn main() -> Result<()> {
    let ui = Ui::init();

    // Initialize tracing.
    let directive =
        Directive::from_str("info").expect("built-in directive should be valid");
    let env_filter = EnvFilter::builder()
        .with_default_directive(directive)
        .from_env_lossy();

    let subscriber = tracing_subscriber::fmt::layer()
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .with_writer(ui.get_stderr_writer())
        .with_filter(env_filter);
    tracing_subscriber::registry().with(subscriber).init();

    real_main(ui).await
}

/// Our real entry point.
#[instrument(level = "debug", name = "main", skip_all)]
async fn real_main(ui: Ui) -> Result<()> {
    // Load environment variables from a `.env` file, if it exists.
    dotenvy::dotenv().ok();

    let opts = Opts::parse();
    debug!("Parsed options: {:?}", opts);

    if opts.subcmd.using_stdout_for_output() {
        ui.hide_progress_bars();
    }

    match &opts.subcmd {
        Cmd::Ocr(ocr_opts) => cmd::ocr::cmd_ocr(ui, ocr_opts).await?,
        Cmd::Process(process_opts) => cmd::process::cmd_process(ui, process_opts).await?,
        Cmd::Capabilities(capabilities_opts) => {
            cmd::capabilities::cmd_capabilities(capabilities_opts).await?
        }
        Cmd::Schema(schema_opts) => cmd::schema::cmd_schema(schema_opts).await?,
    }
    Ok(())
}
