//! The `capabilities` subcommand.

use clap::Args;

use super::StageOpts;
use crate::{
    combined::{Capabilities, CombinedProcessor},
    model::ModelOpts,
    pages::PageOpts,
    prelude::*,
};

/// Options for the `capabilities` subcommand.
#[derive(Args, Debug)]
pub struct CapabilitiesOpts {
    /// Print JSON instead of a human-readable summary.
    #[clap(long)]
    pub json: bool,

    #[clap(flatten)]
    pub stage_opts: StageOpts,

    #[clap(flatten)]
    pub model_opts: ModelOpts,
}

/// The `capabilities` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_capabilities(opts: &CapabilitiesOpts) -> Result<()> {
    let processor = CombinedProcessor::new(
        &opts.model_opts,
        &PageOpts::default(),
        opts.stage_opts.use_docling(),
    )
    .await?;
    let capabilities = processor.capabilities();
    if opts.json {
        let json = serde_json::to_string_pretty(&capabilities)
            .context("failed to serialize capabilities")?;
        println!("{json}");
    } else {
        print!("{}", format_capabilities(&capabilities));
    }
    Ok(())
}

fn format_capabilities(caps: &Capabilities) -> String {
    let docling = if caps.docling_available {
        "✅ Enabled"
    } else {
        "❌ Disabled"
    };
    let info = &caps.device_info;
    let mut out = format!(
        "Processor Capabilities:

Docling Status: {docling}
GutenOCR Model: {}

Device Information:
- Device: {}
- Using CPU: {}
- Driver: {}
",
        caps.gutenocr_model, info.device, info.use_cpu, info.driver,
    );
    if let Some(api_base) = &info.api_base {
        out.push_str(&format!("- API base: {api_base}\n"));
    }
    out.push_str(&format!(
        "\nSupported Formats:\n{}\n",
        caps.supported_formats.join(", ")
    ));
    out
}
