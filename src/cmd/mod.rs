//! Command-line entry points.

use clap::Args;

use crate::{files::FileProcessor, prelude::*};

pub mod capabilities;
pub mod ocr;
pub mod process;
pub mod schema;

/// Where batch inputs come from and results go.
#[derive(Args, Clone, Debug)]
pub struct DirOpts {
    /// Directory to read batch inputs from.
    #[clap(long = "input", default_value = "input")]
    pub input_dir: PathBuf,

    /// Directory to write result files to.
    #[clap(long = "output", default_value = "output")]
    pub output_dir: PathBuf,
}

impl DirOpts {
    /// Create both directories and return a [`FileProcessor`] for them.
    pub fn file_processor(&self) -> Result<FileProcessor> {
        FileProcessor::new(&self.input_dir, &self.output_dir)
    }
}

/// Which processing stages to run.
#[derive(Args, Clone, Debug)]
pub struct StageOpts {
    /// Don't look for Docling. Documents are OCRed only.
    #[clap(long)]
    pub no_docling: bool,

    /// Skip structure extraction.
    #[clap(long)]
    pub no_structure: bool,

    /// Skip table extraction.
    #[clap(long)]
    pub no_tables: bool,

    /// Skip GutenOCR.
    #[clap(long)]
    pub no_ocr: bool,
}

impl StageOpts {
    pub fn use_docling(&self) -> bool {
        !self.no_docling
    }

    pub fn extract_structure(&self) -> bool {
        !self.no_structure
    }

    pub fn extract_tables(&self) -> bool {
        !self.no_tables
    }

    pub fn ocr_images(&self) -> bool {
        !self.no_ocr
    }
}

/// The last path component, for status lines.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
