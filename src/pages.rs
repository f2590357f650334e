//! Load the "pages" of an input file as images the model can read.

use std::io::Cursor;

use clap::Args;
use image::{ImageFormat, ImageReader};
use tokio::process::Command;

use crate::{
    async_utils::{
        DEFAULT_ERROR_REGEX, check_for_command_failure, spawn_blocking_propagating_panics,
    },
    data_url::data_url,
    prelude::*,
};

/// Image types the model server accepts as-is.
const PASSTHROUGH_IMAGE_TYPES: &[&str] =
    &["image/png", "image/jpeg", "image/webp", "image/gif"];

/// Image types we decode and re-encode as PNG first.
const CONVERTED_IMAGE_TYPES: &[&str] = &["image/tiff", "image/bmp"];

/// PDF MIME type. PDFs are rasterized one PNG per page.
const PDF_MIME_TYPE: &str = "application/pdf";

/// A single page image.
#[derive(Debug)]
pub struct PageImage {
    /// The MIME type of our data. Always one of [`PASSTHROUGH_IMAGE_TYPES`].
    pub mime_type: String,
    /// The encoded image.
    pub data: Vec<u8>,
}

impl PageImage {
    /// Convert to a data URL.
    pub fn to_data_url(&self) -> String {
        data_url(&self.mime_type, &self.data)
    }

    /// Read the image dimensions from the encoded header.
    pub fn dimensions(&self) -> Result<(u32, u32)> {
        ImageReader::new(Cursor::new(&self.data))
            .with_guessed_format()
            .context("failed to guess image format")?
            .into_dimensions()
            .context("failed to read image dimensions")
    }
}

/// Options for loading pages.
#[derive(Args, Clone, Debug)]
pub struct PageOpts {
    /// The DPI to use when rasterizing PDFs.
    #[clap(long, default_value = "300")]
    pub rasterize_dpi: u32,

    /// The maximum number of PDF pages to OCR. Later pages are skipped.
    #[clap(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_pages: Option<u32>,
}

impl Default for PageOpts {
    fn default() -> Self {
        Self {
            rasterize_dpi: 300,
            max_pages: None,
        }
    }
}

/// Get the MIME type of a file by sniffing its contents.
pub fn get_mime_type(path: &Path) -> Result<String> {
    Ok(infer::get_from_path(path)
        .with_context(|| format!("failed to get MIME type for {:?}", path.display()))?
        .ok_or_else(|| anyhow!("unknown MIME type for {:?}", path.display()))?
        .mime_type()
        .to_string())
}

/// Load all the pages of `path`, in order.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub async fn load_pages(path: &Path, opts: &PageOpts) -> Result<Vec<PageImage>> {
    let mime_type = get_mime_type(path)?;
    if PASSTHROUGH_IMAGE_TYPES.contains(&mime_type.as_str()) {
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {:?}", path.display()))?;
        Ok(vec![PageImage { mime_type, data }])
    } else if CONVERTED_IMAGE_TYPES.contains(&mime_type.as_str()) {
        let path = path.to_owned();
        let page = spawn_blocking_propagating_panics(move || convert_to_png(&path)).await?;
        Ok(vec![page])
    } else if mime_type == PDF_MIME_TYPE {
        rasterize_pdf(path, opts).await
    } else {
        Err(anyhow!(
            "unsupported MIME type {} for {:?} (supported: PNG, JPEG, WebP, GIF, TIFF, BMP, PDF)",
            mime_type,
            path.display()
        ))
    }
}

/// Decode an image and re-encode it as PNG. For multi-frame TIFFs, this
/// keeps the first frame.
fn convert_to_png(path: &Path) -> Result<PageImage> {
    let img = ImageReader::open(path)
        .with_context(|| format!("failed to open {:?}", path.display()))?
        .with_guessed_format()
        .with_context(|| format!("failed to guess format of {:?}", path.display()))?
        .decode()
        .with_context(|| format!("failed to decode {:?}", path.display()))?;
    let mut data = Vec::new();
    img.to_rgb8()
        .write_to(&mut Cursor::new(&mut data), ImageFormat::Png)
        .context("failed to encode PNG")?;
    Ok(PageImage {
        mime_type: "image/png".to_owned(),
        data,
    })
}

/// Rasterize a PDF with Poppler's `pdftocairo`, one PNG per page.
#[instrument(level = "debug", skip_all, fields(path = %path.display(), dpi = opts.rasterize_dpi))]
async fn rasterize_pdf(path: &Path, opts: &PageOpts) -> Result<Vec<PageImage>> {
    let tmpdir = tempfile::TempDir::with_prefix("pages")?;

    // pdftocairo appends zero-padded page numbers to this prefix, so the
    // output files sort in page order.
    let out_prefix = tmpdir.path().join("page");
    let mut cmd = Command::new("pdftocairo");
    cmd.arg("-png")
        .arg("-r")
        .arg(opts.rasterize_dpi.to_string());
    if let Some(max_pages) = opts.max_pages {
        cmd.arg("-l").arg(max_pages.to_string());
    }
    let output = cmd
        .arg(path)
        .arg(&out_prefix)
        .output()
        .await
        .with_context(|| format!("failed to run pdftocairo on {:?}", path.display()))?;
    check_for_command_failure("pdftocairo", &output, Some(&DEFAULT_ERROR_REGEX))?;

    let mut page_paths = std::fs::read_dir(tmpdir.path())
        .and_then(|entries| {
            entries
                .map(|entry| entry.map(|e| e.path()))
                .collect::<std::io::Result<Vec<_>>>()
        })
        .with_context(|| {
            format!("failed to read temporary directory {:?}", tmpdir.path())
        })?;
    page_paths.sort();
    if page_paths.is_empty() {
        return Err(anyhow!("pdftocairo produced no pages for {:?}", path.display()));
    }

    let mut pages = Vec::with_capacity(page_paths.len());
    for page_path in page_paths {
        let data = tokio::fs::read(&page_path)
            .await
            .with_context(|| format!("failed to read {:?}", page_path.display()))?;
        pages.push(PageImage {
            mime_type: "image/png".to_owned(),
            data,
        });
    }
    debug!(page_count = pages.len(), "Rasterized PDF");
    Ok(pages)
}

#[cfg(test)]
mod tests {
    use image::{Rgb, RgbImage};

    use super::*;

    fn write_image(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        RgbImage::from_pixel(7, 5, Rgb([255, 255, 255]))
            .save(&path)
            .unwrap();
        path
    }

    #[tokio::test]
    async fn test_png_passes_through() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_image(dir.path(), "page.png");
        let pages = load_pages(&path, &PageOpts::default()).await.unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].mime_type, "image/png");
        assert_eq!(pages[0].data, std::fs::read(&path).unwrap());
        assert_eq!(pages[0].dimensions().unwrap(), (7, 5));
    }

    #[tokio::test]
    async fn test_bmp_becomes_png() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_image(dir.path(), "page.bmp");
        let pages = load_pages(&path, &PageOpts::default()).await.unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].mime_type, "image/png");
        assert_eq!(pages[0].dimensions().unwrap(), (7, 5));
    }

    #[test]
    fn test_max_pages_must_be_positive() {
        use clap::Parser;

        #[derive(Debug, Parser)]
        struct Cli {
            #[clap(flatten)]
            page_opts: PageOpts,
        }

        assert!(Cli::try_parse_from(["gutenocr", "--max-pages", "0"]).is_err());
        let cli = Cli::try_parse_from(["gutenocr", "--max-pages", "2"]).unwrap();
        assert_eq!(cli.page_opts.max_pages, Some(2));
        let cli = Cli::try_parse_from(["gutenocr"]).unwrap();
        assert_eq!(cli.page_opts.max_pages, None);
    }

    #[tokio::test]
    async fn test_unsupported_file_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("notes.png");
        std::fs::write(&path, "this is not an image").unwrap();
        assert!(load_pages(&path, &PageOpts::default()).await.is_err());
    }
}
