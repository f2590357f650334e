//! The OCR engine: page loading + prompt selection + model runner.

pub mod prompts;

use std::sync::Arc;

use schemars::JsonSchema;

use crate::{
    model::{DeviceInfo, ModelOpts, ModelRunner},
    pages::{PageImage, PageOpts, load_pages},
    prelude::*,
    ui::{ProgressConfig, Ui},
};

pub use self::prompts::{OutputFormat, TaskType, prompt_for};

/// The result of OCRing one file. Failures are reported here, not as errors.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct OcrResult {
    /// Did OCR succeed?
    pub success: bool,

    /// The input file.
    pub image_path: PathBuf,

    /// The task we asked for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_type: Option<TaskType>,

    /// The output format we asked for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_format: Option<OutputFormat>,

    /// The generated text. Multi-page files have pages separated by a blank
    /// line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// The exact instruction sent to the model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,

    /// How many pages were OCRed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages: Option<usize>,

    /// What went wrong, if `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OcrResult {
    /// Build a failed result.
    pub fn failed(image_path: &Path, error: &anyhow::Error) -> Self {
        Self {
            success: false,
            image_path: image_path.to_owned(),
            task_type: None,
            output_format: None,
            text: None,
            prompt: None,
            pages: None,
            error: Some(format!("{error:#}")),
        }
    }
}

/// Runs GutenOCR over files.
#[derive(Debug)]
pub struct OcrEngine {
    /// The model we call.
    runner: Arc<dyn ModelRunner>,

    /// Model options, for reporting and defaults.
    model_opts: ModelOpts,

    /// How to turn files into page images.
    page_opts: PageOpts,
}

impl OcrEngine {
    /// Create a new engine from options, loading the configured runner.
    pub async fn new(model_opts: &ModelOpts, page_opts: &PageOpts) -> Result<Self> {
        let runner = model_opts.create_runner().await?;
        Ok(Self::with_runner(runner, model_opts, page_opts))
    }

    /// Create a new engine around an existing runner.
    pub fn with_runner(
        runner: Arc<dyn ModelRunner>,
        model_opts: &ModelOpts,
        page_opts: &PageOpts,
    ) -> Self {
        Self {
            runner,
            model_opts: model_opts.clone(),
            page_opts: page_opts.clone(),
        }
    }

    /// The model identifier in use.
    pub fn model_id(&self) -> String {
        self.model_opts.model_id()
    }

    /// The configured per-page token limit.
    pub fn max_new_tokens(&self) -> u32 {
        self.model_opts.max_new_tokens
    }

    /// Information about the device and model.
    pub fn device_info(&self) -> DeviceInfo {
        self.model_opts.device_info()
    }

    /// OCR a single file.
    ///
    /// This never fails: any error becomes an [`OcrResult`] with `success`
    /// set to false.
    #[instrument(level = "debug", skip_all, fields(path = %image_path.display(), %task_type, %output_format))]
    pub async fn process_image(
        &self,
        image_path: &Path,
        task_type: TaskType,
        output_format: OutputFormat,
        max_new_tokens: u32,
        custom_prompt: Option<&str>,
    ) -> OcrResult {
        let prompt = match custom_prompt {
            Some(prompt) => prompt,
            None => prompt_for(task_type, output_format),
        };
        info!("Processing image: {}", image_path.display());
        match self
            .process_image_inner(image_path, prompt, max_new_tokens)
            .await
        {
            Ok((text, pages)) => OcrResult {
                success: true,
                image_path: image_path.to_owned(),
                task_type: Some(task_type),
                output_format: Some(output_format),
                text: Some(text),
                prompt: Some(prompt.to_owned()),
                pages: Some(pages),
                error: None,
            },
            Err(err) => {
                error!("Error processing image {}: {:#}", image_path.display(), err);
                OcrResult::failed(image_path, &err)
            }
        }
    }

    /// Do the actual work for [`Self::process_image`].
    async fn process_image_inner(
        &self,
        image_path: &Path,
        prompt: &str,
        max_new_tokens: u32,
    ) -> Result<(String, usize)> {
        let pages = load_pages(image_path, &self.page_opts).await?;
        self.ocr_pages(&pages, prompt, max_new_tokens).await
    }

    /// OCR pages in order, joining their text with a blank line. The first
    /// page that fails fails the whole file.
    async fn ocr_pages(
        &self,
        pages: &[PageImage],
        prompt: &str,
        max_new_tokens: u32,
    ) -> Result<(String, usize)> {
        let mut texts = Vec::with_capacity(pages.len());
        for (page_idx, page) in pages.iter().enumerate() {
            let text = self
                .runner
                .generate(page, prompt, max_new_tokens)
                .await
                .with_context(|| format!("failed to OCR page {}", page_idx + 1))?;
            texts.push(text);
        }
        Ok((texts.join("\n\n"), pages.len()))
    }

    /// OCR several files, one after another.
    pub async fn batch_process(
        &self,
        ui: &Ui,
        image_paths: &[PathBuf],
        task_type: TaskType,
        output_format: OutputFormat,
        max_new_tokens: u32,
        custom_prompt: Option<&str>,
    ) -> Vec<OcrResult> {
        let pb = ui.new_progress_bar(
            &ProgressConfig {
                emoji: "🔎",
                msg: "OCRing images",
                done_msg: "OCRed images",
            },
            image_paths.len() as u64,
        );
        let mut results = Vec::with_capacity(image_paths.len());
        for image_path in image_paths {
            let result = self
                .process_image(
                    image_path,
                    task_type,
                    output_format,
                    max_new_tokens,
                    custom_prompt,
                )
                .await;
            results.push(result);
            pb.inc(1);
        }
        pb.finish();
        results
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{ImageFormat, Rgb, RgbImage};

    use super::*;
    use crate::model::{DriverType, echo::EchoModelRunner};

    fn echo_engine() -> OcrEngine {
        let model_opts = ModelOpts {
            driver: DriverType::Echo,
            ..ModelOpts::default()
        };
        OcrEngine::with_runner(
            Arc::new(EchoModelRunner::new()),
            &model_opts,
            &PageOpts::default(),
        )
    }

    /// A runner that fails on pages of one particular width.
    #[derive(Debug)]
    struct FailOnWidth(u32);

    #[async_trait]
    impl ModelRunner for FailOnWidth {
        async fn generate(&self, image: &PageImage, _prompt: &str, _max: u32) -> Result<String> {
            let (width, _) = image.dimensions()?;
            if width == self.0 {
                return Err(anyhow!("cannot read a page {width} pixels wide"));
            }
            Ok(format!("page of width {width}"))
        }
    }

    fn png_page(width: u32) -> PageImage {
        let mut data = Vec::new();
        RgbImage::from_pixel(width, 1, Rgb([0, 0, 0]))
            .write_to(&mut Cursor::new(&mut data), ImageFormat::Png)
            .unwrap();
        PageImage {
            mime_type: "image/png".to_owned(),
            data,
        }
    }

    fn write_png(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        RgbImage::from_pixel(4, 3, Rgb([200, 200, 200]))
            .save(&path)
            .unwrap();
        path
    }

    #[tokio::test]
    async fn test_process_image_uses_table_prompt() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_png(dir.path(), "a.png");
        let result = echo_engine()
            .process_image(&path, TaskType::Reading, OutputFormat::Lines, 128, None)
            .await;
        assert!(result.success);
        assert_eq!(
            result.text.as_deref(),
            Some(
                "[image/png 4x3] Return line-by-line OCR as LINES with bounding boxes."
            )
        );
        assert_eq!(result.pages, Some(1));
        assert_eq!(result.task_type, Some(TaskType::Reading));
        assert_eq!(result.error, None);
    }

    #[tokio::test]
    async fn test_unknown_pair_uses_fallback_prompt() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_png(dir.path(), "a.png");
        let result = echo_engine()
            .process_image(&path, TaskType::Detection, OutputFormat::Latex, 128, None)
            .await;
        assert!(result.success);
        assert_eq!(result.prompt.as_deref(), Some(prompts::FALLBACK_PROMPT));
    }

    #[tokio::test]
    async fn test_custom_prompt_overrides_table() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_png(dir.path(), "a.png");
        let result = echo_engine()
            .process_image(
                &path,
                TaskType::Reading,
                OutputFormat::Text,
                128,
                Some("Only the title, please."),
            )
            .await;
        assert_eq!(result.prompt.as_deref(), Some("Only the title, please."));
        assert!(result.text.unwrap().ends_with("Only the title, please."));
    }

    #[tokio::test]
    async fn test_missing_file_is_a_failed_result() {
        let result = echo_engine()
            .process_image(
                Path::new("/definitely/not/here.png"),
                TaskType::Reading,
                OutputFormat::Text,
                128,
                None,
            )
            .await;
        assert!(!result.success);
        assert!(!result.error.unwrap().is_empty());
        assert_eq!(result.text, None);
    }

    #[tokio::test]
    async fn test_batch_continues_after_model_failure() {
        let dir = tempfile::TempDir::new().unwrap();
        let paths = vec![
            write_png(dir.path(), "a.png"),
            dir.path().join("missing.png"),
            write_png(dir.path(), "c.png"),
        ];
        let results = echo_engine()
            .batch_process(
                &Ui::init_for_tests(),
                &paths,
                TaskType::Reading,
                OutputFormat::Text,
                128,
                None,
            )
            .await;
        let successes = results.iter().map(|r| r.success).collect::<Vec<_>>();
        assert_eq!(successes, vec![true, false, true]);

        // The echo runner fails on demand, too.
        let results = echo_engine()
            .batch_process(
                &Ui::init_for_tests(),
                &paths[..1],
                TaskType::Reading,
                OutputFormat::Text,
                128,
                Some("FAIL"),
            )
            .await;
        assert!(!results[0].success);
        assert!(results[0].error.as_ref().unwrap().contains("page 1"));
    }

    #[tokio::test]
    async fn test_pages_joined_with_blank_line() {
        let engine = echo_engine();
        let pages = vec![png_page(1), png_page(2), png_page(3)];
        let (text, count) = engine
            .ocr_pages(&pages, "Read.", 128)
            .await
            .unwrap();
        assert_eq!(count, 3);
        assert_eq!(
            text,
            "[image/png 1x1] Read.\n\n[image/png 2x1] Read.\n\n[image/png 3x1] Read."
        );
    }

    #[tokio::test]
    async fn test_first_failing_page_fails_file() {
        let engine = OcrEngine::with_runner(
            Arc::new(FailOnWidth(2)),
            &ModelOpts::default(),
            &PageOpts::default(),
        );
        let pages = vec![png_page(1), png_page(2), png_page(3)];
        let err = engine
            .ocr_pages(&pages, "Read.", 128)
            .await
            .unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.starts_with("failed to OCR page 2: "), "{msg}");
        assert!(msg.contains("2 pixels wide"), "{msg}");

        let (text, count) = engine
            .ocr_pages(&pages[..1], "Read.", 128)
            .await
            .unwrap();
        assert_eq!((text.as_str(), count), ("page of width 1", 1));
    }
}
