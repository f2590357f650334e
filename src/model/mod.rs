//! Model runners.
//!
//! The vision-language model itself lives behind an OpenAI-compatible server
//! (vLLM, Ollama, etc). A [`ModelRunner`] turns one page image plus one
//! instruction into generated text.

use std::{fmt, pin::Pin, sync::Arc, time::Duration};

use clap::{Args, ValueEnum};
use schemars::JsonSchema;

use crate::{llm_client::configured_api_base, pages::PageImage, prelude::*};

pub mod echo;
pub mod openai;

/// The GutenOCR checkpoints we know about.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[clap(rename_all = "kebab-case")]
pub enum ModelPreset {
    /// GutenOCR-3B. Faster.
    #[default]
    #[clap(name = "gutenocr-3b")]
    GutenOcr3B,

    /// GutenOCR-7B. More accurate.
    #[clap(name = "gutenocr-7b")]
    GutenOcr7B,
}

impl ModelPreset {
    /// The model identifier to request from the server.
    pub fn model_id(self) -> &'static str {
        match self {
            ModelPreset::GutenOcr3B => "rootsautomation/GutenOCR-3B",
            ModelPreset::GutenOcr7B => "rootsautomation/GutenOCR-7B",
        }
    }
}

/// Where we'd like inference to happen.
#[derive(Clone, Copy, Debug, Default, JsonSchema, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Device {
    /// Let the model server decide.
    #[default]
    Auto,
    /// CPU only.
    Cpu,
    /// A CUDA accelerator.
    Cuda,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Auto => write!(f, "auto"),
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda => write!(f, "cuda"),
        }
    }
}

/// Our different driver types.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[clap(rename_all = "snake_case")]
pub enum DriverType {
    /// Any OpenAI-compatible server (vLLM, Ollama, LiteLLM, etc).
    #[default]
    #[clap(name = "openai")]
    OpenAI,

    /// Offline driver which describes the image and echoes the prompt.
    /// Useful for testing pipelines without a model server.
    Echo,
}

impl fmt::Display for DriverType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverType::OpenAI => write!(f, "openai"),
            DriverType::Echo => write!(f, "echo"),
        }
    }
}

/// Model-related options.
#[derive(Args, Clone, Debug)]
pub struct ModelOpts {
    /// Which GutenOCR checkpoint to use.
    #[clap(long = "model", value_enum, default_value_t = ModelPreset::default())]
    pub preset: ModelPreset,

    /// Use this model identifier instead of a preset (for example, the name
    /// your server registered the model under).
    #[clap(long)]
    pub model_id: Option<String>,

    /// Which device the model server should run on.
    #[clap(long, value_enum, default_value_t = Device::default())]
    pub device: Device,

    /// Shorthand for `--device cpu`.
    #[clap(long)]
    pub cpu: bool,

    /// The model driver to use.
    #[clap(long, value_enum, default_value_t = DriverType::default())]
    pub driver: DriverType,

    /// Maximum number of tokens to generate per page.
    #[clap(long, default_value = "4096")]
    pub max_new_tokens: u32,

    /// A timeout, in seconds, for the model to return a complete response.
    #[clap(long)]
    pub timeout: Option<u64>,
}

impl Default for ModelOpts {
    fn default() -> Self {
        Self {
            preset: ModelPreset::default(),
            model_id: None,
            device: Device::default(),
            cpu: false,
            driver: DriverType::default(),
            max_new_tokens: 4096,
            timeout: None,
        }
    }
}

impl ModelOpts {
    /// The model identifier we'll actually send.
    pub fn model_id(&self) -> String {
        self.model_id
            .clone()
            .unwrap_or_else(|| self.preset.model_id().to_owned())
    }

    /// Which device to ask for.
    pub fn device(&self) -> Device {
        if self.cpu { Device::Cpu } else { self.device }
    }

    /// Describe the configured device and model.
    pub fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            device: self.device(),
            use_cpu: self.device() == Device::Cpu,
            model_id: self.model_id(),
            driver: self.driver.to_string(),
            api_base: match self.driver {
                DriverType::OpenAI => configured_api_base(),
                DriverType::Echo => None,
            },
        }
    }

    /// Instantiate the configured model runner.
    pub async fn create_runner(&self) -> Result<Arc<dyn ModelRunner>> {
        info!(
            model = %self.model_id(),
            device = %self.device(),
            driver = %self.driver,
            "Loading model runner"
        );
        match self.driver {
            DriverType::OpenAI => Ok(Arc::new(openai::OpenAiModelRunner::new(self)?)),
            DriverType::Echo => Ok(Arc::new(echo::EchoModelRunner::new())),
        }
    }

    /// Apply our timeout (if any) to a model call.
    ///
    /// `'fut` is the lifetime of anything `future` borrows. We box the result
    /// because the two branches produce different future types.
    pub fn apply_timeout<'fut, T>(
        &self,
        future: impl Future<Output = Result<T>> + Send + 'fut,
    ) -> Pin<Box<dyn Future<Output = Result<T>> + Send + 'fut>>
    where
        T: Send + 'static,
    {
        match self.timeout {
            Some(secs) => Box::pin(async move {
                match tokio::time::timeout(Duration::from_secs(secs), future).await {
                    Ok(inner) => inner,
                    Err(_) => Err(anyhow!("model request timed out after {secs} seconds")),
                }
            }),
            None => Box::pin(future),
        }
    }
}

/// Device and model information, as shown by `capabilities`.
#[derive(Clone, Debug, JsonSchema, Serialize)]
pub struct DeviceInfo {
    /// Requested device.
    pub device: Device,

    /// Was CPU inference forced?
    pub use_cpu: bool,

    /// The model identifier.
    pub model_id: String,

    /// The model driver.
    pub driver: String,

    /// The model server, if one was configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
}

/// Interface to a vision-language model.
#[async_trait]
pub trait ModelRunner: fmt::Debug + Send + Sync + 'static {
    /// Run one user turn containing `image` followed by `prompt`, and return
    /// only the newly generated text.
    async fn generate(
        &self,
        image: &PageImage,
        prompt: &str,
        max_new_tokens: u32,
    ) -> Result<String>;
}
