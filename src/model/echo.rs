//! Echo runner for testing.
//!
//! This runner describes the image it was given and echoes back the prompt,
//! as `[<mime type> <width>x<height>] <prompt>`. Prompts containing
//! [`FAIL_MARKER`] fail, which lets tests exercise error handling end to end.

use crate::{pages::PageImage, prelude::*};

use super::ModelRunner;

/// Prompts containing this text make the echo runner return an error.
pub const FAIL_MARKER: &str = "FAIL";

/// Echo runner for testing.
#[derive(Debug, Default)]
pub struct EchoModelRunner;

impl EchoModelRunner {
    /// Create a new echo runner.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ModelRunner for EchoModelRunner {
    async fn generate(
        &self,
        image: &PageImage,
        prompt: &str,
        _max_new_tokens: u32,
    ) -> Result<String> {
        if prompt.contains(FAIL_MARKER) {
            return Err(anyhow!("echo runner asked to fail"));
        }
        let (width, height) = image.dimensions()?;
        Ok(format!(
            "[{} {}x{}] {}",
            image.mime_type, width, height, prompt
        ))
    }
}
