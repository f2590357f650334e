//! Our OpenAI-compatible model runner, which we use for vLLM, Ollama and
//! anything else that speaks `/chat/completions` with image inputs.

use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{CreateChatCompletionResponse, FinishReason},
};

use crate::{llm_client::create_llm_client, pages::PageImage, prelude::*};

use super::{ModelOpts, ModelRunner};

/// Runs GutenOCR on an OpenAI-compatible server.
#[derive(Debug)]
pub struct OpenAiModelRunner {
    /// The OpenAI client.
    client: Client<OpenAIConfig>,

    /// Options, including the model ID and timeout.
    opts: ModelOpts,
}

impl OpenAiModelRunner {
    /// Create a new runner. This does not contact the server.
    pub fn new(opts: &ModelOpts) -> Result<Self> {
        let client = create_llm_client()?;
        Ok(Self {
            client,
            opts: opts.clone(),
        })
    }
}

/// Build a chat request with a single user turn: the image, then the prompt.
fn build_request(
    model: &str,
    image: &PageImage,
    prompt: &str,
    max_new_tokens: u32,
) -> Value {
    json!({
        "model": model,
        "messages": [
            {
                "role": "user",
                "content": [
                    {
                        "type": "image_url",
                        "image_url": { "url": image.to_data_url() },
                    },
                    { "type": "text", "text": prompt },
                ],
            }
        ],
        "max_tokens": max_new_tokens,
    })
}

/// Pull the generated text out of a chat response.
///
/// Chat servers only return the completion, so there is no echoed prompt to
/// strip here.
fn extract_generated_text(response: Value) -> Result<String> {
    let response = serde_json::from_value::<CreateChatCompletionResponse>(response)
        .context("Error parsing chat completion response")?;
    if let Some(usage) = &response.usage {
        debug!(
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            "Token usage"
        );
    }
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("No choices in chat completion response"))?;
    if choice.finish_reason == Some(FinishReason::Length) {
        warn!("Model stopped at max_new_tokens; output may be truncated");
    }
    if choice.finish_reason == Some(FinishReason::ContentFilter) {
        return Err(anyhow!("Content filter triggered"));
    }
    Ok(choice.message.content.unwrap_or_default())
}

#[async_trait]
impl ModelRunner for OpenAiModelRunner {
    #[instrument(level = "debug", skip_all, fields(model = %self.opts.model_id()))]
    async fn generate(
        &self,
        image: &PageImage,
        prompt: &str,
        max_new_tokens: u32,
    ) -> Result<String> {
        let req = build_request(&self.opts.model_id(), image, prompt, max_new_tokens);
        trace!(%prompt, mime_type = %image.mime_type, "Request");

        let chat = self.client.chat();
        let future = self.opts.apply_timeout(async {
            chat.create_byot::<Value, Value>(req)
                .await
                .context("Error calling model server")
        });
        let chat_result = future.await?;
        debug!(%chat_result, "Model response");
        extract_generated_text(chat_result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_puts_image_before_prompt() {
        let image = PageImage {
            mime_type: "image/png".to_owned(),
            data: b"png".to_vec(),
        };
        let req = build_request("rootsautomation/GutenOCR-3B", &image, "Read it.", 64);
        let content = &req["messages"][0]["content"];
        assert_eq!(content[0]["type"], "image_url");
        assert_eq!(content[0]["image_url"]["url"], "data:image/png;base64,cG5n");
        assert_eq!(content[1], json!({ "type": "text", "text": "Read it." }));
        assert_eq!(req["max_tokens"], 64);
    }

    #[test]
    fn test_extract_generated_text() {
        let response = json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "created": 1,
            "model": "rootsautomation/GutenOCR-3B",
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": "Hello, world" },
                "finish_reason": "stop",
            }],
            "usage": { "prompt_tokens": 10, "completion_tokens": 3, "total_tokens": 13 },
        });
        assert_eq!(extract_generated_text(response).unwrap(), "Hello, world");
    }

    #[test]
    fn test_extract_generated_text_without_choices() {
        let response = json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "created": 1,
            "model": "m",
            "choices": [],
        });
        let err = extract_generated_text(response).unwrap_err();
        assert!(err.to_string().contains("No choices"));
    }
}
