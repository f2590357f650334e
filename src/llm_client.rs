//! Client for OpenAI-compatible model servers (usually vLLM or Ollama).

use async_openai::{Client, config::OpenAIConfig};

use crate::prelude::*;

/// Environment variable overriding the model server URL.
pub const API_BASE_VAR: &str = "OPENAI_API_BASE";

/// Environment variable holding the API key, if the server wants one.
pub const API_KEY_VAR: &str = "OPENAI_API_KEY";

/// The server URL we'll talk to, for display purposes.
pub fn configured_api_base() -> Option<String> {
    std::env::var(API_BASE_VAR).ok()
}

/// Create an OpenAI-compatible client using the default configuration.
pub fn create_llm_client() -> Result<Client<OpenAIConfig>> {
    let mut client_config = OpenAIConfig::new();
    if let Ok(api_key) = std::env::var(API_KEY_VAR) {
        client_config = client_config.with_api_key(api_key);
    }
    if let Some(api_base) = configured_api_base() {
        debug!(%api_base, "Using custom model server");
        client_config = client_config.with_api_base(api_base);
    }
    let client = Client::with_config(client_config);
    Ok(client)
}
