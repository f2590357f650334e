//! Converting binary data to a `data:` URL.

use base64::{Engine as _, prelude::BASE64_STANDARD};

/// Convert binary data to a `data:` URL.
pub fn data_url(mime_type: &str, data: &[u8]) -> String {
    let base64_data = BASE64_STANDARD.encode(data);
    // Some sources indicate that the Base64 data should be percent-encoded, but
    // in practice this breaks vLLM, Ollama and most other servers.
    format!("data:{};base64,{}", mime_type, base64_data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_url_prefix() {
        let url = data_url("image/png", b"abc");
        assert_eq!(url, "data:image/png;base64,YWJj");
    }
}
