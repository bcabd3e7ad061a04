//! Provider subsystem for model inference backends.
//!
//! Each provider implements the [`Provider`] trait defined in [`traits`] and
//! is registered in the factory function [`create_provider`] by its canonical
//! string key.

pub mod ollama;
pub mod traits;

pub use traits::{ChatMessage, Provider};

use crate::config::ProviderConfig;
use std::sync::Arc;
use std::time::Duration;

const MAX_API_ERROR_CHARS: usize = 200;

/// Truncate provider error bodies so HTML error pages and stack traces never
/// flood the logs.
pub fn sanitize_api_error(input: &str) -> String {
    if input.chars().count() <= MAX_API_ERROR_CHARS {
        return input.to_string();
    }

    let mut end = MAX_API_ERROR_CHARS;
    while end > 0 && !input.is_char_boundary(end) {
        end -= 1;
    }

    format!("{}...", &input[..end])
}

/// Build a sanitized provider error from a failed HTTP response.
pub async fn api_error(provider: &str, response: reqwest::Response) -> anyhow::Error {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read provider error body>".to_string());
    let sanitized = sanitize_api_error(&body);
    anyhow::anyhow!("{provider} API error ({status}): {sanitized}")
}

/// Factory: create the configured provider by its canonical key.
pub fn create_provider(config: &ProviderConfig) -> anyhow::Result<Arc<dyn Provider>> {
    match config.kind.trim().to_ascii_lowercase().as_str() {
        "ollama" => Ok(Arc::new(ollama::OllamaProvider::new(
            &config.base_url,
            &config.model,
            config.temperature,
            Duration::from_secs(config.request_timeout_secs),
        ))),
        other => anyhow::bail!("Unknown provider: {other}. Only \"ollama\" is currently supported."),
    }
}
