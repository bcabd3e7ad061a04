//! Ollama chat provider.
//!
//! Speaks the native `/api/chat` endpoint of a local (or remote) Ollama
//! server. Retrieval-augmented answers can take a while on CPU-bound
//! hardware, so the request timeout is generous and configurable.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::traits::{ChatMessage, Provider};

pub struct OllamaProvider {
    base_url: String,
    model: String,
    temperature: f64,
    client: Client,
}

impl OllamaProvider {
    pub fn new(base_url: &str, model: &str, temperature: f64, request_timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            temperature,
            client: Client::builder()
                .timeout(request_timeout)
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.base_url)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}

#[async_trait]
impl Provider for OllamaProvider {
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            stream: false,
            options: ChatOptions {
                temperature: self.temperature,
            },
        };

        let response = self
            .client
            .post(self.chat_url())
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(super::api_error("ollama", response).await);
        }

        let parsed: ChatResponse = response.json().await?;
        let content = parsed.message.content.trim();
        if content.is_empty() {
            return Err(anyhow!("ollama returned an empty completion"));
        }

        Ok(content.to_string())
    }

    fn name(&self) -> &str {
        "ollama"
    }
}
