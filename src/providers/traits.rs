//! Provider traits and types for model inference backends.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A single chat message in provider wire order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Model inference backend. Implementations own their HTTP client, model
/// name, and sampling settings.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Run one chat completion over the given messages and return the
    /// assistant text.
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String>;

    /// The name of this provider implementation.
    fn name(&self) -> &str;
}
