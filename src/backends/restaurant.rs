//! Restaurant info backend.
//!
//! The knowledge base is assembled once at startup from three local sources:
//! an FAQ file (`faq.qa`, entries separated by `===`), review articles
//! (`blog.md`, separated by `---`), and Google Maps reviews
//! (`google-map.json`, rating/comment records). Queries are stateless: the
//! most relevant chunks are handed to the model as context, so concurrent
//! users cannot interfere with each other.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;

use super::retrieval;
use super::traits::{BackendError, BackendResult, QueryBackend};
use crate::config::RestaurantConfig;
use crate::providers::{ChatMessage, Provider};

const CONTEXT_CHUNKS: usize = 4;

#[derive(Debug, Deserialize)]
struct MapReview {
    rating: f64,
    comment: String,
}

pub struct RestaurantBackend {
    provider: Arc<dyn Provider>,
    chunks: Vec<String>,
}

impl RestaurantBackend {
    /// Build the knowledge base from the configured data directory.
    pub fn load(provider: Arc<dyn Provider>, config: &RestaurantConfig) -> Result<Self> {
        let chunks = load_knowledge_base(&config.data_dir)?;
        tracing::info!(
            dir = %config.data_dir.display(),
            chunks = chunks.len(),
            "restaurant knowledge base loaded"
        );
        Ok(Self { provider, chunks })
    }

    #[cfg(test)]
    fn with_chunks(provider: Arc<dyn Provider>, chunks: Vec<String>) -> Self {
        Self { provider, chunks }
    }
}

fn load_knowledge_base(dir: &Path) -> Result<Vec<String>> {
    let mut chunks = Vec::new();

    let faq = std::fs::read_to_string(dir.join("faq.qa"))
        .with_context(|| format!("failed to read {}", dir.join("faq.qa").display()))?;
    chunks.extend(split_blocks(&faq, "==="));

    let blog = std::fs::read_to_string(dir.join("blog.md"))
        .with_context(|| format!("failed to read {}", dir.join("blog.md").display()))?;
    chunks.extend(split_blocks(&blog, "---"));

    let raw_reviews = std::fs::read_to_string(dir.join("google-map.json"))
        .with_context(|| format!("failed to read {}", dir.join("google-map.json").display()))?;
    let reviews: Vec<MapReview> =
        serde_json::from_str(&raw_reviews).context("invalid google-map.json")?;
    chunks.extend(
        reviews
            .into_iter()
            .map(|r| format!("Rating:{}, Comment:{}", r.rating, r.comment)),
    );

    Ok(chunks)
}

fn split_blocks(text: &str, separator: &str) -> Vec<String> {
    text.split(separator)
        .map(str::trim)
        .filter(|block| !block.is_empty())
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl QueryBackend for RestaurantBackend {
    async fn answer(&self, _user_id: &str, query: &str) -> BackendResult<String> {
        if self.chunks.is_empty() {
            return Err(BackendError::NoResults);
        }

        let context = retrieval::rank(query, &self.chunks, CONTEXT_CHUNKS);

        let mut system = String::from(
            "你是一間餐廳的客服助理，請只根據以下餐廳資料回答問題，\
             資料中找不到的請禮貌說明無法回答，請用使用者詢問的語言回應。\n\n餐廳資料:\n",
        );
        for chunk in &context {
            system.push_str("---\n");
            system.push_str(chunk);
            system.push('\n');
        }

        let messages = [ChatMessage::system(system), ChatMessage::user(query)];

        self.provider
            .chat(&messages)
            .await
            .map_err(BackendError::upstream)
    }

    fn name(&self) -> &str {
        "restaurant"
    }
}
