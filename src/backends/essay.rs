//! Essay lookup backend: arXiv keyword search plus a model-written summary.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use super::traits::{BackendError, BackendResult, QueryBackend};
use crate::config::EssayConfig;
use crate::providers::{ChatMessage, Provider};

const SUMMARY_INSTRUCTION: &str =
    "請詳細列點解釋文章的各個觀點。\nExplain the points of the paper in detail, as a list.";

pub struct EssayBackend {
    provider: Arc<dyn Provider>,
    api_url: String,
    max_results: usize,
    client: Client,
}

impl EssayBackend {
    pub fn new(provider: Arc<dyn Provider>, config: &EssayConfig) -> Self {
        Self {
            provider,
            api_url: config.api_url.clone(),
            max_results: config.max_results.max(1),
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    async fn search(&self, query: &str) -> BackendResult<Vec<Paper>> {
        let response = self
            .client
            .get(&self.api_url)
            .query(&[
                ("search_query", format!("all:{query}")),
                ("start", "0".to_string()),
                ("max_results", self.max_results.to_string()),
                ("sortBy", "relevance".to_string()),
                ("sortOrder", "descending".to_string()),
            ])
            .send()
            .await
            .map_err(BackendError::upstream)?;

        if !response.status().is_success() {
            return Err(BackendError::upstream(format!(
                "arxiv returned {}",
                response.status()
            )));
        }

        let body = response.text().await.map_err(BackendError::upstream)?;
        parse_feed(&body)
    }
}

/// A paper entry from the arXiv Atom feed, whitespace-normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paper {
    pub title: String,
    pub authors: Vec<String>,
    pub published: String,
    pub url: String,
    pub summary: String,
}

#[derive(Debug, Deserialize)]
struct Feed {
    #[serde(default, rename = "entry")]
    entries: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    #[serde(default)]
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    published: String,
    #[serde(default, rename = "author")]
    authors: Vec<Author>,
}

#[derive(Debug, Deserialize)]
struct Author {
    #[serde(default)]
    name: String,
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse the arXiv Atom feed into paper entries.
pub fn parse_feed(xml: &str) -> BackendResult<Vec<Paper>> {
    let feed: Feed = quick_xml::de::from_str(xml)
        .map_err(|e| BackendError::upstream(format!("invalid arxiv feed: {e}")))?;

    Ok(feed
        .entries
        .into_iter()
        .map(|entry| Paper {
            title: collapse_whitespace(&entry.title),
            authors: entry
                .authors
                .into_iter()
                .map(|a| a.name.trim().to_string())
                .filter(|name| !name.is_empty())
                .collect(),
            published: entry.published.trim().to_string(),
            url: entry.id.trim().to_string(),
            summary: collapse_whitespace(&entry.summary),
        })
        .collect())
}

/// Metadata header plus summary, mirroring the bilingual reply layout the
/// bot has always used.
fn format_reply(paper: &Paper, summary: &str) -> String {
    format!(
        "文章標題 Title：{}\n作者 Author：{}\n發布時間 Publish Date：{}\nURL：{}\n{}",
        paper.title,
        paper.authors.join(", "),
        paper.published,
        paper.url,
        summary,
    )
}

#[async_trait]
impl QueryBackend for EssayBackend {
    async fn answer(&self, _user_id: &str, query: &str) -> BackendResult<String> {
        let papers = self.search(query).await?;
        let Some(paper) = papers.first() else {
            return Err(BackendError::NoResults);
        };

        let messages = [
            ChatMessage::system(format!(
                "你是一位論文導讀助理。以下是一篇論文的標題與摘要，請根據它回答。\n\
                 Title: {}\nAbstract: {}",
                paper.title, paper.summary
            )),
            ChatMessage::user(SUMMARY_INSTRUCTION),
        ];

        let summary = self
            .provider
            .chat(&messages)
            .await
            .map_err(BackendError::upstream)?;

        Ok(format_reply(paper, &summary))
    }

    fn name(&self) -> &str {
        "essay"
    }
}
