//! Backend adapter contracts and the typed failure taxonomy.
//!
//! Every topic backend answers queries through the same narrow contract; the
//! YouTube backend additionally needs a one-time ingestion step before it can
//! answer, plus an explicit reset that drops its per-user conversation state.

use async_trait::async_trait;
use thiserror::Error;

const MAX_UPSTREAM_ERROR_CHARS: usize = 200;

/// Failure kinds a backend can surface. The router maps each kind to a
/// user-visible reply and a session-reset decision; nothing here is ever
/// shown raw to the messaging platform.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The provided source is not a recognizable video link.
    #[error("not a valid YouTube link: {0}")]
    InvalidLink(String),

    /// `answer` was called before a successful `ingest`. The state machine
    /// makes this unreachable through the router; hitting it is a bug.
    #[error("no transcript ingested for user {0}")]
    NotIngested(String),

    /// Retrieval produced nothing to answer from.
    #[error("no matching documents found")]
    NoResults,

    /// An upstream service (search API, transcript source, model) failed.
    #[error("upstream request failed: {0}")]
    Upstream(String),
}

impl BackendError {
    /// Wrap an upstream failure, truncating long bodies so provider error
    /// pages never flood logs or user replies.
    pub fn upstream(err: impl std::fmt::Display) -> Self {
        let text = err.to_string();
        if text.chars().count() <= MAX_UPSTREAM_ERROR_CHARS {
            return BackendError::Upstream(text);
        }

        let mut end = MAX_UPSTREAM_ERROR_CHARS;
        while end > 0 && !text.is_char_boundary(end) {
            end -= 1;
        }
        BackendError::Upstream(format!("{}...", &text[..end]))
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

/// A topic backend that can answer a free-text query for a user.
#[async_trait]
pub trait QueryBackend: Send + Sync {
    /// Answer a query on behalf of a user. Single-turn backends ignore
    /// `user_id`; conversational backends key their memory on it.
    async fn answer(&self, user_id: &str, query: &str) -> BackendResult<String>;

    /// The name of this backend implementation.
    fn name(&self) -> &str;
}

/// A backend that requires one-time ingestion before it can answer, and holds
/// per-user conversational memory between turns.
#[async_trait]
pub trait ConversationalBackend: QueryBackend {
    /// Prepare the backend for a user from a source reference (e.g. a video
    /// link). Must succeed before `answer` is usable for that user.
    async fn ingest(&self, user_id: &str, source: &str) -> BackendResult<()>;

    /// Drop the ingestion record and conversation memory for a user.
    /// Resetting a user that was never ingested is a no-op.
    async fn reset(&self, user_id: &str) -> BackendResult<()>;

    /// Whether a user currently has an ingestion record.
    fn is_ingested(&self, user_id: &str) -> bool;
}
