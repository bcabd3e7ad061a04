//! Session storage traits and types for per-user topic state.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The three supported conversation domains.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Topic {
    Essay,
    Youtube,
    Restaurant,
}

impl Topic {
    /// Parse a topic-selection keyword. Expects input already trimmed and lowercased.
    pub fn from_keyword(word: &str) -> Option<Self> {
        match word {
            "essay" => Some(Topic::Essay),
            "youtube" => Some(Topic::Youtube),
            "restaurant" => Some(Topic::Restaurant),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Topic::Essay => "essay",
            Topic::Youtube => "youtube",
            Topic::Restaurant => "restaurant",
        }
    }
}

/// Per-topic sub-state. There is no `Idle` variant: an idle user simply has
/// no session, so "no topic but some topic state" is unrepresentable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TopicState {
    /// Topic chosen, waiting for the first argument (keyword, link, or question).
    AwaitingArg,
    /// Multi-turn conversation in progress (YouTube only).
    Conversing,
}

/// A tracked per-user conversation session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub topic: Topic,
    pub state: TopicState,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

/// Volatile storage for per-user topic sessions.
///
/// All topic/state transitions go through the router; backends never touch
/// this store. Sessions live until explicitly cleared or evicted by the
/// idle sweep.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Get the session for a user, if one exists.
    async fn get(&self, user_id: &str) -> Result<Option<Session>>;

    /// Create or overwrite the session for a user with a freshly selected
    /// topic in `AwaitingArg`. Re-selection overwrites, never stacks.
    async fn set_topic(&self, user_id: &str, topic: Topic) -> Result<Session>;

    /// Update the sub-state of an existing session. Errors if the user has
    /// no session.
    async fn set_state(&self, user_id: &str, state: TopicState) -> Result<()>;

    /// Refresh the last-activity timestamp of an existing session.
    async fn touch(&self, user_id: &str) -> Result<()>;

    /// Remove the session for a user. Removing an absent session is a no-op.
    async fn clear(&self, user_id: &str) -> Result<()>;

    /// Remove every session idle longer than `ttl`. Returns the evicted
    /// user ids so callers can release per-user backend state.
    async fn evict_idle(&self, ttl: Duration) -> Result<Vec<String>>;

    /// Number of live sessions.
    async fn count(&self) -> usize;

    /// The name of this session store implementation.
    fn name(&self) -> &str;
}
