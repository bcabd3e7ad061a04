//! Messaging-platform types and the outbound reply seam.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A decoded inbound messaging event. Transient; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InboundEvent {
    pub user_id: String,
    pub group_id: Option<String>,
    pub text: String,
    pub reply_token: String,
}

/// Sends outbound text replies back to the messaging platform.
///
/// Kept as a seam so the webhook handler and router can be exercised without
/// a live platform credential.
#[async_trait]
pub trait ReplySender: Send + Sync {
    /// Reply to an inbound event identified by its reply token.
    async fn reply(&self, reply_token: &str, text: &str) -> Result<()>;

    /// The name of this sender implementation.
    fn name(&self) -> &str;
}
