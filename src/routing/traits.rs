//! Routing traits and input classification.

use anyhow::Result;
use async_trait::async_trait;

use crate::channels::InboundEvent;
use crate::sessions::Topic;

/// What class of input a message is, before any session state is consulted.
///
/// Command keywords are matched case-insensitively on the trimmed text, in
/// both of the languages the bot speaks. `End` is only acted on inside a
/// YouTube conversation; everywhere else the router treats it as plain text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputKind {
    /// Blank message; produces no reply at all.
    Empty,
    /// The menu keyword (`menu` / `選單`).
    Menu,
    /// A topic-selection keyword (`essay`, `youtube`, `restaurant`).
    Select(Topic),
    /// The exit keyword (`end` / `結束`).
    End,
    /// Anything else: a query, a link, or a question.
    Text,
}

/// Classify a raw message text.
pub fn classify(text: &str) -> InputKind {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return InputKind::Empty;
    }

    let lowered = trimmed.to_lowercase();
    if let Some(topic) = Topic::from_keyword(&lowered) {
        return InputKind::Select(topic);
    }

    match lowered.as_str() {
        "menu" | "選單" => InputKind::Menu,
        "end" | "結束" => InputKind::End,
        _ => InputKind::Text,
    }
}

/// Routes a decoded inbound event to a reply.
///
/// Returns `Ok(None)` when the event should be silently dropped.
#[async_trait]
pub trait EventRouter: Send + Sync {
    async fn dispatch(&self, event: &InboundEvent) -> Result<Option<String>>;

    /// The name of this router implementation.
    fn name(&self) -> &str;
}
