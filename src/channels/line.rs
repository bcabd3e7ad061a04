//! LINE Messaging API client: inbound event decoding and outbound replies.
//!
//! Decoding is tolerant by design — a webhook body that does not contain a
//! usable text event yields `None` rather than an error, because the server
//! must acknowledge the platform regardless (see the gateway module).

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::traits::{InboundEvent, ReplySender};

// ── Inbound decoding ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    #[serde(default)]
    events: Vec<WebhookEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebhookEvent {
    reply_token: Option<String>,
    message: Option<EventMessage>,
    source: Option<EventSource>,
}

#[derive(Debug, Deserialize)]
struct EventMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventSource {
    #[serde(rename = "type")]
    kind: String,
    user_id: Option<String>,
    group_id: Option<String>,
}

/// Decode a webhook body into at most one text event.
///
/// Returns `Ok(None)` for non-text messages, empty event lists, and events
/// missing a sender or reply token. Returns `Err` only for unparseable JSON.
pub fn extract_event(body: &[u8]) -> Result<Option<InboundEvent>> {
    let payload: WebhookPayload =
        serde_json::from_slice(body).context("unparseable webhook body")?;

    let Some(event) = payload.events.into_iter().next() else {
        return Ok(None);
    };

    let Some(message) = event.message else {
        return Ok(None);
    };
    if message.kind != "text" {
        return Ok(None);
    }

    let (Some(reply_token), Some(source)) = (event.reply_token, event.source) else {
        return Ok(None);
    };
    let Some(user_id) = source.user_id else {
        return Ok(None);
    };

    let group_id = if source.kind == "group" {
        source.group_id
    } else {
        None
    };

    Ok(Some(InboundEvent {
        user_id,
        group_id,
        text: message.text,
        reply_token,
    }))
}

// ── Outbound replies ─────────────────────────────────────────────

/// Client for the LINE reply endpoint, authenticated with the channel
/// access token.
pub struct LineClient {
    access_token: String,
    reply_url: String,
    client: Client,
}

impl LineClient {
    pub fn new(access_token: &str, reply_url: &str) -> Self {
        Self {
            access_token: access_token.to_string(),
            reply_url: reply_url.trim_end_matches('/').to_string(),
            client: Client::builder()
                .timeout(Duration::from_secs(15))
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }
}

#[async_trait]
impl ReplySender for LineClient {
    async fn reply(&self, reply_token: &str, text: &str) -> Result<()> {
        let body = json!({
            "replyToken": reply_token,
            "messages": [
                {
                    "type": "text",
                    "text": text,
                }
            ]
        });

        let response = self
            .client
            .post(&self.reply_url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .context("reply request failed")?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "reply endpoint returned {status}: {}",
                crate::providers::sanitize_api_error(&detail)
            );
        }

        Ok(())
    }

    fn name(&self) -> &str {
        "line"
    }
}
