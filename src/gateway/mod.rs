//! Webhook gateway: the HTTP surface of the bot.
//!
//! One route receives platform events and one reports liveness. The webhook
//! handler acknowledges 200 no matter what happens internally — a failed
//! acknowledgment would make the platform redeliver the event and duplicate
//! side effects.

pub mod sweep;

pub use sweep::spawn_eviction_sweep;

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use std::time::Instant;

use crate::backends::{EssayBackend, HttpTranscriptFetcher, RestaurantBackend, YoutubeBackend};
use crate::channels::{self, LineClient, ReplySender};
use crate::config::Config;
use crate::providers;
use crate::routing::{self, EventRouter};
use crate::sessions::{self, SessionStore};

#[derive(Clone)]
pub struct AppState {
    pub router: Arc<dyn EventRouter>,
    pub replies: Arc<dyn ReplySender>,
    pub sessions: Arc<dyn SessionStore>,
    pub started_at: Instant,
}

/// Build the axum application over the given state.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/webhook", post(handle_webhook))
        .route("/healthz", get(handle_healthz))
        .with_state(state)
}

/// POST /webhook — decode, route, reply. Always acknowledges 200.
async fn handle_webhook(State(state): State<AppState>, body: Bytes) -> impl IntoResponse {
    let event = match channels::extract_event(&body) {
        Ok(Some(event)) => event,
        Ok(None) => return (StatusCode::OK, "OK"),
        Err(err) => {
            tracing::warn!(error = %err, "dropping malformed webhook body");
            return (StatusCode::OK, "OK");
        }
    };

    match state.router.dispatch(&event).await {
        Ok(Some(reply)) => {
            if let Err(err) = state.replies.reply(&event.reply_token, &reply).await {
                tracing::error!(user = %event.user_id, error = %err, "failed to send reply");
            }
        }
        Ok(None) => {}
        Err(err) => {
            tracing::error!(user = %event.user_id, error = %err, "dispatch failed");
        }
    }

    (StatusCode::OK, "OK")
}

/// GET /healthz — liveness snapshot.
async fn handle_healthz(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "active_sessions": state.sessions.count().await,
    }))
}

/// Wire up every component from config and serve until shutdown.
pub async fn run_gateway(host: &str, port: u16, config: Config) -> Result<()> {
    let provider = providers::create_provider(&config.provider)?;

    let sessions = sessions::create_session_store();
    let essay = Arc::new(EssayBackend::new(provider.clone(), &config.backends.essay));
    let restaurant = Arc::new(
        RestaurantBackend::load(provider.clone(), &config.backends.restaurant)
            .context("failed to build restaurant knowledge base")?,
    );
    let youtube = Arc::new(YoutubeBackend::new(
        provider,
        Box::new(HttpTranscriptFetcher::new()),
        &config.backends.youtube,
    ));

    let token = config
        .line
        .channel_access_token
        .as_deref()
        .context("line.channel_access_token is not configured (set LINE_CHANNEL_ACCESS_TOKEN)")?;
    let replies = Arc::new(LineClient::new(token, &config.line.reply_url));

    let router = routing::create_router(
        sessions.clone(),
        essay,
        restaurant,
        youtube.clone(),
    );

    let _sweeper = spawn_eviction_sweep(sessions.clone(), youtube, &config.sessions);

    let state = AppState {
        router,
        replies,
        sessions,
        started_at: Instant::now(),
    };

    let listener = tokio::net::TcpListener::bind((host, port))
        .await
        .with_context(|| format!("failed to bind {host}:{port}"))?;
    tracing::info!(addr = %listener.local_addr()?, "webhook gateway listening");

    axum::serve(listener, build_app(state)).await?;
    Ok(())
}
