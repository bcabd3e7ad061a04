//! Idle-session eviction sweep.
//!
//! Only the YouTube topic has an explicit exit command, so abandoned
//! conversations would otherwise hold their session and transcript memory
//! forever. The sweep evicts sessions past the idle timeout and releases the
//! matching backend state.

use std::sync::Arc;
use std::time::Duration;

use crate::backends::ConversationalBackend;
use crate::config::SessionsConfig;
use crate::sessions::SessionStore;

/// One sweep pass: evict idle sessions and reset their backend memory.
pub async fn sweep_once(
    sessions: &Arc<dyn SessionStore>,
    youtube: &Arc<dyn ConversationalBackend>,
    ttl: Duration,
) {
    match sessions.evict_idle(ttl).await {
        Ok(evicted) => {
            for user_id in evicted {
                tracing::info!(user = %user_id, "session evicted after idle timeout");
                if let Err(err) = youtube.reset(&user_id).await {
                    tracing::warn!(user = %user_id, error = %err, "failed to reset backend memory");
                }
            }
        }
        Err(err) => {
            tracing::warn!(error = %err, "eviction sweep failed");
        }
    }
}

/// Spawn the periodic eviction task.
pub fn spawn_eviction_sweep(
    sessions: Arc<dyn SessionStore>,
    youtube: Arc<dyn ConversationalBackend>,
    config: &SessionsConfig,
) -> tokio::task::JoinHandle<()> {
    let ttl = Duration::from_secs(config.idle_timeout_secs);
    let every = Duration::from_secs(config.sweep_interval_secs.max(1));

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        interval.tick().await;

        loop {
            interval.tick().await;
            sweep_once(&sessions, &youtube, ttl).await;
        }
    })
}
