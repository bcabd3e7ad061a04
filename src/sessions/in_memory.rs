//! In-memory session store implementation.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

use super::traits::{Session, SessionStore, Topic, TopicState};

/// An in-memory session store backed by a mutex-protected hash map.
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<String, Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, user_id: &str) -> Result<Option<Session>> {
        let sessions = self.sessions.lock();
        Ok(sessions.get(user_id).cloned())
    }

    async fn set_topic(&self, user_id: &str, topic: Topic) -> Result<Session> {
        let now = Utc::now();
        let session = Session {
            user_id: user_id.to_string(),
            topic,
            state: TopicState::AwaitingArg,
            created_at: now,
            last_activity: now,
        };

        let mut sessions = self.sessions.lock();
        sessions.insert(user_id.to_string(), session.clone());
        Ok(session)
    }

    async fn set_state(&self, user_id: &str, state: TopicState) -> Result<()> {
        let mut sessions = self.sessions.lock();
        match sessions.get_mut(user_id) {
            Some(session) => {
                session.state = state;
                session.last_activity = Utc::now();
                Ok(())
            }
            None => bail!("no session for user: {user_id}"),
        }
    }

    async fn touch(&self, user_id: &str) -> Result<()> {
        let mut sessions = self.sessions.lock();
        match sessions.get_mut(user_id) {
            Some(session) => {
                session.last_activity = Utc::now();
                Ok(())
            }
            None => bail!("no session for user: {user_id}"),
        }
    }

    async fn clear(&self, user_id: &str) -> Result<()> {
        let mut sessions = self.sessions.lock();
        sessions.remove(user_id);
        Ok(())
    }

    async fn evict_idle(&self, ttl: Duration) -> Result<Vec<String>> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::seconds(0));

        let mut sessions = self.sessions.lock();
        let expired: Vec<String> = sessions
            .values()
            .filter(|s| s.last_activity < cutoff)
            .map(|s| s.user_id.clone())
            .collect();

        for user_id in &expired {
            sessions.remove(user_id);
        }

        Ok(expired)
    }

    async fn count(&self) -> usize {
        self.sessions.lock().len()
    }

    fn name(&self) -> &str {
        "in_memory"
    }
}
