//! Session management — tracks each user's active topic and its sub-state.

pub mod in_memory;
pub mod traits;

pub use in_memory::InMemorySessionStore;
pub use traits::{Session, SessionStore, Topic, TopicState};

use std::sync::Arc;

/// Create a default in-memory session store.
pub fn create_session_store() -> Arc<dyn SessionStore> {
    Arc::new(InMemorySessionStore::new())
}
