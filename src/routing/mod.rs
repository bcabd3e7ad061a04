//! Topic routing — the conversation state machine and input classification.

pub mod topic;
pub mod traits;

pub use topic::TopicRouter;
pub use traits::{classify, EventRouter, InputKind};

use crate::backends::{ConversationalBackend, QueryBackend};
use crate::sessions::SessionStore;
use std::sync::Arc;

/// Create the topic router over its injected collaborators.
pub fn create_router(
    sessions: Arc<dyn SessionStore>,
    essay: Arc<dyn QueryBackend>,
    restaurant: Arc<dyn QueryBackend>,
    youtube: Arc<dyn ConversationalBackend>,
) -> Arc<dyn EventRouter> {
    Arc::new(TopicRouter::new(sessions, essay, restaurant, youtube))
}
