//! The topic router: a state machine over (session state, input class).
//!
//! Every session transition in the system happens here. Backends are invoked
//! between a read and a write of the session store, so each user's dispatch
//! runs under that user's lock; different users proceed concurrently.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use super::traits::{classify, EventRouter, InputKind};
use crate::backends::{BackendError, ConversationalBackend, QueryBackend};
use crate::channels::InboundEvent;
use crate::sessions::{SessionStore, Topic, TopicState};

// ── User-facing reply text ───────────────────────────────────────

const MENU_PROMPT: &str = "請選擇主題：論文(essay)、YouTube(youtube)、餐廳(restaurant)\n\
    Please choose a topic: essay, youtube, restaurant";

const PROMPT_ESSAY: &str = "請提供論文關鍵字：\nPlease provide the keyword of the essay:";

const PROMPT_YOUTUBE: &str = "請提供YouTube影片連結：\nPlease provide the YouTube video link:";

const PROMPT_RESTAURANT: &str =
    "你想問什麼餐廳資訊嗎？\nWhat restaurant information would you like to ask?";

const SELECT_FIRST: &str = "請先輸入「選單」來選擇主題(論文、YouTube、餐廳)\n\
    Please type \"menu\" to choose a topic (essay, YouTube, restaurant)";

const INGESTED: &str = "YouTube影片連結已收到，請問您有什麼問題？(輸入「結束」以結束對話)\n\
    YouTube video link received, what would you like to ask? (type \"end\" to end the conversation)";

const ENDED: &str = "對話已結束，感謝您的使用！(輸入「選單」來開啟選單選擇主題)\n\
    Conversation ended, thank you for using! (type \"menu\" to choose a topic)";

const INVALID_LINK: &str = "這不是有效的YouTube影片連結，請輸入「youtube」重新開始。\n\
    Not a valid YouTube video link. Type \"youtube\" to start over.";

const NO_TRANSCRIPT: &str = "這部影片沒有可用的字幕，請輸入「youtube」改試其他影片。\n\
    This video has no usable captions. Type \"youtube\" to try another video.";

const INGEST_FAILED: &str = "讀取影片逐字稿失敗，請輸入「youtube」重新開始。\n\
    Failed to load the video transcript. Type \"youtube\" to start over.";

const NO_PAPERS: &str = "找不到相關論文，請輸入「選單」重新選擇主題。\n\
    No matching papers found. Type \"menu\" to choose a topic again.";

const QUERY_FAILED: &str = "查詢時發生錯誤，請輸入「選單」重新選擇主題。\n\
    Something went wrong with the query. Type \"menu\" to choose a topic again.";

const ANSWER_FAILED: &str = "回答失敗，請再問一次。\nFailed to answer, please ask again.";

fn selection_prompt(topic: Topic) -> &'static str {
    match topic {
        Topic::Essay => PROMPT_ESSAY,
        Topic::Youtube => PROMPT_YOUTUBE,
        Topic::Restaurant => PROMPT_RESTAURANT,
    }
}

// ── Failure policy ───────────────────────────────────────────────

/// What the user sees for a failed transition, and whether the session is
/// reset to idle. Single-turn topics always reset; a failed YouTube ingest
/// resets so nobody is stuck mid-setup; a failed answer inside a live
/// conversation keeps the session so the user can simply ask again.
fn failure_policy(topic: Topic, state: TopicState, err: &BackendError) -> (&'static str, bool) {
    match (topic, state, err) {
        (Topic::Youtube, TopicState::AwaitingArg, BackendError::InvalidLink(_)) => {
            (INVALID_LINK, true)
        }
        (Topic::Youtube, TopicState::AwaitingArg, BackendError::NoResults) => (NO_TRANSCRIPT, true),
        (Topic::Youtube, TopicState::AwaitingArg, _) => (INGEST_FAILED, true),
        (Topic::Youtube, TopicState::Conversing, _) => (ANSWER_FAILED, false),
        (Topic::Essay, _, BackendError::NoResults) => (NO_PAPERS, true),
        (Topic::Essay | Topic::Restaurant, _, _) => (QUERY_FAILED, true),
    }
}

// ── Router ───────────────────────────────────────────────────────

pub struct TopicRouter {
    sessions: Arc<dyn SessionStore>,
    essay: Arc<dyn QueryBackend>,
    restaurant: Arc<dyn QueryBackend>,
    youtube: Arc<dyn ConversationalBackend>,
    user_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl TopicRouter {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        essay: Arc<dyn QueryBackend>,
        restaurant: Arc<dyn QueryBackend>,
        youtube: Arc<dyn ConversationalBackend>,
    ) -> Self {
        Self {
            sessions,
            essay,
            restaurant,
            youtube,
            user_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Per-user mutual exclusion across the whole read-invoke-write cycle.
    /// Two rapid messages from one user serialize; other users are unaffected.
    async fn user_lock(&self, user_id: &str) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.user_locks.lock();
            locks
                .entry(user_id.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// One-shot topics: answer, reply, and return to idle no matter what.
    async fn single_turn(
        &self,
        backend: &dyn QueryBackend,
        topic: Topic,
        user_id: &str,
        query: &str,
    ) -> Result<Option<String>> {
        let outcome = backend.answer(user_id, query).await;
        self.sessions.clear(user_id).await?;

        match outcome {
            Ok(answer) => Ok(Some(answer)),
            Err(err) => {
                tracing::warn!(user = %user_id, topic = topic.as_str(), error = %err, "backend query failed");
                let (reply, _) = failure_policy(topic, TopicState::AwaitingArg, &err);
                Ok(Some(reply.to_string()))
            }
        }
    }

    async fn ingest_link(&self, user_id: &str, link: &str) -> Result<Option<String>> {
        match self.youtube.ingest(user_id, link).await {
            Ok(()) => {
                self.sessions.set_state(user_id, TopicState::Conversing).await?;
                Ok(Some(INGESTED.to_string()))
            }
            Err(err) => {
                tracing::warn!(user = %user_id, error = %err, "transcript ingestion failed");
                let (reply, clear) = failure_policy(Topic::Youtube, TopicState::AwaitingArg, &err);
                if clear {
                    self.sessions.clear(user_id).await?;
                }
                Ok(Some(reply.to_string()))
            }
        }
    }

    async fn converse(&self, user_id: &str, query: &str) -> Result<Option<String>> {
        match self.youtube.answer(user_id, query).await {
            Ok(answer) => {
                self.sessions.touch(user_id).await?;
                Ok(Some(answer))
            }
            Err(err) => {
                tracing::warn!(user = %user_id, error = %err, "conversation answer failed");
                let (reply, clear) = failure_policy(Topic::Youtube, TopicState::Conversing, &err);
                if clear {
                    self.sessions.clear(user_id).await?;
                } else {
                    self.sessions.touch(user_id).await?;
                }
                Ok(Some(reply.to_string()))
            }
        }
    }

    async fn end_conversation(&self, user_id: &str) -> Result<Option<String>> {
        self.youtube.reset(user_id).await?;
        self.sessions.clear(user_id).await?;
        Ok(Some(ENDED.to_string()))
    }
}

#[async_trait]
impl EventRouter for TopicRouter {
    async fn dispatch(&self, event: &InboundEvent) -> Result<Option<String>> {
        let input = classify(&event.text);
        if input == InputKind::Empty {
            return Ok(None);
        }

        let _guard = self.user_lock(&event.user_id).await;
        let user_id = event.user_id.as_str();

        match input {
            InputKind::Empty => unreachable!("handled above"),

            InputKind::Menu => Ok(Some(MENU_PROMPT.to_string())),

            InputKind::Select(topic) => {
                // Re-selection overwrites the previous session outright; an
                // abandoned YouTube conversation is discarded without reset
                // and its memory is released by the idle sweep.
                self.sessions.set_topic(user_id, topic).await?;
                tracing::info!(user = %user_id, topic = topic.as_str(), "topic selected");
                Ok(Some(selection_prompt(topic).to_string()))
            }

            InputKind::End | InputKind::Text => {
                let Some(session) = self.sessions.get(user_id).await? else {
                    return Ok(Some(SELECT_FIRST.to_string()));
                };

                match (session.topic, session.state) {
                    (Topic::Essay, TopicState::AwaitingArg) => {
                        self.single_turn(self.essay.as_ref(), Topic::Essay, user_id, &event.text)
                            .await
                    }
                    (Topic::Restaurant, TopicState::AwaitingArg) => {
                        self.single_turn(
                            self.restaurant.as_ref(),
                            Topic::Restaurant,
                            user_id,
                            &event.text,
                        )
                        .await
                    }
                    (Topic::Youtube, TopicState::AwaitingArg) => {
                        self.ingest_link(user_id, event.text.trim()).await
                    }
                    (Topic::Youtube, TopicState::Conversing) => {
                        if input == InputKind::End {
                            self.end_conversation(user_id).await
                        } else {
                            self.converse(user_id, &event.text).await
                        }
                    }
                    (topic @ (Topic::Essay | Topic::Restaurant), TopicState::Conversing) => {
                        // Single-turn topics never enter Conversing through
                        // this router; recover by returning the user to idle.
                        tracing::error!(user = %user_id, topic = topic.as_str(), "unexpected conversing state");
                        self.sessions.clear(user_id).await?;
                        Ok(Some(SELECT_FIRST.to_string()))
                    }
                }
            }
        }
    }

    fn name(&self) -> &str {
        "topic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{BackendResult, ConversationalBackend};
    use crate::sessions::InMemorySessionStore;
    use parking_lot::Mutex as PlMutex;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubBackend {
        reply: Option<&'static str>,
        calls: AtomicUsize,
    }

    impl StubBackend {
        fn answering(reply: &'static str) -> Self {
            Self {
                reply: Some(reply),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                reply: None,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl QueryBackend for StubBackend {
        async fn answer(&self, _user_id: &str, _query: &str) -> BackendResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.reply {
                Some(reply) => Ok(reply.to_string()),
                None => Err(BackendError::upstream("backend down")),
            }
        }
        fn name(&self) -> &str {
            "stub"
        }
    }

    struct StubTube {
        ingest_ok: bool,
        answer_reply: Option<&'static str>,
        ingested: PlMutex<HashSet<String>>,
        resets: AtomicUsize,
    }

    impl StubTube {
        fn new() -> Self {
            Self {
                ingest_ok: true,
                answer_reply: Some("from the transcript"),
                ingested: PlMutex::new(HashSet::new()),
                resets: AtomicUsize::new(0),
            }
        }

        fn failing_ingest() -> Self {
            Self {
                ingest_ok: false,
                ..Self::new()
            }
        }

        fn failing_answers() -> Self {
            Self {
                answer_reply: None,
                ..Self::new()
            }
        }
    }

    #[async_trait]
    impl QueryBackend for StubTube {
        async fn answer(&self, user_id: &str, _query: &str) -> BackendResult<String> {
            if !self.ingested.lock().contains(user_id) {
                return Err(BackendError::NotIngested(user_id.to_string()));
            }
            match self.answer_reply {
                Some(reply) => Ok(reply.to_string()),
                None => Err(BackendError::upstream("model down")),
            }
        }
        fn name(&self) -> &str {
            "stub-tube"
        }
    }

    #[async_trait]
    impl ConversationalBackend for StubTube {
        async fn ingest(&self, user_id: &str, source: &str) -> BackendResult<()> {
            if !crate::backends::is_youtube_link(source) {
                return Err(BackendError::InvalidLink(source.to_string()));
            }
            if !self.ingest_ok {
                return Err(BackendError::upstream("caption service down"));
            }
            self.ingested.lock().insert(user_id.to_string());
            Ok(())
        }

        async fn reset(&self, user_id: &str) -> BackendResult<()> {
            self.resets.fetch_add(1, Ordering::SeqCst);
            self.ingested.lock().remove(user_id);
            Ok(())
        }

        fn is_ingested(&self, user_id: &str) -> bool {
            self.ingested.lock().contains(user_id)
        }
    }

    struct Harness {
        sessions: Arc<InMemorySessionStore>,
        essay: Arc<StubBackend>,
        restaurant: Arc<StubBackend>,
        youtube: Arc<StubTube>,
        router: TopicRouter,
    }

    fn harness_with(essay: StubBackend, restaurant: StubBackend, youtube: StubTube) -> Harness {
        let sessions = Arc::new(InMemorySessionStore::new());
        let essay = Arc::new(essay);
        let restaurant = Arc::new(restaurant);
        let youtube = Arc::new(youtube);
        let router = TopicRouter::new(
            sessions.clone(),
            essay.clone(),
            restaurant.clone(),
            youtube.clone(),
        );
        Harness {
            sessions,
            essay,
            restaurant,
            youtube,
            router,
        }
    }

    fn harness() -> Harness {
        harness_with(
            StubBackend::answering("essay answer"),
            StubBackend::answering("restaurant answer"),
            StubTube::new(),
        )
    }

    fn event(text: &str) -> InboundEvent {
        InboundEvent {
            user_id: "U1".to_string(),
            group_id: None,
            text: text.to_string(),
            reply_token: "tok".to_string(),
        }
    }

    async fn send(h: &Harness, text: &str) -> Option<String> {
        h.router.dispatch(&event(text)).await.unwrap()
    }

    #[tokio::test]
    async fn topic_keyword_enters_selecting_state() {
        let h = harness();

        for (keyword, topic) in [
            ("essay", Topic::Essay),
            (" YOUTUBE ", Topic::Youtube),
            ("Restaurant", Topic::Restaurant),
        ] {
            let reply = send(&h, keyword).await.unwrap();
            assert_eq!(reply, selection_prompt(topic));

            let session = h.sessions.get("U1").await.unwrap().unwrap();
            assert_eq!(session.topic, topic);
            assert_eq!(session.state, TopicState::AwaitingArg);
        }
    }

    #[tokio::test]
    async fn menu_replies_without_creating_a_session() {
        let h = harness();
        let reply = send(&h, "Menu").await.unwrap();
        assert_eq!(reply, MENU_PROMPT);
        assert!(h.sessions.get("U1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn idle_text_prompts_for_topic_selection() {
        let h = harness();
        let reply = send(&h, "hello there").await.unwrap();
        assert_eq!(reply, SELECT_FIRST);
        assert!(h.sessions.get("U1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_text_is_silently_dropped() {
        let h = harness();
        assert!(send(&h, "   ").await.is_none());
    }

    #[tokio::test]
    async fn essay_is_single_turn() {
        let h = harness();
        send(&h, "essay").await;

        let reply = send(&h, "transformers").await.unwrap();
        assert_eq!(reply, "essay answer");
        assert_eq!(h.essay.calls.load(Ordering::SeqCst), 1);
        assert!(h.sessions.get("U1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn essay_returns_to_idle_even_on_failure() {
        let h = harness_with(
            StubBackend::failing(),
            StubBackend::answering("unused"),
            StubTube::new(),
        );
        send(&h, "essay").await;

        let reply = send(&h, "transformers").await.unwrap();
        assert_eq!(reply, QUERY_FAILED);
        assert!(h.sessions.get("U1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn restaurant_is_single_turn() {
        let h = harness();
        send(&h, "restaurant").await;

        let reply = send(&h, "when do you open?").await.unwrap();
        assert_eq!(reply, "restaurant answer");
        assert_eq!(h.restaurant.calls.load(Ordering::SeqCst), 1);
        assert!(h.sessions.get("U1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn end_is_plain_text_outside_youtube_conversations() {
        let h = harness();
        send(&h, "essay").await;

        let reply = send(&h, "end").await.unwrap();
        assert_eq!(reply, "essay answer");
        assert_eq!(h.essay.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalid_link_clears_back_to_idle() {
        let h = harness();
        send(&h, "youtube").await;

        let reply = send(&h, "not-a-link").await.unwrap();
        assert_eq!(reply, INVALID_LINK);
        assert!(h.sessions.get("U1").await.unwrap().is_none());
        assert!(!h.youtube.is_ingested("U1"));
    }

    #[tokio::test]
    async fn ingest_failure_clears_back_to_idle() {
        let h = harness_with(
            StubBackend::answering("unused"),
            StubBackend::answering("unused"),
            StubTube::failing_ingest(),
        );
        send(&h, "youtube").await;

        let reply = send(&h, "https://youtu.be/abc123").await.unwrap();
        assert_eq!(reply, INGEST_FAILED);
        assert!(h.sessions.get("U1").await.unwrap().is_none());
        assert!(!h.youtube.is_ingested("U1"));
    }

    #[tokio::test]
    async fn reselection_overwrites_without_reset() {
        let h = harness();
        send(&h, "youtube").await;
        send(&h, "https://youtu.be/abc123").await;

        let session = h.sessions.get("U1").await.unwrap().unwrap();
        assert_eq!(session.state, TopicState::Conversing);

        let reply = send(&h, "restaurant").await.unwrap();
        assert_eq!(reply, PROMPT_RESTAURANT);

        let session = h.sessions.get("U1").await.unwrap().unwrap();
        assert_eq!(session.topic, Topic::Restaurant);
        assert_eq!(session.state, TopicState::AwaitingArg);
        assert_eq!(h.youtube.resets.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn conversing_answer_failure_keeps_the_session() {
        let h = harness_with(
            StubBackend::answering("unused"),
            StubBackend::answering("unused"),
            StubTube::failing_answers(),
        );
        send(&h, "youtube").await;
        send(&h, "https://youtu.be/abc123").await;

        let reply = send(&h, "what is this about?").await.unwrap();
        assert_eq!(reply, ANSWER_FAILED);

        let session = h.sessions.get("U1").await.unwrap().unwrap();
        assert_eq!(session.state, TopicState::Conversing);
    }

    #[tokio::test]
    async fn full_youtube_scenario() {
        let h = harness();

        // Menu prompts without creating a session.
        assert_eq!(send(&h, "Menu").await.unwrap(), MENU_PROMPT);
        assert!(h.sessions.get("U1").await.unwrap().is_none());

        // Topic selection prompts for a link.
        assert_eq!(send(&h, "youtube").await.unwrap(), PROMPT_YOUTUBE);
        let session = h.sessions.get("U1").await.unwrap().unwrap();
        assert_eq!(session.state, TopicState::AwaitingArg);

        // A valid link ingests and moves to conversing.
        assert_eq!(send(&h, "https://youtu.be/abc123").await.unwrap(), INGESTED);
        let session = h.sessions.get("U1").await.unwrap().unwrap();
        assert_eq!(session.state, TopicState::Conversing);

        // Questions are answered in place.
        assert_eq!(
            send(&h, "What is this video about?").await.unwrap(),
            "from the transcript"
        );
        let session = h.sessions.get("U1").await.unwrap().unwrap();
        assert_eq!(session.state, TopicState::Conversing);

        // Exit clears both the session and the backend memory.
        assert_eq!(send(&h, " End ").await.unwrap(), ENDED);
        assert!(h.sessions.get("U1").await.unwrap().is_none());
        assert!(!h.youtube.is_ingested("U1"));
        assert_eq!(h.youtube.resets.load(Ordering::SeqCst), 1);

        // The next message requires topic reselection.
        assert_eq!(send(&h, "another question").await.unwrap(), SELECT_FIRST);
    }

    #[tokio::test]
    async fn users_are_isolated() {
        let h = harness();
        send(&h, "youtube").await;

        let other = InboundEvent {
            user_id: "U2".to_string(),
            group_id: None,
            text: "essay".to_string(),
            reply_token: "tok2".to_string(),
        };
        h.router.dispatch(&other).await.unwrap();

        assert_eq!(
            h.sessions.get("U1").await.unwrap().unwrap().topic,
            Topic::Youtube
        );
        assert_eq!(
            h.sessions.get("U2").await.unwrap().unwrap().topic,
            Topic::Essay
        );
    }

    #[test]
    fn failure_policy_matches_the_table() {
        let invalid = BackendError::InvalidLink("x".to_string());
        let upstream = BackendError::upstream("boom");
        let empty = BackendError::NoResults;

        assert_eq!(
            failure_policy(Topic::Youtube, TopicState::AwaitingArg, &invalid),
            (INVALID_LINK, true)
        );
        assert_eq!(
            failure_policy(Topic::Youtube, TopicState::AwaitingArg, &empty),
            (NO_TRANSCRIPT, true)
        );
        assert_eq!(
            failure_policy(Topic::Youtube, TopicState::Conversing, &upstream),
            (ANSWER_FAILED, false)
        );
        assert_eq!(
            failure_policy(Topic::Essay, TopicState::AwaitingArg, &empty),
            (NO_PAPERS, true)
        );
        assert_eq!(
            failure_policy(Topic::Restaurant, TopicState::AwaitingArg, &upstream),
            (QUERY_FAILED, true)
        );
    }
}
