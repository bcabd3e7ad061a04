//! YouTube transcript Q&A backend.
//!
//! Requires one-time ingestion of a video link before answering: the
//! transcript is fetched, chunked, and kept per user together with that
//! user's conversation history. Nothing is shared between users, so
//! concurrent conversations on different videos cannot corrupt each other.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use super::retrieval;
use super::traits::{BackendError, BackendResult, ConversationalBackend, QueryBackend};
use crate::config::YoutubeConfig;
use crate::providers::{ChatMessage, Provider};

const CONTEXT_CHUNKS: usize = 4;

static YOUTUBE_LINK: OnceLock<Regex> = OnceLock::new();

/// Whether a string looks like a YouTube video link.
pub fn is_youtube_link(link: &str) -> bool {
    let re = YOUTUBE_LINK.get_or_init(|| {
        Regex::new(
            r"^https?://(www\.|m\.)?(youtube\.com/(watch\?\S*v=[\w-]{6,}|shorts/[\w-]{6,}|live/[\w-]{6,})|youtu\.be/[\w-]{6,})",
        )
        .expect("valid youtube link pattern")
    });
    re.is_match(link.trim())
}

/// Fetches the transcript text for a video link.
///
/// A seam so the backend can be exercised without the network.
#[async_trait]
pub trait TranscriptFetcher: Send + Sync {
    /// Fetch the full transcript text. An empty result means the video has
    /// no captions.
    async fn fetch(&self, link: &str) -> Result<String>;

    /// The name of this fetcher implementation.
    fn name(&self) -> &str;
}

/// Fetches transcripts from YouTube's caption tracks: the watch page names a
/// timedtext URL, which serves the captions as XML.
pub struct HttpTranscriptFetcher {
    client: Client,
}

impl HttpTranscriptFetcher {
    pub fn new() -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }
}

impl Default for HttpTranscriptFetcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Pull the first caption-track URL out of a watch-page document.
pub(crate) fn extract_caption_url(html: &str) -> Option<String> {
    let tracks_at = html.find("\"captionTracks\":")?;
    let rest = &html[tracks_at..];

    let marker = "\"baseUrl\":\"";
    let base_at = rest.find(marker)?;
    let start = base_at + marker.len();
    let len = rest[start..].find('"')?;

    let raw = &rest[start..start + len];
    Some(raw.replace("\\u0026", "&").replace("\\/", "/"))
}

/// Flatten a timedtext XML document into transcript text.
pub(crate) fn parse_timedtext(xml: &str) -> String {
    let mut reader = Reader::from_str(xml);
    let mut parts: Vec<String> = Vec::new();
    let mut in_text = false;
    let mut buf = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"text" => {
                in_text = true;
                buf.clear();
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == b"text" => {
                in_text = false;
                let text = buf.trim();
                if !text.is_empty() {
                    parts.push(text.to_string());
                }
            }
            Ok(Event::Text(e)) if in_text => {
                if let Ok(decoded) = e.decode() {
                    buf.push_str(&decoded);
                }
            }
            Ok(Event::GeneralRef(e)) if in_text => {
                if let Ok(name) = e.decode() {
                    if let Ok(resolved) = quick_xml::escape::unescape(&format!("&{};", name)) {
                        buf.push_str(&resolved);
                    }
                }
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
    }

    parts.join(" ")
}

#[async_trait]
impl TranscriptFetcher for HttpTranscriptFetcher {
    async fn fetch(&self, link: &str) -> Result<String> {
        let page = self
            .client
            .get(link.trim())
            .send()
            .await
            .context("failed to fetch watch page")?
            .text()
            .await
            .context("failed to read watch page")?;

        let caption_url =
            extract_caption_url(&page).ok_or_else(|| anyhow!("video has no caption tracks"))?;

        let xml = self
            .client
            .get(&caption_url)
            .send()
            .await
            .context("failed to fetch caption track")?
            .text()
            .await
            .context("failed to read caption track")?;

        Ok(parse_timedtext(&xml))
    }

    fn name(&self) -> &str {
        "timedtext"
    }
}

// ── Backend ──────────────────────────────────────────────────────

/// Per-user ingestion state: the source link, the chunked transcript, and
/// the running conversation.
#[derive(Debug, Clone)]
struct IngestionRecord {
    source: String,
    chunks: Vec<String>,
    history: Vec<ChatMessage>,
}

pub struct YoutubeBackend {
    provider: Arc<dyn Provider>,
    fetcher: Box<dyn TranscriptFetcher>,
    records: Mutex<HashMap<String, IngestionRecord>>,
    history_turns: usize,
    chunk_words: usize,
    chunk_overlap: usize,
}

impl YoutubeBackend {
    pub fn new(
        provider: Arc<dyn Provider>,
        fetcher: Box<dyn TranscriptFetcher>,
        config: &YoutubeConfig,
    ) -> Self {
        Self {
            provider,
            fetcher,
            records: Mutex::new(HashMap::new()),
            history_turns: config.history_turns.max(1),
            chunk_words: config.chunk_words,
            chunk_overlap: config.chunk_overlap,
        }
    }

    /// The role prompt carried over from the original deployment: a
    /// multilingual video-content expert that answers from the transcript
    /// and politely declines anything outside it.
    fn role_prompt(excerpts: &[&str]) -> String {
        let mut prompt = String::new();
        prompt.push_str("你的目的是協助民眾了解影片內提到的內容。\n");
        prompt.push_str("你是一位根據影片內容而設的專家，懂多國語言。\n");
        prompt.push_str(
            "請負責從提供的逐字稿和歷史談話中找到答案。\n\
             若提問與該影片的逐字稿內容無關，或是資料來源無法找到相關的資訊，\
             請以禮貌的方式拒絕，並清楚告知你的服務範圍。\n",
        );
        prompt.push_str(
            "語氣應該是友善和耐心的，風格應該是清晰和簡潔的，\
             請盡量以條列式的方式回答，請全部用使用者詢問的語言回應。\n\n",
        );
        prompt.push_str("影片逐字稿節錄 Transcript excerpts:\n");
        for excerpt in excerpts {
            prompt.push_str("---\n");
            prompt.push_str(excerpt);
            prompt.push('\n');
        }
        prompt
    }
}

#[async_trait]
impl QueryBackend for YoutubeBackend {
    async fn answer(&self, user_id: &str, query: &str) -> BackendResult<String> {
        // Snapshot context under the lock, then release it across the
        // provider call.
        let (excerpt_prompt, history) = {
            let records = self.records.lock();
            let record = records
                .get(user_id)
                .ok_or_else(|| BackendError::NotIngested(user_id.to_string()))?;

            let excerpts = retrieval::rank(query, &record.chunks, CONTEXT_CHUNKS);
            (Self::role_prompt(&excerpts), record.history.clone())
        };

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(excerpt_prompt));
        messages.extend(history);
        messages.push(ChatMessage::user(query));

        let response = self
            .provider
            .chat(&messages)
            .await
            .map_err(BackendError::upstream)?;

        // The user may have exited mid-flight; only record the turn if the
        // ingestion record is still alive.
        let mut records = self.records.lock();
        if let Some(record) = records.get_mut(user_id) {
            record.history.push(ChatMessage::user(query));
            record.history.push(ChatMessage::assistant(response.clone()));

            let max_entries = self.history_turns * 2;
            if record.history.len() > max_entries {
                let excess = record.history.len() - max_entries;
                record.history.drain(..excess);
            }
        }

        Ok(response)
    }

    fn name(&self) -> &str {
        "youtube"
    }
}

#[async_trait]
impl ConversationalBackend for YoutubeBackend {
    async fn ingest(&self, user_id: &str, source: &str) -> BackendResult<()> {
        let source = source.trim();
        if !is_youtube_link(source) {
            return Err(BackendError::InvalidLink(source.to_string()));
        }

        let transcript = self
            .fetcher
            .fetch(source)
            .await
            .map_err(BackendError::upstream)?;

        let chunks = retrieval::chunk_words(&transcript, self.chunk_words, self.chunk_overlap);
        if chunks.is_empty() {
            return Err(BackendError::NoResults);
        }

        tracing::info!(user = %user_id, source = %source, chunks = chunks.len(), "transcript ingested");

        let mut records = self.records.lock();
        records.insert(
            user_id.to_string(),
            IngestionRecord {
                source: source.to_string(),
                chunks,
                history: Vec::new(),
            },
        );
        Ok(())
    }

    async fn reset(&self, user_id: &str) -> BackendResult<()> {
        let removed = self.records.lock().remove(user_id);
        if let Some(record) = removed {
            tracing::debug!(user = %user_id, source = %record.source, "conversation memory cleared");
        }
        Ok(())
    }

    fn is_ingested(&self, user_id: &str) -> bool {
        self.records.lock().contains_key(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedFetcher {
        transcript: &'static str,
    }

    #[async_trait]
    impl TranscriptFetcher for FixedFetcher {
        async fn fetch(&self, _link: &str) -> Result<String> {
            Ok(self.transcript.to_string())
        }
        fn name(&self) -> &str {
            "fixed"
        }
    }

    struct FailingFetcher;

    #[async_trait]
    impl TranscriptFetcher for FailingFetcher {
        async fn fetch(&self, _link: &str) -> Result<String> {
            Err(anyhow!("caption service unavailable"))
        }
        fn name(&self) -> &str {
            "failing"
        }
    }

    struct EchoProvider;

    #[async_trait]
    impl Provider for EchoProvider {
        async fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
            Ok(format!("echo: {}", messages.last().unwrap().content))
        }
        fn name(&self) -> &str {
            "echo"
        }
    }

    fn backend(fetcher: Box<dyn TranscriptFetcher>) -> YoutubeBackend {
        YoutubeBackend::new(Arc::new(EchoProvider), fetcher, &YoutubeConfig::default())
    }

    #[test]
    fn link_validation_accepts_common_shapes() {
        assert!(is_youtube_link("https://youtu.be/abc123"));
        assert!(is_youtube_link("https://www.youtube.com/watch?v=dQw4w9WgXcQ"));
        assert!(is_youtube_link("  https://m.youtube.com/watch?v=dQw4w9WgXcQ  "));
        assert!(is_youtube_link("https://youtube.com/shorts/abc12345"));
    }

    #[test]
    fn link_validation_rejects_non_links() {
        assert!(!is_youtube_link("not-a-link"));
        assert!(!is_youtube_link("https://example.com/watch?v=abc123"));
        assert!(!is_youtube_link("youtube.com/watch?v=abc123"));
        assert!(!is_youtube_link(""));
    }

    #[test]
    fn extract_caption_url_unescapes() {
        let html = r#"stuff "captionTracks":[{"baseUrl":"https:\/\/www.youtube.com\/api\/timedtext?v=x&lang=en","name":{}}] more"#;
        assert_eq!(
            extract_caption_url(html).unwrap(),
            "https://www.youtube.com/api/timedtext?v=x&lang=en"
        );
    }

    #[test]
    fn extract_caption_url_missing_tracks() {
        assert!(extract_caption_url("<html>no captions here</html>").is_none());
    }

    #[test]
    fn parse_timedtext_joins_and_unescapes() {
        let xml = r#"<?xml version="1.0"?><transcript>
            <text start="0.0" dur="1.0">Hello &amp; welcome</text>
            <text start="1.0" dur="2.0">to the video</text>
        </transcript>"#;
        assert_eq!(parse_timedtext(xml), "Hello & welcome to the video");
    }

    #[tokio::test]
    async fn ingest_rejects_invalid_link() {
        let backend = backend(Box::new(FixedFetcher { transcript: "words" }));
        let err = backend.ingest("user-1", "not-a-link").await.unwrap_err();
        assert!(matches!(err, BackendError::InvalidLink(_)));
        assert!(!backend.is_ingested("user-1"));
    }

    #[tokio::test]
    async fn ingest_surfaces_fetch_failure_without_record() {
        let backend = backend(Box::new(FailingFetcher));
        let err = backend
            .ingest("user-1", "https://youtu.be/abc123")
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Upstream(_)));
        assert!(!backend.is_ingested("user-1"));
    }

    #[tokio::test]
    async fn ingest_rejects_empty_transcript() {
        let backend = backend(Box::new(FixedFetcher { transcript: "  " }));
        let err = backend
            .ingest("user-1", "https://youtu.be/abc123")
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::NoResults));
    }

    #[tokio::test]
    async fn answer_before_ingest_fails_loudly() {
        let backend = backend(Box::new(FixedFetcher { transcript: "words" }));
        let err = backend.answer("user-1", "what?").await.unwrap_err();
        assert!(matches!(err, BackendError::NotIngested(_)));
    }

    #[tokio::test]
    async fn answer_after_ingest_records_history() {
        let backend = backend(Box::new(FixedFetcher {
            transcript: "the video explains rust ownership and borrowing",
        }));
        backend
            .ingest("user-1", "https://youtu.be/abc123")
            .await
            .unwrap();

        let reply = backend.answer("user-1", "what is it about?").await.unwrap();
        assert_eq!(reply, "echo: what is it about?");

        let records = backend.records.lock();
        let history = &records.get("user-1").unwrap().history;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, "user");
        assert_eq!(history[1].role, "assistant");
    }

    #[tokio::test]
    async fn history_is_bounded_per_user() {
        let config = YoutubeConfig {
            history_turns: 2,
            ..YoutubeConfig::default()
        };
        let backend = YoutubeBackend::new(
            Arc::new(EchoProvider),
            Box::new(FixedFetcher { transcript: "words about things" }),
            &config,
        );
        backend
            .ingest("user-1", "https://youtu.be/abc123")
            .await
            .unwrap();

        for i in 0..5 {
            backend
                .answer("user-1", &format!("question {i}"))
                .await
                .unwrap();
        }

        let records = backend.records.lock();
        let history = &records.get("user-1").unwrap().history;
        assert_eq!(history.len(), 4);
        assert_eq!(history[0].content, "question 3");
    }

    #[tokio::test]
    async fn reset_clears_only_that_user() {
        let backend = backend(Box::new(FixedFetcher { transcript: "words" }));
        backend
            .ingest("user-1", "https://youtu.be/abc123")
            .await
            .unwrap();
        backend
            .ingest("user-2", "https://youtu.be/def456")
            .await
            .unwrap();

        backend.reset("user-1").await.unwrap();
        assert!(!backend.is_ingested("user-1"));
        assert!(backend.is_ingested("user-2"));

        // Resetting an unknown user is a no-op.
        backend.reset("stranger").await.unwrap();
    }
}
