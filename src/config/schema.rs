use anyhow::{Context, Result};
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

// ── Top-level config ──────────────────────────────────────────────

/// Top-level topicbot configuration, loaded from `config.toml`.
///
/// Resolution order: `TOPICBOT_CONFIG_DIR` env → `~/.topicbot/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to config.toml - computed at load time, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Webhook server configuration (`[gateway]`).
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// LINE Messaging API configuration (`[line]`).
    #[serde(default)]
    pub line: LineConfig,

    /// Model provider configuration (`[provider]`).
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Topic backend configuration (`[backends]`).
    #[serde(default)]
    pub backends: BackendsConfig,

    /// Session lifecycle configuration (`[sessions]`).
    #[serde(default)]
    pub sessions: SessionsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_path: PathBuf::new(),
            gateway: GatewayConfig::default(),
            line: LineConfig::default(),
            provider: ProviderConfig::default(),
            backends: BackendsConfig::default(),
            sessions: SessionsConfig::default(),
        }
    }
}

/// Webhook server configuration (`[gateway]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Bind host (default: 127.0.0.1)
    #[serde(default = "default_gateway_host")]
    pub host: String,
    /// Bind port (default: 3000)
    #[serde(default = "default_gateway_port")]
    pub port: u16,
}

fn default_gateway_host() -> String {
    "127.0.0.1".into()
}

fn default_gateway_port() -> u16 {
    3000
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_gateway_host(),
            port: default_gateway_port(),
        }
    }
}

/// LINE Messaging API configuration (`[line]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineConfig {
    /// Channel access token. Overridden by `LINE_CHANNEL_ACCESS_TOKEN`.
    /// Never logged; use [`crate::config::redact`] for any diagnostics.
    pub channel_access_token: Option<String>,
    /// Reply endpoint (default: the official LINE reply API).
    #[serde(default = "default_line_reply_url")]
    pub reply_url: String,
}

fn default_line_reply_url() -> String {
    "https://api.line.me/v2/bot/message/reply".into()
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            channel_access_token: None,
            reply_url: default_line_reply_url(),
        }
    }
}

/// Model provider configuration (`[provider]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider key (default: `"ollama"`).
    #[serde(default = "default_provider_kind")]
    pub kind: String,
    /// Provider base URL. Overridden by `TOPICBOT_PROVIDER_URL`.
    #[serde(default = "default_provider_base_url")]
    pub base_url: String,
    /// Model name (default: `"llama3.2"`).
    #[serde(default = "default_provider_model")]
    pub model: String,
    /// Sampling temperature (default: `0.5`).
    #[serde(default = "default_provider_temperature")]
    pub temperature: f64,
    /// Per-request timeout in seconds. Inference on modest hardware is slow;
    /// default: `600`.
    #[serde(default = "default_provider_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_provider_kind() -> String {
    "ollama".into()
}

fn default_provider_base_url() -> String {
    "http://127.0.0.1:11434".into()
}

fn default_provider_model() -> String {
    "llama3.2".into()
}

fn default_provider_temperature() -> f64 {
    0.5
}

fn default_provider_timeout_secs() -> u64 {
    600
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: default_provider_kind(),
            base_url: default_provider_base_url(),
            model: default_provider_model(),
            temperature: default_provider_temperature(),
            request_timeout_secs: default_provider_timeout_secs(),
        }
    }
}

/// Topic backend configuration (`[backends]` section).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendsConfig {
    #[serde(default)]
    pub essay: EssayConfig,
    #[serde(default)]
    pub youtube: YoutubeConfig,
    #[serde(default)]
    pub restaurant: RestaurantConfig,
}

/// Essay lookup configuration (`[backends.essay]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EssayConfig {
    /// arXiv query endpoint.
    #[serde(default = "default_essay_api_url")]
    pub api_url: String,
    /// Number of search results to retrieve; the most relevant is answered.
    #[serde(default = "default_essay_max_results")]
    pub max_results: usize,
}

fn default_essay_api_url() -> String {
    "https://export.arxiv.org/api/query".into()
}

fn default_essay_max_results() -> usize {
    1
}

impl Default for EssayConfig {
    fn default() -> Self {
        Self {
            api_url: default_essay_api_url(),
            max_results: default_essay_max_results(),
        }
    }
}

/// YouTube transcript Q&A configuration (`[backends.youtube]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YoutubeConfig {
    /// Maximum retained conversation turns per user (a turn is one
    /// question/answer pair).
    #[serde(default = "default_youtube_history_turns")]
    pub history_turns: usize,
    /// Transcript chunk size in words.
    #[serde(default = "default_youtube_chunk_words")]
    pub chunk_words: usize,
    /// Overlap between adjacent chunks in words.
    #[serde(default = "default_youtube_chunk_overlap")]
    pub chunk_overlap: usize,
}

fn default_youtube_history_turns() -> usize {
    20
}

fn default_youtube_chunk_words() -> usize {
    300
}

fn default_youtube_chunk_overlap() -> usize {
    50
}

impl Default for YoutubeConfig {
    fn default() -> Self {
        Self {
            history_turns: default_youtube_history_turns(),
            chunk_words: default_youtube_chunk_words(),
            chunk_overlap: default_youtube_chunk_overlap(),
        }
    }
}

/// Restaurant info configuration (`[backends.restaurant]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestaurantConfig {
    /// Directory holding `faq.qa`, `blog.md`, and `google-map.json`.
    #[serde(default = "default_restaurant_data_dir")]
    pub data_dir: PathBuf,
}

fn default_restaurant_data_dir() -> PathBuf {
    PathBuf::from("data/restaurant")
}

impl Default for RestaurantConfig {
    fn default() -> Self {
        Self {
            data_dir: default_restaurant_data_dir(),
        }
    }
}

/// Session lifecycle configuration (`[sessions]` section).
///
/// Abandoned conversations would otherwise hold per-user transcript memory
/// forever; the sweep evicts them after the idle timeout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Seconds of inactivity before a session is evicted (default: 1800).
    #[serde(default = "default_session_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Seconds between eviction sweeps (default: 60).
    #[serde(default = "default_session_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_session_idle_timeout_secs() -> u64 {
    1800
}

fn default_session_sweep_interval_secs() -> u64 {
    60
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_session_idle_timeout_secs(),
            sweep_interval_secs: default_session_sweep_interval_secs(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl Config {
    /// Resolve the config directory: `TOPICBOT_CONFIG_DIR` env override, else
    /// `~/.topicbot`.
    pub fn config_dir() -> Result<PathBuf> {
        if let Ok(dir) = std::env::var("TOPICBOT_CONFIG_DIR") {
            let trimmed = dir.trim();
            if !trimmed.is_empty() {
                return Ok(PathBuf::from(trimmed));
            }
        }

        let user_dirs = UserDirs::new().context("could not determine home directory")?;
        Ok(user_dirs.home_dir().join(".topicbot"))
    }

    /// Load `config.toml`, writing a starter file with defaults on first run.
    pub async fn load_or_init() -> Result<Self> {
        let dir = Self::config_dir()?;
        let path = dir.join("config.toml");

        if !path.exists() {
            fs::create_dir_all(&dir)
                .await
                .with_context(|| format!("failed to create config dir {}", dir.display()))?;
            let starter = toml::to_string_pretty(&Config::default())
                .context("failed to serialize default config")?;
            fs::write(&path, starter)
                .await
                .with_context(|| format!("failed to write {}", path.display()))?;
            tracing::info!(path = %path.display(), "wrote starter config");
        }

        Self::load_from(&path).await
    }

    /// Load configuration from an explicit path.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let mut config: Config =
            toml::from_str(&raw).with_context(|| format!("invalid TOML in {}", path.display()))?;
        config.config_path = path.to_path_buf();
        Ok(config)
    }

    /// Apply environment variable overrides. Called once after load.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(token) = std::env::var("LINE_CHANNEL_ACCESS_TOKEN") {
            let token = token.trim();
            if !token.is_empty() {
                self.line.channel_access_token = Some(token.to_string());
            }
        }

        if let Ok(url) = std::env::var("TOPICBOT_PROVIDER_URL") {
            let url = url.trim();
            if !url.is_empty() {
                self.provider.base_url = url.to_string();
            }
        }
    }
}
