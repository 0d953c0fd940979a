//! Configuration parsing and validation.
//!
//! repo-oracle reads a TOML file with one section per concern. Every field
//! has a default, so an empty file (or no file at all) is a valid config
//! with all network providers disabled.
//!
//! # Example
//!
//! ```toml
//! [chat]
//! provider = "openai"
//! model = "gpt-4o"
//!
//! [summarizer]
//! provider = "openai"
//! model = "gpt-4o-mini"
//!
//! [embedding]
//! provider = "ollama"
//! model = "nomic-embed-text"
//! dims = 768
//!
//! [web_search]
//! provider = "tavily"
//!
//! [retrieval]
//! top_k = 10
//! ```
//!
//! Secrets are never read from this file. Each provider names the
//! environment variable holding its key via `api_key_env`.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use oracle_core::agent::TransitionPolicy;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub summarizer: ChatConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub web_search: WebSearchConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub sql: SqlConfig,
}

/// A chat-completion provider. Used for both `[chat]` and `[summarizer]`.
#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Base URL. Defaults per provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_openai_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_chat_retries")]
    pub max_retries: u32,
    #[serde(default = "default_chat_timeout")]
    pub timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: None,
            url: None,
            api_key_env: default_openai_key_env(),
            temperature: 0.0,
            max_retries: default_chat_retries(),
            timeout_secs: default_chat_timeout(),
        }
    }
}

impl ChatConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_disabled() -> String {
    "disabled".to_string()
}
fn default_openai_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_chat_retries() -> u32 {
    2
}
fn default_chat_timeout() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_openai_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: None,
            dims: None,
            url: None,
            api_key_env: default_openai_key_env(),
            batch_size: default_batch_size(),
            max_retries: default_embedding_retries(),
            timeout_secs: default_embedding_timeout(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_batch_size() -> usize {
    64
}
fn default_embedding_retries() -> u32 {
    5
}
fn default_embedding_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebSearchConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default = "default_tavily_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_web_results")]
    pub max_results: usize,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            api_key_env: default_tavily_key_env(),
            max_results: default_web_results(),
            url: None,
            timeout_secs: default_embedding_timeout(),
        }
    }
}

fn default_tavily_key_env() -> String {
    "TAVILY_API_KEY".to_string()
}
fn default_web_results() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Matches returned by the `retrieve_context` tool.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Matches printed by `oracle search`.
    #[serde(default = "default_search_k")]
    pub search_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            search_k: default_search_k(),
        }
    }
}

fn default_top_k() -> usize {
    10
}
fn default_search_k() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

impl ChunkingConfig {
    pub fn policy(&self) -> oracle_core::chunk::ChunkingPolicy {
        oracle_core::chunk::ChunkingPolicy {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
        }
    }
}

fn default_chunk_size() -> usize {
    oracle_core::chunk::DEFAULT_CHUNK_SIZE
}
fn default_chunk_overlap() -> usize {
    oracle_core::chunk::DEFAULT_CHUNK_OVERLAP
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    #[serde(default = "default_summarize_after")]
    pub summarize_after: usize,
    #[serde(default = "default_retain_recent")]
    pub retain_recent: usize,
    /// State transitions allowed per user turn.
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    /// Checkpoint snapshots kept per conversation thread.
    #[serde(default = "default_checkpoint_retention")]
    pub checkpoint_retention: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            summarize_after: default_summarize_after(),
            retain_recent: default_retain_recent(),
            max_steps: default_max_steps(),
            checkpoint_retention: default_checkpoint_retention(),
        }
    }
}

fn default_summarize_after() -> usize {
    oracle_core::agent::DEFAULT_SUMMARIZE_AFTER
}
fn default_retain_recent() -> usize {
    oracle_core::agent::DEFAULT_RETAIN_RECENT
}
fn default_max_steps() -> usize {
    50
}
fn default_checkpoint_retention() -> usize {
    crate::checkpoint::DEFAULT_RETENTION
}

#[derive(Debug, Deserialize, Clone)]
pub struct SqlConfig {
    /// Rows the generator is told to limit itself to.
    #[serde(default = "default_sql_top_k")]
    pub top_k: usize,
    /// Hard cap on rows returned by the execution stage.
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,
}

impl Default for SqlConfig {
    fn default() -> Self {
        Self {
            top_k: default_sql_top_k(),
            max_rows: default_max_rows(),
        }
    }
}

fn default_sql_top_k() -> usize {
    5
}
fn default_max_rows() -> usize {
    100
}

/// `$HOME/.oracle/config.toml`, or a relative fallback without a home dir.
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".oracle").join("config.toml"))
        .unwrap_or_else(|| PathBuf::from(".oracle-config.toml"))
}

/// Load and validate the config at `path`. A missing file yields defaults.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
        .with_context(|| format!("Invalid config file: {}", path.display()))
}

/// Parse and validate TOML config text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).context("Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_size == 0 {
        bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        bail!("chunking.chunk_overlap must be smaller than chunking.chunk_size");
    }

    if config.retrieval.top_k < 1 || config.retrieval.search_k < 1 {
        bail!("retrieval.top_k and retrieval.search_k must be >= 1");
    }

    let policy = TransitionPolicy {
        summarize_after: config.agent.summarize_after,
        retain_recent: config.agent.retain_recent,
    };
    if !policy.terminates() {
        bail!(
            "agent.summarize_after must be >= agent.retain_recent + 2 ({}), \
             or every answer after a summary triggers another summary",
            policy.min_summarize_after()
        );
    }
    if config.agent.max_steps == 0 {
        bail!("agent.max_steps must be > 0");
    }
    if config.agent.checkpoint_retention == 0 {
        bail!("agent.checkpoint_retention must be > 0");
    }

    if config.sql.max_rows == 0 {
        bail!("sql.max_rows must be > 0");
    }

    for (section, chat) in [("chat", &config.chat), ("summarizer", &config.summarizer)] {
        match chat.provider.as_str() {
            "disabled" => {}
            "openai" | "ollama" => {
                if chat.model.is_none() {
                    bail!(
                        "{}.model must be specified when provider is '{}'",
                        section,
                        chat.provider
                    );
                }
            }
            other => bail!(
                "Unknown {} provider: '{}'. Must be disabled, openai, or ollama.",
                section,
                other
            ),
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }
    if config.embedding.is_enabled() {
        if config.embedding.dims.unwrap_or(0) == 0 {
            bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.web_search.provider.as_str() {
        "disabled" | "tavily" => {}
        other => bail!(
            "Unknown web_search provider: '{}'. Must be disabled or tavily.",
            other
        ),
    }

    Ok(())
}

/// Commented template written by `oracle config`.
pub const CONFIG_TEMPLATE: &str = r#"# repo-oracle configuration
#
# API keys are read from the environment variables named by `api_key_env`.

[chat]
provider = "openai"            # disabled | openai | ollama
model = "gpt-4o"
# url = "https://api.openai.com/v1"
# api_key_env = "OPENAI_API_KEY"
temperature = 0.0

[summarizer]
provider = "openai"
model = "gpt-4o-mini"

[embedding]
provider = "openai"            # disabled | openai | ollama
model = "text-embedding-3-small"
dims = 1536
batch_size = 64

[web_search]
provider = "tavily"            # disabled | tavily
# api_key_env = "TAVILY_API_KEY"
max_results = 3

[retrieval]
top_k = 10
search_k = 4

[chunking]
chunk_size = 1500
chunk_overlap = 200

[agent]
summarize_after = 12
retain_recent = 2
max_steps = 50
checkpoint_retention = 20

[sql]
top_k = 5
max_rows = 100
"#;
