use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub knowledge: KnowledgeConfig,
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub notion: NotionConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KnowledgeConfig {
    /// Directory of plain-text knowledge files.
    pub dir: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    /// Where the last-known corpus fingerprint is persisted. Defaults to
    /// `fingerprint.json` next to the database file.
    #[serde(default)]
    pub fingerprint_path: Option<PathBuf>,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.txt".to_string(), "**/*.md".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    #[serde(default = "default_overlap")]
    pub overlap_chars: usize,
}

fn default_overlap() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `"openai"`, `"hash"` (deterministic local), or `"disabled"`.
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: None,
            dims: default_dims(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    /// `"openai"` (any OpenAI-compatible endpoint) or `"disabled"`.
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default = "default_chat_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: default_chat_model(),
            base_url: default_base_url(),
            temperature: default_temperature(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ModelConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct NotionConfig {
    /// When false, registrations are logged instead of written to Notion.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub database_id: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_disabled() -> String {
    "disabled".to_string()
}
fn default_dims() -> usize {
    256
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_temperature() -> f64 {
    0.4
}

impl Config {
    /// Resolved path of the persisted fingerprint file.
    pub fn fingerprint_path(&self) -> PathBuf {
        match &self.knowledge.fingerprint_path {
            Some(p) => p.clone(),
            None => self
                .db
                .path
                .parent()
                .map(|d| d.join("fingerprint.json"))
                .unwrap_or_else(|| PathBuf::from("fingerprint.json")),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.chunking.max_chars == 0 {
        anyhow::bail!("chunking.max_chars must be > 0");
    }
    if config.chunking.overlap_chars >= config.chunking.max_chars {
        anyhow::bail!("chunking.overlap_chars must be < chunking.max_chars");
    }
    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "hash" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or hash.",
            other
        ),
    }
    if config.embedding.provider == "openai" && config.embedding.model.is_none() {
        anyhow::bail!("embedding.model must be specified when provider is 'openai'");
    }
    if config.embedding.is_enabled() && config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }

    match config.model.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown model provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    if config.notion.enabled && config.notion.database_id.is_none() {
        anyhow::bail!("notion.database_id must be set when notion.enabled = true");
    }

    Ok(config)
}
