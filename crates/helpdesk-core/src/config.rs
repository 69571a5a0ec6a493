use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{HelpdeskError, Result};

/// Top-level configuration for the support dialogue system.
///
/// Loaded from `~/.helpdesk/config.toml` by default. API keys are never
/// stored here; each remote section names the environment variable to read.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HelpdeskConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub dialogue: DialogueConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub ticketing: TicketingConfig,
}

impl HelpdeskConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read, parsed, or fails validation.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: HelpdeskConfig = toml::from_str(&content)?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Reject combinations the dialogue graph cannot honor.
    pub fn validate(&self) -> Result<()> {
        let d = &self.dialogue;
        if d.keep_recent >= d.compaction_threshold {
            return Err(HelpdeskError::Config(format!(
                "dialogue.keep_recent ({}) must be smaller than dialogue.compaction_threshold ({})",
                d.keep_recent, d.compaction_threshold
            )));
        }
        if d.max_generation_attempts < MIN_GENERATION_ATTEMPTS {
            return Err(HelpdeskError::Config(format!(
                "dialogue.max_generation_attempts must be at least {}",
                MIN_GENERATION_ATTEMPTS
            )));
        }
        if d.max_generation_attempts > d.generation_attempt_cap() {
            return Err(HelpdeskError::Config(format!(
                "dialogue.max_generation_attempts ({}) plus {} other stages exceeds \
                 dialogue.max_stage_steps ({})",
                d.max_generation_attempts, NON_GENERATOR_STAGES, d.max_stage_steps
            )));
        }
        if self.memory.top_k == 0 {
            return Err(HelpdeskError::Config(
                "memory.top_k must be at least 1".to_string(),
            ));
        }
        if self.memory.backend == MemoryBackend::Remote && self.memory.remote_url.is_empty() {
            return Err(HelpdeskError::Config(
                "memory.remote_url is required for the remote backend".to_string(),
            ));
        }
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory for the SQLite database and the local memory snapshot.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.helpdesk/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Language Model Service (OpenAI-compatible chat completions).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Model used when the turn does not select one.
    pub default_model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".to_string(),
            api_key_env: "GROQ_API_KEY".to_string(),
            default_model: "llama-3.1-8b-instant".to_string(),
            temperature: 0.0,
            timeout_secs: 30,
        }
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Embedding backend selection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingBackend {
    /// Deterministic offline hashing embedder.
    #[default]
    Hash,
    /// OpenAI-compatible `/embeddings` endpoint.
    Http,
}

/// Embedding model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub backend: EmbeddingBackend,
    pub base_url: String,
    pub api_key_env: String,
    pub model: String,
    pub dimensions: usize,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Hash,
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            model: "text-embedding-3-small".to_string(),
            dimensions: 384,
            timeout_secs: 15,
        }
    }
}

/// Semantic memory backend selection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryBackend {
    /// In-process index with an optional snapshot file.
    #[default]
    Local,
    /// Remote namespaced vector index service.
    Remote,
}

/// Memory retrieval configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub backend: MemoryBackend,
    /// Semantic neighbors fetched per turn.
    pub top_k: usize,
    /// Persisted history messages loaded per turn.
    pub history_limit: usize,
    /// Snapshot file for the local backend, relative to `general.data_dir`.
    /// Empty disables snapshotting.
    pub snapshot_file: String,
    pub remote_url: String,
    pub remote_api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: MemoryBackend::Local,
            top_k: 3,
            history_limit: 5,
            snapshot_file: "memory.json".to_string(),
            remote_url: String::new(),
            remote_api_key_env: "PINECONE_API_KEY".to_string(),
            timeout_secs: 10,
        }
    }
}

impl MemoryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Fewest model calls the generator makes before giving up: one retry.
pub const MIN_GENERATION_ATTEMPTS: u32 = 2;

/// Stages a turn can pass through besides the generator: intent gate,
/// compactor, router, retriever and escalator.
pub const NON_GENERATOR_STAGES: usize = 5;

/// Dialogue graph limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DialogueConfig {
    /// Buffer length above which the compactor summarizes.
    pub compaction_threshold: usize,
    /// Messages kept verbatim after compaction.
    pub keep_recent: usize,
    /// Minimum trimmed reply length accepted by the generator.
    pub min_reply_chars: usize,
    /// Total model calls the generator may make before escalating.
    pub max_generation_attempts: u32,
    /// Longest accepted user message, in characters.
    pub max_message_chars: usize,
    /// Hard cap on stage transitions per turn.
    pub max_stage_steps: usize,
    /// Substrings that mark a query as out of domain when recall is empty.
    pub out_of_domain_markers: Vec<String>,
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            compaction_threshold: 6,
            keep_recent: 2,
            min_reply_chars: 5,
            max_generation_attempts: 3,
            max_message_chars: 4000,
            max_stage_steps: 16,
            out_of_domain_markers: vec!["weather".to_string()],
        }
    }
}

impl DialogueConfig {
    /// Most generator attempts that still leave a step for the escalator.
    pub fn generation_attempt_cap(&self) -> u32 {
        let spare = self.max_stage_steps.saturating_sub(NON_GENERATOR_STAGES);
        u32::try_from(spare).unwrap_or(u32::MAX)
    }
}

/// History and checkpoint storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite file name, relative to `general.data_dir`.
    pub database_file: String,
    pub timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_file: "helpdesk.db".to_string(),
            timeout_secs: 5,
        }
    }
}

impl StorageConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Ticketing service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TicketingConfig {
    pub timeout_secs: u64,
}

impl Default for TicketingConfig {
    fn default() -> Self {
        Self { timeout_secs: 10 }
    }
}

impl TicketingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
