use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{FolioError, Result};

/// Upper bound for `storage.session_ttl_hours`: one hundred years.
pub const MAX_SESSION_TTL_HOURS: u64 = 100 * 365 * 24;

/// Top-level configuration for the folio agent.
///
/// Loaded from `~/.folio/config.toml` by default. Every section is optional
/// in the file and falls back to its defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FolioConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub agent: AgentConfig,
}

impl FolioConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// parsed values fail [`FolioConfig::validate`].
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: FolioConfig = toml::from_str(&content)?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
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

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.agent.max_message_length == 0 {
            return Err(FolioError::Config(
                "agent.max_message_length must be greater than 0".into(),
            ));
        }
        if self.agent.max_recommendations == 0 {
            return Err(FolioError::Config(
                "agent.max_recommendations must be greater than 0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.agent.classifier_min_confidence) {
            return Err(FolioError::Config(format!(
                "agent.classifier_min_confidence must be within 0.0..=1.0, got {}",
                self.agent.classifier_min_confidence
            )));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(FolioError::Config(format!(
                "llm.temperature must be within 0.0..=2.0, got {}",
                self.llm.temperature
            )));
        }
        if self.llm.timeout_secs == 0 {
            return Err(FolioError::Config(
                "llm.timeout_secs must be greater than 0".into(),
            ));
        }
        if self.storage.max_sessions == 0 {
            return Err(FolioError::Config(
                "storage.max_sessions must be greater than 0".into(),
            ));
        }
        if self.storage.session_ttl_hours == 0
            || self.storage.session_ttl_hours > MAX_SESSION_TTL_HOURS
        {
            return Err(FolioError::Config(format!(
                "storage.session_ttl_hours must be within 1..={}, got {}",
                MAX_SESSION_TTL_HOURS, self.storage.session_ttl_hours
            )));
        }
        if self.storage.database_file.trim().is_empty() {
            return Err(FolioError::Config(
                "storage.database_file must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Full path of the SQLite database under `data_dir`.
    pub fn database_path(&self) -> PathBuf {
        expand_home(&self.general.data_dir).join(&self.storage.database_file)
    }
}

/// Expand a leading `~` to the user's home directory.
///
/// Falls back to the literal path when no home directory is known.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~") {
        let home = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE"));
        if let Some(home) = home {
            let rest = rest.trim_start_matches(['/', '\\']);
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory for the session database.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.folio/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Session persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite file name, relative to `general.data_dir`.
    pub database_file: String,
    /// Upper bound on stored sessions. The least recently updated are purged
    /// when a new session would exceed it.
    pub max_sessions: u64,
    /// Idle sessions older than this are removed by `purge_expired`.
    pub session_ttl_hours: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_file: "folio.db".to_string(),
            max_sessions: 1000,
            session_ttl_hours: 24,
        }
    }
}

/// Which language model backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    /// OpenAI-compatible chat completions endpoint.
    Openai,
    /// Offline rule-based provider.
    Heuristic,
}

/// Language model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    /// Base URL of the OpenAI-compatible API.
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    /// Per-call timeout in seconds.
    pub timeout_secs: u64,
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Openai,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 30,
            temperature: 0.0,
        }
    }
}

/// Conversation agent behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Maximum accepted user message length in characters.
    pub max_message_length: usize,
    /// How many prior messages are sent to the model as context.
    pub recent_context_messages: usize,
    /// Upper bound on books per recommendation batch.
    pub max_recommendations: usize,
    /// Append a session digest after every data-changing turn.
    pub summarize_after_turn: bool,
    /// Whole-turn deadline in seconds. Zero disables it.
    pub turn_timeout_secs: u64,
    /// Classifications below this confidence fall back to recommend.
    pub classifier_min_confidence: f32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_message_length: 2000,
            recent_context_messages: 6,
            max_recommendations: 5,
            summarize_after_turn: false,
            turn_timeout_secs: 0,
            classifier_min_confidence: 0.3,
        }
    }
}
