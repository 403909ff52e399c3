use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Default size of the conversation history window handed to the generation client.
pub const DEFAULT_MAX_TURNS: u32 = 50;
/// Default retention horizon for persisted turns.
pub const DEFAULT_RETENTION_DAYS: i64 = 30;
/// Default concurrency cap for the embedding client's semaphore.
pub const DEFAULT_EMBEDDING_CONCURRENCY: usize = 4;
/// Default per-call generation timeout.
pub const DEFAULT_GENERATION_TIMEOUT_SECS: u64 = 30;

/// Top-level config (groupmind.toml + GROUPMIND_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupmindConfig {
    pub database: DatabaseConfig,
    pub model: ModelConfig,
    #[serde(default)]
    pub persona: PersonaConfig,
    #[serde(default)]
    pub throttle: ThrottleConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub admin_user_ids: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub api_key: String,
    #[serde(default = "default_model_name")]
    pub model_name: String,
    #[serde(default = "default_embed_model_name")]
    pub embed_model_name: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_generation_timeout")]
    pub generation_timeout_secs: u64,
    #[serde(default = "default_embedding_concurrency")]
    pub embedding_concurrency: usize,
    #[serde(default)]
    pub enable_search_grounding: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaConfig {
    pub config_path: Option<String>,
    pub response_templates_path: Option<String>,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            config_path: None,
            response_templates_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Base request allowance per hour before the reputation multiplier is applied.
    #[serde(default = "default_base_limit_per_hour")]
    pub base_limit_per_hour: u32,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            base_limit_per_hour: default_base_limit_per_hour(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            retention_days: default_retention_days(),
        }
    }
}

fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.groupmind/groupmind.db")
}
fn default_model_name() -> String {
    "generation-default".to_string()
}
fn default_embed_model_name() -> String {
    "embedding-default".to_string()
}
fn default_base_url() -> String {
    "https://generativelanguage.example.com".to_string()
}
fn default_generation_timeout() -> u64 {
    DEFAULT_GENERATION_TIMEOUT_SECS
}
fn default_embedding_concurrency() -> usize {
    DEFAULT_EMBEDDING_CONCURRENCY
}
fn default_base_limit_per_hour() -> u32 {
    30
}
fn default_max_turns() -> u32 {
    DEFAULT_MAX_TURNS
}
fn default_retention_days() -> i64 {
    DEFAULT_RETENTION_DAYS
}

impl GroupmindConfig {
    /// Load config from a TOML file with `GROUPMIND_*` env var overrides.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: GroupmindConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("GROUPMIND_").split("_"))
            .extract()
            .map_err(|e| crate::error::GroupmindError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.groupmind/groupmind.toml")
}
