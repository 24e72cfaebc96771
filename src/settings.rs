//! Structured settings file.
//!
//! The settings file holds everything that is not a process flag: database
//! connection parameters, language model credentials, embedding and index
//! options. It is read once at startup into an immutable [`Settings`] value
//! that is handed to each component by reference.
//!
//! ```toml
//! [database.sqlite]
//! path = "data/school.db"
//!
//! [database.postgres]
//! host = "localhost"
//! port = 5432
//! user = "explorer"
//! password = "secret"
//! dbname = "shop"
//!
//! [llm]
//! base_url = "https://api.groq.com/openai/v1"
//! model = "llama-3.3-70b-versatile"
//! api_key = "gsk_..."
//! temperature = 0.0
//! max_tokens = 200
//!
//! [embedding]
//! provider = "hashing"
//!
//! [index]
//! dir = ".explorer/index"
//! top_k = 3
//! ```

use crate::error::{ExplorerError, ExplorerResult};
use crate::models::{ConnectionTarget, DEFAULT_QUERY_TIMEOUT_SECS, DEFAULT_ROW_LIMIT, DatabaseType};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

/// Environment variable consulted when `llm.api_key` is not set in the file.
pub const LLM_API_KEY_ENV: &str = "EXPLORER_LLM_API_KEY";

pub const DEFAULT_LLM_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_LLM_MODEL: &str = "llama-3.3-70b-versatile";
pub const DEFAULT_LLM_MAX_TOKENS: u32 = 200;
pub const DEFAULT_LLM_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_TOP_K: usize = 3;
pub const DEFAULT_SAMPLE_ROWS: u32 = 3;
pub const DEFAULT_INDEX_DIR: &str = ".explorer/index";
pub const DEFAULT_HASHING_DIMENSIONS: usize = 1024;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub llm: LlmSettings,
    pub embedding: EmbeddingSettings,
    pub index: IndexSettings,
    pub extractor: ExtractorSettings,
    pub executor: ExecutorSettings,
    pub safety: SafetySettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseSettings {
    pub sqlite: Option<SqliteSettings>,
    pub postgres: Option<PostgresSettings>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SqliteSettings {
    pub path: PathBuf,
    /// Create the file if it does not exist
    #[serde(default)]
    pub create: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PostgresSettings {
    #[serde(default = "default_pg_host")]
    pub host: String,
    #[serde(default = "default_pg_port")]
    pub port: u16,
    pub user: String,
    #[serde(default)]
    pub password: Option<String>,
    pub dbname: String,
}

fn default_pg_host() -> String {
    "localhost".to_string()
}

fn default_pg_port() -> u16 {
    5432
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LlmSettings {
    /// Informational provider label (e.g., "groq")
    pub provider: String,
    /// OpenAI-compatible API root
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: "groq".to_string(),
            base_url: DEFAULT_LLM_BASE_URL.to_string(),
            model: DEFAULT_LLM_MODEL.to_string(),
            api_key: None,
            temperature: 0.0,
            max_tokens: DEFAULT_LLM_MAX_TOKENS,
            timeout_secs: DEFAULT_LLM_TIMEOUT_SECS,
        }
    }
}

impl LlmSettings {
    /// The API key from the file, or from [`LLM_API_KEY_ENV`].
    pub fn resolve_api_key(&self) -> ExplorerResult<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var(LLM_API_KEY_ENV).ok())
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                ExplorerError::config(format!(
                    "llm.api_key is required (set it in the settings file or {})",
                    LLM_API_KEY_ENV
                ))
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    /// Offline deterministic feature hashing
    #[default]
    Hashing,
    /// OpenAI-compatible `/embeddings` endpoint
    Http,
    /// Local AllMiniLM-L6-v2 model (requires the `local-model` feature)
    Fastembed,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingProviderKind,
    /// Model identifier; defaults per provider when unset
    pub model: Option<String>,
    pub dimensions: Option<usize>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    /// Directory for downloaded local model files
    pub cache_dir: Option<PathBuf>,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::Hashing,
            model: None,
            dimensions: None,
            base_url: None,
            api_key: None,
            cache_dir: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IndexSettings {
    pub dir: PathBuf,
    pub top_k: usize,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_INDEX_DIR),
            top_k: DEFAULT_TOP_K,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExtractorSettings {
    /// Rows sampled per table for the description (0 disables sampling)
    pub sample_rows: u32,
    pub include_views: bool,
}

impl Default for ExtractorSettings {
    fn default() -> Self {
        Self {
            sample_rows: DEFAULT_SAMPLE_ROWS,
            include_views: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutorSettings {
    pub row_limit: u32,
    pub timeout_secs: u64,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            row_limit: DEFAULT_ROW_LIMIT,
            timeout_secs: DEFAULT_QUERY_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SafetySettings {
    /// Also require confirmation for every statement that is not a query
    pub read_only: bool,
}

impl Settings {
    /// Load settings from a TOML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> ExplorerResult<Self> {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "Settings file not found, using defaults");
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(|e| ExplorerError::file_io(path, e))?;
        let settings = Self::parse(&raw)?;
        tracing::info!(path = %path.display(), "Loaded settings");
        Ok(settings)
    }

    /// Parse and validate settings from TOML text.
    pub fn parse(raw: &str) -> ExplorerResult<Self> {
        let settings: Settings = toml::from_str(raw)
            .map_err(|e| ExplorerError::config(format!("Invalid settings file: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate option ranges and return an error describing the first problem.
    pub fn validate(&self) -> ExplorerResult<()> {
        if self.index.top_k == 0 {
            return Err(ExplorerError::config("index.top_k must be greater than 0"));
        }
        if self.embedding.dimensions == Some(0) {
            return Err(ExplorerError::config(
                "embedding.dimensions must be greater than 0",
            ));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ExplorerError::config(format!(
                "llm.temperature must be between 0 and 2 (got {})",
                self.llm.temperature
            )));
        }
        if self.llm.max_tokens == 0 {
            return Err(ExplorerError::config("llm.max_tokens must be greater than 0"));
        }
        if self.executor.row_limit == 0 {
            return Err(ExplorerError::config(
                "executor.row_limit must be greater than 0",
            ));
        }
        if self.embedding.provider == EmbeddingProviderKind::Http
            && self.embedding.base_url.is_none()
        {
            return Err(ExplorerError::config(
                "embedding.base_url is required for the http provider",
            ));
        }
        Ok(())
    }

    /// Resolve what the user typed after "connect": a settings section name
    /// (`sqlite`, `postgres`) or a connection URL.
    pub fn resolve_target(&self, input: &str) -> ExplorerResult<ConnectionTarget> {
        let input = input.trim();
        match input.to_ascii_lowercase().as_str() {
            "" => Err(ExplorerError::invalid_input(
                "Give a connection URL or a settings section name (sqlite, postgres)",
            )),
            "sqlite" | "postgres" | "postgresql" => self.named_target(input),
            _ => ConnectionTarget::parse(input),
        }
    }

    /// Build a connection target from the `[database.<name>]` section.
    pub fn named_target(&self, name: &str) -> ExplorerResult<ConnectionTarget> {
        match name.to_ascii_lowercase().as_str() {
            "sqlite" => {
                let section = self.database.sqlite.as_ref().ok_or_else(|| {
                    ExplorerError::config("No [database.sqlite] section in settings")
                })?;
                sqlite_target(section)
            }
            "postgres" | "postgresql" => {
                let section = self.database.postgres.as_ref().ok_or_else(|| {
                    ExplorerError::config("No [database.postgres] section in settings")
                })?;
                postgres_target(section)
            }
            other => Err(ExplorerError::invalid_input(format!(
                "Unknown database section '{}'. Use 'sqlite' or 'postgres'",
                other
            ))),
        }
    }
}

fn sqlite_target(section: &SqliteSettings) -> ExplorerResult<ConnectionTarget> {
    let path = section.path.to_string_lossy();
    let mut connection_string = format!("sqlite:{}", path);
    if section.create {
        connection_string.push_str("?mode=rwc");
    }
    let id = section
        .path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "default".to_string());

    Ok(ConnectionTarget {
        id,
        db_type: DatabaseType::SQLite,
        connection_string,
    })
}

fn postgres_target(section: &PostgresSettings) -> ExplorerResult<ConnectionTarget> {
    let mut url = Url::parse("postgres://localhost")
        .map_err(|e| ExplorerError::internal(format!("Invalid base URL: {}", e)))?;
    let invalid = |what: &str| ExplorerError::config(format!("Invalid database.postgres.{}", what));

    url.set_host(Some(&section.host))
        .map_err(|_| invalid("host"))?;
    url.set_port(Some(section.port)).map_err(|_| invalid("port"))?;
    url.set_username(&section.user).map_err(|_| invalid("user"))?;
    if let Some(ref password) = section.password {
        url.set_password(Some(password))
            .map_err(|_| invalid("password"))?;
    }
    url.set_path(&section.dbname);

    Ok(ConnectionTarget {
        id: section.dbname.clone(),
        db_type: DatabaseType::PostgreSQL,
        connection_string: url.to_string(),
    })
}
