//! Application configuration for LeadRevive.
//!
//! User config lives at `~/.leadrevive/leadrevive.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LeadReviveError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "leadrevive.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".leadrevive";

/// Default embedded database file name inside the config directory.
const DATABASE_FILE_NAME: &str = "leads.db";

// ---------------------------------------------------------------------------
// Config structs (matching leadrevive.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Import pipeline settings.
    #[serde(default)]
    pub import: ImportSettings,

    /// Embedded store settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Hosted backend settings.
    #[serde(default)]
    pub backend: BackendConfig,
}

/// Where imported leads are written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// Embedded libSQL database.
    #[default]
    Local,
    /// Hosted REST backend.
    Remote,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Owner id attached to imported leads when `--owner` is not given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,

    /// Default sink for `import`.
    #[serde(default)]
    pub sink: SinkKind,
}

/// `[import]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportSettings {
    /// Rows per insert request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Provenance tag stored on every imported lead.
    #[serde(default = "default_source")]
    pub source: String,

    /// Initial score for imported leads.
    #[serde(default = "default_lead_score")]
    pub lead_score: u8,

    /// How many batch diagnostics to surface in an import outcome.
    #[serde(default = "default_error_preview_limit")]
    pub error_preview_limit: usize,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            source: default_source(),
            lead_score: default_lead_score(),
            error_preview_limit: default_error_preview_limit(),
        }
    }
}

fn default_batch_size() -> usize {
    50
}
fn default_source() -> String {
    "csv_import".into()
}
fn default_lead_score() -> u8 {
    50
}
fn default_error_preview_limit() -> usize {
    5
}

/// `[storage]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the embedded database. Defaults to `~/.leadrevive/leads.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<String>,
}

/// `[backend]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the hosted backend (e.g. `https://project.example.co`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_api_key_env() -> String {
    "LEADREVIVE_API_KEY".into()
}
fn default_timeout_secs() -> u64 {
    30
}

// ---------------------------------------------------------------------------
// Import config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime import configuration, merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct ImportConfig {
    /// Rows per insert request.
    pub batch_size: usize,
    /// Provenance tag.
    pub source: String,
    /// Initial lead score.
    pub lead_score: u8,
    /// Cap on surfaced batch diagnostics.
    pub error_preview_limit: usize,
}

impl From<&AppConfig> for ImportConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            batch_size: config.import.batch_size,
            source: config.import.source.clone(),
            lead_score: config.import.lead_score,
            error_preview_limit: config.import.error_preview_limit,
        }
    }
}

impl ImportConfig {
    /// Reject settings the import loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(LeadReviveError::config("batch_size must be at least 1"));
        }
        if self.lead_score > 100 {
            return Err(LeadReviveError::config(format!(
                "lead_score must be between 0 and 100, got {}",
                self.lead_score
            )));
        }
        if self.source.trim().is_empty() {
            return Err(LeadReviveError::config("source must not be empty"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.leadrevive/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| LeadReviveError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.leadrevive/leadrevive.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Resolve the embedded database path from config, falling back to the config dir.
pub fn database_path(config: &AppConfig) -> Result<PathBuf> {
    match &config.storage.database_path {
        Some(path) => Ok(PathBuf::from(path)),
        None => Ok(config_dir()?.join(DATABASE_FILE_NAME)),
    }
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| LeadReviveError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        LeadReviveError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| LeadReviveError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| LeadReviveError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| LeadReviveError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the backend API key from the env var named in config.
pub fn resolve_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.backend.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(LeadReviveError::config(format!(
            "backend API key not found. Set the {var_name} environment variable."
        ))),
    }
}
