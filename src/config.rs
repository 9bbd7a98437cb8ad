// ⚙️ Configuration - explicit settings handed to the loader at construction
//
// Loaded from a TOML file. Secrets never live in the file: the file only
// names the environment variables that hold them.

use crate::error::{PipelineError, PipelineResult};
use crate::source::Credential;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "branch-locator.toml";
pub const DEFAULT_BRANCHES_RANGE: &str = "FormResponses!A:Y";
pub const DEFAULT_COORDINATES_RANGE: &str = "Coordinates!A:E";
pub const DEFAULT_SHEETS_BASE_URL: &str = "https://sheets.googleapis.com";

// ============================================================================
// CONFIG TYPES
// ============================================================================

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub source: SourceConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    #[serde(default = "default_branches_range")]
    pub branches_range: String,

    #[serde(default = "default_coordinates_range")]
    pub coordinates_range: String,

    #[serde(flatten)]
    pub backend: BackendConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    Sheets(SheetsConfig),
    Csv(CsvConfig),
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct SheetsConfig {
    pub spreadsheet_id: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Environment variable holding an API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Environment variable holding an OAuth access token (preferred over the key)
    #[serde(default = "default_access_token_env")]
    pub access_token_env: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct CsvConfig {
    /// Directory holding one CSV file per range
    pub dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

// Helper functions for serde defaults
fn default_branches_range() -> String {
    DEFAULT_BRANCHES_RANGE.to_string()
}

fn default_coordinates_range() -> String {
    DEFAULT_COORDINATES_RANGE.to_string()
}

fn default_base_url() -> String {
    DEFAULT_SHEETS_BASE_URL.to_string()
}

fn default_api_key_env() -> String {
    "GOOGLE_SHEETS_API_KEY".to_string()
}

fn default_access_token_env() -> String {
    "GOOGLE_SHEETS_ACCESS_TOKEN".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_ttl_secs() -> u64 {
    3600
}

fn default_bind() -> String {
    "0.0.0.0:3000".to_string()
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            ttl_secs: default_ttl_secs(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: default_bind(),
        }
    }
}

// ============================================================================
// LOADING
// ============================================================================

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&text)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(text)?;
        Ok(config)
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl SheetsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Resolve the credential from the environment: access token > API key > error
    pub fn resolve_credential(&self) -> PipelineResult<Credential> {
        self.resolve_credential_with(|name| std::env::var(name).ok())
    }

    fn resolve_credential_with(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> PipelineResult<Credential> {
        let present = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(token) = present(&self.access_token_env) {
            return Ok(Credential::AccessToken(token));
        }
        if let Some(key) = present(&self.api_key_env) {
            return Ok(Credential::ApiKey(key));
        }

        Err(PipelineError::Config(format!(
            "no spreadsheet credentials: set {} or {}",
            self.access_token_env, self.api_key_env
        )))
    }
}
