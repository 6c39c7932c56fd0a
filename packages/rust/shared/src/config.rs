//! Application configuration for ArticleForge.
//!
//! User config lives at `~/.articleforge/articleforge.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ArticleForgeError, Result};
use crate::types::ProviderKind;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "articleforge.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".articleforge";

// ---------------------------------------------------------------------------
// Config structs (matching articleforge.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Pipeline tuning.
    #[serde(default)]
    pub pipeline: PipelineSettings,

    /// Providers in fallback order.
    #[serde(default = "default_providers")]
    pub providers: Vec<ProviderConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            defaults: DefaultsConfig::default(),
            pipeline: PipelineSettings::default(),
            providers: default_providers(),
        }
    }
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Job database location.
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "~/.articleforge/jobs.db".into()
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Generate/validate attempts per section before best-effort acceptance.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Attempts per provider before falling back to the next one.
    #[serde(default = "default_retries_per_provider")]
    pub retries_per_provider: u32,

    /// Base backoff delay; attempt n waits `base * 2^(n-1)`.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound on a single backoff delay.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Per-call provider timeout.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Lifetime of cached section lists.
    #[serde(default = "default_section_cache_ttl_secs")]
    pub section_cache_ttl_secs: u64,

    /// A run lease not renewed for this long may be taken over by another
    /// process.
    #[serde(default = "default_run_lease_secs")]
    pub run_lease_secs: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retries_per_provider: default_retries_per_provider(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            section_cache_ttl_secs: default_section_cache_ttl_secs(),
            run_lease_secs: default_run_lease_secs(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_retries_per_provider() -> u32 {
    2
}
fn default_base_delay_ms() -> u64 {
    1_000
}
fn default_max_delay_ms() -> u64 {
    30_000
}
fn default_request_timeout_secs() -> u64 {
    120
}
fn default_section_cache_ttl_secs() -> u64 {
    30
}
fn default_run_lease_secs() -> u64 {
    900
}

/// `[[providers]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Backend variant.
    pub kind: ProviderKind,

    /// Model identifier passed to the provider.
    pub model: String,

    /// Name of the env var holding the API key (never store the key itself).
    pub api_key_env: String,

    /// Override for the provider's API base URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Completion token limit.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl ProviderConfig {
    /// Read the API key from the environment, if set and non-empty.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|v| !v.trim().is_empty())
    }
}

fn default_max_tokens() -> u32 {
    8_192
}
fn default_temperature() -> f32 {
    0.7
}

fn default_providers() -> Vec<ProviderConfig> {
    vec![
        ProviderConfig {
            kind: ProviderKind::OpenRouter,
            model: "anthropic/claude-sonnet-4".into(),
            api_key_env: "OPENROUTER_API_KEY".into(),
            base_url: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        },
        ProviderConfig {
            kind: ProviderKind::Anthropic,
            model: "claude-sonnet-4-20250514".into(),
            api_key_env: "ANTHROPIC_API_KEY".into(),
            base_url: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        },
    ]
}

// ---------------------------------------------------------------------------
// Pipeline config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub max_attempts: u32,
    pub retries_per_provider: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub request_timeout: Duration,
    pub section_cache_ttl: Duration,
    pub run_lease: Duration,
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        let p = &config.pipeline;
        Self {
            max_attempts: p.max_attempts.max(1),
            retries_per_provider: p.retries_per_provider.max(1),
            base_delay: Duration::from_millis(p.base_delay_ms),
            max_delay: Duration::from_millis(p.max_delay_ms),
            request_timeout: Duration::from_secs(p.request_timeout_secs),
            section_cache_ttl: Duration::from_secs(p.section_cache_ttl_secs),
            run_lease: Duration::from_secs(p.run_lease_secs.max(1)),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.articleforge/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ArticleForgeError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.articleforge/articleforge.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
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
    let content = std::fs::read_to_string(path).map_err(|e| ArticleForgeError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        ArticleForgeError::config(format!("failed to parse {}: {e}", path.display()))
    })?;

    for provider in &config.providers {
        if let Some(base) = &provider.base_url {
            url::Url::parse(base).map_err(|e| {
                ArticleForgeError::config(format!(
                    "invalid base_url '{base}' for provider {}: {e}",
                    provider.kind
                ))
            })?;
        }
    }

    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ArticleForgeError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| ArticleForgeError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ArticleForgeError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that at least one configured provider has its API key set.
pub fn validate_providers(config: &AppConfig) -> Result<()> {
    if config.providers.is_empty() {
        return Err(ArticleForgeError::config("no providers configured"));
    }
    if config.providers.iter().any(|p| p.api_key().is_some()) {
        return Ok(());
    }
    let vars: Vec<&str> = config
        .providers
        .iter()
        .map(|p| p.api_key_env.as_str())
        .collect();
    Err(ArticleForgeError::config(format!(
        "no provider API key found. Set one of: {}",
        vars.join(", ")
    )))
}
