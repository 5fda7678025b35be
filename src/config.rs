//! Configuration loading and validation.
//!
//! A single human-owned `config.toml` holds the organisation profile, model
//! settings, and server settings. Every field has a sensible default so a
//! missing file still yields a runnable (if generic) configuration. The
//! model API key itself never lives in the file — only the name of the
//! environment variable that holds it.

use std::path::Path;

use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Organisation identity and canonical contact channels.
    #[serde(default)]
    pub org: OrgConfig,

    /// Model provider settings.
    #[serde(default)]
    pub model: ModelConfig,

    /// HTTP server and storage settings.
    #[serde(default)]
    pub server: ServerConfig,
}

/// Organisation profile: the only contact details the assistant may ever
/// hand out, and the only domains outbound links may point at.
#[derive(Debug, Clone, Deserialize)]
pub struct OrgConfig {
    /// Business name used in the system prompt.
    #[serde(default = "default_org_name")]
    pub name: String,

    /// Canonical contact email.
    #[serde(default = "default_org_email")]
    pub email: String,

    /// Canonical contact phone, display format.
    #[serde(default = "default_org_phone")]
    pub phone: String,

    /// Canonical website URL.
    #[serde(default = "default_org_website")]
    pub website: String,

    /// Registration page users are directed to for enrollment.
    #[serde(default = "default_org_registration")]
    pub registration_url: String,

    /// Hostnames allowed in user-supplied links. Any other host is blocked.
    #[serde(default = "default_allowed_domains")]
    pub allowed_domains: Vec<String>,
}

impl Default for OrgConfig {
    fn default() -> Self {
        Self {
            name: default_org_name(),
            email: default_org_email(),
            phone: default_org_phone(),
            website: default_org_website(),
            registration_url: default_org_registration(),
            allowed_domains: default_allowed_domains(),
        }
    }
}

impl OrgConfig {
    /// The bare domain of the canonical website (no scheme).
    pub fn domain(&self) -> &str {
        self.website
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/')
    }

    /// The canonical phone number reduced to digits only.
    pub fn phone_digits(&self) -> String {
        self.phone.chars().filter(char::is_ascii_digit).collect()
    }
}

/// Model provider settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Model identifier sent to the provider.
    #[serde(default = "default_model")]
    pub model: String,

    /// Environment variable name holding the provider API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Maximum tokens generated per reply.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Hard timeout for a single model call, in seconds. A timeout is
    /// treated the same as an overloaded provider.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_key_env: default_api_key_env(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// HTTP server and storage settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Socket address the HTTP server binds to.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// SQLite database URL.
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Directory for rotated JSON log files.
    #[serde(default = "default_logs_dir")]
    pub logs_dir: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            database_url: default_database_url(),
            logs_dir: default_logs_dir(),
        }
    }
}

// Default value functions for serde

fn default_org_name() -> String {
    "Journey to STEAM".to_owned()
}
fn default_org_email() -> String {
    "getintouch@journeytosteam.com".to_owned()
}
fn default_org_phone() -> String {
    "(503) 506-3287".to_owned()
}
fn default_org_website() -> String {
    "https://journeytosteam.com".to_owned()
}
fn default_org_registration() -> String {
    "journeytosteam.com/register".to_owned()
}
fn default_allowed_domains() -> Vec<String> {
    vec!["journeytosteam.com".to_owned()]
}
fn default_model() -> String {
    "claude-sonnet-4-20250514".to_owned()
}
fn default_api_key_env() -> String {
    "ANTHROPIC_API_KEY".to_owned()
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_temperature() -> f64 {
    0.7
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_bind() -> String {
    "0.0.0.0:3001".to_owned()
}
fn default_database_url() -> String {
    "sqlite://guardpost.db?mode=rwc".to_owned()
}
fn default_logs_dir() -> String {
    "logs".to_owned()
}

/// Load configuration from a TOML file. A missing file yields defaults.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read config at {}: {e}", path.display()))?;
    let config: Config = toml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("failed to parse config at {}: {e}", path.display()))?;
    Ok(config)
}
