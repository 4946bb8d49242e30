//! Runtime configuration.
//!
//! Settings come from an optional YAML file (see [`load_config`]); every
//! field has a default so an empty or absent file yields the stock
//! four-sector deployment. Secrets never live here: they are captured once
//! into a [`CredentialSource`] at process start and handed to the
//! [`CredentialPool`](crate::credentials::CredentialPool).

use crate::models::Sector;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, instrument};

/// Google Generative Language REST endpoint.
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Top-level application configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// Base URL of the generation API (overridable for proxies).
    pub api_base: String,
    pub models: ModelConfig,
    pub credentials: CredentialLayout,
    /// Pause after a quota-exhausted attempt before moving to the next credential.
    pub cooldown_secs: u64,
    /// Courtesy pause between sectors.
    pub sector_delay_secs: u64,
    /// Pause between persona batches in the comments job.
    pub batch_delay_secs: u64,
    /// Headline cap for the boardroom prompt.
    pub boardroom_title_limit: usize,
    /// Line cap for the editor prompt.
    pub editor_line_cap: usize,
    /// Headline cap for the comments prompt.
    pub comments_title_limit: usize,
    /// Maximum number of comments kept per sector.
    pub comments_keep: usize,
    pub sectors: Vec<Sector>,
}

/// Model identifiers and sampling temperatures for each job.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ModelConfig {
    pub strategy: String,
    pub strategy_temperature: f32,
    pub analysis: String,
    /// Model for high-expertise personas.
    pub smart: String,
    /// Model for everyone else.
    pub cheap: String,
    pub comments_temperature: f32,
}

/// Names of the environment variables credentials are read from.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CredentialLayout {
    /// Generic fallback variable tried right after the sector's own slot.
    pub fallback_var: String,
    /// Prefix of the indexed pool variables (`KEY_` gives `KEY_1`, `KEY_2`, ...).
    pub pool_prefix: String,
    /// Number of indexed pool variables, counted from 1.
    pub pool_size: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            models: ModelConfig::default(),
            credentials: CredentialLayout::default(),
            cooldown_secs: 2,
            sector_delay_secs: 5,
            batch_delay_secs: 1,
            boardroom_title_limit: 100,
            editor_line_cap: 2000,
            comments_title_limit: 15,
            comments_keep: 35,
            sectors: default_sectors(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            strategy: "gemini-2.0-flash-exp".to_string(),
            strategy_temperature: 1.0,
            analysis: "gemini-3-flash-preview".to_string(),
            smart: "gemini-3-flash-preview".to_string(),
            cheap: "gemini-2.5-flash".to_string(),
            comments_temperature: 0.9,
        }
    }
}

impl Default for CredentialLayout {
    fn default() -> Self {
        Self {
            fallback_var: "GOOGLE_API_KEY".to_string(),
            pool_prefix: "KEY_".to_string(),
            pool_size: 8,
        }
    }
}

impl AppConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn sector_delay(&self) -> Duration {
        Duration::from_secs(self.sector_delay_secs)
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_secs(self.batch_delay_secs)
    }

    /// Keep only the sectors named in `keys`, preserving configured order.
    /// An empty filter keeps everything.
    pub fn retain_sectors(&mut self, keys: &[String]) {
        if keys.is_empty() {
            return;
        }
        self.sectors.retain(|s| keys.iter().any(|k| k == &s.key));
    }
}

/// The stock sector table: finance, global, tech, general.
pub fn default_sectors() -> Vec<Sector> {
    [
        ("finance", "Finance / Markets"),
        ("global", "Global / Macro"),
        ("tech", "Tech / AI"),
        ("general", "General / Trending"),
    ]
    .into_iter()
    .map(|(key, display_name)| Sector {
        key: key.to_string(),
        input_path: PathBuf::from(format!("data_{key}.json")),
        display_name: display_name.to_string(),
        credential_slot: format!("KEY_{}", key.to_uppercase()),
    })
    .collect()
}

/// Load configuration from a YAML file, or defaults when `path` is `None`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not valid YAML for
/// [`AppConfig`]. A missing explicit path is an error, not a silent default.
#[instrument(level = "info", skip_all, fields(path = ?path))]
pub async fn load_config(path: Option<&str>) -> Result<AppConfig, Box<dyn Error>> {
    let Some(path) = path else {
        info!("No config file given; using defaults");
        return Ok(AppConfig::default());
    };
    let raw = tokio::fs::read_to_string(path).await?;
    let config = parse_config(&raw)?;
    info!(sectors = config.sectors.len(), "Loaded configuration");
    Ok(config)
}

/// Parse YAML text into an [`AppConfig`]. Empty input yields defaults.
pub fn parse_config(raw: &str) -> Result<AppConfig, serde_yaml::Error> {
    if raw.trim().is_empty() {
        return Ok(AppConfig::default());
    }
    serde_yaml::from_str(raw)
}

/// Read-only snapshot of named secret variables.
///
/// Captured once from the process environment in `main`; tests build one
/// from a literal map instead of touching real process state.
#[derive(Clone, Default)]
pub struct CredentialSource {
    vars: HashMap<String, String>,
}

impl CredentialSource {
    pub fn from_env() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    /// Look up a variable, treating blank values as absent.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

impl<K, V> FromIterator<(K, V)> for CredentialSource
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl std::fmt::Debug for CredentialSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialSource")
            .field("vars", &self.vars.len())
            .finish()
    }
}
