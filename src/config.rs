//! TOML configuration for the sync job.
//!
//! The configuration is loaded once at startup by [`load_config`] and passed
//! by reference into every stage. Secrets (API keys, storage account key,
//! notification function key) are resolved from the environment here and
//! nowhere else, so the rest of the crate never touches ambient state.
//!
//! # Example
//!
//! ```toml
//! [output]
//! path = "./data/missing-children.json"
//!
//! [feed]
//! url = "https://example.org/missing/rss?state=AZ"
//!
//! [region]
//! state = "AZ"
//!
//! [region.places]
//! "phoenix" = "Maricopa"
//! "mesa" = "Maricopa"
//!
//! [detail]
//! base_url = "https://example.org/poster"
//!
//! [enrichment]
//! provider = "openai"
//! model = "gpt-4o-mini"
//!
//! [storage]
//! account = "publicdata"
//! container = "feeds"
//! blob = "missing-children.json"
//!
//! [notify]
//! endpoint = "https://notify.example.org/api/send"
//!
//! [contacts."phoenix"]
//! agency = "Phoenix Police Department"
//! phone = "(602) 262-6151"
//! ```
//!
//! # Environment Variables
//!
//! - `OPENAI_API_KEY`: enrichment; absent disables enrichment
//! - `AZURE_STORAGE_ACCOUNT_KEY`: base64 account key; absent disables upload
//! - `NOTIFY_FUNCTION_KEY`: notification access key; absent disables notify

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub output: OutputConfig,
    pub feed: FeedConfig,
    pub region: RegionConfig,
    pub detail: DetailConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    #[serde(default)]
    pub ids: IdConfig,
    #[serde(default)]
    pub storage: Option<StorageConfig>,
    #[serde(default)]
    pub notify: Option<NotifyConfig>,
    /// Static city → agency fallback, keyed by lowercase city name.
    #[serde(default)]
    pub contacts: BTreeMap<String, ContactEntry>,
    /// Filled from the environment by [`load_config`]; never read from TOML.
    #[serde(skip)]
    pub credentials: Credentials,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    pub url: String,
    #[serde(default = "default_feed_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_name_prefixes")]
    pub name_prefixes: Vec<String>,
}

fn default_feed_timeout() -> u64 {
    30
}

fn default_name_prefixes() -> Vec<String> {
    [
        "AMBER Alert:",
        "Endangered Missing:",
        "Critically Missing:",
        "Missing:",
        "Runaway:",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RegionConfig {
    /// Two-letter state or province code; records from elsewhere are dropped.
    #[serde(default)]
    pub state: Option<String>,
    /// Known place name → administrative region (e.g. city → county).
    pub places: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DetailConfig {
    pub base_url: String,
    #[serde(default = "default_detail_timeout")]
    pub timeout_secs: u64,
    /// Pause between consecutive detail fetches.
    #[serde(default = "default_detail_delay_ms")]
    pub delay_ms: u64,
}

fn default_detail_timeout() -> u64 {
    20
}
fn default_detail_delay_ms() -> u64 {
    1500
}

#[derive(Debug, Deserialize, Clone)]
pub struct EnrichmentConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_chat_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_enrich_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            endpoint: default_chat_endpoint(),
            model: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_enrich_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_chat_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_max_tokens() -> u32 {
    400
}
fn default_enrich_timeout() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    2
}

impl EnrichmentConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IdConfig {
    #[serde(default = "default_id_prefix")]
    pub prefix: String,
}

impl Default for IdConfig {
    fn default() -> Self {
        Self {
            prefix: default_id_prefix(),
        }
    }
}

fn default_id_prefix() -> String {
    "MC-".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub account: String,
    pub container: String,
    pub blob: String,
    /// Host suffix after `<account>.`.
    #[serde(default = "default_blob_service")]
    pub service: String,
    /// Custom endpoint (e.g. a local emulator); replaces `https://<account>.<service>`.
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default = "default_cache_control")]
    pub cache_control: String,
    #[serde(default = "default_storage_timeout")]
    pub timeout_secs: u64,
}

fn default_blob_service() -> String {
    "blob.core.windows.net".to_string()
}
fn default_cache_control() -> String {
    "public, max-age=300".to_string()
}
fn default_storage_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotifyConfig {
    pub endpoint: String,
    #[serde(default = "default_notify_tags")]
    pub tags: Vec<String>,
    /// Base URL for the deep link; the case id is appended.
    #[serde(default)]
    pub deep_link_base: Option<String>,
    #[serde(default = "default_notify_timeout")]
    pub timeout_secs: u64,
}

fn default_notify_tags() -> Vec<String> {
    vec!["missing-children".to_string()]
}
fn default_notify_timeout() -> u64 {
    15
}

#[derive(Debug, Deserialize, Clone)]
pub struct ContactEntry {
    pub agency: String,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Secrets resolved once at startup.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub llm_api_key: Option<String>,
    pub storage_account_key: Option<String>,
    pub notify_function_key: Option<String>,
}

impl Credentials {
    pub fn from_env() -> Self {
        Self {
            llm_api_key: non_empty_env("OPENAI_API_KEY"),
            storage_account_key: non_empty_env("AZURE_STORAGE_ACCOUNT_KEY"),
            notify_function_key: non_empty_env("NOTIFY_FUNCTION_KEY"),
        }
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Config {
    /// Whether the enrichment stage will actually call the completion service.
    pub fn enrichment_active(&self) -> bool {
        self.enrichment.is_enabled() && self.credentials.llm_api_key.is_some()
    }

    /// Storage settings plus key, when both are present.
    pub fn storage_target(&self) -> Option<(&StorageConfig, &str)> {
        match (&self.storage, &self.credentials.storage_account_key) {
            (Some(storage), Some(key)) => Some((storage, key.as_str())),
            _ => None,
        }
    }

    /// Notification settings plus key, when both are present.
    pub fn notify_target(&self) -> Option<(&NotifyConfig, &str)> {
        match (&self.notify, &self.credentials.notify_function_key) {
            (Some(notify), Some(key)) => Some((notify, key.as_str())),
            _ => None,
        }
    }

    /// Fallback contact for a city, matched case-insensitively.
    pub fn contact_for_city(&self, city: &str) -> Option<&ContactEntry> {
        let wanted = city.trim().to_lowercase();
        self.contacts
            .iter()
            .find(|(k, _)| k.trim().to_lowercase() == wanted)
            .map(|(_, v)| v)
    }
}

/// Parse and validate configuration text without touching the environment.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Read the config file, validate it, and resolve credentials from the environment.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config = parse_config(&content)?;
    config.credentials = Credentials::from_env();
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.feed.url.trim().is_empty() {
        bail!("feed.url must not be empty");
    }

    if config.detail.base_url.trim().is_empty() {
        bail!("detail.base_url must not be empty");
    }

    if config.region.places.is_empty() {
        bail!("region.places must list at least one place");
    }

    if let Some(ref state) = config.region.state {
        if state.trim().is_empty() {
            bail!("region.state must not be blank when set");
        }
    }

    if !config
        .ids
        .prefix
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        bail!(
            "ids.prefix may only contain ASCII letters, digits, '-' or '_' (got '{}')",
            config.ids.prefix
        );
    }

    match config.enrichment.provider.as_str() {
        "disabled" => {}
        "openai" => {
            if config.enrichment.model.is_none() {
                bail!("enrichment.model must be specified when provider is 'openai'");
            }
        }
        other => bail!(
            "Unknown enrichment provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    if !(0.0..=2.0).contains(&config.enrichment.temperature) {
        bail!("enrichment.temperature must be in [0.0, 2.0]");
    }

    if let Some(ref storage) = config.storage {
        if storage.account.is_empty() || storage.container.is_empty() || storage.blob.is_empty() {
            bail!("storage.account, storage.container and storage.blob are all required");
        }
    }

    Ok(())
}
