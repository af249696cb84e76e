//! Runtime configuration: endpoints, fetch budgets, backfill limits.
//!
//! Everything has a sensible default so `SearchConfig::default()` is a
//! working local-dev setup; deployments override via `MODELFIND_*`
//! environment variables (`.env` honored) or a TOML file.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct SearchConfig {
    /// Base URL of the storefront's own API (catalog search + reference
    /// data).
    pub local_base_url: String,
    /// Base URL of the external model provider.
    pub external_base_url: String,
    /// Provider access token; searches still run without one, the provider
    /// just rate-limits harder.
    pub external_token: Option<String>,
    pub user_agent: String,
    pub request_timeout_secs: u64,
    /// How many pages' worth of candidates to request from each source, so
    /// client-side filtering and ranking have enough to work with.
    pub overfetch_factor: usize,
    pub external: ExternalFetchConfig,
    pub backfill: BackfillConfig,
    pub refdata: RefDataConfig,
}

/// Limits for the external provider's paginated search endpoint.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ExternalFetchConfig {
    /// Provider-imposed page size.
    pub page_size: usize,
    /// Hard cap on parallel page fetches per query.
    pub max_pages: usize,
}

/// Bounds for the per-item download-count backfill against the provider's
/// detail endpoint. Keeps a slow provider from stalling final publication.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct BackfillConfig {
    /// At most this many detail fetches per query run.
    pub max_items: usize,
    /// Delay between consecutive detail fetches, for provider rate limits.
    pub stagger_ms: u64,
    /// Wall-clock deadline for one backfill pass. Items still unresolved
    /// when it lapses keep a zero download count.
    pub max_wait_ms: u64,
    /// Session LRU of already-resolved download counts.
    pub cache_size: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct RefDataConfig {
    /// How long the categories/tags snapshot stays fresh.
    pub ttl_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            local_base_url: "http://localhost:3000".to_string(),
            external_base_url: "https://api.thingiverse.com".to_string(),
            external_token: None,
            user_agent: "modelfind/0.1".to_string(),
            request_timeout_secs: 8,
            overfetch_factor: 3,
            external: ExternalFetchConfig::default(),
            backfill: BackfillConfig::default(),
            refdata: RefDataConfig::default(),
        }
    }
}

impl Default for ExternalFetchConfig {
    fn default() -> Self {
        Self {
            page_size: 20,
            max_pages: 3,
        }
    }
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            max_items: 12,
            stagger_ms: 100,
            max_wait_ms: 2_000,
            cache_size: 256,
        }
    }
}

impl Default for RefDataConfig {
    fn default() -> Self {
        Self { ttl_secs: 3600 }
    }
}

impl SearchConfig {
    /// Defaults overridden by `MODELFIND_*` environment variables. A `.env`
    /// file in the working directory is honored.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        let mut config = Self::default();
        if let Ok(url) = std::env::var("MODELFIND_LOCAL_URL") {
            config.local_base_url = url;
        }
        if let Ok(url) = std::env::var("MODELFIND_EXTERNAL_URL") {
            config.external_base_url = url;
        }
        if let Ok(token) = std::env::var("MODELFIND_EXTERNAL_TOKEN") {
            if !token.is_empty() {
                config.external_token = Some(token);
            }
        }
        if config.external_token.is_none() {
            debug!("no external provider token configured");
        }
        config
    }

    /// Load from a TOML file; missing fields keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl BackfillConfig {
    pub fn stagger(&self) -> Duration {
        Duration::from_millis(self.stagger_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }
}

impl RefDataConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}
