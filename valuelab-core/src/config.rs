//! Engine configuration, stored as TOML.
//!
//! ```toml
//! [sources]
//! exchange_suffix = ".SA"
//! history_range = "5y"
//!
//! [http]
//! timeout_secs = 30
//!
//! [cache]
//! ttl_secs = 3600
//! ```
//!
//! Every section and key is optional; missing values take the defaults below.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub sources: SourceSettings,
    pub http: HttpSettings,
    pub cache: CacheSettings,
}

/// Where the adapters point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    pub fundamentus_url: String,
    pub yahoo_base_url: String,
    /// Visited once per session to obtain the cookie the crumb is tied to.
    pub yahoo_cookie_url: String,
    /// Appended to every ticker for the quote service (B3 listings use `.SA`).
    pub exchange_suffix: String,
    /// Price history window passed to the chart endpoint.
    pub history_range: String,
    /// How many years of quarterly fundamentals to request.
    pub fundamentals_years: u32,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            fundamentus_url: "https://www.fundamentus.com.br/resultado.php".into(),
            yahoo_base_url: "https://query2.finance.yahoo.com".into(),
            yahoo_cookie_url: "https://fc.yahoo.com".into(),
            exchange_suffix: ".SA".into(),
            history_range: "5y".into(),
            fundamentals_years: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub breaker_cooldown_secs: u64,
    pub breaker_failure_threshold: u32,
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_retries: 3,
            retry_base_delay_ms: 500,
            breaker_cooldown_secs: 30 * 60,
            breaker_failure_threshold: 3,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".into(),
        }
    }
}

impl HttpSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn breaker_cooldown(&self) -> Duration {
        Duration::from_secs(self.breaker_cooldown_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub ttl_secs: u64,
    /// Directory for the on-disk response cache. `None` lets the caller pick a
    /// writable location.
    pub dir: Option<PathBuf>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 3600,
            dir: None,
        }
    }
}

impl CacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl EngineConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sources.fundamentus_url.trim().is_empty() {
            return Err(ConfigError::Invalid("sources.fundamentus_url is empty".into()));
        }
        if self.sources.yahoo_base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("sources.yahoo_base_url is empty".into()));
        }
        if self.sources.history_range.trim().is_empty() {
            return Err(ConfigError::Invalid("sources.history_range is empty".into()));
        }
        if self.sources.fundamentals_years == 0 {
            return Err(ConfigError::Invalid(
                "sources.fundamentals_years must be at least 1".into(),
            ));
        }
        if self.http.timeout_secs == 0 {
            return Err(ConfigError::Invalid("http.timeout_secs must be positive".into()));
        }
        if self.cache.ttl_secs == 0 {
            return Err(ConfigError::Invalid("cache.ttl_secs must be positive".into()));
        }
        Ok(())
    }
}
