//! Client configuration.
//!
//! Configuration is read from a JSON file (by default
//! `<config dir>/fmp/config.json`). The API key is taken from, in order:
//! an explicit value, the config file, then the `FMP_API_KEY` environment
//! variable (a `.env` file is honoured).

use crate::error::{DataError, Result};
use fmp_engine::EngineSettings;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default provider root
pub const DEFAULT_BASE_URL: &str = "https://financialmodelingprep.com";

/// Environment variable holding the API key
pub const API_KEY_ENV: &str = "FMP_API_KEY";

/// Client configuration.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Provider API key
    #[serde(alias = "apikey")]
    pub api_key: Option<String>,
    /// Provider root URL, without `/api`
    pub base_url: String,
    /// Identifiers per batch request
    pub batch_size: usize,
    /// Maximum requests in flight
    pub max_concurrency: usize,
    /// Pages fetched per pagination round
    pub page_window: u32,
    /// Upper bound on pages per paginated target
    pub max_pages: Option<u32>,
    /// Budget for one whole fetch call, in seconds
    pub timeout_secs: Option<u64>,
    /// Timeout of a single HTTP request, in seconds
    pub request_timeout_secs: u64,
    /// Retries after a failed HTTP request
    pub max_retries: u32,
    /// Minimum delay between two requests, in milliseconds
    pub rate_limit_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        let engine = EngineSettings::default();
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            batch_size: engine.batch_size,
            max_concurrency: engine.max_concurrency,
            page_window: engine.page_window,
            max_pages: Some(500),
            timeout_secs: None,
            request_timeout_secs: 30,
            max_retries: 3,
            rate_limit_ms: 0,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("batch_size", &self.batch_size)
            .field("max_concurrency", &self.max_concurrency)
            .field("page_window", &self.page_window)
            .field("max_pages", &self.max_pages)
            .field("timeout_secs", &self.timeout_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("rate_limit_ms", &self.rate_limit_ms)
            .finish()
    }
}

impl Config {
    /// Default configuration with an explicit API key.
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..Default::default()
        }
    }

    /// Default config file location, `<config dir>/fmp/config.json`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("fmp").join("config.json"))
    }

    /// Read a config file and fill the API key from the environment if the
    /// file has none.
    ///
    /// # Arguments
    /// * `path` - JSON config file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| DataError::Config(format!("{}: {e}", path.display())))?;
        log::debug!("loaded config from {}", path.display());
        Ok(config.with_env_fallback())
    }

    /// Load the default config file if it exists, otherwise start from
    /// defaults. The API key falls back to the environment either way.
    pub fn load_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(path),
            _ => Ok(Self::default().with_env_fallback()),
        }
    }

    /// Resolve a configuration from an optional file and an optional
    /// explicit key, which takes precedence over both file and environment.
    pub fn resolve(path: Option<&Path>, api_key: Option<String>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::load(path)?,
            None => Self::load_default()?,
        };
        Ok(config.apply_key(api_key, None))
    }

    fn with_env_fallback(self) -> Self {
        let _ = dotenvy::dotenv();
        let env_key = std::env::var(API_KEY_ENV).ok();
        self.apply_key(None, env_key)
    }

    /// Apply key sources: `explicit` wins, then the key already present,
    /// then `env`. Blank keys are ignored.
    pub fn apply_key(mut self, explicit: Option<String>, env: Option<String>) -> Self {
        let non_blank = |key: Option<String>| key.filter(|k| !k.trim().is_empty());
        self.api_key = non_blank(explicit)
            .or_else(|| non_blank(self.api_key.take()))
            .or_else(|| non_blank(env));
        self
    }

    /// The API key, or [`DataError::MissingApiKey`].
    pub fn api_key(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or(DataError::MissingApiKey)
    }

    /// Engine settings derived from this configuration.
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            batch_size: self.batch_size,
            max_concurrency: self.max_concurrency,
            page_window: self.page_window,
            timeout: self.timeout_secs.map(Duration::from_secs),
            max_pages: self.max_pages,
        }
    }

    /// Check that the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(DataError::Config("base_url must not be empty".to_string()));
        }
        if self.request_timeout_secs == 0 {
            return Err(DataError::Config(
                "request_timeout_secs must be positive".to_string(),
            ));
        }
        self.engine_settings().validate()?;
        Ok(())
    }

    /// Write the configuration as pretty JSON, creating parent directories.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
