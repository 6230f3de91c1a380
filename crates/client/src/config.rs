//! Client configuration, programmatic or from environment variables.

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::loader::{LOAD_ALL_CONCURRENCY, LOAD_ALL_PAGE_SIZE, LoadAllSettings};

/// Default platform API root.
pub const DEFAULT_BASE_URL: &str = "https://sbxcloud.com/api";

/// Default HTTP request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Numeric domain (tenant) id.
    pub domain: u64,

    /// Application key sent as `App-Key`.
    pub app_key: String,

    /// API root (default: https://sbxcloud.com/api).
    pub base_url: String,

    /// Per-request timeout (default: 30s).
    pub timeout: Duration,

    /// Page size and pool width for load-all (default: 1000 / 5).
    pub load_all: LoadAllSettings,
}

impl ClientConfig {
    pub fn new(domain: u64, app_key: impl Into<String>) -> Self {
        Self {
            domain,
            app_key: app_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            load_all: LoadAllSettings::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_load_all(mut self, load_all: LoadAllSettings) -> Self {
        self.load_all = load_all;
        self
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let domain = env::var("SBX_DOMAIN")
            .context("SBX_DOMAIN environment variable is required")?
            .parse()
            .context("SBX_DOMAIN must be a valid u64")?;

        let app_key =
            env::var("SBX_APP_KEY").context("SBX_APP_KEY environment variable is required")?;

        let base_url = env::var("SBX_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());

        let timeout_secs: u64 = env::var("SBX_TIMEOUT_SECS")
            .unwrap_or_else(|_| DEFAULT_TIMEOUT_SECS.to_string())
            .parse()
            .context("SBX_TIMEOUT_SECS must be a valid u64")?;

        let page_size = env::var("SBX_LOAD_ALL_PAGE_SIZE")
            .unwrap_or_else(|_| LOAD_ALL_PAGE_SIZE.to_string())
            .parse()
            .context("SBX_LOAD_ALL_PAGE_SIZE must be a valid u32")?;

        let concurrency: usize = env::var("SBX_LOAD_ALL_CONCURRENCY")
            .unwrap_or_else(|_| LOAD_ALL_CONCURRENCY.to_string())
            .parse()
            .context("SBX_LOAD_ALL_CONCURRENCY must be a valid usize")?;

        if concurrency == 0 {
            anyhow::bail!("SBX_LOAD_ALL_CONCURRENCY must be at least 1");
        }

        Ok(Self {
            domain,
            app_key,
            base_url,
            timeout: Duration::from_secs(timeout_secs),
            load_all: LoadAllSettings {
                page_size,
                concurrency,
            },
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_platform() {
        let config = ClientConfig::new(96, "key");
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.load_all.page_size, 1000);
        assert_eq!(config.load_all.concurrency, 5);
    }

    #[test]
    fn builder_overrides() {
        let config = ClientConfig::new(1, "key")
            .with_base_url("http://localhost:8080/api")
            .with_timeout(Duration::from_secs(2))
            .with_load_all(LoadAllSettings {
                page_size: 50,
                concurrency: 2,
            });
        assert_eq!(config.base_url, "http://localhost:8080/api");
        assert_eq!(config.load_all.concurrency, 2);
    }
}
