//! Bridge configuration schema and loading.
//!
//! The bridge reads an optional TOML file at `<data dir>/bridge.toml`.
//! Every field has a default, so a missing file or a partial file is fine.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Remote API used when neither the user nor the installation set a URL.
pub const DEFAULT_REMOTE_URL: &str = "https://prod-nginz-https.wire.com";

/// Sent on every outbound request.
pub const USER_AGENT: &str = concat!("wire-bridge/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub shares: SharesConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    /// Lowest-precedence base URL.
    #[serde(default = "default_remote_url")]
    pub default_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Tokens expiring within this many seconds are refreshed before use.
    #[serde(default = "default_refresh_margin_secs")]
    pub refresh_margin_secs: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    #[serde(default = "default_time_zone_offset")]
    pub time_zone_offset: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SharesConfig {
    /// Public base URL of the host, used to build link-share URLs.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
    /// Expiration the host assigns to new shares that did not ask for one.
    #[serde(default)]
    pub default_expire_days: Option<u32>,
}

fn default_remote_url() -> String {
    DEFAULT_REMOTE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_refresh_margin_secs() -> i64 {
    60
}

fn default_per_page() -> u32 {
    20
}

fn default_time_zone_offset() -> i64 {
    7200
}

fn default_public_base_url() -> String {
    "http://localhost".to_string()
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            default_url: default_remote_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            refresh_margin_secs: default_refresh_margin_secs(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            per_page: default_per_page(),
            time_zone_offset: default_time_zone_offset(),
        }
    }
}

impl Default for SharesConfig {
    fn default() -> Self {
        Self {
            public_base_url: default_public_base_url(),
            default_expire_days: None,
        }
    }
}

impl BridgeConfig {
    /// Load configuration from a TOML file, or defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Configured default URL, never empty.
    pub fn default_url(&self) -> &str {
        let url = self.remote.default_url.trim();
        if url.is_empty() {
            DEFAULT_REMOTE_URL
        } else {
            url
        }
    }
}
