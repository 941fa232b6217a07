//! Daemon configuration (TOML)

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

/// Top-level daemon configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DevhubConfig {
    /// Listen address for the HTTP API
    pub listen: String,
    pub origin: OriginSection,
    pub auth: AuthSection,
    pub router: RouterSection,
    /// Register the built-in demo plugin when no external plugins exist
    pub demo_plugin: bool,
}

impl Default for DevhubConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:4035".to_string(),
            origin: OriginSection::default(),
            auth: AuthSection::default(),
            router: RouterSection::default(),
            demo_plugin: true,
        }
    }
}

/// Origin allowlist settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OriginSection {
    /// When false, the allowlist is not consulted at all
    pub enforce: bool,
    /// Allowlist persistence file; created on first add when missing
    pub allowlist_path: Option<String>,
    /// Entries seeded into the policy at startup
    pub entries: Vec<OriginEntrySection>,
}

impl Default for OriginSection {
    fn default() -> Self {
        Self {
            enforce: false,
            allowlist_path: None,
            entries: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OriginEntrySection {
    pub pattern: String,
    #[serde(default)]
    pub title: String,
}

/// Token authority settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthSection {
    /// Per-capability grant lifetime in seconds
    pub grant_ttl_secs: u64,
    /// Orphaned-token retention in seconds
    pub retention_secs: u64,
    /// Cleanup sweep interval in seconds
    pub cleanup_interval_secs: u64,
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            grant_ttl_secs: 60 * 60 * 24,
            retention_secs: 60 * 60 * 24 * 30,
            cleanup_interval_secs: 60 * 60,
        }
    }
}

impl AuthSection {
    pub fn grant_ttl(&self) -> Duration {
        Duration::from_secs(self.grant_ttl_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs.max(1))
    }
}

/// Request router settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RouterSection {
    pub workers: usize,
    pub queue_depth: usize,
    pub default_timeout_ms: u64,
}

impl Default for RouterSection {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_depth: 64,
            default_timeout_ms: 30_000,
        }
    }
}

impl RouterSection {
    pub fn to_router_config(&self) -> devhub_gateway::RouterConfig {
        devhub_gateway::RouterConfig {
            workers: self.workers,
            queue_depth: self.queue_depth,
            default_timeout: Duration::from_millis(self.default_timeout_ms),
        }
    }
}

/// Load a config file; `None` yields the demo defaults
pub fn load(path: Option<&str>) -> anyhow::Result<DevhubConfig> {
    match path {
        Some(path) => {
            let raw = std::fs::read_to_string(Path::new(path))?;
            Ok(toml::from_str(&raw)?)
        }
        None => Ok(DevhubConfig::default()),
    }
}
