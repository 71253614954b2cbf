use crate::error::{ReconcileError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE: &str = "ordersync.yaml";

/// Timeouts above this are accepted but almost always a typo.
const LARGE_TIMEOUT_MS: u64 = 60_000;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

impl ConfigWarning {
    fn error(message: impl Into<String>) -> Self {
        Self {
            level: WarnLevel::Error,
            message: message.into(),
        }
    }

    fn warning(message: impl Into<String>) -> Self {
        Self {
            level: WarnLevel::Warning,
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Backends
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OrderStoreConfig {
    /// In-process store, optionally seeded from a YAML list of orders.
    Memory {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seed: Option<PathBuf>,
    },
    Postgres {
        url: String,
        #[serde(default = "default_max_connections")]
        max_connections: u32,
    },
}

fn default_max_connections() -> u32 {
    5
}

impl Default for OrderStoreConfig {
    fn default() -> Self {
        OrderStoreConfig::Memory { seed: None }
    }
}

impl OrderStoreConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            OrderStoreConfig::Memory { .. } => "memory",
            OrderStoreConfig::Postgres { .. } => "postgres",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrackingCacheConfig {
    #[default]
    Memory,
    Redb {
        path: PathBuf,
    },
    /// The tracking service's REST API.
    Http {
        base_url: String,
    },
}

impl TrackingCacheConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            TrackingCacheConfig::Memory => "memory",
            TrackingCacheConfig::Redb { .. } => "redb",
            TrackingCacheConfig::Http { .. } => "http",
        }
    }
}

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    7878
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
    #[serde(default = "default_repair_concurrency")]
    pub repair_concurrency: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub order_store: OrderStoreConfig,
    #[serde(default)]
    pub tracking_cache: TrackingCacheConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

fn default_version() -> u32 {
    1
}

fn default_store_timeout_ms() -> u64 {
    2000
}

fn default_repair_concurrency() -> usize {
    8
}

fn default_batch_size() -> usize {
    500
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            store_timeout_ms: default_store_timeout_ms(),
            repair_concurrency: default_repair_concurrency(),
            batch_size: default_batch_size(),
            order_store: OrderStoreConfig::default(),
            tracking_cache: TrackingCacheConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Config {
    /// Starter configuration written by `ordersync init`: a seeded memory
    /// order store and a redb tracking cache, both next to the config file.
    pub fn starter() -> Self {
        Self {
            order_store: OrderStoreConfig::Memory {
                seed: Some(PathBuf::from("orders.yaml")),
            },
            tracking_cache: TrackingCacheConfig::Redb {
                path: PathBuf::from(".ordersync/tracking.redb"),
            },
            ..Self::default()
        }
    }

    pub fn default_path() -> PathBuf {
        PathBuf::from(CONFIG_FILE)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    /// Load from `path`. Relative file paths inside the config are resolved
    /// against the config file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ReconcileError::NotConfigured(path.to_path_buf()));
        }
        let data = std::fs::read_to_string(path)?;
        let mut cfg: Config = if data.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(&data)?
        };
        if let Some(base) = path.parent() {
            cfg.resolve_paths(base);
        }
        Ok(cfg)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(path, data.as_bytes())
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() && !p.as_os_str().is_empty() {
                *p = base.join(&*p);
            }
        };
        if let OrderStoreConfig::Memory { seed: Some(seed) } = &mut self.order_store {
            resolve(seed);
        }
        if let TrackingCacheConfig::Redb { path } = &mut self.tracking_cache {
            resolve(path);
        }
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.store_timeout_ms == 0 {
            warnings.push(ConfigWarning::error("store_timeout_ms must be greater than 0"));
        } else if self.store_timeout_ms > LARGE_TIMEOUT_MS {
            warnings.push(ConfigWarning::warning(format!(
                "store_timeout_ms={} (>{}ms is unusual)",
                self.store_timeout_ms, LARGE_TIMEOUT_MS
            )));
        }
        if self.repair_concurrency == 0 {
            warnings.push(ConfigWarning::error("repair_concurrency must be greater than 0"));
        }
        if self.batch_size == 0 {
            warnings.push(ConfigWarning::error("batch_size must be greater than 0"));
        }

        match &self.order_store {
            OrderStoreConfig::Memory { seed: Some(seed) } if !seed.exists() => {
                warnings.push(ConfigWarning::warning(format!(
                    "order_store seed file '{}' does not exist",
                    seed.display()
                )));
            }
            OrderStoreConfig::Memory { .. } => {}
            OrderStoreConfig::Postgres {
                url,
                max_connections,
            } => {
                if url.trim().is_empty() {
                    warnings.push(ConfigWarning::error("order_store.url is empty"));
                }
                if *max_connections == 0 {
                    warnings.push(ConfigWarning::error(
                        "order_store.max_connections must be greater than 0",
                    ));
                }
            }
        }

        match &self.tracking_cache {
            TrackingCacheConfig::Memory => {}
            TrackingCacheConfig::Redb { path } => {
                if path.as_os_str().is_empty() {
                    warnings.push(ConfigWarning::error("tracking_cache.path is empty"));
                }
            }
            TrackingCacheConfig::Http { base_url } => {
                if base_url.trim().is_empty() {
                    warnings.push(ConfigWarning::error("tracking_cache.base_url is empty"));
                } else if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
                    warnings.push(ConfigWarning::warning(format!(
                        "tracking_cache.base_url '{base_url}' has no http(s) scheme"
                    )));
                }
            }
        }

        warnings
    }

    /// Fail with `InvalidConfig` on the first error-level finding.
    pub fn ensure_valid(&self) -> Result<()> {
        match self
            .validate()
            .into_iter()
            .find(|w| w.level == WarnLevel::Error)
        {
            Some(w) => Err(ReconcileError::InvalidConfig(w.message)),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
