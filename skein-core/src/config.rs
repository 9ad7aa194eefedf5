use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Top-level configuration for the Skein server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkeinConfig {
    /// HTTP control-plane configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Store and persistence configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Bulk loading at boot
    #[serde(default)]
    pub loader: LoaderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listener address for the REST API
    #[serde(default = "default_addr")]
    pub addr: SocketAddr,

    /// Default log filter (overridden by RUST_LOG)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Mirror directory for images, aliases, versions, and suspensions.
    /// `None` keeps the whole store in memory.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// Maximum retained suspension records (oldest evicted first)
    #[serde(default = "default_suspension_capacity")]
    pub suspension_capacity: usize,

    /// Latency samples kept per canary side
    #[serde(default = "default_latency_ring")]
    pub latency_ring: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Directory scanned for pipeline sources at boot
    #[serde(default)]
    pub directory: Option<PathBuf>,

    /// Descend into subdirectories
    #[serde(default = "default_true")]
    pub recursive: bool,

    /// Abort boot on the first load failure
    #[serde(default)]
    pub fail_on_error: bool,

    /// How loaded pipelines are aliased
    #[serde(default)]
    pub alias_strategy: AliasStrategy,
}

/// Alias assignment for bulk-loaded pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AliasStrategy {
    /// Alias is the file stem; collisions are per-file errors.
    #[default]
    FileName,
    /// Alias is the `/`-separated path relative to the base directory,
    /// extension stripped.
    RelativePath,
    /// No alias; pipelines are addressable by hash only.
    HashOnly,
}

fn default_addr() -> SocketAddr {
    "127.0.0.1:7600".parse().expect("valid default addr")
}

fn default_log_level() -> String {
    "info".into()
}

fn default_suspension_capacity() -> usize {
    10_000
}

fn default_latency_ring() -> usize {
    crate::canary::DEFAULT_LATENCY_RING
}

fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            log_level: default_log_level(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            suspension_capacity: default_suspension_capacity(),
            latency_ring: default_latency_ring(),
        }
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            directory: None,
            recursive: default_true(),
            fail_on_error: false,
            alias_strategy: AliasStrategy::FileName,
        }
    }
}

impl Default for SkeinConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            store: StoreConfig::default(),
            loader: LoaderConfig::default(),
        }
    }
}

impl SkeinConfig {
    /// Load from a YAML file layered with `SKEIN_`-prefixed environment
    /// variables (`SKEIN_SERVER__ADDR`, `SKEIN_STORE__DATA_DIR`, ...).
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let config = Figment::new()
            .merge(Yaml::file(path))
            .merge(Env::prefixed("SKEIN_").split("__"))
            .extract()?;
        Ok(config)
    }
}
