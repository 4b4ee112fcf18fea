//! Configuration management
//!
//! Configuration is stored in TOML format at ~/.beacon/config.toml, or at
//! the path given with `--config`. A default file is written on first run.
//!
//! # Configuration Sections
//!
//! - **core**: Log level
//! - **observe**: Default compositor timeout
//! - **node**: Identity of the local node and its grid
//! - **launcher**: Backend selection and shutdown grace period
//! - **bench**: Parameters of the scheduling-strategy benchmark
//!
//! # Examples
//!
//! ```no_run
//! use beacon_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//!
//! println!("Node: {}", config.node.name);
//! println!("Observe timeout: {:?}", config.observe.timeout());
//! # Ok(())
//! # }
//! ```

use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::launcher::Subnet;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Core engine settings
    #[serde(default)]
    pub core: CoreConfig,

    /// Compositor settings
    #[serde(default)]
    pub observe: ObserveConfig,

    /// Local node identity
    #[serde(default)]
    pub node: NodeConfig,

    /// Launcher backends
    #[serde(default)]
    pub launcher: LauncherConfig,

    /// Strategy benchmark
    #[serde(default)]
    pub bench: BenchConfig,
}

/// Core engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObserveConfig {
    /// Seconds a one-shot observe waits for all observables to be ready
    #[serde(default = "default_observe_timeout")]
    pub timeout_secs: u64,
}

impl ObserveConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Local node identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default = "default_node_name")]
    pub name: String,

    /// Position of the node in the grid, starting at 1
    #[serde(default = "default_node_number")]
    pub number: u32,

    #[serde(default = "default_overlay_ip")]
    pub overlay_ip: Ipv4Addr,

    #[serde(default = "default_grid_name")]
    pub grid_name: String,

    #[serde(default = "default_grid_subnet")]
    pub grid_subnet: Subnet,

    /// Number of initial cluster members
    #[serde(default = "default_initial_size")]
    pub initial_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LauncherConfig {
    /// Use backends that only log what they would do
    #[serde(default = "default_true")]
    pub dry_run: bool,

    /// Seconds actors get to stop before being aborted
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
}

impl LauncherConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchConfig {
    /// Concurrent requests issued per strategy
    #[serde(default = "default_bench_requests")]
    pub requests: usize,

    /// Producer delay lower bound in milliseconds
    #[serde(default)]
    pub delay_min_ms: u64,

    /// Producer delay upper bound in milliseconds
    #[serde(default = "default_delay_max")]
    pub delay_max_ms: u64,

    /// Poll interval of the poll-wait strategy in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Per-request timeout in seconds
    #[serde(default = "default_observe_timeout")]
    pub timeout_secs: u64,

    /// Send a ping after every this many requests
    #[serde(default = "default_ping_every")]
    pub ping_every: usize,
}

impl BenchConfig {
    pub fn delay_min(&self) -> Duration {
        Duration::from_millis(self.delay_min_ms)
    }

    pub fn delay_max(&self) -> Duration {
        Duration::from_millis(self.delay_max_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_observe_timeout() -> u64 {
    30
}

fn default_node_name() -> String {
    "node-1".to_string()
}

fn default_node_number() -> u32 {
    1
}

fn default_overlay_ip() -> Ipv4Addr {
    Ipv4Addr::new(10, 81, 0, 1)
}

fn default_grid_name() -> String {
    "default".to_string()
}

fn default_grid_subnet() -> Subnet {
    Subnet::DEFAULT_GRID
}

fn default_initial_size() -> u32 {
    1
}

fn default_shutdown_grace() -> u64 {
    5
}

fn default_bench_requests() -> usize {
    200
}

fn default_delay_max() -> u64 {
    100
}

fn default_poll_interval() -> u64 {
    10
}

fn default_ping_every() -> usize {
    10
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for ObserveConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_observe_timeout(),
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: default_node_name(),
            number: default_node_number(),
            overlay_ip: default_overlay_ip(),
            grid_name: default_grid_name(),
            grid_subnet: default_grid_subnet(),
            initial_size: default_initial_size(),
        }
    }
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            dry_run: true,
            shutdown_grace_secs: default_shutdown_grace(),
        }
    }
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            requests: default_bench_requests(),
            delay_min_ms: 0,
            delay_max_ms: default_delay_max(),
            poll_interval_ms: default_poll_interval(),
            timeout_secs: default_observe_timeout(),
            ping_every: default_ping_every(),
        }
    }
}

impl Config {
    /// Load configuration from the default location
    ///
    /// Creates ~/.beacon/config.toml with default values if it doesn't exist.
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;
        Self::load_or_create_at(&config_path)
    }

    /// Load configuration from `path`, writing defaults there if missing
    pub fn load_or_create_at(path: &Path) -> Result<Self, EngineError> {
        let path = expand_path(path)?;

        if path.exists() {
            Self::load_from_path(&path)
        } else {
            Self::create_default(&path)
        }
    }

    /// Load configuration from an existing file
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml(&contents)
    }

    /// Parse and validate configuration text
    pub fn from_toml(contents: &str) -> Result<Self, EngineError> {
        let config: Config = toml::from_str(contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let config = Self::default();
        config.validate()?;

        let toml_string = toml::to_string_pretty(&config)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(config)
    }

    fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".beacon").join("config.toml"))
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        if self.observe.timeout_secs == 0 {
            return Err(EngineError::Config(
                "observe.timeout_secs must be at least 1".to_string(),
            ));
        }

        if self.node.name.trim().is_empty() {
            return Err(EngineError::Config("node.name must not be empty".to_string()));
        }
        if self.node.number == 0 {
            return Err(EngineError::Config("node.number starts at 1".to_string()));
        }
        if self.node.initial_size == 0 {
            return Err(EngineError::Config(
                "node.initial_size must be at least 1".to_string(),
            ));
        }
        if !self.node.grid_subnet.contains(self.node.overlay_ip) {
            return Err(EngineError::Config(format!(
                "node.overlay_ip {} is outside grid subnet {}",
                self.node.overlay_ip, self.node.grid_subnet
            )));
        }
        // Initial members must fit in the subnet
        self.node.grid_subnet.host_at(self.node.initial_size)?;

        if self.bench.delay_min_ms > self.bench.delay_max_ms {
            return Err(EngineError::Config(format!(
                "bench.delay_min_ms ({}) exceeds bench.delay_max_ms ({})",
                self.bench.delay_min_ms, self.bench.delay_max_ms
            )));
        }
        if self.bench.poll_interval_ms == 0 {
            return Err(EngineError::Config(
                "bench.poll_interval_ms must be at least 1".to_string(),
            ));
        }
        if self.bench.ping_every == 0 {
            return Err(EngineError::Config(
                "bench.ping_every must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

/// Expand a leading `~` to the user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}
