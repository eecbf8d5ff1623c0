//! Configuration system for the relay worker
//!
//! Supports multiple configuration sources with the following precedence (highest to lowest):
//! 1. CLI arguments
//! 2. Environment variables (RELAY_* prefix)
//! 3. Configuration file (TOML)
//! 4. Default values

use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::compute::BackendType;
use crate::error::{Error, Result};

/// Main relay configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Node identity
    pub node: NodeSettings,

    /// WebSocket listener settings
    pub server: ServerSettings,

    /// Compute backend and default operands
    pub compute: ComputeSettings,

    /// Inbound message validation rules
    pub validation: ValidationSettings,

    /// Upstream relay peers this node dials
    pub peers: PeerSettings,

    /// Logging configuration
    pub logging: LoggingSettings,
}

/// Node identity settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSettings {
    /// Node identifier (auto-generated if not set)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Human-readable node name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// WebSocket listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Address the relay listens on
    pub listen_addr: String,

    /// Maximum simultaneous inbound sessions; upstream links are not counted
    pub max_connections: usize,

    /// Per-connection outbound queue depth; results that do not fit are refused
    pub outbound_queue_size: usize,

    /// Interval between stats log lines in milliseconds (0 = disabled)
    pub stats_interval_ms: u64,
}

/// Compute settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComputeSettings {
    /// Backend name: cpu or mock
    pub backend: String,

    /// Maximum compute threads (0 = auto)
    pub max_threads: u32,

    /// Per-task compute timeout in milliseconds (0 = no timeout)
    pub timeout_ms: u64,

    /// Left operand used when a message carries none
    pub default_a: Vec<f64>,

    /// Right operand used when a message carries none
    pub default_b: Vec<f64>,
}

/// Validation rules for inbound messages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationSettings {
    /// Largest accepted payload in bytes
    pub max_message_bytes: usize,

    /// Text payloads must parse as JSON
    pub require_json: bool,

    /// Accept binary frames
    pub allow_binary: bool,

    /// Relay payloads that are themselves compute results
    pub relay_results: bool,
}

/// Upstream peer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerSettings {
    /// WebSocket URLs of relays to dial
    pub upstream: Vec<String>,

    /// Initial reconnection delay in milliseconds
    pub reconnect_interval_ms: u64,

    /// Maximum reconnection delay in milliseconds
    pub max_reconnect_delay_ms: u64,

    /// Maximum reconnection attempts (0 = infinite)
    pub max_reconnect_attempts: u32,

    /// Connection timeout in milliseconds
    pub connect_timeout_ms: u64,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level: trace, debug, info, warn, error
    pub level: String,

    /// Log file path (empty = no file logging)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// Maximum log file size in MB before rotation
    pub max_file_size_mb: u64,

    /// Number of rotated log files to keep
    pub max_files: u32,

    /// Enable JSON formatted logging
    pub json_format: bool,
}

// Default implementations

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:9300".to_string(),
            max_connections: 256,
            outbound_queue_size: 64,
            stats_interval_ms: 60_000,
        }
    }
}

impl Default for ComputeSettings {
    fn default() -> Self {
        Self {
            backend: "cpu".to_string(),
            max_threads: 0, // Auto-detect
            timeout_ms: 5_000,
            default_a: vec![1.0, 2.0, 3.0],
            default_b: vec![3.0, 2.0, 1.0],
        }
    }
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            max_message_bytes: 64 * 1024,
            require_json: false,
            allow_binary: true,
            relay_results: false,
        }
    }
}

impl Default for PeerSettings {
    fn default() -> Self {
        Self {
            upstream: vec![],
            reconnect_interval_ms: 1_000,
            max_reconnect_delay_ms: 60_000,
            max_reconnect_attempts: 0, // Infinite
            connect_timeout_ms: 10_000,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            max_file_size_mb: 100,
            max_files: 5,
            json_format: false,
        }
    }
}

impl RelayConfig {
    /// Load configuration from file with environment variable overrides
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = Self::find_config_file(config_path)? {
            debug!(path = %path.display(), "Loading configuration file");
            let content = fs::read_to_string(&path)
                .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;
            config = toml::from_str(&content).map_err(|e| Error::ConfigParse {
                message: e.to_string(),
                source: Some(e),
            })?;
            info!(path = %path.display(), "Configuration loaded from file");
        }

        config.apply_env_overrides();
        config.expand_paths();
        config.validate()?;

        Ok(config)
    }

    /// Find the configuration file to use
    fn find_config_file(explicit_path: Option<&str>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit_path {
            let path = PathBuf::from(expand_path(path));
            if path.exists() {
                return Ok(Some(path));
            }
            return Err(Error::config_not_found(path));
        }

        let search_paths = [
            PathBuf::from("relay-worker.toml"),
            PathBuf::from("config.toml"),
            dirs::config_dir()
                .map(|p| p.join("relay").join("worker.toml"))
                .unwrap_or_default(),
            dirs::home_dir()
                .map(|p| p.join(".relay").join("worker.toml"))
                .unwrap_or_default(),
            PathBuf::from("/etc/relay/worker.toml"),
        ];

        for path in &search_paths {
            if path.is_file() {
                debug!(path = %path.display(), "Found configuration file");
                return Ok(Some(path.clone()));
            }
        }

        debug!("No configuration file found, using defaults");
        Ok(None)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("RELAY_NODE_ID") {
            self.node.id = Some(val);
        }
        if let Ok(val) = std::env::var("RELAY_NODE_NAME") {
            self.node.name = Some(val);
        }

        if let Ok(val) = std::env::var("RELAY_LISTEN_ADDR") {
            self.server.listen_addr = val;
        }
        if let Some(n) = env_parse("RELAY_MAX_CONNECTIONS") {
            self.server.max_connections = n;
        }

        if let Ok(val) = std::env::var("RELAY_COMPUTE_BACKEND") {
            self.compute.backend = val;
        }
        if let Some(n) = env_parse("RELAY_COMPUTE_THREADS") {
            self.compute.max_threads = n;
        }
        if let Some(n) = env_parse("RELAY_COMPUTE_TIMEOUT_MS") {
            self.compute.timeout_ms = n;
        }

        if let Some(n) = env_parse("RELAY_MAX_MESSAGE_BYTES") {
            self.validation.max_message_bytes = n;
        }
        if let Ok(val) = std::env::var("RELAY_REQUIRE_JSON") {
            self.validation.require_json = env_flag(&val);
        }

        if let Ok(val) = std::env::var("RELAY_UPSTREAM") {
            self.peers.upstream = val
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }

        if let Ok(val) = std::env::var("RELAY_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("RELAY_LOG_FILE") {
            self.logging.file = Some(val);
        }
        if let Ok(val) = std::env::var("RELAY_LOG_JSON") {
            self.logging.json_format = env_flag(&val);
        }
    }

    /// Expand ~ and other path variables
    fn expand_paths(&mut self) {
        if let Some(ref file) = self.logging.file {
            self.logging.file = Some(expand_path(file));
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.listen_addr()?;

        if self.server.max_connections == 0 {
            return Err(Error::config_field_invalid(
                "server.max_connections",
                "max_connections must be at least 1",
            ));
        }
        if self.server.outbound_queue_size == 0 {
            return Err(Error::config_field_invalid(
                "server.outbound_queue_size",
                "outbound_queue_size must be at least 1",
            ));
        }

        if BackendType::from_name(&self.compute.backend).is_none() {
            return Err(Error::config_field_invalid(
                "compute.backend",
                format!("Unknown compute backend '{}'. Must be one of: cpu, mock", self.compute.backend),
            ));
        }
        if self.compute.default_a.is_empty() || self.compute.default_b.is_empty() {
            return Err(Error::config_field_invalid(
                "compute.default_a",
                "Default operands must contain at least one element",
            ));
        }
        if self.compute.default_a.len() != self.compute.default_b.len() {
            return Err(Error::config_field_invalid(
                "compute.default_b",
                format!(
                    "Default operands differ in length ({} vs {})",
                    self.compute.default_a.len(),
                    self.compute.default_b.len()
                ),
            ));
        }

        if self.validation.max_message_bytes == 0 {
            return Err(Error::config_field_invalid(
                "validation.max_message_bytes",
                "max_message_bytes must be at least 1",
            ));
        }

        for upstream in &self.peers.upstream {
            if !upstream.starts_with("ws://") && !upstream.starts_with("wss://") {
                return Err(Error::config_field_invalid(
                    "peers.upstream",
                    format!("Upstream URL '{}' must start with ws:// or wss://", upstream),
                ));
            }
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(Error::config_field_invalid(
                "logging.level",
                format!(
                    "Invalid log level '{}'. Must be one of: {}",
                    self.logging.level,
                    valid_levels.join(", ")
                ),
            ));
        }

        Ok(())
    }

    /// Parsed listen address
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.server.listen_addr.parse().map_err(|_| {
            Error::config_field_invalid(
                "server.listen_addr",
                format!("Invalid listen address '{}'", self.server.listen_addr),
            )
        })
    }

    /// Effective compute thread count
    pub fn compute_threads(&self) -> usize {
        if self.compute.max_threads > 0 {
            self.compute.max_threads as usize
        } else {
            num_cpus::get()
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_flag(val: &str) -> bool {
    val.eq_ignore_ascii_case("true") || val == "1"
}

/// Expand ~ and environment variables in paths
fn expand_path(path: &str) -> String {
    shellexpand::full(path)
        .unwrap_or_else(|_| std::borrow::Cow::Borrowed(path))
        .into_owned()
}

/// Initialize a new configuration file
pub fn init_config(path: Option<&str>, force: bool) -> Result<PathBuf> {
    let config_path = path
        .map(|p| PathBuf::from(expand_path(p)))
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".relay")
                .join("worker.toml")
        });

    if config_path.exists() && !force {
        return Err(Error::Config(format!(
            "Configuration file already exists: {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::IoWrite {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    fs::write(&config_path, generate_default_config()).map_err(|e| Error::IoWrite {
        path: config_path.clone(),
        source: e,
    })?;

    Ok(config_path)
}

/// Default configuration content with comments
fn generate_default_config() -> String {
    r#"# Relay Worker Configuration

[node]
# Node identifier (auto-generated if not set)
# id = "relay-abc123"

# Human-readable node name
# name = "My Relay"

[server]
# Address the relay listens on for WebSocket peers
listen_addr = "0.0.0.0:9300"

# Maximum simultaneous inbound sessions (upstream links are not counted)
max_connections = 256

# Per-connection outbound queue depth; results that do not fit are refused
outbound_queue_size = 64

# Interval between stats log lines in milliseconds (0 = disabled)
stats_interval_ms = 60000

[compute]
# Backend: cpu or mock
backend = "cpu"

# Maximum compute threads (0 = auto-detect)
max_threads = 0

# Per-task compute timeout in milliseconds (0 = no timeout)
timeout_ms = 5000

# Operands used when an inbound message carries none
default_a = [1.0, 2.0, 3.0]
default_b = [3.0, 2.0, 1.0]

[validation]
# Largest accepted payload in bytes
max_message_bytes = 65536

# Text payloads must parse as JSON
require_json = false

# Accept binary frames
allow_binary = true

# Relay messages that are compute results from another relay
# (leave off in meshes with cycles)
relay_results = false

[peers]
# Relays this node dials, e.g. ["ws://10.0.0.2:9300"]
upstream = []

# Initial reconnection delay in milliseconds
reconnect_interval_ms = 1000

# Maximum reconnection delay in milliseconds
max_reconnect_delay_ms = 60000

# Maximum reconnection attempts (0 = infinite)
max_reconnect_attempts = 0

# Connection timeout in milliseconds
connect_timeout_ms = 10000

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log file path (comment out to disable file logging)
# file = "~/.relay/logs/worker.log"

# Maximum log file size in MB before rotation
max_file_size_mb = 100

# Number of rotated log files to keep
max_files = 5

# Enable JSON formatted logging
json_format = false
"#
    .to_string()
}
