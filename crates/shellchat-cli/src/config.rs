//! Configuration system for the shellchat CLI.

use serde::{Deserialize, Serialize};
use shellchat_core::{HostConfig, Multiaddr};
use shellchat_discovery::DiscoveryConfig as DiscoverySettings;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// shellchat configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Node configuration
    #[serde(default)]
    pub node: NodeConfig,
    /// Discovery configuration
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// TCP/UDP listen port, 0 for OS-assigned
    #[serde(default)]
    pub listen_port: u16,
    /// Also listen on QUIC
    #[serde(default = "default_true")]
    pub enable_quic: bool,
    /// Request a gateway port mapping
    #[serde(default = "default_true")]
    pub enable_upnp: bool,
    /// Seconds before an idle connection is closed
    #[serde(default = "default_idle_timeout")]
    pub idle_connection_timeout_secs: u64,
}

/// Discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Dial peers found on the local network
    #[serde(default = "default_true")]
    pub enable_mdns: bool,
    /// Advertise and look up peers in the global DHT
    #[serde(default = "default_true")]
    pub enable_dht: bool,
    /// Seconds between rendezvous lookups
    #[serde(default = "default_lookup_interval")]
    pub lookup_interval_secs: u64,
    /// Dial deadline in seconds
    #[serde(default = "default_dial_timeout")]
    pub dial_timeout_secs: u64,
    /// DHT lookup deadline in seconds
    #[serde(default = "default_lookup_timeout")]
    pub lookup_timeout_secs: u64,
    /// DHT bootstrap peers (multiaddrs ending in `/p2p/<id>`)
    #[serde(default = "default_bootstrap_peers")]
    pub bootstrap_peers: Vec<String>,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database file, defaults to the platform config directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
    /// Messages shown when opening a conversation
    #[serde(default = "default_history_limit")]
    pub history_limit: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values

fn default_true() -> bool {
    true
}

fn default_idle_timeout() -> u64 {
    60
}

fn default_lookup_interval() -> u64 {
    60
}

fn default_dial_timeout() -> u64 {
    10
}

fn default_lookup_timeout() -> u64 {
    30
}

fn default_bootstrap_peers() -> Vec<String> {
    shellchat_core::config::DEFAULT_BOOTSTRAP_PEERS
        .iter()
        .map(ToString::to_string)
        .collect()
}

fn default_history_limit() -> u32 {
    50
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_port: 0,
            enable_quic: true,
            enable_upnp: true,
            idle_connection_timeout_secs: default_idle_timeout(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enable_mdns: true,
            enable_dht: true,
            lookup_interval_secs: default_lookup_interval(),
            dial_timeout_secs: default_dial_timeout(),
            lookup_timeout_secs: default_lookup_timeout(),
            bootstrap_peers: default_bootstrap_peers(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            history_limit: default_history_limit(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;

        // Create parent directory if it doesn't exist
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, contents)?;
        Ok(())
    }

    /// Write this configuration to `path` unless a file is already there
    ///
    /// Returns whether the file was written.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save_if_missing<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<bool> {
        if path.as_ref().exists() {
            return Ok(false);
        }
        self.save(path)?;
        Ok(true)
    }

    /// Default config path, `<config dir>/shellchat/config.toml`
    ///
    /// `None` if the platform has no config directory.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("shellchat").join("config.toml"))
    }

    /// Load `path` if given, else the default file, else defaults
    ///
    /// An explicitly named file must exist.
    ///
    /// # Errors
    ///
    /// Returns an error if a file exists but cannot be read or parsed.
    pub fn load_or_default(path: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }

        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Database file to open
    ///
    /// # Errors
    ///
    /// Returns an error if no path is configured and the platform has no
    /// config directory.
    pub fn database_path(&self) -> anyhow::Result<PathBuf> {
        match &self.storage.database_path {
            Some(path) => Ok(path.clone()),
            None => shellchat_store::default_path()
                .ok_or_else(|| anyhow::anyhow!("No config directory; set storage.database_path")),
        }
    }

    /// Parsed bootstrap multiaddrs
    ///
    /// # Errors
    ///
    /// Returns an error naming the first address that does not parse.
    pub fn bootstrap_peers(&self) -> anyhow::Result<Vec<Multiaddr>> {
        self.discovery
            .bootstrap_peers
            .iter()
            .map(|addr| {
                addr.parse::<Multiaddr>()
                    .map_err(|e| anyhow::anyhow!("Bootstrap peer '{addr}' is invalid: {e}"))
            })
            .collect()
    }

    /// Host settings for this configuration
    ///
    /// # Errors
    ///
    /// Returns an error if a bootstrap address does not parse.
    pub fn host_config(&self, port_override: Option<u16>) -> anyhow::Result<HostConfig> {
        Ok(HostConfig {
            listen_port: port_override.unwrap_or(self.node.listen_port),
            enable_quic: self.node.enable_quic,
            enable_mdns: self.discovery.enable_mdns,
            enable_upnp: self.node.enable_upnp,
            bootstrap_peers: if self.discovery.enable_dht {
                self.bootstrap_peers()?
            } else {
                Vec::new()
            },
            dial_timeout: Duration::from_secs(self.discovery.dial_timeout_secs),
            dht_query_timeout: Duration::from_secs(self.discovery.lookup_timeout_secs),
            idle_connection_timeout: Duration::from_secs(self.node.idle_connection_timeout_secs),
            ..HostConfig::default()
        })
    }

    /// Discovery settings for this configuration
    #[must_use]
    pub fn discovery_settings(&self) -> DiscoverySettings {
        DiscoverySettings {
            enable_mdns: self.discovery.enable_mdns,
            enable_dht: self.discovery.enable_dht,
            lookup_interval: Duration::from_secs(self.discovery.lookup_interval_secs),
            lookup_timeout: Duration::from_secs(self.discovery.lookup_timeout_secs),
            dial_timeout: Duration::from_secs(self.discovery.dial_timeout_secs),
        }
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.node.idle_connection_timeout_secs == 0 {
            anyhow::bail!("node.idle_connection_timeout_secs must be greater than 0");
        }

        let timings = [
            ("discovery.lookup_interval_secs", self.discovery.lookup_interval_secs),
            ("discovery.dial_timeout_secs", self.discovery.dial_timeout_secs),
            ("discovery.lookup_timeout_secs", self.discovery.lookup_timeout_secs),
        ];
        for (name, value) in timings {
            if value == 0 {
                anyhow::bail!("{name} must be greater than 0");
            }
        }

        if self.storage.history_limit == 0 {
            anyhow::bail!("storage.history_limit must be greater than 0");
        }

        // Validate log level
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!(
                "Invalid log level: {}. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            );
        }

        self.bootstrap_peers()?;

        Ok(())
    }
}
