//! Optional TOML configuration file for the relay.
//!
//! ```toml
//! [network]
//! bind_address = "0.0.0.0"
//! port = 8080
//!
//! [liveness]
//! ping_interval_ms = 30000
//! max_missed_pings = 3
//! ```
//!
//! Every field is optional; absent fields take the defaults from
//! [`crate::domain::config`].  Command-line flags override the file.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::config::{
    RelayConfig, DEFAULT_MAX_MISSED_PINGS, DEFAULT_PING_INTERVAL, DEFAULT_PORT,
};

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid bind address {0:?}")]
    InvalidBindAddress(String),

    #[error("ping_interval_ms must be greater than zero")]
    ZeroPingInterval,
}

/// On-disk schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RelayFileConfig {
    #[serde(default)]
    pub network: NetworkSection,
    #[serde(default)]
    pub liveness: LivenessSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkSection {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LivenessSection {
    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,
    #[serde(default = "default_max_missed_pings")]
    pub max_missed_pings: u32,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_ping_interval_ms() -> u64 {
    DEFAULT_PING_INTERVAL.as_millis() as u64
}
fn default_max_missed_pings() -> u32 {
    DEFAULT_MAX_MISSED_PINGS
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for LivenessSection {
    fn default() -> Self {
        Self {
            ping_interval_ms: default_ping_interval_ms(),
            max_missed_pings: default_max_missed_pings(),
        }
    }
}

impl RelayFileConfig {
    /// Converts the file contents into a [`RelayConfig`].
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidBindAddress`] if `bind_address` is not an IP,
    /// and [`ConfigError::ZeroPingInterval`] if `ping_interval_ms` is 0.
    pub fn into_relay_config(self) -> Result<RelayConfig, ConfigError> {
        if self.liveness.ping_interval_ms == 0 {
            return Err(ConfigError::ZeroPingInterval);
        }

        let ip: IpAddr = self
            .network
            .bind_address
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddress(self.network.bind_address.clone()))?;

        Ok(RelayConfig {
            bind_addr: SocketAddr::new(ip, self.network.port),
            ping_interval: Duration::from_millis(self.liveness.ping_interval_ms),
            max_missed_pings: self.liveness.max_missed_pings,
        })
    }
}

/// Parses TOML text.
///
/// # Errors
///
/// [`ConfigError::Parse`] if the TOML is malformed or a field has the wrong type.
pub fn parse_config(content: &str) -> Result<RelayFileConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Loads the config file at `path`.  A missing file yields the defaults.
///
/// # Errors
///
/// [`ConfigError::Io`] for file-system errors other than "not found", and
/// [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<RelayFileConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => parse_config(&content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RelayFileConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
