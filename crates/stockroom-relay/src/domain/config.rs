//! Relay configuration types.
//!
//! [`RelayConfig`] is the single source of truth for all runtime settings.
//! `main.rs` builds it from CLI arguments layered over an optional TOML file;
//! tests build it directly.

use std::net::SocketAddr;
use std::time::Duration;

/// Default listening port for scanner and dashboard connections.
pub const DEFAULT_PORT: u16 = 8080;

/// Default interval between liveness probes sent to the scanner.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_millis(30_000);

/// Default number of consecutive unanswered probes before the scanner is dropped.
pub const DEFAULT_MAX_MISSED_PINGS: u32 = 3;

/// All runtime configuration for the relay.
///
/// # Example
///
/// ```rust
/// use stockroom_relay::domain::RelayConfig;
///
/// let cfg = RelayConfig::default();
/// assert_eq!(cfg.bind_addr.port(), 8080);
/// ```
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address the WebSocket listener binds to.  `0.0.0.0` accepts the
    /// scanner and dashboards from any interface on the shop LAN.
    pub bind_addr: SocketAddr,

    /// How often the liveness monitor pings the scanner.
    pub ping_interval: Duration,

    /// Consecutive unanswered pings after which the scanner connection is
    /// closed and its slot freed.  `0` disables eviction.
    pub max_missed_pings: u32,
}

impl Default for RelayConfig {
    /// | Field            | Default        |
    /// |------------------|----------------|
    /// | bind_addr        | `0.0.0.0:8080` |
    /// | ping_interval    | 30 seconds     |
    /// | max_missed_pings | 3              |
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            ping_interval: DEFAULT_PING_INTERVAL,
            max_missed_pings: DEFAULT_MAX_MISSED_PINGS,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
