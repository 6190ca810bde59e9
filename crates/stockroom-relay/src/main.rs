//! Stock-room scan relay: entry point.
//!
//! Accepts WebSocket connections from the RFID scanner and from inventory
//! dashboards, fans scan reports out to the dashboards, and forwards beep
//! commands to the scanner.
//!
//! # Usage
//!
//! ```text
//! stockroom-relay [OPTIONS]
//!
//! Options:
//!   --config <FILE>            Optional relay.toml
//!   --bind <IP>                Listener IP       [default: 0.0.0.0]
//!   --port <PORT>              Listener port     [default: 8080]
//!   --ping-interval-ms <MS>    Scanner ping interval [default: 30000]
//!   --max-missed-pings <N>     Unanswered pings before the scanner is dropped [default: 3]
//! ```
//!
//! # Precedence
//!
//! Command-line flag (or its environment variable) > config file > built-in
//! default.
//!
//! | Variable                    | Flag                 |
//! |-----------------------------|----------------------|
//! | `STOCKROOM_CONFIG`          | `--config`           |
//! | `STOCKROOM_BIND`            | `--bind`             |
//! | `STOCKROOM_PORT`            | `--port`             |
//! | `STOCKROOM_PING_INTERVAL_MS`| `--ping-interval-ms` |
//! | `STOCKROOM_MAX_MISSED_PINGS`| `--max-missed-pings` |

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use stockroom_relay::domain::RelayConfig;
use stockroom_relay::infrastructure::config_file::{load_config, RelayFileConfig};
use stockroom_relay::infrastructure::run_server;

/// Time given to connection writer tasks to flush close frames on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(250);

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Stock-room scan relay.
///
/// Bridges one RFID scanner to any number of inventory dashboards.
#[derive(Debug, Parser)]
#[command(
    name = "stockroom-relay",
    about = "WebSocket relay between a stock-room RFID scanner and inventory dashboards",
    version
)]
struct Cli {
    /// Path to a relay.toml file.  A missing file is treated as empty.
    #[arg(long, env = "STOCKROOM_CONFIG")]
    config: Option<PathBuf>,

    /// IP address to bind the listener to.
    #[arg(long, env = "STOCKROOM_BIND")]
    bind: Option<String>,

    /// TCP port for the listener.
    #[arg(long, env = "STOCKROOM_PORT")]
    port: Option<u16>,

    /// Interval between liveness pings to the scanner, in milliseconds.
    #[arg(long, env = "STOCKROOM_PING_INTERVAL_MS")]
    ping_interval_ms: Option<u64>,

    /// Consecutive unanswered pings before the scanner is dropped (0 = never).
    #[arg(long, env = "STOCKROOM_MAX_MISSED_PINGS")]
    max_missed_pings: Option<u32>,
}

impl Cli {
    /// Layers the CLI flags over `file` and produces a [`RelayConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if the bind address from either source is not an IP,
    /// or if the ping interval is zero.
    fn into_relay_config(self, file: RelayFileConfig) -> anyhow::Result<RelayConfig> {
        let base = file
            .into_relay_config()
            .context("invalid relay config file")?;

        let ip: IpAddr = match self.bind {
            Some(bind) => bind
                .parse()
                .with_context(|| format!("invalid bind address: '{bind}'"))?,
            None => base.bind_addr.ip(),
        };
        let port = self.port.unwrap_or(base.bind_addr.port());
        let ping_interval = self
            .ping_interval_ms
            .map(Duration::from_millis)
            .unwrap_or(base.ping_interval);
        anyhow::ensure!(
            !ping_interval.is_zero(),
            "--ping-interval-ms must be greater than zero"
        );

        Ok(RelayConfig {
            bind_addr: SocketAddr::new(ip, port),
            ping_interval,
            max_missed_pings: self.max_missed_pings.unwrap_or(base.max_missed_pings),
        })
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let file = match &cli.config {
        Some(path) => load_config(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => RelayFileConfig::default(),
    };
    let config = cli.into_relay_config(file)?;

    info!(
        "stock-room scan relay starting: bind={}, ping_interval={:?}, max_missed_pings={}",
        config.bind_addr, config.ping_interval, config.max_missed_pings
    );

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, shutting down relay");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    run_server(config, running).await?;
    tokio::time::sleep(SHUTDOWN_GRACE).await;

    info!("stock-room scan relay stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use stockroom_relay::infrastructure::config_file::parse_config;

    fn config_from(args: &[&str]) -> RelayConfig {
        let cli = Cli::parse_from(args);
        cli.into_relay_config(RelayFileConfig::default()).unwrap()
    }

    #[test]
    fn test_cli_defaults_listen_on_8080() {
        let config = config_from(&["stockroom-relay"]);
        assert_eq!(config.bind_addr.to_string(), "0.0.0.0:8080");
    }

    #[test]
    fn test_cli_defaults_ping_every_30s() {
        let config = config_from(&["stockroom-relay"]);
        assert_eq!(config.ping_interval, Duration::from_secs(30));
        assert_eq!(config.max_missed_pings, 3);
    }

    #[test]
    fn test_cli_port_override() {
        let config = config_from(&["stockroom-relay", "--port", "9999"]);
        assert_eq!(config.bind_addr.port(), 9999);
    }

    #[test]
    fn test_cli_bind_override() {
        let config = config_from(&["stockroom-relay", "--bind", "127.0.0.1"]);
        assert_eq!(config.bind_addr.ip().to_string(), "127.0.0.1");
    }

    #[test]
    fn test_cli_liveness_overrides() {
        let config = config_from(&[
            "stockroom-relay",
            "--ping-interval-ms",
            "5000",
            "--max-missed-pings",
            "0",
        ]);
        assert_eq!(config.ping_interval, Duration::from_millis(5000));
        assert_eq!(config.max_missed_pings, 0);
    }

    #[test]
    fn test_zero_ping_interval_flag_returns_error() {
        let cli = Cli::parse_from(["stockroom-relay", "--ping-interval-ms", "0"]);

        let err = cli
            .into_relay_config(RelayFileConfig::default())
            .unwrap_err();

        assert!(err.to_string().contains("ping-interval-ms"));
    }

    #[test]
    fn test_zero_ping_interval_in_file_returns_error() {
        let file = parse_config("[liveness]\nping_interval_ms = 0\n").unwrap();
        let cli = Cli::parse_from(["stockroom-relay"]);

        assert!(cli.into_relay_config(file).is_err());
    }

    #[test]
    fn test_file_values_apply_when_flags_absent() {
        let file = parse_config("[network]\nport = 7000\n[liveness]\nmax_missed_pings = 9\n")
            .unwrap();
        let cli = Cli::parse_from(["stockroom-relay"]);

        let config = cli.into_relay_config(file).unwrap();

        assert_eq!(config.bind_addr.port(), 7000);
        assert_eq!(config.max_missed_pings, 9);
    }

    #[test]
    fn test_flags_override_file_values() {
        let file = parse_config("[network]\nport = 7000\n").unwrap();
        let cli = Cli::parse_from(["stockroom-relay", "--port", "7100"]);

        let config = cli.into_relay_config(file).unwrap();

        assert_eq!(config.bind_addr.port(), 7100);
    }

    #[test]
    fn test_invalid_bind_returns_error() {
        let cli = Cli {
            config: None,
            bind: Some("not.an.ip".to_string()),
            port: None,
            ping_interval_ms: None,
            max_missed_pings: None,
        };

        assert!(cli.into_relay_config(RelayFileConfig::default()).is_err());
    }
}
