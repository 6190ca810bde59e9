//! Periodic liveness probing of the scanner connection.
//!
//! Every `ping_interval` the monitor looks at the scanner slot:
//!
//! - no scanner → nothing to do;
//! - the scanner left `max_missed_pings` probes unanswered → close it and
//!   free the slot so the firmware's reconnect can take it over;
//! - otherwise → count one more outstanding probe and send a WebSocket ping.
//!
//! Any pong or inbound frame from the scanner resets the count (see
//! [`ConnectionHandle::record_activity`]).  Dashboards are not probed; their
//! own reconnect logic covers dead browser tabs.
//!
//! [`ConnectionHandle::record_activity`]: super::registry::ConnectionHandle::record_activity

use std::sync::Arc;
use std::time::Duration;

use stockroom_core::Liveness;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};
use uuid::Uuid;

use super::registry::ConnectionRegistry;

/// What a single monitor tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    NoScanner,
    /// A ping was queued; `outstanding` probes are now unanswered.
    Probed { outstanding: u32 },
    /// The scanner was closed and removed.
    Evicted { id: Uuid },
}

/// Drives probes against the registry's scanner slot.
#[derive(Debug, Clone)]
pub struct LivenessMonitor {
    registry: Arc<ConnectionRegistry>,
    max_missed_pings: u32,
}

impl LivenessMonitor {
    pub fn new(registry: Arc<ConnectionRegistry>, max_missed_pings: u32) -> Self {
        Self {
            registry,
            max_missed_pings,
        }
    }

    /// Runs one probe step.
    pub async fn tick(&self) -> ProbeOutcome {
        let Some(scanner) = self.registry.current_scanner().await else {
            return ProbeOutcome::NoScanner;
        };

        let missed = scanner.missed_probes();
        if Liveness::from_missed(missed, self.max_missed_pings) == Liveness::Dead {
            warn!(
                conn_id = %scanner.id(),
                peer = %scanner.peer_addr(),
                missed,
                "scanner stopped answering pings; closing"
            );
            scanner.close();
            self.registry.remove_connection(scanner.id()).await;
            return ProbeOutcome::Evicted { id: scanner.id() };
        }

        match scanner.send_ping() {
            Ok(()) => {
                let outstanding = scanner.record_probe_sent();
                debug!(conn_id = %scanner.id(), outstanding, "pinged scanner");
                ProbeOutcome::Probed { outstanding }
            }
            Err(e) => {
                warn!(conn_id = %scanner.id(), error = %e, "scanner ping failed; removing");
                self.registry.remove_connection(scanner.id()).await;
                ProbeOutcome::Evicted { id: scanner.id() }
            }
        }
    }

    /// Ticks forever at `ping_interval`.  The first probe goes out one full
    /// interval after start.  Stop it by aborting the task it runs in.
    ///
    /// A zero interval disables the monitor: it logs a warning and returns.
    pub async fn run(self, ping_interval: Duration) {
        if ping_interval.is_zero() {
            warn!("ping interval is zero; scanner liveness monitor disabled");
            return;
        }
        let mut ticker = interval(ping_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick resolves immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
