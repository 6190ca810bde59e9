//! Scan-report fan-out and command forwarding.
//!
//! Both directions are fire-and-forget and at-most-once:
//!
//! ```text
//! Scanner   ──{"uid"}──▶  broadcast()  ──▶ every open dashboard
//! Dashboard ──{"beep"}──▶ forward()    ──▶ the scanner, if connected
//! ```
//!
//! Nothing is queued for peers that are offline and nothing is retried.  A
//! write that fails because the peer's writer task is gone counts as an
//! implicit close: the connection is dropped from the registry and the error
//! goes no further.

use std::sync::Arc;

use stockroom_core::{ScanReport, ScannerCommand};
use tracing::{debug, warn};

use super::registry::{ConnectionHandle, ConnectionRegistry};

/// Sends `report` to every dashboard that is open right now.
///
/// The frame is serialized once.  Clients the relay closed since the snapshot
/// was taken are skipped; clients whose writer task died are removed.
/// Returns the number of clients the frame was queued to.
pub async fn broadcast(registry: &ConnectionRegistry, report: &ScanReport) -> usize {
    let json = match serde_json::to_string(report) {
        Ok(j) => j,
        Err(e) => {
            warn!(error = %e, "failed to serialize scan report");
            return 0;
        }
    };

    let mut failed: Vec<Arc<ConnectionHandle>> = Vec::new();
    let mut recipients = 0usize;
    for client in registry.all_clients().await {
        match client.send_text(json.clone()) {
            Ok(()) => recipients += 1,
            // Closed by the relay; its own close handling reaps it.
            Err(_) if client.is_closing() => {}
            Err(e) => {
                warn!(conn_id = %client.id(), error = %e, "dropping client after failed write");
                failed.push(client);
            }
        }
    }

    for client in failed {
        registry.remove_connection(client.id()).await;
    }

    debug!(uid = %report.uid, recipients, "broadcast scan report");
    recipients
}

/// Sends `command` to the scanner if one is connected.
///
/// Returns `true` when the command was queued.  With no scanner the command
/// is dropped silently.
pub async fn forward(registry: &ConnectionRegistry, command: &ScannerCommand) -> bool {
    let Some(scanner) = registry.current_scanner().await else {
        debug!(?command, "no scanner connected; command dropped");
        return false;
    };

    let json = match serde_json::to_string(command) {
        Ok(j) => j,
        Err(e) => {
            warn!(error = %e, "failed to serialize scanner command");
            return false;
        }
    };

    match scanner.send_text(json) {
        Ok(()) => {
            debug!(?command, scanner = %scanner.peer_addr(), "forwarded command to scanner");
            true
        }
        Err(_) if scanner.is_closing() => {
            debug!(?command, "scanner is closing; command dropped");
            false
        }
        Err(e) => {
            warn!(conn_id = %scanner.id(), error = %e, "dropping scanner after failed write");
            registry.remove_connection(scanner.id()).await;
            false
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
