//! JSON frame types exchanged between the scanner, the relay, and dashboards.
//!
//! Every frame is one UTF-8 JSON object carried in a WebSocket text message.
//!
//! ```text
//! Scanner   → Relay:   {"type":"esp"}                 (handshake, first frame)
//! Dashboard → Relay:   {"type":"react_client"}        (declaration, first frame)
//! Scanner   → Relay → Dashboards:  {"uid":"F3C29FF7"}
//! Dashboard → Relay → Scanner:     {"type":"beep","duration":1500}
//! Relay     → sender:  {"error":true,"message":"Invalid message format"}
//! ```
//!
//! Outbound frames are serialized from the typed structs below.  Inbound
//! frames are not deserialized into these types directly: the classifier
//! inspects field presence on a loosely typed JSON value so that extra fields
//! and lenient `duration` values are tolerated.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::role::PeerRole;

/// `type` value of the scanner's handshake frame.
pub const SCANNER_HANDSHAKE_TYPE: &str = "esp";

/// `type` value the dashboard sends as its first frame.
pub const CLIENT_DECLARATION_TYPE: &str = "react_client";

/// `type` value of the beep command.
pub const BEEP_COMMAND_TYPE: &str = "beep";

/// Beep length used when a command omits `duration` or carries an unusable one.
pub const DEFAULT_BEEP_DURATION_MS: u64 = 1500;

// ── Frame payloads ────────────────────────────────────────────────────────────

/// A tag identifier read by the scanner.
///
/// This is also the reduced shape the relay broadcasts to dashboards: any
/// other fields the scanner attached are dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    /// Tag UID, normally 8 upper-case hex characters (e.g. `"F3C29FF7"`).
    pub uid: String,
}

impl ScanReport {
    pub fn new(uid: impl Into<String>) -> Self {
        Self { uid: uid.into() }
    }
}

/// A command a dashboard sends to the scanner.
///
/// # Serde representation
///
/// ```json
/// {"type":"beep","duration":2000}
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScannerCommand {
    /// Sound the scanner's buzzer.
    Beep {
        /// Buzzer duration in milliseconds.
        duration: u64,
    },
}

impl ScannerCommand {
    /// A beep of the default length.
    pub fn default_beep() -> Self {
        Self::Beep {
            duration: DEFAULT_BEEP_DURATION_MS,
        }
    }
}

/// The first frame a participant sends to declare its role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDeclaration {
    #[serde(rename = "type")]
    pub kind: String,
}

impl RoleDeclaration {
    /// `{"type":"esp"}`, sent by the scanner firmware.
    pub fn scanner() -> Self {
        Self {
            kind: SCANNER_HANDSHAKE_TYPE.to_string(),
        }
    }

    /// `{"type":"react_client"}`, sent by dashboards on every (re)connect.
    pub fn client() -> Self {
        Self {
            kind: CLIENT_DECLARATION_TYPE.to_string(),
        }
    }
}

/// Error reply sent back to the connection that produced an unusable frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorFrame {
    /// Always `true`; lets receivers detect error frames by field presence.
    pub error: bool,
    pub message: String,
}

impl ErrorFrame {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: true,
            message: message.into(),
        }
    }
}

// ── Classified inbound frame ──────────────────────────────────────────────────

/// Why an inbound frame could not be routed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// The payload is not valid JSON.
    #[error("invalid JSON: {0}")]
    Decode(String),

    /// The payload is valid JSON but not an object (e.g. `null`, `[]`, `42`).
    #[error("Empty message")]
    NotAnObject,

    /// The payload is an object that matches no known frame shape.
    #[error("Invalid message format")]
    Unroutable,

    /// A role handshake arrived after the connection's role was already fixed.
    #[error("unexpected {0} handshake: role is already assigned")]
    LateHandshake(PeerRole),
}

/// An inbound frame after classification.
///
/// Produced by [`crate::classify`]; each variant maps to exactly one routing
/// path in the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// `{"uid": "..."}` from the scanner; fanned out to every dashboard.
    ScanReport(ScanReport),
    /// `{"type":"beep", ...}` from a dashboard; forwarded to the scanner.
    ClientCommand(ScannerCommand),
    /// `{"type":"esp"}`; only meaningful as a connection's first frame.
    RoleHandshake(PeerRole),
    /// Anything else.  `raw` is the original payload for logging.
    Malformed { raw: String, reason: FrameError },
}

impl Frame {
    pub(crate) fn malformed(raw: &str, reason: FrameError) -> Self {
        Self::Malformed {
            raw: raw.to_string(),
            reason,
        }
    }

    /// Short variant name for log lines; never includes payload contents.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::ScanReport(_) => "ScanReport",
            Self::ClientCommand(_) => "ClientCommand",
            Self::RoleHandshake(_) => "RoleHandshake",
            Self::Malformed { .. } => "Malformed",
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
