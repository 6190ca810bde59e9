//! Classification of inbound text frames.
//!
//! [`classify`] is applied to every frame after a connection's handshake.
//! [`classify_handshake`] is applied exactly once, to the first frame.
//!
//! # Priority order
//!
//! The first matching rule wins:
//!
//! 1. non-empty string `uid`           → [`Frame::ScanReport`]
//! 2. `type == "beep"`                 → [`Frame::ClientCommand`]
//! 3. `type == "esp"`                  → [`Frame::RoleHandshake`]
//! 4. anything else                    → [`Frame::Malformed`]
//!
//! A frame that carries both `uid` and `type` is therefore a scan report.

use serde_json::{Map, Value};

use crate::domain::role::PeerRole;
use crate::protocol::frames::{
    Frame, FrameError, ScanReport, ScannerCommand, BEEP_COMMAND_TYPE, DEFAULT_BEEP_DURATION_MS,
    SCANNER_HANDSHAKE_TYPE,
};

/// Classifies a post-handshake text frame.
///
/// Never fails: undecodable or unrecognised payloads become
/// [`Frame::Malformed`] with the reason attached.
///
/// # Example
///
/// ```rust
/// use stockroom_core::{classify, Frame, ScanReport};
///
/// let frame = classify(r#"{"uid":"33E41EAF"}"#);
/// assert_eq!(frame, Frame::ScanReport(ScanReport::new("33E41EAF")));
/// ```
pub fn classify(raw: &str) -> Frame {
    let value: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => return Frame::malformed(raw, FrameError::Decode(e.to_string())),
    };

    let Some(object) = value.as_object() else {
        return Frame::malformed(raw, FrameError::NotAnObject);
    };

    if let Some(uid) = string_field(object, "uid").filter(|uid| !uid.is_empty()) {
        return Frame::ScanReport(ScanReport::new(uid));
    }

    match string_field(object, "type") {
        Some(BEEP_COMMAND_TYPE) => Frame::ClientCommand(ScannerCommand::Beep {
            duration: beep_duration(object.get("duration")),
        }),
        Some(SCANNER_HANDSHAKE_TYPE) => Frame::RoleHandshake(PeerRole::Scanner),
        _ => Frame::malformed(raw, FrameError::Unroutable),
    }
}

/// Decides the role of a connection from its first frame.
///
/// Only an object whose `type` is `"esp"` makes the connection the scanner.
/// Everything else, including text that is not JSON at all, is a client.
pub fn classify_handshake(raw: &str) -> PeerRole {
    let is_scanner = serde_json::from_str::<Value>(raw)
        .ok()
        .as_ref()
        .and_then(Value::as_object)
        .and_then(|object| string_field(object, "type"))
        == Some(SCANNER_HANDSHAKE_TYPE);

    if is_scanner {
        PeerRole::Scanner
    } else {
        PeerRole::Client
    }
}

fn string_field<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    object.get(key).and_then(Value::as_str)
}

/// Resolves the `duration` of a beep command to whole milliseconds.
///
/// Missing, non-numeric, zero, negative, and non-finite values fall back to
/// [`DEFAULT_BEEP_DURATION_MS`].  Fractional values are rounded.
fn beep_duration(value: Option<&Value>) -> u64 {
    let Some(Value::Number(number)) = value else {
        return DEFAULT_BEEP_DURATION_MS;
    };

    number
        .as_u64()
        .or_else(|| {
            number
                .as_f64()
                .filter(|ms| ms.is_finite() && *ms >= 0.5)
                .map(|ms| ms.round() as u64)
        })
        .filter(|ms| *ms > 0)
        .unwrap_or(DEFAULT_BEEP_DURATION_MS)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
