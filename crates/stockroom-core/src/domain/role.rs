//! Per-connection role state machine.
//!
//! ```text
//!                 first frame
//!   Unassigned ──────────────┬──▶ Scanner ──┐
//!        │                   └──▶ Client  ──┼──▶ Closed
//!        └──────────────────────────────────┘
//! ```
//!
//! The only transitions out of `Unassigned` are a single role assignment or
//! a close.  Once assigned, the role never changes; `Closed` is terminal.

use std::fmt;

use thiserror::Error;

/// The role a connection plays once its handshake frame has been read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerRole {
    /// The single hardware RFID reader.
    Scanner,
    /// A dashboard instance.
    Client,
}

impl fmt::Display for PeerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scanner => f.write_str("scanner"),
            Self::Client => f.write_str("client"),
        }
    }
}

/// Rejected state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RoleError {
    #[error("connection already has role {0}")]
    AlreadyAssigned(PeerRole),
    #[error("connection is closed")]
    Closed,
}

/// Lifecycle state of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Accepted, no frame read yet.
    #[default]
    Unassigned,
    /// Holds the scanner slot.
    Scanner,
    /// Member of the client set.
    Client,
    /// Transport closed; no further frames are processed.
    Closed,
}

impl ConnectionState {
    /// Assigns `role` to an unassigned connection.
    ///
    /// # Errors
    ///
    /// [`RoleError::AlreadyAssigned`] if a role was already set,
    /// [`RoleError::Closed`] if the connection has closed.
    pub fn assign(&mut self, role: PeerRole) -> Result<(), RoleError> {
        match *self {
            Self::Unassigned => {
                *self = match role {
                    PeerRole::Scanner => Self::Scanner,
                    PeerRole::Client => Self::Client,
                };
                Ok(())
            }
            Self::Scanner => Err(RoleError::AlreadyAssigned(PeerRole::Scanner)),
            Self::Client => Err(RoleError::AlreadyAssigned(PeerRole::Client)),
            Self::Closed => Err(RoleError::Closed),
        }
    }

    /// Moves to `Closed`, returning the role held before (if any).
    pub fn close(&mut self) -> Option<PeerRole> {
        let previous = self.role();
        *self = Self::Closed;
        previous
    }

    pub fn role(&self) -> Option<PeerRole> {
        match self {
            Self::Scanner => Some(PeerRole::Scanner),
            Self::Client => Some(PeerRole::Client),
            Self::Unassigned | Self::Closed => None,
        }
    }

    pub fn is_unassigned(&self) -> bool {
        matches!(self, Self::Unassigned)
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}
