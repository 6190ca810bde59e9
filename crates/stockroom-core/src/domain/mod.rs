//! Domain module: connection roles and liveness.
//!
//! Pure state with no I/O.  The relay server keeps one [`role::ConnectionState`]
//! per accepted connection and derives [`liveness::Liveness`] from the
//! missed-probe counter it maintains for the scanner.

pub mod liveness;
pub mod role;

pub use liveness::Liveness;
pub use role::{ConnectionState, PeerRole, RoleError};
