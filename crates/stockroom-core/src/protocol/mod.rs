//! Protocol module containing frame types and the inbound frame classifier.

pub mod classifier;
pub mod frames;

pub use classifier::{classify, classify_handshake};
pub use frames::*;
