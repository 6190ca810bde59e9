//! Liveness classification for a probed connection.

/// Liveness of a connection, derived from how many probes went unanswered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// Every probe so far was answered (or none was sent yet).
    Alive,
    /// At least one probe is outstanding but the threshold is not reached.
    PendingProbe,
    /// `max_missed` consecutive probes went unanswered.
    Dead,
}

impl Liveness {
    /// Classifies a connection with `missed` outstanding probes.
    ///
    /// A `max_missed` of zero disables eviction: the connection is never
    /// considered dead.
    pub fn from_missed(missed: u32, max_missed: u32) -> Self {
        match missed {
            0 => Self::Alive,
            n if max_missed > 0 && n >= max_missed => Self::Dead,
            _ => Self::PendingProbe,
        }
    }
}
