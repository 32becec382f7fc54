//! Error type for checked handle operations.

use std::error::Error;
use std::fmt;

/// Failure of a checked handle operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubError {
    /// The handle's slot generation no longer matches: the record it named
    /// has already been finalized (use after release).
    StaleHandle,

    /// A live-state transition was requested on a record that is already
    /// logically destroyed. Destruction itself is idempotent and never
    /// reports this.
    AlreadyDestroyed,
}

impl fmt::Display for HubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StaleHandle => write!(f, "handle used after its record was released"),
            Self::AlreadyDestroyed => write!(f, "resource is already destroyed"),
        }
    }
}

impl Error for HubError {}
