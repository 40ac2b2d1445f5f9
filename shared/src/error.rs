use crate::event::{EventKind, Location};
use thiserror::Error;

/// Room and Rack failures
///
/// Every variant means the peers have desynchronized. Engines propagate
/// these and stop rather than continue with corrupted state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorldError {
    #[error("unknown entity {0}")]
    UnknownEntity(String),

    #[error("undefined location {0:?}")]
    UndefinedLocation(Location),

    #[error("entity {0} not found in rack")]
    NotFound(String),

    #[error("{0:?} events cannot be applied to a room")]
    Unapplicable(EventKind),

    #[error("no room has been entered")]
    NoRoom,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("message encoding failed: {0}")]
    Encode(#[from] bincode::Error),

    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: usize, max: usize },

    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
}

/// An asset descriptor could not be fetched
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("asset {descriptor} unavailable: {reason}")]
pub struct AssetUnavailable {
    pub descriptor: String,
    pub reason: String,
}
