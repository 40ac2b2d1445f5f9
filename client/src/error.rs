use shared::{AssetUnavailable, TransportError, WorldError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The mirror disagrees with what the server sent
    #[error("world desynchronized: {0}")]
    World(#[from] WorldError),

    #[error(transparent)]
    Asset(#[from] AssetUnavailable),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("no confirmation from the server after {resends} resends")]
    TransportTimeout { resends: u32 },

    #[error("invalid server address {addr}: {reason}")]
    Address { addr: String, reason: String },
}
