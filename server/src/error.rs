use crate::map::MapError;
use shared::{TransportError, WorldError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    /// Room state and game logic disagree; the server cannot continue
    #[error("world desynchronized: {0}")]
    World(#[from] WorldError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Map(#[from] MapError),

    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },
}
