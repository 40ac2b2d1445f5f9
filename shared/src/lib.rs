//! # Shared protocol and world model
//!
//! Types used by both the authoritative server and the client mirror:
//!
//! - `event` / `message`: the closed event taxonomy and the ordered
//!   message that carries one frame's worth of events
//! - `entity`: tiles and entities
//! - `room` / `rack`: the spatial state and the out-of-room storage
//! - `connection`: non-blocking per-peer buffers, datagram framing and the
//!   transport shutdown flag
//! - `error`: desync, transport and asset errors
//!
//! Both engines fold events into a `Room` and a `Rack` with the same
//! operations, which keeps the client mirror and the server in agreement.

pub mod connection;
pub mod entity;
pub mod error;
pub mod event;
pub mod message;
pub mod rack;
pub mod room;

pub use connection::{decode_frame, encode_frame, MessageBuffer, RemoteEnd, Shutdown};
pub use entity::{Entity, EntityType, Tile, TileType};
pub use error::{AssetUnavailable, TransportError, WorldError};
pub use event::{Event, EventFamily, EventKind, Location, Target};
pub use message::Message;
pub use rack::Rack;
pub use room::{ClientKey, FloorPlanElement, Room};
