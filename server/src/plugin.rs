//! Game-logic capability plugged into the server engine

use shared::{Message, Rack, Room};

/// Game rules layered on top of the authoritative engine
///
/// The engine hands over each validated event (or the raw event, for kinds
/// it does not validate) together with read access to the current room and
/// rack. Returned events are folded back into the authoritative state in
/// order, so a plugin never mutates the room directly.
pub trait GameLogic: Send {
    fn process(&mut self, inbound: &Message, room: Option<&Room>, rack: &Rack) -> Message;

    /// Polled once per engine iteration
    fn exit_requested(&self) -> bool {
        false
    }
}
