//! Selection of the events a client's peers get to see

use shared::{Event, EventKind, Message};

/// Kinds that describe ambient world changes worth showing to other clients
pub const BROADCAST_KINDS: [EventKind; 8] = [
    EventKind::Drops,
    EventKind::MovesTo,
    EventKind::PicksUp,
    EventKind::Says,
    EventKind::Spawn,
    EventKind::Delete,
    EventKind::ChangeState,
    EventKind::ChangeMapElement,
];

/// Where the filter stands relative to an EnterRoom..RoomComplete span
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SkipState {
    NotSkipping,
    SkipNow,
    /// RoomComplete itself, the last event of the span
    SkipLast,
}

impl SkipState {
    fn advance(self, event: &Event) -> SkipState {
        match (self, event.kind()) {
            (_, EventKind::EnterRoom) => SkipState::SkipNow,
            (SkipState::SkipNow, EventKind::RoomComplete) => SkipState::SkipLast,
            (SkipState::SkipNow, _) => SkipState::SkipNow,
            (SkipState::SkipLast, _) | (SkipState::NotSkipping, _) => SkipState::NotSkipping,
        }
    }
}

/// Builds the copy of `message` sent to every other client in the room
///
/// Room construction bursts (EnterRoom through the matching RoomComplete)
/// are per-client resync payloads and are dropped wholesale. Outside those
/// spans only [`BROADCAST_KINDS`] pass.
pub fn filter_for_others(message: &Message) -> Message {
    if !message.has_enter_room() {
        return message
            .iter()
            .filter(|event| BROADCAST_KINDS.contains(&event.kind()))
            .cloned()
            .collect();
    }

    let mut state = SkipState::NotSkipping;
    let mut broadcast = Message::new();

    for event in message {
        state = state.advance(event);
        if state != SkipState::NotSkipping {
            continue;
        }
        if BROADCAST_KINDS.contains(&event.kind()) {
            broadcast.push(event.clone());
        }
    }

    broadcast
}
