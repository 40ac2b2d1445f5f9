//! Event taxonomy exchanged between clients, the server engine and game logic
//!
//! Events are immutable records. Every consumer reacts to them through an
//! exhaustive `match`, so adding a variant forces each consumer to decide
//! what to do with it.

use crate::entity::{Entity, Tile};
use serde::{Deserialize, Serialize};

/// A tile-grid coordinate `(x, y)`
pub type Location = (i32, i32);

/// The four legal single-step displacements
pub const UNIT_VECTORS: [Location; 4] = [(0, -1), (0, 1), (-1, 0), (1, 0)];

/// Displacement from `from` to `to`
pub fn difference(from: Location, to: Location) -> Location {
    (to.0 - from.0, to.1 - from.1)
}

/// True if `vector` is one of the four unit steps
pub fn is_unit_vector(vector: Location) -> bool {
    UNIT_VECTORS.contains(&vector)
}

/// What an attempt is aimed at
///
/// Clients always aim at a coordinate. The server resolves the coordinate
/// to an entity before handing the attempt to game logic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Target {
    Location(Location),
    Entity(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    // Attempts: client -> server, unconfirmed
    TriesToMove {
        identifier: String,
        target: Location,
    },
    TriesToLookAt {
        identifier: String,
        target: Target,
    },
    TriesToPickUp {
        identifier: String,
        target: Target,
    },
    TriesToDrop {
        identifier: String,
        item_identifier: String,
        target: Target,
    },
    TriesToManipulate {
        identifier: String,
        target: Target,
    },
    TriesToTalkTo {
        identifier: String,
        target: Target,
    },

    // Confirms: server -> client, authoritative outcome of an attempt
    MovesTo {
        identifier: String,
        location: Location,
    },
    PicksUp {
        identifier: String,
        item_identifier: String,
    },
    Drops {
        identifier: String,
        item_identifier: String,
        location: Location,
    },
    CanSpeak {
        identifier: String,
        sentences: Vec<String>,
    },
    Perception {
        identifier: String,
        perception: String,
    },
    Manipulates {
        identifier: String,
        item_identifier: String,
    },
    AttemptFailed {
        identifier: String,
    },

    // Server: authoritative world changes
    Spawn {
        entity: Entity,
        location: Location,
    },
    Delete {
        identifier: String,
    },
    EnterRoom {
        room_identifier: String,
    },
    RoomComplete,
    ChangeMapElement {
        tile: Tile,
        location: Location,
    },

    // Unclassified
    Says {
        identifier: String,
        text: String,
    },
    ChangeState {
        identifier: String,
        state: String,
    },

    // Passive: side-effect notifications
    Passed {
        identifier: String,
        target_identifier: String,
    },
    LookedAt {
        identifier: String,
        target_identifier: String,
    },
    PickedUp {
        identifier: String,
        target_identifier: String,
    },
    Dropped {
        identifier: String,
        target_identifier: String,
    },

    /// Sent once by a client when it connects, requesting a full resync
    Init {
        identifier: String,
    },
}

/// Variant tag of an [`Event`], without payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    TriesToMove,
    TriesToLookAt,
    TriesToPickUp,
    TriesToDrop,
    TriesToManipulate,
    TriesToTalkTo,
    MovesTo,
    PicksUp,
    Drops,
    CanSpeak,
    Perception,
    Manipulates,
    AttemptFailed,
    Spawn,
    Delete,
    EnterRoom,
    RoomComplete,
    ChangeMapElement,
    Says,
    ChangeState,
    Passed,
    LookedAt,
    PickedUp,
    Dropped,
    Init,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFamily {
    Attempt,
    Confirm,
    Server,
    Unclassified,
    Passive,
    Init,
}

impl EventKind {
    pub fn family(self) -> EventFamily {
        use EventKind::*;
        match self {
            TriesToMove | TriesToLookAt | TriesToPickUp | TriesToDrop | TriesToManipulate
            | TriesToTalkTo => EventFamily::Attempt,
            MovesTo | PicksUp | Drops | CanSpeak | Perception | Manipulates | AttemptFailed => {
                EventFamily::Confirm
            }
            Spawn | Delete | EnterRoom | RoomComplete | ChangeMapElement => EventFamily::Server,
            Says | ChangeState => EventFamily::Unclassified,
            Passed | LookedAt | PickedUp | Dropped => EventFamily::Passive,
            Init => EventFamily::Init,
        }
    }
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::TriesToMove { .. } => EventKind::TriesToMove,
            Event::TriesToLookAt { .. } => EventKind::TriesToLookAt,
            Event::TriesToPickUp { .. } => EventKind::TriesToPickUp,
            Event::TriesToDrop { .. } => EventKind::TriesToDrop,
            Event::TriesToManipulate { .. } => EventKind::TriesToManipulate,
            Event::TriesToTalkTo { .. } => EventKind::TriesToTalkTo,
            Event::MovesTo { .. } => EventKind::MovesTo,
            Event::PicksUp { .. } => EventKind::PicksUp,
            Event::Drops { .. } => EventKind::Drops,
            Event::CanSpeak { .. } => EventKind::CanSpeak,
            Event::Perception { .. } => EventKind::Perception,
            Event::Manipulates { .. } => EventKind::Manipulates,
            Event::AttemptFailed { .. } => EventKind::AttemptFailed,
            Event::Spawn { .. } => EventKind::Spawn,
            Event::Delete { .. } => EventKind::Delete,
            Event::EnterRoom { .. } => EventKind::EnterRoom,
            Event::RoomComplete => EventKind::RoomComplete,
            Event::ChangeMapElement { .. } => EventKind::ChangeMapElement,
            Event::Says { .. } => EventKind::Says,
            Event::ChangeState { .. } => EventKind::ChangeState,
            Event::Passed { .. } => EventKind::Passed,
            Event::LookedAt { .. } => EventKind::LookedAt,
            Event::PickedUp { .. } => EventKind::PickedUp,
            Event::Dropped { .. } => EventKind::Dropped,
            Event::Init { .. } => EventKind::Init,
        }
    }

    pub fn family(&self) -> EventFamily {
        self.kind().family()
    }

    pub fn is_attempt(&self) -> bool {
        self.family() == EventFamily::Attempt
    }

    pub fn is_confirm(&self) -> bool {
        self.family() == EventFamily::Confirm
    }

    /// The entity this event concerns, if it concerns one
    pub fn identifier(&self) -> Option<&str> {
        match self {
            Event::TriesToMove { identifier, .. }
            | Event::TriesToLookAt { identifier, .. }
            | Event::TriesToPickUp { identifier, .. }
            | Event::TriesToDrop { identifier, .. }
            | Event::TriesToManipulate { identifier, .. }
            | Event::TriesToTalkTo { identifier, .. }
            | Event::MovesTo { identifier, .. }
            | Event::PicksUp { identifier, .. }
            | Event::Drops { identifier, .. }
            | Event::CanSpeak { identifier, .. }
            | Event::Perception { identifier, .. }
            | Event::Manipulates { identifier, .. }
            | Event::AttemptFailed { identifier }
            | Event::Delete { identifier }
            | Event::Says { identifier, .. }
            | Event::ChangeState { identifier, .. }
            | Event::Passed { identifier, .. }
            | Event::LookedAt { identifier, .. }
            | Event::PickedUp { identifier, .. }
            | Event::Dropped { identifier, .. }
            | Event::Init { identifier } => Some(identifier),
            Event::Spawn { entity, .. } => Some(&entity.identifier),
            Event::EnterRoom { .. } | Event::RoomComplete | Event::ChangeMapElement { .. } => None,
        }
    }

    pub fn attempt_failed(identifier: impl Into<String>) -> Self {
        Event::AttemptFailed {
            identifier: identifier.into(),
        }
    }
}
