//! Client-side mirror of the room with movement prediction and flow control

use crate::error::ClientError;
use log::{debug, info, warn};
use shared::event::{difference, is_unit_vector};
use shared::{Event, EventKind, Location, Message, Rack, Room, Tile, WorldError};
use std::time::{Duration, Instant};

/// How long a withheld attempt waits for a confirmation before resending
pub const DROPOUT_THRESHOLD: Duration = Duration::from_secs(1);

/// Consecutive resends tolerated before giving up on the server
pub const MAX_RESENDS: u32 = 10;

/// Mirrors the server's room and rack for one player
///
/// At most one attempt is in flight at any time. Moves are applied to the
/// mirror as soon as they are sent and reconciled when the server answers:
/// a matching MovesTo is taken as already applied, a different one
/// overwrites the prediction and an AttemptFailed rolls it back.
///
/// An AttemptFailed answering a resent attempt cannot be told apart from a
/// rejection of a move the server already applied, so it triggers a full
/// resync (a fresh Init) instead of a rollback.
pub struct ClientEngine {
    player_id: String,
    room: Option<Room>,
    rack: Rack,

    awaiting_confirmation: bool,
    local_moves_to: Option<Event>,
    last_direction: Option<Location>,

    // Dropout handling
    dropout_started: Option<Instant>,
    resends: u32,
    last_outbound: Message,

    // Room requests: Init sent and no EnterRoom seen since
    init_sent_at: Option<Instant>,
    init_resends: u32,
    resync_wanted: bool,
}

impl ClientEngine {
    pub fn new(player_id: impl Into<String>) -> Self {
        Self {
            player_id: player_id.into(),
            room: None,
            rack: Rack::new(),
            awaiting_confirmation: false,
            local_moves_to: None,
            last_direction: None,
            dropout_started: None,
            resends: 0,
            last_outbound: Message::new(),
            init_sent_at: None,
            init_resends: 0,
            resync_wanted: false,
        }
    }

    pub fn player_id(&self) -> &str {
        &self.player_id
    }

    pub fn room(&self) -> Option<&Room> {
        self.room.as_ref()
    }

    pub fn rack(&self) -> &Rack {
        &self.rack
    }

    pub fn is_awaiting_confirmation(&self) -> bool {
        self.awaiting_confirmation
    }

    /// The MovesTo applied locally and not yet confirmed, if any
    pub fn pending_prediction(&self) -> Option<&Event> {
        self.local_moves_to.as_ref()
    }

    pub fn player_location(&self) -> Option<Location> {
        self.room.as_ref()?.location_of(&self.player_id)
    }

    /// The first message a client sends, asking for a full resync
    pub fn init_message(&self) -> Message {
        Message::from(vec![Event::Init {
            identifier: self.player_id.clone(),
        }])
    }

    /// Starts a room request and returns the Init to send
    ///
    /// The Init is repeated every [`DROPOUT_THRESHOLD`] from
    /// [`ClientEngine::handle_player_message`] until an EnterRoom arrives.
    pub fn join(&mut self, now: Instant) -> Message {
        self.init_sent_at = Some(now);
        self.init_resends = 0;
        self.init_message()
    }

    /// True while an Init is unanswered
    pub fn is_awaiting_room(&self) -> bool {
        self.init_sent_at.is_some() || self.resync_wanted
    }

    /// Tiles added to the mirror since the last call
    pub fn take_tiles_to_fetch(&mut self) -> Vec<Tile> {
        self.room
            .as_mut()
            .map(Room::take_tiles_to_fetch)
            .unwrap_or_default()
    }

    /// Folds one server message into the mirror
    ///
    /// Returns the events to hand to the presentation layer.
    pub fn handle_server_message(&mut self, message: Message) -> Result<Message, ClientError> {
        let mut side_channel = Message::new();

        for event in message {
            if event.is_confirm() && event.identifier() == Some(self.player_id.as_str()) {
                let answers_resend = self.resends > 0;
                self.confirmation_received();

                if answers_resend && event.kind() == EventKind::AttemptFailed {
                    warn!("Resent attempt was rejected, requesting a resync");
                    self.local_moves_to = None;
                    self.resync_wanted = true;
                    side_channel.push(event);
                    continue;
                }
            }
            self.apply_server_event(&event)?;
            side_channel.push(event);
        }

        Ok(side_channel)
    }

    fn confirmation_received(&mut self) {
        self.awaiting_confirmation = false;
        self.dropout_started = None;
        self.resends = 0;
    }

    fn apply_server_event(&mut self, event: &Event) -> Result<(), WorldError> {
        match event {
            Event::EnterRoom { room_identifier } => {
                let requested = self.init_sent_at.take().is_some();
                self.init_resends = 0;

                let replace = requested
                    || self
                        .room
                        .as_ref()
                        .map_or(true, |room| room.identifier != *room_identifier);
                if replace {
                    info!("Entering room {}", room_identifier);
                    self.room = Some(Room::new(room_identifier.as_str()));
                    self.local_moves_to = None;
                    if requested {
                        // Held items come back with the burst
                        self.rack.retain_unowned();
                    }
                }
            }

            Event::MovesTo { identifier, .. } => {
                if self.local_moves_to.as_ref() == Some(event) {
                    debug!("Prediction for {} confirmed", identifier);
                    self.local_moves_to = None;
                    return Ok(());
                }
                if *identifier == self.player_id && self.local_moves_to.take().is_some() {
                    debug!("Server overrode predicted move of {}", identifier);
                }
                self.room_mut()?.apply(event)?;
            }

            Event::ChangeMapElement { .. } | Event::Spawn { .. } => self.room_mut()?.apply(event)?,

            Event::Delete { identifier } => {
                let entity = self.room_mut()?.delete(identifier)?;
                self.rack.store(entity, None);
            }

            Event::ChangeState { identifier, state } => match self.room.as_mut() {
                Some(room) if room.contains_entity(identifier) => room.change_state(identifier, state)?,
                _ => self.rack.change_state(identifier, state)?,
            },

            Event::PicksUp {
                identifier,
                item_identifier,
            } => {
                let entity = self.room_mut()?.delete(item_identifier)?;
                self.rack.store(entity, Some(identifier.clone()));
            }

            Event::Drops {
                item_identifier,
                location,
                ..
            } => {
                let room = self.room.as_mut().ok_or(WorldError::NoRoom)?;
                if !room.floor_plan.contains_key(location) {
                    return Err(WorldError::UndefinedLocation(*location));
                }
                let entity = self.rack.retrieve(item_identifier)?;
                room.spawn(entity, *location)?;
            }

            Event::AttemptFailed { identifier } => {
                if *identifier == self.player_id {
                    self.revert_prediction()?;
                }
            }

            Event::TriesToMove { .. }
            | Event::TriesToLookAt { .. }
            | Event::TriesToPickUp { .. }
            | Event::TriesToDrop { .. }
            | Event::TriesToManipulate { .. }
            | Event::TriesToTalkTo { .. }
            | Event::CanSpeak { .. }
            | Event::Perception { .. }
            | Event::Manipulates { .. }
            | Event::RoomComplete
            | Event::Says { .. }
            | Event::Passed { .. }
            | Event::LookedAt { .. }
            | Event::PickedUp { .. }
            | Event::Dropped { .. }
            | Event::Init { .. } => {}
        }
        Ok(())
    }

    fn room_mut(&mut self) -> Result<&mut Room, WorldError> {
        self.room.as_mut().ok_or(WorldError::NoRoom)
    }

    /// Steps the predicted entity back along the inverse of its last move
    fn revert_prediction(&mut self) -> Result<(), WorldError> {
        let Some(Event::MovesTo { identifier, .. }) = self.local_moves_to.take() else {
            return Ok(());
        };
        let Some(direction) = self.last_direction else {
            return Ok(());
        };

        let room = self.room_mut()?;
        let current = room
            .location_of(&identifier)
            .ok_or_else(|| WorldError::UnknownEntity(identifier.clone()))?;
        let back = (current.0 - direction.0, current.1 - direction.1);
        debug!("Reverting predicted move of {} to {:?}", identifier, back);
        room.move_entity(&identifier, back)
    }

    /// Applies flow control and prediction to player-originated events
    ///
    /// Returns the message to send, which may be empty. Attempts produced
    /// while another one is in flight are dropped. If the server stays
    /// silent for [`DROPOUT_THRESHOLD`] after such a drop, the last attempt
    /// is resent; after [`MAX_RESENDS`] resends this fails with
    /// [`ClientError::TransportTimeout`].
    pub fn handle_player_message(&mut self, input: Message, now: Instant) -> Result<Message, ClientError> {
        let mut outbound = self.room_request(now)?;
        let mut sent_attempt = false;

        for event in input {
            if event.is_attempt() {
                if self.init_sent_at.is_some() {
                    warn!("Withholding {:?} until the room arrives", event.kind());
                    continue;
                }
                if self.awaiting_confirmation {
                    warn!("Withholding {:?}, an attempt is still unconfirmed", event.kind());
                    self.dropout_started.get_or_insert(now);
                    continue;
                }
                if let Event::TriesToMove { identifier, target } = &event {
                    self.predict(identifier, *target)?;
                }
                self.awaiting_confirmation = true;
                sent_attempt = true;
            }
            outbound.push(event);
        }

        if sent_attempt {
            self.last_outbound = outbound.clone();
            self.dropout_started = None;
            self.resends = 0;
            return Ok(outbound);
        }

        match self.dropout_started {
            Some(started) if now.saturating_duration_since(started) >= DROPOUT_THRESHOLD => {
                if self.resends >= MAX_RESENDS {
                    return Err(ClientError::TransportTimeout {
                        resends: self.resends,
                    });
                }
                self.resends += 1;
                self.dropout_started = Some(now);
                warn!(
                    "No confirmation within {:?}, resending last attempt ({}/{})",
                    DROPOUT_THRESHOLD, self.resends, MAX_RESENDS
                );

                let mut resend = self.last_outbound.clone();
                resend.append(outbound);
                Ok(resend)
            }
            _ => Ok(outbound),
        }
    }

    /// The Init to send this frame, if a room is wanted and not yet answered
    ///
    /// Fails with [`ClientError::TransportTimeout`] after [`MAX_RESENDS`]
    /// unanswered repeats.
    fn room_request(&mut self, now: Instant) -> Result<Message, ClientError> {
        if self.resync_wanted {
            self.resync_wanted = false;
            return Ok(self.join(now));
        }

        match self.init_sent_at {
            Some(sent) if now.saturating_duration_since(sent) >= DROPOUT_THRESHOLD => {
                if self.init_resends >= MAX_RESENDS {
                    return Err(ClientError::TransportTimeout {
                        resends: self.init_resends,
                    });
                }
                self.init_resends += 1;
                self.init_sent_at = Some(now);
                warn!(
                    "No room within {:?}, resending Init ({}/{})",
                    DROPOUT_THRESHOLD, self.init_resends, MAX_RESENDS
                );
                Ok(self.init_message())
            }
            _ => Ok(Message::new()),
        }
    }

    /// Applies a legal one-step move of the player to the mirror right away
    fn predict(&mut self, identifier: &str, target: Location) -> Result<(), WorldError> {
        if identifier != self.player_id {
            return Ok(());
        }
        let Some(room) = self.room.as_mut() else {
            return Ok(());
        };
        let Some(current) = room.location_of(identifier) else {
            return Ok(());
        };

        let direction = difference(current, target);
        if !is_unit_vector(direction) || !room.floor_plan.contains_key(&target) {
            return Ok(());
        }

        room.move_entity(identifier, target)?;
        self.last_direction = Some(direction);
        self.local_moves_to = Some(Event::MovesTo {
            identifier: identifier.to_string(),
            location: target,
        });
        Ok(())
    }
}
