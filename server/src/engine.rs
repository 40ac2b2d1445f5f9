//! Authoritative state machine
//!
//! The engine is transport agnostic: it takes one client's message, checks
//! every accepted attempt against the room, hands each event to the game
//! logic one at a time and folds what comes back into the room and rack.
//! The result is a [`Dispatch`] describing what the originating client and
//! its room peers should receive.

use crate::broadcast::filter_for_others;
use crate::plugin::GameLogic;
use log::{debug, info, warn};
use shared::event::{difference, is_unit_vector};
use shared::{ClientKey, Event, EventKind, Location, Message, Rack, Room, Target, WorldError};

/// Event kinds a client may originate. These are validated locally before
/// game logic sees them; any other kind is forwarded untouched.
pub const ACCEPTED_CLIENT_KINDS: [EventKind; 8] = [
    EventKind::Init,
    EventKind::TriesToMove,
    EventKind::TriesToLookAt,
    EventKind::TriesToPickUp,
    EventKind::TriesToDrop,
    EventKind::TriesToManipulate,
    EventKind::TriesToTalkTo,
    EventKind::Says,
];

/// Outcome of one engine step
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dispatch {
    /// Full result for the originating client
    pub reply: Message,
    /// Filtered copy for everyone in `recipients`
    pub broadcast: Message,
    pub recipients: Vec<ClientKey>,
}

/// Which kind of entity a coordinate target resolves to
#[derive(Debug, Clone, Copy)]
enum Lookup {
    Item,
    Character,
}

pub struct ServerEngine {
    room: Option<Room>,
    rack: Rack,
    plugin: Box<dyn GameLogic>,
}

impl ServerEngine {
    pub fn new(plugin: Box<dyn GameLogic>) -> Self {
        Self {
            room: None,
            rack: Rack::new(),
            plugin,
        }
    }

    pub fn room(&self) -> Option<&Room> {
        self.room.as_ref()
    }

    pub fn rack(&self) -> &Rack {
        &self.rack
    }

    pub fn exit_requested(&self) -> bool {
        self.plugin.exit_requested()
    }

    /// Processes one inbound message from `origin`
    ///
    /// Each event is validated and passed to game logic on its own, and the
    /// logic's output is folded before the next event is looked at. A
    /// [`WorldError`] means the room and the game logic disagree; the caller
    /// should stop rather than carry on with a corrupted room.
    pub fn handle_message(&mut self, origin: ClientKey, message: Message) -> Result<Dispatch, WorldError> {
        let mut reply = Message::new();

        for event in message {
            let plugin_input = if ACCEPTED_CLIENT_KINDS.contains(&event.kind()) {
                self.validate(origin, event, &mut reply)
            } else {
                debug!("Forwarding {:?} from {} unvalidated", event.kind(), origin);
                Some(event)
            };

            let Some(plugin_input) = plugin_input else {
                continue;
            };

            let produced = self.plugin.process(
                &Message::from(vec![plugin_input]),
                self.room.as_ref(),
                &self.rack,
            );
            self.fold(Some(origin), produced, &mut reply)?;
        }

        let recipients = self.peers_of(origin);
        Ok(Dispatch {
            broadcast: filter_for_others(&reply),
            reply,
            recipients,
        })
    }

    /// Gives game logic a chance to act without client input
    ///
    /// Whatever it produces goes to every active client, unfiltered.
    pub fn idle(&mut self) -> Result<Option<Dispatch>, WorldError> {
        let produced = self
            .plugin
            .process(&Message::new(), self.room.as_ref(), &self.rack);
        if produced.is_empty() {
            return Ok(None);
        }

        let mut folded = Message::new();
        self.fold(None, produced, &mut folded)?;

        let recipients = self
            .room
            .as_ref()
            .map(|room| room.active_clients.iter().copied().collect())
            .unwrap_or_default();

        Ok(Some(Dispatch {
            reply: Message::new(),
            broadcast: folded,
            recipients,
        }))
    }

    /// Forgets a client whose transport has gone away
    ///
    /// Its entities stay in the room; only membership is dropped.
    pub fn disconnect(&mut self, client: &ClientKey) {
        if let Some(room) = self.room.as_mut() {
            if room.unregister_client(client) {
                info!("Client {} left room {}", client, room.identifier);
            }
        }
    }

    fn peers_of(&self, origin: ClientKey) -> Vec<ClientKey> {
        self.room
            .as_ref()
            .map(|room| {
                room.active_clients
                    .iter()
                    .copied()
                    .filter(|client| *client != origin)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Checks a client-originated event against the room
    ///
    /// Returns the event game logic should see, possibly retargeted, or
    /// `None` if the attempt was already answered with AttemptFailed.
    fn validate(&mut self, origin: ClientKey, event: Event, reply: &mut Message) -> Option<Event> {
        match event {
            Event::Init { ref identifier } => {
                if let Some(room) = self.room.as_mut() {
                    if room.register_client(origin) {
                        info!("Client {} ({}) joined room {}", origin, identifier, room.identifier);
                    }
                    reply.append(resync_burst(room, &self.rack));
                }
                Some(event)
            }

            Event::TriesToMove { identifier, target } => match self.check_move(&identifier, target) {
                Ok(()) => Some(Event::MovesTo {
                    identifier,
                    location: target,
                }),
                Err(reason) => {
                    warn!("Rejecting move of {} to {:?}: {}", identifier, target, reason);
                    reply.push(Event::attempt_failed(identifier));
                    None
                }
            },

            Event::TriesToLookAt { identifier, target } => {
                self.retarget(identifier, target, Lookup::Item, reply, |identifier, target| {
                    Event::TriesToLookAt { identifier, target }
                })
            }
            Event::TriesToPickUp { identifier, target } => {
                self.retarget(identifier, target, Lookup::Item, reply, |identifier, target| {
                    Event::TriesToPickUp { identifier, target }
                })
            }
            Event::TriesToManipulate { identifier, target } => {
                self.retarget(identifier, target, Lookup::Item, reply, |identifier, target| {
                    Event::TriesToManipulate { identifier, target }
                })
            }
            Event::TriesToTalkTo { identifier, target } => {
                self.retarget(identifier, target, Lookup::Character, reply, |identifier, target| {
                    Event::TriesToTalkTo { identifier, target }
                })
            }

            Event::TriesToDrop {
                identifier,
                item_identifier,
                target,
            } => match self.check_drop(&identifier, &item_identifier, target) {
                Ok(target) => Some(Event::TriesToDrop {
                    identifier,
                    item_identifier,
                    target,
                }),
                Err(reason) => {
                    warn!("Rejecting drop of {} by {}: {}", item_identifier, identifier, reason);
                    reply.push(Event::attempt_failed(identifier));
                    None
                }
            },

            other => Some(other),
        }
    }

    fn check_move(&self, identifier: &str, target: Location) -> Result<(), &'static str> {
        let room = self.room.as_ref().ok_or("no room")?;
        let current = room.location_of(identifier).ok_or("unknown entity")?;

        if !is_unit_vector(difference(current, target)) {
            return Err("illegal displacement");
        }
        match room.tile_at(target) {
            None => Err("undefined location"),
            Some(tile) if !tile.is_floor() => Err("obstacle"),
            Some(_) if room.has_blocking_item(target) => Err("blocked"),
            Some(_) => Ok(()),
        }
    }

    /// Resolves a coordinate target to an entity and rebuilds the attempt
    fn retarget(
        &self,
        identifier: String,
        target: Target,
        lookup: Lookup,
        reply: &mut Message,
        rebuild: impl FnOnce(String, Target) -> Event,
    ) -> Option<Event> {
        match self.resolve(&target, lookup) {
            Some(entity) => Some(rebuild(identifier, Target::Entity(entity))),
            None => {
                debug!("Nothing to resolve for {} at {:?}", identifier, target);
                reply.push(Event::attempt_failed(identifier));
                None
            }
        }
    }

    fn resolve(&self, target: &Target, lookup: Lookup) -> Option<String> {
        let room = self.room.as_ref()?;
        match target {
            Target::Location(location) => {
                let entity = match lookup {
                    Lookup::Item => room.last_item_at(*location),
                    Lookup::Character => room.last_character_at(*location),
                };
                entity.map(|entity| entity.identifier.clone())
            }
            Target::Entity(identifier) => room
                .contains_entity(identifier)
                .then(|| identifier.clone()),
        }
    }

    /// Returns the target game logic should see for a legal drop
    fn check_drop(&self, identifier: &str, item: &str, target: Target) -> Result<Target, &'static str> {
        if !self.rack.is_owned_by(item, identifier) {
            return Err("item not owned");
        }
        let room = self.room.as_ref().ok_or("no room")?;

        match target {
            Target::Location(location) => {
                if !room.tile_at(location).map_or(false, |tile| tile.is_floor()) {
                    return Err("not a floor tile");
                }
                match room.entities_at(location).last() {
                    Some(occupant) => Ok(Target::Entity(occupant.identifier.clone())),
                    None => Ok(Target::Location(location)),
                }
            }
            Target::Entity(other) if room.contains_entity(&other) => Ok(Target::Entity(other)),
            Target::Entity(_) => Err("unknown target entity"),
        }
    }

    /// Applies game-logic output to the room and rack, in order
    ///
    /// Every event that applies cleanly is appended to `out`.
    fn fold(&mut self, origin: Option<ClientKey>, produced: Message, out: &mut Message) -> Result<(), WorldError> {
        for event in produced {
            match &event {
                Event::EnterRoom { room_identifier } => self.enter_room(origin, room_identifier),

                Event::ChangeMapElement { .. } => {
                    // Server rooms keep no fetch list
                    let room = self.room_mut()?;
                    room.apply(&event)?;
                    room.take_tiles_to_fetch();
                }

                Event::Spawn { .. } | Event::MovesTo { .. } => {
                    self.room_mut()?.apply(&event)?;
                }

                Event::ChangeState { identifier, state } => match self.room.as_mut() {
                    Some(room) if room.contains_entity(identifier) => room.change_state(identifier, state)?,
                    _ if self.rack.contains(identifier) => self.rack.change_state(identifier, state)?,
                    _ => return Err(WorldError::UnknownEntity(identifier.clone())),
                },

                Event::Delete { identifier } => {
                    let entity = self.room_mut()?.delete(identifier)?;
                    self.rack.store(entity, None);
                }

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

                Event::TriesToMove { .. }
                | Event::TriesToLookAt { .. }
                | Event::TriesToPickUp { .. }
                | Event::TriesToDrop { .. }
                | Event::TriesToManipulate { .. }
                | Event::TriesToTalkTo { .. }
                | Event::CanSpeak { .. }
                | Event::Perception { .. }
                | Event::Manipulates { .. }
                | Event::AttemptFailed { .. }
                | Event::RoomComplete
                | Event::Says { .. }
                | Event::Passed { .. }
                | Event::LookedAt { .. }
                | Event::PickedUp { .. }
                | Event::Dropped { .. }
                | Event::Init { .. } => {}
            }
            out.push(event);
        }
        Ok(())
    }

    fn room_mut(&mut self) -> Result<&mut Room, WorldError> {
        self.room.as_mut().ok_or(WorldError::NoRoom)
    }

    /// Creates, keeps or replaces the room and registers `origin` in it
    ///
    /// Only one room exists per server. Entering a different room discards
    /// the current one and every other client's membership with it.
    fn enter_room(&mut self, origin: Option<ClientKey>, room_identifier: &str) {
        match self.room.as_mut() {
            Some(room) if room.identifier == room_identifier => {}
            Some(room) => {
                info!("Replacing room {} with {}", room.identifier, room_identifier);
                *room = Room::new(room_identifier);
            }
            None => {
                info!("Creating room {}", room_identifier);
                self.room = Some(Room::new(room_identifier));
            }
        }

        if let (Some(room), Some(client)) = (self.room.as_mut(), origin) {
            if room.register_client(client) {
                debug!("Registered {} in room {}", client, room.identifier);
            }
        }
    }
}

/// Everything a late joiner needs to rebuild the room
///
/// Items held by players are spawned next to their owner and immediately
/// picked up again, so the client learns about inventories too.
fn resync_burst(room: &Room, rack: &Rack) -> Message {
    let mut burst = Message::new();
    burst.push(Event::EnterRoom {
        room_identifier: room.identifier.clone(),
    });

    for (location, element) in &room.floor_plan {
        burst.push(Event::ChangeMapElement {
            tile: element.tile.clone(),
            location: *location,
        });
    }

    for (location, element) in &room.floor_plan {
        for entity in element.entities.iter().filter_map(|id| room.entity(id)) {
            burst.push(Event::Spawn {
                entity: entity.clone(),
                location: *location,
            });
        }
    }

    let fallback = room
        .floor_plan
        .iter()
        .find(|(_, element)| element.tile.is_floor())
        .map(|(location, _)| *location);

    for (entity, owner) in rack.owned() {
        let Some(location) = room.location_of(owner).or(fallback) else {
            warn!("No floor to respawn {} for {}", entity.identifier, owner);
            continue;
        };
        burst.push(Event::Spawn {
            entity: entity.clone(),
            location,
        });
        burst.push(Event::PicksUp {
            identifier: owner.to_string(),
            item_identifier: entity.identifier.clone(),
        });
    }

    burst.push(Event::RoomComplete);
    burst
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::testing::EchoGame;
    use shared::{Entity, EntityType, Tile};
    use tokio_test::{assert_err, assert_ok};

    fn addr(port: u16) -> ClientKey {
        format!("127.0.0.1:{}", port).parse().unwrap()
    }

    fn tile_event(location: Location) -> Event {
        Event::ChangeMapElement {
            tile: Tile::floor("floor.png"),
            location,
        }
    }

    fn spawn(entity_type: EntityType, id: &str, location: Location) -> Event {
        Event::Spawn {
            entity: Entity::new(entity_type, id, "x.png"),
            location,
        }
    }

    /// Engine whose room is a 3x3 floor with p1 in the middle
    fn engine_with_room() -> ServerEngine {
        let mut engine = ServerEngine::new(Box::new(EchoGame::default()));
        let mut setup = vec![Event::EnterRoom {
            room_identifier: "r".to_string(),
        }];
        for x in 0..3 {
            for y in 0..3 {
                setup.push(tile_event((x, y)));
            }
        }
        setup.push(spawn(EntityType::Player, "p1", (1, 1)));

        let mut out = Message::new();
        assert_ok!(engine.fold(Some(addr(9001)), Message::from(setup), &mut out));
        engine
    }

    fn single(event: Event) -> Message {
        Message::from(vec![event])
    }

    fn try_move(target: Location) -> Message {
        single(Event::TriesToMove {
            identifier: "p1".to_string(),
            target,
        })
    }

    #[test]
    fn test_move_to_adjacent_floor() {
        let mut engine = engine_with_room();
        let dispatch = engine.handle_message(addr(9001), try_move((1, 2))).unwrap();

        assert_eq!(
            dispatch.reply.events(),
            &[Event::MovesTo {
                identifier: "p1".to_string(),
                location: (1, 2),
            }]
        );
        assert_eq!(engine.room().unwrap().location_of("p1"), Some((1, 2)));
    }

    #[test]
    fn test_illegal_displacements_fail() {
        for target in [(1, 1), (3, 1), (2, 2)] {
            let mut engine = engine_with_room();
            let dispatch = engine.handle_message(addr(9001), try_move(target)).unwrap();
            assert_eq!(dispatch.reply.events(), &[Event::attempt_failed("p1")]);
            assert_eq!(engine.room().unwrap().location_of("p1"), Some((1, 1)));
        }
    }

    #[test]
    fn test_move_into_obstacle_or_boulder_fails() {
        let mut engine = engine_with_room();
        let mut out = Message::new();
        assert_ok!(engine.fold(
            None,
            Message::from(vec![
                Event::ChangeMapElement {
                    tile: Tile::obstacle("wall.png"),
                    location: (0, 1),
                },
                spawn(EntityType::ItemBlock, "boulder", (2, 1)),
            ]),
            &mut out,
        ));

        let dispatch = engine.handle_message(addr(9001), try_move((0, 1))).unwrap();
        assert_eq!(dispatch.reply.events(), &[Event::attempt_failed("p1")]);

        let dispatch = engine.handle_message(addr(9001), try_move((2, 1))).unwrap();
        assert_eq!(dispatch.reply.events(), &[Event::attempt_failed("p1")]);

        let dispatch = engine.handle_message(addr(9001), try_move((1, 3))).unwrap();
        assert_eq!(dispatch.reply.events(), &[Event::attempt_failed("p1")]);
    }

    #[test]
    fn test_move_without_room_fails() {
        let mut engine = ServerEngine::new(Box::new(EchoGame::default()));
        let dispatch = engine.handle_message(addr(9001), try_move((0, 1))).unwrap();
        assert_eq!(dispatch.reply.events(), &[Event::attempt_failed("p1")]);
    }

    #[test]
    fn test_coordinate_target_resolves_to_last_item() {
        let mut engine = engine_with_room();
        let mut out = Message::new();
        assert_ok!(engine.fold(
            None,
            Message::from(vec![
                spawn(EntityType::ItemNoblock, "gem", (1, 0)),
                spawn(EntityType::ItemNoblock, "coin", (1, 0)),
            ]),
            &mut out,
        ));

        let dispatch = engine
            .handle_message(
                addr(9001),
                single(Event::TriesToLookAt {
                    identifier: "p1".to_string(),
                    target: Target::Location((1, 0)),
                }),
            )
            .unwrap();

        assert_eq!(
            dispatch.reply.events(),
            &[Event::TriesToLookAt {
                identifier: "p1".to_string(),
                target: Target::Entity("coin".to_string()),
            }]
        );
    }

    #[test]
    fn test_unresolvable_target_fails_immediately() {
        let mut engine = engine_with_room();
        let dispatch = engine
            .handle_message(
                addr(9001),
                single(Event::TriesToPickUp {
                    identifier: "p1".to_string(),
                    target: Target::Location((0, 0)),
                }),
            )
            .unwrap();
        assert_eq!(dispatch.reply.events(), &[Event::attempt_failed("p1")]);
    }

    #[test]
    fn test_talk_to_resolves_characters() {
        let mut engine = engine_with_room();
        let mut out = Message::new();
        assert_ok!(engine.fold(
            None,
            single(spawn(EntityType::Npc, "sage", (2, 1))),
            &mut out
        ));

        let dispatch = engine
            .handle_message(
                addr(9001),
                single(Event::TriesToTalkTo {
                    identifier: "p1".to_string(),
                    target: Target::Location((2, 1)),
                }),
            )
            .unwrap();
        assert_eq!(
            dispatch.reply.events(),
            &[Event::TriesToTalkTo {
                identifier: "p1".to_string(),
                target: Target::Entity("sage".to_string()),
            }]
        );
    }

    #[test]
    fn test_pick_up_and_drop_move_between_room_and_rack() {
        let mut engine = engine_with_room();
        let mut out = Message::new();
        assert_ok!(engine.fold(
            None,
            Message::from(vec![
                spawn(EntityType::ItemNoblock, "gem", (1, 0)),
                Event::PicksUp {
                    identifier: "p1".to_string(),
                    item_identifier: "gem".to_string(),
                },
            ]),
            &mut out,
        ));
        assert!(!engine.room().unwrap().contains_entity("gem"));
        assert!(engine.rack().is_owned_by("gem", "p1"));

        let drop = |location| {
            single(Event::TriesToDrop {
                identifier: "p1".to_string(),
                item_identifier: "gem".to_string(),
                target: Target::Location(location),
            })
        };

        // p1 stands on (1, 1), so this becomes a drop onto p1
        let dispatch = engine.handle_message(addr(9001), drop((1, 1))).unwrap();
        assert_eq!(
            dispatch.reply.events(),
            &[Event::TriesToDrop {
                identifier: "p1".to_string(),
                item_identifier: "gem".to_string(),
                target: Target::Entity("p1".to_string()),
            }]
        );

        let mut out = Message::new();
        assert_ok!(engine.fold(
            None,
            single(Event::Drops {
                identifier: "p1".to_string(),
                item_identifier: "gem".to_string(),
                location: (2, 2),
            }),
            &mut out,
        ));
        assert_eq!(engine.room().unwrap().location_of("gem"), Some((2, 2)));
        assert!(engine.rack().is_empty());
        assert!(engine.room().unwrap().is_consistent());
    }

    #[test]
    fn test_drop_of_unowned_item_fails() {
        let mut engine = engine_with_room();
        let dispatch = engine
            .handle_message(
                addr(9001),
                single(Event::TriesToDrop {
                    identifier: "p1".to_string(),
                    item_identifier: "gem".to_string(),
                    target: Target::Location((1, 0)),
                }),
            )
            .unwrap();
        assert_eq!(dispatch.reply.events(), &[Event::attempt_failed("p1")]);
    }

    #[test]
    fn test_delete_moves_entity_to_rack_without_owner() {
        let mut engine = engine_with_room();
        let mut out = Message::new();
        assert_ok!(engine.fold(
            None,
            single(Event::Delete {
                identifier: "p1".to_string(),
            }),
            &mut out
        ));
        assert_eq!(engine.rack().owner_of("p1"), Some(None));
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_fold_propagates_desync() {
        let mut engine = engine_with_room();
        let mut out = Message::new();
        let result = engine.fold(
            None,
            single(Event::MovesTo {
                identifier: "ghost".to_string(),
                location: (0, 0),
            }),
            &mut out,
        );
        assert_eq!(result, Err(WorldError::UnknownEntity("ghost".to_string())));

        let mut empty = ServerEngine::new(Box::new(EchoGame::default()));
        assert_eq!(
            empty.fold(None, single(tile_event((0, 0))), &mut out),
            Err(WorldError::NoRoom)
        );
    }

    #[test]
    fn test_init_with_room_sends_resync_burst() {
        let mut engine = engine_with_room();
        let mut out = Message::new();
        assert_ok!(engine.fold(
            None,
            Message::from(vec![
                spawn(EntityType::ItemNoblock, "gem", (0, 0)),
                Event::PicksUp {
                    identifier: "p1".to_string(),
                    item_identifier: "gem".to_string(),
                },
            ]),
            &mut out,
        ));

        let dispatch = engine
            .handle_message(
                addr(9002),
                single(Event::Init {
                    identifier: "p2".to_string(),
                }),
            )
            .unwrap();

        let kinds: Vec<_> = dispatch.reply.iter().map(Event::kind).collect();
        let mut expected = vec![EventKind::EnterRoom];
        expected.extend(std::iter::repeat(EventKind::ChangeMapElement).take(9));
        expected.extend([
            EventKind::Spawn,
            EventKind::Spawn,
            EventKind::PicksUp,
            EventKind::RoomComplete,
            EventKind::Init,
        ]);
        assert_eq!(kinds, expected);

        // The gem is spawned where its owner stands
        assert_eq!(
            dispatch.reply.events()[11],
            Event::Spawn {
                entity: Entity::new(EntityType::ItemNoblock, "gem", "x.png"),
                location: (1, 1),
            }
        );
        assert!(engine.room().unwrap().active_clients.contains(&addr(9002)));
        assert_eq!(dispatch.recipients, vec![addr(9001)]);
        assert_eq!(dispatch.broadcast.len(), 0);
    }

    #[test]
    fn test_init_without_room_only_reaches_plugin() {
        let mut engine = ServerEngine::new(Box::new(EchoGame::default()));
        let init = single(Event::Init {
            identifier: "p1".to_string(),
        });
        let dispatch = engine.handle_message(addr(9001), init.clone()).unwrap();
        assert_eq!(dispatch.reply, init);
        assert!(engine.room().is_none());
    }

    #[test]
    fn test_broadcast_reaches_other_active_clients() {
        let mut engine = engine_with_room();
        engine
            .handle_message(
                addr(9002),
                single(Event::Init {
                    identifier: "p2".to_string(),
                }),
            )
            .unwrap();

        let dispatch = engine.handle_message(addr(9001), try_move((0, 1))).unwrap();
        assert_eq!(dispatch.recipients, vec![addr(9002)]);
        assert_eq!(dispatch.broadcast, dispatch.reply);
    }

    #[test]
    fn test_fold_leaves_no_tiles_to_fetch() {
        let mut engine = engine_with_room();
        assert!(engine.room().unwrap().tiles_to_fetch().is_empty());

        let mut out = Message::new();
        assert_ok!(engine.fold(None, single(tile_event((3, 1))), &mut out));
        assert!(engine.room().unwrap().floor_plan.contains_key(&(3, 1)));
        assert!(engine.room().unwrap().tiles_to_fetch().is_empty());
    }

    #[test]
    fn test_enter_different_room_replaces_room() {
        let mut engine = engine_with_room();
        let mut out = Message::new();
        assert_ok!(engine.fold(
            Some(addr(9005)),
            single(Event::EnterRoom {
                room_identifier: "cellar".to_string(),
            }),
            &mut out,
        ));

        let room = engine.room().unwrap();
        assert_eq!(room.identifier, "cellar");
        assert!(room.floor_plan.is_empty());
        assert_eq!(room.active_clients.len(), 1);
        assert!(room.active_clients.contains(&addr(9005)));
    }

    #[test]
    fn test_change_state_reaches_rack_items() {
        let mut engine = engine_with_room();
        let mut out = Message::new();
        assert_ok!(engine.fold(
            None,
            Message::from(vec![
                spawn(EntityType::ItemNoblock, "lamp", (0, 0)),
                Event::PicksUp {
                    identifier: "p1".to_string(),
                    item_identifier: "lamp".to_string(),
                },
                Event::ChangeState {
                    identifier: "lamp".to_string(),
                    state: "on".to_string(),
                },
            ]),
            &mut out,
        ));
        assert_eq!(engine.rack().entity("lamp").unwrap().state, "on");

        assert_err!(engine.fold(
            None,
            single(Event::ChangeState {
                identifier: "nothing".to_string(),
                state: "on".to_string(),
            }),
            &mut out,
        ));
    }

    #[test]
    fn test_disconnect_drops_membership_only() {
        let mut engine = engine_with_room();
        engine.disconnect(&addr(9001));

        let room = engine.room().unwrap();
        assert!(room.active_clients.is_empty());
        assert!(room.contains_entity("p1"));
    }

    #[test]
    fn test_unaccepted_kinds_skip_validation() {
        let mut engine = engine_with_room();
        let forged = single(Event::MovesTo {
            identifier: "p1".to_string(),
            location: (0, 0),
        });
        let dispatch = engine.handle_message(addr(9001), forged.clone()).unwrap();
        assert_eq!(dispatch.reply, forged);
    }

    #[test]
    fn test_idle_output_goes_to_every_client() {
        let mut game = EchoGame::default();
        game.idle_output = single(Event::Says {
            identifier: "narrator".to_string(),
            text: "A bell tolls.".to_string(),
        });

        let mut engine = ServerEngine::new(Box::new(game));
        let mut out = Message::new();
        assert_ok!(engine.fold(
            Some(addr(9001)),
            single(Event::EnterRoom {
                room_identifier: "r".to_string(),
            }),
            &mut out,
        ));

        let dispatch = engine.idle().unwrap().unwrap();
        assert!(dispatch.reply.is_empty());
        assert_eq!(dispatch.recipients, vec![addr(9001)]);
        assert_eq!(dispatch.broadcast.len(), 1);

        assert!(engine.idle().unwrap().is_none());
    }
}
