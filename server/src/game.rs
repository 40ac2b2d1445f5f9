//! Reference game rules: room loading, player spawning and item interaction

use crate::map::MapDescription;
use crate::plugin::GameLogic;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use shared::{Entity, EntityType, Event, Location, Message, Rack, Room, Target};

pub const PLAYER_ASSET: &str = "player.png";

const DEFAULT_NPC_LINES: [&str; 2] = ["Hello, traveller.", "Mind the boulder by the door."];

/// Game logic served by the stock server binary
///
/// The room is loaded from a [`MapDescription`] the first time a client
/// initialises. Items can be picked up, dropped, switched and looked at;
/// NPCs talk. Reach is one tile in the four cardinal directions.
pub struct DefaultGame {
    map: MapDescription,
    npc_lines: Vec<String>,
    rng: StdRng,
}

impl DefaultGame {
    pub fn new(map: MapDescription) -> Self {
        Self::with_rng(map, StdRng::from_entropy())
    }

    /// Deterministic spawn placement, for tests and replays
    pub fn with_seed(map: MapDescription, seed: u64) -> Self {
        Self::with_rng(map, StdRng::seed_from_u64(seed))
    }

    fn with_rng(map: MapDescription, rng: StdRng) -> Self {
        Self {
            map,
            npc_lines: DEFAULT_NPC_LINES.iter().map(|line| line.to_string()).collect(),
            rng,
        }
    }

    pub fn set_npc_lines(&mut self, lines: Vec<String>) {
        self.npc_lines = lines;
    }

    /// Full construction burst for a room that does not exist yet
    fn load_room(&self, player: &str) -> Message {
        info!(
            "Loading room {} for {} ({} tiles)",
            self.map.room_identifier,
            player,
            self.map.tiles.len()
        );

        let mut message = Message::new();
        message.push(Event::EnterRoom {
            room_identifier: self.map.room_identifier.clone(),
        });
        for (location, tile) in &self.map.tiles {
            message.push(Event::ChangeMapElement {
                tile: tile.clone(),
                location: *location,
            });
        }
        for (entity, location) in &self.map.entities {
            message.push(Event::Spawn {
                entity: entity.clone(),
                location: *location,
            });
        }

        let start = self.map.spawn_point.or_else(|| self.first_free_floor());
        match start {
            Some(location) => message.push(Event::Spawn {
                entity: Entity::new(EntityType::Player, player, PLAYER_ASSET),
                location,
            }),
            None => warn!("Map {} has no free floor for {}", self.map.room_identifier, player),
        }

        message.push(Event::RoomComplete);
        message
    }

    fn first_free_floor(&self) -> Option<Location> {
        self.map
            .tiles
            .iter()
            .filter(|(_, tile)| tile.is_floor())
            .map(|(location, _)| *location)
            .find(|location| self.map.entities.iter().all(|(_, at)| at != location))
    }

    /// Spawns a newcomer into an already loaded room
    fn join_room(&mut self, player: &str, room: &Room, rack: &Rack) -> Option<Event> {
        if room.contains_entity(player) || rack.contains(player) {
            debug!("{} already present, not respawning", player);
            return None;
        }

        let free = room.free_floor_locations();
        let Some(location) = free.choose(&mut self.rng).copied() else {
            warn!("No free floor left in {} for {}", room.identifier, player);
            return None;
        };

        Some(Event::Spawn {
            entity: Entity::new(EntityType::Player, player, PLAYER_ASSET),
            location,
        })
    }

    fn handle_event(&mut self, event: &Event, room: Option<&Room>, rack: &Rack, out: &mut Message) {
        match event {
            Event::Init { identifier } => match room {
                None => out.append(self.load_room(identifier)),
                Some(room) => {
                    if let Some(spawn) = self.join_room(identifier, room, rack) {
                        out.push(spawn);
                    }
                }
            },

            Event::TriesToLookAt {
                identifier,
                target: Target::Entity(target),
            } => {
                let seen = room
                    .and_then(|room| room.entity(target))
                    .or_else(|| rack.entity(target));
                match seen {
                    Some(entity) => {
                        out.push(Event::Perception {
                            identifier: identifier.clone(),
                            perception: describe(entity),
                        });
                        out.push(Event::LookedAt {
                            identifier: target.clone(),
                            target_identifier: identifier.clone(),
                        });
                    }
                    None => out.push(Event::attempt_failed(identifier.as_str())),
                }
            }

            Event::TriesToPickUp {
                identifier,
                target: Target::Entity(item),
            } => {
                let portable = room
                    .and_then(|room| room.entity(item))
                    .map_or(false, |entity| entity.entity_type == EntityType::ItemNoblock);

                if portable && within_reach(room, identifier, item) {
                    out.push(Event::PicksUp {
                        identifier: identifier.clone(),
                        item_identifier: item.clone(),
                    });
                    out.push(Event::PickedUp {
                        identifier: item.clone(),
                        target_identifier: identifier.clone(),
                    });
                } else {
                    out.push(Event::attempt_failed(identifier.as_str()));
                }
            }

            Event::TriesToDrop {
                identifier,
                item_identifier,
                target: Target::Location(location),
            } => {
                out.push(Event::Drops {
                    identifier: identifier.clone(),
                    item_identifier: item_identifier.clone(),
                    location: *location,
                });
                out.push(Event::Dropped {
                    identifier: item_identifier.clone(),
                    target_identifier: identifier.clone(),
                });
            }

            Event::TriesToManipulate {
                identifier,
                target: Target::Entity(item),
            } => match room.and_then(|room| room.entity(item)) {
                Some(entity) if within_reach(room, identifier, item) => {
                    let state = if entity.state == "on" { "off" } else { "on" };
                    out.push(Event::Manipulates {
                        identifier: identifier.clone(),
                        item_identifier: item.clone(),
                    });
                    out.push(Event::ChangeState {
                        identifier: item.clone(),
                        state: state.to_string(),
                    });
                }
                _ => out.push(Event::attempt_failed(identifier.as_str())),
            },

            Event::TriesToTalkTo {
                identifier,
                target: Target::Entity(npc),
            } => {
                let is_npc = room
                    .and_then(|room| room.entity(npc))
                    .map_or(false, |entity| entity.entity_type == EntityType::Npc);

                if is_npc && within_reach(room, identifier, npc) {
                    out.push(Event::CanSpeak {
                        identifier: identifier.clone(),
                        sentences: self.npc_lines.clone(),
                    });
                } else {
                    out.push(Event::attempt_failed(identifier.as_str()));
                }
            }

            // Dropping onto another entity has no merge rules in this game
            Event::TriesToDrop { identifier, .. }
            | Event::TriesToLookAt { identifier, .. }
            | Event::TriesToPickUp { identifier, .. }
            | Event::TriesToManipulate { identifier, .. }
            | Event::TriesToTalkTo { identifier, .. }
            | Event::TriesToMove { identifier, .. } => {
                out.push(Event::attempt_failed(identifier.as_str()));
            }

            Event::MovesTo { .. }
            | Event::PicksUp { .. }
            | Event::Drops { .. }
            | Event::CanSpeak { .. }
            | Event::Perception { .. }
            | Event::Manipulates { .. }
            | Event::AttemptFailed { .. }
            | Event::Spawn { .. }
            | Event::Delete { .. }
            | Event::EnterRoom { .. }
            | Event::RoomComplete
            | Event::ChangeMapElement { .. }
            | Event::Says { .. }
            | Event::ChangeState { .. }
            | Event::Passed { .. }
            | Event::LookedAt { .. }
            | Event::PickedUp { .. }
            | Event::Dropped { .. } => out.push(event.clone()),
        }
    }
}

impl GameLogic for DefaultGame {
    fn process(&mut self, inbound: &Message, room: Option<&Room>, rack: &Rack) -> Message {
        let mut out = Message::new();
        for event in inbound {
            self.handle_event(event, room, rack, &mut out);
        }
        out
    }
}

fn describe(entity: &Entity) -> String {
    let name = entity
        .asset
        .rsplit_once('.')
        .map_or(entity.asset.as_str(), |(stem, _)| stem);
    if entity.state.is_empty() {
        format!("You see a {}.", name)
    } else {
        format!("You see a {}. It is {}.", name, entity.state)
    }
}

/// True if `target` stands on or next to `actor`
fn within_reach(room: Option<&Room>, actor: &str, target: &str) -> bool {
    let Some(room) = room else {
        return false;
    };
    match (room.location_of(actor), room.location_of(target)) {
        (Some(a), Some(b)) => (a.0 - b.0).abs() + (a.1 - b.1).abs() <= 1,
        _ => false,
    }
}
