//! Authoritative spatial state: a sparse tile grid and the entities on it

use crate::entity::{Entity, Tile};
use crate::error::WorldError;
use crate::event::{Event, Location};
use log::debug;
use std::collections::{BTreeMap, BTreeSet};
use std::net::SocketAddr;

/// Key identifying a connected client on the server
pub type ClientKey = SocketAddr;

/// One tile plus the identifiers of the entities standing on it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FloorPlanElement {
    pub tile: Tile,
    pub entities: Vec<String>,
}

/// A map, the entities placed on it and the clients present in it
///
/// Invariants kept by every operation:
/// - each key of `entity_dict` has exactly one entry in `entity_locations`
/// - the `FloorPlanElement` at that location lists the identifier exactly once
/// - every location in `entity_locations` is a key of `floor_plan`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Room {
    pub identifier: String,
    pub floor_plan: BTreeMap<Location, FloorPlanElement>,
    pub entity_dict: BTreeMap<String, Entity>,
    pub entity_locations: BTreeMap<String, Location>,
    pub active_clients: BTreeSet<ClientKey>,
    tiles_to_fetch: Vec<Tile>,
}

impl Room {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            floor_plan: BTreeMap::new(),
            entity_dict: BTreeMap::new(),
            entity_locations: BTreeMap::new(),
            active_clients: BTreeSet::new(),
            tiles_to_fetch: Vec::new(),
        }
    }

    /// Applies a room-level event in place
    ///
    /// Only ChangeMapElement, Spawn, MovesTo, Delete and ChangeState touch a
    /// room. Anything else is rejected with `Unapplicable`.
    pub fn apply(&mut self, event: &Event) -> Result<(), WorldError> {
        match event {
            Event::ChangeMapElement { tile, location } => {
                self.change_map_element(tile.clone(), *location);
                Ok(())
            }
            Event::Spawn { entity, location } => self.spawn(entity.clone(), *location),
            Event::MovesTo {
                identifier,
                location,
            } => self.move_entity(identifier, *location),
            Event::Delete { identifier } => self.delete(identifier).map(|_| ()),
            Event::ChangeState { identifier, state } => self.change_state(identifier, state),
            other => Err(WorldError::Unapplicable(other.kind())),
        }
    }

    /// Inserts or replaces the tile at `location`
    ///
    /// Entities already standing there stay where they are.
    pub fn change_map_element(&mut self, tile: Tile, location: Location) {
        self.tiles_to_fetch.push(tile.clone());
        self.floor_plan
            .entry(location)
            .and_modify(|element| element.tile = tile.clone())
            .or_insert_with(|| FloorPlanElement {
                tile,
                entities: Vec::new(),
            });
    }

    /// Places `entity` at `location`. Spawning an identifier that already
    /// exists is a no-op, so rebroadcast spawns are harmless.
    pub fn spawn(&mut self, entity: Entity, location: Location) -> Result<(), WorldError> {
        let element = self
            .floor_plan
            .get_mut(&location)
            .ok_or(WorldError::UndefinedLocation(location))?;

        if self.entity_dict.contains_key(&entity.identifier) {
            debug!("Ignoring duplicate spawn of {}", entity.identifier);
            return Ok(());
        }

        element.entities.push(entity.identifier.clone());
        self.entity_locations
            .insert(entity.identifier.clone(), location);
        self.entity_dict.insert(entity.identifier.clone(), entity);
        Ok(())
    }

    pub fn move_entity(&mut self, identifier: &str, location: Location) -> Result<(), WorldError> {
        let old_location = self
            .location_of(identifier)
            .ok_or_else(|| WorldError::UnknownEntity(identifier.to_string()))?;

        if !self.floor_plan.contains_key(&location) {
            return Err(WorldError::UndefinedLocation(location));
        }

        if old_location == location {
            return Ok(());
        }

        if let Some(element) = self.floor_plan.get_mut(&old_location) {
            element.entities.retain(|id| id != identifier);
        }
        if let Some(element) = self.floor_plan.get_mut(&location) {
            element.entities.push(identifier.to_string());
        }
        self.entity_locations
            .insert(identifier.to_string(), location);
        Ok(())
    }

    /// Removes the entity from the room and hands it back
    pub fn delete(&mut self, identifier: &str) -> Result<Entity, WorldError> {
        let entity = self
            .entity_dict
            .remove(identifier)
            .ok_or_else(|| WorldError::UnknownEntity(identifier.to_string()))?;

        if let Some(location) = self.entity_locations.remove(identifier) {
            if let Some(element) = self.floor_plan.get_mut(&location) {
                element.entities.retain(|id| id != identifier);
            }
        }

        Ok(entity)
    }

    pub fn change_state(&mut self, identifier: &str, state: &str) -> Result<(), WorldError> {
        let entity = self
            .entity_dict
            .get_mut(identifier)
            .ok_or_else(|| WorldError::UnknownEntity(identifier.to_string()))?;
        entity.state = state.to_string();
        Ok(())
    }

    pub fn entity(&self, identifier: &str) -> Option<&Entity> {
        self.entity_dict.get(identifier)
    }

    pub fn contains_entity(&self, identifier: &str) -> bool {
        self.entity_dict.contains_key(identifier)
    }

    pub fn location_of(&self, identifier: &str) -> Option<Location> {
        self.entity_locations.get(identifier).copied()
    }

    pub fn tile_at(&self, location: Location) -> Option<&Tile> {
        self.floor_plan.get(&location).map(|element| &element.tile)
    }

    /// Entities standing at `location`, in arrival order
    pub fn entities_at(&self, location: Location) -> impl Iterator<Item = &Entity> {
        self.floor_plan
            .get(&location)
            .into_iter()
            .flat_map(|element| element.entities.iter())
            .filter_map(move |id| self.entity_dict.get(id))
    }

    /// The most recently placed item at `location`
    pub fn last_item_at(&self, location: Location) -> Option<&Entity> {
        self.entities_at(location)
            .filter(|entity| entity.entity_type.is_item())
            .last()
    }

    /// The most recently placed player or NPC at `location`
    pub fn last_character_at(&self, location: Location) -> Option<&Entity> {
        self.entities_at(location)
            .filter(|entity| entity.entity_type.is_character())
            .last()
    }

    pub fn is_occupied(&self, location: Location) -> bool {
        self.entities_at(location).next().is_some()
    }

    pub fn has_blocking_item(&self, location: Location) -> bool {
        self.entities_at(location).any(Entity::blocks_movement)
    }

    /// Floor locations with nothing standing on them, in grid order
    pub fn free_floor_locations(&self) -> Vec<Location> {
        self.floor_plan
            .iter()
            .filter(|(_, element)| element.tile.is_floor() && element.entities.is_empty())
            .map(|(location, _)| *location)
            .collect()
    }

    /// Registers a client as present. Returns false if it already was.
    pub fn register_client(&mut self, client: ClientKey) -> bool {
        self.active_clients.insert(client)
    }

    pub fn unregister_client(&mut self, client: &ClientKey) -> bool {
        self.active_clients.remove(client)
    }

    /// Tiles added since the last call, for bulk asset prefetch
    pub fn take_tiles_to_fetch(&mut self) -> Vec<Tile> {
        std::mem::take(&mut self.tiles_to_fetch)
    }

    pub fn tiles_to_fetch(&self) -> &[Tile] {
        &self.tiles_to_fetch
    }

    /// Checks the placement invariants documented on [`Room`]
    pub fn is_consistent(&self) -> bool {
        if self.entity_dict.len() != self.entity_locations.len() {
            return false;
        }

        for identifier in self.entity_dict.keys() {
            let Some(location) = self.entity_locations.get(identifier) else {
                return false;
            };
            let Some(element) = self.floor_plan.get(location) else {
                return false;
            };
            if element.entities.iter().filter(|id| *id == identifier).count() != 1 {
                return false;
            }
        }

        let placed: usize = self
            .floor_plan
            .values()
            .map(|element| element.entities.len())
            .sum();
        placed == self.entity_dict.len()
    }
}
