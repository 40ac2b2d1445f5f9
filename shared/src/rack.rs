//! Holding area for entities taken out of a room

use crate::entity::Entity;
use crate::error::WorldError;
use std::collections::BTreeMap;

/// Entities removed from a room, with their owners
///
/// An owner of `None` means the world itself holds the entity, which is
/// what a plain deletion produces. Picked-up items are owned by whoever
/// picked them up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rack {
    pub entity_dict: BTreeMap<String, Entity>,
    pub owner_dict: BTreeMap<String, Option<String>>,
}

impl Rack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites `entity` and its owner
    pub fn store(&mut self, entity: Entity, owner: Option<String>) {
        self.owner_dict.insert(entity.identifier.clone(), owner);
        self.entity_dict.insert(entity.identifier.clone(), entity);
    }

    /// Identifiers of every entity owned by `owner`
    pub fn items_of(&self, owner: Option<&str>) -> Vec<String> {
        self.owner_dict
            .iter()
            .filter(|(_, item_owner)| item_owner.as_deref() == owner)
            .map(|(identifier, _)| identifier.clone())
            .collect()
    }

    pub fn owner_of(&self, identifier: &str) -> Option<Option<&str>> {
        self.owner_dict.get(identifier).map(|owner| owner.as_deref())
    }

    pub fn is_owned_by(&self, identifier: &str, owner: &str) -> bool {
        self.owner_of(identifier) == Some(Some(owner))
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.entity_dict.contains_key(identifier)
    }

    pub fn entity(&self, identifier: &str) -> Option<&Entity> {
        self.entity_dict.get(identifier)
    }

    /// Removes the entity and its ownership entry
    pub fn retrieve(&mut self, identifier: &str) -> Result<Entity, WorldError> {
        let entity = self
            .entity_dict
            .remove(identifier)
            .ok_or_else(|| WorldError::NotFound(identifier.to_string()))?;
        self.owner_dict.remove(identifier);
        Ok(entity)
    }

    pub fn change_state(&mut self, identifier: &str, state: &str) -> Result<(), WorldError> {
        let entity = self
            .entity_dict
            .get_mut(identifier)
            .ok_or_else(|| WorldError::NotFound(identifier.to_string()))?;
        entity.state = state.to_string();
        Ok(())
    }

    /// Owned entities as `(entity, owner)` pairs, for resync bursts
    pub fn owned(&self) -> impl Iterator<Item = (&Entity, &str)> {
        self.entity_dict.iter().filter_map(move |(identifier, entity)| {
            match self.owner_dict.get(identifier) {
                Some(Some(owner)) => Some((entity, owner.as_str())),
                _ => None,
            }
        })
    }

    /// Forgets every owned entity, keeping what the world itself holds
    pub fn retain_unowned(&mut self) {
        self.owner_dict.retain(|_, owner| owner.is_none());
        let owner_dict = &self.owner_dict;
        self.entity_dict
            .retain(|identifier, _| owner_dict.contains_key(identifier));
    }

    pub fn len(&self) -> usize {
        self.entity_dict.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entity_dict.is_empty()
    }
}
