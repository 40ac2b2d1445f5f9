use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TileType {
    Floor,
    Obstacle,
}

/// A map tile. Obstacles block movement; tiles carry no behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
    pub tile_type: TileType,
    pub asset: String,
}

impl Tile {
    pub fn new(tile_type: TileType, asset: impl Into<String>) -> Self {
        Self {
            tile_type,
            asset: asset.into(),
        }
    }

    pub fn floor(asset: impl Into<String>) -> Self {
        Self::new(TileType::Floor, asset)
    }

    pub fn obstacle(asset: impl Into<String>) -> Self {
        Self::new(TileType::Obstacle, asset)
    }

    pub fn is_floor(&self) -> bool {
        self.tile_type == TileType::Floor
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityType {
    Player,
    Npc,
    /// An item that occupies its tile exclusively
    ItemBlock,
    ItemNoblock,
}

impl EntityType {
    pub fn is_item(self) -> bool {
        matches!(self, EntityType::ItemBlock | EntityType::ItemNoblock)
    }

    pub fn is_character(self) -> bool {
        matches!(self, EntityType::Player | EntityType::Npc)
    }
}

/// Anything that stands on a tile: players, NPCs and items
///
/// The identifier is unique across one Room and its Rack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub entity_type: EntityType,
    pub identifier: String,
    pub asset: String,
    pub state: String,
}

impl Entity {
    pub fn new(
        entity_type: EntityType,
        identifier: impl Into<String>,
        asset: impl Into<String>,
    ) -> Self {
        Self {
            entity_type,
            identifier: identifier.into(),
            asset: asset.into(),
            state: String::new(),
        }
    }

    pub fn blocks_movement(&self) -> bool {
        self.entity_type == EntityType::ItemBlock
    }
}
