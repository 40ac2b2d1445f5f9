//! Text room maps
//!
//! One row per line, `x` grows to the right and `y` downwards:
//!
//! | symbol | meaning                         |
//! |--------|---------------------------------|
//! | `.`    | floor                           |
//! | `#`    | obstacle                        |
//! | `o`    | floor with a blocking boulder   |
//! | `*`    | floor with a gem                |
//! | `n`    | floor with an NPC               |
//! | `@`    | floor, player spawn point       |
//! | space  | no tile                         |
//!
//! An optional first line `room: <identifier>` names the room.

use shared::{Entity, EntityType, Location, Tile};
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_ROOM_IDENTIFIER: &str = "first_room";

const BUILTIN_MAP: &str = "room: first_room
#########
#@..*...#
#..o..n.#
#...*...#
#########
";

#[derive(Debug, Error)]
pub enum MapError {
    #[error("cannot read map file: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown map symbol {symbol:?} at line {line}, column {column}")]
    UnknownSymbol {
        symbol: char,
        line: usize,
        column: usize,
    },

    #[error("map contains no tiles")]
    Empty,
}

/// A parsed room: tiles, the entities placed on them and where players start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapDescription {
    pub room_identifier: String,
    pub tiles: Vec<(Location, Tile)>,
    pub entities: Vec<(Entity, Location)>,
    pub spawn_point: Option<Location>,
}

impl MapDescription {
    pub fn parse(text: &str) -> Result<Self, MapError> {
        let mut room_identifier = DEFAULT_ROOM_IDENTIFIER.to_string();
        let mut tiles = Vec::new();
        let mut entities = Vec::new();
        let mut spawn_point = None;
        let mut y = 0;

        for (line_index, line) in text.lines().enumerate() {
            if line_index == 0 {
                if let Some(name) = line.strip_prefix("room:") {
                    room_identifier = name.trim().to_string();
                    continue;
                }
            }

            for (column, symbol) in line.chars().enumerate() {
                let location = (column as i32, y);
                let (tile, entity) = match symbol {
                    ' ' => continue,
                    '.' => (Tile::floor("floor.png"), None),
                    '#' => (Tile::obstacle("wall.png"), None),
                    '@' => {
                        spawn_point = Some(location);
                        (Tile::floor("floor.png"), None)
                    }
                    'o' => (
                        Tile::floor("floor.png"),
                        Some(Entity::new(EntityType::ItemBlock, item_id("boulder", location), "boulder.png")),
                    ),
                    '*' => (
                        Tile::floor("floor.png"),
                        Some(Entity::new(EntityType::ItemNoblock, item_id("gem", location), "gem.png")),
                    ),
                    'n' => (
                        Tile::floor("floor.png"),
                        Some(Entity::new(EntityType::Npc, item_id("npc", location), "npc.png")),
                    ),
                    other => {
                        return Err(MapError::UnknownSymbol {
                            symbol: other,
                            line: line_index + 1,
                            column: column + 1,
                        })
                    }
                };

                tiles.push((location, tile));
                if let Some(entity) = entity {
                    entities.push((entity, location));
                }
            }
            y += 1;
        }

        if tiles.is_empty() {
            return Err(MapError::Empty);
        }

        Ok(Self {
            room_identifier,
            tiles,
            entities,
            spawn_point,
        })
    }

    pub fn load(path: &Path) -> Result<Self, MapError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn builtin() -> Result<Self, MapError> {
        Self::parse(BUILTIN_MAP)
    }
}

fn item_id(prefix: &str, location: Location) -> String {
    format!("{}_{}_{}", prefix, location.0, location.1)
}
