//! Presentation capability and a line-based console implementation

use crate::assets::AssetFetcher;
use crate::error::ClientError;
use crate::input::{Command, InputManager, HELP};
use log::{debug, info, warn};
use shared::{EntityType, Event, Message, Rack, Room, Tile};
use std::collections::HashSet;
use std::io::BufRead;
use tokio::sync::mpsc;

/// What the client engine drives once per frame
///
/// `process` sees the events folded into the mirror during this frame and
/// a snapshot of the mirror afterwards. It returns player-originated events;
/// flow control and prediction are applied by the engine afterwards.
pub trait Presentation: Send {
    fn process(&mut self, message: &Message, room: Option<&Room>, rack: &Rack) -> Result<Message, ClientError>;

    /// Called with newly placed tiles so assets can be loaded in bulk
    fn prefetch(&mut self, _tiles: &[Tile]) -> Result<(), ClientError> {
        Ok(())
    }

    fn exit_requested(&self) -> bool {
        false
    }
}

/// Reads stdin lines on a dedicated thread, outside the runtime
pub fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    warn!("Cannot read stdin: {}", e);
                    return;
                }
            }
        }
        debug!("stdin closed");
    });
    rx
}

/// Text front end: prints the room and reads commands line by line
pub struct ConsolePresentation {
    player_id: String,
    input: InputManager,
    lines: mpsc::UnboundedReceiver<String>,
    fetcher: Option<Box<dyn AssetFetcher>>,
    fetched: HashSet<String>,
    exit: bool,
}

impl ConsolePresentation {
    pub fn new(
        player_id: impl Into<String>,
        lines: mpsc::UnboundedReceiver<String>,
        fetcher: Option<Box<dyn AssetFetcher>>,
    ) -> Self {
        let player_id = player_id.into();
        Self {
            input: InputManager::new(player_id.clone()),
            player_id,
            lines,
            fetcher,
            fetched: HashSet::new(),
            exit: false,
        }
    }

    fn fetch(&mut self, descriptor: &str) -> Result<(), ClientError> {
        let Some(fetcher) = self.fetcher.as_mut() else {
            return Ok(());
        };
        if self.fetched.insert(descriptor.to_string()) {
            fetcher.fetch(descriptor)?;
        }
        Ok(())
    }

    fn show(&mut self, event: &Event, room: Option<&Room>) -> Result<(), ClientError> {
        if let Event::Spawn { entity, .. } = event {
            return self.fetch(&entity.asset);
        }

        let me = self.player_id.as_str();
        match event {
            Event::RoomComplete => {
                if let Some(room) = room {
                    println!("{}", render_room(room, me));
                }
            }
            Event::EnterRoom { room_identifier } => println!("== {} ==", room_identifier),
            Event::Says { identifier, text } => println!("{} says: {}", identifier, text),
            Event::Perception { identifier, perception } if identifier == me => println!("{}", perception),
            Event::CanSpeak { identifier, sentences } if identifier == me => {
                for sentence in sentences {
                    println!("\"{}\"", sentence);
                }
            }
            Event::AttemptFailed { identifier } if identifier == me => println!("You can't do that."),
            Event::PicksUp {
                identifier,
                item_identifier,
            } if identifier == me => println!("Taken: {}", item_identifier),
            Event::Drops {
                identifier,
                item_identifier,
                ..
            } if identifier == me => println!("Dropped: {}", item_identifier),
            Event::MovesTo { identifier, .. } if identifier == me => {
                if let Some(room) = room {
                    println!("{}", render_room(room, me));
                }
            }
            other => debug!("{:?}", other),
        }
        Ok(())
    }

    fn handle_line(&mut self, line: &str, room: Option<&Room>, rack: &Rack, out: &mut Message) {
        let command = match Command::parse(line) {
            Ok(command) => command,
            Err(e) => {
                println!("{}", e);
                return;
            }
        };

        match &command {
            Command::Quit => {
                info!("Quit requested");
                self.exit = true;
            }
            Command::Help => println!("{}", HELP),
            Command::Inventory => {
                let items = rack.items_of(Some(&self.player_id));
                if items.is_empty() {
                    println!("You carry nothing.");
                } else {
                    println!("You carry: {}", items.join(", "));
                }
            }
            _ => {
                let location = room.and_then(|room| room.location_of(&self.player_id));
                let events = self.input.events_for(&command, location);
                if events.is_empty() {
                    println!("You are nowhere yet.");
                }
                out.append(events);
            }
        }
    }
}

impl Presentation for ConsolePresentation {
    fn process(&mut self, message: &Message, room: Option<&Room>, rack: &Rack) -> Result<Message, ClientError> {
        for event in message {
            self.show(event, room)?;
        }

        let mut produced = Message::new();
        while let Ok(line) = self.lines.try_recv() {
            self.handle_line(&line, room, rack, &mut produced);
            if self.exit {
                break;
            }
        }
        Ok(produced)
    }

    fn prefetch(&mut self, tiles: &[Tile]) -> Result<(), ClientError> {
        for tile in tiles {
            self.fetch(&tile.asset)?;
        }
        Ok(())
    }

    fn exit_requested(&self) -> bool {
        self.exit
    }
}

/// ASCII view of a room, the player drawn as `@`
pub fn render_room(room: &Room, player_id: &str) -> String {
    let Some(min_x) = room.floor_plan.keys().map(|(x, _)| *x).min() else {
        return String::new();
    };
    let max_x = room.floor_plan.keys().map(|(x, _)| *x).max().unwrap_or(min_x);
    let min_y = room.floor_plan.keys().map(|(_, y)| *y).min().unwrap_or(0);
    let max_y = room.floor_plan.keys().map(|(_, y)| *y).max().unwrap_or(min_y);

    let mut rows = Vec::new();
    for y in min_y..=max_y {
        let row: String = (min_x..=max_x)
            .map(|x| {
                let Some(element) = room.floor_plan.get(&(x, y)) else {
                    return ' ';
                };
                if element.entities.iter().any(|id| id == player_id) {
                    return '@';
                }
                match room.entities_at((x, y)).last().map(|entity| entity.entity_type) {
                    Some(EntityType::Player) => 'P',
                    Some(EntityType::Npc) => 'n',
                    Some(EntityType::ItemBlock) => 'o',
                    Some(EntityType::ItemNoblock) => '*',
                    None if element.tile.is_floor() => '.',
                    None => '#',
                }
            })
            .collect();
        rows.push(row);
    }
    rows.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{AssetUnavailable, Entity};
    use std::sync::Arc;

    fn small_room() -> Room {
        let mut room = Room::new("r");
        for x in 0..4 {
            room.change_map_element(Tile::floor("floor.png"), (x, 0));
        }
        room.change_map_element(Tile::obstacle("wall.png"), (0, 1));
        room.spawn(Entity::new(EntityType::Player, "p1", "player.png"), (0, 0))
            .unwrap();
        room.spawn(Entity::new(EntityType::ItemNoblock, "gem", "gem.png"), (1, 0))
            .unwrap();
        room.spawn(Entity::new(EntityType::Player, "p2", "player.png"), (3, 0))
            .unwrap();
        room
    }

    struct StubFetcher {
        fail_on: Option<String>,
    }

    impl AssetFetcher for StubFetcher {
        fn fetch(&mut self, descriptor: &str) -> Result<Arc<Vec<u8>>, AssetUnavailable> {
            if self.fail_on.as_deref() == Some(descriptor) {
                return Err(AssetUnavailable {
                    descriptor: descriptor.to_string(),
                    reason: "test".to_string(),
                });
            }
            Ok(Arc::new(Vec::new()))
        }
    }

    #[test]
    fn test_render_room() {
        assert_eq!(render_room(&small_room(), "p1"), "@*.P\n#   ");
        assert_eq!(render_room(&Room::new("empty"), "p1"), "");
    }

    #[test]
    fn test_commands_become_events() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut console = ConsolePresentation::new("p1", rx, None);
        tx.send("d".to_string()).unwrap();
        tx.send("say hi".to_string()).unwrap();

        let room = small_room();
        let produced = console
            .process(&Message::new(), Some(&room), &Rack::new())
            .unwrap();

        assert_eq!(
            produced.events(),
            &[
                Event::TriesToMove {
                    identifier: "p1".to_string(),
                    target: (1, 0),
                },
                Event::Says {
                    identifier: "p1".to_string(),
                    text: "hi".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_quit_and_bad_lines() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut console = ConsolePresentation::new("p1", rx, None);
        tx.send("dance".to_string()).unwrap();
        tx.send("inv".to_string()).unwrap();
        tx.send("quit".to_string()).unwrap();
        tx.send("w".to_string()).unwrap();

        let produced = console.process(&Message::new(), None, &Rack::new()).unwrap();
        assert!(produced.is_empty());
        assert!(console.exit_requested());
    }

    #[test]
    fn test_assets_are_fetched_once() {
        let (_tx, rx) = mpsc::unbounded_channel();
        let fetcher = StubFetcher {
            fail_on: None,
        };
        let mut console = ConsolePresentation::new("p1", rx, Some(Box::new(fetcher)));

        let tiles = vec![Tile::floor("floor.png"), Tile::floor("floor.png"), Tile::obstacle("wall.png")];
        console.prefetch(&tiles).unwrap();
        assert_eq!(console.fetched.len(), 2);

        let spawn = Message::from(vec![Event::Spawn {
            entity: Entity::new(EntityType::ItemNoblock, "gem", "gem.png"),
            location: (0, 0),
        }]);
        console.process(&spawn, None, &Rack::new()).unwrap();
        assert!(console.fetched.contains("gem.png"));
    }

    #[test]
    fn test_asset_failure_is_fatal() {
        let (_tx, rx) = mpsc::unbounded_channel();
        let fetcher = StubFetcher {
            fail_on: Some("wall.png".to_string()),
        };
        let mut console = ConsolePresentation::new("p1", rx, Some(Box::new(fetcher)));

        let result = console.prefetch(&[Tile::obstacle("wall.png")]);
        assert!(matches!(result, Err(ClientError::Asset(e)) if e.descriptor == "wall.png"));
    }
}
