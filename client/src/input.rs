//! Player command parsing and translation into attempt events

use shared::{Event, Location, Message, Target};
use thiserror::Error;

pub const HELP: &str = "\
commands:
  w/a/s/d                move up/left/down/right
  look|take|use|talk DIR act on a neighbouring tile
  drop ITEM DIR          put an item from the inventory down
  say TEXT               speak to the room
  inv                    list the inventory
  help                   show this text
  quit                   leave
directions: n s e w (or up down left right), here";

/// One parsed line of player input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Move(Location),
    LookAt(Location),
    PickUp(Location),
    Manipulate(Location),
    TalkTo(Location),
    Drop { item: String, direction: Location },
    Say(String),
    Inventory,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("empty command")]
    Empty,

    #[error("unknown command {0:?}, try help")]
    Unknown(String),

    #[error("unknown direction {0:?}")]
    Direction(String),

    #[error("{0} needs more arguments")]
    MissingArgument(&'static str),
}

fn parse_direction(word: Option<&str>, command: &'static str) -> Result<Location, InputError> {
    match word.ok_or(InputError::MissingArgument(command))? {
        "n" | "north" | "up" => Ok((0, -1)),
        "s" | "south" | "down" => Ok((0, 1)),
        "w" | "west" | "left" => Ok((-1, 0)),
        "e" | "east" | "right" => Ok((1, 0)),
        "here" => Ok((0, 0)),
        other => Err(InputError::Direction(other.to_string())),
    }
}

impl Command {
    pub fn parse(line: &str) -> Result<Command, InputError> {
        let line = line.trim();
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };
        let mut words = rest.split_whitespace();

        match verb.to_lowercase().as_str() {
            "" => Err(InputError::Empty),
            "w" => Ok(Command::Move((0, -1))),
            "a" => Ok(Command::Move((-1, 0))),
            "s" => Ok(Command::Move((0, 1))),
            "d" => Ok(Command::Move((1, 0))),
            "go" => parse_direction(words.next(), "go").map(Command::Move),
            "look" => parse_direction(words.next(), "look").map(Command::LookAt),
            "take" => parse_direction(words.next(), "take").map(Command::PickUp),
            "use" => parse_direction(words.next(), "use").map(Command::Manipulate),
            "talk" => parse_direction(words.next(), "talk").map(Command::TalkTo),
            "drop" => {
                let item = words.next().ok_or(InputError::MissingArgument("drop"))?;
                let direction = parse_direction(words.next(), "drop")?;
                Ok(Command::Drop {
                    item: item.to_string(),
                    direction,
                })
            }
            "say" if rest.is_empty() => Err(InputError::MissingArgument("say")),
            "say" => Ok(Command::Say(rest.to_string())),
            "inv" | "inventory" => Ok(Command::Inventory),
            "help" | "?" => Ok(Command::Help),
            "quit" | "exit" => Ok(Command::Quit),
            other => Err(InputError::Unknown(other.to_string())),
        }
    }
}

/// Turns commands into events on behalf of one player
pub struct InputManager {
    player_id: String,
}

impl InputManager {
    pub fn new(player_id: impl Into<String>) -> Self {
        Self {
            player_id: player_id.into(),
        }
    }

    /// Events for `command`, given where the player stands
    ///
    /// Commands that target a tile produce nothing while the player's
    /// location is unknown. Local commands (inventory, help, quit) never
    /// produce events.
    pub fn events_for(&self, command: &Command, location: Option<Location>) -> Message {
        let identifier = self.player_id.clone();
        let at = |direction: Location| location.map(|(x, y)| (x + direction.0, y + direction.1));

        let event = match command {
            Command::Move(direction) => at(*direction).map(|target| Event::TriesToMove { identifier, target }),
            Command::LookAt(direction) => at(*direction).map(|target| Event::TriesToLookAt {
                identifier,
                target: Target::Location(target),
            }),
            Command::PickUp(direction) => at(*direction).map(|target| Event::TriesToPickUp {
                identifier,
                target: Target::Location(target),
            }),
            Command::Manipulate(direction) => at(*direction).map(|target| Event::TriesToManipulate {
                identifier,
                target: Target::Location(target),
            }),
            Command::TalkTo(direction) => at(*direction).map(|target| Event::TriesToTalkTo {
                identifier,
                target: Target::Location(target),
            }),
            Command::Drop { item, direction } => at(*direction).map(|target| Event::TriesToDrop {
                identifier,
                item_identifier: item.clone(),
                target: Target::Location(target),
            }),
            Command::Say(text) => Some(Event::Says {
                identifier,
                text: text.clone(),
            }),
            Command::Inventory | Command::Help | Command::Quit => None,
        };

        event.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_movement_keys() {
        assert_eq!(Command::parse("w"), Ok(Command::Move((0, -1))));
        assert_eq!(Command::parse("a"), Ok(Command::Move((-1, 0))));
        assert_eq!(Command::parse(" s "), Ok(Command::Move((0, 1))));
        assert_eq!(Command::parse("D"), Ok(Command::Move((1, 0))));
        assert_eq!(Command::parse("go north"), Ok(Command::Move((0, -1))));
    }

    #[test]
    fn test_parse_actions() {
        assert_eq!(Command::parse("look e"), Ok(Command::LookAt((1, 0))));
        assert_eq!(Command::parse("take here"), Ok(Command::PickUp((0, 0))));
        assert_eq!(Command::parse("use left"), Ok(Command::Manipulate((-1, 0))));
        assert_eq!(Command::parse("talk s"), Ok(Command::TalkTo((0, 1))));
        assert_eq!(
            Command::parse("drop gem_4_1 n"),
            Ok(Command::Drop {
                item: "gem_4_1".to_string(),
                direction: (0, -1),
            })
        );
        assert_eq!(
            Command::parse("say  hello there "),
            Ok(Command::Say("hello there".to_string()))
        );
        assert_eq!(Command::parse("inv"), Ok(Command::Inventory));
        assert_eq!(Command::parse("quit"), Ok(Command::Quit));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(Command::parse("   "), Err(InputError::Empty));
        assert_eq!(Command::parse("dance"), Err(InputError::Unknown("dance".to_string())));
        assert_eq!(Command::parse("look"), Err(InputError::MissingArgument("look")));
        assert_eq!(Command::parse("look up-ish"), Err(InputError::Direction("up-ish".to_string())));
        assert_eq!(Command::parse("drop gem"), Err(InputError::MissingArgument("drop")));
        assert_eq!(Command::parse("say"), Err(InputError::MissingArgument("say")));
    }

    #[test]
    fn test_events_target_neighbouring_tile() {
        let input = InputManager::new("p1");

        let message = input.events_for(&Command::Move((1, 0)), Some((3, 3)));
        assert_eq!(
            message.events(),
            &[Event::TriesToMove {
                identifier: "p1".to_string(),
                target: (4, 3),
            }]
        );

        let message = input.events_for(&Command::PickUp((0, -1)), Some((3, 3)));
        assert_eq!(
            message.events(),
            &[Event::TriesToPickUp {
                identifier: "p1".to_string(),
                target: Target::Location((3, 2)),
            }]
        );
    }

    #[test]
    fn test_events_without_location() {
        let input = InputManager::new("p1");
        assert!(input.events_for(&Command::Move((1, 0)), None).is_empty());

        let says = input.events_for(&Command::Say("hi".to_string()), None);
        assert_eq!(says.len(), 1);
        assert!(input.events_for(&Command::Inventory, Some((0, 0))).is_empty());
    }
}
