//! One time-frame's worth of events

use crate::event::{Event, EventKind};
use serde::{Deserialize, Serialize};

/// An ordered sequence of events, applied front to back
///
/// `has_enter_room` and `has_room_complete` cache whether the sequence
/// contains those kinds. Every mutating method keeps them current and only
/// the event list goes over the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Event>", into = "Vec<Event>")]
pub struct Message {
    events: Vec<Event>,
    has_enter_room: bool,
    has_room_complete: bool,
}

impl Message {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn into_events(self) -> Vec<Event> {
        self.events
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Event> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn has_enter_room(&self) -> bool {
        self.has_enter_room
    }

    pub fn has_room_complete(&self) -> bool {
        self.has_room_complete
    }

    pub fn push(&mut self, event: Event) {
        self.note(&event);
        self.events.push(event);
    }

    pub fn append(&mut self, other: Message) {
        for event in other.events {
            self.push(event);
        }
    }

    pub fn retain<F: FnMut(&Event) -> bool>(&mut self, keep: F) {
        self.events.retain(keep);
        self.refresh_flags();
    }

    pub fn contains_kind(&self, kind: EventKind) -> bool {
        self.events.iter().any(|event| event.kind() == kind)
    }

    fn note(&mut self, event: &Event) {
        match event.kind() {
            EventKind::EnterRoom => self.has_enter_room = true,
            EventKind::RoomComplete => self.has_room_complete = true,
            _ => {}
        }
    }

    fn refresh_flags(&mut self) {
        self.has_enter_room = self.contains_kind(EventKind::EnterRoom);
        self.has_room_complete = self.contains_kind(EventKind::RoomComplete);
    }
}

impl From<Vec<Event>> for Message {
    fn from(events: Vec<Event>) -> Self {
        let mut message = Message {
            events,
            has_enter_room: false,
            has_room_complete: false,
        };
        message.refresh_flags();
        message
    }
}

impl From<Message> for Vec<Event> {
    fn from(message: Message) -> Self {
        message.events
    }
}

impl FromIterator<Event> for Message {
    fn from_iter<I: IntoIterator<Item = Event>>(iter: I) -> Self {
        Message::from(iter.into_iter().collect::<Vec<_>>())
    }
}

impl Extend<Event> for Message {
    fn extend<I: IntoIterator<Item = Event>>(&mut self, iter: I) {
        for event in iter {
            self.push(event);
        }
    }
}

impl IntoIterator for Message {
    type Item = Event;
    type IntoIter = std::vec::IntoIter<Event>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.into_iter()
    }
}

impl<'a> IntoIterator for &'a Message {
    type Item = &'a Event;
    type IntoIter = std::slice::Iter<'a, Event>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}
