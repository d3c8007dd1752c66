use std::collections::HashMap;

use crate::models::{Event, EventId};

/// Client-held copy of the server's event set, keyed by id.
#[derive(Debug, Default)]
pub struct ReplicaStore {
    events: HashMap<EventId, Event>,
}

impl ReplicaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swaps the whole set. Duplicate ids in `events` collapse, last one wins.
    pub fn replace_all(&mut self, events: impl IntoIterator<Item = Event>) {
        self.events = events
            .into_iter()
            .map(|event| (event.id.clone(), event))
            .collect();
    }

    /// Adds `event` unless its id is already present. Returns whether it was added.
    pub fn append(&mut self, event: Event) -> bool {
        if self.events.contains_key(&event.id) {
            return false;
        }
        self.events.insert(event.id.clone(), event);
        true
    }

    /// Owned copy for rendering, ordered by start time then id for stable display.
    pub fn snapshot(&self) -> Vec<Event> {
        let mut events: Vec<Event> = self.events.values().cloned().collect();
        events.sort_by(|a, b| a.datetime.cmp(&b.datetime).then_with(|| a.id.cmp(&b.id)));
        events
    }

    pub fn get(&self, id: &EventId) -> Option<&Event> {
        self.events.get(id)
    }

    pub fn contains(&self, id: &EventId) -> bool {
        self.events.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
