pub mod event;

pub use event::{Coordinates, Event, EventId, NewEvent, Sport};
