use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

pub const DEFAULT_MAX_PLAYERS: u32 = 4;
pub const MIN_MAX_PLAYERS: u32 = 1;

/// Backend-assigned event identifier. Opaque to the client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<Uuid> for EventId {
    fn from(id: Uuid) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sport {
    Basketball,
    Football,
    Baseball,
    Tennis,
    Golf,
    Cycling,
    Soccer,
    Volleyball,
}

impl Sport {
    pub const ALL: [Sport; 8] = [
        Sport::Basketball,
        Sport::Football,
        Sport::Baseball,
        Sport::Tennis,
        Sport::Golf,
        Sport::Cycling,
        Sport::Soccer,
        Sport::Volleyball,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Sport::Basketball => "Basketball",
            Sport::Football => "Football",
            Sport::Baseball => "Baseball",
            Sport::Tennis => "Tennis",
            Sport::Golf => "Golf",
            Sport::Cycling => "Cycling",
            Sport::Soccer => "Soccer",
            Sport::Volleyball => "Volleyball",
        }
    }

    /// Icon name the map surface uses for markers and the sport picker.
    pub fn icon(self) -> &'static str {
        match self {
            Sport::Basketball => "basketball",
            Sport::Football => "football",
            Sport::Baseball => "baseball",
            Sport::Tennis => "tennisball",
            Sport::Golf => "golf",
            Sport::Cycling => "bicycle",
            Sport::Soccer => "football-outline",
            Sport::Volleyball => "hand-left-outline",
        }
    }
}

impl fmt::Display for Sport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown sport '{0}'")]
pub struct UnknownSport(pub String);

impl FromStr for Sport {
    type Err = UnknownSport;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Sport::ALL
            .into_iter()
            .find(|sport| sport.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownSport(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub name: String,
    pub sport: Sport,
    #[serde(default)]
    pub description: String,
    pub datetime: DateTime<Utc>,
    pub max_players: u32,
    pub latitude: f64,
    pub longitude: f64,
    pub created_at: DateTime<Utc>,
}

impl Event {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }
}

/// Insert payload. The store assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
    pub name: String,
    pub sport: Sport,
    pub description: String,
    pub datetime: DateTime<Utc>,
    pub max_players: u32,
    pub latitude: f64,
    pub longitude: f64,
}

impl NewEvent {
    pub fn into_event(self, id: EventId, created_at: DateTime<Utc>) -> Event {
        Event {
            id,
            name: self.name,
            sport: self.sport,
            description: self.description,
            datetime: self.datetime,
            max_players: self.max_players,
            latitude: self.latitude,
            longitude: self.longitude,
            created_at,
        }
    }
}
