use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use serde::Serialize;

use super::{Step, ValidationError};
use crate::models::event::{DEFAULT_MAX_PLAYERS, MIN_MAX_PLAYERS};
use crate::models::{Coordinates, NewEvent, Sport};

/// Longest capacity the free-text field accepts, in digits.
const CAPACITY_MAX_DIGITS: usize = 2;

/// Field values collected so far. Survives backward navigation and failed
/// submissions; discarded when the wizard closes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Draft {
    pub name: String,
    pub sport: Option<Sport>,
    pub description: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub capacity: u32,
}

impl Draft {
    /// Defaults: empty text, no sport, today at the current minute, 4 players.
    pub fn new(now: DateTime<Utc>, offset: FixedOffset) -> Self {
        let local = now.with_timezone(&offset);
        Self {
            name: String::new(),
            sport: None,
            description: String::new(),
            date: local.date_naive(),
            time: minute_of(local.time()),
            capacity: DEFAULT_MAX_PLAYERS,
        }
    }

    pub(super) fn validate(&self, step: Step, offset: FixedOffset) -> Result<(), ValidationError> {
        match step {
            Step::Name if self.name.trim().is_empty() => Err(ValidationError::MissingName),
            Step::Sport if self.sport.is_none() => Err(ValidationError::MissingSport),
            Step::Schedule => self.datetime(offset).map(|_| ()),
            _ => Ok(()),
        }
    }

    pub(super) fn set_time(&mut self, time: NaiveTime) {
        self.time = minute_of(time);
    }

    pub(super) fn increment_capacity(&mut self) -> u32 {
        self.capacity = self.capacity.saturating_add(1);
        self.capacity
    }

    pub(super) fn decrement_capacity(&mut self) -> u32 {
        self.capacity = self.capacity.saturating_sub(1).max(MIN_MAX_PLAYERS);
        self.capacity
    }

    /// Keeps digits only, up to two of them. Empty or zero becomes the minimum.
    pub(super) fn set_capacity_text(&mut self, text: &str) -> u32 {
        let digits: String = text
            .chars()
            .filter(char::is_ascii_digit)
            .take(CAPACITY_MAX_DIGITS)
            .collect();
        self.capacity = digits.parse().unwrap_or(MIN_MAX_PLAYERS).max(MIN_MAX_PLAYERS);
        self.capacity
    }

    /// Date and time combined in `offset`, at minute precision. Fails when the
    /// instant falls outside the representable range.
    pub fn datetime(&self, offset: FixedOffset) -> Result<DateTime<Utc>, ValidationError> {
        self.date
            .and_time(self.time)
            .checked_sub_signed(Duration::seconds(i64::from(offset.local_minus_utc())))
            .map(|utc| Utc.from_utc_datetime(&utc))
            .ok_or(ValidationError::DateOutOfRange(self.date))
    }

    pub(super) fn to_payload(
        &self,
        location: Coordinates,
        offset: FixedOffset,
    ) -> Result<NewEvent, ValidationError> {
        self.validate(Step::Name, offset)?;
        let sport = self.sport.ok_or(ValidationError::MissingSport)?;

        Ok(NewEvent {
            name: self.name.trim().to_string(),
            sport,
            description: self.description.clone(),
            datetime: self.datetime(offset)?,
            max_players: self.capacity.max(MIN_MAX_PLAYERS),
            latitude: location.latitude,
            longitude: location.longitude,
        })
    }
}

fn minute_of(time: NaiveTime) -> NaiveTime {
    time.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(time)
}
