//! Multi-step event creation.
//!
//! The wizard walks Name → Sport → Description → Schedule → Capacity, then
//! holds the draft while the insert is in flight. Inputs are only accepted on
//! the step that owns them, and nothing is accepted while submitting.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::models::{Coordinates, Event, NewEvent, Sport};
use crate::store::StoreError;

mod draft;

pub use draft::Draft;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Name,
    Sport,
    Description,
    Schedule,
    Capacity,
}

impl Step {
    pub const COUNT: u8 = 5;

    /// 1-based position for progress chrome.
    pub fn index(self) -> u8 {
        match self {
            Step::Name => 1,
            Step::Sport => 2,
            Step::Description => 3,
            Step::Schedule => 4,
            Step::Capacity => 5,
        }
    }

    pub fn prompt(self) -> &'static str {
        match self {
            Step::Name => "What's your event called?",
            Step::Sport => "What sport will you play?",
            Step::Description => "Describe your event",
            Step::Schedule => "When is your event?",
            Step::Capacity => "How many players do you need?",
        }
    }

    fn next(self) -> Option<Step> {
        match self {
            Step::Name => Some(Step::Sport),
            Step::Sport => Some(Step::Description),
            Step::Description => Some(Step::Schedule),
            Step::Schedule => Some(Step::Capacity),
            Step::Capacity => None,
        }
    }

    fn previous(self) -> Option<Step> {
        match self {
            Step::Name => None,
            Step::Sport => Some(Step::Name),
            Step::Description => Some(Step::Sport),
            Step::Schedule => Some(Step::Description),
            Step::Capacity => Some(Step::Schedule),
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Step::Name => "name",
            Step::Sport => "sport",
            Step::Description => "description",
            Step::Schedule => "schedule",
            Step::Capacity => "capacity",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please enter an event name")]
    MissingName,

    #[error("Please select a sport for your event")]
    MissingSport,

    #[error("Event date cannot be earlier than {0}")]
    DateBeforeToday(NaiveDate),

    #[error("Event date {0} is too far in the future")]
    DateOutOfRange(NaiveDate),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WizardError {
    #[error("Missing information: {0}")]
    Invalid(#[from] ValidationError),

    #[error("{input} cannot be edited on the {current} step")]
    WrongStep { input: Step, current: Step },

    #[error("An event is already being created")]
    Busy,

    #[error("The wizard is closed")]
    Closed,

    #[error("No submission is in flight")]
    NotSubmitting,
}

#[derive(Debug)]
enum WizardState {
    Editing { step: Step, draft: Draft },
    Submitting { draft: Draft },
    Closed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Advance {
    Moved(Step),
    /// Entered `Submitting`; the caller sends this payload to the store.
    Submit(NewEvent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retreat {
    Moved(Step),
    Cancelled,
}

#[derive(Debug)]
pub enum SubmitOutcome {
    Created(Event),
    Failed(StoreError),
}

/// One field edit, as sent by the form chrome.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum WizardInput {
    Name(String),
    Sport(Sport),
    Description(String),
    Date(NaiveDate),
    Time(NaiveTime),
    Capacity(String),
    IncrementCapacity,
    DecrementCapacity,
}

#[derive(Debug, Clone, Serialize)]
pub struct SportOption {
    pub name: &'static str,
    pub icon: &'static str,
}

/// Read model for rendering the form chrome.
#[derive(Debug, Clone, Serialize)]
pub struct WizardView {
    pub step: Option<Step>,
    pub step_index: Option<u8>,
    pub step_count: u8,
    pub prompt: Option<&'static str>,
    pub submitting: bool,
    pub closed: bool,
    pub error: Option<String>,
    pub draft: Option<Draft>,
    pub location: Coordinates,
    pub sports: Vec<SportOption>,
}

/// Event creation state machine bound to one tap location.
#[derive(Debug)]
pub struct CreationWizard {
    location: Coordinates,
    offset: FixedOffset,
    earliest_date: NaiveDate,
    state: WizardState,
    validation: Option<ValidationError>,
}

impl CreationWizard {
    pub fn open(location: Coordinates, now: DateTime<Utc>, offset: FixedOffset) -> Self {
        let draft = Draft::new(now, offset);
        Self {
            location,
            offset,
            earliest_date: draft.date,
            state: WizardState::Editing {
                step: Step::Name,
                draft,
            },
            validation: None,
        }
    }

    pub fn step(&self) -> Option<Step> {
        match &self.state {
            WizardState::Editing { step, .. } => Some(*step),
            WizardState::Submitting { .. } => Some(Step::Capacity),
            WizardState::Closed => None,
        }
    }

    pub fn draft(&self) -> Option<&Draft> {
        match &self.state {
            WizardState::Editing { draft, .. } | WizardState::Submitting { draft } => Some(draft),
            WizardState::Closed => None,
        }
    }

    pub fn validation(&self) -> Option<&ValidationError> {
        self.validation.as_ref()
    }

    pub fn is_submitting(&self) -> bool {
        matches!(self.state, WizardState::Submitting { .. })
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, WizardState::Closed)
    }

    pub fn next(&mut self) -> Result<Advance, WizardError> {
        let (step, draft) = match &mut self.state {
            WizardState::Editing { step, draft } => (step, draft),
            WizardState::Submitting { .. } => return Err(WizardError::Busy),
            WizardState::Closed => return Err(WizardError::Closed),
        };

        if let Err(e) = draft.validate(*step, self.offset) {
            debug!(step = %step, error = %e, "Wizard step blocked");
            self.validation = Some(e.clone());
            return Err(e.into());
        }
        self.validation = None;

        match step.next() {
            Some(next) => {
                *step = next;
                Ok(Advance::Moved(next))
            }
            None => {
                let payload = match draft.to_payload(self.location, self.offset) {
                    Ok(payload) => payload,
                    Err(e) => {
                        self.validation = Some(e.clone());
                        return Err(e.into());
                    }
                };
                if let WizardState::Editing { draft, .. } =
                    std::mem::replace(&mut self.state, WizardState::Closed)
                {
                    self.state = WizardState::Submitting { draft };
                }
                info!(name = %payload.name, sport = %payload.sport, "Submitting new event");
                Ok(Advance::Submit(payload))
            }
        }
    }

    pub fn previous(&mut self) -> Result<Retreat, WizardError> {
        let step = match &mut self.state {
            WizardState::Editing { step, .. } => step,
            WizardState::Submitting { .. } => return Err(WizardError::Busy),
            WizardState::Closed => return Err(WizardError::Closed),
        };
        self.validation = None;

        match step.previous() {
            Some(previous) => {
                *step = previous;
                Ok(Retreat::Moved(previous))
            }
            None => {
                self.close()?;
                Ok(Retreat::Cancelled)
            }
        }
    }

    /// Discards all field state. Not allowed while a submission is in flight.
    pub fn close(&mut self) -> Result<(), WizardError> {
        if self.is_submitting() {
            return Err(WizardError::Busy);
        }
        if !self.is_closed() {
            debug!("Wizard closed");
        }
        self.state = WizardState::Closed;
        self.validation = None;
        Ok(())
    }

    /// Resolves the in-flight submission. Success closes the flow; failure
    /// returns to the capacity step with every field intact.
    pub fn finish_submission(
        &mut self,
        result: Result<Event, StoreError>,
    ) -> Result<SubmitOutcome, WizardError> {
        let draft = match std::mem::replace(&mut self.state, WizardState::Closed) {
            WizardState::Submitting { draft } => draft,
            other => {
                self.state = other;
                return Err(WizardError::NotSubmitting);
            }
        };

        match result {
            Ok(event) => {
                info!(id = %event.id, "Event created");
                self.validation = None;
                Ok(SubmitOutcome::Created(event))
            }
            Err(e) => {
                self.state = WizardState::Editing {
                    step: Step::Capacity,
                    draft,
                };
                Ok(SubmitOutcome::Failed(e))
            }
        }
    }

    pub fn apply(&mut self, input: WizardInput) -> Result<(), WizardError> {
        match input {
            WizardInput::Name(name) => self.set_name(name),
            WizardInput::Sport(sport) => self.select_sport(sport),
            WizardInput::Description(text) => self.set_description(text),
            WizardInput::Date(date) => self.set_date(date),
            WizardInput::Time(time) => self.set_time(time),
            WizardInput::Capacity(text) => self.set_capacity_text(&text).map(|_| ()),
            WizardInput::IncrementCapacity => self.increment_capacity().map(|_| ()),
            WizardInput::DecrementCapacity => self.decrement_capacity().map(|_| ()),
        }
    }

    pub fn set_name(&mut self, name: impl Into<String>) -> Result<(), WizardError> {
        self.editing(Step::Name)?.name = name.into();
        Ok(())
    }

    pub fn select_sport(&mut self, sport: Sport) -> Result<(), WizardError> {
        self.editing(Step::Sport)?.sport = Some(sport);
        Ok(())
    }

    pub fn set_description(&mut self, text: impl Into<String>) -> Result<(), WizardError> {
        self.editing(Step::Description)?.description = text.into();
        Ok(())
    }

    pub fn set_date(&mut self, date: NaiveDate) -> Result<(), WizardError> {
        let earliest = self.earliest_date;
        let draft = self.editing(Step::Schedule)?;
        if date < earliest {
            let e = ValidationError::DateBeforeToday(earliest);
            self.validation = Some(e.clone());
            return Err(e.into());
        }
        draft.date = date;
        Ok(())
    }

    pub fn set_time(&mut self, time: NaiveTime) -> Result<(), WizardError> {
        self.editing(Step::Schedule)?.set_time(time);
        Ok(())
    }

    pub fn increment_capacity(&mut self) -> Result<u32, WizardError> {
        Ok(self.editing(Step::Capacity)?.increment_capacity())
    }

    pub fn decrement_capacity(&mut self) -> Result<u32, WizardError> {
        Ok(self.editing(Step::Capacity)?.decrement_capacity())
    }

    pub fn set_capacity_text(&mut self, text: &str) -> Result<u32, WizardError> {
        Ok(self.editing(Step::Capacity)?.set_capacity_text(text))
    }

    fn editing(&mut self, input: Step) -> Result<&mut Draft, WizardError> {
        match &mut self.state {
            WizardState::Editing { step, draft } if *step == input => {
                self.validation = None;
                Ok(draft)
            }
            WizardState::Editing { step, .. } => Err(WizardError::WrongStep {
                input,
                current: *step,
            }),
            WizardState::Submitting { .. } => Err(WizardError::Busy),
            WizardState::Closed => Err(WizardError::Closed),
        }
    }

    pub fn view(&self) -> WizardView {
        let step = self.step();
        WizardView {
            step,
            step_index: step.map(Step::index),
            step_count: Step::COUNT,
            prompt: step.map(Step::prompt),
            submitting: self.is_submitting(),
            closed: self.is_closed(),
            error: self.validation.as_ref().map(ToString::to_string),
            draft: self.draft().cloned(),
            location: self.location,
            sports: Sport::ALL
                .iter()
                .map(|sport| SportOption {
                    name: sport.name(),
                    icon: sport.icon(),
                })
                .collect(),
        }
    }

    /// Confirmation text shown once the store accepted the event.
    pub fn created_message(&self, event: &Event) -> String {
        let local = event.datetime.with_timezone(&self.offset);
        format!(
            "New {} event \"{}\" has been created at {}.",
            event.sport,
            event.name,
            local.format("%b %-d, %Y %I:%M %p")
        )
    }
}

/// Guidance for a rejected insert. Permission rejections get specific advice.
pub fn failure_message(error: &StoreError) -> (&'static str, &'static str) {
    if error.is_permission_denied() {
        (
            "Permission Error",
            "The event store rejected the insert. Check the security policies on the events table allow this account to create events.",
        )
    } else {
        ("Error", "Failed to create event. Please try again later.")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 18, 45, 12).unwrap()
    }

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn wizard() -> CreationWizard {
        CreationWizard::open(Coordinates::new(37.0, -122.0), now(), utc())
    }

    fn advance_to(wizard: &mut CreationWizard, target: Step) {
        wizard.set_name("Pickup Hoops").unwrap();
        while wizard.step() != Some(target) {
            if wizard.step() == Some(Step::Sport) {
                wizard.select_sport(Sport::Basketball).unwrap();
            }
            wizard.next().unwrap();
        }
    }

    #[test]
    fn test_empty_name_blocks_first_step() {
        let mut wizard = wizard();
        let err = wizard.next().unwrap_err();
        assert_eq!(err, WizardError::Invalid(ValidationError::MissingName));
        assert_eq!(wizard.step(), Some(Step::Name));
        assert_eq!(wizard.validation(), Some(&ValidationError::MissingName));

        wizard.set_name("   ").unwrap();
        assert!(wizard.next().is_err());

        wizard.set_name("Pickup Hoops").unwrap();
        assert_eq!(wizard.validation(), None);
        assert_eq!(wizard.next().unwrap(), Advance::Moved(Step::Sport));
    }

    #[test]
    fn test_sport_required_on_second_step() {
        let mut wizard = wizard();
        advance_to(&mut wizard, Step::Sport);
        // advance_to selects a sport only when stepping past Sport.
        assert_eq!(
            wizard.next().unwrap_err(),
            WizardError::Invalid(ValidationError::MissingSport)
        );
        wizard.select_sport(Sport::Tennis).unwrap();
        assert_eq!(wizard.next().unwrap(), Advance::Moved(Step::Description));
    }

    #[test]
    fn test_optional_steps_pass_with_defaults() {
        let mut wizard = wizard();
        advance_to(&mut wizard, Step::Description);
        assert_eq!(wizard.next().unwrap(), Advance::Moved(Step::Schedule));
        assert_eq!(wizard.next().unwrap(), Advance::Moved(Step::Capacity));
        assert_eq!(wizard.draft().unwrap().capacity, 4);
    }

    #[test]
    fn test_previous_from_first_step_cancels_and_clears() {
        let mut wizard = wizard();
        advance_to(&mut wizard, Step::Capacity);
        wizard.increment_capacity().unwrap();
        while wizard.step() != Some(Step::Name) {
            wizard.previous().unwrap();
        }

        assert_eq!(wizard.previous().unwrap(), Retreat::Cancelled);
        assert!(wizard.is_closed());
        assert!(wizard.draft().is_none());
        assert_eq!(wizard.next().unwrap_err(), WizardError::Closed);
        assert_eq!(wizard.step(), None);
    }

    #[test]
    fn test_backward_navigation_keeps_fields() {
        let mut wizard = wizard();
        advance_to(&mut wizard, Step::Description);
        wizard.set_description("Bring a ball").unwrap();
        assert_eq!(wizard.previous().unwrap(), Retreat::Moved(Step::Sport));
        assert_eq!(wizard.previous().unwrap(), Retreat::Moved(Step::Name));

        let draft = wizard.draft().unwrap();
        assert_eq!(draft.name, "Pickup Hoops");
        assert_eq!(draft.sport, Some(Sport::Basketball));
        assert_eq!(draft.description, "Bring a ball");
    }

    #[test]
    fn test_inputs_only_accepted_on_their_step() {
        let mut wizard = wizard();
        assert_eq!(
            wizard.select_sport(Sport::Golf).unwrap_err(),
            WizardError::WrongStep {
                input: Step::Sport,
                current: Step::Name
            }
        );
        assert!(wizard.increment_capacity().is_err());
    }

    #[test]
    fn test_capacity_controls() {
        let mut wizard = wizard();
        advance_to(&mut wizard, Step::Capacity);

        assert_eq!(wizard.increment_capacity().unwrap(), 5);
        assert_eq!(wizard.set_capacity_text("1").unwrap(), 1);
        assert_eq!(wizard.decrement_capacity().unwrap(), 1);
        assert_eq!(wizard.set_capacity_text("").unwrap(), 1);
        assert_eq!(wizard.set_capacity_text("12x3").unwrap(), 12);
        assert_eq!(wizard.set_capacity_text("0").unwrap(), 1);
        assert_eq!(wizard.increment_capacity().unwrap(), 2);
    }

    #[test]
    fn test_date_cannot_precede_opening_day() {
        let mut wizard = wizard();
        advance_to(&mut wizard, Step::Schedule);

        let yesterday = NaiveDate::from_ymd_opt(2026, 10, 17).unwrap();
        assert!(matches!(
            wizard.set_date(yesterday).unwrap_err(),
            WizardError::Invalid(ValidationError::DateBeforeToday(_))
        ));

        let next_week = NaiveDate::from_ymd_opt(2026, 10, 25).unwrap();
        wizard.set_date(next_week).unwrap();
        assert_eq!(wizard.draft().unwrap().date, next_week);
        assert_eq!(wizard.validation(), None);
    }

    #[test]
    fn test_unrepresentable_date_blocks_schedule_step() {
        let west = FixedOffset::west_opt(7 * 3600).unwrap();
        let mut wizard = CreationWizard::open(Coordinates::new(37.0, -122.0), now(), west);
        advance_to(&mut wizard, Step::Schedule);

        wizard.set_date(NaiveDate::MAX).unwrap();
        wizard
            .set_time(NaiveTime::from_hms_opt(23, 0, 0).unwrap())
            .unwrap();
        assert_eq!(
            wizard.next().unwrap_err(),
            WizardError::Invalid(ValidationError::DateOutOfRange(NaiveDate::MAX))
        );
        assert_eq!(wizard.step(), Some(Step::Schedule));
        assert!(wizard.validation().is_some());

        wizard
            .set_date(NaiveDate::from_ymd_opt(2026, 11, 1).unwrap())
            .unwrap();
        assert_eq!(wizard.next().unwrap(), Advance::Moved(Step::Capacity));
    }

    #[test]
    fn test_past_time_today_is_allowed() {
        let mut wizard = wizard();
        advance_to(&mut wizard, Step::Schedule);
        wizard
            .set_time(NaiveTime::from_hms_opt(6, 0, 0).unwrap())
            .unwrap();
        wizard.next().unwrap();

        let Advance::Submit(payload) = wizard.next().unwrap() else {
            panic!("expected submission");
        };
        assert!(payload.datetime < now());
    }

    #[test]
    fn test_submission_payload_and_busy_state() {
        let mut wizard = wizard();
        advance_to(&mut wizard, Step::Capacity);
        wizard.set_capacity_text("6").unwrap();

        let Advance::Submit(payload) = wizard.next().unwrap() else {
            panic!("expected submission");
        };
        assert_eq!(payload.name, "Pickup Hoops");
        assert_eq!(payload.sport, Sport::Basketball);
        assert_eq!(payload.max_players, 6);
        assert_eq!(payload.latitude, 37.0);
        assert_eq!(payload.longitude, -122.0);
        assert_eq!(payload.datetime.second(), 0);
        assert_eq!(payload.datetime.minute(), 45);

        assert!(wizard.is_submitting());
        assert_eq!(wizard.next().unwrap_err(), WizardError::Busy);
        assert_eq!(wizard.previous().unwrap_err(), WizardError::Busy);
        assert_eq!(wizard.close().unwrap_err(), WizardError::Busy);
        assert_eq!(
            wizard.apply(WizardInput::IncrementCapacity).unwrap_err(),
            WizardError::Busy
        );
    }

    #[test]
    fn test_failed_submission_returns_to_capacity() {
        let mut wizard = wizard();
        advance_to(&mut wizard, Step::Capacity);
        wizard.next().unwrap();

        let outcome = wizard
            .finish_submission(Err(StoreError::PermissionDenied("rls".to_string())))
            .unwrap();
        let SubmitOutcome::Failed(err) = outcome else {
            panic!("expected failure");
        };
        assert_eq!(failure_message(&err).0, "Permission Error");
        assert_eq!(wizard.step(), Some(Step::Capacity));
        assert_eq!(wizard.draft().unwrap().name, "Pickup Hoops");
        assert!(matches!(wizard.next().unwrap(), Advance::Submit(_)));
    }

    #[test]
    fn test_successful_submission_closes() {
        let mut wizard = wizard();
        advance_to(&mut wizard, Step::Capacity);
        let Advance::Submit(payload) = wizard.next().unwrap() else {
            panic!("expected submission");
        };

        let event = payload.into_event(crate::models::EventId::new("abc"), now());
        let SubmitOutcome::Created(created) = wizard.finish_submission(Ok(event)).unwrap() else {
            panic!("expected success");
        };
        assert!(wizard.is_closed());
        assert_eq!(
            wizard.created_message(&created),
            "New Basketball event \"Pickup Hoops\" has been created at Oct 18, 2026 06:45 PM."
        );
        assert_eq!(
            wizard.finish_submission(Err(StoreError::Rejected("late".to_string())))
                .unwrap_err(),
            WizardError::NotSubmitting
        );
    }

    #[test]
    fn test_input_deserializes_from_form_payload() {
        let input: WizardInput =
            serde_json::from_value(serde_json::json!({"field": "sport", "value": "Soccer"}))
                .unwrap();
        assert_eq!(input, WizardInput::Sport(Sport::Soccer));

        let input: WizardInput =
            serde_json::from_value(serde_json::json!({"field": "increment_capacity"})).unwrap();
        assert_eq!(input, WizardInput::IncrementCapacity);
    }
}
