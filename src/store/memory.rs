use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::{check_resource, ChangeKind, EventStore, FeedSubscription, StoreError};
use crate::models::{Event, EventId, NewEvent};

/// In-process event store with a change feed.
///
/// Used when no database is configured and as the backend in tests. Failures
/// can be queued per operation to exercise recovery paths.
#[derive(Clone, Default)]
pub struct MemoryEventStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    rows: Vec<Event>,
    subscribers: Vec<mpsc::UnboundedSender<ChangeKind>>,
    query_failures: VecDeque<StoreError>,
    insert_failures: VecDeque<StoreError>,
    subscribe_failure: Option<StoreError>,
    queries: usize,
    inserts: usize,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events(events: impl IntoIterator<Item = Event>) -> Self {
        let store = Self::new();
        store.lock().rows.extend(events);
        store
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock leaves the rows intact.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn fail_next_query(&self, err: StoreError) {
        self.lock().query_failures.push_back(err);
    }

    pub fn fail_next_insert(&self, err: StoreError) {
        self.lock().insert_failures.push_back(err);
    }

    pub fn fail_next_subscription(&self, err: StoreError) {
        self.lock().subscribe_failure = Some(err);
    }

    /// Writes a row as another client would, notifying every subscriber.
    pub fn insert_external(&self, event: Event) {
        let mut inner = self.lock();
        inner.rows.retain(|row| row.id != event.id);
        inner.rows.push(event);
        inner.notify(ChangeKind::Insert);
    }

    pub fn delete(&self, id: &EventId) -> bool {
        let mut inner = self.lock();
        let before = inner.rows.len();
        inner.rows.retain(|row| &row.id != id);
        let removed = inner.rows.len() != before;
        if removed {
            inner.notify(ChangeKind::Delete);
        }
        removed
    }

    pub fn rows(&self) -> Vec<Event> {
        self.lock().rows.clone()
    }

    pub fn query_count(&self) -> usize {
        self.lock().queries
    }

    pub fn insert_count(&self) -> usize {
        self.lock().inserts
    }

    pub fn active_subscribers(&self) -> usize {
        let mut inner = self.lock();
        inner.subscribers.retain(|tx| !tx.is_closed());
        inner.subscribers.len()
    }
}

impl Inner {
    fn notify(&mut self, kind: ChangeKind) {
        self.subscribers.retain(|tx| tx.send(kind).is_ok());
    }
}

impl EventStore for MemoryEventStore {
    async fn query_all_events(&self) -> Result<Vec<Event>, StoreError> {
        let mut inner = self.lock();
        inner.queries += 1;
        if let Some(err) = inner.query_failures.pop_front() {
            return Err(err);
        }
        Ok(inner.rows.clone())
    }

    async fn insert_event(&self, payload: NewEvent) -> Result<Event, StoreError> {
        let mut inner = self.lock();
        inner.inserts += 1;
        if let Some(err) = inner.insert_failures.pop_front() {
            return Err(err);
        }
        if payload.name.trim().is_empty() {
            return Err(StoreError::Rejected("name must not be empty".to_string()));
        }
        if payload.max_players < 1 {
            return Err(StoreError::Rejected(
                "max_players must be at least 1".to_string(),
            ));
        }

        let event = payload.into_event(EventId::from(Uuid::new_v4()), Utc::now());
        inner.rows.push(event.clone());
        inner.notify(ChangeKind::Insert);
        Ok(event)
    }

    async fn subscribe_to_event_changes(
        &self,
        resource: &str,
    ) -> Result<FeedSubscription, StoreError> {
        check_resource(resource)?;
        let mut inner = self.lock();
        if let Some(err) = inner.subscribe_failure.take() {
            return Err(err);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        inner.subscribers.push(tx);
        Ok(FeedSubscription::new(resource, rx))
    }
}
