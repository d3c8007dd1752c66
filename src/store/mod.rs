use std::future::Future;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::models::{Event, NewEvent};

pub mod memory;
pub mod postgres;

pub use memory::MemoryEventStore;
pub use postgres::PgEventStore;

/// The only resource served. Names both the `events` table and its
/// `events_changes` notification channel.
pub const EVENTS_RESOURCE: &str = "events";

/// SQLSTATE for `insufficient_privilege`, raised by row-level security policies.
pub const PERMISSION_DENIED_CODE: &str = "42501";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error")]
    Database(#[from] sqlx::Error),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Store rejected the request: {0}")]
    Rejected(String),

    #[error("Malformed row: {0}")]
    MalformedRow(String),

    #[error("Subscription failed: {0}")]
    Subscription(String),
}

impl StoreError {
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, StoreError::PermissionDenied(_))
    }

    /// Maps database errors carrying the permission SQLSTATE to `PermissionDenied`.
    pub fn from_database(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.code().as_deref() == Some(PERMISSION_DENIED_CODE) {
                return StoreError::PermissionDenied(db.message().to_string());
            }
        }
        StoreError::Database(err)
    }
}

/// What kind of row change the feed reported. Only logged; the session
/// always re-fetches the full set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
    Unknown,
}

impl ChangeKind {
    pub fn from_operation(op: &str) -> Self {
        match op.trim().to_ascii_uppercase().as_str() {
            "INSERT" => ChangeKind::Insert,
            "UPDATE" => ChangeKind::Update,
            "DELETE" => ChangeKind::Delete,
            _ => ChangeKind::Unknown,
        }
    }
}

/// Live subscription to a resource's change feed.
///
/// Owns the receiving half and, for stores that pump notifications from a
/// background task, that task. Dropping the subscription unsubscribes.
#[derive(Debug)]
pub struct FeedSubscription {
    resource: String,
    changes: mpsc::UnboundedReceiver<ChangeKind>,
    pump: Option<JoinHandle<()>>,
}

impl FeedSubscription {
    pub fn new(resource: impl Into<String>, changes: mpsc::UnboundedReceiver<ChangeKind>) -> Self {
        Self {
            resource: resource.into(),
            changes,
            pump: None,
        }
    }

    pub fn with_pump(mut self, pump: JoinHandle<()>) -> Self {
        self.pump = Some(pump);
        self
    }

    /// Next change notification, or `None` once the feed has closed.
    pub async fn recv(&mut self) -> Option<ChangeKind> {
        self.changes.recv().await
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        self.changes.close();
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        tracing::debug!(resource = %self.resource, "Feed subscription released");
    }
}

/// The persistent entity store and change feed the sync engine reconciles against.
pub trait EventStore: Send + Sync + 'static {
    fn query_all_events(&self) -> impl Future<Output = Result<Vec<Event>, StoreError>> + Send;

    fn insert_event(
        &self,
        payload: NewEvent,
    ) -> impl Future<Output = Result<Event, StoreError>> + Send;

    fn subscribe_to_event_changes(
        &self,
        resource: &str,
    ) -> impl Future<Output = Result<FeedSubscription, StoreError>> + Send;
}

/// Store selected at startup from configuration.
#[derive(Clone)]
pub enum Backend {
    Postgres(PgEventStore),
    Memory(MemoryEventStore),
}

impl EventStore for Backend {
    async fn query_all_events(&self) -> Result<Vec<Event>, StoreError> {
        match self {
            Backend::Postgres(store) => store.query_all_events().await,
            Backend::Memory(store) => store.query_all_events().await,
        }
    }

    async fn insert_event(&self, payload: NewEvent) -> Result<Event, StoreError> {
        match self {
            Backend::Postgres(store) => store.insert_event(payload).await,
            Backend::Memory(store) => store.insert_event(payload).await,
        }
    }

    async fn subscribe_to_event_changes(
        &self,
        resource: &str,
    ) -> Result<FeedSubscription, StoreError> {
        match self {
            Backend::Postgres(store) => store.subscribe_to_event_changes(resource).await,
            Backend::Memory(store) => store.subscribe_to_event_changes(resource).await,
        }
    }
}

/// Refuses feeds for anything but [`EVENTS_RESOURCE`], so a misnamed
/// resource fails loudly instead of listening on a silent channel.
pub(crate) fn check_resource(resource: &str) -> Result<(), StoreError> {
    if resource == EVENTS_RESOURCE {
        Ok(())
    } else {
        Err(StoreError::Subscription(format!(
            "no change feed for resource '{}'",
            resource
        )))
    }
}
