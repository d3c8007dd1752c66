use chrono::{DateTime, Utc};
use sqlx::postgres::{PgListener, PgPool};
use sqlx::FromRow;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{check_resource, ChangeKind, EventStore, FeedSubscription, StoreError};
use crate::models::{Event, EventId, NewEvent, Sport};

const EVENT_COLUMNS: &str =
    "id::text AS id, name, sport, description, datetime, max_players, latitude, longitude, created_at";

/// Postgres-backed event store. The change feed is a `LISTEN` on the
/// `events_changes` channel, fed by the trigger in `migrations/`.
#[derive(Clone)]
pub struct PgEventStore {
    pool: PgPool,
}

#[derive(Debug, FromRow)]
struct EventRow {
    id: String,
    name: String,
    sport: String,
    description: Option<String>,
    datetime: DateTime<Utc>,
    max_players: i32,
    latitude: f64,
    longitude: f64,
    created_at: DateTime<Utc>,
}

impl TryFrom<EventRow> for Event {
    type Error = StoreError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let sport: Sport = row
            .sport
            .parse()
            .map_err(|e| StoreError::MalformedRow(format!("event {}: {}", row.id, e)))?;
        let max_players = u32::try_from(row.max_players).map_err(|_| {
            StoreError::MalformedRow(format!(
                "event {}: negative max_players {}",
                row.id, row.max_players
            ))
        })?;

        Ok(Event {
            id: EventId::new(row.id),
            name: row.name,
            sport,
            description: row.description.unwrap_or_default(),
            datetime: row.datetime,
            max_players,
            latitude: row.latitude,
            longitude: row.longitude,
            created_at: row.created_at,
        })
    }
}

pub fn channel_for(resource: &str) -> String {
    format!("{}_changes", resource)
}

impl PgEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl EventStore for PgEventStore {
    async fn query_all_events(&self) -> Result<Vec<Event>, StoreError> {
        let sql = format!("SELECT {} FROM events", EVENT_COLUMNS);
        let rows: Vec<EventRow> = sqlx::query_as::<_, EventRow>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from_database)?;

        debug!(rows = rows.len(), "Fetched events");
        rows.into_iter().map(Event::try_from).collect()
    }

    async fn insert_event(&self, payload: NewEvent) -> Result<Event, StoreError> {
        let max_players = i32::try_from(payload.max_players).map_err(|_| {
            StoreError::Rejected(format!("max_players {} out of range", payload.max_players))
        })?;

        let sql = format!(
            "INSERT INTO events (name, sport, description, datetime, max_players, latitude, longitude) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {}",
            EVENT_COLUMNS
        );
        let row: EventRow = sqlx::query_as::<_, EventRow>(&sql)
            .bind(&payload.name)
            .bind(payload.sport.name())
            .bind(&payload.description)
            .bind(payload.datetime)
            .bind(max_players)
            .bind(payload.latitude)
            .bind(payload.longitude)
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::from_database)?;

        info!(id = %row.id, "Inserted event");
        Event::try_from(row)
    }

    async fn subscribe_to_event_changes(
        &self,
        resource: &str,
    ) -> Result<FeedSubscription, StoreError> {
        check_resource(resource)?;
        let channel = channel_for(resource);
        let mut listener = PgListener::connect_with(&self.pool)
            .await
            .map_err(|e| StoreError::Subscription(e.to_string()))?;
        listener
            .listen(&channel)
            .await
            .map_err(|e| StoreError::Subscription(e.to_string()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let pump_channel = channel.clone();
        let pump = tokio::spawn(async move {
            loop {
                match listener.recv().await {
                    Ok(notification) => {
                        let kind = ChangeKind::from_operation(notification.payload());
                        if tx.send(kind).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(channel = %pump_channel, error = ?e, "Change feed closed");
                        break;
                    }
                }
            }
        });

        info!(%channel, "Listening for event changes");
        Ok(FeedSubscription::new(resource, rx).with_pump(pump))
    }
}
