//! Event Store Repository
//!
//! Append-only event persistence with per-aggregate monotonic versioning.
//! Within one aggregate the version order is authoritative; timestamp
//! ordering (with version and id tie-breaks) serves the time-range scans.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use uuid::Uuid;

use crate::domain::RawEnvelope;

use super::EventStoreError;

/// Default page size for filter queries.
pub const DEFAULT_FILTER_LIMIT: i64 = 100;
/// Hard cap on filter queries; larger requests are clamped.
pub const MAX_FILTER_LIMIT: i64 = 10_000;

/// Persisted event row.
#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct StoredEvent {
    pub id: Uuid,
    pub event_type: String,
    pub aggregate_id: Uuid,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub version: i64,
}

/// An event handed to the store for persistence. `version` and `timestamp`
/// may be unset; the store derives them on append.
#[derive(Debug, Clone)]
pub struct PendingEvent {
    pub event_type: String,
    pub aggregate_id: Uuid,
    pub payload: serde_json::Value,
    pub timestamp: Option<DateTime<Utc>>,
    pub version: Option<i64>,
}

impl PendingEvent {
    /// Build a pending event from a log envelope, keeping the full `data`
    /// object as the stored payload.
    pub fn from_envelope(envelope: &RawEnvelope) -> Result<Self, EventStoreError> {
        let meta = envelope.meta()?;
        Ok(Self {
            event_type: envelope.event_type.clone(),
            aggregate_id: meta.aggregate_id,
            payload: envelope.data.clone(),
            timestamp: Some(meta.timestamp),
            version: Some(meta.version),
        })
    }
}

/// Filter for time-ordered event queries.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub event_type: Option<String>,
    pub aggregate_id: Option<Uuid>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

const SELECT_COLUMNS: &str = "id, event_type, aggregate_id, payload, timestamp, version";

/// Event Store for persisting and retrieving events
#[derive(Debug, Clone)]
pub struct EventStore {
    pool: PgPool,
}

impl EventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Append one event. A preset version must be exactly `latest + 1`;
    /// without one the store assigns the next version itself.
    pub async fn save(&self, event: PendingEvent) -> Result<StoredEvent, EventStoreError> {
        let mut tx = self.pool.begin().await?;
        let stored = Self::append_in_tx(&mut tx, event).await?;
        tx.commit().await?;
        Ok(stored)
    }

    /// Append several events in one transaction; the same versioning
    /// invariant holds for each, and a rejection rolls back the batch.
    pub async fn save_batch(
        &self,
        events: Vec<PendingEvent>,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let mut tx = self.pool.begin().await?;
        let mut stored = Vec::with_capacity(events.len());
        for event in events {
            stored.push(Self::append_in_tx(&mut tx, event).await?);
        }
        tx.commit().await?;
        Ok(stored)
    }

    async fn append_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        event: PendingEvent,
    ) -> Result<StoredEvent, EventStoreError> {
        let current: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM events WHERE aggregate_id = $1")
                .bind(event.aggregate_id)
                .fetch_optional(&mut **tx)
                .await?
                .flatten();
        let current = current.unwrap_or(0);

        let version = match event.version {
            Some(v) if v != current + 1 => {
                return Err(EventStoreError::VersionConflict {
                    aggregate_id: event.aggregate_id,
                    expected: current + 1,
                    actual: v,
                });
            }
            Some(v) => v,
            None => current + 1,
        };

        let stored = StoredEvent {
            id: Uuid::new_v4(),
            event_type: event.event_type,
            aggregate_id: event.aggregate_id,
            payload: event.payload,
            timestamp: event.timestamp.unwrap_or_else(Utc::now),
            version,
        };

        sqlx::query(
            r#"
            INSERT INTO events (id, event_type, aggregate_id, payload, timestamp, version)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(stored.id)
        .bind(&stored.event_type)
        .bind(stored.aggregate_id)
        .bind(&stored.payload)
        .bind(stored.timestamp)
        .bind(stored.version)
        .execute(&mut **tx)
        .await?;

        Ok(stored)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Events of one aggregate with `version >= from_version`, ascending.
    pub async fn by_aggregate(
        &self,
        aggregate_id: Uuid,
        from_version: i64,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let events = sqlx::query_as::<_, StoredEvent>(
            r#"
            SELECT id, event_type, aggregate_id, payload, timestamp, version
            FROM events
            WHERE aggregate_id = $1 AND version >= $2
            ORDER BY version ASC
            "#,
        )
        .bind(aggregate_id)
        .bind(from_version)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    /// Events of one aggregate with `version > after`, ascending. Used to
    /// complete a snapshot into current state.
    pub async fn after_version(
        &self,
        aggregate_id: Uuid,
        after: i64,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let events = sqlx::query_as::<_, StoredEvent>(
            r#"
            SELECT id, event_type, aggregate_id, payload, timestamp, version
            FROM events
            WHERE aggregate_id = $1 AND version > $2
            ORDER BY version ASC
            "#,
        )
        .bind(aggregate_id)
        .bind(after)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    /// Time-ordered scan with optional filters. Ties on timestamp break on
    /// version, then id.
    pub async fn by_filter(&self, filter: &EventFilter) -> Result<Vec<StoredEvent>, EventStoreError> {
        let limit = filter
            .limit
            .unwrap_or(DEFAULT_FILTER_LIMIT)
            .clamp(1, MAX_FILTER_LIMIT);

        let mut query: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {} FROM events WHERE TRUE",
            SELECT_COLUMNS
        ));
        if let Some(event_type) = &filter.event_type {
            query.push(" AND event_type = ").push_bind(event_type.clone());
        }
        if let Some(aggregate_id) = filter.aggregate_id {
            query.push(" AND aggregate_id = ").push_bind(aggregate_id);
        }
        if let Some(start_time) = filter.start_time {
            query.push(" AND timestamp >= ").push_bind(start_time);
        }
        if let Some(end_time) = filter.end_time {
            query.push(" AND timestamp <= ").push_bind(end_time);
        }
        query.push(" ORDER BY timestamp ASC, version ASC, id ASC");
        query.push(" LIMIT ").push_bind(limit);
        if let Some(offset) = filter.offset {
            query.push(" OFFSET ").push_bind(offset);
        }

        let events = query
            .build_query_as::<StoredEvent>()
            .fetch_all(&self.pool)
            .await?;

        Ok(events)
    }

    /// All events with `timestamp >= since`, time-ordered.
    pub async fn since(&self, since: DateTime<Utc>) -> Result<Vec<StoredEvent>, EventStoreError> {
        let events = sqlx::query_as::<_, StoredEvent>(
            r#"
            SELECT id, event_type, aggregate_id, payload, timestamp, version
            FROM events
            WHERE timestamp >= $1
            ORDER BY timestamp ASC, version ASC, id ASC
            LIMIT $2
            "#,
        )
        .bind(since)
        .bind(MAX_FILTER_LIMIT)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    /// Latest stored version for an aggregate; 0 when it has no events.
    pub async fn latest_version(&self, aggregate_id: Uuid) -> Result<i64, EventStoreError> {
        let version: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM events WHERE aggregate_id = $1")
                .bind(aggregate_id)
                .fetch_optional(&self.pool)
                .await?
                .flatten();

        Ok(version.unwrap_or(0))
    }

    /// Total number of stored events.
    pub async fn count(&self) -> Result<i64, EventStoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM events")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}
