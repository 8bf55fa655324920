//! Event Log
//!
//! Durable ordered transport between the write path and the downstream
//! consumers (store ingest, projections). Envelopes are appended to a
//! single table whose serial offset preserves publish order, so delivery
//! for one aggregate is always in version order. Each consumer group owns
//! one committed position; delivery is at-least-once and consumers must be
//! idempotent on (aggregate_id, version).

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::domain::UserEvent;

/// Topic events are published to unless configured otherwise.
pub const DEFAULT_TOPIC: &str = "user-events";

const FETCH_BATCH: i64 = 64;
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Errors raised by the transport.
#[derive(Debug, thiserror::Error)]
pub enum EventLogError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A single message read from the log.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub offset: i64,
    pub partition_key: Uuid,
    pub payload: serde_json::Value,
}

/// Producer handle. Cheap to clone; all clones share the wakeup channel
/// that nudges in-process consumers after an append.
#[derive(Clone)]
pub struct EventLog {
    pool: PgPool,
    notify: Arc<Notify>,
}

impl EventLog {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            notify: Arc::new(Notify::new()),
        }
    }

    /// Durable append of one event envelope. Returns once the log has
    /// accepted the entry.
    pub async fn publish(&self, topic: &str, event: &UserEvent) -> Result<i64, EventLogError> {
        let payload = serde_json::to_value(event)?;
        let offset: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO event_log (topic, partition_key, payload)
            VALUES ($1, $2, $3)
            RETURNING log_offset
            "#,
        )
        .bind(topic)
        .bind(event.aggregate_id())
        .bind(&payload)
        .fetch_one(&self.pool)
        .await?;

        self.notify.notify_waiters();
        Ok(offset)
    }

    /// Append the events of one command in a single transaction. A partial
    /// append is never visible: either every event lands or none does.
    pub async fn publish_batch(
        &self,
        topic: &str,
        events: &[UserEvent],
    ) -> Result<(), EventLogError> {
        if events.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for event in events {
            let payload = serde_json::to_value(event)?;
            sqlx::query(
                r#"
                INSERT INTO event_log (topic, partition_key, payload)
                VALUES ($1, $2, $3)
                "#,
            )
            .bind(topic)
            .bind(event.aggregate_id())
            .bind(&payload)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        self.notify.notify_waiters();
        Ok(())
    }

    /// Open a consumer for `group`. Delivery resumes after the group's last
    /// committed offset.
    pub fn subscribe(&self, topic: &str, group: &str) -> LogConsumer {
        LogConsumer {
            pool: self.pool.clone(),
            notify: self.notify.clone(),
            topic: topic.to_string(),
            group: group.to_string(),
            position: None,
            buffer: VecDeque::new(),
        }
    }
}

/// Single owner of a consumer group's position. `recv` blocks until an
/// entry is available; `commit` advances the durable position, so entries
/// delivered but not committed are seen again after a restart.
pub struct LogConsumer {
    pool: PgPool,
    notify: Arc<Notify>,
    topic: String,
    group: String,
    /// Offset of the last delivered entry; `None` until the committed
    /// position has been loaded.
    position: Option<i64>,
    buffer: VecDeque<LogEntry>,
}

impl LogConsumer {
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Block until the next entry is available.
    pub async fn recv(&mut self) -> Result<LogEntry, EventLogError> {
        loop {
            if let Some(entry) = self.buffer.pop_front() {
                self.position = Some(entry.offset);
                return Ok(entry);
            }

            let position = self.load_position().await?;
            let rows: Vec<(i64, Uuid, serde_json::Value)> = sqlx::query_as(
                r#"
                SELECT log_offset, partition_key, payload
                FROM event_log
                WHERE topic = $1 AND log_offset > $2
                ORDER BY log_offset ASC
                LIMIT $3
                "#,
            )
            .bind(&self.topic)
            .bind(position)
            .bind(FETCH_BATCH)
            .fetch_all(&self.pool)
            .await?;

            if rows.is_empty() {
                // Wait for a publish wakeup; the poll interval covers
                // producers in other processes.
                let notified = self.notify.notified();
                tokio::select! {
                    _ = notified => {}
                    _ = tokio::time::sleep(POLL_INTERVAL) => {}
                }
                continue;
            }

            self.buffer
                .extend(rows.into_iter().map(|(offset, partition_key, payload)| LogEntry {
                    offset,
                    partition_key,
                    payload,
                }));
        }
    }

    /// Record `offset` as processed for this group.
    pub async fn commit(&mut self, offset: i64) -> Result<(), EventLogError> {
        sqlx::query(
            r#"
            UPDATE log_offsets
            SET committed_offset = $3, updated_at = NOW()
            WHERE topic = $1 AND group_name = $2 AND committed_offset < $3
            "#,
        )
        .bind(&self.topic)
        .bind(&self.group)
        .bind(offset)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_position(&mut self) -> Result<i64, EventLogError> {
        if let Some(position) = self.position {
            return Ok(position);
        }

        // The no-op update makes RETURNING yield the existing row when the
        // group is already registered.
        let committed: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO log_offsets (topic, group_name, committed_offset)
            VALUES ($1, $2, 0)
            ON CONFLICT (topic, group_name)
            DO UPDATE SET group_name = EXCLUDED.group_name
            RETURNING committed_offset
            "#,
        )
        .bind(&self.topic)
        .bind(&self.group)
        .fetch_one(&self.pool)
        .await?;

        self.position = Some(committed);
        Ok(committed)
    }
}
