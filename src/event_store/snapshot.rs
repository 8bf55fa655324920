//! Snapshot Store
//!
//! Serialized aggregate state at a version, used to bound replay cost.
//! A snapshot is a cache: it can always be dropped or ignored in favor of
//! a full replay.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use super::EventStoreError;

/// A stored snapshot row.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Snapshot {
    pub id: Uuid,
    pub aggregate_id: Uuid,
    pub version: i64,
    pub state: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// When to cut a snapshot for an aggregate.
#[derive(Debug, Clone, Copy)]
pub struct SnapshotPolicy {
    /// First snapshot once the stream reaches this many events.
    pub first_after: i64,
    /// Then one snapshot every this many events.
    pub interval: i64,
}

impl Default for SnapshotPolicy {
    fn default() -> Self {
        Self {
            first_after: 10,
            interval: 50,
        }
    }
}

impl SnapshotPolicy {
    pub fn should_snapshot(&self, latest_version: i64, last_snapshot: Option<i64>) -> bool {
        match last_snapshot {
            None => latest_version >= self.first_after,
            Some(version) => latest_version - version >= self.interval,
        }
    }
}

/// Snapshot persistence keyed by (aggregate_id, version).
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    pool: PgPool,
}

impl SnapshotStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Save a snapshot. Re-saving the same (aggregate_id, version) replaces
    /// the state; the newest `created_at` wins.
    pub async fn save(
        &self,
        aggregate_id: Uuid,
        version: i64,
        state: serde_json::Value,
    ) -> Result<Snapshot, EventStoreError> {
        let snapshot = sqlx::query_as::<_, Snapshot>(
            r#"
            INSERT INTO snapshots (id, aggregate_id, version, state)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (aggregate_id, version)
            DO UPDATE SET state = EXCLUDED.state, created_at = NOW()
            RETURNING id, aggregate_id, version, state, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(aggregate_id)
        .bind(version)
        .bind(&state)
        .fetch_one(&self.pool)
        .await?;

        Ok(snapshot)
    }

    /// Most recent snapshot for an aggregate.
    pub async fn latest(&self, aggregate_id: Uuid) -> Result<Option<Snapshot>, EventStoreError> {
        let snapshot = sqlx::query_as::<_, Snapshot>(
            r#"
            SELECT id, aggregate_id, version, state, created_at
            FROM snapshots
            WHERE aggregate_id = $1
            ORDER BY version DESC
            LIMIT 1
            "#,
        )
        .bind(aggregate_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(snapshot)
    }

    /// Snapshot with the largest version `<= version`.
    pub async fn at_version(
        &self,
        aggregate_id: Uuid,
        version: i64,
    ) -> Result<Option<Snapshot>, EventStoreError> {
        let snapshot = sqlx::query_as::<_, Snapshot>(
            r#"
            SELECT id, aggregate_id, version, state, created_at
            FROM snapshots
            WHERE aggregate_id = $1 AND version <= $2
            ORDER BY version DESC
            LIMIT 1
            "#,
        )
        .bind(aggregate_id)
        .bind(version)
        .fetch_optional(&self.pool)
        .await?;

        Ok(snapshot)
    }

    /// Whether any snapshot exists for an aggregate.
    pub async fn has(&self, aggregate_id: Uuid) -> Result<bool, EventStoreError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM snapshots WHERE aggregate_id = $1)")
                .bind(aggregate_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(exists)
    }

    /// Delete all but the `keep_last_n` most recent snapshots.
    pub async fn prune(&self, aggregate_id: Uuid, keep_last_n: i64) -> Result<u64, EventStoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM snapshots
            WHERE aggregate_id = $1 AND version NOT IN (
                SELECT version FROM snapshots
                WHERE aggregate_id = $1
                ORDER BY version DESC
                LIMIT $2
            )
            "#,
        )
        .bind(aggregate_id)
        .bind(keep_last_n)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_snapshot_threshold() {
        let policy = SnapshotPolicy::default();
        assert!(!policy.should_snapshot(9, None));
        assert!(policy.should_snapshot(10, None));
        assert!(policy.should_snapshot(75, None));
    }

    #[test]
    fn test_interval_after_first_snapshot() {
        let policy = SnapshotPolicy::default();
        assert!(!policy.should_snapshot(59, Some(10)));
        assert!(policy.should_snapshot(60, Some(10)));
        assert!(!policy.should_snapshot(61, Some(60)));
    }

    #[test]
    fn test_configured_thresholds() {
        let policy = SnapshotPolicy {
            first_after: 2,
            interval: 5,
        };
        assert!(policy.should_snapshot(2, None));
        assert!(!policy.should_snapshot(6, Some(2)));
        assert!(policy.should_snapshot(7, Some(2)));
    }
}
