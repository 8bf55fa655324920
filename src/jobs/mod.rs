//! Scheduled Jobs
//!
//! Background maintenance: compacting consumed log entries and trimming
//! snapshot history. Both are safe to run at any time; neither touches
//! the events table.

use std::time::Duration;

use sqlx::PgPool;
use tokio::time::interval;

use crate::config::Config;

const JOB_INTERVAL: Duration = Duration::from_secs(600);

/// Job errors
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Delete log entries every consumer group has committed past and that are
/// older than the retention window.
pub async fn compact_event_log(pool: &PgPool, retention_hours: i64) -> Result<u64, JobError> {
    let result = sqlx::query(
        r#"
        DELETE FROM event_log
        WHERE log_offset <= (SELECT COALESCE(MIN(committed_offset), 0) FROM log_offsets)
          AND published_at < NOW() - make_interval(hours => $1::int)
        "#,
    )
    .bind(retention_hours)
    .execute(pool)
    .await?;

    let rows_deleted = result.rows_affected();
    if rows_deleted > 0 {
        tracing::info!(rows_deleted, "compacted consumed event log entries");
    }

    Ok(rows_deleted)
}

/// Trim snapshot history, keeping the `keep_last` most recent per
/// aggregate.
pub async fn prune_snapshots(pool: &PgPool, keep_last: i64) -> Result<u64, JobError> {
    let result = sqlx::query(
        r#"
        DELETE FROM snapshots
        WHERE id IN (
            SELECT id FROM (
                SELECT id,
                       ROW_NUMBER() OVER (
                           PARTITION BY aggregate_id ORDER BY version DESC
                       ) AS rank
                FROM snapshots
            ) ranked
            WHERE rank > $1
        )
        "#,
    )
    .bind(keep_last)
    .execute(pool)
    .await?;

    let rows_deleted = result.rows_affected();
    if rows_deleted > 0 {
        tracing::info!(rows_deleted, "pruned old snapshots");
    }

    Ok(rows_deleted)
}

/// Spawn the periodic maintenance loop.
pub fn spawn(pool: PgPool, config: &Config) -> tokio::task::JoinHandle<()> {
    let retention_hours = config.log_retention_hours;
    let keep_last = config.snapshot_keep_last;

    tokio::spawn(async move {
        let mut ticker = interval(JOB_INTERVAL);
        loop {
            ticker.tick().await;

            if let Err(err) = compact_event_log(&pool, retention_hours).await {
                tracing::warn!(error = %err, "event log compaction failed");
            }
            if let Err(err) = prune_snapshots(&pool, keep_last).await {
                tracing::warn!(error = %err, "snapshot pruning failed");
            }
        }
    })
}
