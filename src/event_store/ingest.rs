//! Store ingest consumer
//!
//! Persists envelopes arriving on the event log into the events table and
//! maintains snapshots. This is the production write path into the store;
//! the HTTP batch endpoint exists for operational backfill only.

use std::time::Duration;

use uuid::Uuid;

use crate::aggregate::{Aggregate, UserAggregate};
use crate::domain::{is_known_event_type, RawEnvelope};
use crate::event_log::{LogConsumer, LogEntry};

use super::loader::AggregateLoader;
use super::repository::{EventStore, PendingEvent};
use super::snapshot::{SnapshotPolicy, SnapshotStore};
use super::EventStoreError;

const MAX_RETRIES: u32 = 3;

/// Log consumer that owns the append path into the event store.
pub struct StoreIngestor {
    store: EventStore,
    snapshots: SnapshotStore,
    loader: AggregateLoader,
    policy: SnapshotPolicy,
    keep_last: i64,
}

impl StoreIngestor {
    pub fn new(
        store: EventStore,
        snapshots: SnapshotStore,
        loader: AggregateLoader,
        policy: SnapshotPolicy,
        keep_last: i64,
    ) -> Self {
        Self {
            store,
            snapshots,
            loader,
            policy,
            keep_last,
        }
    }

    /// Consume the log until the task is aborted. Entries that cannot be
    /// persisted after bounded retries are logged and skipped so the group
    /// keeps making progress; uncommitted entries are redelivered after a
    /// restart.
    pub async fn run(self, mut consumer: LogConsumer) {
        tracing::info!(group = consumer.group(), "store ingest consumer started");
        loop {
            let entry = match consumer.recv().await {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::error!(error = %err, "event log read failed");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            };

            if let Err(err) = self.ingest(&entry).await {
                tracing::error!(
                    offset = entry.offset,
                    error = %err,
                    "event dropped after retries"
                );
            }

            if let Err(err) = consumer.commit(entry.offset).await {
                tracing::warn!(
                    offset = entry.offset,
                    error = %err,
                    "failed to commit consumer position"
                );
            }
        }
    }

    async fn ingest(&self, entry: &LogEntry) -> Result<(), EventStoreError> {
        let envelope: RawEnvelope = match serde_json::from_value(entry.payload.clone()) {
            Ok(envelope) => envelope,
            Err(err) => {
                tracing::warn!(offset = entry.offset, error = %err, "malformed envelope skipped");
                return Ok(());
            }
        };

        if !is_known_event_type(&envelope.event_type) {
            tracing::warn!(event_type = %envelope.event_type, "unknown event type skipped");
            return Ok(());
        }

        let pending = PendingEvent::from_envelope(&envelope)?;

        let mut attempt = 0;
        loop {
            match self.store.save(pending.clone()).await {
                Ok(stored) => {
                    tracing::debug!(
                        event_id = %stored.id,
                        aggregate_id = %stored.aggregate_id,
                        version = stored.version,
                        event_type = %stored.event_type,
                        "event persisted"
                    );
                    self.maintain_snapshot(stored.aggregate_id).await;
                    return Ok(());
                }
                Err(EventStoreError::VersionConflict {
                    aggregate_id,
                    expected,
                    actual,
                }) => {
                    if actual < expected {
                        // At-least-once redelivery of an already stored
                        // version.
                        tracing::debug!(%aggregate_id, version = actual, "duplicate delivery skipped");
                    } else {
                        tracing::warn!(
                            %aggregate_id,
                            claimed = actual,
                            expected,
                            "conflicting append rejected; the losing command must be retried"
                        );
                    }
                    return Ok(());
                }
                Err(err) if err.is_retryable() && attempt < MAX_RETRIES => {
                    attempt += 1;
                    tracing::warn!(
                        attempt,
                        error = %err,
                        "event store append failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(50 * attempt as u64)).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Apply the snapshot policy after an append. Best-effort: a snapshot
    /// failure never blocks ingestion.
    async fn maintain_snapshot(&self, aggregate_id: Uuid) {
        if let Err(err) = self.try_snapshot(aggregate_id).await {
            tracing::warn!(%aggregate_id, error = %err, "snapshot maintenance failed");
        }
    }

    async fn try_snapshot(&self, aggregate_id: Uuid) -> Result<(), EventStoreError> {
        let latest_version = self.store.latest_version(aggregate_id).await?;
        let last_snapshot = self
            .snapshots
            .latest(aggregate_id)
            .await?
            .map(|snapshot| snapshot.version);

        if !self.policy.should_snapshot(latest_version, last_snapshot) {
            return Ok(());
        }

        let Some(loaded) = self.loader.load::<UserAggregate>(aggregate_id).await? else {
            return Ok(());
        };

        let state = serde_json::to_value(&loaded.aggregate)?;
        let snapshot = self
            .snapshots
            .save(aggregate_id, loaded.aggregate.version(), state)
            .await?;
        tracing::info!(%aggregate_id, version = snapshot.version, "snapshot created");

        self.snapshots.prune(aggregate_id, self.keep_last).await?;
        Ok(())
    }
}
