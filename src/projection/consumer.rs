//! Projection consumer
//!
//! Feeds the read models from the event log. A handler failure never kills
//! the consumer: transient database errors get a bounded retry, everything
//! else is logged and skipped so the group keeps making progress. Position
//! is committed only after the handlers ran, so a crash mid-envelope means
//! redelivery, which the version-guarded handlers absorb.

use std::time::Duration;

use crate::domain::RawEnvelope;
use crate::event_log::{LogConsumer, LogEntry};

use super::service::{ProjectionError, ProjectionService};

const MAX_RETRIES: u32 = 3;

/// Log consumer that owns the read-model update path.
pub struct ProjectionConsumer {
    service: ProjectionService,
}

impl ProjectionConsumer {
    pub fn new(service: ProjectionService) -> Self {
        Self { service }
    }

    /// Consume the log until the task is aborted.
    pub async fn run(self, mut consumer: LogConsumer) {
        tracing::info!(group = consumer.group(), "projection consumer started");
        loop {
            let entry = match consumer.recv().await {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::error!(error = %err, "event log read failed");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            };

            self.handle(&entry).await;

            if let Err(err) = consumer.commit(entry.offset).await {
                tracing::warn!(
                    offset = entry.offset,
                    error = %err,
                    "failed to commit consumer position"
                );
            }
        }
    }

    async fn handle(&self, entry: &LogEntry) {
        let envelope: RawEnvelope = match serde_json::from_value(entry.payload.clone()) {
            Ok(envelope) => envelope,
            Err(err) => {
                tracing::warn!(offset = entry.offset, error = %err, "malformed envelope skipped");
                return;
            }
        };

        let event = match envelope.decode() {
            Ok(Some(event)) => event,
            Ok(None) => {
                tracing::warn!(
                    event_type = %envelope.event_type,
                    "unknown event type skipped"
                );
                return;
            }
            Err(err) => {
                tracing::warn!(
                    event_type = %envelope.event_type,
                    error = %err,
                    "undecodable event payload skipped"
                );
                return;
            }
        };

        let mut attempt = 0;
        loop {
            match self.service.apply(&event).await {
                Ok(()) => return,
                Err(ProjectionError::Database(err)) if attempt < MAX_RETRIES => {
                    attempt += 1;
                    tracing::warn!(
                        attempt,
                        error = %err,
                        event_type = event.event_type(),
                        "projection update failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(50 * attempt as u64)).await;
                }
                Err(err) => {
                    tracing::error!(
                        aggregate_id = %event.aggregate_id(),
                        version = event.version(),
                        error = %err,
                        "projection update skipped after retries"
                    );
                    return;
                }
            }
        }
    }
}
