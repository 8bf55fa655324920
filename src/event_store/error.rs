//! Event Store Errors

use uuid::Uuid;

/// Errors that can occur in the event store
#[derive(Debug, thiserror::Error)]
pub enum EventStoreError {
    /// Append carried a version that is not latest + 1
    #[error("version conflict for aggregate {aggregate_id}: expected {expected}, got {actual}")]
    VersionConflict {
        aggregate_id: Uuid,
        /// The version the store would accept next.
        expected: i64,
        /// The version the append claimed.
        actual: i64,
    },

    /// Aggregate has no events and no snapshot
    #[error("aggregate not found: {0}")]
    AggregateNotFound(Uuid),

    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid event data
    #[error("invalid event: {0}")]
    InvalidEvent(String),
}

impl EventStoreError {
    /// Check if this error is a version conflict
    pub fn is_version_conflict(&self) -> bool {
        matches!(self, EventStoreError::VersionConflict { .. })
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, EventStoreError::Database(_))
    }
}
