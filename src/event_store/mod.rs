//! Event Store module
//!
//! Persistence layer for Event Sourcing: the append-only events table,
//! snapshots, snapshot-accelerated reconstruction, and the log consumer
//! that feeds the store.

mod error;
mod ingest;
mod loader;
mod repository;
mod snapshot;

pub use error::EventStoreError;
pub use ingest::StoreIngestor;
pub use loader::{decode_stored, AggregateLoader, Loaded};
pub use repository::{
    EventFilter, EventStore, PendingEvent, StoredEvent, DEFAULT_FILTER_LIMIT, MAX_FILTER_LIMIT,
};
pub use snapshot::{Snapshot, SnapshotPolicy, SnapshotStore};
