//! Aggregate module
//!
//! Aggregate Root pattern implementation for Event Sourcing.

pub mod user;

pub use user::{UserAggregate, UserStatus, MIN_PASSWORD_LEN};

/// Aggregate trait: a pure fold from events to state.
pub trait Aggregate: Sized + Default {
    /// The type of events this aggregate handles
    type Event;

    /// Get the aggregate ID
    fn id(&self) -> uuid::Uuid;

    /// Get the current version (number of events applied)
    fn version(&self) -> i64;

    /// Apply an event to update the aggregate state
    fn apply(self, event: Self::Event) -> Self;
}
