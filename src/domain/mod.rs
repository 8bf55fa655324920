//! Domain module
//!
//! Pure domain types: the closed event set and the errors command
//! validation can raise. No I/O happens below this module.

mod error;
mod events;

pub use error::DomainError;
pub use events::{
    is_known_event_type, EmailChanged, EventMeta, LoginRecorded, PasswordChanged, RawEnvelope,
    UserCreated, UserDeactivated, UserEvent, EVENT_TYPES,
};
