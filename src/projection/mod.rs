//! Projection module
//!
//! Query-optimized read models derived from the event log. Not
//! authoritative: every table here can be rebuilt by replaying the log.

mod consumer;
mod service;

pub use consumer::ProjectionConsumer;
pub use service::{
    AuthProjection, LoginRecord, ProjectionError, ProjectionService, UserProjection,
};
