//! HTTP API
//!
//! One process exposes all four surfaces: the command side, the query
//! side, the store's read/maintenance endpoints, and the replay
//! endpoints.

pub mod command_routes;
pub mod query_routes;
pub mod replay_routes;
pub mod store_routes;

use axum::Router;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::aggregate::{Aggregate, UserAggregate};
use crate::auth::JwtKeys;
use crate::event_store::{AggregateLoader, EventStore, SnapshotStore};
use crate::handlers::CommandService;
use crate::projection::ProjectionService;
use crate::replay::ReplayService;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub commands: CommandService,
    pub projections: ProjectionService,
    pub replay: ReplayService,
    pub events: EventStore,
    pub snapshots: SnapshotStore,
    pub loader: AggregateLoader,
    pub jwt: JwtKeys,
}

/// Aggregate state as exposed over HTTP. The password hash stays inside.
#[derive(Debug, Clone, Serialize)]
pub struct UserStateView {
    pub id: Uuid,
    pub email: String,
    pub status: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: i64,
}

impl From<&UserAggregate> for UserStateView {
    fn from(user: &UserAggregate) -> Self {
        Self {
            id: user.id(),
            email: user.email().to_string(),
            status: user.status().to_string(),
            created_at: user.created_at(),
            updated_at: user.updated_at(),
            version: user.version(),
        }
    }
}

/// Assemble the full application router.
pub fn create_router() -> Router<AppState> {
    Router::new()
        .merge(command_routes::router())
        .merge(query_routes::router())
        .merge(store_routes::router())
        .merge(replay_routes::router())
}
