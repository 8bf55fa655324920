//! Event store endpoints
//!
//! Read access to the raw event stream plus snapshot utilities. The batch
//! endpoint is an operational backfill path; production writes arrive via
//! the event log consumer.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::{Aggregate, UserAggregate};
use crate::error::{AppError, AppResult};
use crate::event_store::{EventFilter, PendingEvent, StoredEvent};

use super::{AppState, UserStateView};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/events", get(list_events))
        .route("/events/batch", post(save_batch))
        .route("/events/aggregate/:id", get(events_by_aggregate))
        .route("/events/replay", get(replay_since))
        .route("/events/count", get(event_count))
        .route("/snapshots/:id", post(create_snapshot).get(latest_snapshot))
        .route("/snapshots/:id/state", get(aggregate_state))
}

#[derive(Debug, Deserialize)]
struct EventsQuery {
    event_type: Option<String>,
    aggregate_id: Option<Uuid>,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    limit: Option<i64>,
    offset: Option<i64>,
}

#[derive(Debug, Serialize)]
struct EventsResponse {
    events: Vec<StoredEvent>,
    count: usize,
}

async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> AppResult<Json<EventsResponse>> {
    let filter = EventFilter {
        event_type: query.event_type,
        aggregate_id: query.aggregate_id,
        start_time: query.start_time,
        end_time: query.end_time,
        limit: query.limit,
        offset: query.offset,
    };

    let events = state.events.by_filter(&filter).await?;
    Ok(Json(EventsResponse {
        count: events.len(),
        events,
    }))
}

#[derive(Debug, Deserialize)]
struct FromVersionQuery {
    from_version: Option<i64>,
}

#[derive(Debug, Serialize)]
struct AggregateEventsResponse {
    aggregate_id: Uuid,
    events: Vec<StoredEvent>,
    count: usize,
}

async fn events_by_aggregate(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<FromVersionQuery>,
) -> AppResult<Json<AggregateEventsResponse>> {
    let events = state
        .events
        .by_aggregate(id, query.from_version.unwrap_or(0))
        .await?;

    Ok(Json(AggregateEventsResponse {
        aggregate_id: id,
        count: events.len(),
        events,
    }))
}

#[derive(Debug, Deserialize)]
struct SinceQuery {
    since: Option<String>,
}

#[derive(Debug, Serialize)]
struct SinceResponse {
    since: DateTime<Utc>,
    events: Vec<StoredEvent>,
    count: usize,
}

async fn replay_since(
    State(state): State<AppState>,
    Query(query): Query<SinceQuery>,
) -> AppResult<Json<SinceResponse>> {
    let since = query
        .since
        .ok_or_else(|| {
            AppError::InvalidRequest("since parameter is required (RFC3339 format)".to_string())
        })?
        .parse::<DateTime<Utc>>()
        .map_err(|_| AppError::InvalidRequest("invalid time format, use RFC3339".to_string()))?;

    let events = state.events.since(since).await?;
    Ok(Json(SinceResponse {
        since,
        count: events.len(),
        events,
    }))
}

#[derive(Debug, Serialize)]
struct CountResponse {
    total_events: i64,
}

async fn event_count(State(state): State<AppState>) -> AppResult<Json<CountResponse>> {
    let total_events = state.events.count().await?;
    Ok(Json(CountResponse { total_events }))
}

#[derive(Debug, Deserialize)]
struct BatchEventRequest {
    event_type: String,
    aggregate_id: Uuid,
    payload: serde_json::Value,
    timestamp: Option<DateTime<Utc>>,
    version: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct BatchRequest {
    events: Vec<BatchEventRequest>,
}

#[derive(Debug, Serialize)]
struct BatchResponse {
    message: String,
    count: usize,
}

async fn save_batch(
    State(state): State<AppState>,
    Json(req): Json<BatchRequest>,
) -> AppResult<(StatusCode, Json<BatchResponse>)> {
    if req.events.is_empty() {
        return Err(AppError::InvalidRequest("events must not be empty".to_string()));
    }

    let pending: Vec<PendingEvent> = req
        .events
        .into_iter()
        .map(|event| PendingEvent {
            event_type: event.event_type,
            aggregate_id: event.aggregate_id,
            payload: event.payload,
            timestamp: event.timestamp,
            version: event.version,
        })
        .collect();

    let stored = state.events.save_batch(pending).await?;

    Ok((
        StatusCode::CREATED,
        Json(BatchResponse {
            message: "events saved successfully".to_string(),
            count: stored.len(),
        }),
    ))
}

#[derive(Debug, Serialize)]
struct SnapshotCreatedResponse {
    message: String,
    aggregate_id: Uuid,
    version: i64,
}

async fn create_snapshot(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<(StatusCode, Json<SnapshotCreatedResponse>)> {
    let loaded = state
        .loader
        .load::<UserAggregate>(id)
        .await?
        .ok_or_else(|| AppError::UserNotFound(id.to_string()))?;

    let version = loaded.aggregate.version();
    let snapshot_state = serde_json::to_value(&loaded.aggregate)
        .map_err(|e| AppError::Internal(e.to_string()))?;
    state.snapshots.save(id, version, snapshot_state).await?;

    Ok((
        StatusCode::CREATED,
        Json(SnapshotCreatedResponse {
            message: "snapshot created successfully".to_string(),
            aggregate_id: id,
            version,
        }),
    ))
}

#[derive(Debug, Serialize)]
struct SnapshotResponse {
    aggregate_id: Uuid,
    version: i64,
    state: UserStateView,
    created_at: DateTime<Utc>,
}

async fn latest_snapshot(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<SnapshotResponse>> {
    let snapshot = state
        .snapshots
        .latest(id)
        .await?
        .ok_or_else(|| AppError::UserNotFound(id.to_string()))?;

    let user: UserAggregate = serde_json::from_value(snapshot.state)
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(Json(SnapshotResponse {
        aggregate_id: id,
        version: snapshot.version,
        state: UserStateView::from(&user),
        created_at: snapshot.created_at,
    }))
}

#[derive(Debug, Serialize)]
struct AggregateStateResponse {
    aggregate_id: Uuid,
    version: i64,
    state: UserStateView,
    from_snapshot: bool,
    events_replayed: usize,
}

/// Snapshot-accelerated aggregate state: the RPC the write side of a
/// multi-process deployment would call.
async fn aggregate_state(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<AggregateStateResponse>> {
    let loaded = state
        .loader
        .load::<UserAggregate>(id)
        .await?
        .ok_or_else(|| AppError::UserNotFound(id.to_string()))?;

    Ok(Json(AggregateStateResponse {
        aggregate_id: id,
        version: loaded.aggregate.version(),
        state: UserStateView::from(&loaded.aggregate),
        from_snapshot: loaded.from_snapshot,
        events_replayed: loaded.events_replayed,
    }))
}
