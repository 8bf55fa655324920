//! Replay endpoints
//!
//! Time travel over a user stream: current state, state at an instant,
//! full per-event history, and comparison between two instants.

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::replay::StateDiff;

use super::{AppState, UserStateView};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/replay/user/:id/state", get(user_state))
        .route("/replay/user/:id/state-at", get(user_state_at))
        .route("/replay/user/:id/history", get(user_history))
        .route("/replay/user/:id/compare", get(compare_states))
}

fn parse_rfc3339(value: Option<String>, param: &str) -> AppResult<DateTime<Utc>> {
    let raw = value.ok_or_else(|| {
        AppError::InvalidRequest(format!("{param} parameter required (RFC3339 format)"))
    })?;
    raw.parse::<DateTime<Utc>>().map_err(|_| {
        AppError::InvalidRequest(format!(
            "invalid {param} format, use RFC3339 (e.g. 2024-01-15T10:00:00Z)"
        ))
    })
}

#[derive(Debug, Serialize)]
struct StateResponse {
    user_id: Uuid,
    state: UserStateView,
}

async fn user_state(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<StateResponse>> {
    let loaded = state.replay.current_state(id).await?;
    Ok(Json(StateResponse {
        user_id: id,
        state: UserStateView::from(&loaded.aggregate),
    }))
}

#[derive(Debug, Deserialize)]
struct StateAtQuery {
    timestamp: Option<String>,
}

#[derive(Debug, Serialize)]
struct StateAtResponse {
    user_id: Uuid,
    point_in_time: DateTime<Utc>,
    state: UserStateView,
}

async fn user_state_at(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<StateAtQuery>,
) -> AppResult<Json<StateAtResponse>> {
    let point_in_time = parse_rfc3339(query.timestamp, "timestamp")?;
    let loaded = state.replay.state_at(id, point_in_time).await?;

    Ok(Json(StateAtResponse {
        user_id: id,
        point_in_time,
        state: UserStateView::from(&loaded.aggregate),
    }))
}

#[derive(Debug, Serialize)]
struct HistoryResponse {
    user_id: Uuid,
    history: Vec<UserStateView>,
    total_changes: usize,
}

async fn user_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<HistoryResponse>> {
    let history = state.replay.history(id).await?;
    let views: Vec<UserStateView> = history.iter().map(UserStateView::from).collect();

    Ok(Json(HistoryResponse {
        user_id: id,
        total_changes: views.len(),
        history: views,
    }))
}

#[derive(Debug, Deserialize)]
struct CompareQuery {
    time1: Option<String>,
    time2: Option<String>,
}

#[derive(Debug, Serialize)]
struct CompareResponse {
    user_id: Uuid,
    time1: DateTime<Utc>,
    time2: DateTime<Utc>,
    before: UserStateView,
    after: UserStateView,
    changes: StateDiff,
}

async fn compare_states(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<CompareQuery>,
) -> AppResult<Json<CompareResponse>> {
    let time1 = parse_rfc3339(query.time1, "time1")?;
    let time2 = parse_rfc3339(query.time2, "time2")?;

    let comparison = state.replay.compare(id, time1, time2).await?;

    Ok(Json(CompareResponse {
        user_id: id,
        time1,
        time2,
        before: UserStateView::from(&comparison.before),
        after: UserStateView::from(&comparison.after),
        changes: comparison.diff,
    }))
}
