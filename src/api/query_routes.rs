//! Query-side endpoints
//!
//! Reads served from the projections: login by email, user listing, and
//! login history.

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth;
use crate::error::{AppError, AppResult};
use crate::projection::{LoginRecord, UserProjection};

use super::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/users", get(list_users))
        .route("/users/:id/logins", get(login_history))
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct LoginResponse {
    token: String,
    user_id: Uuid,
    email: String,
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let auth_row = state
        .projections
        .find_auth_by_email(&req.email)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

    if auth_row.status != "active" || !auth::verify_password(&req.password, &auth_row.password_hash)
    {
        return Err(AppError::InvalidCredentials);
    }

    let token = state
        .jwt
        .sign(auth_row.id, &auth_row.email)
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(Json(LoginResponse {
        token,
        user_id: auth_row.id,
        email: auth_row.email,
    }))
}

async fn list_users(State(state): State<AppState>) -> AppResult<Json<Vec<UserProjection>>> {
    let users = state.projections.list_users().await?;
    Ok(Json(users))
}

#[derive(Debug, Deserialize)]
struct LoginHistoryQuery {
    limit: Option<i64>,
}

#[derive(Debug, Serialize)]
struct LoginHistoryResponse {
    user_id: Uuid,
    logins: Vec<LoginRecord>,
    count: usize,
}

async fn login_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<LoginHistoryQuery>,
) -> AppResult<Json<LoginHistoryResponse>> {
    let limit = query.limit.unwrap_or(100).clamp(1, 1000);
    let logins = state.projections.login_history(id, limit).await?;

    Ok(Json(LoginHistoryResponse {
        user_id: id,
        count: logins.len(),
        logins,
    }))
}
