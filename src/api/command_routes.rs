//! Command-side endpoints
//!
//! Thin HTTP binding over the command service. A 2xx here means the event
//! log accepted the events; projections converge shortly after.

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::{post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::handlers::{
    ChangeEmailCommand, ChangePasswordCommand, DeactivateUserCommand, RecordLoginCommand,
    RegisterUserCommand,
};

use super::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/users/:id/password", put(change_password))
        .route("/users/:id/email", put(change_email))
        .route("/users/:id/deactivate", post(deactivate))
        .route("/login/record", post(record_login))
}

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    email: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct RegisterResponse {
    id: Uuid,
}

async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<RegisterResponse>)> {
    if !req.email.contains('@') {
        return Err(AppError::InvalidRequest(
            "a valid email address is required".to_string(),
        ));
    }

    let id = state
        .commands
        .register(RegisterUserCommand::new(req.email, req.password))
        .await?;

    Ok((StatusCode::CREATED, Json(RegisterResponse { id })))
}

#[derive(Debug, Serialize)]
struct MessageResponse {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ChangePasswordRequest {
    old_password: String,
    new_password: String,
}

async fn change_password(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ChangePasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    state
        .commands
        .change_password(ChangePasswordCommand {
            user_id: id,
            old_password: req.old_password,
            new_password: req.new_password,
        })
        .await?;

    Ok(Json(MessageResponse {
        message: "password changed".to_string(),
    }))
}

#[derive(Debug, Deserialize)]
struct ChangeEmailRequest {
    new_email: String,
}

async fn change_email(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ChangeEmailRequest>,
) -> AppResult<Json<MessageResponse>> {
    if !req.new_email.contains('@') {
        return Err(AppError::InvalidRequest(
            "a valid email address is required".to_string(),
        ));
    }

    state
        .commands
        .change_email(ChangeEmailCommand {
            user_id: id,
            new_email: req.new_email,
        })
        .await?;

    Ok(Json(MessageResponse {
        message: "email changed".to_string(),
    }))
}

#[derive(Debug, Deserialize)]
struct DeactivateRequest {
    reason: Option<String>,
}

async fn deactivate(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Option<Json<DeactivateRequest>>,
) -> AppResult<Json<MessageResponse>> {
    let mut command = DeactivateUserCommand::new(id);
    if let Some(Json(req)) = body {
        if let Some(reason) = req.reason {
            command = command.with_reason(reason);
        }
    }

    state.commands.deactivate(command).await?;

    Ok(Json(MessageResponse {
        message: "user deactivated".to_string(),
    }))
}

#[derive(Debug, Deserialize)]
struct RecordLoginRequest {
    user_id: Uuid,
}

async fn record_login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RecordLoginRequest>,
) -> AppResult<Json<MessageResponse>> {
    let ip_address = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .unwrap_or("unknown")
        .to_string();

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    state
        .commands
        .record_login(RecordLoginCommand {
            user_id: req.user_id,
            ip_address,
            user_agent,
        })
        .await?;

    Ok(Json(MessageResponse {
        message: "login recorded".to_string(),
    }))
}
