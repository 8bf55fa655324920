//! Error handling module
//!
//! Centralized error types and HTTP response conversion. The API layer is
//! the single point where domain and infrastructure errors turn into
//! status codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::domain::DomainError;
use crate::event_log::EventLogError;
use crate::event_store::EventStoreError;
use crate::projection::ProjectionError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("version conflict: concurrent modification detected")]
    VersionConflict,

    // Domain errors
    #[error(transparent)]
    Domain(#[from] DomainError),

    // Infrastructure errors
    #[error(transparent)]
    EventStore(#[from] EventStoreError),

    #[error(transparent)]
    EventLog(#[from] EventLogError),

    #[error(transparent)]
    Projection(#[from] ProjectionError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl AppError {
    /// Errors worth retrying inside the command write path.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::EventLog(EventLogError::Database(_))
                | AppError::Database(_)
                | AppError::EventStore(EventStoreError::Database(_))
                | AppError::Projection(ProjectionError::Database(_))
        )
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, details) = match &self {
            // 400 Bad Request
            AppError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", Some(msg.clone()))
            }

            // 401 Unauthorized
            AppError::InvalidCredentials => {
                (StatusCode::UNAUTHORIZED, "invalid_credentials", None)
            }

            // 404 Not Found
            AppError::UserNotFound(id) => {
                (StatusCode::NOT_FOUND, "user_not_found", Some(id.clone()))
            }

            // 409 Conflict
            AppError::VersionConflict => (StatusCode::CONFLICT, "version_conflict", None),

            // Domain violations map to 400 with the rule in the message
            AppError::Domain(domain_err) => {
                let code = match domain_err {
                    DomainError::InvalidRegistration(_) => "invalid_registration",
                    DomainError::InvalidOldPassword => "invalid_old_password",
                    DomainError::WeakPassword(_) => "weak_password",
                    DomainError::PasswordUnchanged => "password_unchanged",
                    DomainError::InvalidEmail(_) => "invalid_email",
                    DomainError::AlreadyDeactivated => "already_deactivated",
                    DomainError::NotActive => "user_not_active",
                    DomainError::Hash(_) => "internal_error",
                };
                if domain_err.is_client_error() {
                    (StatusCode::BAD_REQUEST, code, Some(domain_err.to_string()))
                } else {
                    tracing::error!("domain error: {domain_err}");
                    (StatusCode::INTERNAL_SERVER_ERROR, code, None)
                }
            }

            AppError::EventStore(store_err) => match store_err {
                EventStoreError::VersionConflict { .. } => {
                    (StatusCode::CONFLICT, "version_conflict", Some(store_err.to_string()))
                }
                EventStoreError::AggregateNotFound(id) => {
                    (StatusCode::NOT_FOUND, "aggregate_not_found", Some(id.to_string()))
                }
                EventStoreError::Database(e) => {
                    tracing::error!("event store database error: {e:?}");
                    (StatusCode::SERVICE_UNAVAILABLE, "event_store_unavailable", None)
                }
                other => {
                    tracing::error!("event store error: {other:?}");
                    (StatusCode::INTERNAL_SERVER_ERROR, "event_store_error", None)
                }
            },

            // 503 Service Unavailable: transient infrastructure
            AppError::EventLog(e) => {
                tracing::error!("event log error: {e:?}");
                (StatusCode::SERVICE_UNAVAILABLE, "event_log_unavailable", None)
            }
            AppError::Database(e) => {
                tracing::error!("database error: {e:?}");
                (StatusCode::SERVICE_UNAVAILABLE, "database_unavailable", None)
            }
            AppError::Projection(e) => {
                tracing::error!("projection error: {e:?}");
                (StatusCode::SERVICE_UNAVAILABLE, "read_model_unavailable", None)
            }

            // 500 Internal Server Error
            AppError::Internal(msg) => {
                tracing::error!("internal error: {msg}");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
            AppError::Config(e) => {
                tracing::error!("config error: {e:?}");
                (StatusCode::INTERNAL_SERVER_ERROR, "config_error", None)
            }
        };

        let body = ErrorResponse {
            error: self.to_string(),
            error_code: error_code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_violation_maps_to_400() {
        let response = AppError::Domain(DomainError::InvalidOldPassword).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = AppError::Domain(DomainError::AlreadyDeactivated).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_not_found_maps_to_404() {
        let response = AppError::UserNotFound("U1".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_version_conflict_maps_to_409() {
        let response = AppError::VersionConflict.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = AppError::EventStore(EventStoreError::VersionConflict {
            aggregate_id: uuid::Uuid::new_v4(),
            expected: 2,
            actual: 5,
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_invalid_credentials_maps_to_401() {
        let response = AppError::InvalidCredentials.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
