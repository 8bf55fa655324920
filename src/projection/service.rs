//! Projection Service
//!
//! Read-model updates and queries. Handlers are idempotent on
//! (aggregate_id, version): every write is either an insert keyed by id or
//! a conditional update guarded by `last_version`, so redelivered
//! envelopes are no-ops.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{
    EmailChanged, LoginRecorded, PasswordChanged, UserCreated, UserDeactivated, UserEvent,
};

/// Auth lookup row: what the login endpoint needs and nothing more.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AuthProjection {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub status: String,
    pub updated_at: DateTime<Utc>,
}

/// User listing row.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct UserProjection {
    pub id: Uuid,
    pub email: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One recorded login.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct LoginRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub email: String,
    pub ip_address: String,
    pub user_agent: String,
    pub login_at: DateTime<Utc>,
}

/// Projection errors
#[derive(Debug, thiserror::Error)]
pub enum ProjectionError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Projection Service for updating and querying read models
#[derive(Debug, Clone)]
pub struct ProjectionService {
    pool: PgPool,
}

impl ProjectionService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // Event handlers
    // =========================================================================

    /// Apply one event to every affected read model.
    pub async fn apply(&self, event: &UserEvent) -> Result<(), ProjectionError> {
        match event {
            UserEvent::Created(e) => self.apply_created(e).await,
            UserEvent::PasswordChanged(e) => self.apply_password_changed(e).await,
            UserEvent::EmailChanged(e) => self.apply_email_changed(e).await,
            UserEvent::Deactivated(e) => self.apply_deactivated(e).await,
            UserEvent::LoginRecorded(e) => self.apply_login_recorded(e).await,
        }
    }

    async fn apply_created(&self, event: &UserCreated) -> Result<(), ProjectionError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO auth_credentials (id, email, password_hash, status, updated_at, last_version)
            VALUES ($1, $2, $3, 'active', $4, $5)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(event.meta.aggregate_id)
        .bind(&event.email)
        .bind(&event.password_hash)
        .bind(event.meta.timestamp)
        .bind(event.meta.version)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO user_views (id, email, status, created_at, updated_at, last_version)
            VALUES ($1, $2, 'active', $3, $3, $4)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(event.meta.aggregate_id)
        .bind(&event.email)
        .bind(event.meta.timestamp)
        .bind(event.meta.version)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::debug!(
            user_id = %event.meta.aggregate_id,
            email = %event.email,
            "auth and user projections created"
        );
        Ok(())
    }

    async fn apply_password_changed(&self, event: &PasswordChanged) -> Result<(), ProjectionError> {
        sqlx::query(
            r#"
            UPDATE auth_credentials
            SET password_hash = $2, updated_at = $3, last_version = $4
            WHERE id = $1 AND last_version < $4
            "#,
        )
        .bind(event.meta.aggregate_id)
        .bind(&event.new_password_hash)
        .bind(event.meta.timestamp)
        .bind(event.meta.version)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn apply_email_changed(&self, event: &EmailChanged) -> Result<(), ProjectionError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE auth_credentials
            SET email = $2, updated_at = $3, last_version = $4
            WHERE id = $1 AND last_version < $4
            "#,
        )
        .bind(event.meta.aggregate_id)
        .bind(&event.new_email)
        .bind(event.meta.timestamp)
        .bind(event.meta.version)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE user_views
            SET email = $2, updated_at = $3, last_version = $4
            WHERE id = $1 AND last_version < $4
            "#,
        )
        .bind(event.meta.aggregate_id)
        .bind(&event.new_email)
        .bind(event.meta.timestamp)
        .bind(event.meta.version)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn apply_deactivated(&self, event: &UserDeactivated) -> Result<(), ProjectionError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE auth_credentials
            SET status = 'deactivated', updated_at = $2, last_version = $3
            WHERE id = $1 AND last_version < $3
            "#,
        )
        .bind(event.meta.aggregate_id)
        .bind(event.meta.timestamp)
        .bind(event.meta.version)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE user_views
            SET status = 'deactivated', updated_at = $2, last_version = $3
            WHERE id = $1 AND last_version < $3
            "#,
        )
        .bind(event.meta.aggregate_id)
        .bind(event.meta.timestamp)
        .bind(event.meta.version)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn apply_login_recorded(&self, event: &LoginRecorded) -> Result<(), ProjectionError> {
        // The event does not carry the email; resolve it from the auth view.
        let email: Option<String> =
            sqlx::query_scalar("SELECT email FROM auth_credentials WHERE id = $1")
                .bind(event.meta.aggregate_id)
                .fetch_optional(&self.pool)
                .await?;

        sqlx::query(
            r#"
            INSERT INTO login_history (id, user_id, email, ip_address, user_agent, login_at, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (user_id, version) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(event.meta.aggregate_id)
        .bind(email.unwrap_or_default())
        .bind(&event.ip_address)
        .bind(&event.user_agent)
        .bind(event.meta.timestamp)
        .bind(event.meta.version)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Auth lookup by email (unique).
    pub async fn find_auth_by_email(
        &self,
        email: &str,
    ) -> Result<Option<AuthProjection>, ProjectionError> {
        let auth = sqlx::query_as::<_, AuthProjection>(
            r#"
            SELECT id, email, password_hash, status, updated_at
            FROM auth_credentials
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(auth)
    }

    pub async fn list_users(&self) -> Result<Vec<UserProjection>, ProjectionError> {
        let users = sqlx::query_as::<_, UserProjection>(
            r#"
            SELECT id, email, status, created_at, updated_at
            FROM user_views
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }

    pub async fn get_user(&self, user_id: Uuid) -> Result<Option<UserProjection>, ProjectionError> {
        let user = sqlx::query_as::<_, UserProjection>(
            r#"
            SELECT id, email, status, created_at, updated_at
            FROM user_views
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Most recent logins first.
    pub async fn login_history(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<LoginRecord>, ProjectionError> {
        let records = sqlx::query_as::<_, LoginRecord>(
            r#"
            SELECT id, user_id, email, ip_address, user_agent, login_at
            FROM login_history
            WHERE user_id = $1
            ORDER BY login_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }
}
