//! Database module
//!
//! Database connection and schema verification utilities. Migrations are
//! raw SQL files in migrations/; this module only checks that they ran.

use sqlx::PgPool;

/// Simple connectivity check
pub async fn verify_connection(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Check if required tables exist
pub async fn check_schema(pool: &PgPool) -> Result<bool, sqlx::Error> {
    let required_tables = vec![
        "event_log",
        "log_offsets",
        "events",
        "snapshots",
        "auth_credentials",
        "user_views",
        "login_history",
    ];

    for table in required_tables {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = 'public' AND table_name = $1
            )
            "#,
        )
        .bind(table)
        .fetch_one(pool)
        .await?;

        if !exists {
            tracing::error!("required table '{}' does not exist", table);
            return Ok(false);
        }
    }

    Ok(true)
}
