//! Common test utilities

use std::future::Future;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

/// Connect to the test database. Tests isolate themselves with fresh
/// aggregate ids, unique emails, and per-test topics/groups instead of
/// truncating shared tables, so they can run concurrently.
pub async fn setup_test_db() -> PgPool {
    dotenvy::dotenv().ok();
    let database_url =
        std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for tests");

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB")
}

/// A unique email for one test run.
pub fn unique_email(prefix: &str) -> String {
    format!("{}-{}@example.test", prefix, Uuid::new_v4().simple())
}

/// A unique topic name so consumers in one test never see another test's
/// events.
pub fn unique_topic(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4().simple())
}

/// Poll `check` until it returns true or the timeout elapses.
pub async fn wait_until<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
