//! Configuration module
//!
//! Loads configuration from environment variables. Missing or malformed
//! values fail startup; nothing here is recoverable at runtime.

use std::env;

use crate::event_store::SnapshotPolicy;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    /// Secret for signing login tokens
    pub jwt_secret: String,

    /// Token lifetime in minutes
    pub jwt_ttl_minutes: i64,

    /// Topic user events are published to
    pub event_topic: String,

    /// Consumer group persisting events into the store
    pub store_consumer_group: String,

    /// Consumer group updating the read models
    pub projection_consumer_group: String,

    /// First snapshot once a stream reaches this many events
    pub snapshot_first_after: i64,

    /// Snapshot every this many events after the last one
    pub snapshot_interval: i64,

    /// Snapshots kept per aggregate when pruning
    pub snapshot_keep_last: i64,

    /// Consumed log entries older than this are compacted away
    pub log_retention_hours: i64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url =
            env::var("DATABASE_URL").map_err(|_| ConfigError::MissingEnv("DATABASE_URL"))?;

        let database_max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("DATABASE_MAX_CONNECTIONS"))?;

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("PORT"))?;

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let jwt_secret =
            env::var("JWT_SECRET").map_err(|_| ConfigError::MissingEnv("JWT_SECRET"))?;

        let jwt_ttl_minutes = env::var("JWT_TTL_MINUTES")
            .unwrap_or_else(|_| "60".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("JWT_TTL_MINUTES"))?;

        let event_topic =
            env::var("EVENT_TOPIC").unwrap_or_else(|_| crate::event_log::DEFAULT_TOPIC.to_string());

        let store_consumer_group =
            env::var("STORE_CONSUMER_GROUP").unwrap_or_else(|_| "event-store".to_string());

        let projection_consumer_group =
            env::var("PROJECTION_CONSUMER_GROUP").unwrap_or_else(|_| "query-service".to_string());

        let snapshot_first_after = env::var("SNAPSHOT_FIRST_AFTER")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("SNAPSHOT_FIRST_AFTER"))?;

        let snapshot_interval = env::var("SNAPSHOT_INTERVAL")
            .unwrap_or_else(|_| "50".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("SNAPSHOT_INTERVAL"))?;

        let snapshot_keep_last = env::var("SNAPSHOT_KEEP_LAST")
            .unwrap_or_else(|_| "3".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("SNAPSHOT_KEEP_LAST"))?;

        let log_retention_hours = env::var("LOG_RETENTION_HOURS")
            .unwrap_or_else(|_| "168".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("LOG_RETENTION_HOURS"))?;

        Ok(Self {
            database_url,
            database_max_connections,
            host,
            port,
            environment,
            jwt_secret,
            jwt_ttl_minutes,
            event_topic,
            store_consumer_group,
            projection_consumer_group,
            snapshot_first_after,
            snapshot_interval,
            snapshot_keep_last,
            log_retention_hours,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn snapshot_policy(&self) -> SnapshotPolicy {
        SnapshotPolicy {
            first_after: self.snapshot_first_after,
            interval: self.snapshot_interval,
        }
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
