//! identity-stream - Event-Sourced User Identity Backend
//!
//! CQRS service for user identity: commands validate against an
//! event-sourced aggregate, events flow through a durable log into the
//! event store and the read projections.

use std::net::SocketAddr;

use axum::routing::get;
use axum::{Json, Router};
use sqlx::postgres::PgPoolOptions;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use identity_stream::api::{self, AppState};
use identity_stream::auth::JwtKeys;
use identity_stream::event_log::EventLog;
use identity_stream::event_store::{AggregateLoader, EventStore, SnapshotStore, StoreIngestor};
use identity_stream::handlers::CommandService;
use identity_stream::projection::{ProjectionConsumer, ProjectionService};
use identity_stream::replay::ReplayService;
use identity_stream::{db, Config};

/// Initialize tracing/logging
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "identity_stream=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build the application router
fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .merge(api::create_router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "OK" }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    let config = Config::from_env()?;
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!("Starting identity-stream server");
    tracing::info!("Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;

    if !db::check_schema(&pool).await? {
        tracing::error!("Database schema is not complete. Please run migrations.");
        return Err(anyhow::anyhow!("Database schema incomplete"));
    }

    tracing::info!("Database connected successfully");

    // Core components
    let log = EventLog::new(pool.clone());
    let events = EventStore::new(pool.clone());
    let snapshots = SnapshotStore::new(pool.clone());
    let loader = AggregateLoader::new(events.clone(), snapshots.clone());
    let projections = ProjectionService::new(pool.clone());

    // Store ingest consumer: log -> events table (+ snapshots)
    let ingestor = StoreIngestor::new(
        events.clone(),
        snapshots.clone(),
        loader.clone(),
        config.snapshot_policy(),
        config.snapshot_keep_last,
    );
    let store_consumer = log.subscribe(&config.event_topic, &config.store_consumer_group);
    let ingest_task = tokio::spawn(ingestor.run(store_consumer));

    // Projection consumer: log -> read models
    let projection_consumer =
        log.subscribe(&config.event_topic, &config.projection_consumer_group);
    let projection_task =
        tokio::spawn(ProjectionConsumer::new(projections.clone()).run(projection_consumer));

    // Periodic maintenance
    let jobs_task = identity_stream::jobs::spawn(pool.clone(), &config);

    let state = AppState {
        commands: CommandService::new(
            loader.clone(),
            log.clone(),
            config.event_topic.clone(),
            projections.clone(),
        ),
        projections,
        replay: ReplayService::new(loader.clone(), events.clone()),
        events,
        snapshots,
        loader,
        jwt: JwtKeys::new(&config.jwt_secret, config.jwt_ttl_minutes),
    };

    let app = build_router(state);

    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutting down...");
    ingest_task.abort();
    projection_task.abort();
    jobs_task.abort();
    pool.close().await;
    tracing::info!("Database connections closed. Goodbye!");

    Ok(())
}

/// Shutdown signal handler for graceful shutdown
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}
