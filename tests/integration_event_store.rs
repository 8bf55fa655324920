//! Integration tests for the event store, snapshots, and the loader.

use chrono::Utc;
use identity_stream::aggregate::{Aggregate, UserAggregate};
use identity_stream::domain::UserEvent;
use identity_stream::event_store::{
    AggregateLoader, EventFilter, EventStore, PendingEvent, SnapshotStore,
};
use uuid::Uuid;

mod common;

fn pending(event: &UserEvent) -> PendingEvent {
    PendingEvent {
        event_type: event.event_type().to_string(),
        aggregate_id: event.aggregate_id(),
        payload: event.payload().unwrap(),
        timestamp: Some(event.timestamp()),
        version: Some(event.version()),
    }
}

fn pending_unversioned(event: &UserEvent) -> PendingEvent {
    PendingEvent {
        version: None,
        ..pending(event)
    }
}

/// A registered user with `logins` extra login events, all uncommitted.
fn user_with_logins(logins: usize) -> (Uuid, Vec<UserEvent>) {
    let id = Uuid::new_v4();
    let mut user = UserAggregate::new(id);
    user.register(&common::unique_email("store"), "hunter2")
        .unwrap();
    for _ in 0..logins {
        user.record_login("10.0.0.1", "integration-test").unwrap();
    }
    (id, user.take_uncommitted())
}

#[tokio::test]
async fn test_store_assigns_contiguous_versions() {
    let pool = common::setup_test_db().await;
    let store = EventStore::new(pool);

    let (id, events) = user_with_logins(2);
    for event in &events {
        let stored = store.save(pending_unversioned(event)).await.unwrap();
        assert_eq!(stored.version, event.version());
    }

    let stored = store.by_aggregate(id, 0).await.unwrap();
    let versions: Vec<i64> = stored.iter().map(|e| e.version).collect();
    assert_eq!(versions, vec![1, 2, 3]);
    assert_eq!(store.latest_version(id).await.unwrap(), 3);
}

#[tokio::test]
async fn test_version_conflict_on_stale_append() {
    let pool = common::setup_test_db().await;
    let store = EventStore::new(pool);

    let (_, events) = user_with_logins(0);
    store.save(pending(&events[0])).await.unwrap();

    // Same claimed version again: the race loser's append.
    let result = store.save(pending(&events[0])).await;
    let err = result.unwrap_err();
    assert!(err.is_version_conflict(), "expected conflict, got {err:?}");
}

#[tokio::test]
async fn test_save_batch_rolls_back_on_conflict() {
    let pool = common::setup_test_db().await;
    let store = EventStore::new(pool);

    let (id, events) = user_with_logins(1);
    let mut bad_second = pending(&events[1]);
    bad_second.version = Some(7); // gap

    let result = store
        .save_batch(vec![pending(&events[0]), bad_second])
        .await;
    assert!(result.is_err());

    // Nothing from the failed batch is visible.
    assert_eq!(store.latest_version(id).await.unwrap(), 0);
    assert!(store.by_aggregate(id, 0).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_by_filter_and_after_version() {
    let pool = common::setup_test_db().await;
    let store = EventStore::new(pool);

    let (id, events) = user_with_logins(3);
    store
        .save_batch(events.iter().map(pending).collect())
        .await
        .unwrap();

    let filter = EventFilter {
        aggregate_id: Some(id),
        event_type: Some("user.login.recorded".to_string()),
        ..Default::default()
    };
    let logins = store.by_filter(&filter).await.unwrap();
    assert_eq!(logins.len(), 3);
    assert!(logins.iter().all(|e| e.event_type == "user.login.recorded"));

    let limited = store
        .by_filter(&EventFilter {
            aggregate_id: Some(id),
            limit: Some(2),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(limited.len(), 2);

    let tail = store.after_version(id, 2).await.unwrap();
    let versions: Vec<i64> = tail.iter().map(|e| e.version).collect();
    assert_eq!(versions, vec![3, 4]);

    let count_before = store.count().await.unwrap();
    assert!(count_before >= 4);
}

#[tokio::test]
async fn test_snapshot_store_roundtrip_and_prune() {
    let pool = common::setup_test_db().await;
    let snapshots = SnapshotStore::new(pool);

    let id = Uuid::new_v4();
    assert!(!snapshots.has(id).await.unwrap());
    assert!(snapshots.latest(id).await.unwrap().is_none());

    for version in [10i64, 20, 30] {
        snapshots
            .save(id, version, serde_json::json!({ "version": version }))
            .await
            .unwrap();
    }

    assert!(snapshots.has(id).await.unwrap());
    assert_eq!(snapshots.latest(id).await.unwrap().unwrap().version, 30);
    assert_eq!(
        snapshots.at_version(id, 25).await.unwrap().unwrap().version,
        20
    );
    assert!(snapshots.at_version(id, 5).await.unwrap().is_none());

    // Re-saving the same key replaces the state.
    snapshots
        .save(id, 30, serde_json::json!({ "version": 30, "refreshed": true }))
        .await
        .unwrap();
    let latest = snapshots.latest(id).await.unwrap().unwrap();
    assert_eq!(latest.state["refreshed"], true);

    let deleted = snapshots.prune(id, 1).await.unwrap();
    assert_eq!(deleted, 2);
    assert_eq!(snapshots.latest(id).await.unwrap().unwrap().version, 30);
}

#[tokio::test]
async fn test_loader_accelerates_with_snapshot() {
    let pool = common::setup_test_db().await;
    let store = EventStore::new(pool.clone());
    let snapshots = SnapshotStore::new(pool);
    let loader = AggregateLoader::new(store.clone(), snapshots.clone());

    // 1 created + 74 logins = version 75
    let (id, events) = user_with_logins(74);
    store
        .save_batch(events.iter().map(pending).collect())
        .await
        .unwrap();

    let full = loader.load::<UserAggregate>(id).await.unwrap().unwrap();
    assert!(!full.from_snapshot);
    assert_eq!(full.events_replayed, 75);
    assert_eq!(full.aggregate.version(), 75);

    // Snapshot at version 50, then reload.
    let mid = UserAggregate::load_from_history(id, events[..50].to_vec());
    snapshots
        .save(id, 50, serde_json::to_value(&mid).unwrap())
        .await
        .unwrap();

    let fast = loader.load::<UserAggregate>(id).await.unwrap().unwrap();
    assert!(fast.from_snapshot);
    assert_eq!(fast.events_replayed, 25);
    assert_eq!(fast.aggregate.version(), 75);

    // Fold equivalence: snapshot path and full replay agree.
    assert_eq!(fast.aggregate.email(), full.aggregate.email());
    assert_eq!(fast.aggregate.password_hash(), full.aggregate.password_hash());
    assert_eq!(fast.aggregate.status(), full.aggregate.status());
    assert_eq!(fast.aggregate.created_at(), full.aggregate.created_at());
}

#[tokio::test]
async fn test_loader_ignores_corrupt_snapshot() {
    let pool = common::setup_test_db().await;
    let store = EventStore::new(pool.clone());
    let snapshots = SnapshotStore::new(pool);
    let loader = AggregateLoader::new(store.clone(), snapshots.clone());

    let (id, events) = user_with_logins(2);
    store
        .save_batch(events.iter().map(pending).collect())
        .await
        .unwrap();

    snapshots
        .save(id, 2, serde_json::json!({ "not": "an aggregate" }))
        .await
        .unwrap();

    let loaded = loader.load::<UserAggregate>(id).await.unwrap().unwrap();
    assert!(!loaded.from_snapshot);
    assert_eq!(loaded.aggregate.version(), 3);
}

#[tokio::test]
async fn test_load_at_time_travel() {
    let pool = common::setup_test_db().await;
    let store = EventStore::new(pool.clone());
    let loader = AggregateLoader::new(store.clone(), SnapshotStore::new(pool));

    let id = Uuid::new_v4();
    let email = common::unique_email("travel");
    let mut user = UserAggregate::new(id);
    user.register(&email, "hunter2").unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    let mid = Utc::now();
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    user.change_email(&common::unique_email("travel-new")).unwrap();
    let events = user.take_uncommitted();
    store
        .save_batch(events.iter().map(pending).collect())
        .await
        .unwrap();

    let at_mid = loader
        .load_at::<UserAggregate>(id, mid)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(at_mid.aggregate.version(), 1);
    assert_eq!(at_mid.aggregate.email(), email);

    let at_now = loader
        .load_at::<UserAggregate>(id, Utc::now())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(at_now.aggregate.version(), 2);
    // Time-travel monotonicity
    assert!(at_mid.aggregate.version() <= at_now.aggregate.version());

    // Before any event there is no state.
    let too_early = loader
        .load_at::<UserAggregate>(id, mid - chrono::Duration::hours(1))
        .await
        .unwrap();
    assert!(too_early.is_none());
}

#[tokio::test]
async fn test_replay_is_deterministic() {
    let pool = common::setup_test_db().await;
    let store = EventStore::new(pool.clone());
    let loader = AggregateLoader::new(store.clone(), SnapshotStore::new(pool));

    let (id, events) = user_with_logins(5);
    store
        .save_batch(events.iter().map(pending).collect())
        .await
        .unwrap();

    let first = loader.load::<UserAggregate>(id).await.unwrap().unwrap();
    let second = loader.load::<UserAggregate>(id).await.unwrap().unwrap();

    assert_eq!(first.aggregate.email(), second.aggregate.email());
    assert_eq!(
        first.aggregate.password_hash(),
        second.aggregate.password_hash()
    );
    assert_eq!(first.aggregate.status(), second.aggregate.status());
    assert_eq!(first.aggregate.version(), second.aggregate.version());
    assert_eq!(first.aggregate.created_at(), second.aggregate.created_at());
    assert_eq!(first.aggregate.updated_at(), second.aggregate.updated_at());
}

#[tokio::test]
async fn test_missing_aggregate_loads_none() {
    let pool = common::setup_test_db().await;
    let store = EventStore::new(pool.clone());
    let loader = AggregateLoader::new(store, SnapshotStore::new(pool));

    let loaded = loader.load::<UserAggregate>(Uuid::new_v4()).await.unwrap();
    assert!(loaded.is_none());
}
