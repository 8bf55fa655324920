//! Replay service
//!
//! State reconstruction on demand: current state, point-in-time state,
//! per-event history, and structural comparison between two instants.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::aggregate::{Aggregate, UserAggregate};
use crate::error::{AppError, AppResult};
use crate::event_store::{decode_stored, AggregateLoader, EventStore, Loaded};

/// A field that differs between two states.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldChange {
    pub before: String,
    pub after: String,
}

/// Structural diff between two user states.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StateDiff {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<FieldChange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<FieldChange>,
}

/// Result of comparing one aggregate at two instants.
#[derive(Debug, Clone)]
pub struct StateComparison {
    pub before: UserAggregate,
    pub after: UserAggregate,
    pub diff: StateDiff,
}

/// Compute the diff over the observable identity fields.
pub fn diff_states(before: &UserAggregate, after: &UserAggregate) -> StateDiff {
    let mut diff = StateDiff::default();
    if before.email() != after.email() {
        diff.email = Some(FieldChange {
            before: before.email().to_string(),
            after: after.email().to_string(),
        });
    }
    if before.status() != after.status() {
        diff.status = Some(FieldChange {
            before: before.status().to_string(),
            after: after.status().to_string(),
        });
    }
    diff
}

/// Read-only reconstruction queries over the event store.
#[derive(Debug, Clone)]
pub struct ReplayService {
    loader: AggregateLoader,
    events: EventStore,
}

impl ReplayService {
    pub fn new(loader: AggregateLoader, events: EventStore) -> Self {
        Self { loader, events }
    }

    /// Current state reconstructed from events (snapshot-accelerated).
    pub async fn current_state(&self, user_id: Uuid) -> AppResult<Loaded<UserAggregate>> {
        self.loader
            .load::<UserAggregate>(user_id)
            .await?
            .ok_or_else(|| AppError::UserNotFound(user_id.to_string()))
    }

    /// State as of `point_in_time`.
    pub async fn state_at(
        &self,
        user_id: Uuid,
        point_in_time: DateTime<Utc>,
    ) -> AppResult<Loaded<UserAggregate>> {
        self.loader
            .load_at::<UserAggregate>(user_id, point_in_time)
            .await?
            .ok_or_else(|| AppError::UserNotFound(user_id.to_string()))
    }

    /// The state after each event, oldest first.
    pub async fn history(&self, user_id: Uuid) -> AppResult<Vec<UserAggregate>> {
        let events = self.events.by_aggregate(user_id, 0).await?;
        if events.is_empty() {
            return Err(AppError::UserNotFound(user_id.to_string()));
        }

        let mut history = Vec::with_capacity(events.len());
        let mut user = UserAggregate::new(user_id);
        for stored in &events {
            if let Some(event) = decode_stored(stored) {
                user = user.apply(event);
                history.push(user.clone());
            }
        }

        Ok(history)
    }

    /// States at two instants plus the diff over {email, status}.
    pub async fn compare(
        &self,
        user_id: Uuid,
        time1: DateTime<Utc>,
        time2: DateTime<Utc>,
    ) -> AppResult<StateComparison> {
        let before = self.state_at(user_id, time1).await?.aggregate;
        let after = self.state_at(user_id, time2).await?.aggregate;
        let diff = diff_states(&before, &after);

        Ok(StateComparison {
            before,
            after,
            diff,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diff_states_reports_changes() {
        let mut before = UserAggregate::new(Uuid::new_v4());
        before.register("alice@x.io", "hunter2").unwrap();

        let mut after = before.clone();
        after.change_email("a@y.io").unwrap();
        after.deactivate(None).unwrap();

        let diff = diff_states(&before, &after);
        assert_eq!(
            diff.email,
            Some(FieldChange {
                before: "alice@x.io".to_string(),
                after: "a@y.io".to_string(),
            })
        );
        assert_eq!(
            diff.status,
            Some(FieldChange {
                before: "active".to_string(),
                after: "deactivated".to_string(),
            })
        );
    }

    #[test]
    fn test_diff_states_empty_when_equal() {
        let mut user = UserAggregate::new(Uuid::new_v4());
        user.register("alice@x.io", "hunter2").unwrap();

        let diff = diff_states(&user, &user.clone());
        assert_eq!(diff, StateDiff::default());
    }
}
