//! Command Service
//!
//! The write path: reload the aggregate fresh from the store, validate the
//! command against it, publish the emitted events to the log in one batch.
//! Success means the log has durably accepted the events; the store and
//! the projections catch up asynchronously, so a read issued right after a
//! command may not see it yet.

use std::time::Duration;

use uuid::Uuid;

use crate::aggregate::UserAggregate;
use crate::domain::DomainError;
use crate::error::{AppError, AppResult};
use crate::event_log::EventLog;
use crate::event_store::AggregateLoader;
use crate::projection::ProjectionService;

use super::commands::{
    ChangeEmailCommand, ChangePasswordCommand, DeactivateUserCommand, RecordLoginCommand,
    RegisterUserCommand,
};

const MAX_RETRIES: u32 = 3;

/// Orchestrates user commands against the aggregate and the event log.
#[derive(Clone)]
pub struct CommandService {
    loader: AggregateLoader,
    log: EventLog,
    topic: String,
    projections: ProjectionService,
}

impl CommandService {
    pub fn new(
        loader: AggregateLoader,
        log: EventLog,
        topic: String,
        projections: ProjectionService,
    ) -> Self {
        Self {
            loader,
            log,
            topic,
            projections,
        }
    }

    /// Register a new user stream. Returns the generated user id.
    pub async fn register(&self, command: RegisterUserCommand) -> AppResult<Uuid> {
        // Uniqueness check against the read model. The stream itself is
        // keyed by a fresh id, so a lost race duplicates an email in the
        // projections at worst, never a stream.
        if self
            .projections
            .find_auth_by_email(&command.email)
            .await?
            .is_some()
        {
            return Err(AppError::InvalidRequest(
                "email is already registered".to_string(),
            ));
        }

        let user_id = Uuid::new_v4();
        let mut user = UserAggregate::new(user_id);
        user.register(&command.email, &command.password)?;
        self.publish(&mut user).await?;

        tracing::info!(%user_id, "user registered");
        Ok(user_id)
    }

    pub async fn change_password(&self, command: ChangePasswordCommand) -> AppResult<()> {
        self.execute(command.user_id, |user| {
            user.change_password(&command.old_password, &command.new_password)
        })
        .await
    }

    pub async fn change_email(&self, command: ChangeEmailCommand) -> AppResult<()> {
        self.execute(command.user_id, |user| {
            user.change_email(&command.new_email)
        })
        .await
    }

    pub async fn deactivate(&self, command: DeactivateUserCommand) -> AppResult<()> {
        self.execute(command.user_id, |user| {
            user.deactivate(command.reason.clone())
        })
        .await
    }

    pub async fn record_login(&self, command: RecordLoginCommand) -> AppResult<()> {
        self.execute(command.user_id, |user| {
            user.record_login(&command.ip_address, &command.user_agent)
        })
        .await
    }

    /// Load-execute-publish with a bounded retry. Each attempt reloads the
    /// aggregate so the command observes every event persisted so far
    /// (in-flight events still racing through the log are invisible; the
    /// store resolves those with a version conflict).
    async fn execute<F>(&self, user_id: Uuid, mut run: F) -> AppResult<()>
    where
        F: FnMut(&mut UserAggregate) -> Result<(), DomainError>,
    {
        let mut attempt = 0;
        loop {
            let mut user = self.load(user_id).await?;
            run(&mut user)?;

            match self.publish(&mut user).await {
                Ok(()) => return Ok(()),
                Err(err) if err.is_transient() && attempt < MAX_RETRIES => {
                    attempt += 1;
                    tracing::warn!(
                        %user_id,
                        attempt,
                        error = %err,
                        "publish failed, re-executing command"
                    );
                    tokio::time::sleep(Duration::from_millis(50 * attempt as u64)).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn load(&self, user_id: Uuid) -> AppResult<UserAggregate> {
        match self.loader.load::<UserAggregate>(user_id).await? {
            Some(loaded) => Ok(loaded.aggregate),
            None => Err(AppError::UserNotFound(user_id.to_string())),
        }
    }

    /// Publish the uncommitted events as one atomic batch and clear the
    /// buffer.
    async fn publish(&self, user: &mut UserAggregate) -> AppResult<()> {
        let events = user.take_uncommitted();
        if events.is_empty() {
            return Ok(());
        }

        self.log.publish_batch(&self.topic, &events).await?;

        for event in &events {
            tracing::debug!(
                aggregate_id = %event.aggregate_id(),
                version = event.version(),
                event_type = event.event_type(),
                "event published"
            );
        }
        Ok(())
    }
}
