//! User Aggregate
//!
//! Pure state machine for a user stream: folds events into state and
//! validates commands against it. All I/O lives in the surrounding
//! services; nothing here suspends.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth;
use crate::domain::{
    DomainError, EmailChanged, EventMeta, LoginRecorded, PasswordChanged, UserCreated,
    UserDeactivated, UserEvent,
};

use super::Aggregate;

/// Minimum accepted password length.
pub const MIN_PASSWORD_LEN: usize = 6;

/// User lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    New,
    Active,
    Deactivated,
}

impl Default for UserStatus {
    fn default() -> Self {
        Self::New
    }
}

impl std::fmt::Display for UserStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserStatus::New => write!(f, "new"),
            UserStatus::Active => write!(f, "active"),
            UserStatus::Deactivated => write!(f, "deactivated"),
        }
    }
}

/// User Aggregate
///
/// Reconstructed per command from the event stream (optionally starting
/// from a snapshot) and discarded at the end of the command scope. Events
/// emitted by the current command accumulate in the uncommitted buffer
/// until the write path publishes them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAggregate {
    id: Uuid,
    email: String,
    password_hash: String,
    status: UserStatus,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    version: i64,

    #[serde(skip)]
    uncommitted: Vec<UserEvent>,
}

impl Default for UserAggregate {
    fn default() -> Self {
        Self {
            id: Uuid::nil(),
            email: String::new(),
            password_hash: String::new(),
            status: UserStatus::New,
            created_at: None,
            updated_at: None,
            version: 0,
            uncommitted: Vec::new(),
        }
    }
}

impl UserAggregate {
    /// Create an empty aggregate for a stream id.
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    /// Rebuild state by folding an ordered event sequence.
    pub fn load_from_history(id: Uuid, events: impl IntoIterator<Item = UserEvent>) -> Self {
        let mut user = Self::new(id);
        for event in events {
            user.apply_change(event, false);
        }
        user
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Register a new user. Only valid on a fresh stream.
    pub fn register(&mut self, email: &str, password: &str) -> Result<(), DomainError> {
        if self.status != UserStatus::New {
            return Err(DomainError::InvalidRegistration(
                "user already exists".to_string(),
            ));
        }
        if email.is_empty() {
            return Err(DomainError::InvalidRegistration(
                "email cannot be empty".to_string(),
            ));
        }
        if password.len() < MIN_PASSWORD_LEN {
            return Err(DomainError::InvalidRegistration(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }

        let password_hash =
            auth::hash_password(password).map_err(|e| DomainError::Hash(e.to_string()))?;

        let event = UserEvent::Created(UserCreated {
            meta: self.next_meta(),
            email: email.to_string(),
            password_hash,
        });
        self.apply_change(event, true);
        Ok(())
    }

    /// Change the password after verifying the old one.
    pub fn change_password(&mut self, old: &str, new: &str) -> Result<(), DomainError> {
        if self.status != UserStatus::Active {
            return Err(DomainError::NotActive);
        }
        if !auth::verify_password(old, &self.password_hash) {
            return Err(DomainError::InvalidOldPassword);
        }
        if new.len() < MIN_PASSWORD_LEN {
            return Err(DomainError::WeakPassword(MIN_PASSWORD_LEN));
        }
        if new == old {
            return Err(DomainError::PasswordUnchanged);
        }

        let new_password_hash =
            auth::hash_password(new).map_err(|e| DomainError::Hash(e.to_string()))?;

        let event = UserEvent::PasswordChanged(PasswordChanged {
            meta: self.next_meta(),
            new_password_hash,
        });
        self.apply_change(event, true);
        Ok(())
    }

    /// Change the email address.
    pub fn change_email(&mut self, new_email: &str) -> Result<(), DomainError> {
        if self.status != UserStatus::Active {
            return Err(DomainError::NotActive);
        }
        if new_email.is_empty() {
            return Err(DomainError::InvalidEmail("email cannot be empty".to_string()));
        }
        if new_email == self.email {
            return Err(DomainError::InvalidEmail(
                "new email must be different from current email".to_string(),
            ));
        }

        let event = UserEvent::EmailChanged(EmailChanged {
            meta: self.next_meta(),
            old_email: self.email.clone(),
            new_email: new_email.to_string(),
        });
        self.apply_change(event, true);
        Ok(())
    }

    /// Deactivate the user (soft delete).
    pub fn deactivate(&mut self, reason: Option<String>) -> Result<(), DomainError> {
        if self.status == UserStatus::Deactivated {
            return Err(DomainError::AlreadyDeactivated);
        }

        let event = UserEvent::Deactivated(UserDeactivated {
            meta: self.next_meta(),
            reason,
        });
        self.apply_change(event, true);
        Ok(())
    }

    /// Record a login. The event advances the version but changes no other
    /// observable state.
    pub fn record_login(&mut self, ip_address: &str, user_agent: &str) -> Result<(), DomainError> {
        if self.status != UserStatus::Active {
            return Err(DomainError::NotActive);
        }

        let event = UserEvent::LoginRecorded(LoginRecorded {
            meta: self.next_meta(),
            ip_address: ip_address.to_string(),
            user_agent: user_agent.to_string(),
        });
        self.apply_change(event, true);
        Ok(())
    }

    /// Verify a password against the stored hash (query, emits nothing).
    pub fn verify_password(&self, password: &str) -> bool {
        self.status == UserStatus::Active && auth::verify_password(password, &self.password_hash)
    }

    // =========================================================================
    // Uncommitted event buffer
    // =========================================================================

    pub fn uncommitted(&self) -> &[UserEvent] {
        &self.uncommitted
    }

    /// Drain the events emitted by the current command.
    pub fn take_uncommitted(&mut self) -> Vec<UserEvent> {
        std::mem::take(&mut self.uncommitted)
    }

    // =========================================================================
    // Getters
    // =========================================================================

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn password_hash(&self) -> &str {
        &self.password_hash
    }

    pub fn status(&self) -> UserStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    fn next_meta(&self) -> EventMeta {
        EventMeta {
            aggregate_id: self.id,
            timestamp: Utc::now(),
            version: self.version + 1,
        }
    }

    /// Fold one event into state; buffer it when it was emitted by the
    /// current command.
    fn apply_change(&mut self, event: UserEvent, is_new: bool) {
        match &event {
            UserEvent::Created(e) => {
                self.id = e.meta.aggregate_id;
                self.email = e.email.clone();
                self.password_hash = e.password_hash.clone();
                self.status = UserStatus::Active;
                self.created_at = Some(e.meta.timestamp);
            }

            UserEvent::PasswordChanged(e) => {
                self.password_hash = e.new_password_hash.clone();
            }

            UserEvent::EmailChanged(e) => {
                self.email = e.new_email.clone();
            }

            UserEvent::Deactivated(_) => {
                self.status = UserStatus::Deactivated;
            }

            // State-free: only updated_at and version advance.
            UserEvent::LoginRecorded(_) => {}
        }

        self.updated_at = Some(event.timestamp());
        self.version = event.version();

        if is_new {
            self.uncommitted.push(event);
        }
    }
}

impl Aggregate for UserAggregate {
    type Event = UserEvent;

    fn id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn apply(mut self, event: Self::Event) -> Self {
        self.apply_change(event, false);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registered() -> UserAggregate {
        let mut user = UserAggregate::new(Uuid::new_v4());
        user.register("alice@x.io", "hunter2").unwrap();
        user
    }

    #[test]
    fn test_register() {
        let user = registered();

        assert_eq!(user.email(), "alice@x.io");
        assert_eq!(user.status(), UserStatus::Active);
        assert_eq!(user.version(), 1);
        assert!(user.created_at().is_some());
        assert_eq!(user.uncommitted().len(), 1);
        assert!(matches!(user.uncommitted()[0], UserEvent::Created(_)));
        assert!(user.verify_password("hunter2"));
    }

    #[test]
    fn test_register_twice_rejected() {
        let mut user = registered();
        let result = user.register("alice@x.io", "hunter2");
        assert!(matches!(result, Err(DomainError::InvalidRegistration(_))));
    }

    #[test]
    fn test_register_weak_password() {
        let mut user = UserAggregate::new(Uuid::new_v4());
        let result = user.register("alice@x.io", "12345");
        assert!(matches!(result, Err(DomainError::InvalidRegistration(_))));
        assert_eq!(user.version(), 0);
        assert!(user.uncommitted().is_empty());
    }

    #[test]
    fn test_register_empty_email() {
        let mut user = UserAggregate::new(Uuid::new_v4());
        let result = user.register("", "hunter2");
        assert!(matches!(result, Err(DomainError::InvalidRegistration(_))));
    }

    #[test]
    fn test_change_password() {
        let mut user = registered();
        user.change_password("hunter2", "correct horse").unwrap();

        assert_eq!(user.version(), 2);
        assert!(user.verify_password("correct horse"));
        assert!(!user.verify_password("hunter2"));
        assert!(matches!(
            user.uncommitted()[1],
            UserEvent::PasswordChanged(_)
        ));
    }

    #[test]
    fn test_change_password_wrong_old() {
        let mut user = registered();
        let result = user.change_password("wrong", "correct horse");
        assert!(matches!(result, Err(DomainError::InvalidOldPassword)));
        assert_eq!(user.version(), 1);
    }

    #[test]
    fn test_change_password_unchanged() {
        let mut user = registered();
        let result = user.change_password("hunter2", "hunter2");
        assert!(matches!(result, Err(DomainError::PasswordUnchanged)));
    }

    #[test]
    fn test_change_password_weak() {
        let mut user = registered();
        let result = user.change_password("hunter2", "short");
        assert!(matches!(result, Err(DomainError::WeakPassword(_))));
    }

    #[test]
    fn test_change_email() {
        let mut user = registered();
        user.change_email("a@y.io").unwrap();

        assert_eq!(user.email(), "a@y.io");
        assert_eq!(user.version(), 2);
        match &user.uncommitted()[1] {
            UserEvent::EmailChanged(e) => {
                assert_eq!(e.old_email, "alice@x.io");
                assert_eq!(e.new_email, "a@y.io");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_change_email_same_rejected() {
        let mut user = registered();
        let result = user.change_email("alice@x.io");
        assert!(matches!(result, Err(DomainError::InvalidEmail(_))));
    }

    #[test]
    fn test_deactivate_and_commands_after() {
        let mut user = registered();
        user.deactivate(Some("requested".to_string())).unwrap();

        assert_eq!(user.status(), UserStatus::Deactivated);
        assert!(matches!(
            user.deactivate(None),
            Err(DomainError::AlreadyDeactivated)
        ));
        assert!(matches!(
            user.change_email("b@x.io"),
            Err(DomainError::NotActive)
        ));
        assert!(matches!(
            user.record_login("1.2.3.4", "curl"),
            Err(DomainError::NotActive)
        ));
        assert!(!user.verify_password("hunter2"));
    }

    #[test]
    fn test_record_login_advances_version_only() {
        let mut user = registered();
        let email = user.email().to_string();
        user.record_login("10.0.0.1", "curl/8.0").unwrap();

        assert_eq!(user.version(), 2);
        assert_eq!(user.email(), email);
        assert_eq!(user.status(), UserStatus::Active);
    }

    #[test]
    fn test_versions_are_contiguous() {
        let mut user = registered();
        user.change_password("hunter2", "correct horse").unwrap();
        user.change_email("a@y.io").unwrap();
        user.record_login("10.0.0.1", "curl/8.0").unwrap();

        let versions: Vec<i64> = user.uncommitted().iter().map(|e| e.version()).collect();
        assert_eq!(versions, vec![1, 2, 3, 4]);
        assert_eq!(user.version(), 4);
    }

    #[test]
    fn test_fold_equivalence_with_midpoint() {
        // Folding 1..n from empty must equal folding a midpoint state plus
        // the tail, for every midpoint.
        let mut source = registered();
        source.change_password("hunter2", "correct horse").unwrap();
        source.change_email("a@y.io").unwrap();
        source.record_login("10.0.0.1", "curl/8.0").unwrap();
        let id = Aggregate::id(&source);
        let events = source.take_uncommitted();

        let full = UserAggregate::load_from_history(id, events.clone());

        for k in 0..events.len() {
            let head = UserAggregate::load_from_history(id, events[..k].to_vec());
            let mut resumed = head;
            for event in events[k..].to_vec() {
                resumed = resumed.apply(event);
            }

            assert_eq!(Aggregate::id(&resumed), Aggregate::id(&full));
            assert_eq!(resumed.email(), full.email());
            assert_eq!(resumed.password_hash(), full.password_hash());
            assert_eq!(resumed.status(), full.status());
            assert_eq!(resumed.created_at(), full.created_at());
            assert_eq!(resumed.version(), full.version());
        }
    }

    #[test]
    fn test_snapshot_roundtrip_preserves_state() {
        let mut user = registered();
        user.change_email("a@y.io").unwrap();

        let state = serde_json::to_value(&user).unwrap();
        let restored: UserAggregate = serde_json::from_value(state).unwrap();

        assert_eq!(restored.email(), user.email());
        assert_eq!(restored.password_hash(), user.password_hash());
        assert_eq!(restored.status(), user.status());
        assert_eq!(restored.version(), user.version());
        assert!(restored.uncommitted().is_empty());
    }
}
