//! Command definitions
//!
//! Commands represent intentions to change a user stream.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Command to register a new user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterUserCommand {
    pub email: String,
    pub password: String,
}

impl RegisterUserCommand {
    pub fn new(email: String, password: String) -> Self {
        Self { email, password }
    }
}

/// Command to change a user's password
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangePasswordCommand {
    pub user_id: Uuid,
    pub old_password: String,
    pub new_password: String,
}

/// Command to change a user's email
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEmailCommand {
    pub user_id: Uuid,
    pub new_email: String,
}

/// Command to deactivate a user (soft delete)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeactivateUserCommand {
    pub user_id: Uuid,
    pub reason: Option<String>,
}

impl DeactivateUserCommand {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: String) -> Self {
        self.reason = Some(reason);
        self
    }
}

/// Command to record a successful login
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordLoginCommand {
    pub user_id: Uuid,
    pub ip_address: String,
    pub user_agent: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deactivate_command_builder() {
        let cmd = DeactivateUserCommand::new(Uuid::new_v4()).with_reason("gdpr".to_string());
        assert_eq!(cmd.reason.as_deref(), Some("gdpr"));
    }
}
