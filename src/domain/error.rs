//! Domain Error Types
//!
//! Pure domain errors raised by command validation on the user aggregate.
//! They are independent of the web/infrastructure layer.

use thiserror::Error;

/// Business rule violations surfaced by user commands.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Register preconditions failed
    #[error("invalid registration: {0}")]
    InvalidRegistration(String),

    /// Old password did not match the stored hash
    #[error("invalid old password")]
    InvalidOldPassword,

    /// New password shorter than the minimum
    #[error("password must be at least {0} characters")]
    WeakPassword(usize),

    /// New password equals the old one
    #[error("new password must be different from old password")]
    PasswordUnchanged,

    /// Email empty or unchanged
    #[error("invalid email: {0}")]
    InvalidEmail(String),

    /// Deactivate called twice
    #[error("user is already deactivated")]
    AlreadyDeactivated,

    /// Command requires an active user
    #[error("user is not active")]
    NotActive,

    /// Password hashing failed
    #[error("password hashing failed: {0}")]
    Hash(String),
}

impl DomainError {
    /// Check if this is a client error (the caller's fault)
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Hash(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors() {
        assert!(DomainError::InvalidOldPassword.is_client_error());
        assert!(DomainError::AlreadyDeactivated.is_client_error());
        assert!(!DomainError::Hash("boom".to_string()).is_client_error());
    }

    #[test]
    fn test_weak_password_message() {
        let err = DomainError::WeakPassword(6);
        assert!(err.to_string().contains('6'));
    }
}
