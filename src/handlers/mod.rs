//! Command Handlers module
//!
//! CQRS write side: command definitions and the service that validates
//! them against the aggregate and hands the results to the event log.

mod commands;
mod service;

pub use commands::{
    ChangeEmailCommand, ChangePasswordCommand, DeactivateUserCommand, RecordLoginCommand,
    RegisterUserCommand,
};
pub use service::CommandService;
