//! Supervisor-specific error types

use shared::{ChannelKind, ProcessState, SharedError};
use thiserror::Error;

use crate::validator::ValidationError;

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("Process already registered: {name}")]
    RegistrationConflict { name: String },

    #[error("Unknown process: {name}")]
    UnknownProcess { name: String },

    #[error("Dependencies not ready for {name}: waiting on {}", .missing.join(", "))]
    DependencyNotReady { name: String, missing: Vec<String> },

    #[error("Dependency cycle detected: {}", .cycle.join(" -> "))]
    DependencyCycle { cycle: Vec<String> },

    #[error("Failed to spawn process {name}: {reason}")]
    SpawnFailure { name: String, reason: String },

    #[error("Process {name} cannot be started from state {state}")]
    InvalidState { name: String, state: ProcessState },

    #[error("Failed to stop process {name}: {reason}")]
    StopFailure { name: String, reason: String },

    #[error("Channel {kind} is closed")]
    ChannelClosed { kind: ChannelKind },

    #[error("Channel {kind} has no connected peer")]
    ChannelNotConnected { kind: ChannelKind },

    #[error("Channel {kind} failed: {message}")]
    ChannelError { kind: ChannelKind, message: String },

    #[error("No channel accepted the message for {target}")]
    DeliveryFailed { target: String },

    #[error("Invalid message: {0}")]
    Validation(#[from] ValidationError),

    #[error("Supervisor has been shut down")]
    ShutDown,

    #[error("Configuration error: {field}")]
    ConfigurationError { field: String },

    #[error("Shared component error: {0}")]
    SharedError(#[from] SharedError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl SupervisorError {
    pub fn config(field: impl Into<String>) -> Self {
        Self::ConfigurationError { field: field.into() }
    }

    pub fn channel(kind: ChannelKind, message: impl std::fmt::Display) -> Self {
        Self::ChannelError {
            kind,
            message: message.to_string(),
        }
    }

    pub fn unknown(name: impl Into<String>) -> Self {
        Self::UnknownProcess { name: name.into() }
    }
}

pub type SupervisorResult<T> = Result<T, SupervisorError>;
