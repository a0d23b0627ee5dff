//! Shared error types for the supervisor wire protocol

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SharedError {
    #[error("Serialization failed: {message}")]
    SerializationError { message: String },

    #[error("Deserialization failed: {message}")]
    DeserializationError { message: String },

    #[error("Unknown message type: {value}")]
    InvalidMessageKind { value: u8 },

    #[error("Unknown channel kind: {input}")]
    InvalidChannelKind { input: String },

    #[error("Message protocol error: {message}")]
    ProtocolError { message: String },
}

impl SharedError {
    pub fn serialization(err: impl std::fmt::Display) -> Self {
        Self::SerializationError {
            message: err.to_string(),
        }
    }

    pub fn deserialization(err: impl std::fmt::Display) -> Self {
        Self::DeserializationError {
            message: err.to_string(),
        }
    }
}

pub type SharedResult<T> = Result<T, SharedError>;
