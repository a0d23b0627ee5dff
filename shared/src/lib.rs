//! Shared types for the process supervisor
//!
//! Contains the wire-level message envelope and the small set of types that
//! both the supervisor and its worker processes need to agree on. Worker
//! implementations depend on this crate alone to speak the protocol.

pub mod errors;
pub mod logging;
pub mod messages;
pub mod types;

pub use errors::*;
pub use types::*;

pub use messages::{Message, MessageKind, DEFAULT_MAX_PAYLOAD_BYTES};
