//! Process supervisor library
//!
//! Launches a set of worker executables, keeps them alive according to a
//! restart policy, starts them in dependency order and exchanges JSON
//! messages with them over file, standard-stream and named local-socket
//! transports. Inbound messages are validated and routed to handlers by
//! command name.

pub mod channels;
pub mod config;
pub mod core;
pub mod error;
pub mod handlers;
pub mod router;
pub mod supervisor;
pub mod traits;
pub mod validator;

// Re-export commonly used types
pub use channels::{FileChannel, NamedChannel, PipeChannel, TransportFactory};
pub use config::{Manifest, ProcessConfig, SupervisorSettings};
pub use core::{BlockedProcess, HealthIssue, HealthReport, ProcessSnapshot, StartupReport};
pub use error::{SupervisorError, SupervisorResult};
pub use router::MessageRouter;
pub use supervisor::Supervisor;
pub use traits::{Channel, ChannelFactory};
pub use validator::{MessageValidator, ValidationError};

pub use shared::{ChannelKind, Message, MessageKind, ProcessState};
