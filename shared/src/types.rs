//! Core shared types and identifiers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::SharedError;

/// Environment variable carrying the managed process's own name
pub const ENV_PROCESS_NAME: &str = "SUPERVISOR_PROCESS_NAME";

/// Environment variable carrying the command file path of a file-exchange channel
pub const ENV_IPC_FILE: &str = "SUPERVISOR_IPC_FILE";

/// Environment variable carrying the local socket name of a named channel
pub const ENV_PIPE_NAME: &str = "SUPERVISOR_PIPE_NAME";

/// Lifecycle state of a managed process
///
/// `Stopped`, `Crashed` and `Zombie` are terminal unless the supervisor
/// decides to start the process again (restart policy or an explicit start).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessState {
    Created,
    Starting,
    Running,
    Stopping,
    Stopped,
    Crashed,
    Zombie,
}

impl ProcessState {
    /// True while an OS process exists or is being brought up or down
    pub fn is_active(self) -> bool {
        matches!(self, ProcessState::Starting | ProcessState::Running | ProcessState::Stopping)
    }

    /// True for states a process may be (re)started from
    pub fn is_startable(self) -> bool {
        matches!(self, ProcessState::Created | ProcessState::Stopped | ProcessState::Crashed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProcessState::Created => "CREATED",
            ProcessState::Starting => "STARTING",
            ProcessState::Running => "RUNNING",
            ProcessState::Stopping => "STOPPING",
            ProcessState::Stopped => "STOPPED",
            ProcessState::Crashed => "CRASHED",
            ProcessState::Zombie => "ZOMBIE",
        }
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport kinds a process can request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    /// JSON command/response files on disk
    File,
    /// Newline-delimited JSON over the child's stdin/stdout
    #[serde(alias = "stdio")]
    Pipe,
    /// Unix domain socket or Windows named pipe
    Named,
}

impl ChannelKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChannelKind::File => "file",
            ChannelKind::Pipe => "pipe",
            ChannelKind::Named => "named",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelKind {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "file" => Ok(ChannelKind::File),
            "pipe" | "stdio" => Ok(ChannelKind::Pipe),
            "named" => Ok(ChannelKind::Named),
            _ => Err(SharedError::InvalidChannelKind { input: s.to_string() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_state_display() {
        assert_eq!(ProcessState::Created.to_string(), "CREATED");
        assert_eq!(ProcessState::Crashed.to_string(), "CRASHED");
        assert!(ProcessState::Running.is_active());
        assert!(!ProcessState::Crashed.is_active());
        assert!(ProcessState::Crashed.is_startable());
        assert!(!ProcessState::Stopping.is_startable());
    }

    #[test]
    fn test_channel_kind_parsing() {
        assert_eq!("file".parse::<ChannelKind>().unwrap(), ChannelKind::File);
        assert_eq!("STDIO".parse::<ChannelKind>().unwrap(), ChannelKind::Pipe);
        assert!("shared_memory".parse::<ChannelKind>().is_err());

        let json = serde_json::to_string(&ChannelKind::Named).unwrap();
        assert_eq!(json, "\"named\"");
    }

    #[test]
    fn test_channel_kind_deserializes_stdio_alias() {
        let kinds: Vec<ChannelKind> = serde_json::from_str(r#"["stdio", "pipe", "file"]"#).unwrap();
        assert_eq!(kinds, vec![ChannelKind::Pipe, ChannelKind::Pipe, ChannelKind::File]);
        assert_eq!(serde_json::to_string(&ChannelKind::Pipe).unwrap(), "\"pipe\"");
    }
}
