//! Core supervision state
//!
//! Process records, the registry, dependency analysis and health
//! reporting. Nothing here performs channel I/O.

pub mod dependencies;
pub mod health;
pub mod process;
pub mod registry;

pub use dependencies::{find_cycles, BlockedProcess, StartupReport};
pub use health::{HealthIssue, HealthReport, ProcessSnapshot};
pub use process::{ProcessHandle, ProcessInfo, StopOutcome};
pub use registry::Registry;
