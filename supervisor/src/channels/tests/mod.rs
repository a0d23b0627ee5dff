//! Transport-specific tests
//!
//! Each channel has its own test file; the helpers below are shared.

#[cfg(test)]
mod file;

#[cfg(test)]
pub mod common {
    use serde_json::json;
    use shared::Message;
    use std::time::Duration;

    /// Generous receive timeout for tests that expect a message
    pub const RECEIVE_TIMEOUT: Duration = Duration::from_secs(2);

    /// Short timeout for tests that expect nothing
    pub const EMPTY_TIMEOUT: Duration = Duration::from_millis(60);

    pub fn sample_command(target: &str) -> Message {
        Message::command("supervisor", target, "status", json!({ "verbose": true }))
    }
}
