//! Inbound message validation and per-source rate limiting

use serde_json::Value;
use shared::{Message, DEFAULT_MAX_PAYLOAD_BYTES};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;

const RATE_WINDOW: Duration = Duration::from_secs(1);

/// Reason a message was rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Source process is empty")]
    EmptySource,

    #[error("Target process is empty")]
    EmptyTarget,

    #[error("Command is empty")]
    EmptyCommand,

    #[error("Payload of {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("Rate limit exceeded for {sender}")]
    RateLimited { sender: String },
}

pub struct MessageValidator {
    max_payload_bytes: usize,
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl Default for MessageValidator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PAYLOAD_BYTES)
    }
}

impl MessageValidator {
    pub fn new(max_payload_bytes: usize) -> Self {
        Self {
            max_payload_bytes,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn max_payload_bytes(&self) -> usize {
        self.max_payload_bytes
    }

    /// Check envelope identity fields and payload size
    pub fn validate(&self, message: &Message) -> Result<(), ValidationError> {
        if message.source.is_empty() {
            return Err(ValidationError::EmptySource);
        }
        if message.target.is_empty() {
            return Err(ValidationError::EmptyTarget);
        }
        if message.command.is_empty() {
            return Err(ValidationError::EmptyCommand);
        }

        let size = message.payload_len();
        if size > self.max_payload_bytes {
            return Err(ValidationError::PayloadTooLarge {
                size,
                limit: self.max_payload_bytes,
            });
        }
        Ok(())
    }

    /// Whether the encoded payload fits under the size ceiling
    pub fn is_safe_payload(&self, payload: &Value) -> bool {
        serde_json::to_vec(payload).is_ok_and(|bytes| bytes.len() <= self.max_payload_bytes)
    }

    /// Record one message from `source` if it fits in the sliding one-second window
    ///
    /// Returns `false` (and records nothing) when `source` already sent
    /// `max_per_second` messages within the last second. Windows that have
    /// fully expired are dropped, so idle sources hold no state.
    pub fn check_rate_limit(&self, source: &str, max_per_second: u32) -> bool {
        let now = Instant::now();
        let mut windows = self.windows.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        windows.retain(|_, window| {
            while window.front().is_some_and(|sent| now.duration_since(*sent) >= RATE_WINDOW) {
                window.pop_front();
            }
            !window.is_empty()
        });

        let window = windows.entry(source.to_string()).or_default();
        if window.len() >= max_per_second as usize {
            if window.is_empty() {
                windows.remove(source);
            }
            return false;
        }
        window.push_back(now);
        true
    }

    /// Number of sources with messages inside the current window
    pub fn tracked_sources(&self) -> usize {
        self.windows.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }

    /// Forget every rate-limit window
    pub fn reset_rate_limits(&self) {
        self.windows.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clear();
    }
}
