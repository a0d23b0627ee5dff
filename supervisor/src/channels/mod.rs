//! Channel implementations
//!
//! This module contains the concrete transports behind the [`Channel`]
//! trait and the factory the supervisor uses to build them:
//! - `file`: JSON command/response files polled on disk
//! - `pipe`: newline-delimited JSON over the child's stdin/stdout
//! - `named`: newline-delimited JSON over a local socket / named pipe

pub mod file;
pub mod named;
pub mod pipe;

#[cfg(test)]
mod tests;

use shared::ChannelKind;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::time::Instant;

use crate::config::SupervisorSettings;
use crate::traits::{Channel, ChannelFactory};

pub use file::FileChannel;
pub use named::NamedChannel;
pub use pipe::PipeChannel;

/// Production factory mapping each transport kind to its channel
#[derive(Debug, Default, Clone, Copy)]
pub struct TransportFactory;

impl ChannelFactory for TransportFactory {
    fn create(&self, kind: ChannelKind, process: &str, settings: &SupervisorSettings) -> Arc<dyn Channel> {
        match kind {
            ChannelKind::File => Arc::new(
                FileChannel::new(settings.command_file_for(process), process, &settings.supervisor_name)
                    .with_poll_interval(settings.file_poll_interval),
            ),
            ChannelKind::Pipe => {
                Arc::new(PipeChannel::new(process).with_max_payload_bytes(settings.max_payload_bytes))
            }
            ChannelKind::Named => Arc::new(
                NamedChannel::new(settings.socket_name_for(process), process)
                    .with_max_payload_bytes(settings.max_payload_bytes),
            ),
        }
    }
}

/// Order in which outbound delivery tries a process's channels
pub(crate) fn delivery_rank(kind: ChannelKind) -> u8 {
    match kind {
        ChannelKind::Named => 0,
        ChannelKind::Pipe => 1,
        ChannelKind::File => 2,
    }
}

/// Room a line may take beyond its payload for the envelope fields
const ENVELOPE_OVERHEAD: usize = 64 * 1024;

/// Longest accepted line for a given payload ceiling
pub(crate) fn line_limit(max_payload_bytes: usize) -> usize {
    max_payload_bytes.saturating_add(ENVELOPE_OVERHEAD)
}

/// Newline framing over an async byte stream that survives timeouts
///
/// Bytes of a partially received line stay in `pending` when a read is
/// cut short (`read_until` is cancel safe), so the next call resumes the
/// same line. `pending` never grows past `max_line + 1` bytes: a longer
/// line is reported once as `InvalidData` and its remainder is skipped up
/// to the next newline.
pub(crate) struct LineReader<R> {
    stream: Option<BufReader<R>>,
    pending: Vec<u8>,
    max_line: usize,
    discarding: bool,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub(crate) fn detached(max_line: usize) -> Self {
        Self {
            stream: None,
            pending: Vec::new(),
            max_line,
            discarding: false,
        }
    }

    pub(crate) fn attach(&mut self, stream: BufReader<R>) {
        self.stream = Some(stream);
        self.pending.clear();
        self.discarding = false;
    }

    pub(crate) fn detach(&mut self) {
        self.stream = None;
        self.pending.clear();
        self.discarding = false;
    }

    pub(crate) fn is_attached(&self) -> bool {
        self.stream.is_some()
    }

    /// Next non-empty line without its terminator
    ///
    /// Returns `Ok(None)` on timeout, when detached, or at end of stream
    /// (which also detaches the reader). A line that is not UTF-8 or is
    /// longer than `max_line` is discarded with an `InvalidData` error.
    pub(crate) async fn next_line(&mut self, timeout: Duration) -> io::Result<Option<String>> {
        let deadline = Instant::now() + timeout;
        loop {
            let Some(stream) = self.stream.as_mut() else {
                return Ok(None);
            };

            let budget = self.max_line.saturating_add(1).saturating_sub(self.pending.len()) as u64;
            let mut bounded = AsyncReadExt::take(&mut *stream, budget);
            let read = tokio::time::timeout_at(deadline, bounded.read_until(b'\n', &mut self.pending)).await;

            let read = match read {
                Err(_elapsed) => return Ok(None),
                Ok(Err(e)) => {
                    self.detach();
                    return Err(e);
                }
                Ok(Ok(read)) => read,
            };

            let complete = self.pending.last() == Some(&b'\n');
            if !complete && self.pending.len() > self.max_line {
                self.pending.clear();
                if self.discarding {
                    continue;
                }
                self.discarding = true;
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("line exceeds {} bytes", self.max_line),
                ));
            }
            if !complete && read == 0 {
                self.detach();
                return Ok(None);
            }

            let bytes = std::mem::take(&mut self.pending);
            if self.discarding {
                // Tail of an oversized line
                self.discarding = false;
                continue;
            }
            let line = String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            let line = line.trim();
            return Ok((!line.is_empty()).then(|| line.to_string()));
        }
    }
}
