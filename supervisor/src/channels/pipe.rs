//! Standard-stream channel
//!
//! Messages travel as newline-delimited JSON over the worker's stdin
//! (supervisor to worker) and stdout (worker to supervisor). The channel is
//! bound to the child at every spawn through [`Channel::attach`]; until then
//! `send` reports no peer and `receive` times out empty. Stdout lines that
//! do not look like a JSON object are treated as worker log output.

use async_trait::async_trait;
use shared::{process_debug, ChannelKind, Message, DEFAULT_MAX_PAYLOAD_BYTES};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::sync::Mutex;

use super::{line_limit, LineReader};
use crate::error::{SupervisorError, SupervisorResult};
use crate::traits::Channel;

pub struct PipeChannel {
    owner: String,
    writer: Mutex<Option<ChildStdin>>,
    reader: Mutex<LineReader<ChildStdout>>,
    closed: AtomicBool,
}

impl PipeChannel {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            writer: Mutex::new(None),
            reader: Mutex::new(LineReader::detached(line_limit(DEFAULT_MAX_PAYLOAD_BYTES))),
            closed: AtomicBool::new(false),
        }
    }

    /// Whether a child's streams are currently bound
    pub async fn is_attached(&self) -> bool {
        self.writer.lock().await.is_some()
    }

    /// Configure the largest payload an inbound line may carry (fluent API)
    pub fn with_max_payload_bytes(mut self, max_payload_bytes: usize) -> Self {
        self.reader = Mutex::new(LineReader::detached(line_limit(max_payload_bytes)));
        self
    }

    fn ensure_open(&self) -> SupervisorResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SupervisorError::ChannelClosed { kind: ChannelKind::Pipe });
        }
        Ok(())
    }
}

#[async_trait]
impl Channel for PipeChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Pipe
    }

    async fn initialize(&self) -> SupervisorResult<()> {
        self.ensure_open()
    }

    async fn send(&self, message: &Message) -> SupervisorResult<()> {
        self.ensure_open()?;
        let mut line = message.to_json()?;
        line.push('\n');

        let mut writer = self.writer.lock().await;
        let stdin = writer
            .as_mut()
            .ok_or(SupervisorError::ChannelNotConnected { kind: ChannelKind::Pipe })?;

        let written = async {
            stdin.write_all(line.as_bytes()).await?;
            stdin.flush().await
        }
        .await;

        if let Err(e) = written {
            // Broken pipe: the worker is gone until the next attach
            *writer = None;
            return Err(SupervisorError::channel(ChannelKind::Pipe, e));
        }
        Ok(())
    }

    async fn receive(&self, timeout: Duration) -> SupervisorResult<Option<Message>> {
        self.ensure_open()?;
        let mut reader = self.reader.lock().await;
        let Some(line) = reader.next_line(timeout).await.map_err(|e| SupervisorError::channel(ChannelKind::Pipe, e))?
        else {
            return Ok(None);
        };

        if !line.starts_with('{') {
            process_debug!(self.owner, "stdout: {}", line);
            return Ok(None);
        }
        Ok(Some(Message::from_json(&line)?))
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        // Dropping stdin delivers EOF to the worker
        self.writer.lock().await.take();
        self.reader.lock().await.detach();
    }

    fn child_env(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    fn wants_stdio(&self) -> bool {
        true
    }

    async fn attach(&self, child: &mut Child) -> SupervisorResult<()> {
        self.ensure_open()?;
        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(SupervisorError::ChannelNotConnected { kind: ChannelKind::Pipe });
        };

        *self.writer.lock().await = Some(stdin);
        self.reader.lock().await.attach(BufReader::new(stdout));
        process_debug!(self.owner, "🔌 Pipe channel attached to child streams");
        Ok(())
    }
}
