//! Named local-socket channel
//!
//! The supervisor listens on a namespaced local socket (a named pipe on
//! Windows, an abstract or `/tmp` socket on Unix) whose name the worker
//! learns from `SUPERVISOR_PIPE_NAME`. One peer is served at a time; it is
//! accepted lazily inside `receive` and replaced when it disconnects.
//! Framing is newline-delimited JSON in both directions.

use async_trait::async_trait;
use interprocess::local_socket::tokio::{prelude::*, Listener, RecvHalf, SendHalf};
use interprocess::local_socket::{GenericNamespaced, ListenerOptions};
use shared::{process_debug, process_info, ChannelKind, Message, DEFAULT_MAX_PAYLOAD_BYTES, ENV_PIPE_NAME};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::process::Child;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{line_limit, LineReader};
use crate::error::{SupervisorError, SupervisorResult};
use crate::traits::Channel;

pub struct NamedChannel {
    name: String,
    owner: String,
    listener: Mutex<Option<Listener>>,
    writer: Mutex<Option<SendHalf>>,
    reader: Mutex<LineReader<RecvHalf>>,
    closed: AtomicBool,
}

impl NamedChannel {
    pub fn new(name: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner: owner.into(),
            listener: Mutex::new(None),
            writer: Mutex::new(None),
            reader: Mutex::new(LineReader::detached(line_limit(DEFAULT_MAX_PAYLOAD_BYTES))),
            closed: AtomicBool::new(false),
        }
    }

    /// Socket name workers connect to
    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn is_connected(&self) -> bool {
        self.writer.lock().await.is_some()
    }

    /// Configure the largest payload an inbound line may carry (fluent API)
    pub fn with_max_payload_bytes(mut self, max_payload_bytes: usize) -> Self {
        self.reader = Mutex::new(LineReader::detached(line_limit(max_payload_bytes)));
        self
    }

    fn ensure_open(&self) -> SupervisorResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SupervisorError::ChannelClosed { kind: ChannelKind::Named });
        }
        Ok(())
    }

    /// Wait until `deadline` for a worker to connect
    async fn accept_peer(&self, reader: &mut LineReader<RecvHalf>, deadline: Instant) -> SupervisorResult<bool> {
        let listener = self.listener.lock().await;
        let Some(listener) = listener.as_ref() else {
            return Ok(false);
        };

        let stream = match tokio::time::timeout_at(deadline, listener.accept()).await {
            Err(_elapsed) => return Ok(false),
            Ok(Err(e)) => return Err(SupervisorError::channel(ChannelKind::Named, e)),
            Ok(Ok(stream)) => stream,
        };

        let (recv, send) = stream.split();
        reader.attach(BufReader::new(recv));
        *self.writer.lock().await = Some(send);
        process_info!(self.owner, "🔗 Worker connected on {}", self.name);
        Ok(true)
    }
}

#[async_trait]
impl Channel for NamedChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Named
    }

    async fn initialize(&self) -> SupervisorResult<()> {
        self.ensure_open()?;
        let mut listener = self.listener.lock().await;
        if listener.is_some() {
            return Ok(());
        }

        let socket_name = self
            .name
            .clone()
            .to_ns_name::<GenericNamespaced>()
            .map_err(|e| SupervisorError::channel(ChannelKind::Named, format!("invalid socket name '{}': {e}", self.name)))?;
        let created = ListenerOptions::new()
            .name(socket_name)
            .create_tokio()
            .map_err(|e| SupervisorError::channel(ChannelKind::Named, format!("failed to listen on '{}': {e}", self.name)))?;

        *listener = Some(created);
        process_debug!(self.owner, "📡 Listening on {}", self.name);
        Ok(())
    }

    async fn send(&self, message: &Message) -> SupervisorResult<()> {
        self.ensure_open()?;
        let mut line = message.to_json()?;
        line.push('\n');

        let mut writer = self.writer.lock().await;
        let peer = writer
            .as_mut()
            .ok_or(SupervisorError::ChannelNotConnected { kind: ChannelKind::Named })?;

        let written = async {
            peer.write_all(line.as_bytes()).await?;
            peer.flush().await
        }
        .await;

        if let Err(e) = written {
            *writer = None;
            return Err(SupervisorError::channel(ChannelKind::Named, e));
        }
        Ok(())
    }

    async fn receive(&self, timeout: Duration) -> SupervisorResult<Option<Message>> {
        self.ensure_open()?;
        let deadline = Instant::now() + timeout;
        let mut reader = self.reader.lock().await;

        if !reader.is_attached() && !self.accept_peer(&mut reader, deadline).await? {
            return Ok(None);
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        let line = reader.next_line(remaining).await;

        if !reader.is_attached() {
            // Peer hung up; the next receive accepts a new one
            self.writer.lock().await.take();
            process_debug!(self.owner, "Worker disconnected from {}", self.name);
        }

        match line.map_err(|e| SupervisorError::channel(ChannelKind::Named, e))? {
            Some(line) => Ok(Some(Message::from_json(&line)?)),
            None => Ok(None),
        }
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.writer.lock().await.take();
        self.reader.lock().await.detach();
        self.listener.lock().await.take();
    }

    fn child_env(&self) -> Vec<(String, String)> {
        vec![(ENV_PIPE_NAME.to_string(), self.name.clone())]
    }

    fn wants_stdio(&self) -> bool {
        false
    }

    async fn attach(&self, _child: &mut Child) -> SupervisorResult<()> {
        self.ensure_open()
    }
}
