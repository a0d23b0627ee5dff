//! File-exchange channel
//!
//! The supervisor writes one JSON command to `<path>` (overwriting any
//! pending command) and polls `<path>.response` for the worker's reply.
//! A response file is consumed (deleted) once read. Replies that are not a
//! full message envelope, e.g. `{"success": true}`, are wrapped into a
//! response message whose `data` is the raw object.

use async_trait::async_trait;
use serde_json::Value;
use shared::{process_debug, ChannelKind, Message, MessageKind, SharedError, ENV_IPC_FILE};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::process::Child;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::{SupervisorError, SupervisorResult};
use crate::traits::Channel;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

pub struct FileChannel {
    owner: String,
    supervisor: String,
    command_path: PathBuf,
    response_path: PathBuf,
    poll_interval: Duration,
    write_lock: Mutex<()>,
    closed: AtomicBool,
}

impl FileChannel {
    pub fn new(command_path: impl Into<PathBuf>, owner: impl Into<String>, supervisor: impl Into<String>) -> Self {
        let command_path = command_path.into();
        let response_path = response_path_for(&command_path);
        Self {
            owner: owner.into(),
            supervisor: supervisor.into(),
            command_path,
            response_path,
            poll_interval: DEFAULT_POLL_INTERVAL,
            write_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
        }
    }

    /// Configure the response poll interval (fluent API)
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval.max(Duration::from_millis(1));
        self
    }

    pub fn command_path(&self) -> &Path {
        &self.command_path
    }

    pub fn response_path(&self) -> &Path {
        &self.response_path
    }

    fn ensure_open(&self) -> SupervisorResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SupervisorError::ChannelClosed { kind: ChannelKind::File });
        }
        Ok(())
    }

    /// Consume the response file if the worker has written one
    async fn take_response(&self) -> SupervisorResult<Option<String>> {
        match tokio::fs::read_to_string(&self.response_path).await {
            // Empty file: the worker has created it but not written yet
            Ok(contents) if contents.trim().is_empty() => Ok(None),
            Ok(contents) => {
                if let Err(e) = tokio::fs::remove_file(&self.response_path).await {
                    if e.kind() != ErrorKind::NotFound {
                        return Err(SupervisorError::channel(ChannelKind::File, e));
                    }
                }
                Ok(Some(contents))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SupervisorError::channel(ChannelKind::File, e)),
        }
    }

    fn decode(&self, contents: &str) -> SupervisorResult<Message> {
        let value: Value = serde_json::from_str(contents.trim()).map_err(SharedError::deserialization)?;
        let is_envelope = value.as_object().is_some_and(|object| object.contains_key("type"));
        if is_envelope {
            return Ok(Message::from_value(value)?);
        }
        Ok(Message::new(MessageKind::Response, self.owner.as_str(), self.supervisor.as_str(), "response").with_data(value))
    }
}

fn response_path_for(command_path: &Path) -> PathBuf {
    let mut raw = command_path.as_os_str().to_owned();
    raw.push(".response");
    PathBuf::from(raw)
}

async fn remove_if_present(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

#[async_trait]
impl Channel for FileChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::File
    }

    async fn initialize(&self) -> SupervisorResult<()> {
        self.ensure_open()?;
        if let Some(parent) = self.command_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SupervisorError::channel(ChannelKind::File, format!("{}: {e}", parent.display())))?;
        }
        process_debug!(self.owner, "📁 File channel ready at {}", self.command_path.display());
        Ok(())
    }

    async fn send(&self, message: &Message) -> SupervisorResult<()> {
        self.ensure_open()?;
        let json = message.to_json()?;
        let _guard = self.write_lock.lock().await;

        // Write then rename so a polling worker never sees a partial command
        let mut staging = self.command_path.as_os_str().to_owned();
        staging.push(".tmp");
        let staging = PathBuf::from(staging);
        tokio::fs::write(&staging, json.as_bytes())
            .await
            .map_err(|e| SupervisorError::channel(ChannelKind::File, e))?;
        tokio::fs::rename(&staging, &self.command_path)
            .await
            .map_err(|e| SupervisorError::channel(ChannelKind::File, e))?;
        Ok(())
    }

    async fn receive(&self, timeout: Duration) -> SupervisorResult<Option<Message>> {
        let deadline = Instant::now() + timeout;
        loop {
            self.ensure_open()?;
            if let Some(contents) = self.take_response().await? {
                return self.decode(&contents).map(Some);
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _guard = self.write_lock.lock().await;
        for path in [&self.command_path, &self.response_path] {
            if let Err(e) = remove_if_present(path).await {
                process_debug!(self.owner, "Could not remove {}: {}", path.display(), e);
            }
        }
    }

    fn child_env(&self) -> Vec<(String, String)> {
        vec![(ENV_IPC_FILE.to_string(), self.command_path.display().to_string())]
    }

    fn wants_stdio(&self) -> bool {
        false
    }

    async fn attach(&self, _child: &mut Child) -> SupervisorResult<()> {
        self.ensure_open()
    }
}
