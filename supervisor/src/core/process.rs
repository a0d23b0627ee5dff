//! Process records and OS process handles

use chrono::{DateTime, Utc};
use shared::{ProcessState, ENV_PROCESS_NAME};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};
use tokio::sync::watch;

use crate::config::ProcessConfig;
use crate::core::health::ProcessSnapshot;
use crate::error::{SupervisorError, SupervisorResult};

/// How long to wait for the OS to reap a killed child
const REAP_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of terminating a child
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Exited within the grace period
    Graceful,
    /// Had to be killed (or had already exited)
    Killed,
    /// Kill was sent but the child was never reaped
    Unreaped,
}

/// Exclusively owned OS child process
///
/// Dropping the handle kills the child; tokio reaps it in the background.
pub struct ProcessHandle {
    child: Child,
    pid: u32,
}

impl ProcessHandle {
    /// Spawn the configured executable
    ///
    /// Environment precedence, lowest first: the supervisor's own
    /// environment, `channel_env`, then the config's `env_vars`.
    pub fn spawn(config: &ProcessConfig, channel_env: Vec<(String, String)>, piped: bool) -> SupervisorResult<Self> {
        let mut cmd = Command::new(&config.executable_path);
        cmd.args(&config.args)
            .env(ENV_PROCESS_NAME, &config.name)
            .envs(channel_env)
            .envs(&config.env_vars)
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        if piped {
            cmd.stdin(Stdio::piped()).stdout(Stdio::piped());
        } else {
            cmd.stdin(Stdio::null());
        }

        let child = cmd.spawn().map_err(|e| SupervisorError::SpawnFailure {
            name: config.name.clone(),
            reason: format!("{}: {e}", config.executable_path.display()),
        })?;
        let pid = child.id().unwrap_or_default();

        Ok(Self { child, pid })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn child_mut(&mut self) -> &mut Child {
        &mut self.child
    }

    /// Non-blocking liveness check
    pub fn poll_exit(&mut self) -> std::io::Result<Option<ExitStatus>> {
        self.child.try_wait()
    }

    /// Stop the child, politely unless `force` is set
    ///
    /// A graceful stop signals termination and waits up to `grace` before
    /// killing.
    pub async fn terminate(mut self, grace: Duration, force: bool) -> StopOutcome {
        if !force && self.request_termination() {
            if let Ok(Ok(_)) = tokio::time::timeout(grace, self.child.wait()).await {
                return StopOutcome::Graceful;
            }
        }
        self.kill().await
    }

    pub async fn kill(mut self) -> StopOutcome {
        // Fails only when the child already exited; wait() below still reaps it
        let _ = self.child.start_kill();
        match tokio::time::timeout(REAP_TIMEOUT, self.child.wait()).await {
            Ok(Ok(_)) => StopOutcome::Killed,
            _ => StopOutcome::Unreaped,
        }
    }

    #[cfg(unix)]
    fn request_termination(&self) -> bool {
        use nix::sys::signal::{self, Signal};
        use nix::unistd::Pid;

        let Some(pid) = self.child.id().and_then(|pid| i32::try_from(pid).ok()) else {
            return false;
        };
        signal::kill(Pid::from_raw(pid), Signal::SIGTERM).is_ok()
    }

    #[cfg(not(unix))]
    fn request_termination(&self) -> bool {
        false
    }
}

/// Mutable runtime record of one managed process
///
/// Only the supervisor touches it, always under the registry lock.
pub struct ProcessInfo {
    pub config: ProcessConfig,
    pub state: ProcessState,
    pub handle: Option<ProcessHandle>,
    pub pid: Option<u32>,
    pub start_time: Option<DateTime<Utc>>,
    pub last_heartbeat: Option<Instant>,
    pub restart_count: u32,
    pub last_error: Option<String>,
    /// Bumped on every launch so monitors of earlier incarnations retire
    pub epoch: u64,
    /// Closes when the stop in progress finishes
    pub stop_done: Option<watch::Receiver<()>>,
}

impl ProcessInfo {
    pub fn new(config: ProcessConfig) -> Self {
        Self {
            config,
            state: ProcessState::Created,
            handle: None,
            pid: None,
            start_time: None,
            last_heartbeat: None,
            restart_count: 0,
            last_error: None,
            epoch: 0,
            stop_done: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn mark_running(&mut self, handle: ProcessHandle) {
        self.pid = Some(handle.pid());
        self.handle = Some(handle);
        self.state = ProcessState::Running;
        self.start_time = Some(Utc::now());
        self.last_heartbeat = Some(Instant::now());
    }

    /// Record a crash and release the OS handle to the caller
    pub fn mark_crashed(&mut self, reason: impl Into<String>) -> Option<ProcessHandle> {
        self.state = ProcessState::Crashed;
        self.last_error = Some(reason.into());
        self.pid = None;
        self.handle.take()
    }

    pub fn mark_stopped(&mut self, outcome: StopOutcome) {
        self.state = match outcome {
            StopOutcome::Unreaped => ProcessState::Zombie,
            StopOutcome::Graceful | StopOutcome::Killed => ProcessState::Stopped,
        };
        self.pid = None;
        self.handle = None;
        self.stop_done = None;
    }

    /// Record that the child of a crashed incarnation could not be reaped
    ///
    /// Only applies while the record still belongs to `epoch`; returns
    /// whether it did.
    pub fn mark_unreaped(&mut self, epoch: u64) -> bool {
        if self.epoch != epoch || self.state != ProcessState::Crashed {
            return false;
        }
        self.state = ProcessState::Zombie;
        self.last_error = Some("process could not be reaped after it was killed".to_string());
        true
    }

    /// Time since the last heartbeat when it exceeds the configured timeout
    pub fn heartbeat_overdue(&self, now: Instant) -> Option<Duration> {
        let silent_for = now.saturating_duration_since(self.last_heartbeat?);
        (silent_for > self.config.heartbeat_timeout).then_some(silent_for)
    }

    pub fn can_auto_restart(&self) -> bool {
        self.config.auto_restart && self.restart_count < self.config.max_restart_attempts
    }

    pub fn restart_budget_exhausted(&self) -> bool {
        self.state == ProcessState::Crashed
            && self.config.auto_restart
            && self.restart_count >= self.config.max_restart_attempts
    }

    pub fn snapshot(&self) -> ProcessSnapshot {
        let now = Instant::now();
        ProcessSnapshot {
            name: self.config.name.clone(),
            state: self.state,
            pid: self.pid,
            restart_count: self.restart_count,
            max_restart_attempts: self.config.max_restart_attempts,
            start_time: self.start_time,
            uptime: self
                .start_time
                .filter(|_| self.state == ProcessState::Running)
                .and_then(|started| (Utc::now() - started).to_std().ok()),
            since_heartbeat: self.last_heartbeat.map(|seen| now.saturating_duration_since(seen)),
            last_error: self.last_error.clone(),
            restart_budget_exhausted: self.restart_budget_exhausted(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> ProcessInfo {
        ProcessInfo::new(
            ProcessConfig::new("worker", "/bin/true")
                .with_restart_policy(true, 2, Duration::from_millis(10))
                .with_heartbeat(Duration::from_millis(10), Duration::from_millis(50)),
        )
    }

    #[test]
    fn test_new_record_is_created() {
        let info = info();
        assert_eq!(info.state, ProcessState::Created);
        assert!(info.pid.is_none());
        assert_eq!(info.restart_count, 0);
        assert!(info.can_auto_restart());
    }

    #[test]
    fn test_restart_budget() {
        let mut info = info();
        info.mark_crashed("boom");
        assert!(!info.restart_budget_exhausted());

        info.restart_count = 2;
        assert!(!info.can_auto_restart());
        assert!(info.restart_budget_exhausted());
        assert_eq!(info.last_error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_heartbeat_overdue() {
        let mut info = info();
        let now = Instant::now();
        assert_eq!(info.heartbeat_overdue(now), None);

        info.last_heartbeat = Some(now);
        assert_eq!(info.heartbeat_overdue(now + Duration::from_millis(20)), None);
        assert!(info.heartbeat_overdue(now + Duration::from_millis(80)).is_some());
    }

    #[test]
    fn test_unreaped_stop_is_zombie() {
        let mut info = info();
        info.mark_stopped(StopOutcome::Unreaped);
        assert_eq!(info.state, ProcessState::Zombie);

        info.mark_stopped(StopOutcome::Graceful);
        assert_eq!(info.state, ProcessState::Stopped);
    }

    #[test]
    fn test_unreaped_crash_becomes_zombie() {
        let mut info = info();
        info.epoch = 3;
        info.mark_crashed("heartbeat timeout after 200ms");

        // A later incarnation owns the record
        assert!(!info.mark_unreaped(2));
        assert_eq!(info.state, ProcessState::Crashed);

        assert!(info.mark_unreaped(3));
        assert_eq!(info.state, ProcessState::Zombie);
        assert!(info.last_error.as_deref().is_some_and(|e| e.contains("could not be reaped")));
        assert!(!info.state.is_startable());
    }

    #[tokio::test]
    async fn test_spawn_failure_names_executable() {
        let config = ProcessConfig::new("ghost", "/definitely/not/here");
        let err = ProcessHandle::spawn(&config, Vec::new(), false).err().unwrap();

        assert!(matches!(err, SupervisorError::SpawnFailure { ref name, .. } if name == "ghost"));
        assert!(err.to_string().contains("/definitely/not/here"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_graceful_terminate() {
        let config = ProcessConfig::new("sleeper", "sleep").with_args(["30"]);
        let mut handle = ProcessHandle::spawn(&config, Vec::new(), false).unwrap();

        assert!(handle.pid() > 0);
        assert!(handle.poll_exit().unwrap().is_none());
        assert_eq!(handle.terminate(Duration::from_secs(2), false).await, StopOutcome::Graceful);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_forced_terminate() {
        let config = ProcessConfig::new("sleeper", "sleep").with_args(["30"]);
        let handle = ProcessHandle::spawn(&config, Vec::new(), false).unwrap();

        assert_eq!(handle.terminate(Duration::from_secs(2), true).await, StopOutcome::Killed);
    }
}
