//! Test fixtures: settings and process configs with test-friendly timings

use std::path::Path;
use std::time::Duration;

use supervisor::{ChannelKind, ProcessConfig, SupervisorSettings};

pub struct TestFixtures;

impl TestFixtures {
    /// Monitor tick used by every test supervisor
    pub const TICK: Duration = Duration::from_millis(20);

    /// Upper bound for waiting on an asynchronous state change
    pub const WAIT: Duration = Duration::from_secs(5);

    pub fn settings(ipc_dir: &Path) -> SupervisorSettings {
        let mut settings = SupervisorSettings::default()
            .with_ipc_dir(ipc_dir)
            .with_monitor_interval(Self::TICK)
            .with_stop_grace(Duration::from_millis(500));
        settings.poll_timeout = Duration::from_millis(20);
        settings.sweep_interval = Duration::from_millis(5);
        settings.file_poll_interval = Duration::from_millis(10);
        settings.restart_pause = Duration::from_millis(10);
        settings
    }

    /// Long-running process that never speaks the protocol
    pub fn sleeper(name: &str) -> ProcessConfig {
        ProcessConfig::new(name, "sleep")
            .with_args(["30"])
            .without_heartbeat()
            .with_restart_policy(true, 3, Duration::from_millis(300))
    }

    /// Process that exits with a failure right after starting
    pub fn failing(name: &str, max_attempts: u32) -> ProcessConfig {
        ProcessConfig::new(name, "sh")
            .with_args(["-c", "exit 3"])
            .without_heartbeat()
            .with_restart_policy(true, max_attempts, Duration::from_millis(20))
    }

    pub fn missing_binary(name: &str) -> ProcessConfig {
        ProcessConfig::new(name, "/nonexistent/supervisor-test-binary").without_heartbeat()
    }

    /// `cat` echoes every line it is sent over the pipe channel
    pub fn echo(name: &str) -> ProcessConfig {
        ProcessConfig::new(name, "cat").with_channel(ChannelKind::Pipe).without_heartbeat()
    }

    /// Shell worker running `script` with the file channel's env in scope
    pub fn file_worker(name: &str, script: &str) -> ProcessConfig {
        ProcessConfig::new(name, "sh")
            .with_args(["-c", script])
            .with_channel(ChannelKind::File)
            .without_heartbeat()
    }

    /// Process that is only ever registered, never spawned
    pub fn placeholder(name: &str) -> ProcessConfig {
        ProcessConfig::new(name, "/bin/true").without_heartbeat()
    }
}
