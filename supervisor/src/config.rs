//! Process and supervisor configuration
//!
//! [`ProcessConfig`] is the immutable description of one managed process and
//! [`SupervisorSettings`] tunes the supervisor itself. Both can be built in
//! code or loaded from a TOML [`Manifest`]:
//!
//! ```toml
//! [supervisor]
//! ipc_dir = "./ipc"
//!
//! [[process]]
//! name = "base"
//! executable_path = "./base-worker"
//! comm_methods = ["file", "pipe"]
//!
//! [[process]]
//! name = "integration"
//! executable_path = "./integration-worker"
//! max_restart_attempts = 5
//! heartbeat_interval = 10
//! depends_on = ["base"]
//! ```
//!
//! Durations are expressed in (fractional) seconds.

use serde::{Deserialize, Serialize};
use shared::{ChannelKind, DEFAULT_MAX_PAYLOAD_BYTES};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{SupervisorError, SupervisorResult};

/// Immutable description of a managed process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ProcessConfig {
    /// Unique key within the supervisor
    pub name: String,
    pub executable_path: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment overrides applied on top of the supervisor's environment
    #[serde(default)]
    pub env_vars: BTreeMap<String, String>,
    /// Requested transports; one channel is created per kind
    #[serde(default)]
    pub comm_methods: BTreeSet<ChannelKind>,

    #[serde(default = "default_true")]
    pub auto_restart: bool,
    #[serde(default = "default_max_restart_attempts")]
    pub max_restart_attempts: u32,
    #[serde(default = "default_restart_delay", with = "duration_secs")]
    pub restart_delay: Duration,

    #[serde(default = "default_true")]
    pub enable_heartbeat: bool,
    #[serde(default = "default_heartbeat_interval", with = "duration_secs")]
    pub heartbeat_interval: Duration,
    #[serde(default = "default_heartbeat_timeout", with = "duration_secs")]
    pub heartbeat_timeout: Duration,

    /// Processes that must be RUNNING before this one may start
    #[serde(default)]
    pub depends_on: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_max_restart_attempts() -> u32 {
    3
}

fn default_restart_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_heartbeat_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_heartbeat_timeout() -> Duration {
    Duration::from_secs(15)
}

impl ProcessConfig {
    /// Create a config with the default restart and heartbeat policies
    pub fn new(name: impl Into<String>, executable_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            executable_path: executable_path.into(),
            args: Vec::new(),
            env_vars: BTreeMap::new(),
            comm_methods: BTreeSet::new(),
            auto_restart: true,
            max_restart_attempts: default_max_restart_attempts(),
            restart_delay: default_restart_delay(),
            enable_heartbeat: true,
            heartbeat_interval: default_heartbeat_interval(),
            heartbeat_timeout: default_heartbeat_timeout(),
            depends_on: Vec::new(),
        }
    }

    /// Set the argument list (fluent API)
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Add an environment override (fluent API)
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.insert(key.into(), value.into());
        self
    }

    /// Request a transport (fluent API)
    pub fn with_channel(mut self, kind: ChannelKind) -> Self {
        self.comm_methods.insert(kind);
        self
    }

    /// Configure the restart policy (fluent API)
    pub fn with_restart_policy(mut self, auto_restart: bool, max_attempts: u32, delay: Duration) -> Self {
        self.auto_restart = auto_restart;
        self.max_restart_attempts = max_attempts;
        self.restart_delay = delay;
        self
    }

    /// Configure the heartbeat policy (fluent API)
    pub fn with_heartbeat(mut self, interval: Duration, timeout: Duration) -> Self {
        self.enable_heartbeat = true;
        self.heartbeat_interval = interval;
        self.heartbeat_timeout = timeout;
        self
    }

    /// Disable heartbeat supervision; only liveness is checked (fluent API)
    pub fn without_heartbeat(mut self) -> Self {
        self.enable_heartbeat = false;
        self
    }

    /// Add a start-up dependency (fluent API)
    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.depends_on.push(name.into());
        self
    }

    /// Reject configs that can never be spawned
    pub fn validate(&self) -> SupervisorResult<()> {
        if self.name.trim().is_empty() {
            return Err(SupervisorError::config("process name must not be empty"));
        }
        if self.executable_path.as_os_str().is_empty() {
            return Err(SupervisorError::config(format!(
                "process {} has an empty executable_path",
                self.name
            )));
        }
        Ok(())
    }
}

/// Tuning knobs of the supervisor itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct SupervisorSettings {
    /// Name used as `source` of messages the supervisor originates
    pub supervisor_name: String,
    /// Directory holding file-exchange command/response files
    pub ipc_dir: PathBuf,
    /// Monitor tick
    #[serde(with = "duration_secs")]
    pub monitor_interval: Duration,
    /// Receive timeout used for each channel during a sweep
    #[serde(with = "duration_secs")]
    pub poll_timeout: Duration,
    /// Pause between two full channel sweeps
    #[serde(with = "duration_secs")]
    pub sweep_interval: Duration,
    /// Poll interval of file-exchange channels
    #[serde(with = "duration_secs")]
    pub file_poll_interval: Duration,
    /// How long a graceful stop waits before killing
    #[serde(with = "duration_secs")]
    pub stop_grace: Duration,
    /// Pause between stop and start in a manual restart
    #[serde(with = "duration_secs")]
    pub restart_pause: Duration,
    pub max_payload_bytes: usize,
    /// Per-source inbound rate limit; unlimited when absent
    pub max_messages_per_second: Option<u32>,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            supervisor_name: shared::logging::SUPERVISOR_TAG.to_string(),
            ipc_dir: PathBuf::from("./ipc"),
            monitor_interval: Duration::from_secs(1),
            poll_timeout: Duration::from_millis(100),
            sweep_interval: Duration::from_millis(10),
            file_poll_interval: Duration::from_millis(50),
            stop_grace: Duration::from_secs(2),
            restart_pause: Duration::from_millis(500),
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            max_messages_per_second: None,
        }
    }
}

impl SupervisorSettings {
    /// Configure the IPC directory (fluent API)
    pub fn with_ipc_dir(mut self, ipc_dir: impl Into<PathBuf>) -> Self {
        self.ipc_dir = ipc_dir.into();
        self
    }

    /// Configure the monitor tick (fluent API)
    pub fn with_monitor_interval(mut self, interval: Duration) -> Self {
        self.monitor_interval = interval;
        self
    }

    /// Configure the graceful stop window (fluent API)
    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    /// Configure the inbound rate limit (fluent API)
    pub fn with_rate_limit(mut self, max_per_second: Option<u32>) -> Self {
        self.max_messages_per_second = max_per_second;
        self
    }

    /// Command file of the file-exchange channel for `process`
    pub fn command_file_for(&self, process: &str) -> PathBuf {
        self.ipc_dir.join(format!("ipc_{process}.json"))
    }

    /// Local socket name of the named channel for `process`
    ///
    /// Includes the supervisor pid so two supervisors on one host never collide.
    pub fn socket_name_for(&self, process: &str) -> String {
        format!("{}-{}-{}.sock", self.supervisor_name, std::process::id(), process)
    }
}

/// On-disk description of a supervisor and the processes it manages
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub supervisor: SupervisorSettings,
    #[serde(default, rename = "process")]
    pub processes: Vec<ProcessConfig>,
}

impl Manifest {
    pub fn from_toml_str(contents: &str) -> SupervisorResult<Self> {
        let manifest: Manifest =
            toml::from_str(contents).map_err(|e| SupervisorError::config(format!("invalid manifest: {e}")))?;
        for process in &manifest.processes {
            process.validate()?;
        }
        Ok(manifest)
    }

    pub fn load(path: &Path) -> SupervisorResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }
}

/// Serde adapter storing a `Duration` as fractional seconds
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs)
            .map_err(|e| serde::de::Error::custom(format!("invalid duration: {secs} seconds ({e})")))
    }
}
