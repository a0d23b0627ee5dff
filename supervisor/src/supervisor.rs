//! Main supervisor implementation
//!
//! [`Supervisor`] is a cheap, cloneable handle. All process records and
//! channels live in one [`Registry`] behind a single async lock that is
//! never held across channel I/O or process termination. Each RUNNING
//! process has a monitor task that detects exits and heartbeat timeouts
//! and applies the restart policy.

use shared::{
    logging, process_debug, process_error, process_info, process_warn, ChannelKind, Message, ProcessState,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex, MutexGuard};

use crate::channels::TransportFactory;
use crate::config::{ProcessConfig, SupervisorSettings};
use crate::core::{HealthReport, ProcessHandle, ProcessInfo, ProcessSnapshot, Registry, StartupReport, StopOutcome};
use crate::error::{SupervisorError, SupervisorResult};
use crate::router::MessageRouter;
use crate::traits::{Channel, ChannelFactory};
use crate::validator::{MessageValidator, ValidationError};

/// Process supervisor and message hub
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<SupervisorInner>,
}

struct SupervisorInner {
    settings: SupervisorSettings,
    registry: Mutex<Registry>,
    router: MessageRouter,
    validator: MessageValidator,
    factory: Box<dyn ChannelFactory>,
    /// Cleared by shutdown; monitors and the main loop exit when false
    running: AtomicBool,
    shut_down: AtomicBool,
    health_monitoring: AtomicBool,
}

/// A successful spawn
struct Launched {
    pid: u32,
    epoch: u64,
}

/// What a monitor tick concluded
enum Tick {
    Healthy { probe: Vec<Arc<dyn Channel>> },
    Crashed(CrashOutcome),
    Retire,
}

/// Bookkeeping result of a crash, decided under the registry lock
struct CrashOutcome {
    /// Still-alive child (heartbeat timeout) that must be killed
    handle: Option<ProcessHandle>,
    restart_after: Option<Duration>,
    epoch: u64,
}

impl Supervisor {
    /// Create a supervisor using the real file, pipe and named transports
    pub fn new(settings: SupervisorSettings) -> Self {
        Self::with_factory(settings, TransportFactory)
    }

    /// Create a supervisor with an injected channel factory
    pub fn with_factory(settings: SupervisorSettings, factory: impl ChannelFactory + 'static) -> Self {
        let validator = MessageValidator::new(settings.max_payload_bytes);
        Self {
            inner: Arc::new(SupervisorInner {
                settings,
                registry: Mutex::new(Registry::default()),
                router: MessageRouter::new(),
                validator,
                factory: Box::new(factory),
                running: AtomicBool::new(true),
                shut_down: AtomicBool::new(false),
                health_monitoring: AtomicBool::new(true),
            }),
        }
    }

    pub fn settings(&self) -> &SupervisorSettings {
        &self.inner.settings
    }

    pub fn validator(&self) -> &MessageValidator {
        &self.inner.validator
    }

    /// Whether the supervisor is still accepting work
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        &self.inner.settings.supervisor_name
    }

    async fn registry(&self) -> MutexGuard<'_, Registry> {
        self.inner.registry.lock().await
    }

    fn ensure_not_shut_down(&self) -> SupervisorResult<()> {
        if self.inner.shut_down.load(Ordering::SeqCst) {
            return Err(SupervisorError::ShutDown);
        }
        Ok(())
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Register a process and create one channel per requested transport
    ///
    /// A channel that fails to initialize is logged, recorded as the
    /// process's `last_error` and left out; registration still succeeds.
    pub async fn register(&self, config: ProcessConfig) -> SupervisorResult<()> {
        self.ensure_not_shut_down()?;
        config.validate()?;

        if self.registry().await.contains(&config.name) {
            return Err(SupervisorError::RegistrationConflict { name: config.name });
        }

        let mut channels = Vec::new();
        let mut failures = Vec::new();
        for kind in &config.comm_methods {
            let channel = self.inner.factory.create(*kind, &config.name, &self.inner.settings);
            match channel.initialize().await {
                Ok(()) => channels.push(channel),
                Err(e) => {
                    process_warn!(config.name, "⚠️ {} channel unavailable: {}", kind, e);
                    failures.push(format!("{kind} channel: {e}"));
                    channel.close().await;
                }
            }
        }

        let mut registry = self.registry().await;
        if registry.contains(&config.name) {
            drop(registry);
            close_all(&channels).await;
            return Err(SupervisorError::RegistrationConflict { name: config.name });
        }

        process_info!(config.name, "📝 Registered with {} channel(s)", channels.len());
        let mut info = ProcessInfo::new(config);
        if !failures.is_empty() {
            info.last_error = Some(failures.join("; "));
        }
        registry.insert(info, channels);
        Ok(())
    }

    /// Stop (if needed) and forget a process, closing its channels
    pub async fn unregister(&self, name: &str) -> SupervisorResult<()> {
        let active = self
            .registry()
            .await
            .get(name)
            .map(|info| info.state.is_active())
            .ok_or_else(|| SupervisorError::unknown(name))?;
        if active {
            if let Err(e) = self.stop(name, false).await {
                process_warn!(name, "⚠️ Stop before unregister failed: {}", e);
            }
        }

        let removed = self.registry().await.remove(name);
        let Some((_info, channels)) = removed else {
            return Err(SupervisorError::unknown(name));
        };
        close_all(&channels).await;
        process_info!(name, "🗑️ Unregistered");
        Ok(())
    }

    /// Register a handler for an inbound command name
    pub fn register_handler<F>(&self, command: impl Into<String>, handler: F)
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        self.inner.router.register(command, handler);
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Start one process and its monitor
    ///
    /// # Returns
    /// The OS pid of the new child
    pub async fn start(&self, name: &str) -> SupervisorResult<u32> {
        self.ensure_not_shut_down()?;
        let launched = self.launch(name, None).await?;
        process_info!(name, "🚀 Started (pid {})", launched.pid);
        self.spawn_monitor(name.to_string(), launched.epoch);
        Ok(launched.pid)
    }

    /// Spawn the child without starting a monitor
    ///
    /// With `restart_of` set, only relaunches a CRASHED process whose record
    /// still belongs to that monitor epoch.
    async fn launch(&self, name: &str, restart_of: Option<u64>) -> SupervisorResult<Launched> {
        let (config, channels, epoch) = {
            let mut registry = self.registry().await;
            let info = registry.get(name).ok_or_else(|| SupervisorError::unknown(name))?;

            let startable = match restart_of {
                Some(epoch) => info.state == ProcessState::Crashed && info.epoch == epoch,
                None => info.state.is_startable(),
            };
            if !startable {
                return Err(SupervisorError::InvalidState {
                    name: name.to_string(),
                    state: info.state,
                });
            }

            let missing = registry.missing_dependencies(&info.config);
            if !missing.is_empty() {
                return Err(SupervisorError::DependencyNotReady {
                    name: name.to_string(),
                    missing,
                });
            }

            let channels = registry.channels_for(name);
            let Some(info) = registry.get_mut(name) else {
                return Err(SupervisorError::unknown(name));
            };
            info.state = ProcessState::Starting;
            info.epoch += 1;
            (info.config.clone(), channels, info.epoch)
        };

        let spawned = spawn_attached(&config, &channels).await;

        let mut registry = self.registry().await;
        let Some(info) = registry.get_mut(name) else {
            return Err(SupervisorError::unknown(name));
        };
        if info.epoch != epoch || info.state != ProcessState::Starting {
            // Stopped or replaced while spawning; dropping the handle kills the child
            return Err(SupervisorError::InvalidState {
                name: name.to_string(),
                state: info.state,
            });
        }

        match spawned {
            Ok(handle) => {
                let pid = handle.pid();
                info.mark_running(handle);
                Ok(Launched { pid, epoch })
            }
            Err(e) => {
                info.mark_crashed(e.to_string());
                process_error!(name, "❌ {}", e);
                Err(e)
            }
        }
    }

    /// Whether every dependency of `config` is RUNNING
    pub async fn check_dependencies_ready(&self, config: &ProcessConfig) -> bool {
        self.registry().await.missing_dependencies(config).is_empty()
    }

    /// Start every CREATED process in dependency order
    ///
    /// Repeats full scans until one makes no progress. Processes left
    /// behind are reported as blocked, with any dependency cycles among
    /// them, and keep state CREATED.
    pub async fn start_all(&self) -> SupervisorResult<StartupReport> {
        self.ensure_not_shut_down()?;
        let mut report = StartupReport::default();

        loop {
            let candidates = self.registry().await.ready_to_start();
            let mut progressed = false;

            for name in candidates {
                match self.start(&name).await {
                    Ok(_) => {
                        report.started.push(name);
                        progressed = true;
                    }
                    Err(SupervisorError::SpawnFailure { .. }) => {
                        report.failed.push(name);
                        progressed = true;
                    }
                    Err(SupervisorError::ShutDown) => return Err(SupervisorError::ShutDown),
                    Err(e) => process_debug!(name, "Start deferred: {}", e),
                }
            }

            if !progressed {
                break;
            }
        }

        let mut registry = self.registry().await;
        report.blocked = registry.blocked();
        report.cycles = registry.blocked_cycles();

        for cycle in &report.cycles {
            let error = SupervisorError::DependencyCycle { cycle: cycle.clone() };
            process_error!(self.name(), "🔁 {}", error);
            for member in cycle {
                if let Some(info) = registry.get_mut(member) {
                    info.last_error = Some(error.to_string());
                }
            }
        }
        for blocked in &report.blocked {
            process_warn!(blocked.name, "⏳ Not started, waiting on {}", blocked.waiting_on.join(", "));
            if let Some(info) = registry.get_mut(&blocked.name) {
                if info.last_error.is_none() {
                    info.last_error = Some(format!("waiting on {}", blocked.waiting_on.join(", ")));
                }
            }
        }

        Ok(report)
    }

    /// Stop a process, gracefully unless `force` is set
    ///
    /// Stopping a process that is not running just marks it STOPPED, which
    /// also cancels a pending automatic restart. If another caller is already
    /// stopping it, waits for that stop to finish and reports its outcome.
    pub async fn stop(&self, name: &str, force: bool) -> SupervisorResult<()> {
        let (handle, channels, _done) = {
            let mut registry = self.registry().await;
            let channels = registry.channels_for(name);
            let info = registry.get_mut(name).ok_or_else(|| SupervisorError::unknown(name))?;
            if info.state == ProcessState::Stopping {
                let in_flight = info.stop_done.clone();
                drop(registry);
                return self.await_stop(name, in_flight).await;
            }
            info.state = ProcessState::Stopping;
            // Dropping the sender closes the channel for every waiter
            let (done, waiters) = watch::channel(());
            info.stop_done = Some(waiters);
            (info.handle.take(), channels, done)
        };

        let outcome = match handle {
            Some(handle) => {
                process_info!(name, "🛑 Stopping (pid {}{})", handle.pid(), if force { ", forced" } else { "" });
                if !force {
                    let notice = Message::shutdown(self.name(), name);
                    for channel in &channels {
                        if let Err(e) = channel.send(&notice).await {
                            process_debug!(name, "Shutdown notice not delivered over {}: {}", channel.kind(), e);
                        }
                    }
                }
                handle.terminate(self.inner.settings.stop_grace, force).await
            }
            None => StopOutcome::Graceful,
        };

        let mut registry = self.registry().await;
        if let Some(info) = registry.get_mut(name) {
            if info.state == ProcessState::Stopping {
                info.mark_stopped(outcome);
            }
        }
        drop(registry);

        match outcome {
            StopOutcome::Unreaped => Err(SupervisorError::StopFailure {
                name: name.to_string(),
                reason: "process could not be reaped".to_string(),
            }),
            StopOutcome::Graceful | StopOutcome::Killed => {
                process_info!(name, "⏹️ Stopped");
                Ok(())
            }
        }
    }

    async fn await_stop(&self, name: &str, in_flight: Option<watch::Receiver<()>>) -> SupervisorResult<()> {
        if let Some(mut in_flight) = in_flight {
            process_debug!(name, "Waiting for stop in progress");
            // Errors once the stopping task is done with the record
            while in_flight.changed().await.is_ok() {}
        }
        match self.process_state(name).await {
            Some(ProcessState::Zombie) => Err(SupervisorError::StopFailure {
                name: name.to_string(),
                reason: "process could not be reaped".to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Stop, pause, start
    pub async fn restart(&self, name: &str) -> SupervisorResult<u32> {
        self.stop(name, false).await?;
        tokio::time::sleep(self.inner.settings.restart_pause).await;
        self.start(name).await
    }

    // ========================================================================
    // Monitoring
    // ========================================================================

    fn spawn_monitor(&self, name: String, epoch: u64) {
        let supervisor = self.clone();
        tokio::spawn(async move { supervisor.monitor(name, epoch).await });
    }

    async fn monitor(self, name: String, mut epoch: u64) {
        process_debug!(name, "👀 Monitor started");
        let mut last_probe = Instant::now();

        while self.is_running() {
            tokio::time::sleep(self.inner.settings.monitor_interval).await;
            if !self.is_running() {
                break;
            }

            match self.inspect(&name, epoch, &mut last_probe).await {
                Tick::Healthy { probe } => self.probe(&name, &probe).await,
                Tick::Crashed(outcome) => match self.recover(&name, outcome).await {
                    Some(next_epoch) => {
                        epoch = next_epoch;
                        last_probe = Instant::now();
                    }
                    None => break,
                },
                Tick::Retire => break,
            }
        }
        process_debug!(name, "Monitor stopped");
    }

    async fn inspect(&self, name: &str, epoch: u64, last_probe: &mut Instant) -> Tick {
        let health_monitoring = self.inner.health_monitoring.load(Ordering::SeqCst);
        let mut registry = self.registry().await;
        let channels = registry.channels_for(name);
        let Some(info) = registry.get_mut(name) else {
            return Tick::Retire;
        };
        if info.epoch != epoch || info.state != ProcessState::Running {
            return Tick::Retire;
        }
        let Some(handle) = info.handle.as_mut() else {
            return Tick::Retire;
        };

        let reason = match handle.poll_exit() {
            Ok(Some(status)) => Some(format!("process {status}")),
            Err(e) => Some(format!("failed to query process status: {e}")),
            Ok(None) if info.config.enable_heartbeat && health_monitoring => info
                .heartbeat_overdue(Instant::now())
                .map(|silent| format!("heartbeat timeout after {}ms", silent.as_millis())),
            Ok(None) => None,
        };
        if let Some(reason) = reason {
            return Tick::Crashed(register_crash(info, reason));
        }

        let probe_due = info.config.enable_heartbeat && last_probe.elapsed() >= info.config.heartbeat_interval;
        if !probe_due {
            return Tick::Healthy { probe: Vec::new() };
        }
        *last_probe = Instant::now();
        // File exchange holds a single pending command, so it never carries probes
        let probe = channels.into_iter().filter(|c| c.kind() != ChannelKind::File).collect();
        Tick::Healthy { probe }
    }

    async fn probe(&self, name: &str, channels: &[Arc<dyn Channel>]) {
        if channels.is_empty() {
            return;
        }
        let heartbeat = Message::heartbeat(self.name(), name);
        for channel in channels {
            if let Err(e) = channel.send(&heartbeat).await {
                process_debug!(name, "Heartbeat probe over {} failed: {}", channel.kind(), e);
            }
        }
    }

    /// Apply the restart policy after a crash
    ///
    /// # Returns
    /// The epoch of the relaunched process, or `None` when the monitor
    /// should retire
    async fn recover(&self, name: &str, mut outcome: CrashOutcome) -> Option<u64> {
        loop {
            if let Some(handle) = outcome.handle.take() {
                if handle.kill().await == StopOutcome::Unreaped {
                    if let Some(info) = self.registry().await.get_mut(name) {
                        info.mark_unreaped(outcome.epoch);
                    }
                    process_error!(name, "🧟 Killed child was never reaped; not restarting");
                    return None;
                }
            }
            let delay = outcome.restart_after?;

            tokio::time::sleep(delay).await;
            if !self.is_running() {
                return None;
            }

            match self.launch(name, Some(outcome.epoch)).await {
                Ok(launched) => {
                    process_info!(name, "🔄 Restarted (pid {})", launched.pid);
                    return Some(launched.epoch);
                }
                Err(SupervisorError::SpawnFailure { reason, .. }) => {
                    let mut registry = self.registry().await;
                    let info = registry.get_mut(name)?;
                    if info.state != ProcessState::Crashed {
                        return None;
                    }
                    outcome = register_crash(info, reason);
                }
                Err(e) => {
                    process_debug!(name, "Restart abandoned: {}", e);
                    return None;
                }
            }
        }
    }

    /// Refresh the heartbeat timestamp of a process
    ///
    /// # Returns
    /// `false` when the process is unknown
    pub async fn record_heartbeat(&self, name: &str) -> bool {
        match self.registry().await.get_mut(name) {
            Some(info) => {
                info.last_heartbeat = Some(Instant::now());
                true
            }
            None => false,
        }
    }

    /// Enable or disable heartbeat timeouts; exit detection stays active
    pub fn set_health_monitoring(&self, enabled: bool) {
        self.inner.health_monitoring.store(enabled, Ordering::SeqCst);
    }

    pub fn health_monitoring(&self) -> bool {
        self.inner.health_monitoring.load(Ordering::SeqCst)
    }

    // ========================================================================
    // Messaging
    // ========================================================================

    /// Validate, rate-limit and dispatch one inbound message
    ///
    /// `owner` is the process whose channel delivered the message. The rate
    /// limit is charged to it, whatever `source` the worker wrote, and
    /// heartbeats refresh its liveness.
    ///
    /// # Returns
    /// Number of handlers invoked
    pub async fn handle_inbound(&self, owner: &str, message: Message) -> Result<usize, ValidationError> {
        self.inner.validator.validate(&message)?;

        if let Some(max_per_second) = self.inner.settings.max_messages_per_second {
            if !self.inner.validator.check_rate_limit(owner, max_per_second) {
                return Err(ValidationError::RateLimited {
                    sender: owner.to_string(),
                });
            }
        }

        if message.is_heartbeat() {
            self.record_heartbeat(owner).await;
        }
        Ok(self.inner.router.dispatch(&message))
    }

    /// Deliver a message to `target` over the first channel that accepts it
    pub async fn send_message(&self, target: &str, message: &Message) -> SupervisorResult<()> {
        self.inner.validator.validate(message)?;
        let channels = {
            let registry = self.registry().await;
            if !registry.contains(target) {
                return Err(SupervisorError::unknown(target));
            }
            registry.channels_for(target)
        };

        for channel in &channels {
            match channel.send(message).await {
                Ok(()) => return Ok(()),
                Err(e) => process_debug!(target, "Delivery over {} failed: {}", channel.kind(), e),
            }
        }
        Err(SupervisorError::DeliveryFailed {
            target: target.to_string(),
        })
    }

    /// Send a copy of `message` to every RUNNING process
    ///
    /// # Returns
    /// Number of processes that accepted it
    pub async fn broadcast(&self, message: &Message) -> usize {
        let targets = self.registry().await.names_where(|info| info.state == ProcessState::Running);
        let mut delivered = 0;
        for target in targets {
            let mut copy = message.clone();
            copy.target = target.clone();
            match self.send_message(&target, &copy).await {
                Ok(()) => delivered += 1,
                Err(e) => process_debug!(target, "Broadcast skipped: {}", e),
            }
        }
        delivered
    }

    // ========================================================================
    // Main loop and shutdown
    // ========================================================================

    /// Start every process, then sweep all channels until shutdown
    pub async fn run(&self) -> SupervisorResult<()> {
        self.ensure_not_shut_down()?;
        logging::log_startup(self.name(), "supervisor main loop");

        let report = match self.start_all().await {
            Ok(report) => report,
            // Shut down while starting
            Err(SupervisorError::ShutDown) => return Ok(()),
            Err(e) => return Err(e),
        };
        logging::log_success(
            self.name(),
            &format!(
                "{} started, {} failed, {} blocked",
                report.started.len(),
                report.failed.len(),
                report.blocked.len()
            ),
        );

        while self.is_running() {
            self.sweep().await;
            tokio::time::sleep(self.inner.settings.sweep_interval).await;
        }

        process_info!(self.name(), "Main loop exited");
        Ok(())
    }

    /// Poll every channel once and dispatch what arrives
    async fn sweep(&self) {
        let channels = self.registry().await.all_channels();
        for (owner, channel) in channels {
            if !self.is_running() {
                return;
            }

            match channel.receive(self.inner.settings.poll_timeout).await {
                Ok(Some(message)) => {
                    if let Err(reason) = self.handle_inbound(&owner, message).await {
                        process_warn!(owner, "🚫 Dropped inbound message: {}", reason);
                    }
                }
                Ok(None) | Err(SupervisorError::ChannelClosed { .. }) => {}
                Err(e) => process_warn!(owner, "⚠️ Unreadable message on {} channel: {}", channel.kind(), e),
            }
        }
    }

    /// Stop every process, close every channel and clear all state
    ///
    /// Idempotent; later calls return immediately.
    pub async fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.running.store(false, Ordering::SeqCst);
        logging::log_shutdown(self.name(), "stopping all processes");

        let active = self.registry().await.names_where(|info| info.state.is_active());
        for name in active {
            if let Err(e) = self.stop(&name, false).await {
                logging::log_error(&name, "Stop", &e);
            }
        }

        let channels = self.registry().await.drain();
        close_all(&channels).await;
        self.inner.router.unregister_all();
        logging::log_success(self.name(), "Shutdown complete");
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// State of `name`, or `None` when it is not registered
    pub async fn process_state(&self, name: &str) -> Option<ProcessState> {
        self.registry().await.get(name).map(|info| info.state)
    }

    pub async fn snapshot(&self, name: &str) -> Option<ProcessSnapshot> {
        self.registry().await.get(name).map(ProcessInfo::snapshot)
    }

    pub async fn processes(&self) -> Vec<ProcessSnapshot> {
        self.registry().await.processes().map(ProcessInfo::snapshot).collect()
    }

    pub async fn health_report(&self) -> HealthReport {
        self.registry().await.health_report()
    }

    pub async fn len(&self) -> usize {
        self.registry().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.registry().await.is_empty()
    }
}

/// Record a crash under the registry lock and decide on a restart
fn register_crash(info: &mut ProcessInfo, reason: String) -> CrashOutcome {
    process_error!(info.name(), "💥 Crashed: {}", reason);
    let handle = info.mark_crashed(reason);

    let restart_after = if info.can_auto_restart() {
        info.restart_count += 1;
        process_warn!(
            info.name(),
            "🔄 Restart {}/{} in {:?}",
            info.restart_count,
            info.config.max_restart_attempts,
            info.config.restart_delay
        );
        Some(info.config.restart_delay)
    } else {
        if info.config.auto_restart {
            process_error!(info.name(), "⛔ Restart budget exhausted after {} attempts", info.restart_count);
        }
        None
    };

    CrashOutcome {
        handle,
        restart_after,
        epoch: info.epoch,
    }
}

/// Spawn the child and bind every channel to it
async fn spawn_attached(config: &ProcessConfig, channels: &[Arc<dyn Channel>]) -> SupervisorResult<ProcessHandle> {
    let env = channels.iter().flat_map(|channel| channel.child_env()).collect();
    let piped = channels.iter().any(|channel| channel.wants_stdio());
    let mut handle = ProcessHandle::spawn(config, env, piped)?;

    for channel in channels {
        if let Err(e) = channel.attach(handle.child_mut()).await {
            process_warn!(config.name, "⚠️ Could not attach {} channel: {}", channel.kind(), e);
        }
    }
    Ok(handle)
}

async fn close_all(channels: &[Arc<dyn Channel>]) {
    for channel in channels {
        channel.close().await;
    }
}
