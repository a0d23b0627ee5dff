//! Process registry
//!
//! Owns every [`ProcessInfo`] and the channels of each process. The
//! supervisor keeps a single registry behind one async lock.

use shared::ProcessState;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::channels::delivery_rank;
use crate::config::ProcessConfig;
use crate::core::dependencies::{find_cycles, BlockedProcess};
use crate::core::health::HealthReport;
use crate::core::process::ProcessInfo;
use crate::traits::Channel;

#[derive(Default)]
pub struct Registry {
    processes: BTreeMap<String, ProcessInfo>,
    channels: BTreeMap<String, Vec<Arc<dyn Channel>>>,
}

impl Registry {
    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.processes.contains_key(name)
    }

    pub fn insert(&mut self, info: ProcessInfo, channels: Vec<Arc<dyn Channel>>) {
        let name = info.name().to_string();
        self.channels.insert(name.clone(), channels);
        self.processes.insert(name, info);
    }

    pub fn remove(&mut self, name: &str) -> Option<(ProcessInfo, Vec<Arc<dyn Channel>>)> {
        let info = self.processes.remove(name)?;
        let channels = self.channels.remove(name).unwrap_or_default();
        Some((info, channels))
    }

    /// Empty the registry, handing back every channel for closing
    pub fn drain(&mut self) -> Vec<Arc<dyn Channel>> {
        self.processes.clear();
        std::mem::take(&mut self.channels).into_values().flatten().collect()
    }

    pub fn get(&self, name: &str) -> Option<&ProcessInfo> {
        self.processes.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ProcessInfo> {
        self.processes.get_mut(name)
    }

    pub fn processes(&self) -> impl Iterator<Item = &ProcessInfo> {
        self.processes.values()
    }

    pub fn names_where(&self, predicate: impl Fn(&ProcessInfo) -> bool) -> Vec<String> {
        self.processes
            .values()
            .filter(|info| predicate(info))
            .map(|info| info.name().to_string())
            .collect()
    }

    /// Dependencies of `config` that are not RUNNING (unknown names included)
    pub fn missing_dependencies(&self, config: &ProcessConfig) -> Vec<String> {
        config
            .depends_on
            .iter()
            .filter(|dep| self.processes.get(dep.as_str()).map(|info| info.state) != Some(ProcessState::Running))
            .cloned()
            .collect()
    }

    /// CREATED processes whose dependencies are all RUNNING
    pub fn ready_to_start(&self) -> Vec<String> {
        self.names_where(|info| info.state == ProcessState::Created && self.missing_dependencies(&info.config).is_empty())
    }

    /// CREATED processes held back by dependencies
    pub fn blocked(&self) -> Vec<BlockedProcess> {
        self.processes
            .values()
            .filter(|info| info.state == ProcessState::Created)
            .filter_map(|info| {
                let waiting_on = self.missing_dependencies(&info.config);
                (!waiting_on.is_empty()).then(|| BlockedProcess {
                    name: info.name().to_string(),
                    waiting_on,
                })
            })
            .collect()
    }

    /// Dependency cycles among the blocked processes
    pub fn blocked_cycles(&self) -> Vec<Vec<String>> {
        let graph: BTreeMap<String, Vec<String>> = self
            .blocked()
            .into_iter()
            .filter_map(|blocked| {
                self.processes
                    .get(&blocked.name)
                    .map(|info| (blocked.name, info.config.depends_on.clone()))
            })
            .collect();
        find_cycles(&graph)
    }

    /// Channels of `name`, in outbound delivery preference
    pub fn channels_for(&self, name: &str) -> Vec<Arc<dyn Channel>> {
        let mut channels = self.channels.get(name).cloned().unwrap_or_default();
        channels.sort_by_key(|channel| delivery_rank(channel.kind()));
        channels
    }

    /// Every channel with the name of the process that owns it
    pub fn all_channels(&self) -> Vec<(String, Arc<dyn Channel>)> {
        self.channels
            .iter()
            .flat_map(|(name, channels)| channels.iter().map(move |channel| (name.clone(), channel.clone())))
            .collect()
    }

    pub fn health_report(&self) -> HealthReport {
        let snapshots = self.processes.values().map(ProcessInfo::snapshot).collect();
        let blocked = self
            .blocked()
            .into_iter()
            .map(|blocked| (blocked.name, blocked.waiting_on))
            .collect();
        let unsupervised = self.names_where(|info| info.state == ProcessState::Crashed && !info.config.auto_restart);

        HealthReport::new(snapshots, self.blocked_cycles(), blocked).with_unsupervised(unsupervised)
    }
}
