//! Point-in-time process snapshots and the health report

use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::ProcessState;
use std::fmt;
use std::time::Duration;

/// Read-only view of one managed process
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessSnapshot {
    pub name: String,
    pub state: ProcessState,
    pub pid: Option<u32>,
    pub restart_count: u32,
    pub max_restart_attempts: u32,
    pub start_time: Option<DateTime<Utc>>,
    pub uptime: Option<Duration>,
    pub since_heartbeat: Option<Duration>,
    pub last_error: Option<String>,
    pub restart_budget_exhausted: bool,
}

/// Condition an operator should look at
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HealthIssue {
    RestartBudgetExhausted { name: String, attempts: u32 },
    CrashedWithoutRestart { name: String },
    Zombie { name: String },
    DependencyCycle { cycle: Vec<String> },
    Blocked { name: String, waiting_on: Vec<String> },
}

impl fmt::Display for HealthIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthIssue::RestartBudgetExhausted { name, attempts } => {
                write!(f, "{name}: restart budget exhausted after {attempts} attempts")
            }
            HealthIssue::CrashedWithoutRestart { name } => write!(f, "{name}: crashed, auto-restart disabled"),
            HealthIssue::Zombie { name } => write!(f, "{name}: process could not be reaped"),
            HealthIssue::DependencyCycle { cycle } => {
                let mut closed = cycle.clone();
                closed.extend(cycle.first().cloned());
                write!(f, "dependency cycle: {}", closed.join(" -> "))
            }
            HealthIssue::Blocked { name, waiting_on } => {
                write!(f, "{name}: waiting on {}", waiting_on.join(", "))
            }
        }
    }
}

/// Summary of every managed process at one instant
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub generated_at: DateTime<Utc>,
    pub processes: Vec<ProcessSnapshot>,
    pub issues: Vec<HealthIssue>,
}

impl HealthReport {
    pub fn new(processes: Vec<ProcessSnapshot>, cycles: Vec<Vec<String>>, blocked: Vec<(String, Vec<String>)>) -> Self {
        let mut issues = Vec::new();
        for process in &processes {
            if process.restart_budget_exhausted {
                issues.push(HealthIssue::RestartBudgetExhausted {
                    name: process.name.clone(),
                    attempts: process.restart_count,
                });
            } else if process.state == ProcessState::Zombie {
                issues.push(HealthIssue::Zombie {
                    name: process.name.clone(),
                });
            }
        }
        issues.extend(cycles.into_iter().map(|cycle| HealthIssue::DependencyCycle { cycle }));
        issues.extend(
            blocked
                .into_iter()
                .map(|(name, waiting_on)| HealthIssue::Blocked { name, waiting_on }),
        );

        Self {
            generated_at: Utc::now(),
            processes,
            issues,
        }
    }

    /// Flag crashed processes that will never be restarted automatically
    pub(crate) fn with_unsupervised(mut self, names: Vec<String>) -> Self {
        self.issues
            .extend(names.into_iter().map(|name| HealthIssue::CrashedWithoutRestart { name }));
        self
    }

    pub fn running(&self) -> usize {
        self.processes.iter().filter(|p| p.state == ProcessState::Running).count()
    }

    pub fn is_healthy(&self) -> bool {
        self.issues.is_empty() && self.processes.iter().all(|p| p.state == ProcessState::Running)
    }

    pub fn process(&self, name: &str) -> Option<&ProcessSnapshot> {
        self.processes.iter().find(|p| p.name == name)
    }
}

fn format_secs(duration: Option<Duration>) -> String {
    duration.map_or_else(|| "-".to_string(), |d| format!("{}s", d.as_secs()))
}

impl fmt::Display for HealthReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Process Health Report ({}) ===", self.generated_at.format("%Y-%m-%d %H:%M:%S UTC"))?;
        for p in &self.processes {
            write!(
                f,
                "{:<20} {:<9} pid {:<8} restarts {}/{}  uptime {:<6} heartbeat {}",
                p.name,
                p.state.as_str(),
                p.pid.map_or_else(|| "-".to_string(), |pid| pid.to_string()),
                p.restart_count,
                p.max_restart_attempts,
                format_secs(p.uptime),
                p.since_heartbeat.map_or_else(|| "-".to_string(), |d| format!("{}s ago", d.as_secs())),
            )?;
            if let Some(error) = &p.last_error {
                write!(f, "  last error: {error}")?;
            }
            writeln!(f)?;
        }

        if !self.issues.is_empty() {
            writeln!(f, "Issues:")?;
            for issue in &self.issues {
                writeln!(f, "  ! {issue}")?;
            }
        }
        write!(f, "Summary: {}/{} running", self.running(), self.processes.len())
    }
}
