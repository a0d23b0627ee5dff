//! Dependency graph analysis
//!
//! Pure functions over `name -> depends_on` maps; no process state involved.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use crate::error::{SupervisorError, SupervisorResult};

/// A process that could not be started and what it still waits on
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockedProcess {
    pub name: String,
    pub waiting_on: Vec<String>,
}

/// Outcome of a dependency-ordered `start_all`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StartupReport {
    /// Started processes, in start order
    pub started: Vec<String>,
    /// Processes whose spawn failed
    pub failed: Vec<String>,
    /// Processes left CREATED because a dependency never became RUNNING
    pub blocked: Vec<BlockedProcess>,
    /// Dependency cycles among the blocked processes
    pub cycles: Vec<Vec<String>>,
}

impl StartupReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.blocked.is_empty()
    }

    /// Turn an incomplete start-up into the most specific error
    pub fn ensure_complete(&self) -> SupervisorResult<()> {
        if let Some(cycle) = self.cycles.first() {
            return Err(SupervisorError::DependencyCycle { cycle: cycle.clone() });
        }
        if let Some(blocked) = self.blocked.first() {
            return Err(SupervisorError::DependencyNotReady {
                name: blocked.name.clone(),
                missing: blocked.waiting_on.clone(),
            });
        }
        if let Some(name) = self.failed.first() {
            return Err(SupervisorError::SpawnFailure {
                name: name.clone(),
                reason: "spawn failed during start-up".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

/// Find dependency cycles in `graph`
///
/// Edges to names absent from `graph` are ignored. Each cycle is returned
/// once, as the path from its first visited member back to the node that
/// closes it.
pub fn find_cycles(graph: &BTreeMap<String, Vec<String>>) -> Vec<Vec<String>> {
    let mut marks = HashMap::new();
    let mut path = Vec::new();
    let mut cycles = Vec::new();

    for node in graph.keys() {
        if !marks.contains_key(node.as_str()) {
            visit(node, graph, &mut marks, &mut path, &mut cycles);
        }
    }
    cycles
}

fn visit<'a>(
    node: &'a str,
    graph: &'a BTreeMap<String, Vec<String>>,
    marks: &mut HashMap<&'a str, Mark>,
    path: &mut Vec<&'a str>,
    cycles: &mut Vec<Vec<String>>,
) {
    marks.insert(node, Mark::InProgress);
    path.push(node);

    for dep in graph.get(node).into_iter().flatten() {
        match marks.get(dep.as_str()) {
            Some(Mark::InProgress) => {
                if let Some(start) = path.iter().position(|member| *member == dep.as_str()) {
                    cycles.push(path[start..].iter().map(|member| member.to_string()).collect());
                }
            }
            Some(Mark::Done) => {}
            None if graph.contains_key(dep) => visit(dep, graph, marks, path, cycles),
            None => {}
        }
    }

    path.pop();
    marks.insert(node, Mark::Done);
}
