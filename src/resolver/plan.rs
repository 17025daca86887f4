//! Output of one resolution: what to stop, the graph to commit, what to start.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

use crate::graph::{DependencyGraph, NodeId};

/// Everything the supervisor needs to construct one instance.
#[derive(Debug, Clone)]
pub struct StartSpec {
    pub instance: String,
    pub app: String,
    pub path: PathBuf,
    pub source: Arc<str>,
    /// App options merged with the instance payload.
    pub payload: toml::Table,
}

/// An affected instance that cannot start yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Blocked {
    pub instance: String,
    pub reason: String,
}

#[derive(Debug)]
pub struct ReloadPlan {
    /// Graph nodes whose content or presence changed.
    pub changed: Vec<NodeId>,
    /// Every affected instance name, sorted. Only live ones are actually stopped.
    pub stop: Vec<String>,
    /// Staged graph, committed between the stop and start phases.
    pub next_graph: DependencyGraph,
    /// Affected, loadable instances in declaration order.
    pub start: Vec<StartSpec>,
    pub blocked: Vec<Blocked>,
    /// Per-file errors: parse errors, invalid apps, import cycles, unreadable files.
    pub parse_errors: Vec<String>,
    /// Per-entry errors of the instance configuration.
    pub config_errors: Vec<String>,
}

impl ReloadPlan {
    /// Nothing to stop or start.
    pub fn is_noop(&self) -> bool {
        self.stop.is_empty() && self.start.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        !self.parse_errors.is_empty() || !self.config_errors.is_empty()
    }
}
