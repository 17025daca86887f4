//! Read-only view of the committed dependency graph.
//!
//! The control loop is the only writer. It publishes the graph at the end of
//! every completed cycle; readers never observe a half-applied plan.

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::graph::DependencyGraph;

#[derive(Clone)]
pub struct GraphSnapshot {
    inner: Arc<ArcSwap<DependencyGraph>>,
}

impl GraphSnapshot {
    pub fn new(graph: Arc<DependencyGraph>) -> Self {
        Self {
            inner: Arc::new(ArcSwap::new(graph)),
        }
    }

    /// Graph as of the last completed cycle.
    #[inline]
    pub fn load(&self) -> Arc<DependencyGraph> {
        self.inner.load_full()
    }

    pub(super) fn publish(&self, graph: Arc<DependencyGraph>) {
        self.inner.store(graph);
    }
}

impl Default for GraphSnapshot {
    fn default() -> Self {
        Self::new(Arc::new(DependencyGraph::new()))
    }
}
