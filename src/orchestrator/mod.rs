//! Reload orchestrator: the single control loop.
//!
//! ```text
//! WatchStream ─┐
//!              ├─▶ Resolver (plan) ─▶ stop ─▶ commit graph ─▶ start ─▶ ReloadReport
//! ReloadHandle ┘
//! ```
//!
//! One cycle at a time: a batch is taken from the stream only after the
//! previous plan has fully applied, error paths included.

mod report;
mod snapshot;


use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;

use crate::graph::DependencyGraph;
use crate::resolver::{ReloadPlan, Resolver};
use crate::runtime::{AppRuntime, HostHandle};
use crate::source::Layout;
use crate::supervisor::{Supervisor, Timeouts};
use crate::watch::{ChangeEvent, WatchError, WatchStream};

pub use report::{InstanceFailure, ReloadReport, Trigger};
pub use snapshot::GraphSnapshot;

/// Requests accepted by the control loop besides watcher batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Reload,
    Shutdown,
}

/// Cloneable handle for requesting work from a running orchestrator.
#[derive(Debug, Clone)]
pub struct ReloadHandle {
    tx: mpsc::UnboundedSender<Control>,
}

impl ReloadHandle {
    /// Queue a full rescan cycle. Returns `false` once the loop has exited.
    pub fn request_reload(&self) -> bool {
        self.tx.send(Control::Reload).is_ok()
    }

    /// Ask the loop to stop every instance and return.
    pub fn request_shutdown(&self) -> bool {
        self.tx.send(Control::Shutdown).is_ok()
    }
}

pub struct Orchestrator {
    layout: Layout,
    runtime: Arc<dyn AppRuntime>,
    graph: Arc<DependencyGraph>,
    supervisor: Supervisor,
    snapshot: GraphSnapshot,
    reports: Option<mpsc::UnboundedSender<ReloadReport>>,
    render: bool,
    control_tx: mpsc::UnboundedSender<Control>,
    control_rx: mpsc::UnboundedReceiver<Control>,
}

impl Orchestrator {
    pub fn new(
        layout: Layout,
        runtime: Arc<dyn AppRuntime>,
        host: HostHandle,
        timeouts: Timeouts,
    ) -> Self {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let graph = Arc::new(DependencyGraph::new());
        Self {
            supervisor: Supervisor::new(runtime.clone(), host, timeouts),
            snapshot: GraphSnapshot::new(graph.clone()),
            layout,
            runtime,
            graph,
            reports: None,
            render: true,
            control_tx,
            control_rx,
        }
    }

    /// Also send every report to `tx`.
    pub fn with_reports(mut self, tx: mpsc::UnboundedSender<ReloadReport>) -> Self {
        self.reports = Some(tx);
        self
    }

    /// Skip rendering reports to the terminal.
    pub fn quiet(mut self) -> Self {
        self.render = false;
        self
    }

    pub fn handle(&self) -> ReloadHandle {
        ReloadHandle {
            tx: self.control_tx.clone(),
        }
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        self.snapshot.clone()
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    // =========================================================================
    // Cycles
    // =========================================================================

    /// Rescan every source location. Errored instances are retried.
    pub async fn full_reload(&mut self, trigger: Trigger) -> ReloadReport {
        let force = self.supervisor.errored();
        let plan = Resolver::new(&self.layout, self.runtime.as_ref()).rescan(&self.graph, &force);
        self.apply(plan, trigger).await
    }

    /// Process one debounced watcher batch.
    pub async fn apply_batch(&mut self, batch: &[ChangeEvent]) -> ReloadReport {
        let plan =
            Resolver::new(&self.layout, self.runtime.as_ref()).resolve(&self.graph, batch, &[]);
        let trigger = Trigger::Batch {
            changes: batch.len(),
        };
        self.apply(plan, trigger).await
    }

    /// Stop, commit, start.
    async fn apply(&mut self, plan: ReloadPlan, trigger: Trigger) -> ReloadReport {
        let started = Instant::now();
        let mut report = ReloadReport::new(trigger);
        let ReloadPlan {
            stop,
            next_graph,
            start,
            blocked,
            parse_errors,
            config_errors,
            ..
        } = plan;

        let stopped = self.supervisor.stop_many(&stop).await;
        report.instances_stopped = stopped.stopped;
        report
            .instances_errored
            .extend(stopped.failed.iter().map(InstanceFailure::from));

        self.graph = Arc::new(next_graph);

        for spec in start {
            let name = spec.instance.clone();
            match self.supervisor.start(spec).await {
                Ok(()) => report.instances_started.push(name),
                Err(err) => report.instances_errored.push(InstanceFailure::from(&err)),
            }
        }

        report.blocked = blocked;
        report.parse_errors = parse_errors;
        report.config_errors = config_errors;
        report.transitions = self.supervisor.drain_journal();
        report.duration = started.elapsed();

        self.snapshot.publish(self.graph.clone());
        self.emit(&report);
        report
    }

    /// Stop every live instance.
    pub async fn shutdown(&mut self) -> ReloadReport {
        let started = Instant::now();
        let mut report = ReloadReport::new(Trigger::Shutdown);

        let stopped = self.supervisor.shutdown_all().await;
        report.instances_stopped = stopped.stopped;
        report
            .instances_errored
            .extend(stopped.failed.iter().map(InstanceFailure::from));
        report.transitions = self.supervisor.drain_journal();
        report.duration = started.elapsed();

        self.emit(&report);
        report
    }

    fn emit(&self, report: &ReloadReport) {
        if self.render {
            report.render();
        }
        if let Some(tx) = &self.reports {
            let _ = tx.send(report.clone());
        }
    }

    // =========================================================================
    // Control loop
    // =========================================================================

    /// Consume watcher batches and control requests until shutdown.
    ///
    /// Every live instance is stopped before returning. A watcher failure is
    /// the only error and ends the loop.
    pub async fn run(&mut self, mut stream: WatchStream) -> Result<(), WatchError> {
        let outcome = loop {
            tokio::select! {
                biased;
                Some(control) = self.control_rx.recv() => match control {
                    Control::Reload => {
                        crate::debug!("reload"; "manual reload requested");
                        self.full_reload(Trigger::Manual).await;
                    }
                    Control::Shutdown => break Ok(()),
                },
                batch = stream.next() => match batch {
                    Some(Ok(batch)) => {
                        self.apply_batch(&batch).await;
                    }
                    Some(Err(err)) => break Err(err),
                    None => break Ok(()),
                },
            }
        };

        stream.cancel();
        if let Err(err) = &outcome {
            crate::log!("error"; "{}", err);
        }
        self.shutdown().await;
        outcome
    }
}
