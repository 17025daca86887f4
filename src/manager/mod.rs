//! Manager: wires configuration, watcher and orchestrator together.
//!
//! Startup follows the watcher-first order: the OS watch is attached, then the
//! initial full load runs, then batches are consumed. Edits made while the
//! initial load is running are therefore picked up by the first batch.

use std::io::BufRead;
use std::sync::Arc;

use anyhow::{Context, Result};
use crossbeam::channel::Receiver;

use crate::config::BoltedConfig;
use crate::orchestrator::{Orchestrator, ReloadHandle, Trigger};
use crate::runtime::{HostHandle, RhaiRuntime};
use crate::source::Layout;
use crate::utils::count::plural_count;
use crate::watch;

pub struct Manager {
    layout: Layout,
    config: BoltedConfig,
    orchestrator: Orchestrator,
}

impl Manager {
    pub fn new(config: BoltedConfig, host: HostHandle) -> Self {
        let layout = config.layout();
        let runtime = Arc::new(RhaiRuntime::new(
            &layout.modules_root,
            config.reload.max_operations,
        ));
        let orchestrator =
            Orchestrator::new(layout.clone(), runtime, host, config.reload.timeouts());
        Self {
            layout,
            config,
            orchestrator,
        }
    }

    /// Handle for requesting a manual reload or a shutdown.
    pub fn handle(&self) -> ReloadHandle {
        self.orchestrator.handle()
    }

    /// Watch and supervise until shutdown is requested.
    ///
    /// `shutdown` yields on Ctrl+C. Returns an error only when the watcher
    /// subscription fails; every instance is stopped first.
    pub async fn run(mut self, shutdown: Receiver<()>) -> Result<()> {
        let paths = self.layout.watch_paths();
        crate::log!(
            "watch";
            "watching {}",
            plural_count(paths.len(), "location")
        );
        for path in &paths {
            crate::debug!("watch"; "{}", path.display());
        }
        let stream = watch::start(paths, self.config.reload.debounce())
            .context("failed to start file watcher")?;

        forward_shutdown(shutdown, self.handle());
        forward_stdin(self.handle());

        self.orchestrator.full_reload(Trigger::Initial).await;

        let running = self.orchestrator.supervisor().running().len();
        crate::log!(
            "run";
            "{} running, press Enter to reload, Ctrl+C to stop",
            plural_count(running, "instance")
        );

        self.orchestrator
            .run(stream)
            .await
            .context("file watcher failed")
    }
}

/// Turn the Ctrl+C signal into a shutdown request.
fn forward_shutdown(shutdown: Receiver<()>, handle: ReloadHandle) {
    std::thread::spawn(move || {
        if shutdown.recv().is_ok() {
            handle.request_shutdown();
        }
    });
}

/// An empty line (or `r`) on stdin requests a full reload.
fn forward_stdin(handle: ReloadHandle) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if matches!(line.trim(), "" | "r" | "reload") && !handle.request_reload() {
                break;
            }
        }
    });
}
