//! `bolted run`: supervise instances until Ctrl+C.

use anyhow::{Context, Result};

use crate::config::BoltedConfig;
use crate::manager::Manager;
use crate::runtime::MemoryHost;

/// Run the manager on a dedicated tokio runtime.
pub fn run_manager(config: BoltedConfig) -> Result<()> {
    let shutdown = crate::core::register_shutdown();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    if let Some(path) = &config.config_path {
        crate::debug!("config"; "loaded {}", path.display());
    }
    let manager = Manager::new(config, MemoryHost::handle());
    runtime.block_on(manager.run(shutdown))
}
