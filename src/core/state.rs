//! Ctrl+C handling.
//!
//! The signal handler runs on its own thread and only knows two globals: a
//! flag telling whether a stop is already in progress, and the sender the
//! running manager registered. A second Ctrl+C, or one before any manager is
//! registered, exits the process.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam::channel::{Receiver, Sender, bounded};

static STOPPING: AtomicBool = AtomicBool::new(false);

static STOP_TX: OnceLock<Sender<()>> = OnceLock::new();

/// Install the process-wide Ctrl+C handler. Call once, first thing in `main`.
pub fn setup_shutdown_handler() -> anyhow::Result<()> {
    ctrlc::set_handler(|| {
        let again = STOPPING.swap(true, Ordering::SeqCst);
        let Some(tx) = STOP_TX.get().filter(|_| !again) else {
            std::process::exit(130);
        };
        crate::log!("run"; "stopping instances, Ctrl+C again to force");
        let _ = tx.try_send(());
    })
    .map_err(|e| anyhow::anyhow!("cannot install Ctrl+C handler: {e}"))
}

/// Route the next Ctrl+C to the returned receiver instead of exiting.
pub fn register_shutdown() -> Receiver<()> {
    let (tx, rx) = bounded(1);
    let _ = STOP_TX.set(tx);
    rx
}
