//! File watcher with debouncing.
//!
//! Watches the module, app and instance-configuration locations and delivers
//! debounced change batches to the reload loop. Implements the "Watcher-First"
//! pattern: the OS watch is attached before the initial scan so no event is lost
//! while the first reload cycle runs.
//!
//! ```text
//! notify callback → bridge thread → ChangeWindow → settle → WatchStream
//! ```

use std::path::PathBuf;
use std::time::Duration;

use notify::RecommendedWatcher;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

mod roots;
mod settle;
mod types;
mod window;


pub use types::{ChangeBatch, ChangeEvent, ChangeKind};

use roots::RootSet;
use window::ChangeWindow;

/// Capacity of the bridge between the notify thread and the debounce task.
const BRIDGE_BUFFER: usize = 256;

/// Capacity of the outgoing batch channel.
const BATCH_BUFFER: usize = 16;

/// Upper bound between two checks for locations that appeared or vanished.
const REFRESH_INTERVAL: Duration = Duration::from_millis(250);

/// Failure of the watch subscription itself. Always terminal for the stream.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("failed to start file watcher")]
    Start(#[source] notify::Error),

    #[error("file watcher failed")]
    Subscription(#[source] notify::Error),

    #[error("file watcher event source disconnected")]
    Disconnected,
}

/// Debounced, non-restartable stream of change batches.
///
/// Dropping the stream (or calling [`WatchStream::cancel`]) stops the OS-level
/// watch and ends the background task.
pub struct WatchStream {
    rx: mpsc::Receiver<Result<ChangeBatch, WatchError>>,
    cancel: Option<oneshot::Sender<()>>,
}

impl WatchStream {
    /// Wait for the next batch.
    ///
    /// Returns `None` once the stream is closed (after cancellation or after a
    /// terminal error has been delivered).
    pub async fn next(&mut self) -> Option<Result<ChangeBatch, WatchError>> {
        self.rx.recv().await
    }

    /// Stop watching. Pending batches are discarded.
    pub fn cancel(&mut self) {
        if let Some(tx) = self.cancel.take() {
            let _ = tx.send(());
        }
        self.rx.close();
    }
}

impl Drop for WatchStream {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Start watching `paths`, collapsing events that arrive within `debounce`.
///
/// Must be called from inside a tokio runtime. Directories are watched
/// recursively; files are watched through their parent directory. Paths that do
/// not exist yet are attached as soon as they appear.
pub fn start(paths: Vec<PathBuf>, debounce: Duration) -> Result<WatchStream, WatchError> {
    // notify calls back on its own thread
    let (notify_tx, notify_rx) = std::sync::mpsc::channel();

    let mut watcher = notify::recommended_watcher(move |res| {
        let _ = notify_tx.send(res);
    })
    .map_err(WatchError::Start)?;

    let mut roots = RootSet::plan(&paths);
    roots.attach(&mut watcher).map_err(WatchError::Start)?;

    let (bridge_tx, bridge_rx) = mpsc::channel::<notify::Result<notify::Event>>(BRIDGE_BUFFER);

    // Bridge thread: exits once the watcher (and with it notify_tx) is dropped
    std::thread::spawn(move || {
        while let Ok(result) = notify_rx.recv() {
            if bridge_tx.blocking_send(result).is_err() {
                break;
            }
        }
    });

    let (out_tx, out_rx) = mpsc::channel(BATCH_BUFFER);
    let (cancel_tx, cancel_rx) = oneshot::channel();

    tokio::spawn(run_loop(
        watcher,
        roots,
        ChangeWindow::new(debounce),
        bridge_rx,
        out_tx,
        cancel_rx,
    ));

    Ok(WatchStream {
        rx: out_rx,
        cancel: Some(cancel_tx),
    })
}

async fn run_loop(
    mut watcher: RecommendedWatcher,
    mut roots: RootSet,
    mut window: ChangeWindow,
    mut bridge_rx: mpsc::Receiver<notify::Result<notify::Event>>,
    out_tx: mpsc::Sender<Result<ChangeBatch, WatchError>>,
    mut cancel_rx: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;
            _ = &mut cancel_rx => break,
            msg = bridge_rx.recv() => match msg {
                Some(Ok(event)) => window.ingest(&event),
                Some(Err(err)) if is_fatal(&err) => {
                    let _ = out_tx.send(Err(WatchError::Subscription(err))).await;
                    break;
                }
                Some(Err(err)) => crate::log!("watch"; "notify error: {}", err),
                None => {
                    let _ = out_tx.send(Err(WatchError::Disconnected)).await;
                    break;
                }
            },
            _ = tokio::time::sleep(window.remaining().min(REFRESH_INTERVAL)) => {
                roots.refresh(&mut watcher);

                let Some(pending) = window.drain() else {
                    continue;
                };
                let batch = settle::settle(pending);
                if batch.is_empty() {
                    continue;
                }
                for event in &batch {
                    crate::debug!("watch"; "{}: {}", event.kind.label(), event.path.display());
                }
                if out_tx.send(Ok(batch)).await.is_err() {
                    break;
                }
            }
        }
    }

    drop(watcher);
    crate::debug!("watch"; "stopped");
}

/// Errors that mean the OS subscription can no longer be trusted.
fn is_fatal(err: &notify::Error) -> bool {
    matches!(
        err.kind,
        notify::ErrorKind::MaxFilesWatch | notify::ErrorKind::InvalidConfig(_)
    )
}
