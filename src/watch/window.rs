//! Collapsing of raw notify events inside one debounce window.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use notify::EventKind;
use notify::event::ModifyKind;
use rustc_hash::FxHashMap;

use super::settle::is_editor_artifact;
use super::types::ChangeKind;
use crate::utils::path::normalize_path;

/// Sleep used while nothing is pending; the select loop wakes on events anyway.
const IDLE: Duration = Duration::from_secs(3600);

/// A change waiting for the window to close.
#[derive(Debug, Clone, Copy)]
pub(super) struct Pending {
    pub kind: ChangeKind,
    /// Time of the last raw event folded into this entry.
    pub at: SystemTime,
}

pub(super) type PendingChanges = FxHashMap<PathBuf, Pending>;

/// Window that closes once no event arrived for `quiet`.
pub(super) struct ChangeWindow {
    quiet: Duration,
    pending: PendingChanges,
    touched: Option<Instant>,
}

impl ChangeWindow {
    pub(super) fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            pending: PendingChanges::default(),
            touched: None,
        }
    }

    /// Fold every path of a notify event into the window.
    pub(super) fn ingest(&mut self, event: &notify::Event) {
        let Some(kind) = change_kind(&event.kind) else {
            return;
        };
        crate::debug!("watch"; "notify {:?} {:?}", event.kind, event.paths);

        for path in event.paths.iter().filter(|p| !is_editor_artifact(p)) {
            self.fold(normalize_path(path), kind);
        }
    }

    pub(super) fn fold(&mut self, path: PathBuf, kind: ChangeKind) {
        self.touched = Some(Instant::now());
        let at = SystemTime::now();

        let merged = match self.pending.get(&path) {
            Some(prev) => merge(prev.kind, kind),
            None => Some(kind),
        };
        match merged {
            Some(kind) => {
                self.pending.insert(path, Pending { kind, at });
            }
            None => {
                crate::debug!("watch"; "transient file dropped: {}", path.display());
                self.pending.remove(&path);
            }
        }
    }

    pub(super) fn kind_of(&self, path: &Path) -> Option<ChangeKind> {
        self.pending.get(path).map(|p| p.kind)
    }

    pub(super) fn len(&self) -> usize {
        self.pending.len()
    }

    /// Time left until the window may close.
    pub(super) fn remaining(&self) -> Duration {
        match self.touched {
            Some(at) => self
                .quiet
                .saturating_sub(at.elapsed())
                .max(Duration::from_millis(1)),
            None => IDLE,
        }
    }

    /// Close the window and hand out its contents, if it is due.
    pub(super) fn drain(&mut self) -> Option<PendingChanges> {
        let due = self.touched.is_some_and(|at| at.elapsed() >= self.quiet);
        if !due {
            return None;
        }
        self.touched = None;
        let pending = std::mem::take(&mut self.pending);
        (!pending.is_empty()).then_some(pending)
    }
}

/// Map a notify event kind onto a change kind. Access and metadata events are ignored.
fn change_kind(kind: &EventKind) -> Option<ChangeKind> {
    match kind {
        EventKind::Create(_) => Some(ChangeKind::Created),
        EventKind::Remove(_) => Some(ChangeKind::Removed),
        EventKind::Modify(ModifyKind::Metadata(_)) => None,
        EventKind::Modify(_) => Some(ChangeKind::Modified),
        _ => None,
    }
}

/// Combine two kinds seen for one path. `None` means the path never existed for the batch.
fn merge(prev: ChangeKind, next: ChangeKind) -> Option<ChangeKind> {
    use ChangeKind::*;
    match (prev, next) {
        (Created, Removed) => None,
        (Removed, Created | Modified) => Some(Modified),
        (_, next) => Some(next),
    }
}
