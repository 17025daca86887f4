//! Turning a closed window into the batch handed to the reload loop.
//!
//! Notify reports what happened, not what is true now. Before delivery every
//! pending kind is checked against the disk, directory events are expanded to
//! the files inside, and anything that is not a file is dropped.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use super::types::{ChangeBatch, ChangeEvent, ChangeKind};
use super::window::{Pending, PendingChanges};
use crate::utils::path::normalize_path;

pub(super) fn settle(mut pending: PendingChanges) -> ChangeBatch {
    reconcile(&mut pending);
    expand_directories(&mut pending);
    pending.retain(|path, p| p.kind == ChangeKind::Removed || path.is_file());

    let mut batch: ChangeBatch = pending
        .into_iter()
        .map(|(path, p)| ChangeEvent {
            path,
            kind: p.kind,
            timestamp: p.at,
        })
        .collect();
    batch.sort_by(|a, b| a.path.cmp(&b.path));
    batch
}

/// Align kinds with what exists on disk right now.
pub(super) fn reconcile(pending: &mut PendingChanges) {
    pending.retain(|path, p| {
        let on_disk = path.exists();
        match (p.kind, on_disk) {
            (ChangeKind::Created, false) => {
                crate::debug!("watch"; "created then gone: {}", path.display());
                false
            }
            (ChangeKind::Modified, false) => {
                p.kind = ChangeKind::Removed;
                true
            }
            (ChangeKind::Removed, true) => {
                // atomic save: rename over the old file
                p.kind = ChangeKind::Modified;
                true
            }
            _ => true,
        }
    });
}

/// Some backends (kqueue, FSEvents) only report the parent directory after a
/// file inside it is replaced. Report each direct child file as modified;
/// unchanged content is filtered out later by hash.
fn expand_directories(pending: &mut PendingChanges) {
    let dirs: Vec<(PathBuf, SystemTime)> = pending
        .iter()
        .filter(|(path, p)| p.kind != ChangeKind::Removed && path.is_dir())
        .map(|(path, p)| (path.clone(), p.at))
        .collect();

    for (dir, at) in dirs {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for child in entries.flatten().map(|e| normalize_path(&e.path())) {
            if child.is_file() && !is_editor_artifact(&child) {
                pending.entry(child).or_insert(Pending {
                    kind: ChangeKind::Modified,
                    at,
                });
            }
        }
    }
}

/// Swap files, backups and hidden files written by editors.
pub(super) fn is_editor_artifact(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    if name.starts_with(['.', '#']) || name.ends_with('~') {
        return true;
    }
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
    matches!(ext, "swp" | "swo" | "swx" | "tmp" | "bak" | "orig")
}
