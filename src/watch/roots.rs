//! OS watch registrations for the configured locations.
//!
//! A directory is watched recursively. A single file (the instances file) is
//! watched through its parent, non-recursively, so an atomic save that
//! replaces the inode is still seen. Locations that do not exist yet are
//! registered on a later [`RootSet::refresh`].

use std::path::{Path, PathBuf};

use notify::{RecursiveMode, Watcher};
use rustc_hash::FxHashSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct Root {
    pub dir: PathBuf,
    pub mode: RecursiveMode,
}

impl Root {
    fn for_path(path: &Path) -> Self {
        let is_file = path.is_file() || (!path.exists() && path.extension().is_some());
        match path.parent() {
            Some(parent) if is_file => Self {
                dir: parent.to_path_buf(),
                mode: RecursiveMode::NonRecursive,
            },
            _ => Self {
                dir: path.to_path_buf(),
                mode: RecursiveMode::Recursive,
            },
        }
    }
}

pub(super) struct RootSet {
    wanted: Vec<Root>,
    live: FxHashSet<PathBuf>,
}

impl RootSet {
    pub(super) fn plan(paths: &[PathBuf]) -> Self {
        let mut wanted: Vec<Root> = Vec::new();
        for root in paths.iter().map(|p| Root::for_path(p)) {
            match wanted.iter_mut().find(|w| w.dir == root.dir) {
                Some(w) if root.mode == RecursiveMode::Recursive => w.mode = root.mode,
                Some(_) => {}
                None => wanted.push(root),
            }
        }
        Self {
            wanted,
            live: FxHashSet::default(),
        }
    }

    pub(super) fn wanted(&self) -> &[Root] {
        &self.wanted
    }

    /// First registration. A location that exists but cannot be watched is an error.
    pub(super) fn attach(&mut self, watcher: &mut impl Watcher) -> notify::Result<()> {
        for root in &self.wanted {
            if root.dir.exists() {
                watcher.watch(&root.dir, root.mode)?;
                self.live.insert(root.dir.clone());
            } else {
                crate::debug!("watch"; "waiting for {}", root.dir.display());
            }
        }
        Ok(())
    }

    /// Forget vanished locations and register the ones that (re)appeared.
    pub(super) fn refresh(&mut self, watcher: &mut impl Watcher) {
        self.live.retain(|dir| dir.exists());

        for root in &self.wanted {
            if self.live.contains(&root.dir) || !root.dir.exists() {
                continue;
            }
            if watcher.watch(&root.dir, root.mode).is_ok() {
                crate::debug!("watch"; "now watching {}", root.dir.display());
                self.live.insert(root.dir.clone());
            }
        }
    }
}
