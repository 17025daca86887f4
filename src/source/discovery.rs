//! Full scans of the source roots.

use std::path::{Path, PathBuf};

use jwalk::WalkDir;

use super::layout::{Layout, SourceKind};

/// Everything a full rescan found on disk.
#[derive(Debug, Default)]
pub struct Discovered {
    /// `(name, path)` of every module source, sorted by path.
    pub modules: Vec<(String, PathBuf)>,
    /// `(name, path)` of every app source, sorted by path.
    pub apps: Vec<(String, PathBuf)>,
}

/// Walk both roots and classify every file.
pub fn discover(layout: &Layout) -> Discovered {
    let mut found = Discovered::default();

    for root in [&layout.modules_root, &layout.apps_root] {
        for path in collect_files(root) {
            match layout.classify(&path) {
                SourceKind::Module(name) => found.modules.push((name, path)),
                SourceKind::App(name) => found.apps.push((name, path)),
                _ => {}
            }
        }
    }

    found.modules.sort_by(|a, b| a.1.cmp(&b.1));
    found.modules.dedup_by(|a, b| a.1 == b.1);
    found.apps.sort_by(|a, b| a.1.cmp(&b.1));
    found.apps.dedup_by(|a, b| a.1 == b.1);

    crate::debug!("scan"; "{} modules, {} apps", found.modules.len(), found.apps.len());
    found
}

/// Collect all regular files below `dir` (hidden entries skipped).
fn collect_files(dir: &Path) -> Vec<PathBuf> {
    if !dir.is_dir() {
        return Vec::new();
    }
    WalkDir::new(dir)
        .sort(true)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path())
        .collect()
}
