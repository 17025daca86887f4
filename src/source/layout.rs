//! Where sources live and what a path on disk means.

use std::path::{Component, Path, PathBuf};

use crate::utils::path::normalize_path;

/// Extension of module and app sources.
pub const SOURCE_EXT: &str = "rhai";

/// Per-directory app manifest file name.
pub const MANIFEST_FILE: &str = "manifest.toml";

/// The three watched source locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub modules_root: PathBuf,
    pub apps_root: PathBuf,
    pub instances_file: PathBuf,
}

/// What a changed path maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    Module(String),
    App(String),
    /// Manifest of the apps in this directory.
    Manifest(PathBuf),
    Instances,
    Ignored,
}

impl Layout {
    pub fn new(modules_root: &Path, apps_root: &Path, instances_file: &Path) -> Self {
        Self {
            modules_root: normalize_path(modules_root),
            apps_root: normalize_path(apps_root),
            instances_file: normalize_path(instances_file),
        }
    }

    /// Paths handed to the file watcher.
    pub fn watch_paths(&self) -> Vec<PathBuf> {
        vec![
            self.modules_root.clone(),
            self.apps_root.clone(),
            self.instances_file.clone(),
        ]
    }

    /// Map a (normalized) path to the source it represents.
    ///
    /// When one root is nested in the other, the deeper root wins.
    pub fn classify(&self, path: &Path) -> SourceKind {
        if path == self.instances_file {
            return SourceKind::Instances;
        }

        let in_apps = path.starts_with(&self.apps_root);
        let in_modules = path.starts_with(&self.modules_root);
        let apps_first = match (in_apps, in_modules) {
            (false, false) => return SourceKind::Ignored,
            (true, true) => {
                self.apps_root.components().count() >= self.modules_root.components().count()
            }
            (in_apps, _) => in_apps,
        };

        if apps_first {
            if path.file_name().is_some_and(|n| n == MANIFEST_FILE)
                && let Some(dir) = path.parent()
                && is_visible(&self.apps_root, dir)
            {
                return SourceKind::Manifest(dir.to_path_buf());
            }
            dotted_name(&self.apps_root, path).map_or(SourceKind::Ignored, SourceKind::App)
        } else {
            dotted_name(&self.modules_root, path).map_or(SourceKind::Ignored, SourceKind::Module)
        }
    }
}

/// Dotted identity of a source file below `root`: `net/http.rhai` → `net.http`.
///
/// `None` for non-source files and for anything inside a directory (or
/// named) starting with `#` or `.`.
pub fn dotted_name(root: &Path, path: &Path) -> Option<String> {
    if path.extension().is_none_or(|ext| ext != SOURCE_EXT) {
        return None;
    }
    let relative = path.strip_prefix(root).ok()?;
    if !is_visible(root, path) {
        return None;
    }

    let stem = relative.with_extension("");
    let parts: Vec<&str> = stem
        .components()
        .map(|c| match c {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect::<Option<_>>()?;

    if parts.is_empty() || parts.iter().any(|p| p.is_empty() || p.contains('.')) {
        return None;
    }
    Some(parts.join("."))
}

/// Whether no component of `path` below `root` is hidden or disabled.
fn is_visible(root: &Path, path: &Path) -> bool {
    let Ok(relative) = path.strip_prefix(root) else {
        return false;
    };
    relative.components().all(|c| match c {
        Component::Normal(part) => part
            .to_str()
            .is_some_and(|s| !s.starts_with('#') && !s.starts_with('.')),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> Layout {
        Layout {
            modules_root: PathBuf::from("/home/modules"),
            apps_root: PathBuf::from("/home/apps"),
            instances_file: PathBuf::from("/home/apps.toml"),
        }
    }

    #[test]
    fn test_dotted_name() {
        let root = Path::new("/home/modules");
        assert_eq!(
            dotted_name(root, Path::new("/home/modules/util.rhai")).as_deref(),
            Some("util")
        );
        assert_eq!(
            dotted_name(root, Path::new("/home/modules/net/http.rhai")).as_deref(),
            Some("net.http")
        );
        assert_eq!(dotted_name(root, Path::new("/home/modules/util.txt")), None);
        assert_eq!(dotted_name(root, Path::new("/home/other/util.rhai")), None);
    }

    #[test]
    fn test_hidden_and_disabled_skipped() {
        let root = Path::new("/home/apps");
        assert_eq!(dotted_name(root, Path::new("/home/apps/#old/lights.rhai")), None);
        assert_eq!(dotted_name(root, Path::new("/home/apps/.git/x.rhai")), None);
        assert_eq!(dotted_name(root, Path::new("/home/apps/#lights.rhai")), None);
        assert_eq!(dotted_name(root, Path::new("/home/apps/a.b.rhai")), None);
    }

    #[test]
    fn test_classify() {
        let layout = layout();
        assert_eq!(
            layout.classify(Path::new("/home/apps.toml")),
            SourceKind::Instances
        );
        assert_eq!(
            layout.classify(Path::new("/home/modules/util.rhai")),
            SourceKind::Module("util".into())
        );
        assert_eq!(
            layout.classify(Path::new("/home/apps/climate/heater.rhai")),
            SourceKind::App("climate.heater".into())
        );
        assert_eq!(
            layout.classify(Path::new("/home/apps/climate/manifest.toml")),
            SourceKind::Manifest(PathBuf::from("/home/apps/climate"))
        );
        assert_eq!(
            layout.classify(Path::new("/home/README.md")),
            SourceKind::Ignored
        );
    }

    #[test]
    fn test_nested_roots_deeper_wins() {
        let layout = Layout {
            modules_root: PathBuf::from("/home/apps/lib"),
            apps_root: PathBuf::from("/home/apps"),
            instances_file: PathBuf::from("/home/apps/apps.toml"),
        };
        assert_eq!(
            layout.classify(Path::new("/home/apps/lib/util.rhai")),
            SourceKind::Module("util".into())
        );
        assert_eq!(
            layout.classify(Path::new("/home/apps/lights.rhai")),
            SourceKind::App("lights".into())
        );
    }
}
