use std::path::{Path, PathBuf};

/// Absolute, symlink-free form of `path`.
///
/// A removed file cannot be canonicalized, so its canonical parent is joined
/// with the file name instead. Paths with no existing parent are made absolute
/// against the working directory.
pub fn normalize_path(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }

    if let (Some(parent), Some(name)) = (path.parent(), path.file_name())
        && let Ok(parent) = parent.canonicalize()
    {
        return parent.join(name);
    }

    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
    }
}

/// `base/path`, or `path` itself when absolute.
pub fn resolve_against(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn existing_path_is_canonical() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("a.rhai");
        std::fs::write(&file, "").unwrap();

        let dotted = temp.path().join(".").join("a.rhai");
        assert_eq!(normalize_path(&dotted), file.canonicalize().unwrap());
    }

    #[test]
    fn removed_file_keeps_canonical_parent() {
        let temp = TempDir::new().unwrap();
        let gone = temp.path().join("gone.rhai");

        let normalized = normalize_path(&gone);
        assert_eq!(normalized, temp.path().canonicalize().unwrap().join("gone.rhai"));
    }

    #[test]
    fn resolve_against_keeps_absolute() {
        let base = Path::new("/srv/bolted");
        assert_eq!(resolve_against(Path::new("apps"), base), base.join("apps"));
        assert_eq!(
            resolve_against(Path::new("/etc/apps"), base),
            PathBuf::from("/etc/apps")
        );
    }
}
