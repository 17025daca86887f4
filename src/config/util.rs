use std::path::{Path, PathBuf};

/// Nearest `name` in the working directory or one of its ancestors.
pub fn find_config_file(name: &Path) -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    find_config_from(&cwd, name)
}

fn find_config_from(start: &Path, name: &Path) -> Option<PathBuf> {
    if name.is_absolute() {
        return name.exists().then(|| name.to_path_buf());
    }
    start
        .ancestors()
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}
