//! Per-directory app manifests (`manifest.toml`).
//!
//! ```toml
//! deps = ["net/http", "apps/presence"]   # modules or apps not visible as imports
//!
//! [options]                  # defaults under every instance payload
//! brightness = 80
//! ```

use std::path::Path;

use serde::Deserialize;

use super::layout::MANIFEST_FILE;
use super::{SourceError, parse_dependency};
use crate::graph::AppExtras;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct Manifest {
    #[serde(default)]
    deps: Vec<String>,
    #[serde(default)]
    options: toml::Table,
}

/// Extras for the apps in `dir`. A missing manifest means no extras.
pub fn load_extras(dir: &Path) -> Result<AppExtras, SourceError> {
    let path = dir.join(MANIFEST_FILE);
    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(AppExtras::default()),
        Err(err) => return Err(SourceError::Io(path, err)),
    };
    parse_extras(&content).map_err(|err| SourceError::Toml(path, err))
}

fn parse_extras(content: &str) -> Result<AppExtras, toml::de::Error> {
    let manifest: Manifest = toml::from_str(content)?;
    Ok(AppExtras {
        deps: manifest
            .deps
            .iter()
            .filter_map(|dep| parse_dependency(dep))
            .collect(),
        options: manifest.options,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeId;
    use tempfile::TempDir;

    #[test]
    fn test_parse_extras() {
        let extras = parse_extras(
            "deps = [\"net/http\", \"util\", \"apps.presence\"]\n[options]\nbrightness = 80\n",
        )
        .unwrap();
        assert!(extras.deps.contains(&NodeId::Module("net.http".into())));
        assert!(extras.deps.contains(&NodeId::Module("util".into())));
        assert!(extras.deps.contains(&NodeId::App("presence".into())));
        assert_eq!(extras.options["brightness"].as_integer(), Some(80));
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(parse_extras("dependencies = []").is_err());
    }

    #[test]
    fn test_missing_manifest_is_default() {
        let temp = TempDir::new().unwrap();
        assert_eq!(load_extras(temp.path()).unwrap(), AppExtras::default());
    }

    #[test]
    fn test_broken_manifest_names_file() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(MANIFEST_FILE), "deps = [").unwrap();
        let err = load_extras(temp.path()).unwrap_err();
        assert!(err.to_string().contains(MANIFEST_FILE));
    }
}
