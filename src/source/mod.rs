//! Source discovery on disk: roots, instance configuration, manifests.

pub mod discovery;
pub mod instances;
pub mod layout;
pub mod manifest;

use std::path::PathBuf;

use thiserror::Error;

use crate::graph::NodeId;
use crate::runtime::script::import_to_module_name;

pub use discovery::{Discovered, discover};
pub use instances::{InstanceEntry, InstanceSet};
pub use layout::{Layout, SourceKind};

/// Failure to read a source or configuration file as a whole.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("cannot read `{}`: {}", .0.display(), .1)]
    Io(PathBuf, #[source] std::io::Error),

    #[error("cannot parse `{}`: {}", .0.display(), .1)]
    Toml(PathBuf, #[source] toml::de::Error),
}

/// Read a source file, mapping "not found" to `None`.
pub fn read_source(path: &std::path::Path) -> Result<Option<String>, SourceError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(SourceError::Io(path.to_path_buf(), err)),
    }
}

/// Parse a declared dependency: `apps/<name>` or `apps.<name>` names an app,
/// anything else a module (`modules/` and `modules.` prefixes are optional).
pub fn parse_dependency(spec: &str) -> Option<NodeId> {
    let spec = spec.trim().trim_start_matches("./");
    if let Some(app) = spec.strip_prefix("apps/").or_else(|| spec.strip_prefix("apps.")) {
        return import_to_module_name(app).map(NodeId::App);
    }
    let module = spec
        .strip_prefix("modules/")
        .or_else(|| spec.strip_prefix("modules."))
        .unwrap_or(spec);
    import_to_module_name(module).map(NodeId::Module)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_names_file() {
        let err = SourceError::Io(
            PathBuf::from("apps.toml"),
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(err.to_string(), "cannot read `apps.toml`: denied");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_parse_dependency() {
        assert_eq!(parse_dependency("util"), Some(NodeId::Module("util".into())));
        assert_eq!(
            parse_dependency("modules/net/http.rhai"),
            Some(NodeId::Module("net.http".into()))
        );
        assert_eq!(
            parse_dependency("modules.net.http"),
            Some(NodeId::Module("net.http".into()))
        );
        assert_eq!(parse_dependency("apps.lights"), Some(NodeId::App("lights".into())));
        assert_eq!(
            parse_dependency("apps/garden/pump"),
            Some(NodeId::App("garden.pump".into()))
        );
        assert_eq!(parse_dependency("apps/"), None);
        assert_eq!(parse_dependency("  "), None);
    }
}
