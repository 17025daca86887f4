//! `[paths]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [paths]
//! modules = "modules"       # Shared modules root
//! apps = "apps"             # App definitions root
//! instances = "apps.toml"   # Instance configuration file
//! ```
//!
//! Relative paths resolve against the directory holding `bolted.toml`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::utils::path::resolve_against;

/// Source locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub modules: PathBuf,
    pub apps: PathBuf,
    pub instances: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            modules: "modules".into(),
            apps: "apps".into(),
            instances: "apps.toml".into(),
        }
    }
}

impl PathsConfig {
    /// Make every path absolute relative to `root`.
    pub fn resolve(&mut self, root: &Path) {
        self.modules = resolve_against(&self.modules, root);
        self.apps = resolve_against(&self.apps, root);
        self.instances = resolve_against(&self.instances, root);
    }
}
