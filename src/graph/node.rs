//! Graph node types.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

use crate::freshness::ContentHash;

/// Identity of a graph node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum NodeId {
    Module(String),
    App(String),
    Instance(String),
}

impl NodeId {
    pub fn name(&self) -> &str {
        match self {
            Self::Module(name) | Self::App(name) | Self::Instance(name) => name,
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Module(name) => write!(f, "module `{name}`"),
            Self::App(name) => write!(f, "app `{name}`"),
            Self::Instance(name) => write!(f, "instance `{name}`"),
        }
    }
}

/// Why a module cannot be loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleFlag {
    ParseError(String),
    /// Import chain that would close a cycle, starting and ending at this module.
    ImportCycle(Vec<String>),
    /// Imported but no file exists.
    Missing,
}

impl fmt::Display for ModuleFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ParseError(reason) => write!(f, "parse error: {reason}"),
            Self::ImportCycle(chain) => write!(f, "import cycle {}", chain.join(" -> ")),
            Self::Missing => f.write_str("module not found"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Module {
    pub name: String,
    /// `None` for placeholders created by an import of a module never seen on disk.
    pub path: Option<PathBuf>,
    pub hash: ContentHash,
    /// Imports currently wired into the graph.
    pub imports: BTreeSet<String>,
    /// Imports of the latest content, held back while they would close a cycle.
    pub rejected_imports: Option<BTreeSet<String>>,
    pub flag: Option<ModuleFlag>,
}

impl Module {
    pub(super) fn placeholder(name: &str) -> Self {
        Self {
            name: name.to_string(),
            path: None,
            hash: ContentHash::PLACEHOLDER,
            imports: BTreeSet::new(),
            rejected_imports: None,
            flag: Some(ModuleFlag::Missing),
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self.flag, Some(ModuleFlag::Missing))
    }
}

/// Structural validity of an app definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum AppStatus {
    Valid,
    Invalid(String),
}

impl AppStatus {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

/// Extra inputs of an app that do not come from its own source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppExtras {
    /// Modules and apps declared outside the source.
    pub deps: BTreeSet<NodeId>,
    /// Default options merged under every instance payload.
    pub options: toml::Table,
}

#[derive(Debug, Clone)]
pub struct AppDefinition {
    pub name: String,
    pub path: PathBuf,
    pub hash: ContentHash,
    /// Source text the analysis was computed from.
    pub source: Arc<str>,
    pub imports: BTreeSet<String>,
    pub extras: AppExtras,
    pub status: AppStatus,
}

impl AppDefinition {
    /// Imported modules plus declared deps.
    pub fn dependencies(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.imports
            .iter()
            .cloned()
            .map(NodeId::Module)
            .chain(self.extras.deps.iter().cloned())
    }

    /// Instance payload with the app's default options underneath.
    pub fn merged_payload(&self, payload: &toml::Table) -> toml::Table {
        let mut merged = self.extras.options.clone();
        merged.extend(payload.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InstanceConfig {
    pub name: String,
    /// Name of the referenced app; may dangle.
    pub app: String,
    pub payload: toml::Table,
    /// Extra modules and apps whose changes restart this instance.
    pub deps: BTreeSet<NodeId>,
    /// Position in the configuration file.
    pub index: usize,
}

/// Whether an app can be instantiated right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Loadability {
    Ready,
    Blocked(String),
}

impl Loadability {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

/// Outcome of an upsert that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upserted {
    /// Same content as before; the graph was not touched.
    Unchanged,
    Updated,
}
