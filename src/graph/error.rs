//! Per-file and per-entry graph errors.

use std::path::PathBuf;

use thiserror::Error;

/// Failure to load one module or app source.
///
/// The graph is still updated when these are returned: the node is kept and
/// flagged so its dependents can be found and blocked.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("{}: {reason}", path.display())]
    ParseError { path: PathBuf, reason: String },

    #[error("app `{app}` is invalid: {reason}")]
    InvalidAppDefinition { app: String, reason: String },

    #[error("module `{module}` would close an import cycle: {}", chain.join(" -> "))]
    ImportCycle { module: String, chain: Vec<String> },
}

/// Failure of one entry of the instance configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigEntryError {
    #[error("instance `{name}` is declared more than once (entry #{index} ignored)")]
    DuplicateInstanceName { name: String, index: usize },

    #[error("instance `{name}` references unknown app `{app}`")]
    UnknownApp { name: String, app: String },

    #[error("entry #{index} has no `{key}` key")]
    MissingKey { index: usize, key: &'static str },

    #[error("entry #{index}: {reason}")]
    Malformed { index: usize, reason: String },
}
