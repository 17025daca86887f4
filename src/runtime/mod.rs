//! Script runtime boundary.
//!
//! The lifecycle manager never talks to a script engine directly. Everything
//! it needs goes through two traits:
//!
//! - [`AppRuntime`]: static analysis of a source file (imports, entry points)
//!   and construction of a live object from an app definition.
//! - [`AppInstance`]: the constructed object, driven through `startup` and
//!   `shutdown`.
//!
//! [`script::RhaiRuntime`] is the production implementation. Tests substitute
//! their own runtime to script failures and timeouts.

mod host;
pub mod script;

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

pub use host::{Host, HostHandle, MemoryHost};
pub use script::RhaiRuntime;

/// Callbacks every app source must define, as `(name, arity)`.
pub const ENTRY_POINTS: [(&str, usize); 3] = [("init", 1), ("startup", 0), ("shutdown", 0)];

/// Result of analyzing one source file without running it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceAnalysis {
    /// Dotted names of the modules this source imports.
    pub imports: BTreeSet<String>,
    /// Script-defined functions as `(name, arity)`.
    pub functions: BTreeSet<(String, usize)>,
}

impl SourceAnalysis {
    /// Entry points required of an app that this source does not define.
    pub fn missing_entry_points(&self) -> Vec<String> {
        ENTRY_POINTS
            .iter()
            .filter(|(name, arity)| !self.functions.contains(&(name.to_string(), *arity)))
            .map(|(name, arity)| match arity {
                0 => format!("{name}()"),
                _ => format!("{name}(config)"),
            })
            .collect()
    }

    /// Structural validation of the app contract.
    ///
    /// Returns the reason the source cannot be used as an app, if any.
    pub fn entry_point_problem(&self) -> Option<String> {
        let missing = self.missing_entry_points();
        if missing.is_empty() {
            None
        } else {
            Some(format!("missing entry point {}", missing.join(", ")))
        }
    }
}

/// Everything needed to construct one instance.
pub struct ConstructRequest {
    pub instance: String,
    pub app: String,
    pub path: PathBuf,
    /// Source text as analyzed when the definition was loaded.
    pub source: Arc<str>,
    /// Manifest options merged with the instance payload.
    pub payload: toml::Table,
    pub host: HostHandle,
}

/// A script engine able to analyze and instantiate app sources.
pub trait AppRuntime: Send + Sync + 'static {
    /// Parse `source` and report its imports and defined functions.
    ///
    /// The error string is a human-readable parse diagnostic.
    fn analyze(&self, source: &str) -> Result<SourceAnalysis, String>;

    /// Build the live object and run its `init(config)` step.
    fn construct(&self, request: ConstructRequest) -> Result<Box<dyn AppInstance>, String>;
}

/// A constructed app object.
///
/// Methods block; the supervisor calls them from the blocking pool.
pub trait AppInstance: Send + 'static {
    fn startup(&mut self) -> Result<(), String>;
    fn shutdown(&mut self) -> Result<(), String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analysis(functions: &[(&str, usize)]) -> SourceAnalysis {
        SourceAnalysis {
            imports: BTreeSet::new(),
            functions: functions
                .iter()
                .map(|(name, arity)| (name.to_string(), *arity))
                .collect(),
        }
    }

    #[test]
    fn test_complete_contract() {
        let a = analysis(&[("init", 1), ("startup", 0), ("shutdown", 0), ("helper", 2)]);
        assert!(a.missing_entry_points().is_empty());
        assert!(a.entry_point_problem().is_none());
    }

    #[test]
    fn test_wrong_arity_counts_as_missing() {
        let a = analysis(&[("init", 0), ("startup", 0), ("shutdown", 0)]);
        assert_eq!(a.missing_entry_points(), vec!["init(config)"]);
    }

    #[test]
    fn test_problem_lists_all_missing() {
        let a = analysis(&[("init", 1)]);
        assert_eq!(
            a.entry_point_problem().as_deref(),
            Some("missing entry point startup(), shutdown()")
        );
    }
}
