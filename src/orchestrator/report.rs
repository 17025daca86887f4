//! Per-cycle reload report.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::logger::{Outcome, status};
use crate::resolver::Blocked;
use crate::supervisor::{LifecycleError, Transition};
use crate::utils::count::plural_count;

/// What started a reload cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Trigger {
    /// Full scan at manager startup.
    Initial,
    /// Debounced watcher batch of `changes` paths.
    Batch { changes: usize },
    /// Full rescan requested through a `ReloadHandle`.
    Manual,
    /// Manager shutdown.
    Shutdown,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initial => f.write_str("initial load"),
            Self::Batch { changes } => f.write_str(&plural_count(*changes, "change")),
            Self::Manual => f.write_str("manual reload"),
            Self::Shutdown => f.write_str("shutdown"),
        }
    }
}

/// One instance that ended a cycle `Errored`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceFailure {
    pub instance: String,
    pub error: String,
}

impl From<&LifecycleError> for InstanceFailure {
    fn from(err: &LifecycleError) -> Self {
        Self {
            instance: err.instance().to_string(),
            error: err.to_string(),
        }
    }
}

/// Outcome of one reload cycle.
#[derive(Debug, Clone, Serialize)]
pub struct ReloadReport {
    pub trigger: Trigger,
    pub instances_stopped: Vec<String>,
    pub instances_started: Vec<String>,
    pub instances_errored: Vec<InstanceFailure>,
    pub parse_errors: Vec<String>,
    pub config_errors: Vec<String>,
    pub blocked: Vec<Blocked>,
    pub transitions: Vec<Transition>,
    pub duration: Duration,
}

impl ReloadReport {
    pub fn new(trigger: Trigger) -> Self {
        Self {
            trigger,
            instances_stopped: Vec::new(),
            instances_started: Vec::new(),
            instances_errored: Vec::new(),
            parse_errors: Vec::new(),
            config_errors: Vec::new(),
            blocked: Vec::new(),
            transitions: Vec::new(),
            duration: Duration::ZERO,
        }
    }

    pub fn error_count(&self) -> usize {
        self.instances_errored.len() + self.parse_errors.len() + self.config_errors.len()
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    /// No transitions and nothing to report.
    pub fn is_quiet(&self) -> bool {
        self.transitions.is_empty() && !self.has_errors() && self.blocked.is_empty()
    }

    /// One-line summary, e.g. `manual reload: 2 started, 1 stopped (12ms)`.
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if !self.instances_started.is_empty() {
            parts.push(format!("{} started", self.instances_started.len()));
        }
        if !self.instances_stopped.is_empty() {
            parts.push(format!("{} stopped", self.instances_stopped.len()));
        }
        if !self.blocked.is_empty() {
            parts.push(format!("{} blocked", self.blocked.len()));
        }
        if self.has_errors() {
            parts.push(plural_count(self.error_count(), "error"));
        }
        if parts.is_empty() {
            parts.push("no changes".to_string());
        }
        format!(
            "{}: {} ({}ms)",
            self.trigger,
            parts.join(", "),
            self.duration.as_millis()
        )
    }

    /// Diagnostic lines, one per error or blocked instance.
    pub fn details(&self) -> Vec<String> {
        let mut lines = Vec::new();
        lines.extend(self.parse_errors.iter().cloned());
        lines.extend(self.config_errors.iter().cloned());
        lines.extend(self.instances_errored.iter().map(|f| f.error.clone()));
        lines.extend(
            self.blocked
                .iter()
                .map(|b| format!("`{}` blocked: {}", b.instance, b.reason)),
        );
        lines
    }

    pub fn outcome(&self) -> Outcome {
        if self.has_errors() {
            Outcome::Failed
        } else if !self.blocked.is_empty() {
            Outcome::Warning
        } else if self.transitions.is_empty() {
            Outcome::Quiet
        } else {
            Outcome::Applied
        }
    }

    /// Render through the shared cycle status block.
    pub fn render(&self) {
        status(self.outcome(), &self.summary(), &self.details().join("\n"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quiet_summary() {
        let report = ReloadReport::new(Trigger::Batch { changes: 1 });
        assert!(report.is_quiet());
        assert_eq!(report.summary(), "1 change: no changes (0ms)");
    }

    #[test]
    fn test_summary_counts() {
        let mut report = ReloadReport::new(Trigger::Manual);
        report.instances_started = vec!["a".into(), "b".into()];
        report.instances_stopped = vec!["a".into()];
        report.parse_errors = vec!["apps/b.rhai: bad".into()];
        report.duration = Duration::from_millis(7);

        assert!(!report.is_quiet());
        assert_eq!(report.outcome(), Outcome::Failed);
        assert_eq!(
            report.summary(),
            "manual reload: 2 started, 1 stopped, 1 error (7ms)"
        );
        assert_eq!(report.details(), vec!["apps/b.rhai: bad"]);
    }

    #[test]
    fn test_serializes_trigger_tag() {
        let report = ReloadReport::new(Trigger::Batch { changes: 3 });
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["trigger"]["kind"], "batch");
        assert_eq!(json["trigger"]["changes"], 3);
    }
}
