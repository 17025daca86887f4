//! `[reload]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [reload]
//! debounce_ms = 300            # Collapse file events inside this window
//! startup_timeout_ms = 10000   # init + startup limit per instance
//! shutdown_timeout_ms = 10000  # shutdown limit per instance
//! max_operations = 0           # rhai operation budget per callback (0 = unlimited)
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::supervisor::Timeouts;

/// Watcher and lifecycle timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReloadConfig {
    pub debounce_ms: u64,
    pub startup_timeout_ms: u64,
    pub shutdown_timeout_ms: u64,
    pub max_operations: u64,
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 300,
            startup_timeout_ms: 10_000,
            shutdown_timeout_ms: 10_000,
            max_operations: 0,
        }
    }
}

impl ReloadConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            startup: Duration::from_millis(self.startup_timeout_ms),
            shutdown: Duration::from_millis(self.shutdown_timeout_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_parse_config;

    #[test]
    fn test_reload_config() {
        let config = test_parse_config("[reload]\ndebounce_ms = 50\nshutdown_timeout_ms = 500");
        assert_eq!(config.reload.debounce(), Duration::from_millis(50));
        assert_eq!(config.reload.timeouts().shutdown, Duration::from_millis(500));
        assert_eq!(config.reload.timeouts().startup, Duration::from_secs(10));
    }
}
