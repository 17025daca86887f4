//! Instance lifecycle states and the transition journal.

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Unloaded,
    Constructing,
    Running,
    Stopping,
    Errored,
}

impl LifecycleState {
    /// States that hold the name: a second construction is rejected.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Constructing | Self::Running | Self::Stopping)
    }

    /// Allowed edges of the lifecycle state machine.
    pub fn can_transition(self, to: Self) -> bool {
        use LifecycleState::*;
        matches!(
            (self, to),
            (Unloaded, Constructing)
                | (Constructing, Running)
                | (Constructing, Errored)
                | (Running, Stopping)
                | (Stopping, Unloaded)
                | (Stopping, Errored)
                | (Errored, Unloaded)
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Unloaded => "unloaded",
            Self::Constructing => "constructing",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Errored => "errored",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One journaled state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub name: String,
    pub from: LifecycleState,
    pub to: LifecycleState,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} -> {}", self.name, self.from, self.to)
    }
}

#[cfg(test)]
mod tests {
    use super::LifecycleState::*;

    #[test]
    fn test_happy_path_allowed() {
        for (from, to) in [
            (Unloaded, Constructing),
            (Constructing, Running),
            (Running, Stopping),
            (Stopping, Unloaded),
        ] {
            assert!(from.can_transition(to), "{from} -> {to}");
        }
    }

    #[test]
    fn test_shortcuts_rejected() {
        assert!(!Unloaded.can_transition(Running));
        assert!(!Running.can_transition(Unloaded));
        assert!(!Running.can_transition(Errored));
        assert!(!Errored.can_transition(Constructing));
    }

    #[test]
    fn test_active_states() {
        assert!(Constructing.is_active());
        assert!(Running.is_active());
        assert!(Stopping.is_active());
        assert!(!Unloaded.is_active());
        assert!(!Errored.is_active());
    }
}
