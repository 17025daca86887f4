//! Instance supervisor: owns every live instance and its lifecycle.
//!
//! ```text
//! Unloaded ─▶ Constructing ─▶ Running ─▶ Stopping ─▶ Unloaded
//!                  │                        │
//!                  └────────▶ Errored ◀─────┘ ─▶ Unloaded (record cleared)
//! ```
//!
//! Script callbacks block, so they run on the blocking pool under a timeout.
//! A callback that times out keeps running in the background; its name stays
//! reserved until it returns, so callbacks for one name never overlap.

mod state;


use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};

use rustc_hash::FxHashMap;
use thiserror::Error;
use tokio::task::JoinSet;

use crate::resolver::StartSpec;
use crate::runtime::{AppInstance, AppRuntime, ConstructRequest, HostHandle};

pub use state::{LifecycleState, Transition};

/// Which callback a timeout hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Startup,
    Shutdown,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Startup => f.write_str("startup"),
            Self::Shutdown => f.write_str("shutdown"),
        }
    }
}

/// Per-instance lifecycle failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("instance `{0}` is already active")]
    AlreadyActive(String),

    #[error("construction of `{name}` failed: {reason}")]
    ConstructionFailure { name: String, reason: String },

    #[error("startup of `{name}` failed: {reason}")]
    StartupFailure { name: String, reason: String },

    #[error("shutdown of `{name}` failed: {reason}")]
    ShutdownFailure { name: String, reason: String },

    #[error("{phase} of `{name}` timed out after {}ms", after.as_millis())]
    Timeout {
        name: String,
        phase: Phase,
        after: Duration,
    },
}

impl LifecycleError {
    pub fn instance(&self) -> &str {
        match self {
            Self::AlreadyActive(name)
            | Self::ConstructionFailure { name, .. }
            | Self::StartupFailure { name, .. }
            | Self::ShutdownFailure { name, .. }
            | Self::Timeout { name, .. } => name,
        }
    }
}

/// Callback time limits.
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    /// Covers construction (`init`) and `startup` together.
    pub startup: Duration,
    pub shutdown: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            startup: Duration::from_secs(10),
            shutdown: Duration::from_secs(10),
        }
    }
}

/// Result of a stop phase.
#[derive(Debug, Default)]
pub struct StopSummary {
    /// Instances that went through `Stopping → Unloaded`, sorted.
    pub stopped: Vec<String>,
    pub failed: Vec<LifecycleError>,
}

struct Slot {
    state: LifecycleState,
    app: String,
    object: Option<Box<dyn AppInstance>>,
    started_at: Option<SystemTime>,
    last_error: Option<LifecycleError>,
}

/// Clears the in-flight flag when a blocking callback returns or panics.
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

enum StartFailure {
    Construct(String),
    Startup(String),
}

pub struct Supervisor {
    runtime: Arc<dyn AppRuntime>,
    host: HostHandle,
    timeouts: Timeouts,
    slots: FxHashMap<String, Slot>,
    in_flight: FxHashMap<String, Arc<AtomicBool>>,
    journal: Vec<Transition>,
}

impl Supervisor {
    pub fn new(runtime: Arc<dyn AppRuntime>, host: HostHandle, timeouts: Timeouts) -> Self {
        Self {
            runtime,
            host,
            timeouts,
            slots: FxHashMap::default(),
            in_flight: FxHashMap::default(),
            journal: Vec::new(),
        }
    }

    // =========================================================================
    // Start
    // =========================================================================

    /// Construct and start one instance.
    ///
    /// An `Errored` record of the same name is cleared first. Failure leaves
    /// the instance `Errored`; it is not retried automatically.
    ///
    /// While an earlier callback for the name is still running the start is
    /// refused and the `Errored` record stays, so a later full reload retries it.
    pub async fn start(&mut self, spec: StartSpec) -> Result<(), LifecycleError> {
        let name = spec.instance.clone();
        if self.state(&name).is_active() {
            return Err(LifecycleError::AlreadyActive(name));
        }
        if self.is_in_flight(&name) {
            let err = LifecycleError::AlreadyActive(name.clone());
            crate::log!("warning"; "{}: previous callback still running", err);
            if let Some(slot) = self.slots.get_mut(&name) {
                slot.app = spec.app;
                slot.last_error = Some(err.clone());
            }
            return Err(err);
        }
        if self.state(&name) == LifecycleState::Errored {
            self.clear(&name);
        }

        self.slots.insert(
            name.clone(),
            Slot {
                state: LifecycleState::Unloaded,
                app: spec.app.clone(),
                object: None,
                started_at: None,
                last_error: None,
            },
        );
        self.transition(&name, LifecycleState::Constructing);

        let request = ConstructRequest {
            instance: name.clone(),
            app: spec.app,
            path: spec.path,
            source: spec.source,
            payload: spec.payload,
            host: self.host.clone(),
        };
        let runtime = self.runtime.clone();
        let guard = self.mark_in_flight(&name);

        let handle = tokio::task::spawn_blocking(move || -> Result<_, StartFailure> {
            let _guard = guard;
            let mut object = runtime.construct(request).map_err(StartFailure::Construct)?;
            object.startup().map_err(StartFailure::Startup)?;
            Ok(object)
        });

        let outcome = match tokio::time::timeout(self.timeouts.startup, handle).await {
            Ok(Ok(Ok(object))) => Ok(object),
            Ok(Ok(Err(StartFailure::Construct(reason)))) => {
                Err(LifecycleError::ConstructionFailure {
                    name: name.clone(),
                    reason,
                })
            }
            Ok(Ok(Err(StartFailure::Startup(reason)))) => Err(LifecycleError::StartupFailure {
                name: name.clone(),
                reason,
            }),
            Ok(Err(join)) => Err(LifecycleError::ConstructionFailure {
                name: name.clone(),
                reason: panic_reason(join),
            }),
            Err(_) => Err(LifecycleError::Timeout {
                name: name.clone(),
                phase: Phase::Startup,
                after: self.timeouts.startup,
            }),
        };

        match outcome {
            Ok(object) => {
                if let Some(slot) = self.slots.get_mut(&name) {
                    slot.object = Some(object);
                    slot.started_at = Some(SystemTime::now());
                }
                self.transition(&name, LifecycleState::Running);
                crate::log!("app"; "{} started", name);
                Ok(())
            }
            Err(err) => {
                self.fail(&name, err.clone());
                Err(err)
            }
        }
    }

    // =========================================================================
    // Stop
    // =========================================================================

    /// Stop every named instance that is running, concurrently.
    ///
    /// `Errored` records among `names` are cleared unless a callback for the
    /// name is still running; unknown or unloaded names are skipped. Waits for
    /// every shutdown to finish or time out.
    pub async fn stop_many(&mut self, names: &[String]) -> StopSummary {
        let mut tasks = JoinSet::new();
        let timeout = self.timeouts.shutdown;

        for name in names {
            match self.state(name) {
                LifecycleState::Running => {}
                LifecycleState::Errored => {
                    if !self.is_in_flight(name) {
                        self.clear(name);
                    }
                    continue;
                }
                _ => continue,
            }

            self.transition(name, LifecycleState::Stopping);
            let object = self.slots.get_mut(name).and_then(|slot| slot.object.take());
            let Some(mut object) = object else {
                self.transition(name, LifecycleState::Unloaded);
                self.slots.remove(name);
                continue;
            };
            let guard = self.mark_in_flight(name);
            let name = name.clone();

            tasks.spawn(async move {
                let handle = tokio::task::spawn_blocking(move || {
                    let _guard = guard;
                    object.shutdown()
                });
                let result = match tokio::time::timeout(timeout, handle).await {
                    Ok(Ok(Ok(()))) => Ok(()),
                    Ok(Ok(Err(reason))) => Err(LifecycleError::ShutdownFailure {
                        name: name.clone(),
                        reason,
                    }),
                    Ok(Err(join)) => Err(LifecycleError::ShutdownFailure {
                        name: name.clone(),
                        reason: panic_reason(join),
                    }),
                    Err(_) => Err(LifecycleError::Timeout {
                        name: name.clone(),
                        phase: Phase::Shutdown,
                        after: timeout,
                    }),
                };
                (name, result)
            });
        }

        let mut summary = StopSummary::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, Ok(()))) => {
                    self.transition(&name, LifecycleState::Unloaded);
                    self.slots.remove(&name);
                    crate::log!("app"; "{} stopped", name);
                    summary.stopped.push(name);
                }
                Ok((name, Err(err))) => {
                    self.fail(&name, err.clone());
                    summary.failed.push(err);
                }
                Err(err) => crate::log!("error"; "stop task failed: {}", err),
            }
        }
        summary.stopped.sort();
        summary
    }

    /// Stop every running instance (manager shutdown).
    pub async fn shutdown_all(&mut self) -> StopSummary {
        let names = self.running();
        self.stop_many(&names).await
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Current state; `Unloaded` for unknown names.
    pub fn state(&self, name: &str) -> LifecycleState {
        self.slots
            .get(name)
            .map_or(LifecycleState::Unloaded, |slot| slot.state)
    }

    /// Names of running instances, sorted.
    pub fn running(&self) -> Vec<String> {
        self.names_in(LifecycleState::Running)
    }

    /// Names of errored instances, sorted.
    pub fn errored(&self) -> Vec<String> {
        self.names_in(LifecycleState::Errored)
    }

    pub fn last_error(&self, name: &str) -> Option<&LifecycleError> {
        self.slots.get(name)?.last_error.as_ref()
    }

    pub fn started_at(&self, name: &str) -> Option<SystemTime> {
        self.slots.get(name)?.started_at
    }

    pub fn app_of(&self, name: &str) -> Option<&str> {
        self.slots.get(name).map(|slot| slot.app.as_str())
    }

    /// Take the transitions recorded since the last drain.
    pub fn drain_journal(&mut self) -> Vec<Transition> {
        std::mem::take(&mut self.journal)
    }

    // =========================================================================
    // Private
    // =========================================================================

    fn names_in(&self, state: LifecycleState) -> Vec<String> {
        let mut names: Vec<String> = self
            .slots
            .iter()
            .filter(|(_, slot)| slot.state == state)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    fn transition(&mut self, name: &str, to: LifecycleState) {
        let from = self.state(name);
        debug_assert!(from.can_transition(to), "{name}: {from} -> {to}");
        if let Some(slot) = self.slots.get_mut(name) {
            slot.state = to;
        }
        crate::debug!("supervisor"; "{}: {} -> {}", name, from, to);
        self.journal.push(Transition {
            name: name.to_string(),
            from,
            to,
        });
    }

    fn fail(&mut self, name: &str, err: LifecycleError) {
        crate::log!("error"; "{}", err);
        self.transition(name, LifecycleState::Errored);
        if let Some(slot) = self.slots.get_mut(name) {
            slot.object = None;
            slot.last_error = Some(err);
        }
    }

    /// `Errored → Unloaded`: drop the record.
    fn clear(&mut self, name: &str) {
        self.transition(name, LifecycleState::Unloaded);
        self.slots.remove(name);
    }

    fn is_in_flight(&self, name: &str) -> bool {
        self.in_flight
            .get(name)
            .is_some_and(|flag| flag.load(Ordering::Acquire))
    }

    fn mark_in_flight(&mut self, name: &str) -> InFlight {
        let flag = self
            .in_flight
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(AtomicBool::new(false)))
            .clone();
        flag.store(true, Ordering::Release);
        InFlight(flag)
    }
}

fn panic_reason(err: tokio::task::JoinError) -> String {
    if err.is_panic() {
        "callback panicked".to_string()
    } else {
        err.to_string()
    }
}
