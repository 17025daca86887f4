//! Host capability injected into every instance.

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

/// Entity state registry of the embedding process.
pub trait Host: Send + Sync {
    fn get_state(&self, entity_id: &str) -> Option<String>;
    fn set_state(&self, entity_id: &str, state: &str);
}

/// Shared handle passed to instances at construction.
pub type HostHandle = Arc<dyn Host>;

/// In-memory host used by the CLI and tests.
#[derive(Debug, Default)]
pub struct MemoryHost {
    states: RwLock<FxHashMap<String, String>>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle() -> HostHandle {
        Arc::new(Self::new())
    }

    /// Number of entities with a recorded state.
    pub fn len(&self) -> usize {
        self.states.read().len()
    }
}

impl Host for MemoryHost {
    fn get_state(&self, entity_id: &str) -> Option<String> {
        self.states.read().get(entity_id).cloned()
    }

    fn set_state(&self, entity_id: &str, state: &str) {
        crate::debug!("host"; "{} = {}", entity_id, state);
        self.states
            .write()
            .insert(entity_id.to_string(), state.to_string());
    }
}
