//! # Handle Registry
//!
//! A process that opens the same space from several components ends up
//! with several mappings of the same object. [`SpaceRegistry`] keeps
//! one shared [`Space`] handle per name so callers can share a single
//! mapping by reference count instead. The registry is explicit state;
//! nothing in the crate opens spaces behind the caller's back.

use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::Mutex;

use crate::config::SpaceConfig;
use crate::error::Result;
use crate::space::Space;

pub struct SpaceRegistry {
    spaces: Mutex<HashMap<String, Arc<Space>>>,
}

impl SpaceRegistry {
    pub fn new() -> Self {
        Self {
            spaces: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the registered handle for `name`, opening the space on
    /// first use.
    pub fn open(&self, name: &str) -> Result<Arc<Space>> {
        self.open_with(name, SpaceConfig::default())
    }

    pub fn open_with(&self, name: &str, config: SpaceConfig) -> Result<Arc<Space>> {
        let mut spaces = self.spaces.lock();
        if let Some(space) = spaces.get(name) {
            return Ok(Arc::clone(space));
        }
        let space = Arc::new(Space::open_with(name, config)?);
        spaces.insert(name.to_string(), Arc::clone(&space));
        Ok(space)
    }

    /// Drops the registry's reference to `name`. The mapping itself
    /// closes when the last outstanding clone drops. Returns whether
    /// the name was registered.
    pub fn close(&self, name: &str) -> bool {
        self.spaces.lock().remove(name).is_some()
    }

    pub fn is_open(&self, name: &str) -> bool {
        self.spaces.lock().contains_key(name)
    }
}

impl Default for SpaceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
