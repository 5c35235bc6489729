//! Per-policy state attached to clusters and destinations.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;

/// Lazily created, type-erased state owned by health policies.
///
/// Each policy stores its state under its own key, so several policies can
/// keep counters for the same destination without seeing each other's data.
/// State lives as long as its owner; removing a destination drops it.
#[derive(Default)]
pub struct PolicyState {
    slots: DashMap<&'static str, Arc<dyn Any + Send + Sync>>,
}

impl PolicyState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the state stored under `key`, creating it with `init` on first use.
    pub fn get_or_init<T, F>(&self, key: &'static str, init: F) -> Arc<T>
    where
        T: Any + Send + Sync,
        F: Fn() -> T,
    {
        let slot = self
            .slots
            .entry(key)
            .or_insert_with(|| Arc::new(init()) as Arc<dyn Any + Send + Sync>)
            .value()
            .clone();

        match slot.downcast::<T>() {
            Ok(state) => state,
            Err(_) => {
                // Key reused with another type; the new owner wins.
                let state = Arc::new(init());
                self.slots.insert(key, state.clone());
                state
            }
        }
    }

    /// Drop the state stored under `key`. Returns whether any was stored.
    pub fn remove(&self, key: &str) -> bool {
        self.slots.remove(key).is_some()
    }

    /// Number of policies holding state here.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl fmt::Debug for PolicyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<&str> = self.slots.iter().map(|e| *e.key()).collect();
        f.debug_struct("PolicyState").field("keys", &keys).finish()
    }
}
