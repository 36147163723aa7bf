//! Listener Registry
//!
//! Maps subscription handles to callbacks. Removal is by handle, so two
//! registrations of the same closure are independent.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Opaque handle identifying one registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Ordered set of callbacks keyed by [`SubscriptionId`].
///
/// Ids are allocated monotonically, so iteration order is registration order.
pub struct Registry<F: ?Sized> {
    next_id: u64,
    entries: BTreeMap<SubscriptionId, Arc<F>>,
}

impl<F: ?Sized> Registry<F> {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            entries: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, callback: Arc<F>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.entries.insert(id, callback);
        id
    }

    /// Returns true if the handle was still registered
    pub fn remove(&mut self, id: SubscriptionId) -> bool {
        self.entries.remove(&id).is_some()
    }

    /// Clone the current callbacks so they can be invoked without holding a lock
    pub fn snapshot(&self) -> Vec<Arc<F>> {
        self.entries.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl<F: ?Sized> Default for Registry<F> {
    fn default() -> Self {
        Self::new()
    }
}

/// Event listeners grouped by event name.
///
/// Ids are unique across all event names.
pub struct EventRegistry<F: ?Sized> {
    next_id: u64,
    by_event: HashMap<String, BTreeMap<SubscriptionId, Arc<F>>>,
    index: HashMap<SubscriptionId, String>,
}

impl<F: ?Sized> EventRegistry<F> {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            by_event: HashMap::new(),
            index: HashMap::new(),
        }
    }

    pub fn insert(&mut self, event: &str, callback: Arc<F>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.by_event
            .entry(event.to_string())
            .or_default()
            .insert(id, callback);
        self.index.insert(id, event.to_string());
        id
    }

    pub fn remove(&mut self, id: SubscriptionId) -> bool {
        let Some(event) = self.index.remove(&id) else {
            return false;
        };
        if let Some(listeners) = self.by_event.get_mut(&event) {
            listeners.remove(&id);
            // Clean up empty event entries
            if listeners.is_empty() {
                self.by_event.remove(&event);
            }
        }
        true
    }

    pub fn snapshot(&self, event: &str) -> Vec<Arc<F>> {
        self.by_event
            .get(event)
            .map(|l| l.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of listeners for one event name
    pub fn listener_count(&self, event: &str) -> usize {
        self.by_event.get(event).map(|l| l.len()).unwrap_or(0)
    }
}

impl<F: ?Sized> Default for EventRegistry<F> {
    fn default() -> Self {
        Self::new()
    }
}
