//! Per-instance runtime state: lifecycle phase and bound references.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::registry::{AnyArc, ServiceReference};

/// Lifecycle phase of one component instance.
///
/// `Deactivated` is terminal; a restart always works on a fresh instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LifecycleState {
    #[default]
    Unactivated,
    Activated,
    Deactivated,
}

fn instance_key(instance: &AnyArc) -> usize {
    Arc::as_ptr(instance) as *const () as usize
}

struct InstanceEntry {
    // Pins the allocation so the key cannot be reused, without keeping the
    // instance itself alive.
    handle: Weak<dyn Any + Send + Sync>,
    state: LifecycleState,
    bindings: HashMap<String, Vec<ServiceReference>>,
}

/// Instances the container has touched, keyed by object identity.
///
/// Entries do not own their instance. Once nothing else holds an instance,
/// [`InstanceTable::prune`] drops its entry.
#[derive(Default)]
pub(crate) struct InstanceTable {
    entries: Mutex<HashMap<usize, InstanceEntry>>,
}

impl InstanceTable {
    fn with_entry<R>(&self, instance: &AnyArc, f: impl FnOnce(&mut InstanceEntry) -> R) -> R {
        let mut entries = self.entries.lock();
        let entry = entries.entry(instance_key(instance)).or_insert_with(|| InstanceEntry {
            handle: Arc::downgrade(instance),
            state: LifecycleState::Unactivated,
            bindings: HashMap::new(),
        });
        f(entry)
    }

    pub(crate) fn state(&self, instance: &AnyArc) -> LifecycleState {
        self.entries
            .lock()
            .get(&instance_key(instance))
            .map_or(LifecycleState::Unactivated, |e| e.state)
    }

    pub(crate) fn set_state(&self, instance: &AnyArc, state: LifecycleState) {
        self.with_entry(instance, |e| e.state = state);
    }

    pub(crate) fn bindings(&self, instance: &AnyArc, reference: &str) -> Vec<ServiceReference> {
        self.entries
            .lock()
            .get(&instance_key(instance))
            .and_then(|e| e.bindings.get(reference).cloned())
            .unwrap_or_default()
    }

    pub(crate) fn bind(&self, instance: &AnyArc, reference: &str, service: ServiceReference) {
        self.with_entry(instance, |e| e.bindings.entry(reference.to_string()).or_default().push(service));
    }

    /// Removes the most recent binding of `service`; false if it was not bound.
    pub(crate) fn unbind(&self, instance: &AnyArc, reference: &str, service: &ServiceReference) -> bool {
        self.with_entry(instance, |e| {
            let Some(bound) = e.bindings.get_mut(reference) else {
                return false;
            };
            match bound.iter().rposition(|r| r == service) {
                Some(index) => {
                    bound.remove(index);
                    true
                }
                None => false,
            }
        })
    }

    pub(crate) fn clear_bindings(&self, instance: &AnyArc) {
        if let Some(entry) = self.entries.lock().get_mut(&instance_key(instance)) {
            entry.bindings.clear();
        }
    }

    /// Drops entries whose instance is gone; returns how many.
    pub(crate) fn prune(&self) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, e| e.handle.strong_count() > 0);
        before - entries.len()
    }

    pub(crate) fn clear(&self) {
        self.entries.lock().clear();
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.lock().len()
    }
}
