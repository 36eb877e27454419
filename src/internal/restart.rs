//! Re-entrancy guard for greedy restarts.
//!
//! A restart unregisters and re-registers a service, and both steps run
//! reconciliation again. Two components with greedy references to each
//! other would restart one another forever; the guard lets each logical
//! component be restarting at most once along one call chain.
//!
//! A restart replaces the instance and the service id but keeps the
//! `component.id`, so the guard keys on the implementation type plus that
//! id. Instances of one type with different ids restart independently.

use std::any::TypeId;

use parking_lot::Mutex;

use crate::properties::{Properties, PropertyValue, COMPONENT_ID};

const MAX_DEPTH: usize = 64;

/// Identity of a component that outlives its restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RestartKey {
    class: TypeId,
    component: Option<i64>,
}

impl RestartKey {
    pub(crate) fn new(class: TypeId, properties: &Properties) -> Self {
        Self {
            class,
            component: properties.get(COMPONENT_ID).and_then(PropertyValue::as_i64),
        }
    }
}

/// Components currently being restarted.
#[derive(Default)]
pub(crate) struct RestartSet {
    active: Mutex<Vec<RestartKey>>,
}

impl RestartSet {
    /// Marks `key` as restarting, or returns `None` if it already is
    /// (or the chain is too deep).
    pub(crate) fn enter(&self, key: RestartKey) -> Option<RestartGuard<'_>> {
        let mut active = self.active.lock();
        if active.contains(&key) || active.len() >= MAX_DEPTH {
            return None;
        }
        active.push(key);
        Some(RestartGuard { set: self, key })
    }

    pub(crate) fn is_restarting(&self, key: RestartKey) -> bool {
        self.active.lock().contains(&key)
    }

    /// Components on the current chain, outermost first.
    pub(crate) fn chain(&self) -> Vec<RestartKey> {
        self.active.lock().clone()
    }
}

/// Leaves the restart set when dropped, also on early error returns.
pub(crate) struct RestartGuard<'a> {
    set: &'a RestartSet,
    key: RestartKey,
}

impl Drop for RestartGuard<'_> {
    fn drop(&mut self) {
        let mut active = self.set.active.lock();
        if let Some(pos) = active.iter().rposition(|k| *k == self.key) {
            active.remove(pos);
        }
    }
}
