//! Shutdown ordering for component instances.

use std::collections::HashSet;
use std::sync::Arc;

use crate::registry::ServiceRecord;

/// Records to deactivate at shutdown, drained in LIFO order.
///
/// An instance published under several registrations is queued once, at
/// its first (earliest) position.
#[derive(Default)]
pub(crate) struct TeardownQueue {
    entries: Vec<Arc<ServiceRecord>>,
    seen: HashSet<usize>,
}

impl TeardownQueue {
    /// Queues `record` unless its instance is already queued.
    pub(crate) fn push(&mut self, record: Arc<ServiceRecord>) -> bool {
        if self.seen.insert(Arc::as_ptr(&record.instance) as *const () as usize) {
            self.entries.push(record);
            true
        } else {
            false
        }
    }

    /// Pops the most recently queued record.
    pub(crate) fn pop(&mut self) -> Option<Arc<ServiceRecord>> {
        self.entries.pop()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::Properties;
    use crate::registry::AnyArc;

    fn record(id: u64, instance: &AnyArc) -> Arc<ServiceRecord> {
        Arc::new(ServiceRecord::new(id, vec!["a.Api".into()], instance.clone(), Properties::new(), None))
    }

    #[test]
    fn test_lifo_with_dedup() {
        let a: AnyArc = Arc::new(1u32);
        let b: AnyArc = Arc::new(2u32);
        let mut queue = TeardownQueue::default();
        assert!(queue.push(record(1, &a)));
        assert!(queue.push(record(2, &b)));
        assert!(!queue.push(record(3, &a)));

        let order: Vec<u64> = std::iter::from_fn(|| queue.pop()).map(|r| r.id).collect();
        assert_eq!(order, vec![2, 1]);
        assert!(queue.is_empty());
    }
}
