//! The ordered service registry of one simulated container.
//!
//! Records are kept sorted by ranking (highest first) and then by id
//! (earliest first), so every lookup is a linear scan that already yields
//! results in the order callers expect.

use std::cmp::{Ordering, Reverse};
use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::context::MockBundleContext;
use crate::filter::Filter;
use crate::properties::Properties;

pub mod event;
pub mod record;

pub use event::{BundleEvent, BundleListener, ServiceEvent, ServiceEventKind, ServiceListener};
pub(crate) use event::ListenerMap;
pub use record::{AnyArc, ComponentServiceObjects, ServiceReference};
pub(crate) use record::{next_service_id, ServiceRecord};

/// Produces the service object for a registration.
///
/// The mock asks once, at registration time, and keeps that object for
/// every consumer.
pub trait ServiceFactory: Send + Sync {
    fn get_service(&self, context: &MockBundleContext) -> AnyArc;

    /// Called once when the registration goes away.
    fn unget_service(&self, _context: &MockBundleContext, _service: &AnyArc) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RecordKey {
    ranking: Reverse<i64>,
    id: u64,
}

impl RecordKey {
    fn of(record: &ServiceRecord) -> Self {
        Self::new(record.ranking(), record.id)
    }

    fn new(ranking: i64, id: u64) -> Self {
        Self {
            ranking: Reverse(ranking),
            id,
        }
    }
}

impl Ord for RecordKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ranking.cmp(&other.ranking).then(self.id.cmp(&other.id))
    }
}

impl PartialOrd for RecordKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Default)]
pub(crate) struct ServiceRegistry {
    records: RwLock<BTreeMap<RecordKey, Arc<ServiceRecord>>>,
}

impl ServiceRegistry {
    pub(crate) fn insert(&self, record: Arc<ServiceRecord>) {
        self.records.write().insert(RecordKey::of(&record), record);
    }

    /// Removes the record; false when it was not present.
    pub(crate) fn remove(&self, record: &ServiceRecord) -> bool {
        self.records.write().remove(&RecordKey::of(record)).is_some()
    }

    /// Records publishing `interface` (any, if `None`) that satisfy `filter`,
    /// in registry order.
    pub(crate) fn lookup(&self, interface: Option<&str>, filter: Option<&dyn Filter>) -> Vec<ServiceReference> {
        self.records
            .read()
            .values()
            .filter(|r| interface.map_or(true, |i| r.publishes(i)))
            .filter(|r| filter.map_or(true, |f| f.matches(&r.properties.read())))
            .map(|r| ServiceReference::new(r.clone()))
            .collect()
    }

    /// Replaces the properties and re-sorts the record under its new ranking.
    pub(crate) fn update_properties(&self, record: &Arc<ServiceRecord>, properties: Properties) -> bool {
        let mut records = self.records.write();
        let Some(current) = records.remove(&RecordKey::of(record)) else {
            return false;
        };
        *current.properties.write() = properties;
        records.insert(RecordKey::of(&current), current);
        true
    }

    /// All records in registry order.
    pub(crate) fn snapshot(&self) -> Vec<Arc<ServiceRecord>> {
        self.records.read().values().cloned().collect()
    }

    pub(crate) fn clear(&self) -> Vec<Arc<ServiceRecord>> {
        let drained = std::mem::take(&mut *self.records.write());
        drained.into_values().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.records.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::LdapFilter;
    use crate::properties::{self, PropertyValue};

    fn add(registry: &ServiceRegistry, interface: &str, name: &str, ranking: Option<i64>) -> Arc<ServiceRecord> {
        let mut props = crate::properties! { "name" => name };
        if let Some(r) = ranking {
            props.insert(properties::SERVICE_RANKING.into(), PropertyValue::from(r));
        }
        let record = Arc::new(ServiceRecord::new(
            next_service_id(),
            vec![interface.into()],
            Arc::new(name.to_string()),
            props,
            None,
        ));
        registry.insert(record.clone());
        record
    }

    fn names(refs: &[ServiceReference]) -> String {
        refs.iter()
            .map(|r| r.property("name").map(|v| v.to_string()).unwrap_or_default())
            .collect()
    }

    #[test]
    fn test_lookup_orders_by_ranking_then_id() {
        let registry = ServiceRegistry::default();
        add(&registry, "s", "A", Some(3));
        add(&registry, "s", "B", Some(5));
        add(&registry, "s", "C", Some(4));
        add(&registry, "s", "D", None);
        add(&registry, "s", "E", Some(4));
        assert_eq!(names(&registry.lookup(Some("s"), None)), "BCEAD");
    }

    #[test]
    fn test_lookup_filters_interface_and_properties() {
        let registry = ServiceRegistry::default();
        add(&registry, "x", "A", None);
        add(&registry, "y", "B", None);
        add(&registry, "x", "C", None);

        assert_eq!(names(&registry.lookup(Some("x"), None)), "AC");
        assert_eq!(names(&registry.lookup(None, None)), "ABC");

        let filter = LdapFilter::parse("(name=C)").unwrap();
        assert_eq!(names(&registry.lookup(Some("x"), Some(&filter))), "C");
        assert!(registry.lookup(Some("z"), None).is_empty());
    }

    #[test]
    fn test_update_properties_resorts() {
        let registry = ServiceRegistry::default();
        let a = add(&registry, "s", "A", None);
        add(&registry, "s", "B", None);

        let mut props = a.properties.read().clone();
        props.insert(properties::SERVICE_RANKING.into(), PropertyValue::from(-1));
        assert!(registry.update_properties(&a, props));
        assert_eq!(names(&registry.lookup(Some("s"), None)), "BA");
    }

    #[test]
    fn test_remove_twice() {
        let registry = ServiceRegistry::default();
        let a = add(&registry, "s", "A", None);
        assert!(registry.remove(&a));
        assert!(!registry.remove(&a));
        assert_eq!(registry.len(), 0);
    }
}
