//! Service and bundle events and the listener map that delivers them.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::OsgiResult;
use crate::filter::{parse_optional, Filter, LdapFilter};
use crate::registry::ServiceReference;

/// What happened to a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceEventKind {
    Registered,
    Modified,
    Unregistering,
}

/// A service event as delivered to listeners.
#[derive(Debug, Clone)]
pub struct ServiceEvent {
    kind: ServiceEventKind,
    reference: ServiceReference,
}

impl ServiceEvent {
    pub(crate) fn new(kind: ServiceEventKind, reference: ServiceReference) -> Self {
        Self { kind, reference }
    }

    pub fn kind(&self) -> ServiceEventKind {
        self.kind
    }

    pub fn reference(&self) -> &ServiceReference {
        &self.reference
    }
}

/// Receives service events.
///
/// Closures taking a `&ServiceEvent` are listeners too.
pub trait ServiceListener: Send + Sync {
    fn service_changed(&self, event: &ServiceEvent);
}

impl<F> ServiceListener for F
where
    F: Fn(&ServiceEvent) + Send + Sync,
{
    fn service_changed(&self, event: &ServiceEvent) {
        self(event)
    }
}

/// Bundle state changes. Only shutdown is simulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BundleEvent {
    Stopping,
}

pub trait BundleListener: Send + Sync {
    fn bundle_changed(&self, event: BundleEvent);
}

impl<F> BundleListener for F
where
    F: Fn(BundleEvent) + Send + Sync,
{
    fn bundle_changed(&self, event: BundleEvent) {
        self(event)
    }
}

fn same_listener<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// Listener to optional filter. Adding a listener twice replaces its filter.
#[derive(Default)]
pub(crate) struct ListenerMap {
    service: RwLock<Vec<(Arc<dyn ServiceListener>, Option<LdapFilter>)>>,
    bundle: RwLock<Vec<Arc<dyn BundleListener>>>,
}

impl ListenerMap {
    pub(crate) fn add(&self, listener: Arc<dyn ServiceListener>, filter: Option<&str>) -> OsgiResult<()> {
        let filter = parse_optional(filter)?;
        let mut service = self.service.write();
        match service.iter_mut().find(|(l, _)| same_listener(l, &listener)) {
            Some(entry) => entry.1 = filter,
            None => service.push((listener, filter)),
        }
        Ok(())
    }

    pub(crate) fn remove(&self, listener: &Arc<dyn ServiceListener>) -> bool {
        let mut service = self.service.write();
        let before = service.len();
        service.retain(|(l, _)| !same_listener(l, listener));
        service.len() != before
    }

    /// Delivers outside the lock so listeners may call back into the context.
    pub(crate) fn notify(&self, event: &ServiceEvent) {
        let properties = event.reference().properties();
        let targets: Vec<Arc<dyn ServiceListener>> = self
            .service
            .read()
            .iter()
            .filter(|(_, filter)| filter.as_ref().map_or(true, |f| f.matches(&properties)))
            .map(|(l, _)| l.clone())
            .collect();
        for listener in targets {
            listener.service_changed(event);
        }
    }

    pub(crate) fn add_bundle(&self, listener: Arc<dyn BundleListener>) {
        let mut bundle = self.bundle.write();
        if !bundle.iter().any(|l| same_listener(l, &listener)) {
            bundle.push(listener);
        }
    }

    pub(crate) fn remove_bundle(&self, listener: &Arc<dyn BundleListener>) -> bool {
        let mut bundle = self.bundle.write();
        let before = bundle.len();
        bundle.retain(|l| !same_listener(l, listener));
        bundle.len() != before
    }

    pub(crate) fn notify_bundle(&self, event: BundleEvent) {
        let targets: Vec<Arc<dyn BundleListener>> = self.bundle.read().clone();
        for listener in targets {
            listener.bundle_changed(event);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.service.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties;
    use crate::registry::{ServiceRecord, ServiceReference};
    use parking_lot::Mutex;

    fn event(ranking: i64) -> ServiceEvent {
        let record = ServiceRecord::new(
            1,
            vec!["a.Api".into()],
            Arc::new(()),
            properties! { "service.ranking" => ranking },
            None,
        );
        ServiceEvent::new(ServiceEventKind::Registered, ServiceReference::new(Arc::new(record)))
    }

    #[test]
    fn test_filtered_delivery() {
        let map = ListenerMap::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let listener: Arc<dyn ServiceListener> = Arc::new(move |e: &ServiceEvent| sink.lock().push(e.reference().ranking()));
        map.add(listener, Some("(service.ranking>=5)")).unwrap();

        map.notify(&event(1));
        map.notify(&event(7));
        assert_eq!(seen.lock().as_slice(), [7]);
    }

    #[test]
    fn test_re_adding_replaces_filter() {
        let map = ListenerMap::default();
        let count = Arc::new(Mutex::new(0));
        let sink = count.clone();
        let listener: Arc<dyn ServiceListener> = Arc::new(move |_: &ServiceEvent| *sink.lock() += 1);

        map.add(listener.clone(), Some("(service.ranking=100)")).unwrap();
        map.add(listener.clone(), None).unwrap();
        assert_eq!(map.len(), 1);

        map.notify(&event(1));
        assert_eq!(*count.lock(), 1);
        assert!(map.remove(&listener));
        assert!(!map.remove(&listener));
    }

    #[test]
    fn test_invalid_filter_rejected() {
        let map = ListenerMap::default();
        let listener: Arc<dyn ServiceListener> = Arc::new(|_: &ServiceEvent| {});
        assert!(map.add(listener, Some("(broken")).is_err());
        assert_eq!(map.len(), 0);
    }
}
