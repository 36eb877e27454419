//! Service records and the handles tests hold on to.

use std::any::Any;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::properties::{self, Properties, PropertyValue};
use crate::registry::ServiceFactory;

/// Type-erased service object.
pub type AnyArc = Arc<dyn Any + Send + Sync>;

static NEXT_SERVICE_ID: AtomicU64 = AtomicU64::new(1);

/// Next process-wide service id. Never reset, not even across containers.
pub(crate) fn next_service_id() -> u64 {
    NEXT_SERVICE_ID.fetch_add(1, AtomicOrdering::SeqCst)
}

/// One registered service.
pub(crate) struct ServiceRecord {
    pub(crate) id: u64,
    pub(crate) interfaces: Vec<String>,
    pub(crate) instance: AnyArc,
    pub(crate) properties: RwLock<Properties>,
    pub(crate) factory: Option<Arc<dyn ServiceFactory>>,
    registered: AtomicBool,
    usage: AtomicUsize,
}

impl ServiceRecord {
    pub(crate) fn new(
        id: u64,
        interfaces: Vec<String>,
        instance: AnyArc,
        properties: Properties,
        factory: Option<Arc<dyn ServiceFactory>>,
    ) -> Self {
        Self {
            id,
            interfaces,
            instance,
            properties: RwLock::new(properties),
            factory,
            registered: AtomicBool::new(true),
            usage: AtomicUsize::new(0),
        }
    }

    pub(crate) fn ranking(&self) -> i64 {
        properties::ranking(&self.properties.read())
    }

    pub(crate) fn is_registered(&self) -> bool {
        self.registered.load(AtomicOrdering::SeqCst)
    }

    pub(crate) fn mark_unregistered(&self) {
        self.registered.store(false, AtomicOrdering::SeqCst);
    }

    pub(crate) fn publishes(&self, interface: &str) -> bool {
        self.interfaces.iter().any(|i| i == interface)
    }

    /// Hands out the instance and counts the use; `None` once unregistered.
    pub(crate) fn acquire(&self) -> Option<AnyArc> {
        if !self.is_registered() {
            return None;
        }
        self.usage.fetch_add(1, AtomicOrdering::SeqCst);
        Some(self.instance.clone())
    }

    /// Drops one use. Returns false when there was none to drop.
    pub(crate) fn release(&self) -> bool {
        self.usage
            .fetch_update(AtomicOrdering::SeqCst, AtomicOrdering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    pub(crate) fn usage(&self) -> usize {
        self.usage.load(AtomicOrdering::SeqCst)
    }
}

/// Handle to a registered (or formerly registered) service.
///
/// Equality and hashing follow the service id. The natural order is the
/// OSGi `compareTo` order: lower ranking first, and among equal rankings the
/// later registration first, so the best service sorts *last*. Registry
/// lookups return the opposite order (best first).
///
/// # Examples
///
/// ```rust
/// use osgi_mock::{properties, MockBundleContext};
/// use std::sync::Arc;
///
/// let ctx = MockBundleContext::new();
/// let low = ctx.register_service(&["demo.Api"], Arc::new("low"), properties! { "service.ranking" => 1 }).unwrap();
/// let high = ctx.register_service(&["demo.Api"], Arc::new("high"), properties! { "service.ranking" => 9 }).unwrap();
///
/// let mut refs = vec![high.reference(), low.reference()];
/// refs.sort();
/// assert_eq!(refs.last(), Some(&high.reference()));
/// ```
#[derive(Clone)]
pub struct ServiceReference {
    record: Arc<ServiceRecord>,
}

impl ServiceReference {
    pub(crate) fn new(record: Arc<ServiceRecord>) -> Self {
        Self { record }
    }

    pub(crate) fn record(&self) -> &Arc<ServiceRecord> {
        &self.record
    }

    /// The service object regardless of registration state.
    pub(crate) fn instance(&self) -> &AnyArc {
        &self.record.instance
    }

    pub fn service_id(&self) -> u64 {
        self.record.id
    }

    pub fn ranking(&self) -> i64 {
        self.record.ranking()
    }

    pub fn interfaces(&self) -> &[String] {
        &self.record.interfaces
    }

    pub fn property(&self, key: &str) -> Option<PropertyValue> {
        self.record.properties.read().get(key).cloned()
    }

    pub fn property_keys(&self) -> Vec<String> {
        self.record.properties.read().keys().cloned().collect()
    }

    /// Snapshot of the current properties.
    pub fn properties(&self) -> Properties {
        self.record.properties.read().clone()
    }

    pub fn is_registered(&self) -> bool {
        self.record.is_registered()
    }

    /// Number of outstanding `get_service` calls.
    pub fn usage_count(&self) -> usize {
        self.record.usage()
    }
}

impl PartialEq for ServiceReference {
    fn eq(&self, other: &Self) -> bool {
        self.record.id == other.record.id
    }
}

impl Eq for ServiceReference {}

impl Hash for ServiceReference {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.record.id.hash(state);
    }
}

impl Ord for ServiceReference {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ranking()
            .cmp(&other.ranking())
            .then_with(|| other.service_id().cmp(&self.service_id()))
    }
}

impl PartialOrd for ServiceReference {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for ServiceReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceReference")
            .field("service_id", &self.record.id)
            .field("interfaces", &self.record.interfaces)
            .field("ranking", &self.ranking())
            .field("registered", &self.is_registered())
            .finish()
    }
}

/// Service handle that can be passed to bind methods instead of the service.
#[derive(Clone, Debug)]
pub struct ComponentServiceObjects {
    reference: ServiceReference,
}

impl ComponentServiceObjects {
    pub(crate) fn new(reference: ServiceReference) -> Self {
        Self { reference }
    }

    /// The service, counted as one use; `None` once unregistered.
    pub fn get_service(&self) -> Option<AnyArc> {
        self.reference.record.acquire()
    }

    pub fn unget_service(&self) -> bool {
        self.reference.record.release()
    }

    pub fn service_reference(&self) -> &ServiceReference {
        &self.reference
    }
}
