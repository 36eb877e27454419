//! The simulated container.
//!
//! A [`MockBundleContext`] owns one service registry together with its
//! listeners, configuration admin, component metadata and per-instance
//! state. Handles are cheap to clone and share the same container.

use std::any::Any;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tempfile::TempDir;

use crate::config_admin::MockConfigurationAdmin;
use crate::error::{OsgiError, OsgiResult};
use crate::filter::{parse_optional, Filter};
use crate::instance::{InstanceTable, LifecycleState};
use crate::internal::{RestartSet, TeardownQueue};
use crate::lifecycle::{self, DEACTIVATION_REASON_BUNDLE_STOPPED};
use crate::merge::merge_with_metadata;
use crate::metadata::{ComponentClass, MetadataRegistry, ServiceScope};
use crate::observer::Observers;
use crate::properties::{
    Properties, PropertyValue, FRAMEWORK_KEYS, OBJECTCLASS, SERVICE_BUNDLEID, SERVICE_ID, SERVICE_SCOPE,
};
use crate::reconciler;
use crate::registry::{
    next_service_id, AnyArc, BundleEvent, BundleListener, ComponentServiceObjects, ListenerMap, ServiceEvent,
    ServiceEventKind, ServiceFactory, ServiceListener, ServiceRecord, ServiceReference, ServiceRegistry,
};

pub mod builder;
pub mod component;

pub use builder::BundleContextBuilder;
pub use component::MockComponentContext;

static NEXT_BUNDLE_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) struct ContextInner {
    pub(crate) bundle_id: u64,
    pub(crate) registry: ServiceRegistry,
    pub(crate) listeners: ListenerMap,
    pub(crate) metadata: MetadataRegistry,
    pub(crate) instances: InstanceTable,
    pub(crate) observers: Observers,
    pub(crate) framework_properties: Properties,
    pub(crate) config_admin: MockConfigurationAdmin,
    pub(crate) restarts: RestartSet,
    data_dir: Mutex<Option<TempDir>>,
}

impl ContextInner {
    pub(crate) fn new(framework_properties: Properties, observers: Observers, config_admin: MockConfigurationAdmin) -> Self {
        Self {
            bundle_id: NEXT_BUNDLE_ID.fetch_add(1, Ordering::SeqCst),
            registry: ServiceRegistry::default(),
            listeners: ListenerMap::default(),
            metadata: MetadataRegistry::new(),
            instances: InstanceTable::default(),
            observers,
            framework_properties,
            config_admin,
            restarts: RestartSet::default(),
            data_dir: Mutex::new(None),
        }
    }
}

/// Simulated bundle context: the entry point tests work against.
///
/// # Examples
///
/// ```rust
/// use osgi_mock::{properties, MockBundleContext};
/// use std::sync::Arc;
///
/// let ctx = MockBundleContext::new();
/// let registration = ctx
///     .register_service(&["com.example.Greeter"], Arc::new(String::from("hello")), properties! {})
///     .unwrap();
///
/// let greeter = ctx.service_for::<String>("com.example.Greeter").unwrap();
/// assert_eq!(greeter.as_str(), "hello");
///
/// registration.unregister().unwrap();
/// assert!(registration.unregister().is_err());
/// assert!(ctx.service_references(Some("com.example.Greeter"), None).unwrap().is_none());
/// ```
#[derive(Clone)]
pub struct MockBundleContext {
    inner: Arc<ContextInner>,
}

impl MockBundleContext {
    /// Container with default settings.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> BundleContextBuilder {
        BundleContextBuilder::new()
    }

    pub(crate) fn from_inner(inner: ContextInner) -> Self {
        Self { inner: Arc::new(inner) }
    }

    #[inline]
    pub(crate) fn inner(&self) -> &ContextInner {
        &self.inner
    }

    pub fn bundle_id(&self) -> u64 {
        self.inner.bundle_id
    }

    /// Makes a component type known to this container.
    pub fn register_class(&self, class: ComponentClass) -> Arc<ComponentClass> {
        self.inner.metadata.register(class)
    }

    pub fn metadata(&self) -> &MetadataRegistry {
        &self.inner.metadata
    }

    pub fn configuration_admin(&self) -> &MockConfigurationAdmin {
        &self.inner.config_admin
    }

    /// Framework property seeded through the builder.
    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.inner.framework_properties.get(key)
    }

    /// Publishes `service` under `interfaces`.
    ///
    /// With no interfaces the component's declared service interfaces are
    /// used. Component services get their descriptor defaults and stored
    /// configuration merged beneath `properties`.
    pub fn register_service(
        &self,
        interfaces: &[&str],
        service: AnyArc,
        properties: Properties,
    ) -> OsgiResult<ServiceRegistration> {
        let interfaces = interfaces.iter().map(|i| i.to_string()).collect();
        self.register_record(interfaces, service, properties, None)
    }

    /// Publishes the object produced by `factory`, asked once now.
    pub fn register_service_factory(
        &self,
        interfaces: &[&str],
        factory: Arc<dyn ServiceFactory>,
        properties: Properties,
    ) -> OsgiResult<ServiceRegistration> {
        let service = factory.get_service(self);
        let interfaces = interfaces.iter().map(|i| i.to_string()).collect();
        self.register_record(interfaces, service, properties, Some(factory))
    }

    pub(crate) fn register_record(
        &self,
        interfaces: Vec<String>,
        instance: AnyArc,
        properties: Properties,
        factory: Option<Arc<dyn ServiceFactory>>,
    ) -> OsgiResult<ServiceRegistration> {
        let inner = self.inner();
        let class = inner.metadata.class_of(&instance);
        let interfaces = match (&class, interfaces.is_empty()) {
            (Some(class), true) => class.metadata().service_interfaces().to_vec(),
            _ => interfaces,
        };
        let mut properties = match &class {
            Some(class) => merge_with_metadata(class.metadata(), &inner.config_admin, &properties)?,
            None => properties,
        };
        let scope = class.as_ref().map(|c| c.metadata().scope()).unwrap_or_default();

        let id = next_service_id();
        self.stamp(&mut properties, id, &interfaces, scope);
        let record = Arc::new(ServiceRecord::new(id, interfaces, instance, properties, factory));
        inner.registry.insert(record.clone());
        tracing::debug!(service.id = id, interfaces = ?record.interfaces, "service registered");

        let reconciliation = match reconciler::plan(self, &record) {
            Ok(plan) => plan,
            Err(err) => {
                inner.registry.remove(&record);
                record.mark_unregistered();
                return Err(err);
            }
        };
        let reference = ServiceReference::new(record.clone());
        if let Err(err) = reconciliation.bind_dynamic(self, &reference) {
            // dependents bound before the failure give the service back
            if let Err(undo) = reconciliation.unbind_dynamic(self, &reference) {
                tracing::warn!(service.id = id, error = %undo, "unbind during registration rollback failed");
            }
            inner.registry.remove(&record);
            record.mark_unregistered();
            return Err(err);
        }
        inner
            .listeners
            .notify(&ServiceEvent::new(ServiceEventKind::Registered, reference.clone()));
        inner.observers.registered(&reference);
        reconciliation.restart_all(self)?;

        Ok(ServiceRegistration {
            context: self.clone(),
            reference,
        })
    }

    fn stamp(&self, properties: &mut Properties, id: u64, interfaces: &[String], scope: ServiceScope) {
        properties.insert(SERVICE_ID.to_string(), PropertyValue::from(id));
        properties.insert(OBJECTCLASS.to_string(), PropertyValue::from(interfaces.to_vec()));
        properties.insert(SERVICE_BUNDLEID.to_string(), PropertyValue::from(self.inner.bundle_id));
        properties.insert(SERVICE_SCOPE.to_string(), PropertyValue::from(scope.as_str()));
    }

    pub(crate) fn unregister_record(&self, record: &Arc<ServiceRecord>) -> OsgiResult<()> {
        let inner = self.inner();
        if !inner.registry.remove(record) {
            return Err(OsgiError::AlreadyUnregistered);
        }
        record.mark_unregistered();
        tracing::debug!(service.id = record.id, interfaces = ?record.interfaces, "service unregistered");

        let reference = ServiceReference::new(record.clone());
        let reconciliation = reconciler::plan(self, record)?;
        reconciliation.unbind_dynamic(self, &reference)?;
        inner
            .listeners
            .notify(&ServiceEvent::new(ServiceEventKind::Unregistering, reference.clone()));
        inner.observers.unregistering(&reference);
        if let Some(factory) = &record.factory {
            factory.unget_service(self, &record.instance);
        }
        reconciliation.restart_all(self)?;
        let pruned = inner.instances.prune();
        if pruned > 0 {
            tracing::trace!(pruned, "dropped state of released instances");
        }
        Ok(())
    }

    fn set_record_properties(&self, record: &Arc<ServiceRecord>, mut properties: Properties) -> OsgiResult<()> {
        if !record.is_registered() {
            return Err(OsgiError::AlreadyUnregistered);
        }
        {
            let current = record.properties.read();
            for key in FRAMEWORK_KEYS {
                match current.get(key) {
                    Some(value) => properties.insert(key.to_string(), value.clone()),
                    None => properties.remove(key),
                };
            }
        }
        if !self.inner.registry.update_properties(record, properties) {
            return Err(OsgiError::AlreadyUnregistered);
        }
        let reference = ServiceReference::new(record.clone());
        tracing::debug!(service.id = record.id, "service properties replaced");
        self.inner
            .listeners
            .notify(&ServiceEvent::new(ServiceEventKind::Modified, reference.clone()));
        self.inner.observers.modified(&reference);
        Ok(())
    }

    /// References publishing `interface` (any, if `None`) that match
    /// `filter`, best first. `None` when nothing matches.
    pub fn service_references(
        &self,
        interface: Option<&str>,
        filter: Option<&str>,
    ) -> OsgiResult<Option<Vec<ServiceReference>>> {
        let filter = parse_optional(filter)?;
        let found = self
            .inner
            .registry
            .lookup(interface, filter.as_ref().map(|f| f as &dyn Filter));
        Ok(if found.is_empty() { None } else { Some(found) })
    }

    /// The best service reference for `interface`.
    pub fn service_reference(&self, interface: &str) -> Option<ServiceReference> {
        self.inner.registry.lookup(Some(interface), None).into_iter().next()
    }

    /// The service behind `reference`, counted as one use.
    pub fn get_service(&self, reference: &ServiceReference) -> Option<AnyArc> {
        reference.record().acquire()
    }

    /// Typed [`get_service`](Self::get_service).
    pub fn service<S: Any + Send + Sync>(&self, reference: &ServiceReference) -> Option<Arc<S>> {
        self.get_service(reference)?.downcast::<S>().ok()
    }

    /// Releases one use. False when the service was not in use.
    pub fn unget_service(&self, reference: &ServiceReference) -> bool {
        reference.record().release()
    }

    pub fn service_objects(&self, reference: &ServiceReference) -> ComponentServiceObjects {
        ComponentServiceObjects::new(reference.clone())
    }

    /// Best service for `interface`, downcast to `S`. Does not count a use.
    pub fn service_for<S: Any + Send + Sync>(&self, interface: &str) -> Option<Arc<S>> {
        self.service_reference(interface)?.instance().clone().downcast::<S>().ok()
    }

    /// Every service for `interface` that downcasts to `S`, best first.
    pub fn services_for<S: Any + Send + Sync>(&self, interface: &str) -> Vec<Arc<S>> {
        self.inner
            .registry
            .lookup(Some(interface), None)
            .into_iter()
            .filter_map(|r| r.instance().clone().downcast::<S>().ok())
            .collect()
    }

    /// Adds a listener, or replaces the filter of one already added.
    pub fn add_service_listener(&self, listener: Arc<dyn ServiceListener>, filter: Option<&str>) -> OsgiResult<()> {
        self.inner.listeners.add(listener, filter)
    }

    pub fn remove_service_listener(&self, listener: &Arc<dyn ServiceListener>) -> bool {
        self.inner.listeners.remove(listener)
    }

    pub fn add_bundle_listener(&self, listener: Arc<dyn BundleListener>) {
        self.inner.listeners.add_bundle(listener)
    }

    pub fn remove_bundle_listener(&self, listener: &Arc<dyn BundleListener>) -> bool {
        self.inner.listeners.remove_bundle(listener)
    }

    /// Path of `name` inside this container's data directory, which is
    /// created on first use and removed by [`shutdown`](Self::shutdown).
    pub fn data_file(&self, name: &str) -> OsgiResult<PathBuf> {
        let mut dir = self.inner.data_dir.lock();
        let root = match dir.as_ref() {
            Some(existing) => existing.path().to_path_buf(),
            None => {
                let created = tempfile::Builder::new()
                    .prefix("osgi-mock-")
                    .tempdir()
                    .map_err(OsgiError::io)?;
                let root = created.path().to_path_buf();
                tracing::debug!(path = %root.display(), "created bundle data directory");
                *dir = Some(created);
                root
            }
        };
        Ok(root.join(name))
    }

    pub fn lifecycle_state(&self, instance: &AnyArc) -> LifecycleState {
        self.inner.instances.state(instance)
    }

    /// Number of registered services.
    pub fn service_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// Deactivates every registered component, newest registration first
    /// and each instance once, then clears the container.
    ///
    /// Every instance gets its deactivation even when an earlier one fails;
    /// the first failure is returned.
    pub fn shutdown(&self) -> OsgiResult<()> {
        let inner = self.inner();
        inner.listeners.notify_bundle(BundleEvent::Stopping);

        let mut records = inner.registry.snapshot();
        records.sort_by_key(|r| r.id);
        let mut queue = TeardownQueue::default();
        for record in records {
            queue.push(record);
        }
        if queue.is_empty() {
            tracing::trace!(bundle.id = inner.bundle_id, "nothing to deactivate");
        }

        let mut first_error = None;
        while let Some(record) = queue.pop() {
            let Some(class) = inner.metadata.class_of(&record.instance) else {
                continue;
            };
            if inner.instances.state(&record.instance) == LifecycleState::Deactivated {
                continue;
            }
            let properties = record.properties.read().clone();
            if let Err(err) = lifecycle::deactivate(
                self,
                &record.instance,
                &class,
                &properties,
                DEACTIVATION_REASON_BUNDLE_STOPPED,
            ) {
                tracing::warn!(component = class.name(), error = %err, "deactivation failed during shutdown");
                first_error.get_or_insert(err);
            }
        }

        for record in inner.registry.clear() {
            record.mark_unregistered();
        }
        inner.instances.clear();
        if let Some(dir) = inner.data_dir.lock().take() {
            if let Err(err) = dir.close() {
                first_error.get_or_insert(OsgiError::io(err));
            }
        }
        tracing::debug!(bundle.id = inner.bundle_id, "bundle context shut down");
        first_error.map_or(Ok(()), Err)
    }
}

impl Default for MockBundleContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockBundleContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockBundleContext")
            .field("bundle_id", &self.inner.bundle_id)
            .field("services", &self.inner.registry.len())
            .field("listeners", &self.inner.listeners.len())
            .field("classes", &self.inner.metadata.len())
            .finish()
    }
}

/// Handle returned by registration.
#[derive(Clone)]
pub struct ServiceRegistration {
    context: MockBundleContext,
    reference: ServiceReference,
}

impl ServiceRegistration {
    pub fn reference(&self) -> ServiceReference {
        self.reference.clone()
    }

    /// Replaces the service properties. Registry-owned keys are kept.
    pub fn set_properties(&self, properties: Properties) -> OsgiResult<()> {
        self.context.set_record_properties(self.reference.record(), properties)
    }

    /// Fails with [`OsgiError::AlreadyUnregistered`] on the second call.
    pub fn unregister(&self) -> OsgiResult<()> {
        self.context.unregister_record(self.reference.record())
    }
}

impl std::fmt::Debug for ServiceRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistration")
            .field("reference", &self.reference)
            .finish()
    }
}
