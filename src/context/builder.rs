use std::sync::Arc;

use crate::config_admin::{ConfigurationStore, MockConfigurationAdmin, CONFIGURATION_ADMIN_INTERFACE};
use crate::context::{ContextInner, MockBundleContext};
use crate::metadata::{ComponentClass, ServiceScope};
use crate::observer::{Observers, RegistryObserver};
use crate::properties::{Properties, PropertyValue};
use crate::registry::{next_service_id, AnyArc, ServiceRecord};

/// Builder for a [`MockBundleContext`].
///
/// # Examples
///
/// ```rust
/// use osgi_mock::{MetricsObserver, MockBundleContext, PropertyValue};
/// use std::sync::Arc;
///
/// let metrics = Arc::new(MetricsObserver::new());
/// let ctx = MockBundleContext::builder()
///     .framework_property("org.osgi.framework.vendor", "acme")
///     .observer(metrics.clone())
///     .build();
///
/// assert_eq!(ctx.property("org.osgi.framework.vendor"), Some(&PropertyValue::from("acme")));
///
/// // the built-in configuration admin is not reported
/// assert_eq!(ctx.service_count(), 1);
/// assert_eq!(metrics.registrations(), 0);
///
/// ctx.register_service(&["demo.Api"], Arc::new(1u8), Default::default()).unwrap();
/// assert_eq!(metrics.registrations(), 1);
/// ```
#[derive(Default)]
pub struct BundleContextBuilder {
    framework_properties: Properties,
    observers: Observers,
    classes: Vec<ComponentClass>,
    store: Option<Arc<dyn ConfigurationStore>>,
}

impl BundleContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn framework_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.framework_properties.insert(key.into(), value.into());
        self
    }

    pub fn observer(mut self, observer: Arc<dyn RegistryObserver>) -> Self {
        self.observers.add(observer);
        self
    }

    /// Registers component metadata up front.
    pub fn component(mut self, class: ComponentClass) -> Self {
        self.classes.push(class);
        self
    }

    /// Backs the configuration admin with `store` instead of memory.
    pub fn configuration_store(mut self, store: Arc<dyn ConfigurationStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> MockBundleContext {
        let config_admin = match self.store {
            Some(store) => MockConfigurationAdmin::with_store(store),
            None => MockConfigurationAdmin::new(),
        };
        let ctx = MockBundleContext::from_inner(ContextInner::new(
            self.framework_properties,
            self.observers,
            config_admin.clone(),
        ));
        for class in self.classes {
            ctx.register_class(class);
        }

        // Nothing can depend on it yet: no reconciliation, no events.
        let id = next_service_id();
        let interfaces = vec![CONFIGURATION_ADMIN_INTERFACE.to_string()];
        let mut properties = Properties::new();
        ctx.stamp(&mut properties, id, &interfaces, ServiceScope::Singleton);
        let instance: AnyArc = Arc::new(config_admin);
        let record = ServiceRecord::new(id, interfaces, instance, properties, None);
        ctx.inner().registry.insert(Arc::new(record));

        tracing::debug!(bundle.id = ctx.bundle_id(), "bundle context created");
        ctx
    }
}
