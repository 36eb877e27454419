use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::context::MockBundleContext;
use crate::error::OsgiResult;
use crate::injector;
use crate::metadata::{ComponentClass, EffectiveReference};
use crate::properties::Properties;
use crate::registry::AnyArc;

/// Component context handed to lifecycle methods and constructors.
///
/// Services are located through the component's declared references: by
/// what is currently bound to the instance, falling back to a registry
/// lookup with the reference's effective target filter.
#[derive(Clone)]
pub struct MockComponentContext {
    bundle_context: MockBundleContext,
    class: Arc<ComponentClass>,
    instance: Option<AnyArc>,
    properties: Properties,
}

impl MockComponentContext {
    pub(crate) fn new(
        bundle_context: MockBundleContext,
        class: Arc<ComponentClass>,
        instance: Option<AnyArc>,
        properties: Properties,
    ) -> Self {
        Self {
            bundle_context,
            class,
            instance,
            properties,
        }
    }

    /// Effective component properties.
    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn bundle_context(&self) -> &MockBundleContext {
        &self.bundle_context
    }

    /// The component instance; `None` while it is being constructed.
    pub fn component_instance(&self) -> Option<&AnyArc> {
        self.instance.as_ref()
    }

    /// The service bound (or bindable) to the reference called `name`.
    ///
    /// `None` when the component declares no such reference or nothing
    /// matches it.
    pub fn locate_service(&self, name: &str) -> OsgiResult<Option<AnyArc>> {
        if let Some(bound) = self.bound(name).last() {
            return Ok(Some(bound.clone()));
        }
        Ok(self.lookup(name)?.into_iter().next())
    }

    /// Every service for the reference called `name`, or `None`.
    pub fn locate_services(&self, name: &str) -> OsgiResult<Option<Vec<AnyArc>>> {
        let mut services = self.bound(name);
        if services.is_empty() {
            services = self.lookup(name)?;
        }
        Ok(if services.is_empty() { None } else { Some(services) })
    }

    /// Typed [`locate_service`](Self::locate_service).
    pub fn locate<S: Any + Send + Sync>(&self, name: &str) -> OsgiResult<Option<Arc<S>>> {
        Ok(self.locate_service(name)?.and_then(|s| s.downcast::<S>().ok()))
    }

    fn bound(&self, name: &str) -> Vec<AnyArc> {
        let Some(instance) = &self.instance else {
            return Vec::new();
        };
        self.bundle_context
            .inner()
            .instances
            .bindings(instance, name)
            .iter()
            .map(|r| r.instance().clone())
            .collect()
    }

    fn lookup(&self, name: &str) -> OsgiResult<Vec<AnyArc>> {
        let Some(reference) = self.class.metadata().reference(name) else {
            tracing::trace!(component = self.class.name(), reference = name, "no such reference");
            return Ok(Vec::new());
        };
        let effective = EffectiveReference::resolve(reference, &self.properties);
        Ok(injector::matching_services(&self.bundle_context, &effective)?
            .iter()
            .map(|r| r.instance().clone())
            .collect())
    }
}

impl fmt::Debug for MockComponentContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockComponentContext")
            .field("component", &self.class.name())
            .field("properties", &self.properties)
            .finish()
    }
}
