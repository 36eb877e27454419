//! High-level operations tests call on component instances.

use std::any::{type_name, Any, TypeId};
use std::sync::Arc;

use crate::context::MockBundleContext;
use crate::error::{OsgiError, OsgiResult};
use crate::injector;
use crate::lifecycle::{self, DEACTIVATION_REASON_UNSPECIFIED};
use crate::merge::{merge_for_activation, merge_with_metadata};
use crate::metadata::ComponentClass;
use crate::properties::Properties;
use crate::registry::AnyArc;

/// Entry points mirroring what a Declarative Services runtime does to a
/// component: inject, activate, modify, deactivate, register.
///
/// Every operation needs the component type to be registered with the
/// context's [`MetadataRegistry`](crate::MetadataRegistry) and fails with
/// [`OsgiError::NoScrMetadata`] otherwise.
///
/// # Examples
///
/// ```rust
/// use osgi_mock::{properties, ComponentClass, MockOsgi, OsgiMetadata};
/// use std::sync::atomic::{AtomicBool, Ordering};
///
/// #[derive(Default)]
/// struct Heartbeat {
///     running: AtomicBool,
/// }
///
/// let ctx = MockOsgi::new_bundle_context();
/// ctx.register_class(
///     ComponentClass::builder::<Heartbeat>(OsgiMetadata::new("demo.Heartbeat").with_service_interface("demo.Heartbeat"))
///         .default_constructor()
///         .method("activate", &[], |h, _| {
///             h.running.store(true, Ordering::SeqCst);
///             Ok(())
///         })
///         .build(),
/// );
///
/// let heartbeat = MockOsgi::register_injected_activate_service::<Heartbeat>(&ctx, properties! {}).unwrap();
/// assert!(heartbeat.running.load(Ordering::SeqCst));
/// assert!(ctx.service_reference("demo.Heartbeat").is_some());
/// ```
pub struct MockOsgi;

impl MockOsgi {
    pub fn new_bundle_context() -> MockBundleContext {
        MockBundleContext::new()
    }

    /// Injects every non-constructor reference of `instance`.
    pub fn inject_services<T: Any + Send + Sync>(
        instance: &Arc<T>,
        context: &MockBundleContext,
        properties: Properties,
    ) -> OsgiResult<()> {
        let class = class_for::<T>(context)?;
        let properties = merge_with_metadata(class.metadata(), context.configuration_admin(), &properties)?;
        injector::inject_services(context, &erase(instance), &class, &properties)
    }

    /// Calls the activate method with the merged component properties.
    pub fn activate<T: Any + Send + Sync>(
        instance: &Arc<T>,
        context: &MockBundleContext,
        properties: Properties,
    ) -> OsgiResult<()> {
        let class = class_for::<T>(context)?;
        let properties = merge_for_activation(class.metadata(), context.configuration_admin(), &properties)?;
        lifecycle::activate(context, &erase(instance), &class, &properties)
    }

    pub fn deactivate<T: Any + Send + Sync>(
        instance: &Arc<T>,
        context: &MockBundleContext,
        properties: Properties,
    ) -> OsgiResult<()> {
        Self::deactivate_with_reason(instance, context, properties, DEACTIVATION_REASON_UNSPECIFIED)
    }

    /// Like [`deactivate`](Self::deactivate) with an explicit reason code
    /// for `(reason)` parameters.
    pub fn deactivate_with_reason<T: Any + Send + Sync>(
        instance: &Arc<T>,
        context: &MockBundleContext,
        properties: Properties,
        reason: i32,
    ) -> OsgiResult<()> {
        let class = class_for::<T>(context)?;
        let properties = merge_for_activation(class.metadata(), context.configuration_admin(), &properties)?;
        lifecycle::deactivate(context, &erase(instance), &class, &properties, reason)
    }

    pub fn modified<T: Any + Send + Sync>(
        instance: &Arc<T>,
        context: &MockBundleContext,
        properties: Properties,
    ) -> OsgiResult<()> {
        let class = class_for::<T>(context)?;
        let properties = merge_for_activation(class.metadata(), context.configuration_admin(), &properties)?;
        lifecycle::modified(context, &erase(instance), &class, &properties)
    }

    /// Constructs (preferring constructor injection), injects and activates
    /// a new `T` without publishing it.
    pub fn activate_injected_service<T: Any + Send + Sync>(
        context: &MockBundleContext,
        properties: Properties,
    ) -> OsgiResult<Arc<T>> {
        let (instance, _) = build::<T>(context, properties)?;
        typed(instance)
    }

    /// [`activate_injected_service`](Self::activate_injected_service), then
    /// registers the instance under the component's service interfaces.
    pub fn register_injected_activate_service<T: Any + Send + Sync>(
        context: &MockBundleContext,
        properties: Properties,
    ) -> OsgiResult<Arc<T>> {
        let (instance, properties) = build::<T>(context, properties)?;
        context.register_record(Vec::new(), instance.clone(), properties, None)?;
        typed(instance)
    }

    /// Deactivates everything registered in `context` and releases its
    /// resources.
    pub fn shutdown(context: &MockBundleContext) -> OsgiResult<()> {
        context.shutdown()
    }
}

fn class_for<T: Any>(context: &MockBundleContext) -> OsgiResult<Arc<ComponentClass>> {
    context.metadata().get(TypeId::of::<T>()).ok_or_else(|| OsgiError::NoScrMetadata {
        class: type_name::<T>().to_string(),
    })
}

fn erase<T: Any + Send + Sync>(instance: &Arc<T>) -> AnyArc {
    instance.clone()
}

fn typed<T: Any + Send + Sync>(instance: AnyArc) -> OsgiResult<Arc<T>> {
    instance
        .downcast::<T>()
        .map_err(|_| OsgiError::TypeMismatch(type_name::<T>()))
}

fn build<T: Any + Send + Sync>(context: &MockBundleContext, properties: Properties) -> OsgiResult<(AnyArc, Properties)> {
    let class = class_for::<T>(context)?;
    let properties = merge_for_activation(class.metadata(), context.configuration_admin(), &properties)?;
    let instance = injector::instantiate(context, &class, &properties)?;
    injector::inject_services(context, &instance, &class, &properties)?;
    lifecycle::activate(context, &instance, &class, &properties)?;
    Ok((instance, properties))
}
