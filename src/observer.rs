//! Diagnostic observers for registry traceability.
//!
//! Observers see every registry mutation, reference (un)binding and greedy
//! restart of one container. They are called synchronously on the thread
//! driving the container, so keep implementations light.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::registry::ServiceReference;

/// Observer trait for registry and reconciliation events.
///
/// # Examples
///
/// ```
/// use osgi_mock::{MockBundleContext, RegistryObserver, ServiceReference};
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// #[derive(Default)]
/// struct Counting(AtomicUsize);
///
/// impl RegistryObserver for Counting {
///     fn registered(&self, _reference: &ServiceReference) {
///         self.0.fetch_add(1, Ordering::SeqCst);
///     }
///
///     fn unregistering(&self, _reference: &ServiceReference) {}
/// }
///
/// let observer = Arc::new(Counting::default());
/// let ctx = MockBundleContext::builder().observer(observer.clone()).build();
/// ctx.register_service(&["demo.Api"], Arc::new(1u8), Default::default()).unwrap();
/// assert_eq!(observer.0.load(Ordering::SeqCst), 1);
/// ```
pub trait RegistryObserver: Send + Sync {
    /// Called after a service entered the registry.
    fn registered(&self, reference: &ServiceReference);

    /// Called while a service is leaving the registry.
    fn unregistering(&self, reference: &ServiceReference);

    /// Called after a service's properties were replaced.
    fn modified(&self, _reference: &ServiceReference) {}

    /// Called after `service` was bound to `reference` of `component`.
    fn bound(&self, _component: &str, _reference: &str, _service: &ServiceReference) {}

    /// Called after `service` was unbound from `reference` of `component`.
    fn unbound(&self, _component: &str, _reference: &str, _service: &ServiceReference) {}

    /// Called before a static greedy dependent is restarted.
    fn restarting(&self, _component: &str, _reference: &ServiceReference) {}
}

/// Container for registered observers.
#[derive(Default)]
pub(crate) struct Observers {
    observers: Vec<Arc<dyn RegistryObserver>>,
}

impl Observers {
    pub(crate) fn add(&mut self, observer: Arc<dyn RegistryObserver>) {
        self.observers.push(observer);
    }

    #[inline]
    pub(crate) fn registered(&self, reference: &ServiceReference) {
        for observer in &self.observers {
            observer.registered(reference);
        }
    }

    #[inline]
    pub(crate) fn unregistering(&self, reference: &ServiceReference) {
        for observer in &self.observers {
            observer.unregistering(reference);
        }
    }

    #[inline]
    pub(crate) fn modified(&self, reference: &ServiceReference) {
        for observer in &self.observers {
            observer.modified(reference);
        }
    }

    #[inline]
    pub(crate) fn bound(&self, component: &str, reference: &str, service: &ServiceReference) {
        for observer in &self.observers {
            observer.bound(component, reference, service);
        }
    }

    #[inline]
    pub(crate) fn unbound(&self, component: &str, reference: &str, service: &ServiceReference) {
        for observer in &self.observers {
            observer.unbound(component, reference, service);
        }
    }

    #[inline]
    pub(crate) fn restarting(&self, component: &str, reference: &ServiceReference) {
        for observer in &self.observers {
            observer.restarting(component, reference);
        }
    }
}

/// Built-in observer that forwards events to `tracing`.
///
/// ```
/// use osgi_mock::{LoggingObserver, MockBundleContext};
/// use std::sync::Arc;
///
/// let ctx = MockBundleContext::builder()
///     .observer(Arc::new(LoggingObserver::with_prefix("registry-test")))
///     .build();
/// ```
pub struct LoggingObserver {
    prefix: String,
}

impl LoggingObserver {
    pub fn new() -> Self {
        Self {
            prefix: "osgi-mock".to_string(),
        }
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }
}

impl Default for LoggingObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryObserver for LoggingObserver {
    fn registered(&self, reference: &ServiceReference) {
        tracing::info!(
            prefix = %self.prefix,
            service.id = reference.service_id(),
            interfaces = ?reference.interfaces(),
            "service registered"
        );
    }

    fn unregistering(&self, reference: &ServiceReference) {
        tracing::info!(
            prefix = %self.prefix,
            service.id = reference.service_id(),
            interfaces = ?reference.interfaces(),
            "service unregistering"
        );
    }

    fn modified(&self, reference: &ServiceReference) {
        tracing::info!(prefix = %self.prefix, service.id = reference.service_id(), "service modified");
    }

    fn bound(&self, component: &str, reference: &str, service: &ServiceReference) {
        tracing::debug!(prefix = %self.prefix, component, reference, service.id = service.service_id(), "bound");
    }

    fn unbound(&self, component: &str, reference: &str, service: &ServiceReference) {
        tracing::debug!(prefix = %self.prefix, component, reference, service.id = service.service_id(), "unbound");
    }

    fn restarting(&self, component: &str, reference: &ServiceReference) {
        tracing::info!(prefix = %self.prefix, component, service.id = reference.service_id(), "restarting");
    }
}

/// Counts events with atomics.
#[derive(Default)]
pub struct MetricsObserver {
    registrations: AtomicU64,
    unregistrations: AtomicU64,
    modifications: AtomicU64,
    binds: AtomicU64,
    unbinds: AtomicU64,
    restarts: AtomicU64,
}

impl MetricsObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registrations(&self) -> u64 {
        self.registrations.load(Ordering::Relaxed)
    }

    pub fn unregistrations(&self) -> u64 {
        self.unregistrations.load(Ordering::Relaxed)
    }

    pub fn modifications(&self) -> u64 {
        self.modifications.load(Ordering::Relaxed)
    }

    pub fn binds(&self) -> u64 {
        self.binds.load(Ordering::Relaxed)
    }

    pub fn unbinds(&self) -> u64 {
        self.unbinds.load(Ordering::Relaxed)
    }

    pub fn restarts(&self) -> u64 {
        self.restarts.load(Ordering::Relaxed)
    }

    /// Services currently registered, as seen by this observer.
    pub fn live_services(&self) -> u64 {
        self.registrations().saturating_sub(self.unregistrations())
    }

    pub fn reset(&self) {
        for counter in [
            &self.registrations,
            &self.unregistrations,
            &self.modifications,
            &self.binds,
            &self.unbinds,
            &self.restarts,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl RegistryObserver for MetricsObserver {
    fn registered(&self, _reference: &ServiceReference) {
        self.registrations.fetch_add(1, Ordering::Relaxed);
    }

    fn unregistering(&self, _reference: &ServiceReference) {
        self.unregistrations.fetch_add(1, Ordering::Relaxed);
    }

    fn modified(&self, _reference: &ServiceReference) {
        self.modifications.fetch_add(1, Ordering::Relaxed);
    }

    fn bound(&self, _component: &str, _reference: &str, _service: &ServiceReference) {
        self.binds.fetch_add(1, Ordering::Relaxed);
    }

    fn unbound(&self, _component: &str, _reference: &str, _service: &ServiceReference) {
        self.unbinds.fetch_add(1, Ordering::Relaxed);
    }

    fn restarting(&self, _component: &str, _reference: &ServiceReference) {
        self.restarts.fetch_add(1, Ordering::Relaxed);
    }
}
