//! Keeps dependents in step with registry changes.
//!
//! Every register and unregister is planned once against the other
//! registered services: dynamic references are bound or unbound in place,
//! static greedy dependents are collected (deduplicated) and restarted after
//! the triggering change completed. A restart re-enters registration, which
//! plans its own follow-ups; the restart guard stops a component from being
//! restarted again further down its own chain.
//!
//! Two components with greedy references to each other cannot both end up
//! holding the other's current instance: whichever is instantiated last sees
//! the current peer, and that peer was injected before it existed.

use std::collections::HashSet;
use std::sync::Arc;

use crate::context::MockBundleContext;
use crate::error::OsgiResult;
use crate::filter::Filter;
use crate::injector;
use crate::instance::LifecycleState;
use crate::internal::RestartKey;
use crate::lifecycle::{self, DEACTIVATION_REASON_REFERENCE};
use crate::metadata::{ComponentClass, EffectiveReference, Reference, ReferenceCardinality};
use crate::properties::FRAMEWORK_KEYS;
use crate::registry::{ServiceRecord, ServiceReference};

struct DynamicDependent {
    record: Arc<ServiceRecord>,
    class: Arc<ComponentClass>,
    reference: Reference,
}

/// Work derived from one registry change.
#[derive(Default)]
pub(crate) struct Reconciliation {
    dynamic: Vec<DynamicDependent>,
    restarts: Vec<Arc<ServiceRecord>>,
}

/// Finds the dependents of `changed` among all other registered services.
pub(crate) fn plan(ctx: &MockBundleContext, changed: &Arc<ServiceRecord>) -> OsgiResult<Reconciliation> {
    let inner = ctx.inner();
    let changed_properties = changed.properties.read().clone();
    let mut plan = Reconciliation::default();
    let mut scheduled = HashSet::new();

    for record in inner.registry.snapshot() {
        if record.id == changed.id {
            continue;
        }
        let Some(class) = inner.metadata.class_of(&record.instance) else {
            continue;
        };
        let owner = record.properties.read().clone();
        for reference in class.metadata().references() {
            if !changed.publishes(reference.interface()) {
                continue;
            }
            let dynamic = reference.is_dynamic();
            if !dynamic && !reference.is_static_greedy() {
                continue;
            }
            let effective = EffectiveReference::resolve(reference, &owner);
            let matched = effective
                .filter()?
                .map_or(true, |f| f.matches(&changed_properties));
            if !matched {
                continue;
            }
            if dynamic {
                plan.dynamic.push(DynamicDependent {
                    record: record.clone(),
                    class: class.clone(),
                    reference: reference.clone(),
                });
            } else if !inner.restarts.is_restarting(RestartKey::new(class.implementation_type(), &owner))
                && scheduled.insert(record.id)
            {
                plan.restarts.push(record.clone());
            }
        }
    }

    tracing::trace!(
        service.id = changed.id,
        dynamic = plan.dynamic.len(),
        restarts = plan.restarts.len(),
        "reconciliation planned"
    );
    Ok(plan)
}

impl Reconciliation {
    /// Binds a newly registered service. A mandatory unary reference that
    /// already holds a service keeps it.
    pub(crate) fn bind_dynamic(&self, ctx: &MockBundleContext, service: &ServiceReference) -> OsgiResult<()> {
        for dependent in &self.dynamic {
            let instance = &dependent.record.instance;
            let name = dependent.reference.name();
            if dependent.reference.cardinality() == ReferenceCardinality::MandatoryUnary
                && !ctx.inner().instances.bindings(instance, name).is_empty()
            {
                tracing::trace!(component = dependent.class.name(), reference = name, "mandatory unary already bound");
                continue;
            }
            injector::bind(ctx, instance, &dependent.class, &dependent.reference, service)?;
        }
        Ok(())
    }

    /// Unbinds a leaving service. Mandatory references may end up empty.
    pub(crate) fn unbind_dynamic(&self, ctx: &MockBundleContext, service: &ServiceReference) -> OsgiResult<()> {
        for dependent in &self.dynamic {
            injector::unbind(ctx, &dependent.record.instance, &dependent.class, &dependent.reference, service)?;
        }
        Ok(())
    }

    /// Restarts the scheduled dependents that are still registered.
    pub(crate) fn restart_all(self, ctx: &MockBundleContext) -> OsgiResult<()> {
        for record in self.restarts {
            if !record.is_registered() {
                continue;
            }
            restart(ctx, &record)?;
        }
        Ok(())
    }
}

/// Deactivate, unregister, instantiate, inject, activate, register.
fn restart(ctx: &MockBundleContext, record: &Arc<ServiceRecord>) -> OsgiResult<()> {
    let inner = ctx.inner();
    let Some(class) = inner.metadata.class_of(&record.instance) else {
        return Ok(());
    };
    let key = RestartKey::new(class.implementation_type(), &record.properties.read());
    let Some(_guard) = inner.restarts.enter(key) else {
        tracing::debug!(
            component = class.name(),
            service.id = record.id,
            depth = inner.restarts.chain().len(),
            "restart already in progress, skipping"
        );
        return Ok(());
    };

    let reference = ServiceReference::new(record.clone());
    inner.observers.restarting(class.name(), &reference);
    tracing::debug!(component = class.name(), service.id = record.id, "restarting static greedy dependent");

    let mut properties = record.properties.read().clone();
    for key in FRAMEWORK_KEYS {
        properties.remove(key);
    }

    if inner.instances.state(&record.instance) != LifecycleState::Deactivated {
        lifecycle::deactivate(ctx, &record.instance, &class, &properties, DEACTIVATION_REASON_REFERENCE)?;
    }
    ctx.unregister_record(record)?;

    let instance = injector::instantiate(ctx, &class, &properties)?;
    injector::inject_services(ctx, &instance, &class, &properties)?;
    lifecycle::activate(ctx, &instance, &class, &properties)?;
    ctx.register_record(record.interfaces.clone(), instance, properties, None)?;
    Ok(())
}
