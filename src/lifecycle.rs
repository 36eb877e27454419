//! Activate, deactivate and modified callbacks.
//!
//! Each callback is looked up by name (from the descriptor, else the
//! conventional default) and resolved through the signature tables. An
//! explicitly named callback must exist; a defaulted one is optional.

use std::sync::Arc;

use crate::context::{MockBundleContext, MockComponentContext};
use crate::error::{OsgiError, OsgiResult};
use crate::instance::LifecycleState;
use crate::metadata::{Arg, Args, ComponentClass, ParamKind};
use crate::properties::Properties;
use crate::registry::AnyArc;
use crate::signature::{self, Shape};

/// Deactivation reason: not specified.
pub const DEACTIVATION_REASON_UNSPECIFIED: i32 = 0;
/// Deactivation reason: the component was disabled.
pub const DEACTIVATION_REASON_DISABLED: i32 = 1;
/// Deactivation reason: a reference became unsatisfied or is being replaced.
pub const DEACTIVATION_REASON_REFERENCE: i32 = 2;
/// Deactivation reason: the configuration changed.
pub const DEACTIVATION_REASON_CONFIGURATION_MODIFIED: i32 = 3;
/// Deactivation reason: the configuration was deleted.
pub const DEACTIVATION_REASON_CONFIGURATION_DELETED: i32 = 4;
/// Deactivation reason: the component was disposed.
pub const DEACTIVATION_REASON_DISPOSED: i32 = 5;
/// Deactivation reason: the bundle is stopping.
pub const DEACTIVATION_REASON_BUNDLE_STOPPED: i32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Activate,
    Deactivate,
    Modified,
}

impl Phase {
    fn table(self) -> &'static [Shape] {
        match self {
            Phase::Activate => signature::ACTIVATE,
            Phase::Deactivate => signature::DEACTIVATE,
            Phase::Modified => signature::MODIFIED,
        }
    }

    fn declared(self, class: &ComponentClass) -> Option<&str> {
        let metadata = class.metadata();
        match self {
            Phase::Activate => metadata.activate(),
            Phase::Deactivate => metadata.deactivate(),
            Phase::Modified => metadata.modified(),
        }
    }

    fn default_name(self) -> Option<&'static str> {
        match self {
            Phase::Activate => Some("activate"),
            Phase::Deactivate => Some("deactivate"),
            Phase::Modified => None,
        }
    }
}

/// Value for a context-like parameter of a lifecycle method or constructor.
pub(crate) fn component_arg(
    ctx: &MockBundleContext,
    class: &Arc<ComponentClass>,
    instance: Option<&AnyArc>,
    kind: &ParamKind,
    properties: &Properties,
    reason: Option<i32>,
) -> OsgiResult<Arg> {
    Ok(match kind {
        ParamKind::ComponentContext => Arg::ComponentContext(MockComponentContext::new(
            ctx.clone(),
            class.clone(),
            instance.cloned(),
            properties.clone(),
        )),
        ParamKind::BundleContext => Arg::BundleContext(ctx.clone()),
        ParamKind::Map => Arg::Map(properties.clone()),
        ParamKind::Config(name) => Arg::Config(class.materialize_config(name, properties)?),
        ParamKind::Reason => Arg::Reason(reason.unwrap_or(DEACTIVATION_REASON_UNSPECIFIED)),
        other => {
            return Err(OsgiError::component(
                class.name(),
                format!("parameter kind {:?} is not available here", other),
            ))
        }
    })
}

/// Invokes the callback for `phase`. Returns whether a method was called.
fn invoke(
    ctx: &MockBundleContext,
    instance: &AnyArc,
    class: &Arc<ComponentClass>,
    phase: Phase,
    properties: &Properties,
    reason: Option<i32>,
) -> OsgiResult<bool> {
    let (name, explicit) = match (phase.declared(class), phase.default_name()) {
        (Some(name), _) => (name, true),
        (None, Some(name)) => (name, false),
        (None, None) => return Ok(false),
    };

    let Some(method) = signature::resolve(class.methods(), name, phase.table(), None) else {
        if explicit {
            return Err(OsgiError::LifecycleMethod {
                class: class.name().to_string(),
                method: name.to_string(),
            });
        }
        tracing::trace!(component = class.name(), method = name, "no default lifecycle method");
        return Ok(false);
    };

    let args = method
        .params
        .iter()
        .map(|kind| component_arg(ctx, class, Some(instance), kind, properties, reason))
        .collect::<OsgiResult<Vec<_>>>()?;
    tracing::debug!(component = class.name(), method = name, phase = ?phase, "invoking lifecycle method");
    (method.invoker)(instance, &Args::new(args))?;
    Ok(true)
}

fn invalid(class: &ComponentClass, detail: &str) -> OsgiError {
    OsgiError::Lifecycle {
        class: class.name().to_string(),
        detail: detail.to_string(),
    }
}

pub(crate) fn activate(
    ctx: &MockBundleContext,
    instance: &AnyArc,
    class: &Arc<ComponentClass>,
    properties: &Properties,
) -> OsgiResult<()> {
    let instances = &ctx.inner().instances;
    match instances.state(instance) {
        LifecycleState::Unactivated => {}
        LifecycleState::Activated => return Err(invalid(class, "instance is already activated")),
        LifecycleState::Deactivated => return Err(invalid(class, "a deactivated instance cannot be activated again")),
    }
    invoke(ctx, instance, class, Phase::Activate, properties, None)?;
    instances.set_state(instance, LifecycleState::Activated);
    Ok(())
}

/// Deactivates and forgets the instance's bindings.
pub(crate) fn deactivate(
    ctx: &MockBundleContext,
    instance: &AnyArc,
    class: &Arc<ComponentClass>,
    properties: &Properties,
    reason: i32,
) -> OsgiResult<()> {
    let instances = &ctx.inner().instances;
    if instances.state(instance) == LifecycleState::Deactivated {
        return Err(invalid(class, "instance is already deactivated"));
    }
    invoke(ctx, instance, class, Phase::Deactivate, properties, Some(reason))?;
    instances.set_state(instance, LifecycleState::Deactivated);
    instances.clear_bindings(instance);
    Ok(())
}

pub(crate) fn modified(
    ctx: &MockBundleContext,
    instance: &AnyArc,
    class: &Arc<ComponentClass>,
    properties: &Properties,
) -> OsgiResult<()> {
    if ctx.inner().instances.state(instance) == LifecycleState::Deactivated {
        return Err(invalid(class, "a deactivated instance cannot be modified"));
    }
    invoke(ctx, instance, class, Phase::Modified, properties, None)?;
    Ok(())
}
