//! Reference resolution and injection.
//!
//! Turns a reference descriptor plus the current registry contents into
//! bound values: constructor arguments, field assignments or bind-method
//! calls. Every bound service is recorded in the instance table so field
//! values can be recomputed on later binds and unbinds.

use std::collections::HashSet;
use std::sync::Arc;

use crate::context::MockBundleContext;
use crate::error::{OsgiError, OsgiResult};
use crate::filter::Filter;
use crate::lifecycle;
use crate::metadata::class::{ConstructorDef, FieldDef, MethodDef};
use crate::metadata::{
    Arg, Args, CollectionKind, ComponentClass, EffectiveReference, FieldCollectionType, FieldKind, FieldValue,
    ParamKind, Reference,
};
use crate::properties::Properties;
use crate::registry::{AnyArc, ComponentServiceObjects, ServiceReference};
use crate::signature;

/// Registered services satisfying the reference, in registry order.
pub(crate) fn matching_services(
    ctx: &MockBundleContext,
    reference: &EffectiveReference<'_>,
) -> OsgiResult<Vec<ServiceReference>> {
    let filter = reference.filter()?;
    Ok(ctx
        .inner()
        .registry
        .lookup(Some(reference.interface()), filter.as_ref().map(|f| f as &dyn Filter)))
}

fn violation(reference: &Reference, class: &ComponentClass) -> OsgiError {
    OsgiError::ReferenceViolation {
        reference: reference.name().to_string(),
        interface: reference.interface().to_string(),
        class: class.name().to_string(),
    }
}

fn unsupported(reference: &Reference, class: &ComponentClass, detail: impl Into<String>) -> OsgiError {
    OsgiError::UnsupportedBind {
        reference: reference.name().to_string(),
        class: class.name().to_string(),
        detail: detail.into(),
    }
}

/// Injects every reference that is not a constructor parameter.
pub(crate) fn inject_services(
    ctx: &MockBundleContext,
    instance: &AnyArc,
    class: &ComponentClass,
    properties: &Properties,
) -> OsgiResult<()> {
    for reference in class.metadata().references().iter().filter(|r| !r.is_constructor_parameter()) {
        let effective = EffectiveReference::resolve(reference, properties);
        inject_reference(ctx, instance, class, &effective)?;
    }
    Ok(())
}

fn inject_reference(
    ctx: &MockBundleContext,
    instance: &AnyArc,
    class: &ComponentClass,
    reference: &EffectiveReference<'_>,
) -> OsgiResult<()> {
    let mut matches = matching_services(ctx, reference)?;
    if matches.is_empty() {
        if reference.cardinality().is_mandatory() {
            return Err(violation(reference, class));
        }
        tracing::trace!(component = class.name(), reference = reference.name(), "no match for optional reference");
        return Ok(());
    }

    // Unary references see every match bound in ascending ranking order, so
    // the best match is bound last and ends up as the field value.
    if !reference.cardinality().is_multiple() {
        matches.sort();
    }
    for service in &matches {
        bind(ctx, instance, class, reference, service)?;
    }
    Ok(())
}

enum Target<'a> {
    Method(&'a MethodDef),
    Field(&'a FieldDef),
}

fn check_field_kind(reference: &Reference, class: &ComponentClass, field: &FieldDef) -> OsgiResult<()> {
    let multiple = reference.cardinality().is_multiple();
    let fits = match &field.kind {
        FieldKind::Service(interface) => !multiple && interface == reference.interface(),
        FieldKind::Reference => !multiple,
        FieldKind::Collection(_) => multiple,
    };
    if fits {
        Ok(())
    } else {
        Err(unsupported(
            reference,
            class,
            format!("field '{}' of kind {:?} does not fit {:?}", field.name, field.kind, reference.cardinality()),
        ))
    }
}

/// Method named `method` with a bind-compatible signature, else the field.
fn dispatch_target<'a>(
    class: &'a ComponentClass,
    reference: &Reference,
    method: Option<&str>,
) -> OsgiResult<Option<Target<'a>>> {
    if let Some(name) = method {
        if let Some(found) = signature::resolve(class.methods(), name, signature::BIND, Some(reference.interface())) {
            return Ok(Some(Target::Method(found)));
        }
    }
    if let Some(field_name) = reference.field() {
        let field = class
            .field(field_name)
            .ok_or_else(|| unsupported(reference, class, format!("no field named '{}'", field_name)))?;
        check_field_kind(reference, class, field)?;
        return Ok(Some(Target::Field(field)));
    }
    Ok(None)
}

fn bind_args(params: &[ParamKind], service: &ServiceReference) -> Args {
    Args::new(
        params
            .iter()
            .map(|kind| match kind {
                ParamKind::ServiceReference => Arg::Reference(Some(service.clone())),
                ParamKind::ServiceObjects => Arg::ServiceObjects(Some(ComponentServiceObjects::new(service.clone()))),
                ParamKind::Service(_) => Arg::Service(Some(service.instance().clone())),
                // the bind table admits no other kinds
                _ => Arg::Map(service.properties()),
            })
            .collect(),
    )
}

/// Field value derived from what is currently bound.
fn field_value(bound: Vec<ServiceReference>, reference: &Reference, kind: &FieldKind) -> FieldValue {
    match kind {
        FieldKind::Service(_) => FieldValue::Service(bound.last().map(|r| r.instance().clone())),
        FieldKind::Reference => FieldValue::Reference(bound.last().cloned()),
        FieldKind::Collection(collection) => collection_value(bound, reference.field_collection_type(), *collection),
    }
}

pub(crate) fn collection_value(
    mut services: Vec<ServiceReference>,
    element: FieldCollectionType,
    kind: CollectionKind,
) -> FieldValue {
    match kind {
        CollectionKind::List => {}
        CollectionKind::Set => {
            let mut seen = HashSet::new();
            services.retain(|r| seen.insert(r.service_id()));
        }
        CollectionKind::SortedSet => {
            services.sort();
            services.dedup();
        }
    }
    match element {
        FieldCollectionType::Service => FieldValue::Services(services.iter().map(|r| r.instance().clone()).collect()),
        FieldCollectionType::Reference => FieldValue::References(services),
    }
}

fn assign_field(ctx: &MockBundleContext, instance: &AnyArc, reference: &Reference, field: &FieldDef) -> OsgiResult<()> {
    let bound = ctx.inner().instances.bindings(instance, reference.name());
    (field.setter)(instance, field_value(bound, reference, &field.kind))
}

/// Binds one service to one reference of `instance`.
pub(crate) fn bind(
    ctx: &MockBundleContext,
    instance: &AnyArc,
    class: &ComponentClass,
    reference: &Reference,
    service: &ServiceReference,
) -> OsgiResult<()> {
    let target = dispatch_target(class, reference, reference.bind())?
        .ok_or_else(|| unsupported(reference, class, "no bind method with a supported signature and no field"))?;

    let instances = &ctx.inner().instances;
    instances.bind(instance, reference.name(), service.clone());
    let result = match target {
        Target::Method(method) => (method.invoker)(instance, &bind_args(&method.params, service)),
        Target::Field(field) => assign_field(ctx, instance, reference, field),
    };
    if let Err(err) = result {
        instances.unbind(instance, reference.name(), service);
        return Err(err);
    }

    tracing::debug!(
        component = class.name(),
        reference = reference.name(),
        service.id = service.service_id(),
        "bound service"
    );
    ctx.inner().observers.bound(class.name(), reference.name(), service);
    Ok(())
}

/// Unbinds one service that is bound to `instance`. A reference without
/// unbind method or field has nothing to undo.
pub(crate) fn unbind(
    ctx: &MockBundleContext,
    instance: &AnyArc,
    class: &ComponentClass,
    reference: &Reference,
    service: &ServiceReference,
) -> OsgiResult<()> {
    if !ctx.inner().instances.unbind(instance, reference.name(), service) {
        tracing::trace!(
            component = class.name(),
            reference = reference.name(),
            service.id = service.service_id(),
            "service was not bound, nothing to unbind"
        );
        return Ok(());
    }
    match dispatch_target(class, reference, reference.unbind())? {
        Some(Target::Method(method)) => (method.invoker)(instance, &bind_args(&method.params, service))?,
        Some(Target::Field(field)) => assign_field(ctx, instance, reference, field)?,
        None => {
            if let Some(name) = reference.unbind() {
                return Err(unsupported(
                    reference,
                    class,
                    format!("no unbind method '{}' with a supported signature", name),
                ));
            }
        }
    }

    tracing::debug!(
        component = class.name(),
        reference = reference.name(),
        service.id = service.service_id(),
        "unbound service"
    );
    ctx.inner().observers.unbound(class.name(), reference.name(), service);
    Ok(())
}

enum Slot<'a> {
    /// Context, bundle context, map or configuration object.
    WellKnown(&'a ParamKind),
    Reference(&'a Reference, &'a ParamKind),
}

fn param_fits(kind: &ParamKind, reference: &Reference) -> bool {
    let multiple = reference.cardinality().is_multiple();
    match kind {
        ParamKind::Service(interface) => !multiple && interface == reference.interface(),
        ParamKind::ServiceReference | ParamKind::ServiceObjects => !multiple,
        ParamKind::Collection(_) => multiple,
        _ => false,
    }
}

/// Maps constructor parameters onto well-known values and, in order, onto
/// the constructor-parameter references. Every such reference must be used.
fn plan_constructor<'a>(params: &'a [ParamKind], references: &[&'a Reference]) -> Option<Vec<Slot<'a>>> {
    let mut remaining = references.iter();
    let mut slots = Vec::with_capacity(params.len());
    for kind in params {
        match kind {
            ParamKind::ComponentContext | ParamKind::BundleContext | ParamKind::Map | ParamKind::Config(_) => {
                slots.push(Slot::WellKnown(kind))
            }
            _ => {
                let reference = remaining.next()?;
                if !param_fits(kind, reference) {
                    return None;
                }
                slots.push(Slot::Reference(*reference, kind));
            }
        }
    }
    if remaining.next().is_some() {
        return None;
    }
    Some(slots)
}

fn construct(
    ctx: &MockBundleContext,
    class: &Arc<ComponentClass>,
    ctor: &ConstructorDef,
    slots: &[Slot<'_>],
    properties: &Properties,
) -> OsgiResult<AnyArc> {
    let mut args = Vec::with_capacity(slots.len());
    let mut bound: Vec<(&Reference, Vec<ServiceReference>)> = Vec::new();

    for slot in slots {
        match slot {
            Slot::WellKnown(kind) => args.push(lifecycle::component_arg(ctx, class, None, kind, properties, None)?),
            Slot::Reference(reference, kind) => {
                let effective = EffectiveReference::resolve(reference, properties);
                let mut matches = matching_services(ctx, &effective)?;
                if matches.is_empty() && reference.cardinality().is_mandatory() {
                    return Err(violation(reference, class));
                }
                if let ParamKind::Collection(collection) = kind {
                    args.push(Arg::Collection(collection_value(
                        matches.clone(),
                        reference.field_collection_type(),
                        *collection,
                    )));
                    bound.push((*reference, matches));
                    continue;
                }
                matches.sort();
                let best = matches.pop();
                args.push(match kind {
                    ParamKind::ServiceReference => Arg::Reference(best.clone()),
                    ParamKind::ServiceObjects => Arg::ServiceObjects(best.clone().map(ComponentServiceObjects::new)),
                    _ => Arg::Service(best.as_ref().map(|r| r.instance().clone())),
                });
                bound.push((*reference, best.into_iter().collect()));
            }
        }
    }

    let instance = (ctor.ctor)(&Args::new(args))?;
    let instances = &ctx.inner().instances;
    for (reference, services) in bound {
        for service in services {
            instances.bind(&instance, reference.name(), service);
        }
    }
    Ok(instance)
}

/// Creates an instance, preferring the first constructor that can take all
/// constructor-parameter references; falls back to a no-argument
/// constructor.
pub(crate) fn instantiate(
    ctx: &MockBundleContext,
    class: &Arc<ComponentClass>,
    properties: &Properties,
) -> OsgiResult<AnyArc> {
    let mut references: Vec<&Reference> = class
        .metadata()
        .references()
        .iter()
        .filter(|r| r.is_constructor_parameter())
        .collect();
    references.sort_by_key(|r| r.parameter());

    for ctor in class.constructors() {
        if let Some(slots) = plan_constructor(&ctor.params, &references) {
            tracing::trace!(component = class.name(), params = ctor.params.len(), "constructor selected");
            return construct(ctx, class, ctor, &slots, properties);
        }
    }

    match class.constructors().iter().find(|c| c.params.is_empty()) {
        Some(ctor) => {
            tracing::debug!(
                component = class.name(),
                unresolved = references.len(),
                "no constructor takes the constructor references, using the default constructor"
            );
            (ctor.ctor)(&Args::default())
        }
        None => Err(OsgiError::component(
            class.name(),
            "no constructor matches the declared constructor references",
        )),
    }
}
