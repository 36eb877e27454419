//! Capability tables for method-signature resolution.
//!
//! Each table is an ordered list of parameter shapes. Resolution walks the
//! table in order and, for each shape, the same-named methods in
//! declaration order; the first method whose parameter list fits wins. New
//! shapes are added as table rows.

use crate::metadata::class::MethodDef;
use crate::metadata::ParamKind;

/// Parameter kind as a table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ParamPattern {
    ComponentContext,
    BundleContext,
    Map,
    Config,
    Reason,
    ServiceReference,
    ServiceObjects,
    /// The referenced interface itself.
    Service,
}

impl ParamPattern {
    fn accepts(self, kind: &ParamKind, interface: Option<&str>) -> bool {
        match (self, kind) {
            (ParamPattern::ComponentContext, ParamKind::ComponentContext)
            | (ParamPattern::BundleContext, ParamKind::BundleContext)
            | (ParamPattern::Map, ParamKind::Map)
            | (ParamPattern::Config, ParamKind::Config(_))
            | (ParamPattern::Reason, ParamKind::Reason)
            | (ParamPattern::ServiceReference, ParamKind::ServiceReference)
            | (ParamPattern::ServiceObjects, ParamKind::ServiceObjects) => true,
            (ParamPattern::Service, ParamKind::Service(declared)) => Some(declared.as_str()) == interface,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Shape {
    /// A single parameter of this kind.
    Exactly(ParamPattern),
    /// Any non-empty combination drawn from the set.
    Mixed(&'static [ParamPattern]),
    NoArgs,
}

impl Shape {
    fn fits(&self, params: &[ParamKind], interface: Option<&str>) -> bool {
        match self {
            Shape::Exactly(pattern) => params.len() == 1 && pattern.accepts(&params[0], interface),
            Shape::Mixed(set) => {
                !params.is_empty()
                    && params
                        .iter()
                        .all(|p| set.iter().any(|pattern| pattern.accepts(p, interface)))
            }
            Shape::NoArgs => params.is_empty(),
        }
    }
}

use ParamPattern::*;

const LIFECYCLE_MIXED: &[ParamPattern] = &[ComponentContext, BundleContext, Map, Config];
const DEACTIVATE_MIXED: &[ParamPattern] = &[ComponentContext, BundleContext, Map, Config, Reason];
const BIND_MIXED: &[ParamPattern] = &[ServiceReference, ServiceObjects, Service, Map];

pub(crate) const ACTIVATE: &[Shape] = &[
    Shape::Exactly(ComponentContext),
    Shape::Exactly(BundleContext),
    Shape::Exactly(Map),
    Shape::Exactly(Config),
    Shape::Mixed(LIFECYCLE_MIXED),
    Shape::NoArgs,
];

pub(crate) const DEACTIVATE: &[Shape] = &[
    Shape::Exactly(ComponentContext),
    Shape::Exactly(BundleContext),
    Shape::Exactly(Map),
    Shape::Exactly(Config),
    Shape::Exactly(Reason),
    Shape::Mixed(DEACTIVATE_MIXED),
    Shape::NoArgs,
];

/// Modified callbacks accept the activate shapes.
pub(crate) const MODIFIED: &[Shape] = ACTIVATE;

pub(crate) const BIND: &[Shape] = &[
    Shape::Exactly(ServiceReference),
    Shape::Exactly(ServiceObjects),
    Shape::Exactly(Service),
    Shape::Exactly(Map),
    Shape::Mixed(BIND_MIXED),
];

/// First method named `name` fitting the highest-priority shape.
pub(crate) fn resolve<'a>(
    methods: &'a [MethodDef],
    name: &str,
    table: &[Shape],
    interface: Option<&str>,
) -> Option<&'a MethodDef> {
    table.iter().find_map(|shape| {
        methods
            .iter()
            .find(|m| m.name == name && shape.fits(&m.params, interface))
    })
}
