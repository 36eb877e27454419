//! Component descriptors: the read-only metadata a component type carries.
//!
//! [`OsgiMetadata`] mirrors what a Declarative Services descriptor declares
//! (service interfaces, references, lifecycle method names, property
//! defaults). [`ComponentClass`] pairs that descriptor with the invocation
//! tables the runtime dispatches through, and [`MetadataRegistry`] is the
//! per-container lookup from a Rust type to its class.

use crate::error::OsgiResult;
use crate::filter::{parse_optional, LdapFilter};
use crate::properties::{Properties, PropertyValue};

pub mod class;
pub mod provider;

pub use class::{
    Arg, Args, CollectionKind, ComponentClass, ComponentClassBuilder, FieldKind, FieldValue, ParamKind,
};
pub use provider::MetadataRegistry;

/// How many matching services a reference may or must bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceCardinality {
    /// Exactly one (`1..1`).
    MandatoryUnary,
    /// Zero or one (`0..1`).
    OptionalUnary,
    /// One or more (`1..n`).
    MandatoryMultiple,
    /// Any number (`0..n`).
    OptionalMultiple,
}

impl ReferenceCardinality {
    pub fn is_mandatory(self) -> bool {
        matches!(self, ReferenceCardinality::MandatoryUnary | ReferenceCardinality::MandatoryMultiple)
    }

    pub fn is_multiple(self) -> bool {
        matches!(self, ReferenceCardinality::MandatoryMultiple | ReferenceCardinality::OptionalMultiple)
    }
}

/// Whether a bound reference is swapped live or needs a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferencePolicy {
    Static,
    Dynamic,
}

/// Whether a static reference prefers a better match over the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferencePolicyOption {
    Reluctant,
    Greedy,
}

/// Element type injected into collection fields and parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FieldCollectionType {
    /// The service objects themselves.
    #[default]
    Service,
    /// Service reference handles.
    Reference,
}

/// Service scope declared by a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ServiceScope {
    #[default]
    Singleton,
    Bundle,
    Prototype,
}

impl ServiceScope {
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceScope::Singleton => "singleton",
            ServiceScope::Bundle => "bundle",
            ServiceScope::Prototype => "prototype",
        }
    }
}

/// A reference descriptor.
///
/// Descriptors are immutable once part of an [`OsgiMetadata`]; per-service
/// target overrides are layered on top with [`EffectiveReference`].
///
/// # Examples
///
/// ```rust
/// use osgi_mock::metadata::{Reference, ReferenceCardinality, ReferencePolicy};
///
/// let reference = Reference::new("logger", "com.example.Logger")
///     .with_cardinality(ReferenceCardinality::OptionalUnary)
///     .with_policy(ReferencePolicy::Dynamic)
///     .with_bind("bind_logger")
///     .with_unbind("unbind_logger");
///
/// assert_eq!(reference.name(), "logger");
/// assert!(!reference.cardinality().is_mandatory());
/// assert!(!reference.is_constructor_parameter());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    name: String,
    interface: String,
    cardinality: ReferenceCardinality,
    policy: ReferencePolicy,
    policy_option: ReferencePolicyOption,
    target: Option<String>,
    bind: Option<String>,
    unbind: Option<String>,
    field: Option<String>,
    field_collection_type: FieldCollectionType,
    parameter: Option<usize>,
}

impl Reference {
    /// Mandatory, static, reluctant reference without bind targets.
    pub fn new(name: impl Into<String>, interface: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            interface: interface.into(),
            cardinality: ReferenceCardinality::MandatoryUnary,
            policy: ReferencePolicy::Static,
            policy_option: ReferencePolicyOption::Reluctant,
            target: None,
            bind: None,
            unbind: None,
            field: None,
            field_collection_type: FieldCollectionType::Service,
            parameter: None,
        }
    }

    pub fn with_cardinality(mut self, cardinality: ReferenceCardinality) -> Self {
        self.cardinality = cardinality;
        self
    }

    pub fn with_policy(mut self, policy: ReferencePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_policy_option(mut self, policy_option: ReferencePolicyOption) -> Self {
        self.policy_option = policy_option;
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_bind(mut self, method: impl Into<String>) -> Self {
        self.bind = Some(method.into());
        self
    }

    pub fn with_unbind(mut self, method: impl Into<String>) -> Self {
        self.unbind = Some(method.into());
        self
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_field_collection_type(mut self, collection_type: FieldCollectionType) -> Self {
        self.field_collection_type = collection_type;
        self
    }

    /// Marks the reference as constructor parameter `index`.
    pub fn with_parameter(mut self, index: usize) -> Self {
        self.parameter = Some(index);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn cardinality(&self) -> ReferenceCardinality {
        self.cardinality
    }

    pub fn policy(&self) -> ReferencePolicy {
        self.policy
    }

    pub fn policy_option(&self) -> ReferencePolicyOption {
        self.policy_option
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn bind(&self) -> Option<&str> {
        self.bind.as_deref()
    }

    pub fn unbind(&self) -> Option<&str> {
        self.unbind.as_deref()
    }

    pub fn field(&self) -> Option<&str> {
        self.field.as_deref()
    }

    pub fn field_collection_type(&self) -> FieldCollectionType {
        self.field_collection_type
    }

    pub fn parameter(&self) -> Option<usize> {
        self.parameter
    }

    pub fn is_constructor_parameter(&self) -> bool {
        self.parameter.is_some()
    }

    pub fn is_dynamic(&self) -> bool {
        self.policy == ReferencePolicy::Dynamic
    }

    pub fn is_static_greedy(&self) -> bool {
        self.policy == ReferencePolicy::Static && self.policy_option == ReferencePolicyOption::Greedy
    }
}

/// A reference seen through one service's properties.
///
/// A service may carry `<reference name>.target` in its own properties;
/// that filter replaces the descriptor's target for this service only. The
/// shared descriptor is never touched.
#[derive(Debug, Clone)]
pub struct EffectiveReference<'a> {
    reference: &'a Reference,
    target_override: Option<String>,
}

impl<'a> EffectiveReference<'a> {
    /// Derives the effective reference for a service with `owner` properties.
    pub fn resolve(reference: &'a Reference, owner: &Properties) -> Self {
        let key = format!("{}.target", reference.name());
        let target_override = owner.get(&key).and_then(PropertyValue::as_str).map(str::to_string);
        Self {
            reference,
            target_override,
        }
    }

    pub fn reference(&self) -> &'a Reference {
        self.reference
    }

    /// Override if present, else the descriptor's own target.
    pub fn target(&self) -> Option<&str> {
        self.target_override.as_deref().or(self.reference.target())
    }

    pub fn is_overridden(&self) -> bool {
        self.target_override.is_some()
    }

    pub fn filter(&self) -> OsgiResult<Option<LdapFilter>> {
        parse_optional(self.target())
    }
}

impl std::ops::Deref for EffectiveReference<'_> {
    type Target = Reference;

    fn deref(&self) -> &Reference {
        self.reference
    }
}

/// Parsed component descriptor.
///
/// # Examples
///
/// ```rust
/// use osgi_mock::metadata::{OsgiMetadata, Reference};
/// use osgi_mock::PropertyValue;
///
/// let metadata = OsgiMetadata::new("com.example.Greeter")
///     .with_service_interface("com.example.api.Greeter")
///     .with_property("greeting", "hello")
///     .with_reference(Reference::new("logger", "com.example.Logger"));
///
/// assert_eq!(metadata.configuration_pids(), vec!["com.example.Greeter".to_string()]);
/// assert_eq!(metadata.properties().get("greeting"), Some(&PropertyValue::from("hello")));
/// assert!(metadata.reference("logger").is_some());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct OsgiMetadata {
    name: String,
    configuration_pids: Vec<String>,
    service_interfaces: Vec<String>,
    scope: ServiceScope,
    properties: Properties,
    references: Vec<Reference>,
    activate: Option<String>,
    deactivate: Option<String>,
    modified: Option<String>,
}

impl OsgiMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            configuration_pids: Vec::new(),
            service_interfaces: Vec::new(),
            scope: ServiceScope::Singleton,
            properties: Properties::new(),
            references: Vec::new(),
            activate: None,
            deactivate: None,
            modified: None,
        }
    }

    pub fn with_service_interface(mut self, interface: impl Into<String>) -> Self {
        self.service_interfaces.push(interface.into());
        self
    }

    pub fn with_configuration_pid(mut self, pid: impl Into<String>) -> Self {
        self.configuration_pids.push(pid.into());
        self
    }

    pub fn with_scope(mut self, scope: ServiceScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_reference(mut self, reference: Reference) -> Self {
        self.references.push(reference);
        self
    }

    pub fn with_activate(mut self, method: impl Into<String>) -> Self {
        self.activate = Some(method.into());
        self
    }

    pub fn with_deactivate(mut self, method: impl Into<String>) -> Self {
        self.deactivate = Some(method.into());
        self
    }

    pub fn with_modified(mut self, method: impl Into<String>) -> Self {
        self.modified = Some(method.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared PIDs, or the component name when none are declared.
    pub fn configuration_pids(&self) -> Vec<String> {
        if self.configuration_pids.is_empty() {
            vec![self.name.clone()]
        } else {
            self.configuration_pids.clone()
        }
    }

    pub fn service_interfaces(&self) -> &[String] {
        &self.service_interfaces
    }

    pub fn scope(&self) -> ServiceScope {
        self.scope
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn references(&self) -> &[Reference] {
        &self.references
    }

    pub fn reference(&self, name: &str) -> Option<&Reference> {
        self.references.iter().find(|r| r.name() == name)
    }

    pub fn activate(&self) -> Option<&str> {
        self.activate.as_deref()
    }

    pub fn deactivate(&self) -> Option<&str> {
        self.deactivate.as_deref()
    }

    pub fn modified(&self) -> Option<&str> {
        self.modified.as_deref()
    }
}
