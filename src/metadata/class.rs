//! Component classes: a descriptor plus the invocation tables for its type.
//!
//! Rust has no runtime reflection, so each component type declares up front
//! what the runtime may call on it: candidate constructors, named methods
//! with their parameter kinds, assignable fields, and materializers for
//! typed configuration objects. The injector and lifecycle driver select
//! from these tables by parameter shape.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::context::{MockBundleContext, MockComponentContext};
use crate::error::{OsgiError, OsgiResult};
use crate::metadata::OsgiMetadata;
use crate::properties::Properties;
use crate::registry::{AnyArc, ComponentServiceObjects, ServiceReference};

pub(crate) type Invoker = Arc<dyn Fn(&AnyArc, &Args) -> OsgiResult<()> + Send + Sync>;
pub(crate) type ConstructorFn = Arc<dyn Fn(&Args) -> OsgiResult<AnyArc> + Send + Sync>;
pub(crate) type FieldSetter = Arc<dyn Fn(&AnyArc, FieldValue) -> OsgiResult<()> + Send + Sync>;
pub(crate) type ConfigMaterializer = Arc<dyn Fn(&Properties) -> OsgiResult<AnyArc> + Send + Sync>;

/// Declared type of a method or constructor parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParamKind {
    ComponentContext,
    BundleContext,
    /// Property map (component configuration or service properties).
    Map,
    /// Typed configuration object, by materializer name.
    Config(String),
    /// Deactivation reason code.
    Reason,
    ServiceReference,
    ServiceObjects,
    /// The service itself, typed by interface name.
    Service(String),
    /// Collection of services or references.
    Collection(CollectionKind),
}

impl ParamKind {
    pub fn config(name: impl Into<String>) -> Self {
        ParamKind::Config(name.into())
    }

    pub fn service(interface: impl Into<String>) -> Self {
        ParamKind::Service(interface.into())
    }
}

/// Concrete collection shape of a multiple-cardinality field or parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CollectionKind {
    /// Bind order.
    #[default]
    List,
    /// Bind order, one entry per service id.
    Set,
    /// Natural reference order (ascending ranking).
    SortedSet,
}

/// Declared type of an injectable field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Service(String),
    Reference,
    Collection(CollectionKind),
}

impl FieldKind {
    pub fn service(interface: impl Into<String>) -> Self {
        FieldKind::Service(interface.into())
    }
}

/// Value assigned to a field or passed as a collection parameter.
#[derive(Clone)]
pub enum FieldValue {
    Service(Option<AnyArc>),
    Reference(Option<ServiceReference>),
    Services(Vec<AnyArc>),
    References(Vec<ServiceReference>),
}

impl FieldValue {
    /// The unary service, downcast to `S`.
    pub fn service<S: Any + Send + Sync>(&self) -> Option<Arc<S>> {
        match self {
            FieldValue::Service(Some(service)) => downcast_arc(service),
            _ => None,
        }
    }

    pub fn reference(&self) -> Option<&ServiceReference> {
        match self {
            FieldValue::Reference(reference) => reference.as_ref(),
            _ => None,
        }
    }

    /// Collection services downcast to `S`; elements of other types are skipped.
    pub fn services<S: Any + Send + Sync>(&self) -> Vec<Arc<S>> {
        match self {
            FieldValue::Services(services) => services.iter().filter_map(downcast_arc).collect(),
            _ => Vec::new(),
        }
    }

    pub fn references(&self) -> &[ServiceReference] {
        match self {
            FieldValue::References(references) => references,
            _ => &[],
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Service(s) => s.is_none(),
            FieldValue::Reference(r) => r.is_none(),
            FieldValue::Services(s) => s.is_empty(),
            FieldValue::References(r) => r.is_empty(),
        }
    }
}

impl fmt::Debug for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Service(s) => write!(f, "Service({})", if s.is_some() { "Some" } else { "None" }),
            FieldValue::Reference(r) => write!(f, "Reference({:?})", r.as_ref().map(ServiceReference::service_id)),
            FieldValue::Services(s) => write!(f, "Services(len={})", s.len()),
            FieldValue::References(r) => {
                write!(f, "References({:?})", r.iter().map(ServiceReference::service_id).collect::<Vec<_>>())
            }
        }
    }
}

pub(crate) fn downcast_arc<S: Any + Send + Sync>(any: &AnyArc) -> Option<Arc<S>> {
    any.clone().downcast::<S>().ok()
}

/// One resolved argument.
#[derive(Clone)]
pub enum Arg {
    ComponentContext(MockComponentContext),
    BundleContext(MockBundleContext),
    Map(Properties),
    Config(AnyArc),
    Reason(i32),
    Reference(Option<ServiceReference>),
    ServiceObjects(Option<ComponentServiceObjects>),
    Service(Option<AnyArc>),
    Collection(FieldValue),
}

/// Arguments handed to a constructor or method invoker, in parameter order.
///
/// The typed accessors return the first argument of the requested kind,
/// which is enough for every signature the runtime resolves; use
/// [`Args::get`] when a signature repeats a kind.
#[derive(Clone, Default)]
pub struct Args {
    args: Vec<Arg>,
}

impl Args {
    pub(crate) fn new(args: Vec<Arg>) -> Self {
        Self { args }
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Arg> {
        self.args.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arg> {
        self.args.iter()
    }

    pub fn component_context(&self) -> Option<&MockComponentContext> {
        self.args.iter().find_map(|a| match a {
            Arg::ComponentContext(c) => Some(c),
            _ => None,
        })
    }

    pub fn bundle_context(&self) -> Option<&MockBundleContext> {
        self.args.iter().find_map(|a| match a {
            Arg::BundleContext(c) => Some(c),
            _ => None,
        })
    }

    pub fn properties(&self) -> Option<&Properties> {
        self.args.iter().find_map(|a| match a {
            Arg::Map(p) => Some(p),
            _ => None,
        })
    }

    pub fn config<C: Any + Send + Sync>(&self) -> Option<Arc<C>> {
        self.args.iter().find_map(|a| match a {
            Arg::Config(c) => downcast_arc(c),
            _ => None,
        })
    }

    pub fn reason(&self) -> Option<i32> {
        self.args.iter().find_map(|a| match a {
            Arg::Reason(r) => Some(*r),
            _ => None,
        })
    }

    pub fn reference(&self) -> Option<&ServiceReference> {
        self.args.iter().find_map(|a| match a {
            Arg::Reference(r) => r.as_ref(),
            _ => None,
        })
    }

    pub fn service_objects(&self) -> Option<&ComponentServiceObjects> {
        self.args.iter().find_map(|a| match a {
            Arg::ServiceObjects(o) => o.as_ref(),
            _ => None,
        })
    }

    pub fn service<S: Any + Send + Sync>(&self) -> Option<Arc<S>> {
        self.args.iter().find_map(|a| match a {
            Arg::Service(Some(s)) => downcast_arc(s),
            _ => None,
        })
    }

    pub fn service_at<S: Any + Send + Sync>(&self, index: usize) -> Option<Arc<S>> {
        match self.args.get(index) {
            Some(Arg::Service(Some(s))) => downcast_arc(s),
            _ => None,
        }
    }

    pub fn collection(&self) -> Option<&FieldValue> {
        self.args.iter().find_map(|a| match a {
            Arg::Collection(c) => Some(c),
            _ => None,
        })
    }
}

pub(crate) struct MethodDef {
    pub(crate) name: String,
    pub(crate) params: Vec<ParamKind>,
    pub(crate) invoker: Invoker,
}

pub(crate) struct ConstructorDef {
    pub(crate) params: Vec<ParamKind>,
    pub(crate) ctor: ConstructorFn,
}

pub(crate) struct FieldDef {
    pub(crate) name: String,
    pub(crate) kind: FieldKind,
    pub(crate) setter: FieldSetter,
}

/// A component type known to the runtime.
///
/// # Examples
///
/// ```rust
/// use osgi_mock::metadata::{ComponentClass, OsgiMetadata, ParamKind};
/// use std::sync::atomic::{AtomicBool, Ordering};
///
/// #[derive(Default)]
/// struct Greeter {
///     active: AtomicBool,
/// }
///
/// let class = ComponentClass::builder::<Greeter>(OsgiMetadata::new("com.example.Greeter"))
///     .default_constructor()
///     .method("activate", &[ParamKind::ComponentContext], |this: &Greeter, _args| {
///         this.active.store(true, Ordering::SeqCst);
///         Ok(())
///     })
///     .build();
///
/// assert_eq!(class.name(), "com.example.Greeter");
/// assert!(class.has_method("activate"));
/// ```
pub struct ComponentClass {
    type_id: TypeId,
    type_name: &'static str,
    metadata: OsgiMetadata,
    constructors: Vec<ConstructorDef>,
    methods: Vec<MethodDef>,
    fields: Vec<FieldDef>,
    config_types: HashMap<String, ConfigMaterializer>,
}

impl ComponentClass {
    pub fn builder<T: Any + Send + Sync>(metadata: OsgiMetadata) -> ComponentClassBuilder<T> {
        ComponentClassBuilder {
            class: ComponentClass {
                type_id: TypeId::of::<T>(),
                type_name: std::any::type_name::<T>(),
                metadata,
                constructors: Vec::new(),
                methods: Vec::new(),
                fields: Vec::new(),
                config_types: HashMap::new(),
            },
            _marker: PhantomData,
        }
    }

    /// `TypeId` of the implementing Rust type.
    pub fn implementation_type(&self) -> TypeId {
        self.type_id
    }

    /// Rust type name, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Component name from the descriptor.
    pub fn name(&self) -> &str {
        self.metadata.name()
    }

    pub fn metadata(&self) -> &OsgiMetadata {
        &self.metadata
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.methods.iter().any(|m| m.name == name)
    }

    pub(crate) fn methods(&self) -> &[MethodDef] {
        &self.methods
    }

    pub(crate) fn constructors(&self) -> &[ConstructorDef] {
        &self.constructors
    }

    pub(crate) fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub(crate) fn materialize_config(&self, name: &str, properties: &Properties) -> OsgiResult<AnyArc> {
        let materializer = self.config_types.get(name).ok_or_else(|| {
            OsgiError::component(self.name(), format!("no materializer for configuration type {}", name))
        })?;
        materializer(properties)
    }
}

impl fmt::Debug for ComponentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentClass")
            .field("name", &self.metadata.name())
            .field("type_name", &self.type_name)
            .field("constructors", &self.constructors.len())
            .field("methods", &self.methods.iter().map(|m| m.name.as_str()).collect::<Vec<_>>())
            .field("fields", &self.fields.iter().map(|f| f.name.as_str()).collect::<Vec<_>>())
            .finish()
    }
}

/// Fluent builder for [`ComponentClass`].
pub struct ComponentClassBuilder<T> {
    class: ComponentClass,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Any + Send + Sync> ComponentClassBuilder<T> {
    /// Adds a candidate constructor. Candidates are tried in declaration order.
    pub fn constructor<F>(mut self, params: &[ParamKind], ctor: F) -> Self
    where
        F: Fn(&Args) -> OsgiResult<T> + Send + Sync + 'static,
    {
        let ctor: ConstructorFn = Arc::new(move |args: &Args| ctor(args).map(|value| Arc::new(value) as AnyArc));
        self.class.constructors.push(ConstructorDef {
            params: params.to_vec(),
            ctor,
        });
        self
    }

    /// Adds a no-argument constructor backed by `T::default()`.
    pub fn default_constructor(self) -> Self
    where
        T: Default,
    {
        self.constructor(&[], |_| Ok(T::default()))
    }

    /// Adds a method overload. Several overloads may share a name.
    pub fn method<F>(mut self, name: &str, params: &[ParamKind], method: F) -> Self
    where
        F: Fn(&T, &Args) -> OsgiResult<()> + Send + Sync + 'static,
    {
        let invoker: Invoker = Arc::new(move |instance: &AnyArc, args: &Args| {
            let target = instance
                .downcast_ref::<T>()
                .ok_or(OsgiError::TypeMismatch(std::any::type_name::<T>()))?;
            method(target, args)
        });
        self.class.methods.push(MethodDef {
            name: name.to_string(),
            params: params.to_vec(),
            invoker,
        });
        self
    }

    /// Adds an assignable field.
    pub fn field<F>(mut self, name: &str, kind: FieldKind, setter: F) -> Self
    where
        F: Fn(&T, FieldValue) + Send + Sync + 'static,
    {
        let setter: FieldSetter = Arc::new(move |instance: &AnyArc, value: FieldValue| {
            let target = instance
                .downcast_ref::<T>()
                .ok_or(OsgiError::TypeMismatch(std::any::type_name::<T>()))?;
            setter(target, value);
            Ok(())
        });
        self.class.fields.push(FieldDef {
            name: name.to_string(),
            kind,
            setter,
        });
        self
    }

    /// Registers how to build a typed configuration object from properties.
    pub fn config_type<C, F>(mut self, name: &str, materialize: F) -> Self
    where
        C: Any + Send + Sync,
        F: Fn(&Properties) -> C + Send + Sync + 'static,
    {
        let materializer: ConfigMaterializer = Arc::new(move |props: &Properties| Ok(Arc::new(materialize(props)) as AnyArc));
        self.class.config_types.insert(name.to_string(), materializer);
        self
    }

    pub fn build(self) -> ComponentClass {
        self.class
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Sample {
        calls: Mutex<Vec<String>>,
    }

    struct SampleConfig {
        size: i64,
    }

    fn sample_class() -> ComponentClass {
        ComponentClass::builder::<Sample>(OsgiMetadata::new("sample.Sample"))
            .default_constructor()
            .method("activate", &[], |this: &Sample, _| {
                this.calls.lock().push("activate()".into());
                Ok(())
            })
            .method("activate", &[ParamKind::Map], |this: &Sample, args| {
                let size = args.properties().map(|p| p.len()).unwrap_or(0);
                this.calls.lock().push(format!("activate(map:{})", size));
                Ok(())
            })
            .config_type("SampleConfig", |props: &Properties| SampleConfig {
                size: props.get("size").and_then(|v| v.as_i64()).unwrap_or(-1),
            })
            .build()
    }

    #[test]
    fn test_method_overloads_share_name() {
        let class = sample_class();
        let named = |name: &str| class.methods().iter().filter(|m| m.name == name).count();
        assert_eq!(named("activate"), 2);
        assert_eq!(named("missing"), 0);
    }

    #[test]
    fn test_invoker_downcasts_instance() {
        let class = sample_class();
        let instance: AnyArc = Arc::new(Sample::default());
        let method = &class.methods()[1];
        (method.invoker)(&instance, &Args::new(vec![Arg::Map(properties! { "a" => 1 })])).unwrap();

        let sample = instance.downcast_ref::<Sample>().unwrap();
        assert_eq!(sample.calls.lock().as_slice(), ["activate(map:1)".to_string()]);
    }

    #[test]
    fn test_invoker_rejects_foreign_instance() {
        let class = sample_class();
        let foreign: AnyArc = Arc::new(42u32);
        let method = &class.methods()[0];
        let result = (method.invoker)(&foreign, &Args::default());
        assert!(matches!(result, Err(OsgiError::TypeMismatch(_))));
    }

    #[test]
    fn test_config_materializer() {
        let class = sample_class();
        let config = class.materialize_config("SampleConfig", &properties! { "size" => 7 }).unwrap();
        assert_eq!(config.downcast_ref::<SampleConfig>().map(|c| c.size), Some(7));
        assert!(class.materialize_config("Unknown", &Properties::new()).is_err());
    }

    #[test]
    fn test_field_value_accessors() {
        let value = FieldValue::Services(vec![Arc::new(1u8) as AnyArc, Arc::new("x") as AnyArc]);
        assert_eq!(value.services::<u8>().len(), 1);
        assert!(!value.is_empty());
        assert!(FieldValue::Service(None).is_empty());
        assert!(FieldValue::Reference(None).reference().is_none());
    }
}
