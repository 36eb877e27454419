//! # osgi-mock
//!
//! In-memory OSGi service registry and Declarative Services simulator for
//! unit tests: register services, wire components, drive their lifecycle,
//! all without a running framework.
//!
//! ## Features
//!
//! - **Ordered registry**: lookups return services by descending
//!   `service.ranking`, then registration order
//! - **Reference injection**: bind methods, fields and constructor
//!   parameters, with unary and multiple cardinalities and target filters
//! - **Dynamic and static greedy policies**: dynamic references are rebound
//!   in place, static greedy dependents are restarted
//! - **Lifecycle**: activate, modified and deactivate callbacks resolved by
//!   signature precedence
//! - **Configuration admin**: stored configuration merged beneath call-site
//!   properties
//! - **LDAP filters**: RFC 1960 filters for lookups, listeners and targets
//!
//! ## Quick Start
//!
//! ```rust
//! use osgi_mock::{properties, MockBundleContext};
//! use std::sync::Arc;
//!
//! let ctx = MockBundleContext::new();
//! for (name, ranking) in [("low", 1), ("high", 10)] {
//!     ctx.register_service(&["demo.Store"], Arc::new(name.to_string()), properties! { "service.ranking" => ranking })
//!         .unwrap();
//! }
//!
//! let best = ctx.service_for::<String>("demo.Store").unwrap();
//! assert_eq!(best.as_str(), "high");
//! ```
//!
//! ## Components
//!
//! Component types describe themselves with an [`OsgiMetadata`] descriptor
//! and a [`ComponentClass`] listing what the runtime may call.
//!
//! ```rust
//! use osgi_mock::metadata::{Reference, ReferenceCardinality, ReferencePolicy};
//! use osgi_mock::{properties, ComponentClass, FieldKind, MockOsgi, OsgiMetadata};
//! use parking_lot::Mutex;
//! use std::sync::Arc;
//!
//! #[derive(Default)]
//! struct Consumer {
//!     store: Mutex<Option<Arc<String>>>,
//! }
//!
//! let metadata = OsgiMetadata::new("demo.Consumer").with_reference(
//!     Reference::new("store", "demo.Store")
//!         .with_cardinality(ReferenceCardinality::OptionalUnary)
//!         .with_policy(ReferencePolicy::Dynamic)
//!         .with_field("store"),
//! );
//! let ctx = MockOsgi::new_bundle_context();
//! ctx.register_class(
//!     ComponentClass::builder::<Consumer>(metadata)
//!         .default_constructor()
//!         .field("store", FieldKind::service("demo.Store"), |c: &Consumer, value| {
//!             *c.store.lock() = value.service::<String>();
//!         })
//!         .build(),
//! );
//!
//! let consumer = MockOsgi::register_injected_activate_service::<Consumer>(&ctx, properties! {}).unwrap();
//! assert!(consumer.store.lock().is_none());
//!
//! let registration = ctx
//!     .register_service(&["demo.Store"], Arc::new("primary".to_string()), properties! {})
//!     .unwrap();
//! assert_eq!(consumer.store.lock().as_deref().map(String::as_str), Some("primary"));
//!
//! registration.unregister().unwrap();
//! assert!(consumer.store.lock().is_none());
//! ```

pub mod config_admin;
pub mod context;
pub mod error;
pub mod filter;
pub mod metadata;
pub mod observer;
pub mod osgi;
pub mod properties;
pub mod registry;

mod injector;
mod instance;
mod internal;
mod lifecycle;
mod merge;
mod reconciler;
mod signature;

pub use config_admin::{
    Configuration, ConfigurationStore, InMemoryStore, MockConfigurationAdmin, CONFIGURATION_ADMIN_INTERFACE,
};
pub use context::{BundleContextBuilder, MockBundleContext, MockComponentContext, ServiceRegistration};
pub use error::{OsgiError, OsgiResult};
pub use filter::{Filter, LdapFilter};
pub use instance::LifecycleState;
pub use lifecycle::{
    DEACTIVATION_REASON_BUNDLE_STOPPED, DEACTIVATION_REASON_CONFIGURATION_DELETED,
    DEACTIVATION_REASON_CONFIGURATION_MODIFIED, DEACTIVATION_REASON_DISABLED, DEACTIVATION_REASON_DISPOSED,
    DEACTIVATION_REASON_REFERENCE, DEACTIVATION_REASON_UNSPECIFIED,
};
pub use metadata::{
    Arg, Args, CollectionKind, ComponentClass, ComponentClassBuilder, EffectiveReference, FieldCollectionType,
    FieldKind, FieldValue, MetadataRegistry, OsgiMetadata, ParamKind, Reference, ReferenceCardinality,
    ReferencePolicy, ReferencePolicyOption, ServiceScope,
};
pub use observer::{LoggingObserver, MetricsObserver, RegistryObserver};
pub use osgi::MockOsgi;
pub use properties::{Properties, PropertyValue};
pub use registry::{
    AnyArc, BundleEvent, BundleListener, ComponentServiceObjects, ServiceEvent, ServiceEventKind, ServiceFactory,
    ServiceListener, ServiceReference,
};

#[cfg(feature = "config")]
pub use properties::properties_from_json;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_fresh_context_publishes_configuration_admin() {
        let ctx = MockBundleContext::new();
        let admin = ctx.service_for::<MockConfigurationAdmin>(CONFIGURATION_ADMIN_INTERFACE);
        assert!(admin.is_some());
        assert_eq!(ctx.service_count(), 1);
    }

    #[test]
    fn test_plain_service_round_trip() {
        let ctx = MockBundleContext::new();
        let registration = ctx
            .register_service(&["t.Api"], Arc::new(7u32), properties! { "k" => "v" })
            .unwrap();
        let reference = registration.reference();
        assert_eq!(reference.property("k"), Some(PropertyValue::from("v")));
        assert_eq!(reference.interfaces(), &["t.Api".to_string()]);
        assert_eq!(ctx.service::<u32>(&reference).as_deref(), Some(&7));
        assert_eq!(reference.usage_count(), 1);
        assert!(ctx.unget_service(&reference));
        assert!(!ctx.unget_service(&reference));
    }
}
