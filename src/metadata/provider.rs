//! Lookup from a Rust type to its component class.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::metadata::ComponentClass;
use crate::registry::AnyArc;

/// Registry of component classes keyed by the implementing type.
///
/// Instances that are not registered here are plain services: they can be
/// published and looked up, but the injector and lifecycle driver refuse
/// them with [`OsgiError::NoScrMetadata`](crate::OsgiError::NoScrMetadata).
#[derive(Default)]
pub struct MetadataRegistry {
    classes: RwLock<HashMap<TypeId, Arc<ComponentClass>>>,
}

impl MetadataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the class for its type.
    pub fn register(&self, class: ComponentClass) -> Arc<ComponentClass> {
        let class = Arc::new(class);
        tracing::debug!(component = class.name(), type_name = class.type_name(), "registered component class");
        self.classes.write().insert(class.implementation_type(), class.clone());
        class
    }

    pub fn get(&self, type_id: TypeId) -> Option<Arc<ComponentClass>> {
        self.classes.read().get(&type_id).cloned()
    }

    /// Class of a type-erased instance, if it is a component.
    pub fn class_of(&self, instance: &AnyArc) -> Option<Arc<ComponentClass>> {
        self.get(Any::type_id(&**instance))
    }

    pub fn len(&self) -> usize {
        self.classes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.read().is_empty()
    }
}
