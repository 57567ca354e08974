//! Explicitly injected services
//!
//! Replaces ambient singletons: the embedding code builds a [`Services`]
//! container, hands it to the scene tree, and every object can reach it
//! through its base.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Type-keyed container of shared services
#[derive(Default, Clone)]
pub struct Services {
    entries: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl Services {
    /// Create an empty container
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service, builder style
    pub fn with<T: Any + Send + Sync>(mut self, service: T) -> Self {
        self.insert(Arc::new(service));
        self
    }

    /// Register a shared service, replacing any previous one of the same type
    pub fn insert<T: Any + Send + Sync>(&mut self, service: Arc<T>) -> Option<Arc<T>> {
        let previous = self.entries.insert(TypeId::of::<T>(), service)?;
        previous.downcast::<T>().ok()
    }

    /// Look up a service by type
    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let entry = self.entries.get(&TypeId::of::<T>())?;
        Arc::clone(entry).downcast::<T>().ok()
    }

    /// Whether a service of this type is registered
    pub fn contains<T: Any + Send + Sync>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<T>())
    }

    /// Number of registered services
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no service is registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services")
            .field("count", &self.entries.len())
            .finish()
    }
}
