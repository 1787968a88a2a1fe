//! Service Registry
//!
//! Live objects produced by Service plugins. Built once during preparation
//! and read-only afterwards. Other plugins get a service by declaring a
//! parameter named after the service identifier.

use std::any::{Any, type_name};
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::EntryError;

/// A type-erased service object
pub type ServiceObject = Arc<dyn Any + Send + Sync>;

/// Wrap a value as a service object
pub fn service_object<T: Any + Send + Sync>(value: T) -> ServiceObject {
    Arc::new(value)
}

/// Downcast a service object, reporting the expected type on mismatch
pub(crate) fn downcast_service<T: Any + Send + Sync>(
    id: &str,
    object: &ServiceObject,
) -> Result<Arc<T>, EntryError> {
    Arc::clone(object)
        .downcast::<T>()
        .map_err(|_| EntryError::ServiceType {
            id: id.to_string(),
            expected: type_name::<T>(),
        })
}

/// Mapping from service identifier to live service object
#[derive(Clone, Default)]
pub struct ServiceRegistry {
    services: IndexMap<String, ServiceObject>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service, returning the object it replaced
    pub fn insert(&mut self, id: impl Into<String>, object: ServiceObject) -> Option<ServiceObject> {
        self.services.insert(id.into(), object)
    }

    /// Get the raw service object
    pub fn get_object(&self, id: &str) -> Option<&ServiceObject> {
        self.services.get(id)
    }

    /// Get a service as a concrete type
    ///
    /// Returns `None` when no service is registered under `id` or when it is
    /// of a different type.
    pub fn get<T: Any + Send + Sync>(&self, id: &str) -> Option<Arc<T>> {
        self.services
            .get(id)
            .and_then(|object| downcast_service::<T>(id, object).ok())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.services.contains_key(id)
    }

    /// Service identifiers in registration order
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("services", &self.services.keys().collect::<Vec<_>>())
            .finish()
    }
}
