//! Parameter Resolver
//!
//! Builds the argument set for an entry point from its declared
//! [`Signature`]. Each declared parameter is looked up in a provider table:
//!
//! - `data` provides the data bus handle of the current invocation
//! - `config` provides the [`Configuration`]
//! - any other name provides the service registered under that identifier
//!
//! Names without a provider are left out. Nothing that was not declared is
//! ever passed, so a plugin only sees the dependencies it asked for.

use std::any::Any;
use std::sync::Arc;

use indexmap::IndexMap;
use meguca_types::{Param, Signature};

use crate::bus::DataBus;
use crate::config::Configuration;
use crate::error::EntryError;
use crate::registry::{ServiceObject, ServiceRegistry, downcast_service};

// ─────────────────────────────────────────────────────────────────────────────
// Entry Args
// ─────────────────────────────────────────────────────────────────────────────

/// Arguments passed to one entry point invocation
#[derive(Default, Clone)]
pub struct EntryArgs {
    data: Option<DataBus>,
    config: Option<Arc<Configuration>>,
    services: IndexMap<String, ServiceObject>,
}

impl EntryArgs {
    /// Arguments with nothing resolved
    pub fn empty() -> Self {
        Self::default()
    }

    /// The data bus, if declared
    pub fn data(&self) -> Result<&DataBus, EntryError> {
        self.data
            .as_ref()
            .ok_or_else(|| EntryError::MissingArgument(Param::Data.name().to_string()))
    }

    /// The configuration, if declared
    pub fn config(&self) -> Result<&Configuration, EntryError> {
        self.config
            .as_deref()
            .ok_or_else(|| EntryError::MissingArgument(Param::Config.name().to_string()))
    }

    /// A declared service, as a concrete type
    pub fn service<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>, EntryError> {
        let object = self
            .services
            .get(name)
            .ok_or_else(|| EntryError::MissingArgument(name.to_string()))?;
        downcast_service(name, object)
    }

    /// Names of every argument passed
    pub fn names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        if self.data.is_some() {
            names.push(Param::Data.name());
        }
        if self.config.is_some() {
            names.push(Param::Config.name());
        }
        names.extend(self.services.keys().map(String::as_str));
        names
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_none() && self.config.is_none() && self.services.is_empty()
    }
}

impl std::fmt::Debug for EntryArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryArgs")
            .field("names", &self.names())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Parameter Resolver
// ─────────────────────────────────────────────────────────────────────────────

/// What a parameter name resolves to
enum Provided {
    Data(DataBus),
    Config(Arc<Configuration>),
    Service(ServiceObject),
}

/// Resolves entry point signatures against configuration and services
#[derive(Debug, Clone)]
pub struct ParameterResolver {
    config: Arc<Configuration>,
    services: Arc<ServiceRegistry>,
}

impl ParameterResolver {
    pub fn new(config: Arc<Configuration>, services: Arc<ServiceRegistry>) -> Self {
        Self { config, services }
    }

    pub fn config(&self) -> &Arc<Configuration> {
        &self.config
    }

    pub fn services(&self) -> &Arc<ServiceRegistry> {
        &self.services
    }

    /// Build the arguments for `signature`, passing `bus` as `data`
    pub fn resolve(&self, signature: &Signature, bus: &DataBus) -> EntryArgs {
        let mut args = EntryArgs::empty();

        for param in signature.params() {
            match self.provide(param, bus) {
                Some(Provided::Data(bus)) => args.data = Some(bus),
                Some(Provided::Config(config)) => args.config = Some(config),
                Some(Provided::Service(object)) => {
                    args.services.insert(param.name().to_string(), object);
                }
                None => {
                    tracing::trace!(param = %param, "No provider for declared parameter");
                }
            }
        }

        args
    }

    fn provide(&self, param: &Param, bus: &DataBus) -> Option<Provided> {
        match param {
            Param::Data => Some(Provided::Data(bus.clone())),
            Param::Config => Some(Provided::Config(Arc::clone(&self.config))),
            Param::Named(name) => self
                .services
                .get_object(name)
                .map(|object| Provided::Service(Arc::clone(object))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::service_object;
    use serde_json::json;

    fn resolver() -> ParameterResolver {
        let mut services = ServiceRegistry::new();
        services.insert("ns_api", service_object("api".to_string()));
        services.insert("ns_site", service_object("site".to_string()));

        ParameterResolver::new(
            Arc::new(Configuration::new(json!({"user_agent": "Meguca"}), json!({}))),
            Arc::new(services),
        )
    }

    #[test]
    fn test_empty_signature_gets_nothing() {
        let args = resolver().resolve(&Signature::empty(), &DataBus::new());

        assert!(args.is_empty());
        assert!(matches!(args.data(), Err(EntryError::MissingArgument(ref n)) if n == "data"));
        assert!(args.config().is_err());
        assert!(args.service::<String>("ns_api").is_err());
    }

    #[test]
    fn test_only_declared_parameters_are_passed() {
        let bus = DataBus::new();
        bus.insert("a", 1);

        let args = resolver().resolve(&Signature::new(["data", "ns_site"]), &bus);

        assert_eq!(args.names(), vec!["data", "ns_site"]);
        assert_eq!(args.data().unwrap().get("a"), Ok(json!(1)));
        assert_eq!(*args.service::<String>("ns_site").unwrap(), "site");
        assert!(args.config().is_err());
        assert!(args.service::<u64>("ns_api").is_err());
    }

    #[test]
    fn test_unknown_names_are_omitted() {
        let args = resolver().resolve(&Signature::new(["config", "nagisa"]), &DataBus::new());

        assert_eq!(args.names(), vec!["config"]);
        assert_eq!(args.config().unwrap().general()["user_agent"], json!("Meguca"));
        assert!(matches!(
            args.service::<String>("nagisa"),
            Err(EntryError::MissingArgument(ref n)) if n == "nagisa"
        ));
    }

    #[test]
    fn test_data_uses_the_invocation_bus_handle() {
        let mut strict = DataBus::new();
        strict.set_strict_pending(true);

        let args = resolver().resolve(&Signature::new(["data"]), &strict);
        assert!(args.data().unwrap().strict_pending());
    }
}
