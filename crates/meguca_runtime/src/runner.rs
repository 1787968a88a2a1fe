//! Plugin Runner
//!
//! Invokes one entry point of one plugin: resolves the declared arguments,
//! awaits the entry point and merges any returned mapping into the data bus.

use std::sync::Arc;

use meguca_types::EntryPoint;

use crate::bus::DataBus;
use crate::error::EntryError;
use crate::plugin::PluginDescriptor;
use crate::registry::ServiceObject;
use crate::resolver::ParameterResolver;

/// Runs plugin entry points against a resolver
#[derive(Debug, Clone)]
pub struct PluginRunner {
    resolver: Arc<ParameterResolver>,
}

impl PluginRunner {
    pub fn new(resolver: ParameterResolver) -> Self {
        Self {
            resolver: Arc::new(resolver),
        }
    }

    pub fn resolver(&self) -> &ParameterResolver {
        &self.resolver
    }

    /// Invoke `entry` on a Collector, Stat or View plugin
    ///
    /// Returned entries are merged into `bus` in one atomic step. An empty or
    /// absent result leaves the bus untouched.
    pub async fn run_entry(
        &self,
        descriptor: &PluginDescriptor,
        entry: EntryPoint,
        bus: &DataBus,
    ) -> Result<(), EntryError> {
        let plugin = match descriptor.plugin().as_standard() {
            Some(plugin) if descriptor.provides(entry) => plugin,
            _ => return Err(EntryError::NotProvided(entry)),
        };

        let args = self.resolver.resolve(&plugin.signature(entry), bus);
        tracing::debug!(plugin = %descriptor.id, entry = %entry, args = ?args.names(), "Invoking entry point");

        let output = match entry {
            EntryPoint::Prepare => plugin.prepare(&args).await?,
            EntryPoint::Run => plugin.run(&args).await?,
            EntryPoint::DryRun => plugin.dry_run(&args).await?,
            EntryPoint::Get => return Err(EntryError::NotProvided(entry)),
        };

        if let Some(entries) = output {
            let merged = bus.set_all(entries);
            tracing::debug!(plugin = %descriptor.id, entry = %entry, keys = merged, "Merged plugin output");
        }

        Ok(())
    }

    /// Build the object of a Service plugin
    ///
    /// A service declaring `data` receives a handle to `bus` and may keep it.
    pub async fn get_service(&self, descriptor: &PluginDescriptor, bus: &DataBus) -> Result<ServiceObject, EntryError> {
        let plugin = descriptor
            .plugin()
            .as_service()
            .ok_or(EntryError::NotProvided(EntryPoint::Get))?;

        let args = self.resolver.resolve(&plugin.signature(), bus);
        tracing::debug!(plugin = %descriptor.id, args = ?args.names(), "Loading service");

        plugin.get(&args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use meguca_types::Signature;

    use crate::config::Configuration;
    use crate::registry::{ServiceRegistry, service_object};
    use crate::testing::{ScriptedPlugin, ScriptedService, data};

    fn runner(services: ServiceRegistry) -> PluginRunner {
        PluginRunner::new(ParameterResolver::new(
            Arc::new(Configuration::new(json!({}), json!({}))),
            Arc::new(services),
        ))
    }

    #[tokio::test]
    async fn test_returned_mapping_is_merged() {
        let bus = DataBus::new();
        let collector = ScriptedPlugin::new()
            .returns(EntryPoint::Run, json!({"a": 1, "b": 2}))
            .into_collector("c");

        tokio_test::assert_ok!(
            runner(ServiceRegistry::new())
                .run_entry(&collector, EntryPoint::Run, &bus)
                .await
        );

        assert_eq!(bus.snapshot(), data(json!({"a": 1, "b": 2})));
    }

    #[tokio::test]
    async fn test_empty_result_leaves_bus_unchanged() {
        let bus = DataBus::with_entries(data(json!({"a": 1})));
        let view = ScriptedPlugin::new()
            .on(EntryPoint::Run, Signature::empty(), |_| Ok(Some(data(json!({})))))
            .into_view("v");

        let runner = runner(ServiceRegistry::new());
        runner.run_entry(&view, EntryPoint::Run, &bus).await.unwrap();
        runner.run_entry(&view, EntryPoint::Prepare, &bus).await.unwrap_err();

        assert_eq!(bus.snapshot(), data(json!({"a": 1})));
    }

    #[tokio::test]
    async fn test_plugin_reads_declared_service_and_data() {
        let mut services = ServiceRegistry::new();
        services.insert("ns_api", service_object(7_u64));

        let bus = DataBus::with_entries(data(json!({"x": 5})));
        let stat = ScriptedPlugin::new()
            .on(EntryPoint::Run, Signature::new(["data", "ns_api"]), |args| {
                let x: u64 = args.data()?.get_as("x")?;
                let factor = args.service::<u64>("ns_api")?;
                Ok(Some(data(json!({"y": x * *factor}))))
            })
            .into_stat("s");

        runner(services).run_entry(&stat, EntryPoint::Run, &bus).await.unwrap();
        assert_eq!(bus.get("y"), Ok(json!(35)));
    }

    #[tokio::test]
    async fn test_missing_optional_entry_point() {
        let plugin = ScriptedPlugin::new();
        let calls = plugin.calls();
        let collector = plugin.into_collector("c");

        let err = tokio_test::assert_err!(
            runner(ServiceRegistry::new())
                .run_entry(&collector, EntryPoint::DryRun, &DataBus::new())
                .await
        );

        assert!(matches!(err, EntryError::NotProvided(EntryPoint::DryRun)));
        assert!(calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_plugin_error_propagates_without_merge() {
        let bus = DataBus::new();
        let collector = ScriptedPlugin::new()
            .on(EntryPoint::Run, Signature::empty(), |_| {
                Err(EntryError::plugin(anyhow::anyhow!("site unreachable")))
            })
            .into_collector("c");

        let err = runner(ServiceRegistry::new())
            .run_entry(&collector, EntryPoint::Run, &bus)
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "site unreachable");
        assert!(bus.is_empty());
    }

    #[tokio::test]
    async fn test_get_service() {
        let service = ScriptedService::new("session");
        let calls = service.calls();
        let descriptor = service.into_service("ns_site");
        let runner = runner(ServiceRegistry::new());

        let object = runner.get_service(&descriptor, &DataBus::new()).await.unwrap();
        assert_eq!(*object.downcast::<String>().unwrap(), "session");
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);

        let not_a_service = ScriptedPlugin::new().into_stat("s");
        assert!(matches!(
            runner.get_service(&not_a_service, &DataBus::new()).await,
            Err(EntryError::NotProvided(EntryPoint::Get))
        ));
    }
}
