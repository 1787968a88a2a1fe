//! Stat-Tier Resolver
//!
//! Stat plugins read each other's output, but they are listed in discovery
//! order rather than dependency order. The resolver runs the whole tier as a
//! batch in a bounded number of passes over a strict-pending bus handle:
//!
//! - a plugin that succeeds is removed from the pending queue
//! - a plugin that reads a key nobody has written yet is deferred to the
//!   next pass
//! - a plugin still waiting on a key in the last pass fails the batch with
//!   [`RuntimeError::DependencyNotFound`]
//!
//! Any other failure aborts the batch immediately. Dependency cycles are not
//! detected; they surface as an escalation after the last pass.

use std::sync::Arc;

use meguca_types::{EntryPoint, PluginCategory};

use crate::bus::DataBus;
use crate::error::{EntryError, RuntimeError, RuntimeResult};
use crate::plugin::PluginDescriptor;
use crate::runner::PluginRunner;

/// Number of passes over the pending queue per batch
pub const DEFAULT_RESOLUTION_PASSES: usize = 2;

/// Runs the stat tier in dependency-tolerant passes
#[derive(Debug, Clone)]
pub struct StatTierResolver {
    plugins: Arc<Vec<PluginDescriptor>>,
    passes: usize,
}

impl StatTierResolver {
    /// Build a resolver over the enabled stat plugins, in discovery order
    ///
    /// Descriptors of other categories are ignored.
    pub fn new(plugins: impl IntoIterator<Item = PluginDescriptor>) -> Self {
        let plugins = plugins
            .into_iter()
            .filter(|d| d.category() == PluginCategory::Stat)
            .collect();

        Self {
            plugins: Arc::new(plugins),
            passes: DEFAULT_RESOLUTION_PASSES,
        }
    }

    /// Override the number of passes (at least one)
    pub fn with_passes(mut self, passes: usize) -> Self {
        self.passes = passes.max(1);
        self
    }

    pub fn passes(&self) -> usize {
        self.passes
    }

    pub fn plugins(&self) -> &[PluginDescriptor] {
        &self.plugins
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Run `entry` on every stat plugin providing it
    ///
    /// Reads go through a strict-pending handle of `bus` that lives only for
    /// the batch; other handles keep reporting missing keys as not found.
    pub async fn resolve(&self, runner: &PluginRunner, bus: &DataBus, entry: EntryPoint) -> RuntimeResult<()> {
        let mut batch = bus.clone();
        batch.set_strict_pending(true);

        let mut pending: Vec<&PluginDescriptor> = self.plugins.iter().filter(|d| d.provides(entry)).collect();
        tracing::debug!(entry = %entry, plugins = pending.len(), "Resolving stat tier");

        for pass in 0..self.passes {
            let last = pass + 1 == self.passes;
            let mut deferred = Vec::new();

            for descriptor in pending {
                match runner.run_entry(descriptor, entry, &batch).await {
                    Ok(()) => {}
                    Err(EntryError::DependencyPending(key)) if last => {
                        return Err(RuntimeError::DependencyNotFound {
                            plugin: descriptor.id.clone(),
                            key,
                        });
                    }
                    Err(EntryError::DependencyPending(key)) => {
                        tracing::debug!(plugin = %descriptor.id, key = %key, pass, "Deferring stat plugin");
                        deferred.push(descriptor);
                    }
                    Err(e) => return Err(RuntimeError::entry(descriptor, entry, e)),
                }
            }

            pending = deferred;
            if pending.is_empty() {
                break;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use meguca_types::Signature;

    use crate::config::Configuration;
    use crate::registry::ServiceRegistry;
    use crate::resolver::ParameterResolver;
    use crate::testing::{Journal, ScriptedPlugin, data};

    fn runner() -> PluginRunner {
        PluginRunner::new(ParameterResolver::new(
            Arc::new(Configuration::new(json!({}), json!({}))),
            Arc::new(ServiceRegistry::new()),
        ))
    }

    /// A stat plugin publishing `input + 1` under `output`
    fn increment(input: &'static str, output: &'static str) -> ScriptedPlugin {
        ScriptedPlugin::new().on(EntryPoint::Run, Signature::new(["data"]), move |args| {
            let value: i64 = args.data()?.get_as(input)?;
            Ok(Some(data(json!({ output: value + 1 }))))
        })
    }

    #[tokio::test]
    async fn test_out_of_order_dependency_resolves_in_second_pass() {
        let journal = Journal::default();
        let b = increment("x", "y").journal(&journal, "b").into_stat("b");
        let a = ScriptedPlugin::new()
            .returns(EntryPoint::Run, json!({"x": 1}))
            .journal(&journal, "a")
            .into_stat("a");

        let bus = DataBus::new();
        StatTierResolver::new(vec![b, a])
            .resolve(&runner(), &bus, EntryPoint::Run)
            .await
            .unwrap();

        assert_eq!(bus.snapshot(), data(json!({"x": 1, "y": 2})));
        assert_eq!(*journal.lock(), vec!["b.run", "a.run", "b.run"]);
    }

    #[tokio::test]
    async fn test_never_produced_key_escalates_after_last_pass() {
        let plugin = increment("never", "y");
        let calls = plugin.calls();

        let bus = DataBus::new();
        let err = StatTierResolver::new(vec![plugin.into_stat("c")])
            .resolve(&runner(), &bus, EntryPoint::Run)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RuntimeError::DependencyNotFound { ref plugin, ref key } if plugin == "c" && key == "never"
        ));
        assert_eq!(calls.lock().len(), DEFAULT_RESOLUTION_PASSES);

        // The caller's handle was never made strict
        assert!(!bus.strict_pending());
    }

    #[tokio::test]
    async fn test_other_errors_abort_without_retry() {
        let failing = ScriptedPlugin::new().on(EntryPoint::Run, Signature::empty(), |_| {
            Err(EntryError::plugin(anyhow::anyhow!("bad numbers")))
        });
        let failing_calls = failing.calls();
        let after = ScriptedPlugin::new();
        let after_calls = after.calls();

        let err = StatTierResolver::new(vec![failing.into_stat("f"), after.into_stat("g")])
            .resolve(&runner(), &DataBus::new(), EntryPoint::Run)
            .await
            .unwrap_err();

        assert!(matches!(err, RuntimeError::Entry { ref plugin, entry: EntryPoint::Run, .. } if plugin == "f"));
        assert_eq!(failing_calls.lock().len(), 1);
        assert!(after_calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_cycle_surfaces_as_escalation() {
        let a = increment("y", "x").into_stat("a");
        let b = increment("x", "y").into_stat("b");

        let err = StatTierResolver::new(vec![a, b])
            .resolve(&runner(), &DataBus::new(), EntryPoint::Run)
            .await
            .unwrap_err();

        assert!(matches!(err, RuntimeError::DependencyNotFound { ref plugin, .. } if plugin == "a"));
    }

    #[tokio::test]
    async fn test_chain_depth_is_bounded_by_passes() {
        let chain = || {
            vec![
                increment("y", "z").into_stat("c"),
                increment("x", "y").into_stat("b"),
                ScriptedPlugin::new()
                    .returns(EntryPoint::Run, json!({"x": 1}))
                    .into_stat("a"),
            ]
        };

        let err = StatTierResolver::new(chain())
            .resolve(&runner(), &DataBus::new(), EntryPoint::Run)
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::DependencyNotFound { ref key, .. } if key == "y"));

        let bus = DataBus::new();
        StatTierResolver::new(chain())
            .with_passes(3)
            .resolve(&runner(), &bus, EntryPoint::Run)
            .await
            .unwrap();
        assert_eq!(bus.get("z"), Ok(json!(3)));
    }

    #[tokio::test]
    async fn test_prepare_skips_plugins_without_hook() {
        let with_hook = ScriptedPlugin::new().returns(EntryPoint::Prepare, json!({"ready": true}));
        let without_hook = ScriptedPlugin::new();
        let without_calls = without_hook.calls();

        let bus = DataBus::new();
        StatTierResolver::new(vec![without_hook.into_stat("n"), with_hook.into_stat("p")])
            .resolve(&runner(), &bus, EntryPoint::Prepare)
            .await
            .unwrap();

        assert_eq!(bus.get("ready"), Ok(json!(true)));
        assert!(without_calls.lock().is_empty());
    }

    #[test]
    fn test_non_stat_descriptors_are_ignored() {
        let resolver = StatTierResolver::new(vec![
            ScriptedPlugin::new().into_collector("c"),
            ScriptedPlugin::new().into_stat("s"),
        ])
        .with_passes(0);

        assert_eq!(resolver.plugins().len(), 1);
        assert_eq!(resolver.passes(), 1);
    }
}
