//! Plugin Catalog
//!
//! Maps the `module` named in a plugin descriptor to a factory building the
//! plugin object from its per-plugin configuration.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use meguca_runtime::PluginObject;

use crate::builtin;

/// Builds a plugin object from its configuration
pub type PluginFactory = Arc<dyn Fn(&Value) -> anyhow::Result<PluginObject> + Send + Sync>;

/// Registry of compiled-in plugin modules
#[derive(Clone, Default)]
pub struct PluginCatalog {
    factories: HashMap<String, PluginFactory>,
}

impl PluginCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a catalog holding the built-in plugins
    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();
        builtin::register_builtins(&mut catalog);
        catalog
    }

    /// Register a factory under a module name, replacing any previous one
    pub fn register<F>(&mut self, module: impl Into<String>, factory: F)
    where
        F: Fn(&Value) -> anyhow::Result<PluginObject> + Send + Sync + 'static,
    {
        self.factories.insert(module.into(), Arc::new(factory));
    }

    /// Build a plugin; `None` if the module is unknown
    pub fn build(&self, module: &str, config: &Value) -> Option<anyhow::Result<PluginObject>> {
        self.factories.get(module).map(|factory| factory(config))
    }

    pub fn contains(&self, module: &str) -> bool {
        self.factories.contains_key(module)
    }

    /// Registered module names, sorted
    pub fn modules(&self) -> Vec<&str> {
        let mut modules: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        modules.sort_unstable();
        modules
    }
}

impl fmt::Debug for PluginCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginCatalog")
            .field("modules", &self.modules())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meguca_types::PluginCategory;
    use serde_json::json;

    #[test]
    fn test_builtins_are_registered() {
        let catalog = PluginCatalog::with_builtins();
        assert_eq!(catalog.modules(), vec!["log_view", "static_data", "sum"]);

        let sum = catalog
            .build("sum", &json!({"inputs": ["a"], "output": "total"}))
            .unwrap()
            .unwrap();
        assert_eq!(sum.category(), PluginCategory::Stat);
    }

    #[test]
    fn test_unknown_module() {
        assert!(PluginCatalog::new().build("ghost", &json!({})).is_none());
    }

    #[test]
    fn test_factory_errors_are_returned() {
        let catalog = PluginCatalog::with_builtins();
        let result = catalog.build("sum", &json!({"inputs": "a"})).unwrap();
        assert!(result.is_err());
    }
}
