//! Configuration
//!
//! The configuration is handed to plugins untouched. The runtime itself only
//! reads a handful of core settings from the process-wide half.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use wildmatch::WildMatch;

use meguca_types::{TriggerConfig, TriggerError};

use crate::error::RuntimeResult;

/// Key holding process-wide settings
pub const GENERAL_KEY: &str = "meguca";

/// Key holding per-plugin settings, indexed by plugin identifier
pub const PLUGINS_KEY: &str = "plugins";

/// Read-only configuration passed to plugins that declare `config`
#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    root: Value,
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new(Value::Object(Map::new()), Value::Object(Map::new()))
    }
}

impl Configuration {
    /// Combine process-wide and per-plugin settings
    pub fn new(general: Value, plugins: Value) -> Self {
        let mut root = Map::new();
        root.insert(GENERAL_KEY.to_string(), general);
        root.insert(PLUGINS_KEY.to_string(), plugins);
        Self {
            root: Value::Object(root),
        }
    }

    /// Process-wide settings
    pub fn general(&self) -> &Value {
        &self.root[GENERAL_KEY]
    }

    /// Settings of every plugin
    pub fn plugins(&self) -> &Value {
        &self.root[PLUGINS_KEY]
    }

    /// Settings of one plugin
    pub fn plugin(&self, id: &str) -> Option<&Value> {
        self.plugins().get(id)
    }

    /// Top-level lookup (`"meguca"` or `"plugins"`)
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.root.get(key)
    }

    pub fn as_value(&self) -> &Value {
        &self.root
    }

    /// Parse the settings the runtime itself understands
    pub fn core_settings(&self) -> RuntimeResult<CoreSettings> {
        match self.general() {
            Value::Null => Ok(CoreSettings::default()),
            general => Ok(serde_json::from_value(general.clone())?),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Core Settings
// ─────────────────────────────────────────────────────────────────────────────

/// Settings the orchestrator reads from the process-wide configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoreSettings {
    /// Plugin identifiers (or wildcard patterns) to skip entirely
    #[serde(default)]
    pub disabled_plugins: Vec<String>,

    /// Shared trigger configuration for the stat batch
    #[serde(default)]
    pub stat_plugins_schedule: Option<Value>,

    #[serde(default)]
    pub dry_run: DryRunSettings,
}

/// Dry-run mode settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DryRunSettings {
    #[serde(default)]
    pub enabled: bool,

    /// Plugin identifiers whose `dry_run` entry point is invoked, in order
    #[serde(default)]
    pub plugins: Vec<String>,
}

impl CoreSettings {
    /// Whether a plugin is on the denylist
    pub fn is_disabled(&self, id: &str) -> bool {
        self.disabled_plugins
            .iter()
            .any(|pattern| WildMatch::new(pattern).matches(id))
    }

    /// Trigger for the stat batch, if configured
    pub fn stat_trigger(&self) -> Option<Result<TriggerConfig, TriggerError>> {
        self.stat_plugins_schedule
            .as_ref()
            .map(TriggerConfig::from_value)
    }
}
