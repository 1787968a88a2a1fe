//! Plugin Categories
//!
//! Plugins are one of four variants. Service plugins expose `get`, which
//! builds a long-lived object shared with other plugins. Collector, Stat and
//! View plugins expose a mandatory `run` and the optional `prepare` and
//! `dry_run` hooks.
//!
//! Every entry point receives only the arguments its [`Signature`] declares
//! and returns either nothing or a mapping of new data bus entries.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;

use meguca_types::{DataMap, EntryPoint, PluginCategory, Signature, TriggerConfig, TriggerError};

use crate::error::EntryError;
use crate::registry::ServiceObject;
use crate::resolver::EntryArgs;

/// Result of a Collector/Stat/View entry point
pub type EntryResult = Result<Option<DataMap>, EntryError>;

// ─────────────────────────────────────────────────────────────────────────────
// Plugin Traits
// ─────────────────────────────────────────────────────────────────────────────

/// A plugin providing a service object (API wrapper, site session, ...)
#[async_trait]
pub trait ServicePlugin: Send + Sync + 'static {
    /// Parameters `get` wants
    fn signature(&self) -> Signature {
        Signature::empty()
    }

    /// Build the service object
    async fn get(&self, args: &EntryArgs) -> Result<ServiceObject, EntryError>;
}

/// A Collector, Stat or View plugin
#[async_trait]
pub trait StandardPlugin: Send + Sync + 'static {
    /// Parameters the given entry point wants
    fn signature(&self, _entry: EntryPoint) -> Signature {
        Signature::empty()
    }

    /// Whether the plugin implements an optional entry point
    ///
    /// `run` is always provided. Override this to opt in to `prepare` and
    /// `dry_run`.
    fn provides(&self, entry: EntryPoint) -> bool {
        entry == EntryPoint::Run
    }

    /// One-shot hook run before scheduling starts
    async fn prepare(&self, _args: &EntryArgs) -> EntryResult {
        Ok(None)
    }

    /// Recurring entry point
    async fn run(&self, args: &EntryArgs) -> EntryResult;

    /// Entry point used in dry-run mode
    async fn dry_run(&self, _args: &EntryArgs) -> EntryResult {
        Ok(None)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Plugin Object
// ─────────────────────────────────────────────────────────────────────────────

/// A plugin tagged with its category
#[derive(Clone)]
pub enum PluginObject {
    Service(Arc<dyn ServicePlugin>),
    Collector(Arc<dyn StandardPlugin>),
    Stat(Arc<dyn StandardPlugin>),
    View(Arc<dyn StandardPlugin>),
}

impl PluginObject {
    pub fn service(plugin: impl ServicePlugin) -> Self {
        PluginObject::Service(Arc::new(plugin))
    }

    pub fn collector(plugin: impl StandardPlugin) -> Self {
        PluginObject::Collector(Arc::new(plugin))
    }

    pub fn stat(plugin: impl StandardPlugin) -> Self {
        PluginObject::Stat(Arc::new(plugin))
    }

    pub fn view(plugin: impl StandardPlugin) -> Self {
        PluginObject::View(Arc::new(plugin))
    }

    /// Wrap a standard plugin under the given category
    ///
    /// Returns `None` for [`PluginCategory::Service`], which needs a
    /// [`ServicePlugin`].
    pub fn standard(category: PluginCategory, plugin: Arc<dyn StandardPlugin>) -> Option<Self> {
        match category {
            PluginCategory::Service => None,
            PluginCategory::Collector => Some(PluginObject::Collector(plugin)),
            PluginCategory::Stat => Some(PluginObject::Stat(plugin)),
            PluginCategory::View => Some(PluginObject::View(plugin)),
        }
    }

    pub fn category(&self) -> PluginCategory {
        match self {
            PluginObject::Service(_) => PluginCategory::Service,
            PluginObject::Collector(_) => PluginCategory::Collector,
            PluginObject::Stat(_) => PluginCategory::Stat,
            PluginObject::View(_) => PluginCategory::View,
        }
    }

    /// The standard plugin, unless this is a service
    pub fn as_standard(&self) -> Option<&Arc<dyn StandardPlugin>> {
        match self {
            PluginObject::Service(_) => None,
            PluginObject::Collector(p) | PluginObject::Stat(p) | PluginObject::View(p) => Some(p),
        }
    }

    pub fn as_service(&self) -> Option<&Arc<dyn ServicePlugin>> {
        match self {
            PluginObject::Service(p) => Some(p),
            _ => None,
        }
    }

    /// Whether the plugin can be invoked through `entry`
    pub fn provides(&self, entry: EntryPoint) -> bool {
        match self {
            PluginObject::Service(_) => entry == EntryPoint::Get,
            _ => self
                .as_standard()
                .is_some_and(|p| entry != EntryPoint::Get && p.provides(entry)),
        }
    }
}

impl fmt::Debug for PluginObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PluginObject::{}", self.category())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Plugin Descriptor
// ─────────────────────────────────────────────────────────────────────────────

/// A discovered plugin: identity, configuration, schedule and the plugin itself
#[derive(Debug, Clone)]
pub struct PluginDescriptor {
    /// Stable identifier, unique within the category
    pub id: String,

    /// Human-readable name, used for scheduler job names and logs
    pub name: String,

    /// Per-plugin configuration
    pub config: Value,

    /// Raw schedule table (Collector and View only)
    pub schedule: Option<IndexMap<String, Value>>,

    plugin: PluginObject,
}

impl PluginDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>, plugin: PluginObject) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            config: Value::Null,
            schedule: None,
            plugin,
        }
    }

    /// Set per-plugin configuration
    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }

    /// Set the raw schedule table
    pub fn with_schedule(mut self, schedule: IndexMap<String, Value>) -> Self {
        self.schedule = Some(schedule);
        self
    }

    /// Set the schedule from an already-parsed trigger
    pub fn with_trigger(self, trigger: TriggerConfig) -> Self {
        let mut schedule = IndexMap::with_capacity(trigger.params.len() + 1);
        schedule.insert("trigger".to_string(), Value::from(trigger.kind.as_str()));
        schedule.extend(trigger.params);
        self.with_schedule(schedule)
    }

    pub fn category(&self) -> PluginCategory {
        self.plugin.category()
    }

    pub fn plugin(&self) -> &PluginObject {
        &self.plugin
    }

    pub fn provides(&self, entry: EntryPoint) -> bool {
        self.plugin.provides(entry)
    }

    /// Parse the schedule table, if any
    pub fn trigger(&self) -> Option<Result<TriggerConfig, TriggerError>> {
        self.schedule
            .clone()
            .map(TriggerConfig::from_schedule)
    }
}
