//! Plugin Source
//!
//! Where the orchestrator gets its plugins from. Discovery itself (descriptor
//! files, per-plugin configuration) lives with the application; the runtime
//! only needs the descriptors grouped by category, in discovery order.

use std::collections::HashSet;

use meguca_types::PluginCategory;

use crate::error::{RuntimeError, RuntimeResult};
use crate::plugin::PluginDescriptor;

/// Provides plugin descriptors in discovery order
pub trait PluginSource: Send + Sync {
    /// Every discovered plugin
    fn list_all(&self) -> Vec<PluginDescriptor>;

    /// Plugins of one category
    fn list_by_category(&self, category: PluginCategory) -> Vec<PluginDescriptor> {
        self.list_all()
            .into_iter()
            .filter(|d| d.category() == category)
            .collect()
    }
}

/// A fixed, in-memory list of plugins
#[derive(Debug, Clone, Default)]
pub struct StaticPluginSource {
    plugins: Vec<PluginDescriptor>,
}

impl StaticPluginSource {
    /// Build a source, rejecting identifiers repeated within a category
    pub fn new(plugins: Vec<PluginDescriptor>) -> RuntimeResult<Self> {
        let mut seen = HashSet::new();
        for descriptor in &plugins {
            if !seen.insert((descriptor.category(), descriptor.id.as_str())) {
                return Err(RuntimeError::DuplicatePlugin(descriptor.id.clone()));
            }
        }
        Ok(Self { plugins })
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

impl PluginSource for StaticPluginSource {
    fn list_all(&self) -> Vec<PluginDescriptor> {
        self.plugins.clone()
    }
}
