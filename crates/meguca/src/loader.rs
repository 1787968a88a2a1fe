//! Plugin Loader
//!
//! Discovers plugin descriptor files (`*.plugin.toml`) in a directory and
//! builds each plugin through the [`PluginCatalog`].
//!
//! ```toml
//! [core]
//! name = "Static data"
//! identifier = "static"
//! category = "Collector"
//! module = "static_data"
//! config_file = "static.toml"
//!
//! [scheduling]
//! trigger = "interval"
//! seconds = 60
//! ```

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::fs;
use tracing::{debug, info, warn};

use meguca_runtime::{PluginDescriptor, PluginSource};
use meguca_types::{PluginCategory, UnknownCategory};

use crate::catalog::PluginCatalog;

/// File name suffix of plugin descriptors
pub const DESCRIPTOR_SUFFIX: &str = ".plugin.toml";

/// Error type for plugin loading
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Plugin directory does not exist: {0}")]
    PathNotFound(PathBuf),

    #[error("Failed to read file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse {path}: {source}")]
    TomlParseError {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid category in {path}: {source}")]
    InvalidCategory {
        path: PathBuf,
        #[source]
        source: UnknownCategory,
    },

    #[error("Plugin '{id}' uses unknown module '{module}'")]
    UnknownModule { id: String, module: String },

    #[error("Plugin '{id}' is declared as {declared} but module builds a {actual} plugin")]
    CategoryMismatch {
        id: String,
        declared: PluginCategory,
        actual: PluginCategory,
    },

    #[error("Duplicate {category} plugin identifier '{id}'")]
    Duplicate { category: PluginCategory, id: String },

    #[error("Plugin identifier '{id}' is used by both a {first} and a {second} plugin")]
    SharedIdentifier {
        id: String,
        first: PluginCategory,
        second: PluginCategory,
    },

    #[error("Failed to build plugin '{id}': {source}")]
    Factory {
        id: String,
        #[source]
        source: anyhow::Error,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Descriptor Files
// ─────────────────────────────────────────────────────────────────────────────

/// Contents of a `*.plugin.toml` file
#[derive(Debug, Clone, Deserialize)]
pub struct PluginManifest {
    pub core: CoreSection,

    /// Trigger configuration for Collector and View plugins
    #[serde(default)]
    pub scheduling: Option<IndexMap<String, Value>>,
}

/// `[core]` section of a descriptor
#[derive(Debug, Clone, Deserialize)]
pub struct CoreSection {
    pub name: String,
    pub identifier: String,
    pub category: String,
    pub module: String,

    /// Per-plugin configuration, relative to the descriptor
    #[serde(default)]
    pub config_file: Option<PathBuf>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Loaded Plugins
// ─────────────────────────────────────────────────────────────────────────────

/// Every plugin found in a directory, in discovery order
#[derive(Debug, Clone, Default)]
pub struct LoadedPlugins {
    descriptors: Vec<PluginDescriptor>,
    config: Map<String, Value>,
}

impl LoadedPlugins {
    /// Identifiers are unique across categories; they key the plugin settings
    fn push(&mut self, descriptor: PluginDescriptor) -> Result<(), LoadError> {
        let category = descriptor.category();
        if let Some(existing) = self.descriptors.iter().find(|d| d.id == descriptor.id) {
            let first = existing.category();
            return Err(if first == category {
                LoadError::Duplicate {
                    category,
                    id: descriptor.id,
                }
            } else {
                LoadError::SharedIdentifier {
                    id: descriptor.id,
                    first,
                    second: category,
                }
            });
        }

        self.config.insert(descriptor.id.clone(), descriptor.config.clone());
        self.descriptors.push(descriptor);
        Ok(())
    }

    pub fn descriptors(&self) -> &[PluginDescriptor] {
        &self.descriptors
    }

    /// Per-plugin configuration keyed by identifier
    pub fn config(&self) -> Value {
        Value::Object(self.config.clone())
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

impl PluginSource for LoadedPlugins {
    fn list_all(&self) -> Vec<PluginDescriptor> {
        self.descriptors.clone()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Plugin Loader
// ─────────────────────────────────────────────────────────────────────────────

/// Plugin loader
#[derive(Debug, Clone)]
pub struct PluginLoader {
    catalog: PluginCatalog,
}

impl PluginLoader {
    pub fn new(catalog: PluginCatalog) -> Self {
        Self { catalog }
    }

    /// Load every descriptor in `dir`, sorted by file name
    pub async fn load(&self, dir: impl AsRef<Path>) -> Result<LoadedPlugins, LoadError> {
        let dir = dir.as_ref();
        if !dir.exists() {
            return Err(LoadError::PathNotFound(dir.to_path_buf()));
        }

        info!("Loading plugins from: {}", dir.display());

        let mut paths = Vec::new();
        let mut entries = fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if name.ends_with(DESCRIPTOR_SUFFIX) {
                    paths.push(path);
                }
            }
        }
        paths.sort();

        let mut plugins = LoadedPlugins::default();
        for path in paths {
            let descriptor = self.load_descriptor(&path).await?;
            debug!("Loaded plugin: {} ({})", descriptor.name, descriptor.id);
            plugins.push(descriptor)?;
        }

        info!("Loaded {} plugins", plugins.len());
        Ok(plugins)
    }

    async fn load_descriptor(&self, path: &Path) -> Result<PluginDescriptor, LoadError> {
        let content = fs::read_to_string(path).await?;
        let manifest: PluginManifest = toml::from_str(&content).map_err(|source| LoadError::TomlParseError {
            path: path.to_path_buf(),
            source,
        })?;
        let core = manifest.core;

        let declared: PluginCategory = core.category.parse().map_err(|source| LoadError::InvalidCategory {
            path: path.to_path_buf(),
            source,
        })?;

        let config = match &core.config_file {
            Some(file) => {
                let base = path.parent().unwrap_or(Path::new("."));
                Self::load_plugin_config(&base.join(file)).await
            }
            None => Value::Object(Map::new()),
        };

        let plugin = self
            .catalog
            .build(&core.module, &config)
            .ok_or_else(|| LoadError::UnknownModule {
                id: core.identifier.clone(),
                module: core.module.clone(),
            })?
            .map_err(|source| LoadError::Factory {
                id: core.identifier.clone(),
                source,
            })?;

        if plugin.category() != declared {
            return Err(LoadError::CategoryMismatch {
                id: core.identifier,
                declared,
                actual: plugin.category(),
            });
        }

        let mut descriptor = PluginDescriptor::new(core.identifier, core.name, plugin).with_config(config);
        if let Some(schedule) = manifest.scheduling {
            descriptor = descriptor.with_schedule(schedule);
        }
        Ok(descriptor)
    }

    /// Read a per-plugin configuration file; unreadable files give an empty table
    async fn load_plugin_config(path: &Path) -> Value {
        let parsed = match fs::read_to_string(path).await {
            Ok(content) => toml::from_str::<Value>(&content).map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        match parsed {
            Ok(config) => config,
            Err(e) => {
                warn!("Failed to load plugin configuration {}: {}", path.display(), e);
                Value::Object(Map::new())
            }
        }
    }
}
