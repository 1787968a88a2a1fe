//! Meguca
//!
//! Plugin orchestration daemon: loads plugin descriptors and configuration,
//! then hands the plugins to the runtime's orchestrator.

pub mod builtin;
pub mod catalog;
pub mod config;
pub mod loader;

pub use catalog::PluginCatalog;
pub use loader::{LoadError, LoadedPlugins, PluginLoader};
