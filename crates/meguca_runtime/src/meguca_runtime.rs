//! Meguca Runtime - Plugin orchestration engine
//!
//! This crate contains the data bus, the parameter resolver, the plugin
//! runner, the two-pass stat-tier resolver and the orchestrator that binds
//! plugins to a scheduler.

pub use meguca_types;

mod bus;
mod config;
mod error;
mod orchestrator;
mod plugin;
mod registry;
mod resolver;
mod runner;
mod source;
mod stat_tier;

pub mod scheduler;

#[cfg(test)]
mod testing;

pub use bus::*;
pub use config::*;
pub use error::*;
pub use orchestrator::*;
pub use plugin::*;
pub use registry::*;
pub use resolver::*;
pub use runner::*;
pub use source::*;
pub use stat_tier::*;
