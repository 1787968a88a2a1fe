//! Meguca Types - Core type definitions shared by the runtime and plugins
//!
//! This crate contains the pure data structures used to describe plugins:
//! their category, the entry points they expose, the parameters those entry
//! points declare, and the trigger configuration used to schedule them.

mod category;
mod signature;
mod trigger;

pub use category::*;
pub use signature::*;
pub use trigger::*;

/// Insertion-ordered mapping of data bus keys to values.
///
/// This is what plugin entry points return and what the data bus stores.
pub type DataMap = indexmap::IndexMap<String, serde_json::Value>;
