//! Plugin categories and entry points

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Plugin Category
// ─────────────────────────────────────────────────────────────────────────────

/// The tier a plugin belongs to
///
/// Categories are fixed at discovery time and decide which entry points the
/// orchestrator calls and when.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PluginCategory {
    /// Provides a long-lived object (API client, site session, ...) to other plugins
    Service,
    /// Collects raw data and writes it to the data bus
    Collector,
    /// Derives statistics from data already on the bus
    Stat,
    /// Renders and publishes data from the bus
    View,
}

impl PluginCategory {
    /// All categories, in the order the orchestrator prepares them
    pub const ALL: [PluginCategory; 4] = [
        PluginCategory::Service,
        PluginCategory::Collector,
        PluginCategory::Stat,
        PluginCategory::View,
    ];

    /// Canonical name used in descriptor files and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            PluginCategory::Service => "Service",
            PluginCategory::Collector => "Collector",
            PluginCategory::Stat => "Stat",
            PluginCategory::View => "View",
        }
    }
}

impl fmt::Display for PluginCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown category name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown plugin category: {0}")]
pub struct UnknownCategory(pub String);

impl FromStr for PluginCategory {
    type Err = UnknownCategory;

    /// Descriptor files are case-insensitive about category names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "service" => Ok(PluginCategory::Service),
            "collector" => Ok(PluginCategory::Collector),
            "stat" => Ok(PluginCategory::Stat),
            "view" => Ok(PluginCategory::View),
            _ => Err(UnknownCategory(s.to_string())),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Entry Point
// ─────────────────────────────────────────────────────────────────────────────

/// A named method a plugin exposes for the orchestrator to call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryPoint {
    /// Service plugins only: build the service object
    Get,
    /// Optional one-shot hook run before scheduling starts
    Prepare,
    /// Recurring entry point
    Run,
    /// Optional entry point used only in dry-run mode
    DryRun,
}

impl EntryPoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryPoint::Get => "get",
            EntryPoint::Prepare => "prepare",
            EntryPoint::Run => "run",
            EntryPoint::DryRun => "dry_run",
        }
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
