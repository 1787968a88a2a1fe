//! Error types for the orchestration runtime

use meguca_types::{EntryPoint, TriggerError};

use crate::orchestrator::OrchestratorState;
use crate::plugin::PluginDescriptor;
use crate::scheduler::SchedulerError;

// ─────────────────────────────────────────────────────────────────────────────
// Bus Error
// ─────────────────────────────────────────────────────────────────────────────

/// Failure to read a key from the data bus
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    /// The key does not exist and will not be produced in this run
    #[error("data key '{0}' not found")]
    NotFound(String),

    /// The key may still be produced later in the current stat batch
    #[error("data key '{0}' does not exist yet")]
    NotYetExist(String),

    /// The key exists but holds a value of a different shape
    #[error("data key '{key}' could not be decoded: {message}")]
    Decode { key: String, message: String },
}

pub type BusResult<T> = Result<T, BusError>;

// ─────────────────────────────────────────────────────────────────────────────
// Entry Error
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome of a failed entry point invocation
///
/// The stat-tier resolver retries on [`EntryError::DependencyPending`] and
/// treats every other variant as fatal.
#[derive(Debug, thiserror::Error)]
pub enum EntryError {
    #[error("dependency '{0}' is not available yet")]
    DependencyPending(String),

    #[error("dependency '{0}' does not exist")]
    DependencyMissing(String),

    #[error("argument '{0}' was not passed; it must be declared in the entry point signature")]
    MissingArgument(String),

    #[error("service '{id}' is not of type {expected}")]
    ServiceType { id: String, expected: &'static str },

    #[error("entry point '{0}' is not provided by this plugin")]
    NotProvided(EntryPoint),

    /// Domain error raised by the plugin itself
    #[error(transparent)]
    Plugin(#[from] anyhow::Error),
}

impl EntryError {
    /// Wrap any error raised by plugin code
    pub fn plugin(err: impl Into<anyhow::Error>) -> Self {
        EntryError::Plugin(err.into())
    }

    /// The missing key, if this is a pending-dependency signal
    pub fn pending_key(&self) -> Option<&str> {
        match self {
            EntryError::DependencyPending(key) => Some(key),
            _ => None,
        }
    }
}

impl From<BusError> for EntryError {
    fn from(err: BusError) -> Self {
        match err {
            BusError::NotFound(key) => EntryError::DependencyMissing(key),
            BusError::NotYetExist(key) => EntryError::DependencyPending(key),
            decode @ BusError::Decode { .. } => EntryError::Plugin(decode.into()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Runtime Error
// ─────────────────────────────────────────────────────────────────────────────

/// Errors surfaced by the orchestrator and the stat-tier resolver
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("no plugins found")]
    NoPlugins,

    #[error("plugin '{plugin}' failed in {entry}: {source}")]
    Entry {
        plugin: String,
        entry: EntryPoint,
        #[source]
        source: EntryError,
    },

    /// A stat plugin still lacked a key after the last resolution pass
    #[error("plugin '{plugin}' requires permanently-missing key '{key}'")]
    DependencyNotFound { plugin: String, key: String },

    #[error("plugin '{plugin}' has no {entry} entry point")]
    MissingEntryPoint { plugin: String, entry: EntryPoint },

    #[error("unknown or disabled plugin '{0}'")]
    UnknownPlugin(String),

    #[error("plugin '{0}' is registered twice in the same category")]
    DuplicatePlugin(String),

    #[error("'{0}' has no schedule configuration")]
    MissingSchedule(String),

    #[error("'{name}' has an invalid schedule: {source}")]
    InvalidSchedule {
        name: String,
        #[source]
        source: TriggerError,
    },

    #[error("invalid core settings: {0}")]
    Settings(#[from] serde_json::Error),

    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: OrchestratorState,
    },

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

impl RuntimeError {
    /// Attach plugin context to an entry point failure
    pub fn entry(descriptor: &PluginDescriptor, entry: EntryPoint, source: EntryError) -> Self {
        RuntimeError::Entry {
            plugin: descriptor.id.clone(),
            entry,
            source,
        }
    }
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
