//! Job Scheduling
//!
//! The orchestrator hands recurring work to a [`Scheduler`]: one job per
//! Collector and View plugin, plus one batched job for the whole stat tier.
//! Trigger parameters are forwarded as-is; interpreting them is the
//! scheduler's business.
//!
//! [`TokioScheduler`] is the bundled implementation. It runs every job in its
//! own tokio task and supports `interval` and `date` triggers.

mod manager;

pub use manager::*;

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use uuid::Uuid;

use meguca_types::{TriggerConfig, TriggerError, TriggerKind};

use crate::error::RuntimeResult;

// ─────────────────────────────────────────────────────────────────────────────
// Scheduler Error
// ─────────────────────────────────────────────────────────────────────────────

/// Errors raised by schedulers
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    #[error("trigger kind '{0}' is not supported by this scheduler")]
    UnsupportedTrigger(TriggerKind),

    #[error("invalid trigger for job '{job}': {message}")]
    InvalidTrigger { job: String, message: String },

    #[error("scheduler is already running")]
    AlreadyRunning,

    #[error("scheduler has been shut down")]
    ShutDown,

    #[error("timed out waiting for running jobs to finish")]
    ShutdownTimeout,
}

impl SchedulerError {
    pub(crate) fn invalid(job: &str, err: TriggerError) -> Self {
        SchedulerError::InvalidTrigger {
            job: job.to_string(),
            message: err.to_string(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Jobs
// ─────────────────────────────────────────────────────────────────────────────

/// Future produced by one run of a job
pub type JobFuture = BoxFuture<'static, RuntimeResult<()>>;

/// A schedulable callable; arguments are captured by the closure
pub type Job = Arc<dyn Fn() -> JobFuture + Send + Sync>;

/// Turn an async closure into a [`Job`]
pub fn job<F, Fut>(f: F) -> Job
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = RuntimeResult<()>> + Send + 'static,
{
    Arc::new(move || f().boxed())
}

/// Identifies a registered job
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobHandle {
    pub id: Uuid,
    pub name: String,
}

impl JobHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Scheduler Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Runs registered jobs on their triggers
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Register a job under a display name
    ///
    /// Jobs registered after [`Scheduler::start`] begin running immediately.
    fn register(&self, name: &str, trigger: TriggerConfig, job: Job) -> Result<JobHandle, SchedulerError>;

    /// Start dispatching registered jobs
    fn start(&self) -> Result<(), SchedulerError>;

    /// Stop dispatching; jobs already running are allowed to finish
    async fn shutdown(&self) -> Result<(), SchedulerError>;
}
