//! Tokio Scheduler
//!
//! Runs each registered job in its own task. A job run is never cancelled:
//! the shutdown signal is only observed between runs, and shutdown waits
//! (bounded by a timeout) for in-flight runs to finish.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use dashmap::DashMap;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use uuid::Uuid;

use meguca_types::{TriggerConfig, TriggerKind};

use super::{Job, JobHandle, Scheduler, SchedulerError};

// ─────────────────────────────────────────────────────────────────────────────
// Scheduler State
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle state of a [`TokioScheduler`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SchedulerState {
    /// Accepting registrations, not dispatching yet
    Idle = 0,
    /// Dispatching jobs
    Running = 1,
    /// Shut down; no further dispatches
    Stopped = 2,
}

impl SchedulerState {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Idle,
            1 => Self::Running,
            _ => Self::Stopped,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Firing Plan
// ─────────────────────────────────────────────────────────────────────────────

/// When a job fires, derived from its trigger configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Firing {
    /// Every period, first after one period
    Every(Duration),
    /// Once at a point in time
    Once(DateTime<Utc>),
}

impl Firing {
    /// Interpret a trigger
    ///
    /// `interval` triggers sum `weeks`, `days`, `hours`, `minutes` and
    /// `seconds`. `date` triggers read `run_date`, either RFC 3339 or a naive
    /// `YYYY-MM-DD[ HH:MM:SS]` taken as UTC.
    pub fn from_trigger(job: &str, trigger: &TriggerConfig) -> Result<Self, SchedulerError> {
        match trigger.kind {
            TriggerKind::Interval => {
                let secs = trigger
                    .interval_seconds()
                    .unwrap_or(Ok(0))
                    .map_err(|e| SchedulerError::invalid(job, e))?;
                if secs == 0 {
                    return Err(SchedulerError::InvalidTrigger {
                        job: job.to_string(),
                        message: "interval must be at least one second".to_string(),
                    });
                }
                let period = Duration::from_secs(secs);
                if Instant::now().checked_add(period).is_none() {
                    return Err(SchedulerError::InvalidTrigger {
                        job: job.to_string(),
                        message: format!("interval of {secs} seconds is too long"),
                    });
                }
                Ok(Firing::Every(period))
            }
            TriggerKind::Date => {
                let raw = trigger.get_str("run_date").ok_or_else(|| SchedulerError::InvalidTrigger {
                    job: job.to_string(),
                    message: "date trigger requires 'run_date'".to_string(),
                })?;
                let at = parse_run_date(raw).ok_or_else(|| SchedulerError::InvalidTrigger {
                    job: job.to_string(),
                    message: format!("cannot parse run_date '{raw}'"),
                })?;
                Ok(Firing::Once(at))
            }
            kind @ TriggerKind::Cron => Err(SchedulerError::UnsupportedTrigger(kind)),
        }
    }
}

fn parse_run_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }
    if let Ok(at) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(at.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|at| at.and_utc())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tokio Scheduler
// ─────────────────────────────────────────────────────────────────────────────

/// Internal representation of a registered job
struct ScheduledJob {
    handle: JobHandle,
    firing: Firing,
    job: Job,
}

/// Scheduler running jobs as tokio tasks
pub struct TokioScheduler {
    /// All registered jobs indexed by job id
    jobs: DashMap<Uuid, ScheduledJob>,

    /// Tasks of dispatched jobs; also serialises registration and start
    tasks: Mutex<Vec<JoinHandle<()>>>,

    /// Broadcast channel for the shutdown signal
    shutdown_tx: broadcast::Sender<()>,

    state: AtomicU8,

    /// How long shutdown waits for in-flight runs
    shutdown_timeout: Duration,
}

impl Default for TokioScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl TokioScheduler {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            jobs: DashMap::new(),
            tasks: Mutex::new(Vec::new()),
            shutdown_tx,
            state: AtomicU8::new(SchedulerState::Idle as u8),
            shutdown_timeout: Duration::from_secs(30),
        }
    }

    /// Set how long shutdown waits for running jobs
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn state(&self) -> SchedulerState {
        SchedulerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Names of registered jobs
    pub fn job_names(&self) -> Vec<String> {
        self.jobs.iter().map(|entry| entry.handle.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    fn spawn(&self, scheduled: &ScheduledJob) -> JoinHandle<()> {
        let shutdown_rx = self.shutdown_tx.subscribe();
        let handle = scheduled.handle.clone();
        let firing = scheduled.firing;
        let job = scheduled.job.clone();

        tokio::spawn(async move { run_job_loop(handle, firing, job, shutdown_rx).await })
    }
}

#[async_trait]
impl Scheduler for TokioScheduler {
    fn register(&self, name: &str, trigger: TriggerConfig, job: Job) -> Result<JobHandle, SchedulerError> {
        let firing = Firing::from_trigger(name, &trigger)?;
        let mut tasks = self.tasks.lock();

        let scheduled = ScheduledJob {
            handle: JobHandle::new(name),
            firing,
            job,
        };
        let handle = scheduled.handle.clone();

        match self.state() {
            SchedulerState::Stopped => return Err(SchedulerError::ShutDown),
            SchedulerState::Running => tasks.push(self.spawn(&scheduled)),
            SchedulerState::Idle => {}
        }

        tracing::debug!(job = %name, trigger = %trigger.kind, "Registered job");
        self.jobs.insert(handle.id, scheduled);
        Ok(handle)
    }

    fn start(&self) -> Result<(), SchedulerError> {
        let mut tasks = self.tasks.lock();

        match self.state() {
            SchedulerState::Running => return Err(SchedulerError::AlreadyRunning),
            SchedulerState::Stopped => return Err(SchedulerError::ShutDown),
            SchedulerState::Idle => {}
        }
        self.state.store(SchedulerState::Running as u8, Ordering::SeqCst);

        for entry in self.jobs.iter() {
            tasks.push(self.spawn(entry.value()));
        }

        tracing::info!(jobs = tasks.len(), "Scheduler started");
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), SchedulerError> {
        let previous = SchedulerState::from_u8(
            self.state.swap(SchedulerState::Stopped as u8, Ordering::SeqCst),
        );
        if previous == SchedulerState::Stopped {
            return Ok(());
        }

        // Send shutdown signal
        let _ = self.shutdown_tx.send(());

        let tasks = std::mem::take(&mut *self.tasks.lock());
        tracing::info!(jobs = tasks.len(), "Shutting down scheduler");

        match tokio::time::timeout(self.shutdown_timeout, futures::future::join_all(tasks)).await {
            Ok(results) => {
                for result in results {
                    if let Err(e) = result {
                        tracing::error!(error = %e, "Job task ended abnormally");
                    }
                }
                tracing::info!("Scheduler stopped");
                Ok(())
            }
            Err(_) => {
                tracing::warn!("Some jobs did not finish within timeout");
                Err(SchedulerError::ShutdownTimeout)
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Job Task Loop
// ─────────────────────────────────────────────────────────────────────────────

async fn run_job_loop(
    handle: JobHandle,
    firing: Firing,
    job: Job,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    match firing {
        Firing::Every(period) => {
            let mut timer = tokio::time::interval_at(Instant::now() + period, period);
            // Missed runs are coalesced into one
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = timer.tick() => execute(&handle, &job).await,
                }
            }
        }
        Firing::Once(at) => {
            let delay = (at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            tokio::select! {
                _ = shutdown_rx.recv() => {}
                _ = tokio::time::sleep(delay) => execute(&handle, &job).await,
            }
        }
    }

    tracing::debug!(job = %handle.name, "Job stopped");
}

async fn execute(handle: &JobHandle, job: &Job) {
    tracing::debug!(job = %handle.name, "Running job");

    match AssertUnwindSafe(job()).catch_unwind().await {
        Ok(Ok(())) => {
            tracing::debug!(job = %handle.name, "Job finished");
        }
        Ok(Err(e)) => {
            tracing::error!(job = %handle.name, error = %e, "Job failed");
        }
        Err(_) => {
            tracing::error!(job = %handle.name, "Job panicked");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    use serde_json::json;

    use crate::error::RuntimeError;
    use crate::scheduler::job;

    fn counting_job(counter: &Arc<AtomicUsize>) -> Job {
        let counter = Arc::clone(counter);
        job(move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
    }

    fn trigger(value: serde_json::Value) -> TriggerConfig {
        TriggerConfig::from_value(&value).unwrap()
    }

    #[test]
    fn test_firing_from_triggers() {
        assert_eq!(
            Firing::from_trigger("j", &trigger(json!({"trigger": "interval", "minutes": 1, "seconds": 5}))),
            Ok(Firing::Every(Duration::from_secs(65)))
        );

        let rfc = Firing::from_trigger("j", &trigger(json!({"trigger": "date", "run_date": "2018-01-01T12:00:00+02:00"})))
            .unwrap();
        let naive = Firing::from_trigger("j", &trigger(json!({"trigger": "date", "run_date": "2018-01-01 10:00:00"})))
            .unwrap();
        assert_eq!(rfc, naive);

        let day = Firing::from_trigger("j", &trigger(json!({"trigger": "date", "run_date": "2018-01-01"}))).unwrap();
        assert!(matches!(day, Firing::Once(_)));
    }

    #[test]
    fn test_unusable_triggers() {
        assert_eq!(
            Firing::from_trigger("j", &trigger(json!({"trigger": "cron", "hour": 3}))),
            Err(SchedulerError::UnsupportedTrigger(TriggerKind::Cron))
        );
        assert!(matches!(
            Firing::from_trigger("j", &trigger(json!({"trigger": "interval"}))),
            Err(SchedulerError::InvalidTrigger { .. })
        ));
        assert!(matches!(
            Firing::from_trigger("j", &trigger(json!({"trigger": "date", "run_date": "tomorrow"}))),
            Err(SchedulerError::InvalidTrigger { .. })
        ));
        assert!(matches!(
            Firing::from_trigger("j", &trigger(json!({"trigger": "date"}))),
            Err(SchedulerError::InvalidTrigger { .. })
        ));
    }

    #[test]
    fn test_oversized_interval_is_rejected() {
        let endless = trigger(json!({"trigger": "interval", "weeks": 40_000_000_000_000_i64}));
        assert!(matches!(
            Firing::from_trigger("j", &endless),
            Err(SchedulerError::InvalidTrigger { ref message, .. }) if message.contains("too long")
        ));

        let scheduler = TokioScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));
        assert!(scheduler.register("endless", endless, counting_job(&counter)).is_err());
        let daily = trigger(json!({"trigger": "interval", "days": 1}));
        assert!(scheduler.register("daily", daily, counting_job(&counter)).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_job_fires_after_each_period() {
        let scheduler = TokioScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));

        scheduler
            .register("counter", TriggerConfig::every_seconds(10), counting_job(&counter))
            .unwrap();

        // Nothing fires before start
        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        scheduler.start().unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);

        scheduler.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_dispatch() {
        let scheduler = TokioScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));
        scheduler
            .register("counter", TriggerConfig::every_seconds(10), counting_job(&counter))
            .unwrap();
        scheduler.start().unwrap();

        tokio::time::sleep(Duration::from_secs(15)).await;
        scheduler.shutdown().await.unwrap();
        assert_eq!(scheduler.state(), SchedulerState::Stopped);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        // Second shutdown is a no-op
        assert_eq!(scheduler.shutdown().await, Ok(()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_waits_for_running_job() {
        let scheduler = TokioScheduler::new();
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);

        scheduler
            .register(
                "slow",
                TriggerConfig::every_seconds(10),
                job(move || {
                    let flag = Arc::clone(&flag);
                    async move {
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        flag.store(true, Ordering::SeqCst);
                        Ok(())
                    }
                }),
            )
            .unwrap();
        scheduler.start().unwrap();

        // Job is mid-run at t=12
        tokio::time::sleep(Duration::from_secs(12)).await;
        assert!(!finished.load(Ordering::SeqCst));

        scheduler.shutdown().await.unwrap();
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_job_keeps_its_schedule() {
        let scheduler = TokioScheduler::new();
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);

        scheduler
            .register(
                "broken",
                TriggerConfig::every_seconds(10),
                job(move || {
                    let counter = Arc::clone(&counter);
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Err(RuntimeError::NoPlugins)
                    }
                }),
            )
            .unwrap();
        scheduler.start().unwrap();

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 2);

        scheduler.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_past_date_job_fires_once() {
        let scheduler = TokioScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));

        scheduler.start().unwrap();
        // Registered after start, so it is dispatched right away
        scheduler
            .register(
                "once",
                trigger(json!({"trigger": "date", "run_date": "2018-01-01T00:00:00Z"})),
                counting_job(&counter),
            )
            .unwrap();

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.job_names(), vec!["once"]);

        scheduler.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_lifecycle_errors() {
        let scheduler = TokioScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));

        scheduler.start().unwrap();
        assert_eq!(scheduler.start(), Err(SchedulerError::AlreadyRunning));

        scheduler.shutdown().await.unwrap();
        assert_eq!(scheduler.start(), Err(SchedulerError::ShutDown));
        assert_eq!(
            scheduler
                .register("late", TriggerConfig::every_seconds(1), counting_job(&counter))
                .unwrap_err(),
            SchedulerError::ShutDown
        );
        assert!(scheduler.is_empty());
    }
}
