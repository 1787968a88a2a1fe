//! Orchestrator
//!
//! Drives the plugin lifecycle:
//!
//! ```text
//! Unprepared --prepare()--> Prepared --run()--> Running --shutdown()--> Shutdown
//!      \
//!       `--prepare() fails--> Failed --shutdown()--> Shutdown
//! ```
//!
//! `prepare()` loads every service, runs the one-shot `prepare` hooks tier by
//! tier (collectors, then the stat tier, then views) and registers the
//! recurring jobs. Every schedule is checked before the first job is
//! registered. A failed preparation cannot be retried. `run()` either starts the scheduler or, in dry-run mode,
//! invokes the configured `dry_run` entry points once, in order.

use std::fmt;
use std::sync::Arc;

use meguca_types::{EntryPoint, PluginCategory, TriggerConfig, TriggerError};

use crate::bus::DataBus;
use crate::config::{Configuration, CoreSettings};
use crate::error::{RuntimeError, RuntimeResult};
use crate::plugin::PluginDescriptor;
use crate::registry::ServiceRegistry;
use crate::resolver::ParameterResolver;
use crate::runner::PluginRunner;
use crate::scheduler::{Job, Scheduler, job};
use crate::source::PluginSource;
use crate::stat_tier::{DEFAULT_RESOLUTION_PASSES, StatTierResolver};

/// Scheduler job name of the stat batch
pub const STAT_JOB_NAME: &str = "Stat plugins";

// ─────────────────────────────────────────────────────────────────────────────
// Orchestrator State
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle state of the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    Unprepared,
    Prepared,
    Running,
    Failed,
    Shutdown,
}

impl fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrchestratorState::Unprepared => "unprepared",
            OrchestratorState::Prepared => "prepared",
            OrchestratorState::Running => "running",
            OrchestratorState::Failed => "failed",
            OrchestratorState::Shutdown => "shut down",
        };
        f.write_str(s)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Orchestrator
// ─────────────────────────────────────────────────────────────────────────────

/// A job checked and ready for registration
struct PendingJob {
    name: String,
    trigger: TriggerConfig,
    run: Job,
}

/// Owns the data bus, the service registry and the scheduler binding
pub struct Orchestrator<S: Scheduler> {
    source: Arc<dyn PluginSource>,
    config: Arc<Configuration>,
    settings: CoreSettings,
    bus: DataBus,
    runner: PluginRunner,
    passes: usize,
    dry_run: bool,
    scheduler: S,
    state: OrchestratorState,
}

impl<S: Scheduler> Orchestrator<S> {
    /// Create an orchestrator
    ///
    /// Fails if the `meguca` section of the configuration cannot be read as
    /// core settings.
    pub fn new(source: Arc<dyn PluginSource>, config: Configuration, scheduler: S) -> RuntimeResult<Self> {
        let config = Arc::new(config);
        let settings = config.core_settings()?;
        let runner = PluginRunner::new(ParameterResolver::new(
            Arc::clone(&config),
            Arc::new(ServiceRegistry::new()),
        ));

        Ok(Self {
            source,
            dry_run: settings.dry_run.enabled,
            config,
            settings,
            bus: DataBus::new(),
            runner,
            passes: DEFAULT_RESOLUTION_PASSES,
            scheduler,
            state: OrchestratorState::Unprepared,
        })
    }

    /// Set the number of stat-tier resolution passes
    pub fn with_resolution_passes(mut self, passes: usize) -> Self {
        self.passes = passes;
        self
    }

    /// Force dry-run mode on or off, overriding the configuration
    pub fn with_dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    pub fn bus(&self) -> &DataBus {
        &self.bus
    }

    pub fn services(&self) -> &ServiceRegistry {
        self.runner.resolver().services()
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn settings(&self) -> &CoreSettings {
        &self.settings
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Load services, run `prepare` hooks and register recurring jobs
    ///
    /// Any failure leaves the orchestrator in [`OrchestratorState::Failed`].
    pub async fn prepare(&mut self) -> RuntimeResult<()> {
        self.expect_state("prepare", OrchestratorState::Unprepared)?;

        match self.prepare_plugins().await {
            Ok(()) => {
                self.state = OrchestratorState::Prepared;
                tracing::info!(services = self.services().len(), keys = self.bus.len(), "Plugins prepared");
                Ok(())
            }
            Err(err) => {
                self.state = OrchestratorState::Failed;
                Err(err)
            }
        }
    }

    async fn prepare_plugins(&mut self) -> RuntimeResult<()> {
        let discovered = self.source.list_all().len();
        if discovered == 0 {
            return Err(RuntimeError::NoPlugins);
        }
        tracing::info!(plugins = discovered, dry_run = self.dry_run, "Preparing plugins");

        self.load_services().await?;

        let collectors = self.enabled(PluginCategory::Collector);
        self.prepare_tier(&collectors).await?;

        let stats = StatTierResolver::new(self.enabled(PluginCategory::Stat)).with_passes(self.passes);
        stats.resolve(&self.runner, &self.bus, EntryPoint::Prepare).await?;

        let views = self.enabled(PluginCategory::View);
        self.prepare_tier(&views).await?;

        if self.dry_run {
            tracing::info!("Dry run: skipping job registration");
        } else {
            let mut jobs = self.recurring_jobs(collectors.iter().chain(views.iter()))?;
            jobs.extend(self.stat_batch_job(stats)?);

            for pending in jobs {
                self.scheduler.register(&pending.name, pending.trigger, pending.run)?;
                tracing::debug!(job = %pending.name, "Scheduled job");
            }
        }

        Ok(())
    }

    /// Start the scheduler, or perform the dry run
    pub async fn run(&mut self) -> RuntimeResult<()> {
        self.expect_state("run", OrchestratorState::Prepared)?;

        if self.dry_run {
            self.run_dry().await?;
        } else {
            self.scheduler.start()?;
            tracing::info!("Plugins running");
        }

        self.state = OrchestratorState::Running;
        Ok(())
    }

    /// Stop the scheduler; running jobs finish first
    pub async fn shutdown(&mut self) -> RuntimeResult<()> {
        if self.state == OrchestratorState::Shutdown {
            return Err(RuntimeError::InvalidState {
                operation: "shut down",
                state: self.state,
            });
        }

        self.scheduler.shutdown().await?;
        self.state = OrchestratorState::Shutdown;
        tracing::info!("Orchestrator shut down");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Preparation Steps
    // ─────────────────────────────────────────────────────────────────────────

    fn expect_state(&self, operation: &'static str, expected: OrchestratorState) -> RuntimeResult<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(RuntimeError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    /// Plugins of one category, minus the denylist, in discovery order
    fn enabled(&self, category: PluginCategory) -> Vec<PluginDescriptor> {
        self.source
            .list_by_category(category)
            .into_iter()
            .filter(|descriptor| {
                let disabled = self.settings.is_disabled(&descriptor.id);
                if disabled {
                    tracing::debug!(plugin = %descriptor.id, category = %category, "Plugin disabled");
                }
                !disabled
            })
            .collect()
    }

    /// Build every service object and rebuild the runner around them
    ///
    /// Services are loaded in discovery order; each one can declare the
    /// services loaded before it.
    async fn load_services(&mut self) -> RuntimeResult<()> {
        let mut registry = ServiceRegistry::new();

        for descriptor in self.enabled(PluginCategory::Service) {
            let runner = PluginRunner::new(ParameterResolver::new(
                Arc::clone(&self.config),
                Arc::new(registry.clone()),
            ));
            let object = runner
                .get_service(&descriptor, &self.bus)
                .await
                .map_err(|e| RuntimeError::entry(&descriptor, EntryPoint::Get, e))?;

            tracing::info!(service = %descriptor.id, "Loaded service");
            registry.insert(descriptor.id.clone(), object);
        }

        self.runner = PluginRunner::new(ParameterResolver::new(Arc::clone(&self.config), Arc::new(registry)));
        Ok(())
    }

    async fn prepare_tier(&self, plugins: &[PluginDescriptor]) -> RuntimeResult<()> {
        for descriptor in plugins.iter().filter(|d| d.provides(EntryPoint::Prepare)) {
            self.runner
                .run_entry(descriptor, EntryPoint::Prepare, &self.bus)
                .await
                .map_err(|e| RuntimeError::entry(descriptor, EntryPoint::Prepare, e))?;
        }
        Ok(())
    }

    fn recurring_jobs<'a>(&self, plugins: impl Iterator<Item = &'a PluginDescriptor>) -> RuntimeResult<Vec<PendingJob>> {
        let mut jobs = Vec::new();
        for descriptor in plugins {
            let trigger = required_trigger(&descriptor.name, descriptor.trigger())?;

            let runner = self.runner.clone();
            let bus = self.bus.clone();
            let plugin = descriptor.clone();
            let run = job(move || {
                let runner = runner.clone();
                let bus = bus.clone();
                let plugin = plugin.clone();
                async move {
                    runner
                        .run_entry(&plugin, EntryPoint::Run, &bus)
                        .await
                        .map_err(|e| RuntimeError::entry(&plugin, EntryPoint::Run, e))
                }
            });

            jobs.push(PendingJob {
                name: descriptor.name.clone(),
                trigger,
                run,
            });
        }
        Ok(jobs)
    }

    /// The whole stat tier as one job, if any stat plugin is enabled
    fn stat_batch_job(&self, stats: StatTierResolver) -> RuntimeResult<Option<PendingJob>> {
        if stats.is_empty() {
            return Ok(None);
        }
        let trigger = required_trigger(STAT_JOB_NAME, self.settings.stat_trigger())?;

        let stats = Arc::new(stats);
        let runner = self.runner.clone();
        let bus = self.bus.clone();
        let batch = job(move || {
            let stats = Arc::clone(&stats);
            let runner = runner.clone();
            let bus = bus.clone();
            async move { stats.resolve(&runner, &bus, EntryPoint::Run).await }
        });

        Ok(Some(PendingJob {
            name: STAT_JOB_NAME.to_string(),
            trigger,
            run: batch,
        }))
    }

    async fn run_dry(&self) -> RuntimeResult<()> {
        let candidates: Vec<PluginDescriptor> = PluginCategory::ALL
            .into_iter()
            .filter(|category| *category != PluginCategory::Service)
            .flat_map(|category| self.enabled(category))
            .collect();

        for id in &self.settings.dry_run.plugins {
            let descriptor = candidates
                .iter()
                .find(|d| &d.id == id)
                .ok_or_else(|| RuntimeError::UnknownPlugin(id.clone()))?;

            if !descriptor.provides(EntryPoint::DryRun) {
                return Err(RuntimeError::MissingEntryPoint {
                    plugin: id.clone(),
                    entry: EntryPoint::DryRun,
                });
            }

            tracing::info!(plugin = %id, "Dry run");
            self.runner
                .run_entry(descriptor, EntryPoint::DryRun, &self.bus)
                .await
                .map_err(|e| RuntimeError::entry(descriptor, EntryPoint::DryRun, e))?;
        }
        Ok(())
    }
}

fn required_trigger(
    name: &str,
    trigger: Option<Result<TriggerConfig, TriggerError>>,
) -> RuntimeResult<TriggerConfig> {
    match trigger {
        Some(Ok(trigger)) => Ok(trigger),
        Some(Err(source)) => Err(RuntimeError::InvalidSchedule {
            name: name.to_string(),
            source,
        }),
        None => Err(RuntimeError::MissingSchedule(name.to_string())),
    }
}
