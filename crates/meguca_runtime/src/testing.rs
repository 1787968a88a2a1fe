//! Test doubles shared by the runtime's unit tests

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use meguca_types::{DataMap, EntryPoint, Signature, TriggerConfig};

use crate::error::{EntryError, RuntimeError, RuntimeResult};
use crate::plugin::{EntryResult, PluginDescriptor, PluginObject, ServicePlugin, StandardPlugin};
use crate::registry::{ServiceObject, service_object};
use crate::resolver::EntryArgs;
use crate::scheduler::{Job, JobHandle, Scheduler, SchedulerError};

/// Build a data map from a JSON object literal
pub(crate) fn data(value: Value) -> DataMap {
    serde_json::from_value(value).expect("data map literal")
}

/// Shared, ordered record of "plugin.entry" invocations
pub(crate) type Journal = Arc<Mutex<Vec<String>>>;

type Script = Arc<dyn Fn(&EntryArgs) -> EntryResult + Send + Sync>;

// ─────────────────────────────────────────────────────────────────────────────
// Scripted Plugin
// ─────────────────────────────────────────────────────────────────────────────

/// A standard plugin whose entry points are closures
#[derive(Clone, Default)]
pub(crate) struct ScriptedPlugin {
    scripts: HashMap<EntryPoint, Script>,
    signatures: HashMap<EntryPoint, Signature>,
    calls: Arc<Mutex<Vec<EntryPoint>>>,
    journal: Option<(Journal, String)>,
}

impl ScriptedPlugin {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Script an entry point
    pub(crate) fn on<F>(mut self, entry: EntryPoint, signature: Signature, script: F) -> Self
    where
        F: Fn(&EntryArgs) -> EntryResult + Send + Sync + 'static,
    {
        self.scripts.insert(entry, Arc::new(script));
        self.signatures.insert(entry, signature);
        self
    }

    /// Script an entry point that declares nothing and returns `output`
    pub(crate) fn returns(self, entry: EntryPoint, output: Value) -> Self {
        let output = data(output);
        self.on(entry, Signature::empty(), move |_| Ok(Some(output.clone())))
    }

    /// Record every invocation into a shared journal under `label`
    pub(crate) fn journal(mut self, journal: &Journal, label: &str) -> Self {
        self.journal = Some((Arc::clone(journal), label.to_string()));
        self
    }

    /// Handle to this plugin's own invocation log
    pub(crate) fn calls(&self) -> Arc<Mutex<Vec<EntryPoint>>> {
        Arc::clone(&self.calls)
    }

    pub(crate) fn into_collector(self, id: &str) -> PluginDescriptor {
        PluginDescriptor::new(id, id, PluginObject::collector(self))
            .with_trigger(TriggerConfig::every_seconds(60))
    }

    pub(crate) fn into_stat(self, id: &str) -> PluginDescriptor {
        PluginDescriptor::new(id, id, PluginObject::stat(self))
    }

    pub(crate) fn into_view(self, id: &str) -> PluginDescriptor {
        PluginDescriptor::new(id, id, PluginObject::view(self))
            .with_trigger(TriggerConfig::every_seconds(60))
    }

    fn invoke(&self, entry: EntryPoint, args: &EntryArgs) -> EntryResult {
        self.calls.lock().push(entry);
        if let Some((journal, label)) = &self.journal {
            journal.lock().push(format!("{label}.{entry}"));
        }

        match self.scripts.get(&entry) {
            Some(script) => script(args),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl StandardPlugin for ScriptedPlugin {
    fn signature(&self, entry: EntryPoint) -> Signature {
        self.signatures.get(&entry).cloned().unwrap_or_default()
    }

    fn provides(&self, entry: EntryPoint) -> bool {
        entry == EntryPoint::Run || self.scripts.contains_key(&entry)
    }

    async fn prepare(&self, args: &EntryArgs) -> EntryResult {
        self.invoke(EntryPoint::Prepare, args)
    }

    async fn run(&self, args: &EntryArgs) -> EntryResult {
        self.invoke(EntryPoint::Run, args)
    }

    async fn dry_run(&self, args: &EntryArgs) -> EntryResult {
        self.invoke(EntryPoint::DryRun, args)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Scripted Service
// ─────────────────────────────────────────────────────────────────────────────

/// A service plugin returning a fixed string object
pub(crate) struct ScriptedService {
    object: String,
    calls: Arc<AtomicUsize>,
}

impl ScriptedService {
    pub(crate) fn new(object: &str) -> Self {
        Self {
            object: object.to_string(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }

    pub(crate) fn into_service(self, id: &str) -> PluginDescriptor {
        PluginDescriptor::new(id, id, PluginObject::service(self))
    }
}

#[async_trait]
impl ServicePlugin for ScriptedService {
    async fn get(&self, _args: &EntryArgs) -> Result<ServiceObject, EntryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(service_object(self.object.clone()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Recording Scheduler
// ─────────────────────────────────────────────────────────────────────────────

/// A scheduler that only records registrations and lifecycle calls
#[derive(Default)]
pub(crate) struct RecordingScheduler {
    jobs: Mutex<Vec<(JobHandle, TriggerConfig, Job)>>,
    starts: AtomicUsize,
    shutdowns: AtomicUsize,
}

impl RecordingScheduler {
    pub(crate) fn job_names(&self) -> Vec<String> {
        self.jobs.lock().iter().map(|(h, _, _)| h.name.clone()).collect()
    }

    pub(crate) fn trigger(&self, name: &str) -> Option<TriggerConfig> {
        self.jobs
            .lock()
            .iter()
            .find(|(h, _, _)| h.name == name)
            .map(|(_, t, _)| t.clone())
    }

    pub(crate) fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub(crate) fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    /// Run a registered job once, as the scheduler would on its trigger
    pub(crate) async fn fire(&self, name: &str) -> RuntimeResult<()> {
        let job = self
            .jobs
            .lock()
            .iter()
            .find(|(h, _, _)| h.name == name)
            .map(|(_, _, job)| Arc::clone(job))
            .ok_or_else(|| RuntimeError::UnknownPlugin(name.to_string()))?;
        job().await
    }
}

#[async_trait]
impl Scheduler for RecordingScheduler {
    fn register(&self, name: &str, trigger: TriggerConfig, job: Job) -> Result<JobHandle, SchedulerError> {
        let handle = JobHandle::new(name);
        self.jobs.lock().push((handle.clone(), trigger, job));
        Ok(handle)
    }

    fn start(&self) -> Result<(), SchedulerError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), SchedulerError> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
