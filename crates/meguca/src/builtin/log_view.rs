use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use meguca_runtime::{EntryArgs, EntryResult, StandardPlugin};
use meguca_types::{EntryPoint, Signature};

/// View plugin logging selected bus entries
///
/// With no `keys` configured, every entry on the bus is logged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogView {
    #[serde(default)]
    keys: Vec<String>,
}

impl LogView {
    pub const MODULE: &'static str = "log_view";

    pub fn from_config(config: &Value) -> anyhow::Result<Self> {
        match config {
            Value::Null => Ok(Self::default()),
            config => LogView::deserialize(config).context("invalid log_view configuration"),
        }
    }

    fn report(&self, args: &EntryArgs) -> EntryResult {
        let bus = args.data()?;

        if self.keys.is_empty() {
            for (key, value) in bus.snapshot() {
                info!(key = %key, value = %value, "Data");
            }
            return Ok(None);
        }

        for key in &self.keys {
            match bus.get(key) {
                Ok(value) => info!(key = %key, value = %value, "Data"),
                Err(e) => warn!(key = %key, "{}", e),
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl StandardPlugin for LogView {
    fn signature(&self, _entry: EntryPoint) -> Signature {
        Signature::new(["data"])
    }

    fn provides(&self, entry: EntryPoint) -> bool {
        matches!(entry, EntryPoint::Run | EntryPoint::DryRun)
    }

    async fn run(&self, args: &EntryArgs) -> EntryResult {
        self.report(args)
    }

    async fn dry_run(&self, args: &EntryArgs) -> EntryResult {
        self.report(args)
    }
}
