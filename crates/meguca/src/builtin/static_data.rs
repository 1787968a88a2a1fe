use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;

use meguca_runtime::{EntryArgs, EntryResult, StandardPlugin};
use meguca_types::{DataMap, EntryPoint};

/// Collector publishing the fixed `[data]` table of its configuration
#[derive(Debug, Clone, Default)]
pub struct StaticData {
    data: DataMap,
}

impl StaticData {
    pub const MODULE: &'static str = "static_data";

    pub fn new(data: DataMap) -> Self {
        Self { data }
    }

    pub fn from_config(config: &Value) -> anyhow::Result<Self> {
        let data = match config.get("data") {
            Some(table) => serde_json::from_value(table.clone()).context("'data' must be a table")?,
            None => DataMap::new(),
        };
        Ok(Self::new(data))
    }

    fn output(&self) -> EntryResult {
        Ok(Some(self.data.clone()))
    }
}

#[async_trait]
impl StandardPlugin for StaticData {
    fn provides(&self, _entry: EntryPoint) -> bool {
        true
    }

    async fn prepare(&self, _args: &EntryArgs) -> EntryResult {
        self.output()
    }

    async fn run(&self, _args: &EntryArgs) -> EntryResult {
        self.output()
    }

    async fn dry_run(&self, _args: &EntryArgs) -> EntryResult {
        self.output()
    }
}
