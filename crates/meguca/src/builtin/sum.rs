use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use meguca_runtime::{EntryArgs, EntryError, EntryResult, StandardPlugin};
use meguca_types::{DataMap, EntryPoint, Signature};

#[derive(Debug, Clone, Deserialize)]
struct SumConfig {
    inputs: Vec<String>,
    output: String,
}

/// Stat plugin publishing the sum of numeric bus entries
///
/// Integers stay integers; any float input makes the sum a float.
#[derive(Debug, Clone)]
pub struct Sum {
    config: SumConfig,
}

impl Sum {
    pub const MODULE: &'static str = "sum";

    pub fn from_config(config: &Value) -> anyhow::Result<Self> {
        let config = SumConfig::deserialize(config).context("sum needs 'inputs' and 'output'")?;
        Ok(Self { config })
    }

    fn total(&self, args: &EntryArgs) -> EntryResult {
        let bus = args.data()?;
        let mut integer: Option<i64> = Some(0);
        let mut float = 0.0;

        for key in &self.config.inputs {
            let value = bus.get(key)?;
            let number = value
                .as_f64()
                .ok_or_else(|| EntryError::plugin(anyhow::anyhow!("'{key}' is not a number: {value}")))?;
            float += number;
            integer = integer.zip(value.as_i64()).and_then(|(sum, n)| sum.checked_add(n));
        }

        let total = match integer {
            Some(sum) => Value::from(sum),
            None => Value::from(float),
        };

        let mut output = DataMap::new();
        output.insert(self.config.output.clone(), total);
        Ok(Some(output))
    }
}

#[async_trait]
impl StandardPlugin for Sum {
    fn signature(&self, _entry: EntryPoint) -> Signature {
        Signature::new(["data"])
    }

    fn provides(&self, entry: EntryPoint) -> bool {
        matches!(entry, EntryPoint::Run | EntryPoint::DryRun)
    }

    async fn run(&self, args: &EntryArgs) -> EntryResult {
        self.total(args)
    }

    async fn dry_run(&self, args: &EntryArgs) -> EntryResult {
        self.total(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use meguca_runtime::{Configuration, DataBus, ParameterResolver, ServiceRegistry};
    use serde_json::json;

    fn args(bus: &DataBus, plugin: &Sum) -> EntryArgs {
        ParameterResolver::new(
            Arc::new(Configuration::new(json!({}), json!({}))),
            Arc::new(ServiceRegistry::new()),
        )
        .resolve(&plugin.signature(EntryPoint::Run), bus)
    }

    fn sum(inputs: &[&str]) -> Sum {
        Sum::from_config(&json!({"inputs": inputs, "output": "total"})).unwrap()
    }

    #[tokio::test]
    async fn test_integer_and_float_sums() {
        let bus = DataBus::new();
        bus.insert("a", 2);
        bus.insert("b", 3);
        bus.insert("c", 0.5);

        let plugin = sum(&["a", "b"]);
        let output = plugin.run(&args(&bus, &plugin)).await.unwrap().unwrap();
        assert_eq!(output["total"], json!(5));

        let plugin = sum(&["a", "c"]);
        let output = plugin.run(&args(&bus, &plugin)).await.unwrap().unwrap();
        assert_eq!(output["total"], json!(2.5));
    }

    #[tokio::test]
    async fn test_missing_input_is_a_dependency_signal() {
        let mut bus = DataBus::new();
        bus.set_strict_pending(true);

        let plugin = sum(&["later"]);
        let err = plugin.run(&args(&bus, &plugin)).await.unwrap_err();
        assert_eq!(err.pending_key(), Some("later"));
    }

    #[tokio::test]
    async fn test_non_numeric_input() {
        let bus = DataBus::new();
        bus.insert("name", "madoka");

        let plugin = sum(&["name"]);
        let err = plugin.run(&args(&bus, &plugin)).await.unwrap_err();
        assert!(matches!(err, EntryError::Plugin(_)));
    }

    #[test]
    fn test_requires_inputs_and_output() {
        assert!(Sum::from_config(&json!({"inputs": ["a"]})).is_err());
    }
}
