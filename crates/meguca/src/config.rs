//! General Configuration
//!
//! Loads the process-wide (`meguca`) half of the configuration from a TOML
//! file, with `MEGUCA_`-prefixed environment variables layered on top.
//! Nested keys are separated by `__`, so `MEGUCA_DRY_RUN__ENABLED=true`
//! sets `dry_run.enabled`.

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Toml};
use serde_json::Value;
use tracing::debug;

/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "MEGUCA_";

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to load configuration: {0}")]
    Figment(Box<figment::Error>),

    #[error("Configuration root must be a table")]
    NotATable,
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::Figment(Box::new(err))
    }
}

/// Load the general configuration from `path` plus the environment
pub fn load_general(path: impl AsRef<Path>) -> Result<Value, ConfigError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    debug!("Loading general configuration from: {}", path.display());
    let value: Value = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()?;

    match value {
        Value::Object(_) => Ok(value),
        _ => Err(ConfigError::NotATable),
    }
}
