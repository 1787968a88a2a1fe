//! Entry point signatures
//!
//! An entry point declares the parameters it wants by name. The runtime only
//! hands an entry point what it declared, so a plugin is coupled to exactly
//! the dependencies listed in its signature.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A single declared parameter
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum Param {
    /// The shared data bus
    Data,
    /// The merged process-wide and per-plugin configuration
    Config,
    /// A service object, looked up by service identifier
    Named(String),
}

impl Param {
    /// Name the parameter is declared under
    pub fn name(&self) -> &str {
        match self {
            Param::Data => "data",
            Param::Config => "config",
            Param::Named(name) => name,
        }
    }
}

impl From<&str> for Param {
    fn from(name: &str) -> Self {
        match name {
            "data" => Param::Data,
            "config" => Param::Config,
            other => Param::Named(other.to_string()),
        }
    }
}

impl From<String> for Param {
    fn from(name: String) -> Self {
        Param::from(name.as_str())
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The ordered list of parameters an entry point declares
///
/// # Example
///
/// ```rust,ignore
/// let sig = Signature::new(["data", "ns_api"]);
/// assert!(sig.declares(&Param::Data));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature {
    params: Vec<Param>,
}

impl Signature {
    /// Build a signature from parameter names; duplicates are dropped
    pub fn new<I, P>(params: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Param>,
    {
        let mut sig = Self::default();
        for param in params {
            sig = sig.with(param);
        }
        sig
    }

    /// Signature declaring nothing
    pub fn empty() -> Self {
        Self::default()
    }

    /// Add a parameter
    pub fn with(mut self, param: impl Into<Param>) -> Self {
        let param = param.into();
        if !self.params.contains(&param) {
            self.params.push(param);
        }
        self
    }

    /// Whether the signature declares this parameter
    pub fn declares(&self, param: &Param) -> bool {
        self.params.contains(param)
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_names_map_to_kinds() {
        assert_eq!(Param::from("data"), Param::Data);
        assert_eq!(Param::from("config"), Param::Config);
        assert_eq!(Param::from("ns_api"), Param::Named("ns_api".to_string()));
    }

    #[test]
    fn test_signature_dedups_and_keeps_order() {
        let sig = Signature::new(["ns_site", "data", "ns_site", "config"]);
        let names: Vec<_> = sig.params().iter().map(Param::name).collect();
        assert_eq!(names, vec!["ns_site", "data", "config"]);
        assert!(sig.declares(&Param::Data));
        assert!(!Signature::empty().declares(&Param::Data));
    }
}
