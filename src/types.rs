// src/types.rs

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identifier of a pipeline step. Unique across the whole catalog.
pub type StepId = String;

/// Identifier of a project (a named group of steps).
pub type ProjectId = String;

/// Identifier of an originating dataset / knowledge base.
pub type DatasetId = String;

/// What a step does with its inputs.
///
/// `Mapping` and `Meta` are both refinements: they only ever add to the
/// meta-model and never expose data models downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Source,
    Transformation,
    Mapping,
    Meta,
}

impl Role {
    /// Whether this role consumes upstream outputs.
    pub fn is_refinement(self) -> bool {
        !matches!(self, Role::Source)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Source => "source",
            Role::Transformation => "transformation",
            Role::Mapping => "mapping",
            Role::Meta => "meta",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "source" => Ok(Role::Source),
            "transformation" => Ok(Role::Transformation),
            "mapping" => Ok(Role::Mapping),
            "meta" => Ok(Role::Meta),
            other => Err(format!(
                "invalid role: {other} (expected \"source\", \"transformation\", \"mapping\" or \"meta\")"
            )),
        }
    }
}

/// Where models and the step/processing catalog are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    /// Gzipped N-Triples blobs plus `catalog.json` under the store path.
    File,
    /// Everything in memory only (lost on exit).
    Memory,
}

impl Default for StorageMode {
    fn default() -> Self {
        StorageMode::File
    }
}
