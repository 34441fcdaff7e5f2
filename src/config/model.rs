// src/config/model.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::dag::StepDefinition;
use crate::types::{Role, StorageMode};

/// Pipeline definition as read from a TOML file, before validation.
///
/// ```toml
/// [project]
/// name = "cities"
///
/// [store]
/// mode = "file"
/// path = ".kbflow"
///
/// [execution]
/// upstream_timeout = "30s"
///
/// [step.d1]
/// role = "source"
/// processor = "ntriples-file"
/// dataset = "D1"
/// parameters = { path = "d1.nt" }
///
/// [step.match]
/// role = "mapping"
/// processor = "equivalent-value"
/// inputs = ["d1", "d2"]
/// parameters = { property = "http://www.w3.org/2000/01/rdf-schema#label" }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub project: ProjectSection,

    #[serde(default)]
    pub store: StoreSection,

    #[serde(default)]
    pub execution: ExecutionSection,

    /// All steps from `[step.<id>]`, keyed by step id.
    #[serde(default)]
    pub step: BTreeMap<String, StepConfig>,
}

/// Validated pipeline definition. Build it with `ConfigFile::try_from`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub project: ProjectSection,
    pub store: StoreSection,
    /// Parsed `[execution].upstream_timeout`.
    pub upstream_timeout: Option<Duration>,
    pub step: BTreeMap<String, StepConfig>,
}

/// `[project]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectSection {
    #[serde(default = "default_project_name")]
    pub name: String,
}

fn default_project_name() -> String {
    "default".to_string()
}

impl Default for ProjectSection {
    fn default() -> Self {
        Self {
            name: default_project_name(),
        }
    }
}

/// `[store]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreSection {
    #[serde(default)]
    pub mode: StorageMode,

    /// Root directory for model blobs and the catalog (file mode only).
    /// Relative paths are resolved against the config file's directory.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

fn default_store_path() -> PathBuf {
    PathBuf::from(".kbflow")
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            mode: StorageMode::default(),
            path: default_store_path(),
        }
    }
}

/// `[execution]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExecutionSection {
    /// How long a processor waits for an upstream before failing,
    /// e.g. `"500ms"`, `"30s"`, `"5m"`. Waits forever when unset.
    #[serde(default)]
    pub upstream_timeout: Option<String>,
}

/// `[step.<id>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct StepConfig {
    pub role: Role,

    /// Registered processor name, e.g. `"ntriples-file"`.
    pub processor: String,

    /// Dataset loaded by a source step.
    #[serde(default)]
    pub dataset: Option<String>,

    /// Steps consumed by a non-source step.
    #[serde(default)]
    pub inputs: Vec<String>,

    /// Processor-specific parameters, passed through untouched.
    #[serde(default)]
    pub parameters: serde_json::Value,
}

impl StepConfig {
    pub fn to_definition(&self, id: &str) -> StepDefinition {
        StepDefinition {
            id: id.to_string(),
            role: self.role,
            processor: self.processor.clone(),
            parameters: self.parameters.clone(),
            inputs: self.inputs.clone(),
            dataset: self.dataset.clone(),
        }
    }
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        project: ProjectSection,
        store: StoreSection,
        upstream_timeout: Option<Duration>,
        step: BTreeMap<String, StepConfig>,
    ) -> Self {
        Self {
            project,
            store,
            upstream_timeout,
            step,
        }
    }

    pub fn step_definitions(&self) -> Vec<StepDefinition> {
        self.step
            .iter()
            .map(|(id, cfg)| cfg.to_definition(id))
            .collect()
    }

    /// Resolve relative paths against `base` (normally the config file's
    /// directory): the store path and every source's `path` parameter.
    pub fn rebase(&mut self, base: &Path) {
        if self.store.path.is_relative() {
            self.store.path = base.join(&self.store.path);
        }
        for step in self.step.values_mut() {
            if step.role != Role::Source {
                continue;
            }
            let Some(serde_json::Value::String(path)) = step.parameters.get_mut("path") else {
                continue;
            };
            if Path::new(path.as_str()).is_relative() {
                *path = base.join(path.as_str()).to_string_lossy().into_owned();
            }
        }
    }
}
