#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use kbflow::catalog::Catalog;
use kbflow::config::{ConfigFile, ExecutionSection, ProjectSection, RawConfigFile, StepConfig, StoreSection};
use kbflow::engine::Engine;
use kbflow::processor::{ProcessorBody, ProcessorRegistry};
use kbflow::store::ModelStore;
use kbflow::types::{Role, StorageMode};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new(project: &str) -> Self {
        Self {
            config: RawConfigFile {
                project: ProjectSection {
                    name: project.to_string(),
                },
                store: StoreSection {
                    mode: StorageMode::Memory,
                    ..StoreSection::default()
                },
                execution: ExecutionSection::default(),
                step: BTreeMap::new(),
            },
        }
    }

    pub fn with_step(mut self, id: &str, step: StepConfig) -> Self {
        self.config.step.insert(id.to_string(), step);
        self
    }

    pub fn upstream_timeout(mut self, value: &str) -> Self {
        self.config.execution.upstream_timeout = Some(value.to_string());
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

/// Builder for `StepConfig`.
pub struct StepConfigBuilder {
    step: StepConfig,
}

impl StepConfigBuilder {
    pub fn source(dataset: &str, processor: &str) -> Self {
        Self {
            step: StepConfig {
                role: Role::Source,
                processor: processor.to_string(),
                dataset: Some(dataset.to_string()),
                inputs: vec![],
                parameters: serde_json::Value::Null,
            },
        }
    }

    pub fn refinement(role: Role, processor: &str) -> Self {
        Self {
            step: StepConfig {
                role,
                processor: processor.to_string(),
                dataset: None,
                inputs: vec![],
                parameters: serde_json::Value::Null,
            },
        }
    }

    pub fn input(mut self, step: &str) -> Self {
        self.step.inputs.push(step.to_string());
        self
    }

    pub fn param(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        if !self.step.parameters.is_object() {
            self.step.parameters = serde_json::Value::Object(serde_json::Map::new());
        }
        if let Some(map) = self.step.parameters.as_object_mut() {
            map.insert(key.to_string(), value.into());
        }
        self
    }

    pub fn build(self) -> StepConfig {
        self.step
    }
}

/// Builder for an `Engine` with test processor bodies registered.
pub struct EngineBuilder {
    registry: ProcessorRegistry,
    catalog: Option<Arc<dyn Catalog>>,
    store: Option<Arc<ModelStore>>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            registry: ProcessorRegistry::with_builtins(),
            catalog: None,
            store: None,
        }
    }

    pub fn with_body(mut self, name: &str, role: Role, body: Arc<dyn ProcessorBody>) -> Self {
        self.registry.register_body(name, role, body);
        self
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn Catalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn with_store(mut self, store: Arc<ModelStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> Engine {
        let catalog = self
            .catalog
            .unwrap_or_else(|| Arc::new(kbflow::catalog::MemoryCatalog::new()));
        let store = self.store.unwrap_or_else(|| Arc::new(ModelStore::in_memory()));
        Engine::new(catalog, store, self.registry)
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
