// src/engine/mod.rs

//! Public face of the pipeline engine.
//!
//! [`Engine`] ties together:
//! - the [`Catalog`] of steps and processings
//! - the content-addressed [`ModelStore`]
//! - the [`ProcessorRegistry`]
//!
//! Step authoring lives here; execution is delegated to a per-invocation
//! [`scheduler::Scheduler`], and at most one invocation per project runs at a
//! time.

pub mod handle;
pub mod scheduler;
pub mod sync;

use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::{info, warn};

use crate::catalog::{self, Catalog, MemoryCatalog};
use crate::dag::{Step, StepDefinition, StepGraph};
use crate::errors::{KbflowError, Result};
use crate::model::Model;
use crate::processing::{Processing, ProcessingId, ProcessingStatus};
use crate::processor::ProcessorRegistry;
use crate::store::ModelStore;
use crate::types::{DatasetId, ProjectId, Role, StepId, StorageMode};

pub use handle::{ExecutionHandle, ExecutionSummary};

/// Per-invocation execution settings.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionOptions {
    /// Return only once every dispatched processor is terminal.
    pub wait: bool,
    /// Fail a processor whose upstream is not terminal within this time.
    pub upstream_timeout: Option<Duration>,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            wait: true,
            upstream_timeout: None,
        }
    }
}

/// Marks a project as executing; released on drop.
#[derive(Debug)]
pub(crate) struct ProjectLease {
    project: ProjectId,
    active: Arc<Mutex<HashSet<ProjectId>>>,
}

impl ProjectLease {
    fn acquire(active: &Arc<Mutex<HashSet<ProjectId>>>, project: &str) -> Result<Self> {
        let mut guard = active.lock().unwrap_or_else(PoisonError::into_inner);
        if !guard.insert(project.to_string()) {
            return Err(KbflowError::ProjectBusy(project.to_string()));
        }
        Ok(Self {
            project: project.to_string(),
            active: Arc::clone(active),
        })
    }
}

impl Drop for ProjectLease {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.project);
    }
}

#[derive(Clone)]
pub struct Engine {
    catalog: Arc<dyn Catalog>,
    store: Arc<ModelStore>,
    registry: Arc<ProcessorRegistry>,
    active: Arc<Mutex<HashSet<ProjectId>>>,
}

impl Engine {
    pub fn new(catalog: Arc<dyn Catalog>, store: Arc<ModelStore>, registry: ProcessorRegistry) -> Self {
        Self {
            catalog,
            store,
            registry: Arc::new(registry),
            active: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Engine with in-memory catalog and store.
    pub fn in_memory(registry: ProcessorRegistry) -> Self {
        Self::new(
            Arc::new(MemoryCatalog::new()),
            Arc::new(ModelStore::in_memory()),
            registry,
        )
    }

    /// Engine over the catalog and store for `mode` rooted at `root`.
    pub fn open(mode: StorageMode, root: &Path, registry: ProcessorRegistry) -> Result<Self> {
        let catalog = catalog::open(mode, root)?;
        let store = Arc::new(ModelStore::open(mode, root));
        info!(mode = ?mode, root = ?root, "opened engine storage");
        Ok(Self::new(catalog, store, registry))
    }

    pub fn catalog(&self) -> &Arc<dyn Catalog> {
        &self.catalog
    }

    pub fn store(&self) -> &Arc<ModelStore> {
        &self.store
    }

    pub fn registry(&self) -> &ProcessorRegistry {
        &self.registry
    }

    /// Register a new step in `project`.
    ///
    /// Rejects role/arity mismatches, duplicate ids, unknown or foreign
    /// inputs, and processors or parameters the registry does not accept.
    /// Inputs must already exist, so steps can only be added in dependency
    /// order and no cycle can be formed.
    pub fn create_step(&self, project: &str, def: StepDefinition) -> Result<StepId> {
        def.check_shape()?;
        if self.catalog.step(&def.id)?.is_some() {
            return Err(KbflowError::Definition(format!("step '{}' already exists", def.id)));
        }
        for input in &def.inputs {
            match self.catalog.step(input)? {
                None => {
                    return Err(KbflowError::Definition(format!(
                        "step '{}' has unknown input '{input}'",
                        def.id
                    )));
                }
                Some(step) if step.project != project => {
                    return Err(KbflowError::Definition(format!(
                        "input '{input}' of step '{}' belongs to project '{}'",
                        def.id, step.project
                    )));
                }
                Some(_) => {}
            }
        }
        self.validate_processor(&def.id, &def.processor, def.role, &def.parameters)?;
        if def.role == Role::Mapping && def.inputs.len() < 2 {
            warn!(step = %def.id, inputs = def.inputs.len(), "mapping step with fewer than two inputs");
        }

        let id = def.id.clone();
        self.catalog.insert_step(def.into_step(project))?;
        info!(project = %project, step = %id, "created step");
        Ok(id)
    }

    /// Replace the parameters of a step no processing refers to yet.
    pub fn update_step_parameters(&self, id: &str, parameters: serde_json::Value) -> Result<()> {
        let mut step = self.step(id)?;
        if !self.catalog.processings_of_step(id)?.is_empty() {
            return Err(KbflowError::IllegalState(format!(
                "step '{id}' is referenced by processings and can no longer change"
            )));
        }
        self.validate_processor(id, &step.processor, step.role, &parameters)?;
        step.parameters = parameters;
        self.catalog.replace_step(step)?;
        info!(step = %id, "updated step parameters");
        Ok(())
    }

    /// Delete a step, every step depending on it, and all their processings.
    ///
    /// Returns the ids of the deleted steps.
    pub fn delete_step(&self, id: &str) -> Result<BTreeSet<StepId>> {
        let step = self.step(id)?;
        let _lease = ProjectLease::acquire(&self.active, &step.project)?;

        let graph = StepGraph::new(self.catalog.steps_of_project(&step.project)?);
        let doomed = graph.with_transitive_dependents(id);
        let removed = self.catalog.remove_steps(&doomed)?;
        info!(
            step = %id,
            steps = doomed.len(),
            processings = removed.len(),
            "deleted step and dependents"
        );
        Ok(doomed)
    }

    pub fn step(&self, id: &str) -> Result<Step> {
        self.catalog
            .step(id)?
            .ok_or_else(|| KbflowError::StepNotFound(id.to_string()))
    }

    pub fn steps_of_project(&self, project: &str) -> Result<Vec<Step>> {
        self.catalog.steps_of_project(project)
    }

    /// Datasets of all sources that transitively feed `id`.
    pub fn dataset_lineage(&self, id: &str) -> Result<BTreeSet<DatasetId>> {
        let step = self.step(id)?;
        let graph = StepGraph::new(self.catalog.steps_of_project(&step.project)?);
        Ok(graph.dataset_lineage(id))
    }

    /// Run the project's pipeline.
    ///
    /// Processings listed in `resume_from`, and transitively the processings
    /// they consumed, are reused as they are; every other step gets a new
    /// processing. Only definition-time problems (unknown resume points, a
    /// busy project) are returned as errors; everything after that is
    /// recorded on the processings.
    pub async fn execute_project(
        &self,
        project: &str,
        resume_from: &[ProcessingId],
        options: ExecutionOptions,
    ) -> Result<ExecutionHandle> {
        let lease = ProjectLease::acquire(&self.active, project)?;
        info!(project = %project, resume_points = resume_from.len(), "executing project");
        scheduler::Scheduler::new(&self.catalog, &self.store, &self.registry, options)
            .execute(project, resume_from, lease)
            .await
    }

    /// Whether an execution of `project` is in progress.
    pub fn is_executing(&self, project: &str) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(project)
    }

    pub fn get_processing(&self, id: ProcessingId) -> Result<Processing> {
        self.catalog
            .processing(id)?
            .ok_or(KbflowError::ProcessingNotFound(id))
    }

    /// The output model of a succeeded processing.
    pub fn get_result_model(&self, id: ProcessingId) -> Result<Model> {
        let processing = self.get_processing(id)?;
        match (processing.status, processing.result_hash) {
            (ProcessingStatus::Succeeded, Some(hash)) => self.store.get(&hash),
            _ => Err(KbflowError::NotSucceeded(id)),
        }
    }

    pub fn processings_of_step(&self, step: &str) -> Result<Vec<Processing>> {
        self.catalog.processings_of_step(step)
    }

    /// Most recent successful processing of a step, if any.
    pub fn latest_succeeded(&self, step: &str) -> Result<Option<Processing>> {
        self.catalog.latest_succeeded_processing(step)
    }

    /// Processings that consumed `id` as an input.
    pub fn consumers_of(&self, id: ProcessingId) -> Result<Vec<Processing>> {
        self.catalog.processings_consuming(id)
    }

    fn validate_processor(
        &self,
        step: &str,
        processor: &str,
        role: Role,
        parameters: &serde_json::Value,
    ) -> Result<()> {
        self.registry
            .instantiate(step, processor, role, parameters)
            .map(|_| ())
            .map_err(|err| KbflowError::Definition(err.to_string()))
    }
}
