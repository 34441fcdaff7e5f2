// src/catalog/mod.rs

//! Persistence of steps and processings.
//!
//! [`Catalog`] is the narrow interface the engine consumes. Two backends are
//! provided: [`MemoryCatalog`] and [`FileCatalog`] (a JSON document rewritten
//! on every mutation). Both share the bookkeeping in [`CatalogState`].

pub mod file;
pub mod memory;

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::dag::Step;
use crate::errors::{KbflowError, Result};
use crate::processing::{Processing, ProcessingId, ProcessingStatus};
use crate::types::{StepId, StorageMode};

pub use file::FileCatalog;
pub use memory::MemoryCatalog;

/// File name of the catalog document below the store path.
pub const CATALOG_FILE: &str = "catalog.json";

pub trait Catalog: Send + Sync {
    /// Insert a new step; fails if the id is taken.
    fn insert_step(&self, step: Step) -> Result<()>;
    /// Overwrite an existing step.
    fn replace_step(&self, step: Step) -> Result<()>;
    fn step(&self, id: &str) -> Result<Option<Step>>;
    fn steps_of_project(&self, project: &str) -> Result<Vec<Step>>;
    /// Remove the given steps together with all their processings.
    /// Returns the ids of the removed processings.
    fn remove_steps(&self, ids: &BTreeSet<StepId>) -> Result<Vec<ProcessingId>>;

    fn save_processing(&self, processing: &Processing) -> Result<()>;
    fn save_processings(&self, processings: &[Processing]) -> Result<()>;
    fn processing(&self, id: ProcessingId) -> Result<Option<Processing>>;
    fn processings_of_step(&self, step: &str) -> Result<Vec<Processing>>;
    /// Most recently finished successful processing of a step.
    fn latest_succeeded_processing(&self, step: &str) -> Result<Option<Processing>>;
    /// Processings that consumed `input`.
    fn processings_consuming(&self, input: ProcessingId) -> Result<Vec<Processing>>;
}

/// Open the catalog for the given storage mode rooted at `root`.
pub fn open(mode: StorageMode, root: &Path) -> Result<Arc<dyn Catalog>> {
    Ok(match mode {
        StorageMode::File => Arc::new(FileCatalog::open(root.join(CATALOG_FILE))?),
        StorageMode::Memory => Arc::new(MemoryCatalog::new()),
    })
}

/// Serializable contents of a catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogState {
    #[serde(default)]
    steps: BTreeMap<StepId, Step>,
    #[serde(default)]
    processings: BTreeMap<ProcessingId, Processing>,
}

impl CatalogState {
    fn insert_step(&mut self, step: Step) -> Result<()> {
        if self.steps.contains_key(&step.id) {
            return Err(KbflowError::Definition(format!(
                "step '{}' already exists",
                step.id
            )));
        }
        self.steps.insert(step.id.clone(), step);
        Ok(())
    }

    fn replace_step(&mut self, step: Step) -> Result<()> {
        match self.steps.get_mut(&step.id) {
            Some(slot) => {
                *slot = step;
                Ok(())
            }
            None => Err(KbflowError::StepNotFound(step.id)),
        }
    }

    fn step(&self, id: &str) -> Option<Step> {
        self.steps.get(id).cloned()
    }

    fn steps_of_project(&self, project: &str) -> Vec<Step> {
        self.steps
            .values()
            .filter(|s| s.project == project)
            .cloned()
            .collect()
    }

    fn remove_steps(&mut self, ids: &BTreeSet<StepId>) -> Vec<ProcessingId> {
        self.steps.retain(|id, _| !ids.contains(id));
        let removed: Vec<ProcessingId> = self
            .processings
            .values()
            .filter(|p| ids.contains(&p.step))
            .map(|p| p.id)
            .collect();
        for id in &removed {
            self.processings.remove(id);
        }
        removed
    }

    fn save_processing(&mut self, processing: &Processing) {
        self.processings.insert(processing.id, processing.clone());
    }

    fn processing(&self, id: ProcessingId) -> Option<Processing> {
        self.processings.get(&id).cloned()
    }

    fn processings_of_step(&self, step: &str) -> Vec<Processing> {
        self.processings
            .values()
            .filter(|p| p.step == step)
            .cloned()
            .collect()
    }

    fn latest_succeeded_processing(&self, step: &str) -> Option<Processing> {
        self.processings
            .values()
            .filter(|p| p.step == step && p.status == ProcessingStatus::Succeeded)
            .max_by_key(|p| p.end_time)
            .cloned()
    }

    fn processings_consuming(&self, input: ProcessingId) -> Vec<Processing> {
        self.processings
            .values()
            .filter(|p| p.input_processings.contains(&input))
            .cloned()
            .collect()
    }
}
