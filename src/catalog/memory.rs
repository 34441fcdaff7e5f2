// src/catalog/memory.rs

use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::catalog::{Catalog, CatalogState};
use crate::dag::Step;
use crate::errors::Result;
use crate::processing::{Processing, ProcessingId};
use crate::types::StepId;

/// Keeps steps and processings in memory only (lost on restart).
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    state: Mutex<CatalogState>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, CatalogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Catalog for MemoryCatalog {
    fn insert_step(&self, step: Step) -> Result<()> {
        self.state().insert_step(step)
    }

    fn replace_step(&self, step: Step) -> Result<()> {
        self.state().replace_step(step)
    }

    fn step(&self, id: &str) -> Result<Option<Step>> {
        Ok(self.state().step(id))
    }

    fn steps_of_project(&self, project: &str) -> Result<Vec<Step>> {
        Ok(self.state().steps_of_project(project))
    }

    fn remove_steps(&self, ids: &BTreeSet<StepId>) -> Result<Vec<ProcessingId>> {
        Ok(self.state().remove_steps(ids))
    }

    fn save_processing(&self, processing: &Processing) -> Result<()> {
        self.state().save_processing(processing);
        Ok(())
    }

    fn save_processings(&self, processings: &[Processing]) -> Result<()> {
        let mut state = self.state();
        for processing in processings {
            state.save_processing(processing);
        }
        Ok(())
    }

    fn processing(&self, id: ProcessingId) -> Result<Option<Processing>> {
        Ok(self.state().processing(id))
    }

    fn processings_of_step(&self, step: &str) -> Result<Vec<Processing>> {
        Ok(self.state().processings_of_step(step))
    }

    fn latest_succeeded_processing(&self, step: &str) -> Result<Option<Processing>> {
        Ok(self.state().latest_succeeded_processing(step))
    }

    fn processings_consuming(&self, input: ProcessingId) -> Result<Vec<Processing>> {
        Ok(self.state().processings_consuming(input))
    }
}
