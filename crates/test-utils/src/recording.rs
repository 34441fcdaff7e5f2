use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use kbflow::catalog::{Catalog, MemoryCatalog};
use kbflow::dag::Step;
use kbflow::errors::Result;
use kbflow::processing::{Processing, ProcessingId, ProcessingStatus};

/// In-memory catalog that remembers every status each processing was
/// saved with, in order.
#[derive(Debug, Default)]
pub struct RecordingCatalog {
    inner: MemoryCatalog,
    history: Mutex<HashMap<ProcessingId, Vec<ProcessingStatus>>>,
}

impl RecordingCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self, id: ProcessingId) -> Vec<ProcessingStatus> {
        self.history.lock().unwrap().get(&id).cloned().unwrap_or_default()
    }

    pub fn all_histories(&self) -> HashMap<ProcessingId, Vec<ProcessingStatus>> {
        self.history.lock().unwrap().clone()
    }

    fn record(&self, processing: &Processing) {
        let mut history = self.history.lock().unwrap();
        let seen = history.entry(processing.id).or_default();
        if seen.last() != Some(&processing.status) {
            seen.push(processing.status);
        }
    }
}

impl Catalog for RecordingCatalog {
    fn insert_step(&self, step: Step) -> Result<()> {
        self.inner.insert_step(step)
    }

    fn replace_step(&self, step: Step) -> Result<()> {
        self.inner.replace_step(step)
    }

    fn step(&self, id: &str) -> Result<Option<Step>> {
        self.inner.step(id)
    }

    fn steps_of_project(&self, project: &str) -> Result<Vec<Step>> {
        self.inner.steps_of_project(project)
    }

    fn remove_steps(&self, ids: &BTreeSet<String>) -> Result<Vec<ProcessingId>> {
        self.inner.remove_steps(ids)
    }

    fn save_processing(&self, processing: &Processing) -> Result<()> {
        self.record(processing);
        self.inner.save_processing(processing)
    }

    fn save_processings(&self, processings: &[Processing]) -> Result<()> {
        for processing in processings {
            self.record(processing);
        }
        self.inner.save_processings(processings)
    }

    fn processing(&self, id: ProcessingId) -> Result<Option<Processing>> {
        self.inner.processing(id)
    }

    fn processings_of_step(&self, step: &str) -> Result<Vec<Processing>> {
        self.inner.processings_of_step(step)
    }

    fn latest_succeeded_processing(&self, step: &str) -> Result<Option<Processing>> {
        self.inner.latest_succeeded_processing(step)
    }

    fn processings_consuming(&self, input: ProcessingId) -> Result<Vec<Processing>> {
        self.inner.processings_consuming(input)
    }
}
