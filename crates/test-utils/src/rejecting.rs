use std::collections::BTreeSet;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};

use kbflow::catalog::{Catalog, MemoryCatalog};
use kbflow::dag::Step;
use kbflow::errors::{KbflowError, Result};
use kbflow::processing::{Processing, ProcessingId};

type Rule = Box<dyn Fn(&Processing) -> bool + Send + Sync>;

/// In-memory catalog whose processing writes fail whenever `rule` matches
/// the record being saved. Rejected writes leave the stored copy as it was.
pub struct RejectingCatalog {
    inner: MemoryCatalog,
    rule: Rule,
    rejected: AtomicUsize,
}

impl RejectingCatalog {
    pub fn new(rule: impl Fn(&Processing) -> bool + Send + Sync + 'static) -> Self {
        Self {
            inner: MemoryCatalog::new(),
            rule: Box::new(rule),
            rejected: AtomicUsize::new(0),
        }
    }

    pub fn rejected(&self) -> usize {
        self.rejected.load(Ordering::SeqCst)
    }

    fn check(&self, processing: &Processing) -> Result<()> {
        if (self.rule)(processing) {
            self.rejected.fetch_add(1, Ordering::SeqCst);
            return Err(KbflowError::IoError(io::Error::other("disk full")));
        }
        Ok(())
    }
}

impl Catalog for RejectingCatalog {
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
        self.check(processing)?;
        self.inner.save_processing(processing)
    }

    fn save_processings(&self, processings: &[Processing]) -> Result<()> {
        for processing in processings {
            self.check(processing)?;
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
