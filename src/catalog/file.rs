// src/catalog/file.rs

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::Context;
use tracing::{debug, info};

use crate::catalog::{Catalog, CatalogState};
use crate::dag::Step;
use crate::errors::Result;
use crate::processing::{Processing, ProcessingId};
use crate::types::StepId;

/// Stores the catalog as a JSON document, rewritten after each mutation.
///
/// The document is read once on open; this process is assumed to be its
/// only writer while open.
#[derive(Debug)]
pub struct FileCatalog {
    path: PathBuf,
    state: Mutex<CatalogState>,
}

impl FileCatalog {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = load_state(&path)?;
        info!(path = ?path, "opened catalog");
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn state(&self) -> MutexGuard<'_, CatalogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `f` to a copy of the state and adopt the copy only once it has
    /// been written. The lock is held throughout, so concurrent writers
    /// cannot interleave partial documents.
    fn mutate<T>(&self, f: impl FnOnce(&mut CatalogState) -> Result<T>) -> Result<T> {
        let mut state = self.state();
        let mut next = state.clone();
        let out = f(&mut next)?;
        save_state(&self.path, &next)?;
        *state = next;
        Ok(out)
    }
}

impl Catalog for FileCatalog {
    fn insert_step(&self, step: Step) -> Result<()> {
        self.mutate(|s| s.insert_step(step))
    }

    fn replace_step(&self, step: Step) -> Result<()> {
        self.mutate(|s| s.replace_step(step))
    }

    fn step(&self, id: &str) -> Result<Option<Step>> {
        Ok(self.state().step(id))
    }

    fn steps_of_project(&self, project: &str) -> Result<Vec<Step>> {
        Ok(self.state().steps_of_project(project))
    }

    fn remove_steps(&self, ids: &BTreeSet<StepId>) -> Result<Vec<ProcessingId>> {
        self.mutate(|s| Ok(s.remove_steps(ids)))
    }

    fn save_processing(&self, processing: &Processing) -> Result<()> {
        self.mutate(|s| {
            s.save_processing(processing);
            Ok(())
        })
    }

    fn save_processings(&self, processings: &[Processing]) -> Result<()> {
        self.mutate(|s| {
            for processing in processings {
                s.save_processing(processing);
            }
            Ok(())
        })
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

fn load_state(path: &Path) -> Result<CatalogState> {
    if !path.exists() {
        return Ok(CatalogState::default());
    }
    let file = File::open(path).with_context(|| format!("opening catalog at {:?}", path))?;
    let state = serde_json::from_reader(BufReader::new(file))?;
    Ok(state)
}

fn save_state(path: &Path, state: &CatalogState) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating catalog directory at {:?}", parent))?;
    }

    // Written beside the target, then renamed into place.
    let temp = path.with_extension("json.tmp");
    {
        let file = File::create(&temp)
            .with_context(|| format!("creating catalog file at {:?}", temp))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, state)?;
        writer.flush()?;
    }
    fs::rename(&temp, path).with_context(|| format!("replacing catalog at {:?}", path))?;
    debug!(path = ?path, "persisted catalog");
    Ok(())
}
