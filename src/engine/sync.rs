// src/engine/sync.rs

//! Bringing the catalog in line with a pipeline file.

use tracing::{info, warn};

use crate::config::ConfigFile;
use crate::dag::StepGraph;
use crate::engine::Engine;
use crate::errors::{KbflowError, Result};
use crate::types::StepId;

/// What [`Engine::sync_steps`] changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub created: Vec<StepId>,
    pub unchanged: Vec<StepId>,
    /// Steps whose definition changed; their old history is gone.
    pub replaced: Vec<StepId>,
    pub removed: Vec<StepId>,
}

impl Engine {
    /// Register the steps of a validated pipeline file in its project.
    ///
    /// Identical steps are kept together with their processings, so earlier
    /// results stay available for resuming. A changed step is deleted (with
    /// its dependents and their history) and created again; steps missing
    /// from the file are deleted.
    pub fn sync_steps(&self, cfg: &ConfigFile) -> Result<SyncReport> {
        let project = cfg.project.name.as_str();
        let mut report = SyncReport::default();

        for step in self.steps_of_project(project)? {
            if cfg.step.contains_key(&step.id) || self.catalog.step(&step.id)?.is_none() {
                continue;
            }
            for id in self.delete_step(&step.id)? {
                warn!(step = %id, "removed step no longer in pipeline file");
                report.removed.push(id);
            }
        }

        let definitions = cfg.step_definitions();
        let order = StepGraph::new(definitions.iter().cloned().map(|d| d.into_step(project)))
            .topological_order()?;

        for id in order {
            let Some(def) = definitions.iter().find(|d| d.id == id).cloned() else {
                continue;
            };
            match self.catalog.step(&id)? {
                Some(existing) if existing.project != project => {
                    return Err(KbflowError::Definition(format!(
                        "step id '{id}' is already used by project '{}'",
                        existing.project
                    )));
                }
                Some(existing) if existing.matches(&def) => report.unchanged.push(id),
                Some(_) => {
                    self.delete_step(&id)?;
                    self.create_step(project, def)?;
                    info!(step = %id, "replaced changed step");
                    report.replaced.push(id);
                }
                None => {
                    self.create_step(project, def)?;
                    report.created.push(id);
                }
            }
        }

        Ok(report)
    }
}
