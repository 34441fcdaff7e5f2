// src/processing/mod.rs

//! Execution records of steps.
//!
//! A [`Processing`] is created by the scheduler for every step that has no
//! reusable record in an invocation, and afterwards only moves forward:
//! `NotStarted -> Running -> {Succeeded | Failed}` or directly
//! `NotStarted -> Failed`.

pub mod error_record;

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dag::Step;
use crate::errors::{KbflowError, Result};
use crate::store::ModelHash;
use crate::types::{DatasetId, ProjectId, Role, StepId};

pub use error_record::ErrorRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessingId(Uuid);

impl ProcessingId {
    pub fn new() -> Self {
        ProcessingId(Uuid::new_v4())
    }
}

impl Default for ProcessingId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProcessingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ProcessingId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(ProcessingId(Uuid::parse_str(s.trim())?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    NotStarted,
    Running,
    Succeeded,
    Failed,
}

impl ProcessingStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ProcessingStatus::Succeeded | ProcessingStatus::Failed)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_become(self, next: ProcessingStatus) -> bool {
        use ProcessingStatus::*;
        matches!(
            (self, next),
            (NotStarted, Running) | (NotStarted, Failed) | (Running, Succeeded) | (Running, Failed)
        )
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProcessingStatus::NotStarted => "not-started",
            ProcessingStatus::Running => "running",
            ProcessingStatus::Succeeded => "succeeded",
            ProcessingStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One execution record of a step.
///
/// Role, processor, parameters and dataset are snapshots taken at creation,
/// so later edits of the step never rewrite history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Processing {
    pub id: ProcessingId,
    pub step: StepId,
    pub project: ProjectId,
    pub role: Role,
    pub processor: String,
    #[serde(default)]
    pub parameters: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset: Option<DatasetId>,
    /// The exact upstream processings consumed by this run.
    #[serde(default)]
    pub input_processings: BTreeSet<ProcessingId>,
    pub status: ProcessingStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_hash: Option<ModelHash>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorRecord>,
}

impl Processing {
    /// A fresh `NotStarted` record for `step`.
    pub fn new(step: &Step, input_processings: BTreeSet<ProcessingId>) -> Self {
        Self {
            id: ProcessingId::new(),
            step: step.id.clone(),
            project: step.project.clone(),
            role: step.role,
            processor: step.processor.clone(),
            parameters: step.parameters.clone(),
            dataset: step.dataset.clone(),
            input_processings,
            status: ProcessingStatus::NotStarted,
            start_time: None,
            end_time: None,
            result_hash: None,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn start(&mut self) -> Result<()> {
        self.advance(ProcessingStatus::Running)?;
        self.start_time = Some(Utc::now());
        Ok(())
    }

    pub fn succeed(&mut self, hash: ModelHash) -> Result<()> {
        self.advance(ProcessingStatus::Succeeded)?;
        self.end_time = Some(Utc::now());
        self.result_hash = Some(hash);
        Ok(())
    }

    pub fn fail(&mut self, error: ErrorRecord) -> Result<()> {
        self.advance(ProcessingStatus::Failed)?;
        self.end_time = Some(Utc::now());
        self.error = Some(error);
        Ok(())
    }

    fn advance(&mut self, next: ProcessingStatus) -> Result<()> {
        if !self.status.can_become(next) {
            return Err(KbflowError::IllegalState(format!(
                "processing {} of step '{}' cannot move from {} to {}",
                self.id, self.step, self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }
}
