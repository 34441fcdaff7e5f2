// src/dag/step.rs

use serde::{Deserialize, Serialize};

use crate::errors::{KbflowError, Result};
use crate::types::{DatasetId, ProjectId, Role, StepId};

/// A registered pipeline node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    pub project: ProjectId,
    pub role: Role,
    /// Name of the processor body in the registry.
    pub processor: String,
    /// Opaque, processor-specific configuration.
    #[serde(default)]
    pub parameters: serde_json::Value,
    /// Steps this one consumes. Empty iff `role` is `Source`.
    #[serde(default)]
    pub inputs: Vec<StepId>,
    /// Set iff `role` is `Source`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset: Option<DatasetId>,
}

/// Authoring input for a new step; the project is supplied separately.
#[derive(Debug, Clone, PartialEq)]
pub struct StepDefinition {
    pub id: StepId,
    pub role: Role,
    pub processor: String,
    pub parameters: serde_json::Value,
    pub inputs: Vec<StepId>,
    pub dataset: Option<DatasetId>,
}

impl StepDefinition {
    /// A source step loading `dataset`.
    pub fn source(id: impl Into<StepId>, dataset: impl Into<DatasetId>, processor: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::Source,
            processor: processor.into(),
            parameters: serde_json::Value::Null,
            inputs: Vec::new(),
            dataset: Some(dataset.into()),
        }
    }

    /// A refinement step (transformation, mapping or meta) over `inputs`.
    pub fn refinement<I, S>(id: impl Into<StepId>, role: Role, processor: impl Into<String>, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<StepId>,
    {
        Self {
            id: id.into(),
            role,
            processor: processor.into(),
            parameters: serde_json::Value::Null,
            inputs: inputs.into_iter().map(Into::into).collect(),
            dataset: None,
        }
    }

    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = parameters;
        self
    }

    /// Role/arity checks that need no knowledge of other steps.
    pub fn check_shape(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(KbflowError::Definition("step id must not be empty".to_string()));
        }
        match self.role {
            Role::Source => {
                if self.dataset.is_none() {
                    return Err(KbflowError::Definition(format!(
                        "source step '{}' must name a dataset",
                        self.id
                    )));
                }
                if !self.inputs.is_empty() {
                    return Err(KbflowError::Definition(format!(
                        "source step '{}' cannot have inputs",
                        self.id
                    )));
                }
            }
            role => {
                if self.inputs.is_empty() {
                    return Err(KbflowError::Definition(format!(
                        "{role} step '{}' needs at least one input",
                        self.id
                    )));
                }
                if self.dataset.is_some() {
                    return Err(KbflowError::Definition(format!(
                        "{role} step '{}' cannot name a dataset",
                        self.id
                    )));
                }
            }
        }
        if self.inputs.iter().any(|input| input == &self.id) {
            return Err(KbflowError::Definition(format!(
                "step '{}' cannot depend on itself",
                self.id
            )));
        }
        Ok(())
    }

    pub fn into_step(self, project: impl Into<ProjectId>) -> Step {
        Step {
            id: self.id,
            project: project.into(),
            role: self.role,
            processor: self.processor,
            parameters: self.parameters,
            inputs: self.inputs,
            dataset: self.dataset,
        }
    }
}

impl Step {
    /// Whether `def` describes exactly this step.
    pub fn matches(&self, def: &StepDefinition) -> bool {
        self.id == def.id
            && self.role == def.role
            && self.processor == def.processor
            && self.parameters == def.parameters
            && self.inputs == def.inputs
            && self.dataset == def.dataset
    }
}
