// src/dag/graph.rs

use std::collections::{BTreeSet, HashMap, VecDeque};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::dag::Step;
use crate::errors::{KbflowError, Result};
use crate::types::{DatasetId, StepId};

/// Internal node structure: stores immediate inputs and dependents.
#[derive(Debug, Clone)]
struct StepNode {
    step: Step,
    /// Steps whose outputs this one consumes.
    inputs: Vec<StepId>,
    /// Steps that consume this one.
    dependents: Vec<StepId>,
}

/// In-memory view of one project's steps and their input edges.
///
/// Inputs that point outside the given step set are ignored, so a graph can
/// be built from any subset of a project.
#[derive(Debug, Clone)]
pub struct StepGraph {
    nodes: HashMap<StepId, StepNode>,
}

impl StepGraph {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        let mut nodes: HashMap<StepId, StepNode> = steps
            .into_iter()
            .map(|step| {
                (
                    step.id.clone(),
                    StepNode {
                        inputs: step.inputs.clone(),
                        dependents: Vec::new(),
                        step,
                    },
                )
            })
            .collect();

        let edges: Vec<(StepId, StepId)> = nodes
            .values()
            .flat_map(|n| n.inputs.iter().map(|i| (i.clone(), n.step.id.clone())))
            .collect();
        for (input, dependent) in edges {
            if let Some(node) = nodes.get_mut(&input) {
                node.dependents.push(dependent);
            }
        }

        Self { nodes }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn step(&self, id: &str) -> Option<&Step> {
        self.nodes.get(id).map(|n| &n.step)
    }

    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.nodes.values().map(|n| &n.step)
    }

    pub fn inputs_of(&self, id: &str) -> &[StepId] {
        self.nodes.get(id).map(|n| n.inputs.as_slice()).unwrap_or(&[])
    }

    pub fn dependents_of(&self, id: &str) -> &[StepId] {
        self.nodes
            .get(id)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }

    /// Steps ordered so that every step comes after all of its inputs.
    ///
    /// Fails with [`KbflowError::DagCycle`] if the input relation has a cycle.
    pub fn topological_order(&self) -> Result<Vec<StepId>> {
        // Edge direction: input -> dependent.
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
        let mut ids: Vec<&str> = self.nodes.keys().map(String::as_str).collect();
        ids.sort_unstable();
        for &id in &ids {
            graph.add_node(id);
        }
        for &id in &ids {
            for input in self.inputs_of(id) {
                if self.contains(input) {
                    graph.add_edge(input.as_str(), id, ());
                }
            }
        }

        match toposort(&graph, None) {
            Ok(order) => Ok(order.into_iter().map(str::to_string).collect()),
            Err(cycle) => Err(KbflowError::DagCycle(format!(
                "step '{}' is part of a cycle",
                cycle.node_id()
            ))),
        }
    }

    /// `id` plus every step that transitively consumes it.
    pub fn with_transitive_dependents(&self, id: &str) -> BTreeSet<StepId> {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([id.to_string()]);
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current.clone()) {
                continue;
            }
            queue.extend(self.dependents_of(&current).iter().cloned());
        }
        seen
    }

    /// Datasets of all sources transitively feeding `id`.
    pub fn dataset_lineage(&self, id: &str) -> BTreeSet<DatasetId> {
        let mut datasets = BTreeSet::new();
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([id.to_string()]);
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(node) = self.nodes.get(&current) {
                if let Some(ref dataset) = node.step.dataset {
                    datasets.insert(dataset.clone());
                }
                queue.extend(node.inputs.iter().cloned());
            }
        }
        datasets
    }
}
