// src/processor/body.rs

use std::collections::BTreeMap;
use std::fmt;

use crate::model::Model;
use crate::types::{DatasetId, Role};

/// The work a step actually performs.
///
/// `compute` runs on a blocking thread and may do CPU- or I/O-bound work.
/// Any error it returns is recorded on the processing; it is never retried.
pub trait ProcessorBody: Send + Sync + fmt::Debug {
    fn compute(&self, input: &ProcessorInput) -> anyhow::Result<Model>;
}

/// What one upstream makes visible to its dependents once it has succeeded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Exposure {
    pub data: BTreeMap<DatasetId, Model>,
    pub meta: Model,
}

impl Exposure {
    /// Apply the role-specific propagation rule to a finished processor.
    ///
    /// - Source exposes `{dataset: own}` and an empty meta-model.
    /// - Transformation adds `own` to every dataset group it received and
    ///   passes the meta-model through unchanged.
    /// - Mapping and Meta expose no data and add `own` to the meta-model.
    pub fn of(role: Role, input: &ProcessorInput, own: &Model) -> Exposure {
        match role {
            Role::Source => {
                let mut data = BTreeMap::new();
                if let Some(ref dataset) = input.dataset {
                    data.insert(dataset.clone(), own.clone());
                }
                Exposure {
                    data,
                    meta: Model::empty(),
                }
            }
            Role::Transformation => Exposure {
                data: input
                    .data
                    .iter()
                    .map(|(dataset, model)| (dataset.clone(), Model::union([model, own])))
                    .collect(),
                meta: input.meta.clone(),
            },
            Role::Mapping | Role::Meta => Exposure {
                data: BTreeMap::new(),
                meta: Model::union([&input.meta, own]),
            },
        }
    }
}

/// Frozen view of everything a processor receives from its upstreams.
#[derive(Debug, Clone, Default)]
pub struct ProcessorInput {
    /// The step's own dataset (sources only).
    pub dataset: Option<DatasetId>,
    /// Per-dataset union of all upstream data models.
    pub data: BTreeMap<DatasetId, Model>,
    /// Union of all upstream meta-models.
    pub meta: Model,
}

impl ProcessorInput {
    pub fn for_source(dataset: Option<DatasetId>) -> Self {
        Self {
            dataset,
            ..Self::default()
        }
    }

    /// Merge upstream exposures once all of them are final.
    ///
    /// Data groups are unioned per dataset key; meta-models are unioned flat.
    pub fn freeze<'a, I>(dataset: Option<DatasetId>, exposures: I) -> Self
    where
        I: IntoIterator<Item = &'a Exposure>,
    {
        let mut groups: BTreeMap<DatasetId, Vec<&Model>> = BTreeMap::new();
        let mut metas: Vec<&Model> = Vec::new();
        for exposure in exposures {
            for (ds, model) in &exposure.data {
                groups.entry(ds.clone()).or_default().push(model);
            }
            metas.push(&exposure.meta);
        }

        Self {
            dataset,
            data: groups
                .into_iter()
                .map(|(ds, models)| (ds, Model::union(models)))
                .collect(),
            meta: Model::union(metas),
        }
    }

    /// Union of all data groups regardless of dataset.
    pub fn all_data(&self) -> Model {
        Model::union(self.data.values())
    }
}
