// src/processor/builtin/transformation.rs

use oxrdf::{NamedNode, Triple};
use serde::Deserialize;

use crate::model::Model;
use crate::processor::{ProcessorBody, ProcessorInput};

#[derive(Debug, Clone, Deserialize)]
pub struct PropertyAliasParams {
    /// Predicate IRI to copy from.
    pub from: String,
    /// Predicate IRI to copy to.
    pub to: String,
}

/// For every statement using `from`, adds the same statement using `to`.
#[derive(Debug)]
pub struct PropertyAlias {
    from: NamedNode,
    to: NamedNode,
}

impl PropertyAlias {
    pub const NAME: &'static str = "property-alias";

    pub fn new(params: PropertyAliasParams) -> anyhow::Result<Self> {
        Ok(Self {
            from: NamedNode::new(params.from)?,
            to: NamedNode::new(params.to)?,
        })
    }
}

impl ProcessorBody for PropertyAlias {
    fn compute(&self, input: &ProcessorInput) -> anyhow::Result<Model> {
        let aliased = input
            .data
            .values()
            .flat_map(|model| model.iter())
            .filter(|t| t.predicate == self.from.as_ref())
            .map(|t| Triple::new(t.subject.into_owned(), self.to.clone(), t.object.into_owned()));
        Ok(Model::from_triples(aliased))
    }
}
