// src/processor/builtin/meta.rs

use std::collections::BTreeSet;

use oxrdf::{Literal, SubjectRef, TermRef, Triple};

use crate::model::{Model, vocab};
use crate::processor::{ProcessorBody, ProcessorInput};

/// Counts the distinct corresponding resource pairs in the meta-model.
#[derive(Debug)]
pub struct CorrespondenceCount;

impl CorrespondenceCount {
    pub const NAME: &'static str = "correspondence-count";
}

impl ProcessorBody for CorrespondenceCount {
    fn compute(&self, input: &ProcessorInput) -> anyhow::Result<Model> {
        let pairs: BTreeSet<(&str, &str)> = input
            .meta
            .iter()
            .filter(|t| t.predicate == vocab::CORRESPONDS_TO)
            .filter_map(|t| match (t.subject, t.object) {
                (SubjectRef::NamedNode(s), TermRef::NamedNode(o)) if s != o => {
                    let (s, o) = (s.as_str(), o.as_str());
                    Some(if s < o { (s, o) } else { (o, s) })
                }
                _ => None,
            })
            .collect();

        let count = i64::try_from(pairs.len())?;
        Ok(Model::from_triples([Triple::new(
            vocab::PIPELINE_SUMMARY.into_owned(),
            vocab::CORRESPONDENCE_COUNT.into_owned(),
            Literal::from(count),
        )]))
    }
}
