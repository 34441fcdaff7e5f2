// src/processor/builtin/mapping.rs

use std::collections::{BTreeMap, BTreeSet, HashMap};

use oxrdf::{NamedNode, NamedNodeRef, SubjectRef, Term, TermRef, Triple};
use petgraph::unionfind::UnionFind;
use serde::Deserialize;
use tracing::debug;

use crate::model::{Model, vocab};
use crate::processor::{ProcessorBody, ProcessorInput};

#[derive(Debug, Clone, Deserialize)]
pub struct EquivalentValueParams {
    /// Predicate whose values identify an entity (e.g. a label or an id).
    pub property: String,
}

/// Declares resources from different datasets as corresponding when they
/// share a value of the configured property.
///
/// Pairs that the accumulated meta-model already implies (directly,
/// inversely or transitively) or explicitly contradicts are not emitted
/// again. Every new correspondence is emitted in both directions.
#[derive(Debug)]
pub struct EquivalentValue {
    property: NamedNode,
}

impl EquivalentValue {
    pub const NAME: &'static str = "equivalent-value";

    pub fn new(params: EquivalentValueParams) -> anyhow::Result<Self> {
        Ok(Self {
            property: NamedNode::new(params.property)?,
        })
    }

    /// value -> resources carrying it, for one dataset.
    fn index(&self, model: &Model) -> HashMap<Term, BTreeSet<NamedNode>> {
        let mut by_value: HashMap<Term, BTreeSet<NamedNode>> = HashMap::new();
        for triple in model.iter() {
            if triple.predicate != self.property.as_ref() {
                continue;
            }
            if let SubjectRef::NamedNode(resource) = triple.subject {
                by_value
                    .entry(triple.object.into_owned())
                    .or_default()
                    .insert(resource.into_owned());
            }
        }
        by_value
    }
}

impl ProcessorBody for EquivalentValue {
    fn compute(&self, input: &ProcessorInput) -> anyhow::Result<Model> {
        let groups: BTreeMap<&str, HashMap<Term, BTreeSet<NamedNode>>> = input
            .data
            .iter()
            .map(|(dataset, model)| (dataset.as_str(), self.index(model)))
            .collect();

        let mut known = Correspondences::from_meta(&input.meta, groups.values().flat_map(|g| g.values().flatten()));
        let mut out = Vec::new();

        let datasets: Vec<&str> = groups.keys().copied().collect();
        for (i, left) in datasets.iter().enumerate() {
            for right in &datasets[i + 1..] {
                for (value, left_resources) in &groups[left] {
                    let Some(right_resources) = groups[right].get(value) else {
                        continue;
                    };
                    for a in left_resources {
                        for b in right_resources {
                            if a != b && known.is_new(a, b) {
                                known.add(a, b);
                                out.push(Triple::new(a.clone(), vocab::CORRESPONDS_TO.into_owned(), b.clone()));
                                out.push(Triple::new(b.clone(), vocab::CORRESPONDS_TO.into_owned(), a.clone()));
                            }
                        }
                    }
                }
            }
        }

        debug!(new = out.len() / 2, "equivalent-value mapping finished");
        Ok(Model::from_triples(out))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManualMappingParams {
    /// Groups of IRIs that all describe the same entity.
    #[serde(default)]
    pub corresponding: Vec<Vec<String>>,
    /// Groups of IRIs that are pairwise different entities.
    #[serde(default)]
    pub not_corresponding: Vec<Vec<String>>,
}

/// Emits user-asserted correspondences and incorrespondences, so later
/// mappings neither repeat nor contradict them.
#[derive(Debug)]
pub struct ManualMapping {
    corresponding: Vec<Vec<NamedNode>>,
    not_corresponding: Vec<Vec<NamedNode>>,
}

impl ManualMapping {
    pub const NAME: &'static str = "manual-mapping";

    pub fn new(params: ManualMappingParams) -> anyhow::Result<Self> {
        let parse = |groups: Vec<Vec<String>>| -> anyhow::Result<Vec<Vec<NamedNode>>> {
            groups
                .into_iter()
                .map(|group| group.into_iter().map(NamedNode::new).collect::<Result<Vec<_>, _>>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(anyhow::Error::from)
        };
        Ok(Self {
            corresponding: parse(params.corresponding)?,
            not_corresponding: parse(params.not_corresponding)?,
        })
    }
}

/// Every ordered pair of distinct members of each group.
fn pairwise(groups: &[Vec<NamedNode>], predicate: NamedNodeRef<'_>) -> impl Iterator<Item = Triple> {
    groups.iter().flat_map(move |group| {
        group.iter().flat_map(move |a| {
            group
                .iter()
                .filter(move |b| *b != a)
                .map(move |b| Triple::new(a.clone(), predicate.into_owned(), b.clone()))
        })
    })
}

impl ProcessorBody for ManualMapping {
    fn compute(&self, _input: &ProcessorInput) -> anyhow::Result<Model> {
        let asserted = pairwise(&self.corresponding, vocab::CORRESPONDS_TO)
            .chain(pairwise(&self.not_corresponding, vocab::CORRESPONDS_NOT_TO));
        Ok(Model::from_triples(asserted))
    }
}

/// Correspondence knowledge taken from a meta-model, as equivalence classes
/// plus a list of explicit incorrespondences.
struct Correspondences {
    index: HashMap<NamedNode, usize>,
    classes: UnionFind<usize>,
    different: Vec<(usize, usize)>,
}

impl Correspondences {
    fn from_meta<'a>(meta: &Model, candidates: impl Iterator<Item = &'a NamedNode>) -> Self {
        let same = resource_pairs(meta, vocab::CORRESPONDS_TO);
        let not_same = resource_pairs(meta, vocab::CORRESPONDS_NOT_TO);

        let mut index: HashMap<NamedNode, usize> = HashMap::new();
        let mut intern = |node: &NamedNode| {
            let next = index.len();
            index.entry(node.clone()).or_insert(next);
        };
        for (a, b) in same.iter().chain(&not_same) {
            intern(a);
            intern(b);
        }
        candidates.for_each(&mut intern);

        let mut classes = UnionFind::new(index.len());
        for (a, b) in &same {
            classes.union(index[a], index[b]);
        }
        let different = not_same.iter().map(|(a, b)| (index[a], index[b])).collect();

        Self {
            index,
            classes,
            different,
        }
    }

    /// Neither implied nor contradicted by what is known so far.
    fn is_new(&self, a: &NamedNode, b: &NamedNode) -> bool {
        let (Some(&a), Some(&b)) = (self.index.get(a), self.index.get(b)) else {
            return true;
        };
        if self.classes.equiv(a, b) {
            return false;
        }
        let (ra, rb) = (self.classes.find(a), self.classes.find(b));
        !self.different.iter().any(|&(x, y)| {
            let (rx, ry) = (self.classes.find(x), self.classes.find(y));
            (rx == ra && ry == rb) || (rx == rb && ry == ra)
        })
    }

    fn add(&mut self, a: &NamedNode, b: &NamedNode) {
        if let (Some(&a), Some(&b)) = (self.index.get(a), self.index.get(b)) {
            self.classes.union(a, b);
        }
    }
}

/// `(s, o)` for every statement `s <predicate> o` between two IRIs.
fn resource_pairs(meta: &Model, predicate: NamedNodeRef<'_>) -> Vec<(NamedNode, NamedNode)> {
    meta.iter()
        .filter(|t| t.predicate == predicate)
        .filter_map(|t| match (t.subject, t.object) {
            (SubjectRef::NamedNode(s), TermRef::NamedNode(o)) => Some((s.into_owned(), o.into_owned())),
            _ => None,
        })
        .collect()
}
