//! The reasoner boundary and a structural EL reasoner.
//!
//! Reasoners see concepts only as opaque strings. [reasoner_id] and [nid_from_reasoner_id]
//! translate at the boundary.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::{error::KometError, identifier::Nid, logic::LogicalExpression};

pub fn reasoner_id(nid: Nid) -> String {
    format!("nid:{}", nid.value())
}

pub fn nid_from_reasoner_id(id: &str) -> Result<Nid, KometError> {
    id.strip_prefix("nid:")
        .and_then(|value| value.parse::<i32>().ok())
        .map(Nid::new)
        .ok_or_else(|| KometError::Reasoner(format!("Unrecognised concept id '{id}'")))
}

/// An existential restriction `role some filler`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RoleAxiom {
    pub role: String,
    pub filler: String,
}

/// A conjunction of named concepts and existential restrictions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conjunction {
    pub parents: BTreeSet<String>,
    pub roles: BTreeSet<RoleAxiom>,
}

impl Conjunction {
    pub fn is_empty(&self) -> bool {
        self.parents.is_empty() && self.roles.is_empty()
    }
}

/// Stated axioms of one concept: `concept ⊑ necessary` and `concept ≡ d` for each sufficient
/// definition `d`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptAxioms {
    pub necessary: Conjunction,
    pub sufficient: Vec<Conjunction>,
}

impl ConceptAxioms {
    /// Existential restrictions with a concept filler only. Universal restrictions, features
    /// and nested fillers are outside what the structural reasoner decides.
    pub fn from_expression(expression: &LogicalExpression) -> ConceptAxioms {
        let conjunction = |set: usize| Conjunction {
            parents: expression.set_parents(set).into_iter().map(reasoner_id).collect(),
            roles: expression
                .set_role_restrictions(set)
                .into_iter()
                .filter(|r| !r.universal)
                .filter_map(|r| {
                    r.filler.map(|filler| RoleAxiom {
                        role: reasoner_id(r.role_type),
                        filler: reasoner_id(filler),
                    })
                })
                .collect(),
        };
        let mut necessary = Conjunction::default();
        for set in expression.necessary_sets() {
            let part = conjunction(set);
            necessary.parents.extend(part.parents);
            necessary.roles.extend(part.roles);
        }
        ConceptAxioms {
            necessary,
            sufficient: expression
                .sufficient_sets()
                .into_iter()
                .map(conjunction)
                .filter(|c| !c.is_empty())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxiomSet {
    pub concepts: BTreeMap<String, ConceptAxioms>,
}

impl AxiomSet {
    pub fn insert(&mut self, concept: String, axioms: ConceptAxioms) {
        self.concepts.insert(concept, axioms);
    }

    pub fn len(&self) -> usize {
        self.concepts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty()
    }

    /// Every concept id mentioned anywhere, defined or not.
    pub fn signature(&self) -> BTreeSet<String> {
        let mut ids = BTreeSet::new();
        for (concept, axioms) in &self.concepts {
            ids.insert(concept.clone());
            for conjunction in std::iter::once(&axioms.necessary).chain(&axioms.sufficient) {
                ids.extend(conjunction.parents.iter().cloned());
                ids.extend(conjunction.roles.iter().map(|r| r.filler.clone()));
            }
        }
        ids
    }
}

/// The classified node of one concept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasonerNode {
    /// Includes the concept itself.
    pub equivalents: BTreeSet<String>,
    pub direct_parents: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasonerTaxonomy {
    pub nodes: BTreeMap<String, ReasonerNode>,
}

impl ReasonerTaxonomy {
    pub fn node(&self, id: &str) -> Option<&ReasonerNode> {
        self.nodes.get(id)
    }
}

/// An opaque, pure transformation from stated axioms to a classified taxonomy.
pub trait Reasoner: Send + Sync {
    fn name(&self) -> &str;

    fn classify(&self, axioms: &AxiomSet) -> Result<ReasonerTaxonomy, KometError>;
}

/// Told subsumption plus structural subsumption against sufficient definitions.
///
/// `x ⊑ d` is inferred when some definition of `d` has every named conjunct among the
/// subsumers of `x` and every restriction `r some f` matched by a restriction `r some g` of `x`
/// or one of its subsumers, with `g ⊑ f`. Inference runs to a fixpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralReasoner;

type Subsumers = BTreeMap<String, BTreeSet<String>>;

fn closure(told: &Subsumers) -> Subsumers {
    told.keys()
        .map(|concept| {
            let mut seen = BTreeSet::new();
            let mut queue: VecDeque<&String> = told[concept].iter().collect();
            while let Some(next) = queue.pop_front() {
                if seen.insert(next.clone()) {
                    if let Some(parents) = told.get(next) {
                        queue.extend(parents.iter());
                    }
                }
            }
            (concept.clone(), seen)
        })
        .collect()
}

fn subsumed_by(subsumers: &Subsumers, x: &str, y: &str) -> bool {
    x == y || subsumers.get(x).is_some_and(|s| s.contains(y))
}

impl StructuralReasoner {
    fn matches(
        definition: &Conjunction,
        x: &str,
        subsumers: &Subsumers,
        own_roles: &BTreeMap<String, BTreeSet<RoleAxiom>>,
    ) -> bool {
        if !definition
            .parents
            .iter()
            .all(|parent| subsumed_by(subsumers, x, parent))
        {
            return false;
        }
        let inherited = std::iter::once(x)
            .chain(subsumers[x].iter().map(String::as_str))
            .filter_map(|c| own_roles.get(c))
            .flatten()
            .collect::<Vec<_>>();
        definition.roles.iter().all(|wanted| {
            inherited.iter().any(|held| {
                held.role == wanted.role && subsumed_by(subsumers, &held.filler, &wanted.filler)
            })
        })
    }
}

impl Reasoner for StructuralReasoner {
    fn name(&self) -> &str {
        "structural"
    }

    fn classify(&self, axioms: &AxiomSet) -> Result<ReasonerTaxonomy, KometError> {
        let signature = axioms.signature();
        if let Some(blank) = signature.iter().find(|id| id.trim().is_empty()) {
            return Err(KometError::Reasoner(format!(
                "Blank concept id '{blank}' in axiom set"
            )));
        }
        let mut told: Subsumers = signature
            .iter()
            .map(|id| (id.clone(), BTreeSet::new()))
            .collect();
        let mut own_roles: BTreeMap<String, BTreeSet<RoleAxiom>> = BTreeMap::new();
        for (concept, concept_axioms) in &axioms.concepts {
            let parents = told.entry(concept.clone()).or_default();
            let roles = own_roles.entry(concept.clone()).or_default();
            for conjunction in
                std::iter::once(&concept_axioms.necessary).chain(&concept_axioms.sufficient)
            {
                parents.extend(conjunction.parents.iter().cloned());
                roles.extend(conjunction.roles.iter().cloned());
            }
        }

        let mut rounds = 0;
        let subsumers = loop {
            rounds += 1;
            let subsumers = closure(&told);
            let mut inferred = Vec::new();
            for (defined, concept_axioms) in &axioms.concepts {
                for x in &signature {
                    if x == defined || subsumed_by(&subsumers, x, defined) {
                        continue;
                    }
                    if concept_axioms
                        .sufficient
                        .iter()
                        .any(|d| Self::matches(d, x, &subsumers, &own_roles))
                    {
                        inferred.push((x.clone(), defined.clone()));
                    }
                }
            }
            if inferred.is_empty() {
                break subsumers;
            }
            for (x, defined) in inferred {
                if let Some(parents) = told.get_mut(&x) {
                    parents.insert(defined);
                }
            }
        };
        tracing::debug!(
            "[Reasoner] Classified {} concepts in {rounds} round(s)",
            signature.len()
        );

        let equivalents_of = |x: &String| -> BTreeSet<String> {
            std::iter::once(x.clone())
                .chain(
                    subsumers[x]
                        .iter()
                        .filter(|y| subsumed_by(&subsumers, y, x))
                        .cloned(),
                )
                .collect()
        };
        let mut nodes = BTreeMap::new();
        for x in &signature {
            let equivalents = equivalents_of(x);
            let strict: BTreeSet<&String> = subsumers[x]
                .iter()
                .filter(|s| !equivalents.contains(*s))
                .collect();
            let direct_parents = strict
                .iter()
                .filter(|s| {
                    !strict
                        .iter()
                        .any(|t| t != *s && subsumed_by(&subsumers, t, s) && !subsumed_by(&subsumers, s, t))
                })
                .map(|s| (*s).clone())
                .collect();
            nodes.insert(
                x.clone(),
                ReasonerNode {
                    equivalents,
                    direct_parents,
                },
            );
        }
        Ok(ReasonerTaxonomy { nodes })
    }
}
