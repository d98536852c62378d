//! Classification: stated logic graphs in, inferred logic graphs out.

pub mod pipeline;
pub mod reasoner;

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

pub use pipeline::{classify_task, ClassifierResults, ClassifierService};
pub use reasoner::{
    nid_from_reasoner_id, reasoner_id, AxiomSet, ConceptAxioms, Conjunction, Reasoner,
    ReasonerNode, ReasonerTaxonomy, RoleAxiom, StructuralReasoner,
};

/// Where a classification run is. Runs always end back at `Idle`, whether they succeed or not.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClassifierState {
    #[default]
    Idle,
    LoadAxioms,
    Classify,
    CollectResults,
    WriteBack,
    Commit,
    Notify,
}

impl Display for ClassifierState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ClassifierState::Idle => "idle",
            ClassifierState::LoadAxioms => "loading axioms",
            ClassifierState::Classify => "classifying",
            ClassifierState::CollectResults => "collecting results",
            ClassifierState::WriteBack => "writing inferred graphs",
            ClassifierState::Commit => "committing",
            ClassifierState::Notify => "notifying",
        };
        write!(f, "{name}")
    }
}
