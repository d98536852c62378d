use crate::{
    error::KometError,
    identifier::{IdentifierService, Nid, Uuid},
    metadata::{ConceptSpec, ROLE_GROUP},
};

use super::{
    expression::LogicalExpression,
    node::{ConcreteDomainOperator, Literal, LogicNode},
};

/// A concept reference that is resolved to a nid once, when the expression is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConceptRef {
    Nid(Nid),
    Uuid(Uuid),
}

impl ConceptRef {
    fn resolve(&self, ids: &dyn IdentifierService) -> Result<Nid, KometError> {
        match self {
            ConceptRef::Nid(nid) => Ok(*nid),
            ConceptRef::Uuid(uuid) => ids.nid_for_uuid_or_err(uuid),
        }
    }
}

impl From<Nid> for ConceptRef {
    fn from(nid: Nid) -> Self {
        ConceptRef::Nid(nid)
    }
}

impl From<Uuid> for ConceptRef {
    fn from(uuid: Uuid) -> Self {
        ConceptRef::Uuid(uuid)
    }
}

impl From<ConceptSpec> for ConceptRef {
    fn from(spec: ConceptSpec) -> Self {
        ConceptRef::Nid(spec.nid)
    }
}

/// Handle to a node staged in a [LogicalExpressionBuilder].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Assertion(usize);

#[derive(Debug, Clone)]
enum Staged {
    NecessarySet,
    SufficientSet,
    And,
    Or,
    Concept(ConceptRef),
    RoleSome(ConceptRef),
    RoleAll(ConceptRef),
    Feature(ConceptRef, ConcreteDomainOperator),
    Literal(Literal),
}

/// Builds a [LogicalExpression] bottom-up.
///
/// ```
/// # use komet_core::{identifier::InMemoryIdentifierService, logic::LogicalExpressionBuilder};
/// # use komet_core::metadata::ROOT_CONCEPT;
/// let ids = InMemoryIdentifierService::new();
/// let mut builder = LogicalExpressionBuilder::new();
/// let parent = builder.concept_assertion(ROOT_CONCEPT);
/// let conjunction = builder.and(vec![parent]);
/// builder.necessary_set(conjunction);
/// let expression = builder.build(&ids).unwrap();
/// assert_eq!(expression.necessary_parents().len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct LogicalExpressionBuilder {
    staged: Vec<Staged>,
    children: Vec<Vec<usize>>,
    used: Vec<bool>,
    sets: Vec<usize>,
}

impl LogicalExpressionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn stage(&mut self, node: Staged, children: Vec<Assertion>) -> Assertion {
        let index = self.staged.len();
        self.staged.push(node);
        self.children
            .push(children.into_iter().map(|Assertion(i)| i).collect());
        self.used.push(false);
        Assertion(index)
    }

    pub fn concept_assertion(&mut self, concept: impl Into<ConceptRef>) -> Assertion {
        self.stage(Staged::Concept(concept.into()), Vec::new())
    }

    pub fn some_role(&mut self, role_type: impl Into<ConceptRef>, restriction: Assertion) -> Assertion {
        self.stage(Staged::RoleSome(role_type.into()), vec![restriction])
    }

    pub fn all_role(&mut self, role_type: impl Into<ConceptRef>, restriction: Assertion) -> Assertion {
        self.stage(Staged::RoleAll(role_type.into()), vec![restriction])
    }

    /// An existential role group around `members`.
    pub fn role_group(&mut self, members: Vec<Assertion>) -> Assertion {
        let conjunction = self.and(members);
        self.some_role(ROLE_GROUP, conjunction)
    }

    pub fn feature(
        &mut self,
        feature_type: impl Into<ConceptRef>,
        operator: ConcreteDomainOperator,
        literal: Literal,
    ) -> Assertion {
        let literal = self.stage(Staged::Literal(literal), Vec::new());
        self.stage(Staged::Feature(feature_type.into(), operator), vec![literal])
    }

    pub fn and(&mut self, assertions: Vec<Assertion>) -> Assertion {
        self.stage(Staged::And, assertions)
    }

    pub fn or(&mut self, assertions: Vec<Assertion>) -> Assertion {
        self.stage(Staged::Or, assertions)
    }

    pub fn necessary_set(&mut self, assertion: Assertion) -> Assertion {
        let set = self.stage(Staged::NecessarySet, vec![assertion]);
        self.sets.push(set.0);
        set
    }

    pub fn sufficient_set(&mut self, assertion: Assertion) -> Assertion {
        let set = self.stage(Staged::SufficientSet, vec![assertion]);
        self.sets.push(set.0);
        set
    }

    /// Stage a copy of the subtree rooted at `index` of `source`. Concept references are
    /// copied as nids.
    pub fn copy_subtree(&mut self, source: &LogicalExpression, index: usize) -> Result<Assertion, KometError> {
        let node = source.node(index).ok_or_else(|| {
            KometError::NotFound(format!("Logic graph has no node {index}"))
        })?;
        let kids = source
            .children(index)
            .iter()
            .map(|child| self.copy_subtree(source, *child))
            .collect::<Result<Vec<_>, _>>()?;
        let staged = match node {
            LogicNode::Definition => {
                return Err(KometError::Configuration(
                    "Cannot copy a definition root into another expression".to_string(),
                ))
            }
            // Sets are re-registered so that copying a set copies it into the new root.
            LogicNode::NecessarySet => {
                let set = self.stage(Staged::NecessarySet, kids);
                self.sets.push(set.0);
                return Ok(set);
            }
            LogicNode::SufficientSet => {
                let set = self.stage(Staged::SufficientSet, kids);
                self.sets.push(set.0);
                return Ok(set);
            }
            LogicNode::And => Staged::And,
            LogicNode::Or => Staged::Or,
            LogicNode::Concept(nid) => Staged::Concept(ConceptRef::Nid(*nid)),
            LogicNode::RoleSome { role_type } => Staged::RoleSome(ConceptRef::Nid(*role_type)),
            LogicNode::RoleAll { role_type } => Staged::RoleAll(ConceptRef::Nid(*role_type)),
            LogicNode::Feature {
                feature_type,
                operator,
            } => Staged::Feature(ConceptRef::Nid(*feature_type), *operator),
            LogicNode::Literal(literal) => Staged::Literal(literal.clone()),
        };
        Ok(self.stage(staged, kids))
    }

    /// Resolve every concept reference and lay the sets out under a `Definition` root in the
    /// order they were added. Each staged node may appear in the tree once.
    pub fn build(mut self, ids: &dyn IdentifierService) -> Result<LogicalExpression, KometError> {
        let mut expression = LogicalExpression::new();
        let sets = std::mem::take(&mut self.sets);
        for set in sets {
            self.emit(set, LogicalExpression::ROOT, &mut expression, ids)?;
        }
        expression.validate()?;
        Ok(expression)
    }

    fn emit(
        &mut self,
        index: usize,
        parent: usize,
        expression: &mut LogicalExpression,
        ids: &dyn IdentifierService,
    ) -> Result<(), KometError> {
        if std::mem::replace(&mut self.used[index], true) {
            return Err(KometError::Configuration(format!(
                "Assertion {index} is used more than once"
            )));
        }
        let node = match &self.staged[index] {
            Staged::NecessarySet => LogicNode::NecessarySet,
            Staged::SufficientSet => LogicNode::SufficientSet,
            Staged::And => LogicNode::And,
            Staged::Or => LogicNode::Or,
            Staged::Concept(c) => LogicNode::Concept(c.resolve(ids)?),
            Staged::RoleSome(c) => LogicNode::RoleSome {
                role_type: c.resolve(ids)?,
            },
            Staged::RoleAll(c) => LogicNode::RoleAll {
                role_type: c.resolve(ids)?,
            },
            Staged::Feature(c, operator) => LogicNode::Feature {
                feature_type: c.resolve(ids)?,
                operator: *operator,
            },
            Staged::Literal(literal) => LogicNode::Literal(literal.clone()),
        };
        let position = expression.push(parent, node);
        let kids = self.children[index].clone();
        for child in kids {
            self.emit(child, position, expression, ids)?;
        }
        Ok(())
    }
}
