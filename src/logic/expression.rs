use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{
    collections::BTreeSet,
    fmt::{Display, Formatter},
};

use super::node::{ConcreteDomainOperator, Literal, LogicNode, NodeSemantic};
use crate::{
    coordinate::marshal::{MarshalReader, MarshalWriter},
    error::KometError,
    identifier::{IdentifierService, Nid, Uuid},
    metadata::ROLE_GROUP,
};

/// Wire version of marshalled logic graphs.
pub const LOGIC_GRAPH_MARSHAL_VERSION: u32 = 1;

/// How concept references are written when marshalling a logic graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdentifierStrategy {
    /// Native nids; only meaningful within one identifier service.
    Internal,
    /// Portable UUIDs.
    External,
}

/// A role restriction found in a set, with role groups flattened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoleRestriction {
    pub set: NodeSemantic,
    pub role_type: Nid,
    /// The restricting concept, when the restriction is a plain concept.
    pub filler: Option<Nid>,
    pub universal: bool,
    /// Arena index of the enclosing role group node, if grouped.
    pub group: Option<usize>,
}

/// A logic graph: an arena of [LogicNode]s with the `Definition` root at index 0. Parents
/// always precede their children in the arena.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogicalExpression {
    nodes: Vec<LogicNode>,
    children: Vec<Vec<usize>>,
}

impl Default for LogicalExpression {
    fn default() -> Self {
        Self::new()
    }
}

impl LogicalExpression {
    pub const ROOT: usize = 0;

    /// An expression holding only the root.
    pub fn new() -> Self {
        LogicalExpression {
            nodes: vec![LogicNode::Definition],
            children: vec![Vec::new()],
        }
    }

    /// Append `node` under `parent`, returning its index.
    pub(crate) fn push(&mut self, parent: usize, node: LogicNode) -> usize {
        let index = self.nodes.len();
        self.nodes.push(node);
        self.children.push(Vec::new());
        self.children[parent].push(index);
        index
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when the root has no sets.
    pub fn is_empty(&self) -> bool {
        self.children[Self::ROOT].is_empty()
    }

    pub fn node(&self, index: usize) -> Option<&LogicNode> {
        self.nodes.get(index)
    }

    pub fn nodes(&self) -> &[LogicNode] {
        &self.nodes
    }

    pub fn children(&self, index: usize) -> &[usize] {
        self.children.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    fn sets_of(&self, semantic: NodeSemantic) -> Vec<usize> {
        self.children(Self::ROOT)
            .iter()
            .copied()
            .filter(|i| self.nodes[*i].semantic() == semantic)
            .collect()
    }

    pub fn necessary_sets(&self) -> Vec<usize> {
        self.sets_of(NodeSemantic::NecessarySet)
    }

    pub fn sufficient_sets(&self) -> Vec<usize> {
        self.sets_of(NodeSemantic::SufficientSet)
    }

    pub fn is_sufficiently_defined(&self) -> bool {
        !self.sufficient_sets().is_empty()
    }

    /// Conjuncts of a set: the children of its `And`, or the single child otherwise.
    pub fn set_members(&self, set: usize) -> Vec<usize> {
        let mut members = Vec::new();
        for child in self.children(set) {
            match self.nodes[*child] {
                LogicNode::And => members.extend_from_slice(self.children(*child)),
                _ => members.push(*child),
            }
        }
        members
    }

    /// Concepts asserted directly as conjuncts of any set: the stated is-a parents.
    pub fn parent_concepts(&self) -> BTreeSet<Nid> {
        self.children(Self::ROOT)
            .iter()
            .flat_map(|set| self.set_members(*set))
            .filter_map(|member| match self.nodes[member] {
                LogicNode::Concept(nid) => Some(nid),
                _ => None,
            })
            .collect()
    }

    /// Concepts asserted directly as conjuncts of necessary sets.
    pub fn necessary_parents(&self) -> BTreeSet<Nid> {
        self.necessary_sets()
            .into_iter()
            .flat_map(|set| self.set_members(set))
            .filter_map(|member| match self.nodes[member] {
                LogicNode::Concept(nid) => Some(nid),
                _ => None,
            })
            .collect()
    }

    /// Role restrictions that are conjuncts of some set. Members of role groups are reported
    /// individually, tagged with their group.
    pub fn role_restrictions(&self) -> Vec<RoleRestriction> {
        self.children(Self::ROOT)
            .iter()
            .flat_map(|set| self.set_role_restrictions(*set))
            .collect()
    }

    /// Role restrictions that are conjuncts of one set.
    pub fn set_role_restrictions(&self, set: usize) -> Vec<RoleRestriction> {
        let mut found = Vec::new();
        let set_semantic = self.nodes[set].semantic();
        for member in self.set_members(set) {
            self.collect_roles(member, set_semantic, None, &mut found);
        }
        found
    }

    /// Concepts asserted directly as conjuncts of one set.
    pub fn set_parents(&self, set: usize) -> BTreeSet<Nid> {
        self.set_members(set)
            .into_iter()
            .filter_map(|member| match self.nodes[member] {
                LogicNode::Concept(nid) => Some(nid),
                _ => None,
            })
            .collect()
    }

    fn collect_roles(
        &self,
        index: usize,
        set: NodeSemantic,
        group: Option<usize>,
        found: &mut Vec<RoleRestriction>,
    ) {
        let (role_type, universal) = match self.nodes[index] {
            LogicNode::RoleSome { role_type } => (role_type, false),
            LogicNode::RoleAll { role_type } => (role_type, true),
            _ => return,
        };
        let Some(restriction) = self.children(index).first().copied() else {
            return;
        };
        if role_type == ROLE_GROUP.nid && group.is_none() {
            let grouped = match self.nodes[restriction] {
                LogicNode::And => self.children(restriction).to_vec(),
                _ => vec![restriction],
            };
            for member in grouped {
                self.collect_roles(member, set, Some(index), found);
            }
            return;
        }
        let filler = match self.nodes[restriction] {
            LogicNode::Concept(nid) => Some(nid),
            _ => None,
        };
        found.push(RoleRestriction {
            set,
            role_type,
            filler,
            universal,
            group,
        });
    }

    /// Every concept nid referenced anywhere: asserted concepts, role and feature types.
    pub fn referenced_concepts(&self) -> BTreeSet<Nid> {
        self.nodes.iter().filter_map(LogicNode::concept_nid).collect()
    }

    /// Order-insensitive encoding of the subtree at `index`. Two expressions are equivalent
    /// when their roots' canonical forms match.
    pub fn canonical_form(&self, index: usize) -> Vec<u8> {
        let node = &self.nodes[index];
        let mut out = vec![node.semantic().to_byte()];
        match node {
            LogicNode::Concept(nid)
            | LogicNode::RoleSome { role_type: nid }
            | LogicNode::RoleAll { role_type: nid } => out.extend(nid.value().to_be_bytes()),
            LogicNode::Feature {
                feature_type,
                operator,
            } => {
                out.extend(feature_type.value().to_be_bytes());
                out.push(operator.to_byte());
            }
            LogicNode::Literal(literal) => match literal {
                Literal::Boolean(b) => out.push(*b as u8),
                Literal::Float(x) => out.extend(x.to_bits().to_be_bytes()),
                Literal::Instant(t) | Literal::Integer(t) => out.extend(t.to_be_bytes()),
                Literal::String(s) => {
                    out.extend((s.len() as u32).to_be_bytes());
                    out.extend(s.as_bytes());
                }
            },
            _ => {}
        }
        let mut kids = self
            .children(index)
            .iter()
            .map(|child| self.canonical_form(*child))
            .collect::<Vec<_>>();
        if node.semantic().is_commutative() {
            kids.sort();
        }
        out.extend((kids.len() as u32).to_be_bytes());
        for kid in kids {
            out.extend((kid.len() as u32).to_be_bytes());
            out.extend(kid);
        }
        out
    }

    /// Same meaning regardless of the order conjuncts, disjuncts or sets were added in.
    pub fn is_equivalent(&self, other: &LogicalExpression) -> bool {
        self.canonical_form(Self::ROOT) == other.canonical_form(Self::ROOT)
    }

    /// Hex sha256 of the canonical form.
    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(self.canonical_form(Self::ROOT)))
    }

    /// Check the structural rules: a single `Definition` root whose children are sets, arity of
    /// every node, a tree with parents before children, and literals only under features.
    pub fn validate(&self) -> Result<(), KometError> {
        if self.nodes.len() != self.children.len() {
            return Err(KometError::Integrity(
                "Logic graph node and child tables disagree".to_string(),
            ));
        }
        if self.nodes.first() != Some(&LogicNode::Definition) {
            return Err(KometError::Integrity(
                "Logic graph root is not a definition".to_string(),
            ));
        }
        let mut parents = vec![0usize; self.nodes.len()];
        for (index, node) in self.nodes.iter().enumerate() {
            if index != Self::ROOT && *node == LogicNode::Definition {
                return Err(KometError::Integrity(format!(
                    "Nested definition at node {index}"
                )));
            }
            let kids = self.children(index);
            let (min, max) = node.arity();
            // An empty definition is a concept with no logic yet.
            let min = if index == Self::ROOT { 0 } else { min };
            if kids.len() < min || kids.len() > max {
                return Err(KometError::Integrity(format!(
                    "{} at node {index} has {} children",
                    node,
                    kids.len()
                )));
            }
            for child in kids {
                if *child <= index || *child >= self.nodes.len() {
                    return Err(KometError::Integrity(format!(
                        "Node {index} has out of order child {child}"
                    )));
                }
                parents[*child] += 1;
                let child_semantic = self.nodes[*child].semantic();
                if (index == Self::ROOT) != child_semantic.is_set() {
                    return Err(KometError::Integrity(format!(
                        "{child_semantic:?} at node {child} cannot be a child of {node}"
                    )));
                }
                let literal = matches!(self.nodes[*child], LogicNode::Literal(_));
                let feature = matches!(node, LogicNode::Feature { .. });
                if literal != feature {
                    return Err(KometError::Integrity(format!(
                        "{child_semantic:?} at node {child} cannot be a child of {node}"
                    )));
                }
            }
        }
        if let Some(orphan) = parents.iter().skip(1).position(|count| *count != 1) {
            return Err(KometError::Integrity(format!(
                "Node {} does not have exactly one parent",
                orphan + 1
            )));
        }
        Ok(())
    }

    fn put_id(
        out: &mut MarshalWriter,
        nid: Nid,
        strategy: IdentifierStrategy,
        ids: &dyn IdentifierService,
    ) -> Result<(), KometError> {
        match strategy {
            IdentifierStrategy::Internal => out.put_nid(nid),
            IdentifierStrategy::External => out.put_bytes(ids.uuid_for_nid_or_err(nid)?.as_bytes()),
        }
        Ok(())
    }

    fn get_id(
        input: &mut MarshalReader,
        strategy: IdentifierStrategy,
        ids: &dyn IdentifierService,
    ) -> Result<Nid, KometError> {
        match strategy {
            IdentifierStrategy::Internal => input.get_nid(),
            IdentifierStrategy::External => {
                let uuid = Uuid::from_slice(&input.get_bytes()?)?;
                Ok(ids.assign_nid(uuid))
            }
        }
    }

    /// Versioned binary form. With [IdentifierStrategy::External] every concept reference is
    /// written as its UUID, so the bytes can move between identifier services.
    pub fn marshal(
        &self,
        strategy: IdentifierStrategy,
        ids: &dyn IdentifierService,
    ) -> Result<Vec<u8>, KometError> {
        let mut out = MarshalWriter::new();
        out.put_u32(LOGIC_GRAPH_MARSHAL_VERSION);
        out.put_u8(match strategy {
            IdentifierStrategy::Internal => 0,
            IdentifierStrategy::External => 1,
        });
        out.put_u32(self.nodes.len() as u32);
        for (index, node) in self.nodes.iter().enumerate() {
            out.put_u8(node.semantic().to_byte());
            match node {
                LogicNode::Concept(nid)
                | LogicNode::RoleSome { role_type: nid }
                | LogicNode::RoleAll { role_type: nid } => {
                    Self::put_id(&mut out, *nid, strategy, ids)?
                }
                LogicNode::Feature {
                    feature_type,
                    operator,
                } => {
                    Self::put_id(&mut out, *feature_type, strategy, ids)?;
                    out.put_u8(operator.to_byte());
                }
                LogicNode::Literal(Literal::Boolean(b)) => out.put_bool(*b),
                LogicNode::Literal(Literal::Float(x)) => out.put_i64(x.to_bits() as i64),
                LogicNode::Literal(Literal::Instant(t) | Literal::Integer(t)) => out.put_i64(*t),
                LogicNode::Literal(Literal::String(s)) => out.put_str(s),
                _ => {}
            }
            let kids = self.children(index);
            out.put_u32(kids.len() as u32);
            for child in kids {
                out.put_u32(*child as u32);
            }
        }
        Ok(out.freeze().to_vec())
    }

    pub fn unmarshal(bytes: &[u8], ids: &dyn IdentifierService) -> Result<Self, KometError> {
        let mut input = MarshalReader::new(bytes);
        let version = input.get_u32()?;
        if version != LOGIC_GRAPH_MARSHAL_VERSION {
            return Err(KometError::Serialization(format!(
                "Unsupported logic graph marshal version {version}"
            )));
        }
        let strategy = match input.get_u8()? {
            0 => IdentifierStrategy::Internal,
            1 => IdentifierStrategy::External,
            other => {
                return Err(KometError::Serialization(format!(
                    "Invalid identifier strategy byte {other}"
                )))
            }
        };
        let count = input.get_u32()? as usize;
        let mut nodes = Vec::new();
        let mut children = Vec::new();
        for _ in 0..count {
            let node = match NodeSemantic::from_byte(input.get_u8()?)? {
                NodeSemantic::Definition => LogicNode::Definition,
                NodeSemantic::NecessarySet => LogicNode::NecessarySet,
                NodeSemantic::SufficientSet => LogicNode::SufficientSet,
                NodeSemantic::And => LogicNode::And,
                NodeSemantic::Or => LogicNode::Or,
                NodeSemantic::Concept => LogicNode::Concept(Self::get_id(&mut input, strategy, ids)?),
                NodeSemantic::RoleSome => LogicNode::RoleSome {
                    role_type: Self::get_id(&mut input, strategy, ids)?,
                },
                NodeSemantic::RoleAll => LogicNode::RoleAll {
                    role_type: Self::get_id(&mut input, strategy, ids)?,
                },
                NodeSemantic::Feature => LogicNode::Feature {
                    feature_type: Self::get_id(&mut input, strategy, ids)?,
                    operator: ConcreteDomainOperator::from_byte(input.get_u8()?)?,
                },
                NodeSemantic::LiteralBoolean => LogicNode::Literal(Literal::Boolean(input.get_bool()?)),
                NodeSemantic::LiteralFloat => {
                    LogicNode::Literal(Literal::Float(f64::from_bits(input.get_i64()? as u64)))
                }
                NodeSemantic::LiteralInstant => LogicNode::Literal(Literal::Instant(input.get_i64()?)),
                NodeSemantic::LiteralInteger => LogicNode::Literal(Literal::Integer(input.get_i64()?)),
                NodeSemantic::LiteralString => LogicNode::Literal(Literal::String(input.get_str()?)),
            };
            let kid_count = input.get_u32()? as usize;
            let kids = (0..kid_count)
                .map(|_| input.get_u32().map(|c| c as usize))
                .collect::<Result<Vec<_>, _>>()?;
            nodes.push(node);
            children.push(kids);
        }
        input.finish("logic graph")?;
        let expression = LogicalExpression { nodes, children };
        expression.validate()?;
        Ok(expression)
    }

    fn fmt_node(&self, index: usize, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.nodes[index])?;
        let kids = self.children(index);
        if !kids.is_empty() {
            write!(f, "(")?;
            for (i, child) in kids.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                self.fmt_node(*child, f)?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

impl Display for LogicalExpression {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.fmt_node(Self::ROOT, f)
    }
}
