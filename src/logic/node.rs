use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use crate::{error::KometError, identifier::Nid, metadata::METADATA};

/// Tag of a [LogicNode] variant, used on the wire and in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeSemantic {
    Definition,
    NecessarySet,
    SufficientSet,
    And,
    Or,
    Concept,
    RoleSome,
    RoleAll,
    Feature,
    LiteralBoolean,
    LiteralFloat,
    LiteralInstant,
    LiteralInteger,
    LiteralString,
}

impl NodeSemantic {
    pub fn to_byte(self) -> u8 {
        match self {
            NodeSemantic::Definition => 0,
            NodeSemantic::NecessarySet => 1,
            NodeSemantic::SufficientSet => 2,
            NodeSemantic::And => 3,
            NodeSemantic::Or => 4,
            NodeSemantic::Concept => 5,
            NodeSemantic::RoleSome => 6,
            NodeSemantic::RoleAll => 7,
            NodeSemantic::Feature => 8,
            NodeSemantic::LiteralBoolean => 9,
            NodeSemantic::LiteralFloat => 10,
            NodeSemantic::LiteralInstant => 11,
            NodeSemantic::LiteralInteger => 12,
            NodeSemantic::LiteralString => 13,
        }
    }

    pub fn from_byte(byte: u8) -> Result<Self, KometError> {
        Ok(match byte {
            0 => NodeSemantic::Definition,
            1 => NodeSemantic::NecessarySet,
            2 => NodeSemantic::SufficientSet,
            3 => NodeSemantic::And,
            4 => NodeSemantic::Or,
            5 => NodeSemantic::Concept,
            6 => NodeSemantic::RoleSome,
            7 => NodeSemantic::RoleAll,
            8 => NodeSemantic::Feature,
            9 => NodeSemantic::LiteralBoolean,
            10 => NodeSemantic::LiteralFloat,
            11 => NodeSemantic::LiteralInstant,
            12 => NodeSemantic::LiteralInteger,
            13 => NodeSemantic::LiteralString,
            _ => {
                return Err(KometError::Serialization(format!(
                    "Invalid node semantic byte {byte}"
                )))
            }
        })
    }

    pub fn is_set(&self) -> bool {
        matches!(self, NodeSemantic::NecessarySet | NodeSemantic::SufficientSet)
    }

    /// Connectives whose children are unordered.
    pub fn is_commutative(&self) -> bool {
        matches!(
            self,
            NodeSemantic::Definition
                | NodeSemantic::NecessarySet
                | NodeSemantic::SufficientSet
                | NodeSemantic::And
                | NodeSemantic::Or
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConcreteDomainOperator {
    Equals,
    LessThan,
    LessThanOrEquals,
    GreaterThan,
    GreaterThanOrEquals,
}

impl ConcreteDomainOperator {
    pub fn to_byte(self) -> u8 {
        match self {
            ConcreteDomainOperator::Equals => 0,
            ConcreteDomainOperator::LessThan => 1,
            ConcreteDomainOperator::LessThanOrEquals => 2,
            ConcreteDomainOperator::GreaterThan => 3,
            ConcreteDomainOperator::GreaterThanOrEquals => 4,
        }
    }

    pub fn from_byte(byte: u8) -> Result<Self, KometError> {
        Ok(match byte {
            0 => ConcreteDomainOperator::Equals,
            1 => ConcreteDomainOperator::LessThan,
            2 => ConcreteDomainOperator::LessThanOrEquals,
            3 => ConcreteDomainOperator::GreaterThan,
            4 => ConcreteDomainOperator::GreaterThanOrEquals,
            _ => {
                return Err(KometError::Serialization(format!(
                    "Invalid concrete domain operator byte {byte}"
                )))
            }
        })
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            ConcreteDomainOperator::Equals => "=",
            ConcreteDomainOperator::LessThan => "<",
            ConcreteDomainOperator::LessThanOrEquals => "<=",
            ConcreteDomainOperator::GreaterThan => ">",
            ConcreteDomainOperator::GreaterThanOrEquals => ">=",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Boolean(bool),
    Float(f64),
    /// Epoch millis.
    Instant(i64),
    Integer(i64),
    String(String),
}

impl Display for Literal {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Literal::Boolean(b) => write!(f, "{b}"),
            Literal::Float(x) => write!(f, "{x}"),
            Literal::Instant(t) => write!(f, "{}", crate::stamp::time_to_user_string(*t)),
            Literal::Integer(i) => write!(f, "{i}"),
            Literal::String(s) => write!(f, "\"{s}\""),
        }
    }
}

/// One node of a [super::LogicalExpression]. Children live in the expression's arena.
///
/// - `Definition`: the root, children are sets
/// - `NecessarySet`/`SufficientSet`: one connective child
/// - `And`/`Or`: any number of assertion children
/// - `RoleSome`/`RoleAll`: exactly one restriction child
/// - `Feature`: exactly one literal child
/// - `Concept` and `Literal`: leaves
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LogicNode {
    Definition,
    NecessarySet,
    SufficientSet,
    And,
    Or,
    Concept(Nid),
    RoleSome {
        role_type: Nid,
    },
    RoleAll {
        role_type: Nid,
    },
    Feature {
        feature_type: Nid,
        operator: ConcreteDomainOperator,
    },
    Literal(Literal),
}

impl LogicNode {
    pub fn semantic(&self) -> NodeSemantic {
        match self {
            LogicNode::Definition => NodeSemantic::Definition,
            LogicNode::NecessarySet => NodeSemantic::NecessarySet,
            LogicNode::SufficientSet => NodeSemantic::SufficientSet,
            LogicNode::And => NodeSemantic::And,
            LogicNode::Or => NodeSemantic::Or,
            LogicNode::Concept(_) => NodeSemantic::Concept,
            LogicNode::RoleSome { .. } => NodeSemantic::RoleSome,
            LogicNode::RoleAll { .. } => NodeSemantic::RoleAll,
            LogicNode::Feature { .. } => NodeSemantic::Feature,
            LogicNode::Literal(Literal::Boolean(_)) => NodeSemantic::LiteralBoolean,
            LogicNode::Literal(Literal::Float(_)) => NodeSemantic::LiteralFloat,
            LogicNode::Literal(Literal::Instant(_)) => NodeSemantic::LiteralInstant,
            LogicNode::Literal(Literal::Integer(_)) => NodeSemantic::LiteralInteger,
            LogicNode::Literal(Literal::String(_)) => NodeSemantic::LiteralString,
        }
    }

    /// The concept nid a node refers to, if any.
    pub fn concept_nid(&self) -> Option<Nid> {
        match self {
            LogicNode::Concept(nid) => Some(*nid),
            LogicNode::RoleSome { role_type } | LogicNode::RoleAll { role_type } => {
                Some(*role_type)
            }
            LogicNode::Feature { feature_type, .. } => Some(*feature_type),
            _ => None,
        }
    }

    /// Allowed number of children, as an inclusive range.
    pub(crate) fn arity(&self) -> (usize, usize) {
        match self {
            LogicNode::Definition => (1, usize::MAX),
            LogicNode::NecessarySet | LogicNode::SufficientSet => (1, 1),
            LogicNode::And | LogicNode::Or => (1, usize::MAX),
            LogicNode::RoleSome { .. } | LogicNode::RoleAll { .. } | LogicNode::Feature { .. } => {
                (1, 1)
            }
            LogicNode::Concept(_) | LogicNode::Literal(_) => (0, 0),
        }
    }
}

impl Display for LogicNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            LogicNode::Concept(nid) => write!(f, "Concept[{}]", METADATA.name_of(*nid)),
            LogicNode::RoleSome { role_type } => {
                write!(f, "Some[{}]", METADATA.name_of(*role_type))
            }
            LogicNode::RoleAll { role_type } => write!(f, "All[{}]", METADATA.name_of(*role_type)),
            LogicNode::Feature {
                feature_type,
                operator,
            } => write!(
                f,
                "Feature[{} {}]",
                METADATA.name_of(*feature_type),
                operator.symbol()
            ),
            LogicNode::Literal(literal) => write!(f, "{literal}"),
            other => write!(f, "{:?}", other.semantic()),
        }
    }
}
