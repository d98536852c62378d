//! Logic graphs: description-logic definitions of concepts.
//!
//! Nodes are a closed sum type ([LogicNode]) stored in an arena ([LogicalExpression]). Concept
//! references are always nids inside an expression; [LogicalExpressionBuilder] resolves UUID
//! references once at build time and [IdentifierStrategy] chooses nids or UUIDs on the wire.

pub mod builder;
pub mod expression;
pub mod node;

pub use builder::{Assertion, ConceptRef, LogicalExpressionBuilder};
pub use expression::{
    IdentifierStrategy, LogicalExpression, RoleRestriction, LOGIC_GRAPH_MARSHAL_VERSION,
};
pub use node::{ConcreteDomainOperator, Literal, LogicNode, NodeSemantic};
