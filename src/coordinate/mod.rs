//! Coordinates: immutable view parameters that decide what is current for an observer.
//!
//! - [`StampFilter`]: statuses, position and modules; the input to version resolution
//! - [`LanguageCoordinate`]: which description names a concept
//! - [`LogicCoordinate`] and [`NavigationCoordinate`]: which logic graphs define the taxonomy
//! - [`EditCoordinate`]: provenance for new versions
//! - [`ManifoldCoordinate`]: all of the above, threaded through read APIs
//!
//! Coordinates compare by value. [`Interner`] canonicalizes them when identity sharing is
//! wanted, and [`marshal`] gives each one a versioned binary form.

pub mod edit;
pub mod interner;
pub mod language;
pub mod logic;
pub mod manifold;
pub mod marshal;
pub mod navigation;
pub mod stamp_filter;

use serde::{Deserialize, Serialize};

pub use edit::EditCoordinate;
pub use interner::{Interner, InternerStats};
pub use language::{LanguageCoordinate, ResolvedDescription};
pub use logic::LogicCoordinate;
pub use manifold::ManifoldCoordinate;
pub use marshal::{Marshalable, CURRENT_MARSHAL_VERSION, PRIOR_MARSHAL_VERSION};
pub use navigation::NavigationCoordinate;
pub use stamp_filter::StampFilter;

use crate::error::KometError;

/// Stated (author-entered) or inferred (classifier-derived) logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Premise {
    Stated,
    Inferred,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Activity {
    Viewing,
    Developing,
    Promoting,
    Classifying,
}

impl Activity {
    pub(crate) fn to_byte(self) -> u8 {
        match self {
            Activity::Viewing => 0,
            Activity::Developing => 1,
            Activity::Promoting => 2,
            Activity::Classifying => 3,
        }
    }

    pub(crate) fn from_byte(byte: u8) -> Result<Self, KometError> {
        match byte {
            0 => Ok(Activity::Viewing),
            1 => Ok(Activity::Developing),
            2 => Ok(Activity::Promoting),
            3 => Ok(Activity::Classifying),
            _ => Err(KometError::Serialization(format!("Invalid activity byte {byte}"))),
        }
    }
}

/// Order of sibling concepts in taxonomy listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VertexSort {
    /// By nid.
    Natural,
    ByRegularName,
    ByFullyQualifiedName,
}

impl VertexSort {
    pub(crate) fn to_byte(self) -> u8 {
        match self {
            VertexSort::Natural => 0,
            VertexSort::ByRegularName => 1,
            VertexSort::ByFullyQualifiedName => 2,
        }
    }

    pub(crate) fn from_byte(byte: u8) -> Result<Self, KometError> {
        match byte {
            0 => Ok(VertexSort::Natural),
            1 => Ok(VertexSort::ByRegularName),
            2 => Ok(VertexSort::ByFullyQualifiedName),
            _ => Err(KometError::Serialization(format!(
                "Invalid vertex sort byte {byte}"
            ))),
        }
    }
}
