//! Component versions and their append-only histories.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use crate::{
    calculator::{LatestVersion, RelativePositionCalculator, Stamped},
    error::KometError,
    identifier::{Nid, Uuid},
    logic::LogicalExpression,
    metadata::METADATA,
    stamp::Stamp,
};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DescriptionData {
    pub text: String,
    pub language: Nid,
    pub description_type: Nid,
    pub case_significant: bool,
}

impl DescriptionData {
    pub fn new(text: impl Into<String>, language: Nid, description_type: Nid) -> Self {
        DescriptionData {
            text: text.into(),
            language,
            description_type,
            case_significant: false,
        }
    }
}

/// Payload of one version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VersionData {
    /// Concepts carry no payload beyond their stamp.
    Concept,
    Description(DescriptionData),
    /// Dialect acceptability of the referenced description (PREFERRED or ACCEPTABLE).
    Acceptability { acceptability: Nid },
    LogicGraph(LogicalExpression),
    /// Alternate identifier such as an SCTID or VUID.
    Identifier(String),
    Membership,
}

impl VersionData {
    pub fn kind_name(&self) -> &'static str {
        match self {
            VersionData::Concept => "concept",
            VersionData::Description(_) => "description",
            VersionData::Acceptability { .. } => "acceptability",
            VersionData::LogicGraph(_) => "logic graph",
            VersionData::Identifier(_) => "identifier",
            VersionData::Membership => "membership",
        }
    }

    pub fn as_logic_graph(&self) -> Option<&LogicalExpression> {
        match self {
            VersionData::LogicGraph(expression) => Some(expression),
            _ => None,
        }
    }

    pub fn as_description(&self) -> Option<&DescriptionData> {
        match self {
            VersionData::Description(description) => Some(description),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
    pub stamp: Stamp,
    pub data: VersionData,
}

impl Version {
    pub fn new(stamp: Stamp, data: VersionData) -> Self {
        Version { stamp, data }
    }
}

impl Stamped for Version {
    fn stamp(&self) -> &Stamp {
        &self.stamp
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChronologyKind {
    Concept,
    Semantic {
        assemblage: Nid,
        referenced_component: Nid,
    },
}

/// The full version history of one component, ordered by stamp time. Versions with equal
/// times keep the order they were added in, and versions are never removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chronology {
    nid: Nid,
    uuid: Uuid,
    kind: ChronologyKind,
    versions: Vec<Version>,
}

impl Chronology {
    pub fn new_concept(nid: Nid, uuid: Uuid) -> Self {
        Chronology {
            nid,
            uuid,
            kind: ChronologyKind::Concept,
            versions: Vec::new(),
        }
    }

    pub fn new_semantic(nid: Nid, uuid: Uuid, assemblage: Nid, referenced_component: Nid) -> Self {
        Chronology {
            nid,
            uuid,
            kind: ChronologyKind::Semantic {
                assemblage,
                referenced_component,
            },
            versions: Vec::new(),
        }
    }

    pub fn nid(&self) -> Nid {
        self.nid
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn kind(&self) -> ChronologyKind {
        self.kind
    }

    pub fn is_concept(&self) -> bool {
        self.kind == ChronologyKind::Concept
    }

    pub fn assemblage(&self) -> Option<Nid> {
        match self.kind {
            ChronologyKind::Semantic { assemblage, .. } => Some(assemblage),
            ChronologyKind::Concept => None,
        }
    }

    pub fn referenced_component(&self) -> Option<Nid> {
        match self.kind {
            ChronologyKind::Semantic {
                referenced_component,
                ..
            } => Some(referenced_component),
            ChronologyKind::Concept => None,
        }
    }

    pub fn versions(&self) -> &[Version] {
        &self.versions
    }

    /// Insert `version` after every version with the same or an earlier time.
    pub fn add_version(&mut self, version: Version) -> &mut Self {
        let at = self
            .versions
            .partition_point(|v| v.stamp.time <= version.stamp.time);
        self.versions.insert(at, version);
        self
    }

    pub fn with_version(mut self, version: Version) -> Self {
        self.add_version(version);
        self
    }

    /// Append the versions of `other` this chronology does not already hold. Returns how many
    /// were added. Merging chronologies of different components or kinds is an integrity
    /// error.
    pub fn merge(&mut self, other: &Chronology) -> Result<usize, KometError> {
        if other.nid != self.nid || other.kind != self.kind {
            return Err(KometError::Integrity(format!(
                "Cannot merge {} into {}",
                other, self
            )));
        }
        let mut added = 0;
        for version in &other.versions {
            if !self.versions.contains(version) {
                self.add_version(version.clone());
                added += 1;
            }
        }
        Ok(added)
    }

    pub fn latest_version(&self, calc: &RelativePositionCalculator) -> LatestVersion<Version> {
        calc.latest_version(&self.versions)
    }

    pub fn has_uncommitted(&self) -> bool {
        self.versions.iter().any(|v| v.stamp.is_uncommitted())
    }
}

impl Display for Chronology {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            ChronologyKind::Concept => write!(f, "concept {} ({})", self.nid, self.uuid),
            ChronologyKind::Semantic {
                assemblage,
                referenced_component,
            } => write!(
                f,
                "{} semantic {} on {} ({})",
                METADATA.name_of(assemblage),
                self.nid,
                referenced_component,
                self.uuid
            ),
        }
    }
}
