//! The persistence boundary: append-only chronology storage keyed by nid.

use parking_lot::RwLock;
use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};

use crate::{
    calculator::{LatestVersion, RelativePositionCalculator},
    chronology::{Chronology, ChronologyKind, Version},
    error::KometError,
    identifier::Nid,
};

pub trait ChronologyStore: Send + Sync {
    /// Merge a concept chronology into the store.
    fn write_concept(&self, chronology: Chronology) -> Result<(), KometError>;

    /// Merge a semantic chronology into the store.
    fn write_semantic(&self, chronology: Chronology) -> Result<(), KometError>;

    fn get_chronology(&self, nid: Nid) -> Option<Arc<Chronology>>;

    fn concept_nids(&self) -> Vec<Nid>;

    fn semantic_nids_for_component(&self, component: Nid) -> Vec<Nid>;

    fn semantic_nids_for_component_of_assemblage(&self, component: Nid, assemblage: Nid) -> Vec<Nid>;

    fn semantic_nids_of_assemblage(&self, assemblage: Nid) -> Vec<Nid>;

    fn contains(&self, nid: Nid) -> bool {
        self.get_chronology(nid).is_some()
    }

    /// Absent for unknown nids.
    fn get_latest_version(&self, nid: Nid, calc: &RelativePositionCalculator) -> LatestVersion<Version> {
        self.get_chronology(nid)
            .map(|chronology| chronology.latest_version(calc))
            .unwrap_or_default()
    }

    /// Write either kind of chronology.
    fn write(&self, chronology: Chronology) -> Result<(), KometError> {
        if chronology.is_concept() {
            self.write_concept(chronology)
        } else {
            self.write_semantic(chronology)
        }
    }
}

#[derive(Debug, Default)]
struct StoreState {
    chronologies: HashMap<Nid, Arc<Chronology>>,
    concepts: BTreeSet<Nid>,
    by_component: HashMap<Nid, BTreeSet<Nid>>,
    by_component_assemblage: HashMap<(Nid, Nid), BTreeSet<Nid>>,
    by_assemblage: HashMap<Nid, BTreeSet<Nid>>,
}

/// [ChronologyStore] held in memory with secondary indices by referenced component and
/// assemblage. Readers get `Arc` snapshots, so a write never changes a chronology a reader
/// already holds.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<StoreState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.state.read().chronologies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn merge_in(&self, chronology: Chronology) -> Result<(), KometError> {
        if chronology.has_uncommitted() {
            return Err(KometError::Integrity(format!(
                "{chronology} has uncommitted versions; only committed versions are stored"
            )));
        }
        let mut state = self.state.write();
        let nid = chronology.nid();
        let merged = match state.chronologies.get(&nid) {
            Some(existing) => {
                let mut merged = Chronology::clone(existing);
                let added = merged.merge(&chronology)?;
                tracing::debug!("Merged {added} version(s) into {merged}");
                merged
            }
            None => chronology,
        };
        match merged.kind() {
            ChronologyKind::Concept => {
                state.concepts.insert(nid);
            }
            ChronologyKind::Semantic {
                assemblage,
                referenced_component,
            } => {
                state
                    .by_component
                    .entry(referenced_component)
                    .or_default()
                    .insert(nid);
                state
                    .by_component_assemblage
                    .entry((referenced_component, assemblage))
                    .or_default()
                    .insert(nid);
                state.by_assemblage.entry(assemblage).or_default().insert(nid);
            }
        }
        state.chronologies.insert(nid, Arc::new(merged));
        Ok(())
    }
}

fn listed(index: Option<&BTreeSet<Nid>>) -> Vec<Nid> {
    index.map(|nids| nids.iter().copied().collect()).unwrap_or_default()
}

impl ChronologyStore for InMemoryStore {
    fn write_concept(&self, chronology: Chronology) -> Result<(), KometError> {
        if !chronology.is_concept() {
            return Err(KometError::Integrity(format!(
                "write_concept called with {chronology}"
            )));
        }
        self.merge_in(chronology)
    }

    fn write_semantic(&self, chronology: Chronology) -> Result<(), KometError> {
        if chronology.is_concept() {
            return Err(KometError::Integrity(format!(
                "write_semantic called with {chronology}"
            )));
        }
        self.merge_in(chronology)
    }

    fn get_chronology(&self, nid: Nid) -> Option<Arc<Chronology>> {
        self.state.read().chronologies.get(&nid).cloned()
    }

    fn concept_nids(&self) -> Vec<Nid> {
        self.state.read().concepts.iter().copied().collect()
    }

    fn semantic_nids_for_component(&self, component: Nid) -> Vec<Nid> {
        listed(self.state.read().by_component.get(&component))
    }

    fn semantic_nids_for_component_of_assemblage(&self, component: Nid, assemblage: Nid) -> Vec<Nid> {
        listed(
            self.state
                .read()
                .by_component_assemblage
                .get(&(component, assemblage)),
        )
    }

    fn semantic_nids_of_assemblage(&self, assemblage: Nid) -> Vec<Nid> {
        listed(self.state.read().by_assemblage.get(&assemblage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        chronology::{DescriptionData, VersionData},
        identifier::uuid_from_name,
        metadata::{
            CORE_MODULE, DEVELOPMENT_PATH, ENGLISH_DESCRIPTION_ASSEMBLAGE, ENGLISH_LANGUAGE,
            REGULAR_NAME_DESCRIPTION_TYPE, USER,
        },
        stamp::{Stamp, Status, LATEST},
    };
    use test_log::test;

    fn stamp(time: i64) -> Stamp {
        Stamp::new(Status::Active, time, USER.nid, CORE_MODULE.nid, DEVELOPMENT_PATH.nid).unwrap()
    }

    #[test]
    fn test_indices() {
        let store = InMemoryStore::new();
        let concept = Nid::new(1_000);
        let description = Nid::new(1_001);
        store
            .write_concept(
                Chronology::new_concept(concept, uuid_from_name("A"))
                    .with_version(Version::new(stamp(1), VersionData::Concept)),
            )
            .unwrap();
        store
            .write_semantic(
                Chronology::new_semantic(
                    description,
                    uuid_from_name("A name"),
                    ENGLISH_DESCRIPTION_ASSEMBLAGE.nid,
                    concept,
                )
                .with_version(Version::new(
                    stamp(1),
                    VersionData::Description(DescriptionData::new(
                        "A",
                        ENGLISH_LANGUAGE.nid,
                        REGULAR_NAME_DESCRIPTION_TYPE.nid,
                    )),
                )),
            )
            .unwrap();
        assert_eq!(store.concept_nids(), vec![concept]);
        assert_eq!(store.semantic_nids_for_component(concept), vec![description]);
        assert_eq!(
            store.semantic_nids_for_component_of_assemblage(concept, ENGLISH_DESCRIPTION_ASSEMBLAGE.nid),
            vec![description]
        );
        assert!(store.semantic_nids_of_assemblage(Nid::new(77)).is_empty());
    }

    #[test]
    fn test_writes_merge_and_readers_keep_snapshots() {
        let store = InMemoryStore::new();
        let nid = Nid::new(1_000);
        store
            .write_concept(
                Chronology::new_concept(nid, uuid_from_name("A"))
                    .with_version(Version::new(stamp(1), VersionData::Concept)),
            )
            .unwrap();
        let before = store.get_chronology(nid).unwrap();
        store
            .write_concept(
                Chronology::new_concept(nid, uuid_from_name("A"))
                    .with_version(Version::new(stamp(2), VersionData::Concept)),
            )
            .unwrap();
        assert_eq!(before.versions().len(), 1);
        assert_eq!(store.get_chronology(nid).unwrap().versions().len(), 2);
    }

    #[test]
    fn test_kind_mismatch_is_integrity_error() {
        let store = InMemoryStore::new();
        let semantic = Chronology::new_semantic(
            Nid::new(1_001),
            uuid_from_name("x"),
            ENGLISH_DESCRIPTION_ASSEMBLAGE.nid,
            Nid::new(1_000),
        );
        assert!(matches!(
            store.write_concept(semantic),
            Err(KometError::Integrity(_))
        ));
    }

    #[test]
    fn test_uncommitted_versions_are_rejected() {
        let store = InMemoryStore::new();
        let nid = Nid::new(1_000);
        let uncommitted = Stamp::new(
            Status::Active,
            LATEST,
            USER.nid,
            CORE_MODULE.nid,
            DEVELOPMENT_PATH.nid,
        )
        .unwrap();
        let chronology = Chronology::new_concept(nid, uuid_from_name("A"))
            .with_version(Version::new(stamp(1), VersionData::Concept))
            .with_version(Version::new(uncommitted, VersionData::Concept));
        assert!(matches!(
            store.write(chronology),
            Err(KometError::Integrity(_))
        ));
        assert!(!store.contains(nid));
        assert!(store.is_empty());
    }
}
