//! The index boundary: free-text and exact lookups over description and identifier semantics.
//!
//! Lookups are best effort. A missing index degrades alternate-identifier resolution to "not
//! found".

use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

use crate::{
    calculator::RelativePositionCalculator,
    chronology::{Chronology, VersionData},
    commit::{CommitListener, CommitRecord},
    error::KometError,
    identifier::Nid,
    store::ChronologyStore,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IndexHit {
    pub semantic: Nid,
    pub referenced_component: Nid,
    pub assemblage: Nid,
}

pub trait IndexService: Send + Sync {
    /// Semantics whose text contains every token of `text` (as a token prefix).
    fn query(&self, text: &str, limit: usize) -> Vec<IndexHit>;

    /// Semantics of `assemblage` whose normalised text equals `value`.
    fn exact(&self, assemblage: Nid, value: &str) -> Vec<IndexHit>;

    /// Index every version of `chronology`. Returns false when it carries no indexable text.
    fn index(&self, chronology: &Chronology) -> bool;
}

#[derive(Debug, Default)]
struct IndexState {
    tokens: BTreeMap<String, BTreeSet<Nid>>,
    exact: HashMap<(Nid, String), BTreeSet<Nid>>,
    entries: HashMap<Nid, IndexHit>,
}

/// In-memory [IndexService] over description and identifier text. Text is NFKD-normalised,
/// stripped of combining marks and lowercased before tokenising.
#[derive(Debug)]
pub struct DescriptionIndexer {
    token_pattern: Regex,
    state: RwLock<IndexState>,
}

impl DescriptionIndexer {
    pub fn new() -> Result<Self, KometError> {
        Ok(DescriptionIndexer {
            token_pattern: Regex::new(r"[\p{L}\p{N}]+")?,
            state: RwLock::new(IndexState::default()),
        })
    }

    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn tokens(&self, text: &str) -> Vec<String> {
        let normalized = normalize(text);
        self.token_pattern
            .find_iter(&normalized)
            .map(|m| m.as_str().to_string())
            .collect()
    }
}

pub fn normalize(text: &str) -> String {
    text.nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
}

fn indexable_text(data: &VersionData) -> Option<&str> {
    match data {
        VersionData::Description(description) => Some(description.text.as_str()),
        VersionData::Identifier(value) => Some(value.as_str()),
        _ => None,
    }
}

impl IndexService for DescriptionIndexer {
    fn query(&self, text: &str, limit: usize) -> Vec<IndexHit> {
        let wanted = self.tokens(text);
        if wanted.is_empty() {
            return Vec::new();
        }
        let state = self.state.read();
        let mut matched: Option<BTreeSet<Nid>> = None;
        for token in &wanted {
            let with_prefix = state
                .tokens
                .range(token.clone()..)
                .take_while(|(indexed, _)| indexed.starts_with(token.as_str()))
                .flat_map(|(_, nids)| nids.iter().copied())
                .collect::<BTreeSet<_>>();
            matched = Some(match matched {
                Some(so_far) => so_far.intersection(&with_prefix).copied().collect(),
                None => with_prefix,
            });
        }
        matched
            .unwrap_or_default()
            .into_iter()
            .filter_map(|nid| state.entries.get(&nid).copied())
            .take(limit)
            .collect()
    }

    fn exact(&self, assemblage: Nid, value: &str) -> Vec<IndexHit> {
        let state = self.state.read();
        state
            .exact
            .get(&(assemblage, normalize(value)))
            .map(|nids| {
                nids.iter()
                    .filter_map(|nid| state.entries.get(nid).copied())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn index(&self, chronology: &Chronology) -> bool {
        let (Some(assemblage), Some(referenced_component)) =
            (chronology.assemblage(), chronology.referenced_component())
        else {
            return false;
        };
        let texts = chronology
            .versions()
            .iter()
            .filter_map(|v| indexable_text(&v.data))
            .collect::<BTreeSet<_>>();
        if texts.is_empty() {
            return false;
        }
        let semantic = chronology.nid();
        let tokenized = texts
            .iter()
            .map(|text| (normalize(text), self.tokens(text)))
            .collect::<Vec<_>>();
        let mut state = self.state.write();
        state.entries.insert(
            semantic,
            IndexHit {
                semantic,
                referenced_component,
                assemblage,
            },
        );
        for (normalized, tokens) in tokenized {
            state
                .exact
                .entry((assemblage, normalized))
                .or_default()
                .insert(semantic);
            for token in tokens {
                state.tokens.entry(token).or_default().insert(semantic);
            }
        }
        true
    }
}

impl CommitListener for DescriptionIndexer {
    fn listener_name(&self) -> &str {
        "description index"
    }

    fn handle_commit(&self, record: &CommitRecord, store: &dyn ChronologyStore) {
        let indexed = record
            .semantics
            .iter()
            .filter_map(|nid| store.get_chronology(*nid))
            .filter(|chronology| self.index(chronology))
            .count();
        if indexed > 0 {
            tracing::debug!("Indexed {indexed} semantic(s) from {}", record.transaction_name);
        }
    }
}

/// Component identified by `value` in an identifier assemblage such as SCTID or VUID. The hit
/// must still be an active identifier with that value under `calc`.
pub fn resolve_alternate_identifier(
    index: Option<&dyn IndexService>,
    store: &dyn ChronologyStore,
    calc: &RelativePositionCalculator,
    assemblage: Nid,
    value: &str,
) -> Option<Nid> {
    let Some(index) = index else {
        tracing::debug!("No index service; identifier {value} not resolved");
        return None;
    };
    index.exact(assemblage, value).into_iter().find_map(|hit| {
        let latest = store.get_latest_version(hit.semantic, calc);
        let version = latest.get()?;
        match &version.data {
            VersionData::Identifier(current)
                if version.stamp.status.is_active() && current.trim() == value.trim() =>
            {
                Some(hit.referenced_component)
            }
            _ => None,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        chronology::{DescriptionData, Version},
        coordinate::StampFilter,
        identifier::uuid_from_name,
        metadata::{
            CORE_MODULE, DEVELOPMENT_PATH, ENGLISH_DESCRIPTION_ASSEMBLAGE, ENGLISH_LANGUAGE,
            REGULAR_NAME_DESCRIPTION_TYPE, SCTID_ASSEMBLAGE, USER,
        },
        stamp::{PathRegistry, Stamp, Status},
        store::InMemoryStore,
    };
    use test_log::test;

    fn stamp(status: Status, time: i64) -> Stamp {
        Stamp::new(status, time, USER.nid, CORE_MODULE.nid, DEVELOPMENT_PATH.nid).unwrap()
    }

    fn description(nid: i32, concept: i32, text: &str) -> Chronology {
        Chronology::new_semantic(
            Nid::new(nid),
            uuid_from_name(text),
            ENGLISH_DESCRIPTION_ASSEMBLAGE.nid,
            Nid::new(concept),
        )
        .with_version(Version::new(
            stamp(Status::Active, 1),
            VersionData::Description(DescriptionData::new(
                text,
                ENGLISH_LANGUAGE.nid,
                REGULAR_NAME_DESCRIPTION_TYPE.nid,
            )),
        ))
    }

    fn sctid(nid: i32, concept: i32, value: &str, status: Status) -> Chronology {
        Chronology::new_semantic(
            Nid::new(nid),
            uuid_from_name(value),
            SCTID_ASSEMBLAGE.nid,
            Nid::new(concept),
        )
        .with_version(Version::new(
            stamp(status, 1),
            VersionData::Identifier(value.to_string()),
        ))
    }

    #[test]
    fn test_query_normalises_and_matches_prefixes() {
        let index = DescriptionIndexer::new().unwrap();
        assert!(index.index(&description(1_001, 1_000, "Diabetes mellitus")));
        assert!(index.index(&description(1_003, 1_002, "Ménière's disease")));
        assert!(!index.index(&Chronology::new_concept(Nid::new(1_000), uuid_from_name("c"))));

        let hits = index.query("diab MELL", 10);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].referenced_component, Nid::new(1_000));
        assert_eq!(index.query("meniere", 10)[0].semantic, Nid::new(1_003));
        assert!(index.query("mellitus disease", 10).is_empty());
        assert!(index.query("  ", 10).is_empty());
    }

    #[test]
    fn test_alternate_identifier_resolution() {
        let store = InMemoryStore::new();
        let registry = PathRegistry::with_defaults();
        let calc = registry.calculator(&StampFilter::development_latest()).unwrap();
        let index = DescriptionIndexer::new().unwrap();
        for chronology in [
            sctid(1_001, 1_000, "73211009", Status::Active),
            sctid(1_003, 1_002, "44054006", Status::Inactive),
        ] {
            index.index(&chronology);
            store.write(chronology).unwrap();
        }
        let resolve = |value: &str| {
            resolve_alternate_identifier(Some(&index), &store, &calc, SCTID_ASSEMBLAGE.nid, value)
        };
        assert_eq!(resolve("73211009"), Some(Nid::new(1_000)));
        assert_eq!(resolve("44054006"), None);
        assert_eq!(resolve("0"), None);
        assert_eq!(
            resolve_alternate_identifier(None, &store, &calc, SCTID_ASSEMBLAGE.nid, "73211009"),
            None
        );
    }
}
