use serde::{Deserialize, Serialize};
use std::{
    cmp::Reverse,
    fmt::{Display, Formatter},
};

use super::marshal::{MarshalReader, MarshalWriter, Marshalable, MAX_MARSHAL_NESTING};
use crate::{
    calculator::RelativePositionCalculator,
    chronology::{DescriptionData, VersionData},
    error::KometError,
    identifier::Nid,
    metadata::{
        ACCEPTABLE, DEFINITION_DESCRIPTION_TYPE, ENGLISH_LANGUAGE,
        FULLY_QUALIFIED_NAME_DESCRIPTION_TYPE, GB_DIALECT_ASSEMBLAGE, LANGUAGE, METADATA,
        PREFERRED, REGULAR_NAME_DESCRIPTION_TYPE, SPANISH_DIALECT_ASSEMBLAGE, SPANISH_LANGUAGE,
        US_DIALECT_ASSEMBLAGE,
    },
    stamp::Stamp,
    store::ChronologyStore,
};

/// Chooses which description of a concept is shown: the language, dialect acceptability order,
/// description type order and module order, with an optional coordinate to fall back to when
/// this one finds nothing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LanguageCoordinate {
    language: Nid,
    dialect_preferences: Vec<Nid>,
    description_type_preferences: Vec<Nid>,
    module_preferences: Vec<Nid>,
    next_priority: Option<Box<LanguageCoordinate>>,
}

/// A description chosen by a [LanguageCoordinate].
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedDescription {
    pub semantic: Nid,
    pub stamp: Stamp,
    pub description: DescriptionData,
}

impl ResolvedDescription {
    pub fn text(&self) -> &str {
        &self.description.text
    }
}

impl LanguageCoordinate {
    pub fn new(
        language: Nid,
        dialect_preferences: Vec<Nid>,
        description_type_preferences: Vec<Nid>,
        module_preferences: Vec<Nid>,
        next_priority: Option<LanguageCoordinate>,
    ) -> Result<Self, KometError> {
        if !language.is_initialized() {
            return Err(KometError::Configuration(
                "Language coordinate has no language".to_string(),
            ));
        }
        if description_type_preferences.is_empty() {
            return Err(KometError::Configuration(format!(
                "Language coordinate for {} has no description type preferences",
                METADATA.name_of(language)
            )));
        }
        let fallbacks = next_priority.as_ref().map_or(0, |next| 1 + next.fallback_count());
        if fallbacks > MAX_MARSHAL_NESTING {
            return Err(KometError::Configuration(format!(
                "Language coordinate for {} has {fallbacks} fallbacks; at most \
                 {MAX_MARSHAL_NESTING} are supported",
                METADATA.name_of(language)
            )));
        }
        Ok(LanguageCoordinate {
            language,
            dialect_preferences,
            description_type_preferences,
            module_preferences,
            next_priority: next_priority.map(Box::new),
        })
    }

    fn preset(language: Nid, dialects: Vec<Nid>, types: Vec<Nid>) -> Self {
        LanguageCoordinate {
            language,
            dialect_preferences: dialects,
            description_type_preferences: types,
            module_preferences: Vec::new(),
            next_priority: None,
        }
    }

    pub fn us_english_regular_name() -> Self {
        Self::preset(
            ENGLISH_LANGUAGE.nid,
            vec![US_DIALECT_ASSEMBLAGE.nid, GB_DIALECT_ASSEMBLAGE.nid],
            vec![
                REGULAR_NAME_DESCRIPTION_TYPE.nid,
                FULLY_QUALIFIED_NAME_DESCRIPTION_TYPE.nid,
                DEFINITION_DESCRIPTION_TYPE.nid,
            ],
        )
    }

    pub fn us_english_fully_qualified_name() -> Self {
        Self::preset(
            ENGLISH_LANGUAGE.nid,
            vec![US_DIALECT_ASSEMBLAGE.nid, GB_DIALECT_ASSEMBLAGE.nid],
            vec![
                FULLY_QUALIFIED_NAME_DESCRIPTION_TYPE.nid,
                REGULAR_NAME_DESCRIPTION_TYPE.nid,
                DEFINITION_DESCRIPTION_TYPE.nid,
            ],
        )
    }

    pub fn gb_english_regular_name() -> Self {
        Self::preset(
            ENGLISH_LANGUAGE.nid,
            vec![GB_DIALECT_ASSEMBLAGE.nid, US_DIALECT_ASSEMBLAGE.nid],
            vec![
                REGULAR_NAME_DESCRIPTION_TYPE.nid,
                FULLY_QUALIFIED_NAME_DESCRIPTION_TYPE.nid,
                DEFINITION_DESCRIPTION_TYPE.nid,
            ],
        )
    }

    /// Spanish first, then US English.
    pub fn spanish_with_english_fallback() -> Self {
        let mut spanish = Self::preset(
            SPANISH_LANGUAGE.nid,
            vec![SPANISH_DIALECT_ASSEMBLAGE.nid],
            vec![
                REGULAR_NAME_DESCRIPTION_TYPE.nid,
                FULLY_QUALIFIED_NAME_DESCRIPTION_TYPE.nid,
                DEFINITION_DESCRIPTION_TYPE.nid,
            ],
        );
        spanish.next_priority = Some(Box::new(Self::us_english_regular_name()));
        spanish
    }

    pub fn language(&self) -> Nid {
        self.language
    }

    pub fn dialect_preferences(&self) -> &[Nid] {
        &self.dialect_preferences
    }

    pub fn description_type_preferences(&self) -> &[Nid] {
        &self.description_type_preferences
    }

    pub fn module_preferences(&self) -> &[Nid] {
        &self.module_preferences
    }

    pub fn next_priority(&self) -> Option<&LanguageCoordinate> {
        self.next_priority.as_deref()
    }

    /// Length of the next-priority chain below this coordinate.
    pub fn fallback_count(&self) -> usize {
        std::iter::successors(self.next_priority(), |c| c.next_priority()).count()
    }

    pub fn with_description_type_preferences(&self, types: Vec<Nid>) -> Result<Self, KometError> {
        LanguageCoordinate::new(
            self.language,
            self.dialect_preferences.clone(),
            types,
            self.module_preferences.clone(),
            self.next_priority.as_deref().cloned(),
        )
    }

    pub fn with_module_preferences(&self, modules: Vec<Nid>) -> Self {
        LanguageCoordinate {
            module_preferences: modules,
            ..self.clone()
        }
    }

    pub fn with_next_priority(&self, next: Option<LanguageCoordinate>) -> Self {
        LanguageCoordinate {
            next_priority: next.map(Box::new),
            ..self.clone()
        }
    }

    /// [LANGUAGE] is the any-language wildcard.
    pub fn matches_language(&self, language: Nid) -> bool {
        self.language == LANGUAGE.nid || self.language == language
    }

    fn module_rank(&self, module: Nid) -> usize {
        self.module_preferences
            .iter()
            .position(|m| *m == module)
            .unwrap_or(self.module_preferences.len())
    }

    /// Best description of `concept` for `type_preferences`.
    ///
    /// Types are tried in order; the first type with a candidate in this coordinate's language
    /// wins. Within a type, candidates PREFERRED in an earlier dialect beat later dialects,
    /// PREFERRED beats ACCEPTABLE, and module preference breaks the remaining ties. When no
    /// type yields a candidate the next-priority coordinate is tried, and when the whole chain
    /// is exhausted any active description in any language is returned rather than nothing.
    pub fn get_description(
        &self,
        concept: Nid,
        type_preferences: &[Nid],
        store: &dyn ChronologyStore,
        calc: &RelativePositionCalculator,
    ) -> Option<ResolvedDescription> {
        self.describe(concept, Some(type_preferences), store, calc)
    }

    /// `type_preferences` of `None` lets every coordinate in the chain use its own.
    fn describe(
        &self,
        concept: Nid,
        type_preferences: Option<&[Nid]>,
        store: &dyn ChronologyStore,
        calc: &RelativePositionCalculator,
    ) -> Option<ResolvedDescription> {
        let candidates = active_descriptions(concept, store, calc);
        if candidates.is_empty() {
            return None;
        }
        if let Some(found) = self.resolve_chain(&candidates, type_preferences, store, calc) {
            return Some(found);
        }
        let type_preferences =
            type_preferences.unwrap_or(self.description_type_preferences.as_slice());
        tracing::debug!(
            "No {} description of {concept} in the language chain, using any active description",
            METADATA.name_of(self.language)
        );
        candidates
            .into_iter()
            .min_by_key(|d| {
                (
                    type_preferences
                        .iter()
                        .position(|t| *t == d.description.description_type)
                        .unwrap_or(type_preferences.len()),
                    self.module_rank(d.stamp.module),
                    Reverse(d.stamp.time),
                    d.semantic,
                )
            })
    }

    fn resolve_chain(
        &self,
        candidates: &[ResolvedDescription],
        type_preferences: Option<&[Nid]>,
        store: &dyn ChronologyStore,
        calc: &RelativePositionCalculator,
    ) -> Option<ResolvedDescription> {
        let types = type_preferences.unwrap_or(self.description_type_preferences.as_slice());
        for description_type in types {
            let matching = candidates
                .iter()
                .filter(|d| {
                    d.description.description_type == *description_type
                        && self.matches_language(d.description.language)
                })
                .collect::<Vec<_>>();
            if matching.is_empty() {
                continue;
            }
            return matching
                .into_iter()
                .min_by_key(|d| {
                    (
                        self.acceptability_rank(d.semantic, store, calc),
                        self.module_rank(d.stamp.module),
                        d.semantic,
                    )
                })
                .cloned();
        }
        self.next_priority
            .as_ref()
            .and_then(|next| next.resolve_chain(candidates, type_preferences, store, calc))
    }

    /// PREFERRED in dialect `i` ranks `i`, ACCEPTABLE in dialect `i` ranks after every
    /// PREFERRED, and descriptions without acceptability in any listed dialect rank last.
    fn acceptability_rank(
        &self,
        description: Nid,
        store: &dyn ChronologyStore,
        calc: &RelativePositionCalculator,
    ) -> usize {
        let dialects = self.dialect_preferences.len();
        let mut rank = 2 * dialects;
        for (i, dialect) in self.dialect_preferences.iter().enumerate() {
            for semantic in store.semantic_nids_for_component_of_assemblage(description, *dialect)
            {
                let latest = store.get_latest_version(semantic, calc);
                let Some(version) = latest.get() else {
                    continue;
                };
                if !version.stamp.status.is_active() {
                    continue;
                }
                if let VersionData::Acceptability { acceptability } = &version.data {
                    if *acceptability == PREFERRED.nid {
                        rank = rank.min(i);
                    } else if *acceptability == ACCEPTABLE.nid {
                        rank = rank.min(dialects + i);
                    }
                }
            }
        }
        rank
    }

    /// Text of the description this coordinate prefers. Each fallback coordinate applies its
    /// own type order.
    pub fn preferred_description_text(
        &self,
        concept: Nid,
        store: &dyn ChronologyStore,
        calc: &RelativePositionCalculator,
    ) -> Option<String> {
        self.describe(concept, None, store, calc)
            .map(|d| d.description.text)
    }

    pub fn regular_name_text(
        &self,
        concept: Nid,
        store: &dyn ChronologyStore,
        calc: &RelativePositionCalculator,
    ) -> Option<String> {
        self.get_description(
            concept,
            &[
                REGULAR_NAME_DESCRIPTION_TYPE.nid,
                FULLY_QUALIFIED_NAME_DESCRIPTION_TYPE.nid,
            ],
            store,
            calc,
        )
        .map(|d| d.description.text)
    }

    pub fn fully_qualified_name_text(
        &self,
        concept: Nid,
        store: &dyn ChronologyStore,
        calc: &RelativePositionCalculator,
    ) -> Option<String> {
        self.get_description(
            concept,
            &[
                FULLY_QUALIFIED_NAME_DESCRIPTION_TYPE.nid,
                REGULAR_NAME_DESCRIPTION_TYPE.nid,
            ],
            store,
            calc,
        )
        .map(|d| d.description.text)
    }

    /// Definitions never fall back to names.
    pub fn definition_text(
        &self,
        concept: Nid,
        store: &dyn ChronologyStore,
        calc: &RelativePositionCalculator,
    ) -> Option<String> {
        let candidates = active_descriptions(concept, store, calc);
        let types = [DEFINITION_DESCRIPTION_TYPE.nid];
        self.resolve_chain(&candidates, Some(types.as_slice()), store, calc)
            .map(|d| d.description.text)
    }

    pub fn to_user_string(&self) -> String {
        let names = |nids: &[Nid]| {
            nids.iter()
                .map(|n| METADATA.name_of(*n))
                .collect::<Vec<_>>()
                .join(", ")
        };
        let mut text = format!(
            "{} [{}] [{}]",
            METADATA.name_of(self.language),
            names(&self.dialect_preferences),
            names(&self.description_type_preferences)
        );
        if let Some(next) = &self.next_priority {
            text.push_str(&format!(" then {}", next.to_user_string()));
        }
        text
    }
}

impl Display for LanguageCoordinate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_user_string())
    }
}

/// Latest visible, active description versions of `concept`.
fn active_descriptions(
    concept: Nid,
    store: &dyn ChronologyStore,
    calc: &RelativePositionCalculator,
) -> Vec<ResolvedDescription> {
    let mut found = Vec::new();
    for semantic in store.semantic_nids_for_component(concept) {
        let latest = store.get_latest_version(semantic, calc);
        if latest.is_contradicted() {
            tracing::warn!(
                "Description {semantic} of concept {concept} is contradicted under {}; using {}",
                calc.filter(),
                latest
                    .get()
                    .map(|v| v.stamp.to_user_string())
                    .unwrap_or_default()
            );
        }
        let Some(version) = latest.into_value() else {
            continue;
        };
        if !version.stamp.status.is_active() {
            continue;
        }
        if let VersionData::Description(description) = version.data {
            found.push(ResolvedDescription {
                semantic,
                stamp: version.stamp,
                description,
            });
        }
    }
    found
}

impl Marshalable for LanguageCoordinate {
    const RECORD: &'static str = "language coordinate";

    fn write_fields(&self, version: u32, out: &mut MarshalWriter) -> Result<(), KometError> {
        if version >= 2 && self.fallback_count() > MAX_MARSHAL_NESTING {
            return Err(KometError::Serialization(format!(
                "{} fallbacks exceed the {MAX_MARSHAL_NESTING} a reader accepts",
                self.fallback_count()
            )));
        }
        out.put_nid(self.language);
        out.put_nid_list(&self.dialect_preferences);
        out.put_nid_list(&self.description_type_preferences);
        out.put_nid_list(&self.module_preferences);
        if version >= 2 {
            match &self.next_priority {
                Some(next) => {
                    out.put_bool(true);
                    next.marshal_into(version, out)?;
                }
                None => out.put_bool(false),
            }
        }
        Ok(())
    }

    fn read_fields(version: u32, input: &mut MarshalReader) -> Result<Self, KometError> {
        let language = input.get_nid()?;
        let dialects = input.get_nid_list()?;
        let types = input.get_nid_list()?;
        let modules = input.get_nid_list()?;
        let next = if version >= 2 && input.get_bool()? {
            Some(input.get_nested::<LanguageCoordinate>()?)
        } else {
            None
        };
        LanguageCoordinate::new(language, dialects, types, modules, next)
    }
}
