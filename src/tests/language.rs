//! Description resolution through language coordinates.

use super::helpers::*;
use crate::{
    chronology::{DescriptionData, VersionData},
    coordinate::{LanguageCoordinate, StampFilter},
    identifier::Nid,
    metadata::{
        ACCEPTABLE, DEFINITION_DESCRIPTION_TYPE, DEVELOPMENT_PATH, ENGLISH_DESCRIPTION_ASSEMBLAGE,
        ENGLISH_LANGUAGE, FULLY_QUALIFIED_NAME_DESCRIPTION_TYPE, GB_DIALECT_ASSEMBLAGE, PREFERRED,
        REGULAR_NAME_DESCRIPTION_TYPE, SPANISH_DIALECT_ASSEMBLAGE, SPANISH_LANGUAGE,
        US_DIALECT_ASSEMBLAGE,
    },
    stamp::Status,
};
use test_log::test;

/// Diabetes with US and GB regular names and an English fully qualified name.
fn diabetes(terminology: &Terminology) -> Nid {
    let concept = terminology.concept("Diabetes mellitus (disorder)");
    terminology.description(
        concept,
        "Diabetes mellitus (disorder)",
        ENGLISH_LANGUAGE.nid,
        FULLY_QUALIFIED_NAME_DESCRIPTION_TYPE.nid,
    );
    let us = terminology.description(
        concept,
        "Diabetes mellitus",
        ENGLISH_LANGUAGE.nid,
        REGULAR_NAME_DESCRIPTION_TYPE.nid,
    );
    terminology.acceptability(us, US_DIALECT_ASSEMBLAGE.nid, PREFERRED.nid);
    terminology.acceptability(us, GB_DIALECT_ASSEMBLAGE.nid, ACCEPTABLE.nid);
    let gb = terminology.description(
        concept,
        "Sugar diabetes",
        ENGLISH_LANGUAGE.nid,
        REGULAR_NAME_DESCRIPTION_TYPE.nid,
    );
    terminology.acceptability(gb, GB_DIALECT_ASSEMBLAGE.nid, PREFERRED.nid);
    terminology.acceptability(gb, US_DIALECT_ASSEMBLAGE.nid, ACCEPTABLE.nid);
    concept
}

#[test]
fn test_dialect_preference_picks_the_regular_name() {
    let terminology = Terminology::new();
    let concept = diabetes(&terminology);
    let calc = terminology
        .paths
        .calculator(&StampFilter::development_latest_active_only())
        .unwrap();
    let store = terminology.store();

    let us = LanguageCoordinate::us_english_regular_name();
    assert_eq!(
        us.regular_name_text(concept, store.as_ref(), &calc).as_deref(),
        Some("Diabetes mellitus")
    );
    assert_eq!(
        us.preferred_description_text(concept, store.as_ref(), &calc).as_deref(),
        Some("Diabetes mellitus")
    );
    assert_eq!(
        us.fully_qualified_name_text(concept, store.as_ref(), &calc).as_deref(),
        Some("Diabetes mellitus (disorder)")
    );

    let gb = LanguageCoordinate::gb_english_regular_name();
    assert_eq!(
        gb.regular_name_text(concept, store.as_ref(), &calc).as_deref(),
        Some("Sugar diabetes")
    );
}

#[test]
fn test_definitions_never_fall_back_to_names() {
    let terminology = Terminology::new();
    let concept = diabetes(&terminology);
    let calc = terminology
        .paths
        .calculator(&StampFilter::development_latest_active_only())
        .unwrap();
    let store = terminology.store();
    let us = LanguageCoordinate::us_english_regular_name();
    assert_eq!(us.definition_text(concept, store.as_ref(), &calc), None);

    terminology.description(
        concept,
        "A metabolic disorder of glucose regulation",
        ENGLISH_LANGUAGE.nid,
        DEFINITION_DESCRIPTION_TYPE.nid,
    );
    assert_eq!(
        us.definition_text(concept, store.as_ref(), &calc).as_deref(),
        Some("A metabolic disorder of glucose regulation")
    );
}

#[test]
fn test_language_fallback_chain() {
    let terminology = Terminology::new();
    let concept = diabetes(&terminology);
    let calc = terminology
        .paths
        .calculator(&StampFilter::development_latest_active_only())
        .unwrap();
    let store = terminology.store();
    let spanish = LanguageCoordinate::spanish_with_english_fallback();
    assert_eq!(
        spanish
            .regular_name_text(concept, store.as_ref(), &calc)
            .as_deref(),
        Some("Diabetes mellitus")
    );

    let nombre = terminology.description(
        concept,
        "Diabetes sacarina",
        SPANISH_LANGUAGE.nid,
        REGULAR_NAME_DESCRIPTION_TYPE.nid,
    );
    terminology.acceptability(nombre, SPANISH_DIALECT_ASSEMBLAGE.nid, PREFERRED.nid);
    assert_eq!(
        spanish
            .regular_name_text(concept, store.as_ref(), &calc)
            .as_deref(),
        Some("Diabetes sacarina")
    );
}

#[test]
fn test_fallback_uses_its_own_type_preferences() {
    let terminology = Terminology::new();
    let concept = diabetes(&terminology);
    let calc = terminology
        .paths
        .calculator(&StampFilter::development_latest_active_only())
        .unwrap();
    let store = terminology.store();
    let spanish_fqn = LanguageCoordinate::new(
        SPANISH_LANGUAGE.nid,
        vec![SPANISH_DIALECT_ASSEMBLAGE.nid],
        vec![FULLY_QUALIFIED_NAME_DESCRIPTION_TYPE.nid],
        vec![],
        Some(LanguageCoordinate::us_english_regular_name()),
    )
    .unwrap();
    // No Spanish names, so the US coordinate answers with its regular name first.
    assert_eq!(
        spanish_fqn
            .preferred_description_text(concept, store.as_ref(), &calc)
            .as_deref(),
        Some("Diabetes mellitus")
    );
    // An explicit type order still applies along the whole chain.
    assert_eq!(
        spanish_fqn
            .fully_qualified_name_text(concept, store.as_ref(), &calc)
            .as_deref(),
        Some("Diabetes mellitus (disorder)")
    );

    terminology.description(
        concept,
        "Diabetes mellitus (trastorno)",
        SPANISH_LANGUAGE.nid,
        FULLY_QUALIFIED_NAME_DESCRIPTION_TYPE.nid,
    );
    assert_eq!(
        spanish_fqn
            .preferred_description_text(concept, store.as_ref(), &calc)
            .as_deref(),
        Some("Diabetes mellitus (trastorno)")
    );
}

#[test]
fn test_retired_description_is_not_shown() {
    let terminology = Terminology::new();
    let concept = diabetes(&terminology);
    // Retire the US regular name; the GB name is acceptable in the US dialect.
    terminology.semantic(
        concept,
        "Diabetes mellitus",
        ENGLISH_DESCRIPTION_ASSEMBLAGE.nid,
        stamp(Status::Inactive, 20, DEVELOPMENT_PATH.nid),
        VersionData::Description(DescriptionData::new(
            "Diabetes mellitus",
            ENGLISH_LANGUAGE.nid,
            REGULAR_NAME_DESCRIPTION_TYPE.nid,
        )),
    );
    let store = terminology.store();
    let us = LanguageCoordinate::us_english_regular_name();

    let calc = terminology
        .paths
        .calculator(&StampFilter::development_latest())
        .unwrap();
    assert_eq!(
        us.regular_name_text(concept, store.as_ref(), &calc).as_deref(),
        Some("Sugar diabetes")
    );

    // Viewed before the retirement, the US name is still preferred.
    let calc = terminology
        .paths
        .calculator(&StampFilter::development_latest_active_only().make_coordinate_analog(15))
        .unwrap();
    assert_eq!(
        us.regular_name_text(concept, store.as_ref(), &calc).as_deref(),
        Some("Diabetes mellitus")
    );
}

#[test]
fn test_concept_without_descriptions_has_no_name() {
    let terminology = Terminology::new();
    let concept = terminology.concept("Unnamed");
    let calc = terminology
        .paths
        .calculator(&StampFilter::development_latest_active_only())
        .unwrap();
    let us = LanguageCoordinate::us_english_regular_name();
    assert_eq!(
        us.regular_name_text(concept, terminology.store().as_ref(), &calc),
        None
    );
}
