//! Shared test utilities for integration tests.
//!
//! Import from integration test files as:
//! ```ignore
//! mod common;
//! ```

use komet_core::{
    chronology::{Chronology, DescriptionData, Version, VersionData},
    commit::Transaction,
    identifier::{uuid_derived_from, uuid_from_name, IdentifierService, Nid},
    logic::LogicalExpressionBuilder,
    metadata::{
        CORE_MODULE, DEVELOPMENT_PATH, EL_PLUS_PLUS_STATED_ASSEMBLAGE,
        ENGLISH_DESCRIPTION_ASSEMBLAGE, ENGLISH_LANGUAGE, PREFERRED, REGULAR_NAME_DESCRIPTION_TYPE,
        ROOT_CONCEPT, US_DIALECT_ASSEMBLAGE, USER,
    },
    stamp::{Stamp, Status},
};

/// Initialize tracing for tests, respecting RUST_LOG env var.
///
/// Safe to call multiple times; subsequent calls are no-ops.
#[allow(dead_code)]
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// An uncommitted active stamp on the development path.
#[allow(dead_code)]
pub fn pending() -> Stamp {
    Stamp::uncommitted(Status::Active, USER.nid, CORE_MODULE.nid, DEVELOPMENT_PATH.nid).unwrap()
}

/// Stage the root concept, which every other concept eventually points to.
#[allow(dead_code)]
pub fn stage_root(transaction: &mut Transaction) {
    transaction
        .stage(
            Chronology::new_concept(ROOT_CONCEPT.nid, ROOT_CONCEPT.uuid)
                .with_version(Version::new(pending(), VersionData::Concept)),
        )
        .unwrap();
}

/// Stage a concept named `name` with a US-preferred regular name and a primitive stated
/// definition under `parents`. Returns the concept's nid.
#[allow(dead_code)]
pub fn stage_concept(
    transaction: &mut Transaction,
    ids: &dyn IdentifierService,
    name: &str,
    parents: &[Nid],
) -> Nid {
    let uuid = uuid_from_name(name);
    let concept = ids.assign_nid(uuid);
    transaction
        .stage(
            Chronology::new_concept(concept, uuid)
                .with_version(Version::new(pending(), VersionData::Concept)),
        )
        .unwrap();

    let mut builder = LogicalExpressionBuilder::new();
    let asserted = parents
        .iter()
        .map(|parent| builder.concept_assertion(*parent))
        .collect();
    let conjunction = builder.and(asserted);
    builder.necessary_set(conjunction);
    let stated = builder.build(ids).unwrap();
    stage_semantic(
        transaction,
        ids,
        concept,
        "stated",
        EL_PLUS_PLUS_STATED_ASSEMBLAGE.nid,
        VersionData::LogicGraph(stated),
    );

    let description = stage_semantic(
        transaction,
        ids,
        concept,
        name,
        ENGLISH_DESCRIPTION_ASSEMBLAGE.nid,
        VersionData::Description(DescriptionData::new(
            name,
            ENGLISH_LANGUAGE.nid,
            REGULAR_NAME_DESCRIPTION_TYPE.nid,
        )),
    );
    stage_semantic(
        transaction,
        ids,
        description,
        "us",
        US_DIALECT_ASSEMBLAGE.nid,
        VersionData::Acceptability {
            acceptability: PREFERRED.nid,
        },
    );
    concept
}

/// Stage a version of the semantic `label` of `component`. Returns the semantic's nid.
#[allow(dead_code)]
pub fn stage_semantic(
    transaction: &mut Transaction,
    ids: &dyn IdentifierService,
    component: Nid,
    label: &str,
    assemblage: Nid,
    data: VersionData,
) -> Nid {
    let uuid = uuid_derived_from(&ids.uuid_for_nid(component).unwrap(), label);
    let nid = ids.assign_nid(uuid);
    transaction
        .stage(
            Chronology::new_semantic(nid, uuid, assemblage, component)
                .with_version(Version::new(pending(), data)),
        )
        .unwrap();
    nid
}
