//! Shared fixtures for the scenario tests.

use crate::{
    chronology::{Chronology, DescriptionData, Version, VersionData},
    identifier::{
        uuid_derived_from, uuid_from_name, IdentifierService, InMemoryIdentifierService, Nid, Uuid,
    },
    logic::{LogicalExpression, LogicalExpressionBuilder},
    metadata::{
        CORE_MODULE, DEVELOPMENT_PATH, ENGLISH_DESCRIPTION_ASSEMBLAGE, ENGLISH_LANGUAGE,
        EL_PLUS_PLUS_STATED_ASSEMBLAGE, ROOT_CONCEPT, SPANISH_DESCRIPTION_ASSEMBLAGE, USER,
    },
    stamp::{PathRegistry, Stamp, Status},
    store::{ChronologyStore, InMemoryStore},
};
use std::sync::Arc;

/// Initialize logging for tests
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// Committed stamp by the default user in the core module.
pub fn stamp(status: Status, time: i64, path: Nid) -> Stamp {
    Stamp::new(status, time, USER.nid, CORE_MODULE.nid, path).unwrap()
}

pub fn active(time: i64) -> Stamp {
    stamp(Status::Active, time, DEVELOPMENT_PATH.nid)
}

/// `NecessarySet(And(parents.., role some filler..))`, or a sufficient set when `defined`.
pub fn definition(
    ids: &dyn IdentifierService,
    parents: &[Nid],
    roles: &[(Nid, Nid)],
    defined: bool,
) -> LogicalExpression {
    let mut builder = LogicalExpressionBuilder::new();
    let mut conjuncts = parents
        .iter()
        .map(|parent| builder.concept_assertion(*parent))
        .collect::<Vec<_>>();
    for (role, filler) in roles {
        let filler = builder.concept_assertion(*filler);
        conjuncts.push(builder.some_role(*role, filler));
    }
    let conjunction = builder.and(conjuncts);
    if defined {
        builder.sufficient_set(conjunction);
    } else {
        builder.necessary_set(conjunction);
    }
    builder.build(ids).unwrap()
}

/// A store written to directly with committed versions, bypassing transactions.
pub struct Terminology {
    pub ids: Arc<InMemoryIdentifierService>,
    pub store: Arc<InMemoryStore>,
    pub paths: Arc<PathRegistry>,
}

impl Terminology {
    /// Starts with an active root concept.
    pub fn new() -> Self {
        init_logging();
        let terminology = Terminology {
            ids: Arc::new(InMemoryIdentifierService::new()),
            store: Arc::new(InMemoryStore::new()),
            paths: Arc::new(PathRegistry::with_defaults()),
        };
        terminology
            .store
            .write(
                Chronology::new_concept(ROOT_CONCEPT.nid, ROOT_CONCEPT.uuid)
                    .with_version(Version::new(active(1), VersionData::Concept)),
            )
            .unwrap();
        terminology
    }

    pub fn store(&self) -> Arc<dyn ChronologyStore> {
        self.store.clone()
    }

    pub fn nid(&self, name: &str) -> Nid {
        self.ids.assign_nid(uuid_from_name(name))
    }

    fn uuid(&self, nid: Nid) -> Uuid {
        self.ids.uuid_for_nid(nid).unwrap()
    }

    /// Write a concept version. Returns the concept's nid.
    pub fn concept_at(&self, name: &str, stamp: Stamp) -> Nid {
        let nid = self.nid(name);
        self.store
            .write(
                Chronology::new_concept(nid, uuid_from_name(name))
                    .with_version(Version::new(stamp, VersionData::Concept)),
            )
            .unwrap();
        nid
    }

    pub fn concept(&self, name: &str) -> Nid {
        self.concept_at(name, active(10))
    }

    /// Write a version of the semantic `label` of `component`. Returns the semantic's nid.
    pub fn semantic(
        &self,
        component: Nid,
        label: &str,
        assemblage: Nid,
        stamp: Stamp,
        data: VersionData,
    ) -> Nid {
        let uuid = uuid_derived_from(&self.uuid(component), label);
        let nid = self.ids.assign_nid(uuid);
        self.store
            .write(
                Chronology::new_semantic(nid, uuid, assemblage, component)
                    .with_version(Version::new(stamp, data)),
            )
            .unwrap();
        nid
    }

    pub fn description(&self, concept: Nid, text: &str, language: Nid, description_type: Nid) -> Nid {
        let assemblage = if language == ENGLISH_LANGUAGE.nid {
            ENGLISH_DESCRIPTION_ASSEMBLAGE.nid
        } else {
            SPANISH_DESCRIPTION_ASSEMBLAGE.nid
        };
        self.semantic(
            concept,
            text,
            assemblage,
            active(10),
            VersionData::Description(DescriptionData::new(text, language, description_type)),
        )
    }

    pub fn acceptability(&self, description: Nid, dialect: Nid, acceptability: Nid) -> Nid {
        self.semantic(
            description,
            &dialect.to_string(),
            dialect,
            active(10),
            VersionData::Acceptability { acceptability },
        )
    }

    /// Write the stated logic graph of `concept` at `stamp`.
    pub fn stated_at(&self, concept: Nid, expression: LogicalExpression, stamp: Stamp) -> Nid {
        self.semantic(
            concept,
            "stated",
            EL_PLUS_PLUS_STATED_ASSEMBLAGE.nid,
            stamp,
            VersionData::LogicGraph(expression),
        )
    }

    /// A primitive concept stated under `parents`.
    pub fn primitive(&self, name: &str, parents: &[Nid]) -> Nid {
        self.primitive_with_roles(name, parents, &[])
    }

    pub fn primitive_with_roles(&self, name: &str, parents: &[Nid], roles: &[(Nid, Nid)]) -> Nid {
        let concept = self.concept(name);
        let expression = definition(self.ids.as_ref(), parents, roles, false);
        self.stated_at(concept, expression, active(10));
        concept
    }

    /// A concept fully defined by `parents` and `roles`.
    pub fn defined(&self, name: &str, parents: &[Nid], roles: &[(Nid, Nid)]) -> Nid {
        let concept = self.concept(name);
        let expression = definition(self.ids.as_ref(), parents, roles, true);
        self.stated_at(concept, expression, active(10));
        concept
    }
}
