//! Classification runs end to end against an in-memory store.

use super::helpers::*;
use crate::{
    calculator::RelativePositionCalculator,
    classifier::{
        classify_task, AxiomSet, ClassifierService, ClassifierState, Reasoner, ReasonerTaxonomy,
        StructuralReasoner,
    },
    commit::{CommitService, LogicGraphUniquenessChecker},
    coordinate::{LogicCoordinate, ManifoldCoordinate, StampFilter},
    error::KometError,
    event::{KometEvent, TaskOutcome},
    identifier::Nid,
    logic::{IdentifierStrategy, LogicalExpression},
    metadata::{CLASSIFIER_USER, EL_PLUS_PLUS_INFERRED_ASSEMBLAGE, ROOT_CONCEPT},
    stamp::Status,
    store::ChronologyStore,
    task::{ActiveTasks, TaskProgress},
    taxonomy::TaxonomyService,
};
use std::{collections::BTreeSet, sync::Arc};
use test_log::test;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};

fn service(
    terminology: &Terminology,
    reasoner: Arc<dyn Reasoner>,
    events: Option<UnboundedSender<KometEvent>>,
) -> Arc<ClassifierService> {
    let commits = Arc::new(CommitService::new(terminology.store(), events.clone()));
    commits.add_checker(Arc::new(LogicGraphUniquenessChecker::new(
        LogicCoordinate::el_plus_plus(),
    )));
    Arc::new(ClassifierService::new(
        terminology.store(),
        terminology.ids.clone(),
        terminology.paths.clone(),
        commits,
        reasoner,
        events,
        "Classifier results",
    ))
}

fn view(terminology: &Terminology) -> Arc<RelativePositionCalculator> {
    terminology
        .paths
        .calculator(&StampFilter::development_latest_active_only())
        .unwrap()
}

/// The latest inferred logic graph of `concept`.
fn inferred(terminology: &Terminology, concept: Nid) -> Option<LogicalExpression> {
    let semantics = terminology
        .store
        .semantic_nids_for_component_of_assemblage(concept, EL_PLUS_PLUS_INFERRED_ASSEMBLAGE.nid);
    assert!(semantics.len() <= 1, "{concept} has {} inferred graphs", semantics.len());
    let calc = view(terminology);
    semantics.first().and_then(|semantic| {
        terminology
            .store
            .get_latest_version(*semantic, &calc)
            .into_value()
            .and_then(|v| v.data.as_logic_graph().cloned())
    })
}

#[test]
fn test_told_parent_is_inferred_exactly() {
    let terminology = Terminology::new();
    let respiratory = terminology.primitive("Respiratory disorder", &[ROOT_CONCEPT.nid]);
    let asthma = terminology.primitive("Asthma", &[respiratory]);
    let classifier = service(&terminology, Arc::new(StructuralReasoner), None);

    let results = classifier
        .classify(
            &ManifoldCoordinate::development_stated(),
            None,
            &TaskProgress::detached("classify"),
        )
        .unwrap();
    assert_eq!(results.affected, BTreeSet::from([respiratory, asthma]));
    assert_eq!(results.changed, BTreeSet::from([respiratory, asthma]));
    assert!(results.missing_definitions.is_empty());
    assert!(results.commit.is_some());
    assert_eq!(classifier.state(), ClassifierState::Idle);

    let expected = definition(terminology.ids.as_ref(), &[respiratory], &[], false);
    let actual = inferred(&terminology, asthma).unwrap();
    assert_eq!(actual, expected);
    assert_eq!(
        actual
            .marshal(IdentifierStrategy::External, terminology.ids.as_ref())
            .unwrap(),
        expected
            .marshal(IdentifierStrategy::External, terminology.ids.as_ref())
            .unwrap()
    );

    let semantic = terminology
        .store
        .semantic_nids_for_component_of_assemblage(asthma, EL_PLUS_PLUS_INFERRED_ASSEMBLAGE.nid)[0];
    let version = terminology
        .store
        .get_latest_version(semantic, &view(&terminology))
        .into_value()
        .unwrap();
    assert_eq!(version.stamp.author, CLASSIFIER_USER.nid);
    assert_eq!(version.stamp.status, Status::Active);
}

#[test]
fn test_reclassification_writes_nothing_new() {
    let terminology = Terminology::new();
    let respiratory = terminology.primitive("Respiratory disorder", &[ROOT_CONCEPT.nid]);
    terminology.primitive("Asthma", &[respiratory]);
    let classifier = service(&terminology, Arc::new(StructuralReasoner), None);
    let manifold = ManifoldCoordinate::development_stated();

    let first = classifier
        .classify(&manifold, None, &TaskProgress::detached("first"))
        .unwrap();
    assert_eq!(first.changed.len(), 2);
    let written = terminology.store.len();

    let second = classifier
        .classify(&manifold, None, &TaskProgress::detached("second"))
        .unwrap();
    assert!(second.changed.is_empty());
    assert!(second.commit.is_none());
    assert_eq!(terminology.store.len(), written);
}

#[test]
fn test_edited_definition_is_reinferred() {
    let terminology = Terminology::new();
    let respiratory = terminology.primitive("Respiratory disorder", &[ROOT_CONCEPT.nid]);
    let asthma = terminology.primitive("Asthma", &[respiratory]);
    let classifier = service(&terminology, Arc::new(StructuralReasoner), None);
    let manifold = ManifoldCoordinate::development_stated();
    classifier
        .classify(&manifold, None, &TaskProgress::detached("first"))
        .unwrap();

    terminology.stated_at(
        asthma,
        definition(terminology.ids.as_ref(), &[ROOT_CONCEPT.nid], &[], false),
        active(20),
    );
    let results = classifier
        .classify(&manifold, None, &TaskProgress::detached("second"))
        .unwrap();
    assert_eq!(results.changed, BTreeSet::from([asthma]));
    assert_eq!(
        inferred(&terminology, asthma).unwrap().necessary_parents(),
        BTreeSet::from([ROOT_CONCEPT.nid])
    );
}

#[test]
fn test_emptied_definition_withdraws_inferred_parents() {
    let terminology = Terminology::new();
    let respiratory = terminology.primitive("Respiratory disorder", &[ROOT_CONCEPT.nid]);
    let asthma = terminology.primitive("Asthma", &[respiratory]);
    let classifier = service(&terminology, Arc::new(StructuralReasoner), None);
    let manifold = ManifoldCoordinate::development_stated();
    classifier
        .classify(&manifold, None, &TaskProgress::detached("first"))
        .unwrap();
    assert!(!inferred(&terminology, asthma).unwrap().is_empty());

    terminology.stated_at(asthma, LogicalExpression::new(), active(20));
    let results = classifier
        .classify(&manifold, None, &TaskProgress::detached("second"))
        .unwrap();
    assert_eq!(results.changed, BTreeSet::from([asthma]));
    assert!(inferred(&terminology, asthma).unwrap().is_empty());

    let taxonomy = TaxonomyService::new(terminology.store(), terminology.paths.clone());
    let inferred_view = taxonomy
        .snapshot(&ManifoldCoordinate::development_inferred())
        .unwrap();
    assert!(!inferred_view.is_child_of(asthma, respiratory));
    assert!(inferred_view.taxonomy_parent_concept_nids(asthma).is_empty());

    let third = classifier
        .classify(&manifold, None, &TaskProgress::detached("third"))
        .unwrap();
    assert!(third.changed.is_empty());
    assert!(third.commit.is_none());
}

#[test]
fn test_defined_concept_gains_inferred_children() {
    let terminology = Terminology::new();
    let root = ROOT_CONCEPT.nid;
    let disorder = terminology.primitive("Disorder", &[root]);
    let body_structure = terminology.primitive("Body structure", &[root]);
    let pancreas = terminology.primitive("Pancreas", &[body_structure]);
    let finding_site = terminology.concept("Finding site");
    let pancreatic =
        terminology.defined("Pancreatic disorder", &[disorder], &[(finding_site, pancreas)]);
    let diabetes =
        terminology.primitive_with_roles("Diabetes", &[disorder], &[(finding_site, pancreas)]);
    let classifier = service(&terminology, Arc::new(StructuralReasoner), None);

    classifier
        .classify(
            &ManifoldCoordinate::development_stated(),
            None,
            &TaskProgress::detached("classify"),
        )
        .unwrap();

    let diabetes_inferred = inferred(&terminology, diabetes).unwrap();
    assert_eq!(diabetes_inferred.necessary_parents(), BTreeSet::from([pancreatic]));
    assert_eq!(diabetes_inferred.role_restrictions().len(), 1);
    let pancreatic_inferred = inferred(&terminology, pancreatic).unwrap();
    assert!(pancreatic_inferred.is_sufficiently_defined());
    assert_eq!(pancreatic_inferred.necessary_parents(), BTreeSet::from([disorder]));

    let taxonomy = TaxonomyService::new(terminology.store(), terminology.paths.clone());
    let inferred_view = taxonomy
        .snapshot(&ManifoldCoordinate::development_inferred())
        .unwrap();
    assert!(inferred_view.is_child_of(diabetes, pancreatic));
    assert!(inferred_view.is_kind_of(diabetes, disorder));
    let stated_view = taxonomy
        .snapshot(&ManifoldCoordinate::development_stated())
        .unwrap();
    assert!(!stated_view.is_child_of(diabetes, pancreatic));
}

#[test]
fn test_equivalent_definitions_are_reported() {
    let terminology = Terminology::new();
    let disorder = terminology.primitive("Disorder", &[ROOT_CONCEPT.nid]);
    let pancreas = terminology.primitive("Pancreas", &[ROOT_CONCEPT.nid]);
    let finding_site = terminology.concept("Finding site");
    let first =
        terminology.defined("Pancreatic disorder", &[disorder], &[(finding_site, pancreas)]);
    let second =
        terminology.defined("Disorder of pancreas", &[disorder], &[(finding_site, pancreas)]);
    let classifier = service(&terminology, Arc::new(StructuralReasoner), None);

    let results = classifier
        .classify(
            &ManifoldCoordinate::development_stated(),
            Some(&BTreeSet::from([first])),
            &TaskProgress::detached("classify"),
        )
        .unwrap();
    assert_eq!(results.equivalent_sets, vec![BTreeSet::from([first, second])]);
    // The equivalent is classified along with the requested concept.
    assert_eq!(results.affected, BTreeSet::from([first, second]));
    assert_eq!(results.changed, BTreeSet::from([first, second]));
    assert_eq!(
        inferred(&terminology, second).unwrap().necessary_parents(),
        BTreeSet::from([disorder])
    );
}

#[test]
fn test_missing_definition_is_skipped() {
    let terminology = Terminology::new();
    terminology.primitive("Disorder", &[ROOT_CONCEPT.nid]);
    let finding_site = terminology.concept("Finding site");
    let classifier = service(&terminology, Arc::new(StructuralReasoner), None);

    let results = classifier
        .classify(
            &ManifoldCoordinate::development_stated(),
            Some(&BTreeSet::from([finding_site])),
            &TaskProgress::detached("classify"),
        )
        .unwrap();
    assert_eq!(results.missing_definitions, BTreeSet::from([finding_site]));
    assert!(results.changed.is_empty());
    assert!(results.commit.is_none());
}

#[test]
fn test_cancelled_run_commits_nothing() {
    let terminology = Terminology::new();
    terminology.primitive("Disorder", &[ROOT_CONCEPT.nid]);
    let classifier = service(&terminology, Arc::new(StructuralReasoner), None);
    let progress = TaskProgress::detached("classify");
    progress.cancel();

    let result = classifier.classify(&ManifoldCoordinate::development_stated(), None, &progress);
    assert_eq!(result.unwrap_err(), KometError::OperationCancelled);
    assert_eq!(classifier.state(), ClassifierState::Idle);
    assert!(terminology
        .store
        .semantic_nids_of_assemblage(EL_PLUS_PLUS_INFERRED_ASSEMBLAGE.nid)
        .is_empty());
}

struct FailingReasoner;

impl Reasoner for FailingReasoner {
    fn name(&self) -> &str {
        "failing"
    }

    fn classify(&self, _axioms: &AxiomSet) -> Result<ReasonerTaxonomy, KometError> {
        Err(KometError::Reasoner("out of memory".to_string()))
    }
}

#[test(tokio::test)]
async fn test_reasoner_failure_fails_the_task() {
    let terminology = Terminology::new();
    terminology.primitive("Disorder", &[ROOT_CONCEPT.nid]);
    let (tx, mut rx) = unbounded_channel();
    let classifier = service(&terminology, Arc::new(FailingReasoner), Some(tx.clone()));
    let tasks = Arc::new(ActiveTasks::new(Some(tx)));

    let handle = classify_task(
        classifier.clone(),
        &tasks,
        ManifoldCoordinate::development_stated(),
        None,
    );
    let error = handle.join().await.unwrap_err();
    assert!(matches!(error, KometError::Reasoner(_)));
    assert!(tasks.is_empty());
    assert_eq!(classifier.state(), ClassifierState::Idle);
    assert!(terminology
        .store
        .semantic_nids_of_assemblage(EL_PLUS_PLUS_INFERRED_ASSEMBLAGE.nid)
        .is_empty());

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    assert!(matches!(events.first(), Some(KometEvent::TaskStarted(..))));
    assert!(events.contains(&KometEvent::ClassifierState(ClassifierState::Classify)));
    assert!(!events
        .iter()
        .any(|e| matches!(e, KometEvent::Committed(_))));
    assert!(matches!(
        events.last(),
        Some(KometEvent::TaskFinished(_, _, TaskOutcome::Failed(_)))
    ));
}
