//! End-to-end flow through a fully wired context: commit, classify, navigate, search.

mod common;

use common::*;
use komet_core::{
    chronology::VersionData,
    classifier::ClassifierState,
    commit::Transaction,
    config::KometConfig,
    context::KometContext,
    coordinate::Premise,
    event::{KometEvent, TaskOutcome},
    identifier::Nid,
    index::resolve_alternate_identifier,
    logic::LogicalExpressionBuilder,
    metadata::{EL_PLUS_PLUS_STATED_ASSEMBLAGE, ROOT_CONCEPT, SCTID_ASSEMBLAGE},
};
use std::collections::BTreeSet;
use test_log::test;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

struct Seeded {
    disorder: Nid,
    respiratory: Nid,
    asthma: Nid,
}

fn seed(context: &KometContext) -> Seeded {
    let ids = context.ids().as_ref();
    let mut transaction = Transaction::new("seed");
    stage_root(&mut transaction);
    let disorder = stage_concept(&mut transaction, ids, "Disorder", &[ROOT_CONCEPT.nid]);
    let respiratory = stage_concept(
        &mut transaction,
        ids,
        "Respiratory disorder",
        &[disorder],
    );
    let asthma = stage_concept(&mut transaction, ids, "Asthma", &[respiratory]);
    stage_semantic(
        &mut transaction,
        ids,
        asthma,
        "sctid",
        SCTID_ASSEMBLAGE.nid,
        VersionData::Identifier("195967001".to_string()),
    );
    let record = context
        .commit(transaction, "Initial content")
        .into_result()
        .unwrap();
    assert!(record.concepts.contains(&asthma));
    Seeded {
        disorder,
        respiratory,
        asthma,
    }
}

fn drain(rx: &mut UnboundedReceiver<KometEvent>) -> Vec<KometEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[test(tokio::test)]
async fn test_commit_classify_and_navigate() {
    let (tx, mut rx) = unbounded_channel();
    let context = KometContext::new(KometConfig::default(), Some(tx)).unwrap();
    assert_eq!(context.default_manifold().premise(), Some(Premise::Inferred));
    let seeded = seed(&context);

    let inferred = context.default_manifold().clone();
    let before = context.taxonomy_snapshot(&inferred).unwrap();
    assert!(!before.is_child_of(seeded.asthma, seeded.respiratory));
    let stated = context
        .taxonomy_snapshot(&inferred.with_premise(Premise::Stated))
        .unwrap();
    assert!(stated.is_child_of(seeded.asthma, seeded.respiratory));
    assert!(stated.is_kind_of(seeded.asthma, seeded.disorder));

    let results = context.classify(None).join().await.unwrap();
    assert!(results.changed.contains(&seeded.asthma));
    assert!(results.missing_definitions.is_empty());
    assert!(results.commit.is_some());
    assert!(context.tasks().is_empty());
    assert_eq!(context.classifier().state(), ClassifierState::Idle);

    let after = context.taxonomy_snapshot(&inferred).unwrap();
    assert!(after.is_child_of(seeded.asthma, seeded.respiratory));
    assert!(after.is_kind_of(seeded.asthma, ROOT_CONCEPT.nid));
    // The snapshot taken before classification is untouched.
    assert!(!before.is_child_of(seeded.asthma, seeded.respiratory));

    // Classifying again finds nothing new to write.
    let again = context.classify(None).join().await.unwrap();
    assert!(again.changed.is_empty());
    assert!(again.commit.is_none());

    let events = drain(&mut rx);
    assert!(matches!(events.first(), Some(KometEvent::Committed(r)) if r.transaction_name == "seed"));
    assert!(events.iter().any(|e| matches!(
        e,
        KometEvent::Committed(r) if r.comment == context.config().classifier_comment
    )));
    assert!(events
        .iter()
        .any(|e| matches!(e, KometEvent::ClassifierState(ClassifierState::Classify))));
    let finished = events
        .iter()
        .filter(|e| matches!(e, KometEvent::TaskFinished(_, _, TaskOutcome::Succeeded)))
        .count();
    assert_eq!(finished, 2);
}

#[test(tokio::test)]
async fn test_names_search_and_identifiers() {
    let context = KometContext::new(KometConfig::default(), None).unwrap();
    let seeded = seed(&context);
    let manifold = context.default_manifold();
    let calc = context.calculator(&manifold.view_filter).unwrap();
    let store = context.store().as_ref();

    assert_eq!(
        manifold
            .language
            .regular_name_text(seeded.asthma, store, &calc)
            .as_deref(),
        Some("Asthma")
    );

    let hits = context.index().query("asth", 10);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].referenced_component, seeded.asthma);
    let hits = context.index().query("respiratory dis", 10);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].referenced_component, seeded.respiratory);
    assert!(context.index().query("cardiac", 10).is_empty());

    assert_eq!(
        resolve_alternate_identifier(
            Some(context.index()),
            store,
            &calc,
            SCTID_ASSEMBLAGE.nid,
            "195967001"
        ),
        Some(seeded.asthma)
    );
    assert_eq!(
        resolve_alternate_identifier(None, store, &calc, SCTID_ASSEMBLAGE.nid, "195967001"),
        None
    );
    assert_eq!(
        resolve_alternate_identifier(
            Some(context.index()),
            store,
            &calc,
            SCTID_ASSEMBLAGE.nid,
            "0"
        ),
        None
    );
}

#[test]
fn test_second_stated_graph_is_rejected() {
    let context = KometContext::new(KometConfig::default(), None).unwrap();
    let seeded = seed(&context);
    let ids = context.ids().as_ref();

    let mut builder = LogicalExpressionBuilder::new();
    let parent = builder.concept_assertion(seeded.disorder);
    let conjunction = builder.and(vec![parent]);
    builder.necessary_set(conjunction);
    let expression = builder.build(ids).unwrap();

    let mut transaction = Transaction::new("second definition");
    let duplicate = stage_semantic(
        &mut transaction,
        ids,
        seeded.asthma,
        "stated again",
        EL_PLUS_PLUS_STATED_ASSEMBLAGE.nid,
        VersionData::LogicGraph(expression),
    );
    let outcome = context.commit(transaction, "Add a second definition");
    assert!(!outcome.is_committed());
    assert!(outcome.alerts.iter().any(|a| a.is_error()));
    assert!(!context.store().contains(duplicate));
    assert!(outcome.into_result().unwrap_err().to_string().contains("more than one"));

    let stated = context
        .taxonomy_snapshot(&context.default_manifold().with_premise(Premise::Stated))
        .unwrap();
    assert_eq!(
        stated.taxonomy_parent_concept_nids(seeded.asthma),
        BTreeSet::from([seeded.respiratory])
    );
}
