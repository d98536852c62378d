use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};
use tokio::sync::mpsc::UnboundedSender;

use super::{
    reasoner::{nid_from_reasoner_id, reasoner_id, AxiomSet, ConceptAxioms, Reasoner},
    ClassifierState,
};
use crate::{
    calculator::RelativePositionCalculator,
    chronology::{Chronology, Version, VersionData},
    commit::{CommitRecord, CommitService, Transaction},
    coordinate::ManifoldCoordinate,
    error::KometError,
    event::KometEvent,
    identifier::{uuid_derived_from, IdentifierService, Nid},
    logic::{LogicNode, LogicalExpression, LogicalExpressionBuilder},
    metadata::{CLASSIFIER_USER, METADATA},
    stamp::{PathRegistry, Stamp, Status},
    store::ChronologyStore,
    task::{ActiveTasks, TaskHandle, TaskProgress},
};

/// What one classification run found and wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierResults {
    /// Requested concepts plus the equivalents folded in.
    pub affected: BTreeSet<Nid>,
    /// Concepts the reasoner found logically identical.
    pub equivalent_sets: Vec<BTreeSet<Nid>>,
    /// Affected concepts skipped for lack of an active stated logic graph.
    pub missing_definitions: BTreeSet<Nid>,
    /// Concepts that got a new inferred version.
    pub changed: BTreeSet<Nid>,
    pub commit: Option<CommitRecord>,
}

/// Sets the service back to idle however a run ends.
struct IdleOnExit<'a>(&'a ClassifierService);

impl Drop for IdleOnExit<'_> {
    fn drop(&mut self) {
        self.0.set_state(ClassifierState::Idle);
    }
}

pub struct ClassifierService {
    store: Arc<dyn ChronologyStore>,
    ids: Arc<dyn IdentifierService>,
    paths: Arc<PathRegistry>,
    commits: Arc<CommitService>,
    reasoner: Arc<dyn Reasoner>,
    state: Mutex<ClassifierState>,
    run_lock: Mutex<()>,
    events: Option<UnboundedSender<KometEvent>>,
    commit_comment: String,
}

impl ClassifierService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn ChronologyStore>,
        ids: Arc<dyn IdentifierService>,
        paths: Arc<PathRegistry>,
        commits: Arc<CommitService>,
        reasoner: Arc<dyn Reasoner>,
        events: Option<UnboundedSender<KometEvent>>,
        commit_comment: impl Into<String>,
    ) -> Self {
        ClassifierService {
            store,
            ids,
            paths,
            commits,
            reasoner,
            state: Mutex::new(ClassifierState::Idle),
            run_lock: Mutex::new(()),
            events,
            commit_comment: commit_comment.into(),
        }
    }

    pub fn state(&self) -> ClassifierState {
        *self.state.lock()
    }

    fn set_state(&self, state: ClassifierState) {
        *self.state.lock() = state;
        tracing::debug!("[Classifier] {state}");
        if let Some(tx) = &self.events {
            if let Err(e) = tx.send(KometEvent::ClassifierState(state)) {
                tracing::warn!("{}", KometError::from(e));
            }
        }
    }

    /// Classify the stated logic graphs visible under the manifold's view filter and commit
    /// changed inferred graphs for `affected` (every stated concept when `None`).
    ///
    /// Per-concept defects are logged and skipped. Reasoner failures, commit failures and
    /// cancellation fail the whole run; nothing is committed in those cases.
    pub fn classify(
        &self,
        manifold: &ManifoldCoordinate,
        affected: Option<&BTreeSet<Nid>>,
        progress: &TaskProgress,
    ) -> Result<ClassifierResults, KometError> {
        let _running = self.run_lock.lock();
        let _idle = IdleOnExit(self);
        let calc = self.paths.calculator(&manifold.view_filter)?;
        let logic = &manifold.logic;
        let mut results = ClassifierResults::default();

        self.set_state(ClassifierState::LoadAxioms);
        let stated = self.load_definitions(logic.stated_assemblage, &calc);
        let mut axioms = AxiomSet::default();
        for (concept, (_, expression)) in &stated {
            axioms.insert(reasoner_id(*concept), ConceptAxioms::from_expression(expression));
        }
        results.affected = match affected {
            Some(requested) => requested.clone(),
            None => stated.keys().copied().collect(),
        };
        for concept in &results.affected {
            if !stated.contains_key(concept) {
                tracing::error!(
                    "[Classifier] Concept {concept} has no active {} logic graph under {}; skipped",
                    METADATA.name_of(logic.stated_assemblage),
                    calc.filter()
                );
                results.missing_definitions.insert(*concept);
            }
        }
        progress.check_cancelled()?;

        self.set_state(ClassifierState::Classify);
        progress.set_message(format!("{} reasoner", self.reasoner.name()));
        let taxonomy = self.reasoner.classify(&axioms)?;
        progress.check_cancelled()?;

        self.set_state(ClassifierState::CollectResults);
        let mut parents_of: BTreeMap<Nid, BTreeSet<Nid>> = BTreeMap::new();
        let mut equivalent_sets = BTreeSet::new();
        let mut queue = results
            .affected
            .iter()
            .filter(|c| stated.contains_key(*c))
            .copied()
            .collect::<Vec<_>>();
        while let Some(concept) = queue.pop() {
            if parents_of.contains_key(&concept) {
                continue;
            }
            let Some(node) = taxonomy.node(&reasoner_id(concept)) else {
                tracing::error!("[Classifier] Reasoner returned no node for concept {concept}");
                continue;
            };
            let parents = node
                .direct_parents
                .iter()
                .map(|id| nid_from_reasoner_id(id))
                .collect::<Result<BTreeSet<_>, _>>()?;
            if node.equivalents.len() > 1 {
                let equivalents = node
                    .equivalents
                    .iter()
                    .map(|id| nid_from_reasoner_id(id))
                    .collect::<Result<BTreeSet<_>, _>>()?;
                for equivalent in &equivalents {
                    if stated.contains_key(equivalent) && !parents_of.contains_key(equivalent) {
                        queue.push(*equivalent);
                    }
                }
                if equivalent_sets.insert(equivalents.clone()) {
                    tracing::warn!("[Classifier] Concepts {equivalents:?} are equivalent");
                    results.affected.extend(equivalents.iter().filter(|c| stated.contains_key(*c)));
                }
            }
            parents_of.insert(concept, parents);
        }
        results.equivalent_sets = equivalent_sets.into_iter().collect();
        progress.set_total(parents_of.len() as u64);

        self.set_state(ClassifierState::WriteBack);
        let mut transaction = Transaction::new(format!("Classify under {}", calc.filter()));
        for (concept, parents) in &parents_of {
            progress.check_cancelled()?;
            progress.advance(1);
            let Some((_, stated_expression)) = stated.get(concept) else {
                continue;
            };
            // Nothing left to infer withdraws a prior inferred graph with an empty definition.
            let inferred = inferred_expression(parents, stated_expression, self.ids.as_ref())?
                .unwrap_or_default();
            let (prior_chronology, prior) =
                self.prior_inferred(*concept, logic.inferred_assemblage, &calc);
            match &prior {
                Some(prior) if prior.is_equivalent(&inferred) => continue,
                None if inferred.is_empty() => {
                    tracing::debug!("[Classifier] Concept {concept} has nothing to infer");
                    continue;
                }
                _ => {}
            }
            let template = match prior_chronology {
                Some(chronology) => chronology,
                None => {
                    let concept_uuid = match self.store.get_chronology(*concept) {
                        Some(chronology) => chronology.uuid(),
                        None => self.ids.uuid_for_nid_or_err(*concept)?,
                    };
                    let uuid = uuid_derived_from(&concept_uuid, "inferred");
                    Chronology::new_semantic(
                        self.ids.assign_nid(uuid),
                        uuid,
                        logic.inferred_assemblage,
                        *concept,
                    )
                }
            };
            let stamp = Stamp::uncommitted(
                Status::Active,
                CLASSIFIER_USER.nid,
                manifold.edit.default_module,
                manifold.view_filter.path(),
            )?;
            transaction.stage_version(
                &template,
                Version::new(stamp, VersionData::LogicGraph(inferred)),
            )?;
            results.changed.insert(*concept);
        }

        self.set_state(ClassifierState::Commit);
        progress.check_cancelled()?;
        if transaction.is_empty() {
            tracing::info!("[Classifier] No inferred changes");
        } else {
            let record = self
                .commits
                .commit(transaction, &self.commit_comment, None)
                .into_result()?;
            results.commit = Some(record);
        }

        self.set_state(ClassifierState::Notify);
        tracing::info!(
            "[Classifier] {} affected, {} changed, {} equivalent set(s), {} missing definition(s)",
            results.affected.len(),
            results.changed.len(),
            results.equivalent_sets.len(),
            results.missing_definitions.len()
        );
        Ok(results)
    }

    /// Active logic graphs of `assemblage` by concept. More than one per concept is an
    /// integrity defect; the first is used.
    fn load_definitions(
        &self,
        assemblage: Nid,
        calc: &RelativePositionCalculator,
    ) -> BTreeMap<Nid, (Nid, LogicalExpression)> {
        let mut found: BTreeMap<Nid, Vec<(Nid, LogicalExpression)>> = BTreeMap::new();
        for semantic in self.store.semantic_nids_of_assemblage(assemblage) {
            let Some(chronology) = self.store.get_chronology(semantic) else {
                continue;
            };
            let Some(concept) = chronology.referenced_component() else {
                continue;
            };
            let latest = chronology.latest_version(calc);
            if latest.is_contradicted() {
                tracing::error!(
                    "[Classifier] Logic graph {semantic} of concept {concept} has {} current \
                     versions under {}; using the first",
                    latest.len(),
                    calc.filter()
                );
            }
            let Some(version) = latest.into_value() else {
                continue;
            };
            if !version.stamp.status.is_active() {
                continue;
            }
            match version.data {
                VersionData::LogicGraph(expression) => {
                    found.entry(concept).or_default().push((semantic, expression))
                }
                other => tracing::error!(
                    "[Classifier] Semantic {semantic} of concept {concept} in {} holds {} data",
                    METADATA.name_of(assemblage),
                    other.kind_name()
                ),
            }
        }
        found
            .into_iter()
            .map(|(concept, mut definitions)| {
                if definitions.len() > 1 {
                    tracing::error!(
                        "[Classifier] Concept {concept} has {} {} logic graphs {:?} under {}; \
                         using the first",
                        definitions.len(),
                        METADATA.name_of(assemblage),
                        definitions.iter().map(|(s, _)| *s).collect::<Vec<_>>(),
                        calc.filter()
                    );
                }
                (concept, definitions.swap_remove(0))
            })
            .collect()
    }

    /// The inferred semantic of `concept`, with its active latest graph if any.
    fn prior_inferred(
        &self,
        concept: Nid,
        assemblage: Nid,
        calc: &RelativePositionCalculator,
    ) -> (Option<Chronology>, Option<LogicalExpression>) {
        let semantics = self
            .store
            .semantic_nids_for_component_of_assemblage(concept, assemblage);
        if semantics.len() > 1 {
            tracing::error!(
                "[Classifier] Concept {concept} has {} {} logic graphs {:?}; using the first",
                semantics.len(),
                METADATA.name_of(assemblage),
                semantics
            );
        }
        let Some(chronology) = semantics
            .first()
            .and_then(|semantic| self.store.get_chronology(*semantic))
        else {
            return (None, None);
        };
        let latest = chronology.latest_version(calc);
        if latest.is_contradicted() {
            tracing::error!(
                "[Classifier] Inferred logic graph {} of concept {concept} has {} current \
                 versions under {}; using the first",
                chronology.nid(),
                latest.len(),
                calc.filter()
            );
        }
        let prior = latest
            .into_value()
            .filter(|v| v.stamp.status.is_active())
            .and_then(|v| match v.data {
                VersionData::LogicGraph(expression) => Some(expression),
                _ => None,
            });
        (Some(Chronology::clone(&chronology)), prior)
    }
}

/// `NecessarySet(And(parents.., stated necessary restrictions..))` followed by copies of the
/// stated sufficient sets. Parents are asserted in nid order. `None` when there is nothing to
/// state.
pub fn inferred_expression(
    parents: &BTreeSet<Nid>,
    stated: &LogicalExpression,
    ids: &dyn IdentifierService,
) -> Result<Option<LogicalExpression>, KometError> {
    let mut builder = LogicalExpressionBuilder::new();
    let mut conjuncts = parents
        .iter()
        .map(|parent| builder.concept_assertion(*parent))
        .collect::<Vec<_>>();
    for set in stated.necessary_sets() {
        for member in stated.set_members(set) {
            if !matches!(stated.node(member), Some(LogicNode::Concept(_))) {
                conjuncts.push(builder.copy_subtree(stated, member)?);
            }
        }
    }
    let sufficient = stated.sufficient_sets();
    if conjuncts.is_empty() && sufficient.is_empty() {
        return Ok(None);
    }
    if !conjuncts.is_empty() {
        let conjunction = builder.and(conjuncts);
        builder.necessary_set(conjunction);
    }
    for set in sufficient {
        builder.copy_subtree(stated, set)?;
    }
    builder.build(ids).map(Some)
}

/// Run [ClassifierService::classify] as a tracked task.
pub fn classify_task(
    service: Arc<ClassifierService>,
    tasks: &Arc<ActiveTasks>,
    manifold: ManifoldCoordinate,
    affected: Option<BTreeSet<Nid>>,
) -> TaskHandle<ClassifierResults> {
    tasks.spawn(
        format!("Classify {}", manifold.view_filter),
        move |progress| service.classify(&manifold, affected.as_ref(), progress),
    )
}
