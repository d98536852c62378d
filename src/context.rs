//! Composition root: builds every service once and hands each its dependencies explicitly.

use std::{collections::BTreeSet, sync::Arc};
use tokio::sync::mpsc::UnboundedSender;

use crate::{
    calculator::RelativePositionCalculator,
    classifier::{classify_task, ClassifierResults, ClassifierService, Reasoner, StructuralReasoner},
    commit::{
        CommitOutcome, CommitService, LogicGraphUniquenessChecker, ReferencedComponentChecker,
        Transaction,
    },
    config::KometConfig,
    coordinate::{Interner, ManifoldCoordinate, StampFilter},
    error::KometError,
    event::KometEvent,
    identifier::{IdentifierService, InMemoryIdentifierService, Nid},
    index::{DescriptionIndexer, IndexService},
    stamp::PathRegistry,
    store::{ChronologyStore, InMemoryStore},
    task::{ActiveTasks, TaskHandle},
    taxonomy::{TaxonomyService, TaxonomySnapshot},
};

pub struct KometContext {
    config: KometConfig,
    ids: Arc<dyn IdentifierService>,
    store: Arc<dyn ChronologyStore>,
    paths: Arc<PathRegistry>,
    manifolds: Interner<ManifoldCoordinate>,
    default_manifold: Arc<ManifoldCoordinate>,
    commits: Arc<CommitService>,
    taxonomy: Arc<TaxonomyService>,
    index: Arc<DescriptionIndexer>,
    tasks: Arc<ActiveTasks>,
    classifier: Arc<ClassifierService>,
}

impl KometContext {
    /// In-memory identifier service and store, the default paths and the structural reasoner.
    pub fn new(
        config: KometConfig,
        events: Option<UnboundedSender<KometEvent>>,
    ) -> Result<Self, KometError> {
        let paths =
            PathRegistry::with_defaults().with_calculator_capacity(config.coordinate_cache_capacity);
        Self::with_services(
            config,
            Arc::new(InMemoryIdentifierService::new()),
            Arc::new(InMemoryStore::new()),
            Arc::new(paths),
            Arc::new(StructuralReasoner),
            events,
        )
    }

    pub fn with_services(
        config: KometConfig,
        ids: Arc<dyn IdentifierService>,
        store: Arc<dyn ChronologyStore>,
        paths: Arc<PathRegistry>,
        reasoner: Arc<dyn Reasoner>,
        events: Option<UnboundedSender<KometEvent>>,
    ) -> Result<Self, KometError> {
        let manifolds = Interner::new(config.coordinate_cache_capacity);
        let default_manifold = manifolds.intern(config.default_manifold()?);

        let commits = Arc::new(CommitService::new(store.clone(), events.clone()));
        commits.add_checker(Arc::new(LogicGraphUniquenessChecker::new(
            default_manifold.logic,
        )));
        commits.add_checker(Arc::new(ReferencedComponentChecker));

        let taxonomy = Arc::new(TaxonomyService::new(store.clone(), paths.clone()));
        let index = Arc::new(DescriptionIndexer::new()?);
        commits.add_listener(taxonomy.clone());
        commits.add_listener(index.clone());

        let tasks = Arc::new(ActiveTasks::new(events.clone()));
        let classifier = Arc::new(ClassifierService::new(
            store.clone(),
            ids.clone(),
            paths.clone(),
            commits.clone(),
            reasoner,
            events,
            config.classifier_comment.clone(),
        ));
        tracing::info!(
            "Komet context ready: {}",
            default_manifold.to_user_string()
        );
        Ok(KometContext {
            config,
            ids,
            store,
            paths,
            manifolds,
            default_manifold,
            commits,
            taxonomy,
            index,
            tasks,
            classifier,
        })
    }

    pub fn config(&self) -> &KometConfig {
        &self.config
    }

    pub fn ids(&self) -> &Arc<dyn IdentifierService> {
        &self.ids
    }

    pub fn store(&self) -> &Arc<dyn ChronologyStore> {
        &self.store
    }

    pub fn paths(&self) -> &Arc<PathRegistry> {
        &self.paths
    }

    pub fn commits(&self) -> &Arc<CommitService> {
        &self.commits
    }

    pub fn taxonomy(&self) -> &Arc<TaxonomyService> {
        &self.taxonomy
    }

    pub fn index(&self) -> &dyn IndexService {
        self.index.as_ref()
    }

    pub fn tasks(&self) -> &Arc<ActiveTasks> {
        &self.tasks
    }

    pub fn classifier(&self) -> &Arc<ClassifierService> {
        &self.classifier
    }

    pub fn default_manifold(&self) -> &Arc<ManifoldCoordinate> {
        &self.default_manifold
    }

    /// The shared instance equal to `manifold`.
    pub fn manifold(&self, manifold: ManifoldCoordinate) -> Arc<ManifoldCoordinate> {
        self.manifolds.intern(manifold)
    }

    pub fn calculator(&self, filter: &StampFilter) -> Result<Arc<RelativePositionCalculator>, KometError> {
        self.paths.calculator(filter)
    }

    pub fn taxonomy_snapshot(
        &self,
        manifold: &ManifoldCoordinate,
    ) -> Result<Arc<TaxonomySnapshot>, KometError> {
        self.taxonomy.snapshot(manifold)
    }

    pub fn commit(&self, transaction: Transaction, comment: &str) -> CommitOutcome {
        self.commits.commit(transaction, comment, None)
    }

    /// Classify under the default manifold. Must be called from within a tokio runtime.
    pub fn classify(&self, affected: Option<BTreeSet<Nid>>) -> TaskHandle<ClassifierResults> {
        classify_task(
            self.classifier.clone(),
            &self.tasks,
            ManifoldCoordinate::clone(&self.default_manifold),
            affected,
        )
    }
}
