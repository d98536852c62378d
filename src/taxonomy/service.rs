use parking_lot::RwLock;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use super::TaxonomySnapshot;
use crate::{
    commit::{CommitListener, CommitRecord},
    coordinate::ManifoldCoordinate,
    error::KometError,
    stamp::PathRegistry,
    store::ChronologyStore,
};

/// Lazily built taxonomy snapshots, one per manifold value.
///
/// Readers keep the `Arc` they were handed; a commit only drops cache entries, so a rebuild
/// never changes a snapshot someone is reading. Each commit bumps a generation counter and a
/// build that started before the bump is returned to its caller but not cached.
pub struct TaxonomyService {
    store: Arc<dyn ChronologyStore>,
    paths: Arc<PathRegistry>,
    cache: RwLock<HashMap<ManifoldCoordinate, Arc<TaxonomySnapshot>>>,
    generation: AtomicU64,
}

impl TaxonomyService {
    pub fn new(store: Arc<dyn ChronologyStore>, paths: Arc<PathRegistry>) -> Self {
        TaxonomyService {
            store,
            paths,
            cache: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self, manifold: &ManifoldCoordinate) -> Result<Arc<TaxonomySnapshot>, KometError> {
        if let Some(cached) = self.cache.read().get(manifold) {
            return Ok(cached.clone());
        }
        let generation = self.generation.load(Ordering::Acquire);
        let view_calc = self.paths.calculator(&manifold.view_filter)?;
        let vertex_calc = self.paths.calculator(&manifold.vertex_filter)?;
        let snapshot = Arc::new(TaxonomySnapshot::build(
            manifold,
            self.store.clone(),
            &view_calc,
            vertex_calc,
        ));

        let mut cache = self.cache.write();
        if self.generation.load(Ordering::Acquire) != generation {
            tracing::debug!("Taxonomy built across a commit; not caching it");
            return Ok(snapshot);
        }
        Ok(cache.entry(manifold.clone()).or_insert(snapshot).clone())
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn cached_count(&self) -> usize {
        self.cache.read().len()
    }

    pub fn invalidate_all(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.cache.write().clear();
    }
}

/// Concept writes can change vertex visibility under any manifold; semantic writes only matter
/// to manifolds navigating their assemblage.
fn is_affected(manifold: &ManifoldCoordinate, record: &CommitRecord) -> bool {
    !record.concepts.is_empty()
        || record
            .assemblages
            .iter()
            .any(|assemblage| manifold.navigation.navigates(*assemblage))
}

impl CommitListener for TaxonomyService {
    fn listener_name(&self) -> &str {
        "taxonomy"
    }

    fn handle_commit(&self, record: &CommitRecord, _store: &dyn ChronologyStore) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        let mut cache = self.cache.write();
        let before = cache.len();
        cache.retain(|manifold, _| !is_affected(manifold, record));
        if cache.len() != before {
            tracing::debug!(
                "Commit {} invalidated {} taxonomy snapshot(s)",
                record.transaction_name,
                before - cache.len()
            );
        }
    }
}
