use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeSet, HashMap, VecDeque},
    fmt::{Display, Formatter},
    sync::Arc,
};

use super::{StampPosition, LATEST};
use crate::{
    calculator::RelativePositionCalculator,
    coordinate::StampFilter,
    error::KometError,
    identifier::Nid,
    metadata::{DEVELOPMENT_PATH, MASTER_PATH, METADATA, PRIMORDIAL_PATH, SANDBOX_PATH},
};

/// Origin chains longer than this are rejected as malformed.
pub const MAX_ORIGIN_DEPTH: usize = 64;

/// A branch along which versions are committed. The origins are the positions on other paths
/// this path forked from; versions on an origin path are visible on this path up to the
/// origin's time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StampPath {
    path_concept: Nid,
    origins: BTreeSet<StampPosition>,
}

impl StampPath {
    pub fn new(path_concept: Nid, origins: BTreeSet<StampPosition>) -> Self {
        StampPath {
            path_concept,
            origins,
        }
    }

    pub fn path_concept_nid(&self) -> Nid {
        self.path_concept
    }

    pub fn origins(&self) -> &BTreeSet<StampPosition> {
        &self.origins
    }

    pub fn origin_path_nids(&self) -> BTreeSet<Nid> {
        self.origins.iter().map(|o| o.path()).collect()
    }

    pub fn to_user_string(&self) -> String {
        let origins = self
            .origins
            .iter()
            .map(|o| o.to_user_string())
            .collect::<Vec<_>>();
        if origins.is_empty() {
            METADATA.name_of(self.path_concept)
        } else {
            format!(
                "{} from [{}]",
                METADATA.name_of(self.path_concept),
                origins.join(", ")
            )
        }
    }
}

impl Display for StampPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_user_string())
    }
}

/// Looks up path definitions.
pub trait PathService: Send + Sync {
    fn get_path(&self, path: Nid) -> Option<Arc<StampPath>>;

    fn origins(&self, path: Nid) -> Option<BTreeSet<StampPosition>> {
        self.get_path(path).map(|p| p.origins().clone())
    }

    fn exists(&self, path: Nid) -> bool {
        self.get_path(path).is_some()
    }
}

/// Interns one canonical [StampPath] per path concept nid, so that reference equality implies
/// value equality for everything that hashes or caches on paths.
#[derive(Debug, Default)]
pub struct StampPathCache {
    paths: RwLock<HashMap<Nid, Arc<StampPath>>>,
}

impl StampPathCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the canonical instance for `path_concept`, creating it from `origins` if absent.
    /// The uninitialized sentinel is never interned: every call yields a fresh instance.
    pub fn make(&self, path_concept: Nid, origins: BTreeSet<StampPosition>) -> Arc<StampPath> {
        if !path_concept.is_initialized() {
            return Arc::new(StampPath::new(path_concept, origins));
        }
        if let Some(existing) = self.paths.read().get(&path_concept) {
            return existing.clone();
        }
        self.paths
            .write()
            .entry(path_concept)
            .or_insert_with(|| Arc::new(StampPath::new(path_concept, origins)))
            .clone()
    }

    pub fn get(&self, path_concept: Nid) -> Option<Arc<StampPath>> {
        self.paths.read().get(&path_concept).cloned()
    }

    /// Replace the canonical instance. Outstanding `Arc`s to the old definition stay valid.
    fn replace(&self, path: StampPath) -> Arc<StampPath> {
        let path = Arc::new(path);
        self.paths.write().insert(path.path_concept, path.clone());
        path
    }

    pub fn all(&self) -> Vec<Arc<StampPath>> {
        let mut paths = self.paths.read().values().cloned().collect::<Vec<_>>();
        paths.sort_by_key(|p| p.path_concept);
        paths
    }

    pub fn len(&self) -> usize {
        self.paths.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Check that `origins` only name known paths and that no origin chain leads back to `path`.
pub fn validate_origins(
    path: Nid,
    origins: &BTreeSet<StampPosition>,
    paths: &dyn PathService,
) -> Result<(), KometError> {
    if !path.is_initialized() {
        return Err(KometError::Configuration(
            "Cannot register the uninitialized path".to_string(),
        ));
    }
    let mut queue: VecDeque<(Nid, usize)> = origins.iter().map(|o| (o.path(), 1)).collect();
    let mut visited = BTreeSet::new();
    while let Some((ancestor, depth)) = queue.pop_front() {
        if ancestor == path {
            return Err(KometError::Configuration(format!(
                "Path {} has a cyclic origin chain (reached itself at depth {depth})",
                METADATA.name_of(path)
            )));
        }
        if depth > MAX_ORIGIN_DEPTH {
            return Err(KometError::Configuration(format!(
                "Origin chain of path {} exceeds {MAX_ORIGIN_DEPTH} levels",
                METADATA.name_of(path)
            )));
        }
        if !visited.insert(ancestor) {
            continue;
        }
        let ancestor_origins = paths.origins(ancestor).ok_or_else(|| {
            KometError::Configuration(format!(
                "Path {} has an origin on unknown path {}",
                METADATA.name_of(path),
                METADATA.name_of(ancestor)
            ))
        })?;
        queue.extend(ancestor_origins.iter().map(|o| (o.path(), depth + 1)));
    }
    Ok(())
}

/// Calculators cached by [PathRegistry] unless configured otherwise.
pub const DEFAULT_CALCULATOR_CAPACITY: usize = 256;

/// Least-recently-used calculators by filter. `generation` moves on every path registration,
/// so a calculator built against superseded definitions is never cached.
#[derive(Debug)]
struct CalculatorCache {
    capacity: Option<usize>,
    entries: HashMap<StampFilter, (Arc<RelativePositionCalculator>, u64)>,
    tick: u64,
    generation: u64,
}

impl CalculatorCache {
    fn new(capacity: Option<usize>) -> Self {
        CalculatorCache {
            capacity: capacity.filter(|c| *c > 0),
            entries: HashMap::new(),
            tick: 0,
            generation: 0,
        }
    }

    fn get(&mut self, filter: &StampFilter) -> Option<Arc<RelativePositionCalculator>> {
        self.tick += 1;
        let tick = self.tick;
        let (calc, last_used) = self.entries.get_mut(filter)?;
        *last_used = tick;
        Some(calc.clone())
    }

    fn insert(&mut self, filter: StampFilter, calc: Arc<RelativePositionCalculator>) {
        if let Some(capacity) = self.capacity {
            while self.entries.len() >= capacity {
                let oldest = self
                    .entries
                    .iter()
                    .min_by_key(|(_, (_, last_used))| *last_used)
                    .map(|(filter, _)| filter.clone());
                let Some(oldest) = oldest else {
                    break;
                };
                self.entries.remove(&oldest);
            }
        }
        self.tick += 1;
        self.entries.insert(filter, (calc, self.tick));
    }

    fn invalidate(&mut self) {
        self.generation += 1;
        self.entries.clear();
    }
}

impl Default for CalculatorCache {
    fn default() -> Self {
        CalculatorCache::new(Some(DEFAULT_CALCULATOR_CAPACITY))
    }
}

/// The path registry: validated path definitions plus a bounded cache of the relative position
/// calculators built over them.
#[derive(Debug, Default)]
pub struct PathRegistry {
    cache: StampPathCache,
    /// Held across validation and replacement so concurrent registrations see each other.
    registration: Mutex<()>,
    calculators: Mutex<CalculatorCache>,
}

impl PathRegistry {
    /// An empty registry. Most callers want [PathRegistry::with_defaults].
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry seeded with the primordial, master, development and sandbox paths. Master forks
    /// from the latest primordial content, development from the latest master content, and
    /// sandbox from the latest development content.
    pub fn with_defaults() -> Self {
        let registry = PathRegistry::new();
        let seed = [
            (PRIMORDIAL_PATH.nid, None),
            (MASTER_PATH.nid, Some(PRIMORDIAL_PATH.nid)),
            (DEVELOPMENT_PATH.nid, Some(MASTER_PATH.nid)),
            (SANDBOX_PATH.nid, Some(DEVELOPMENT_PATH.nid)),
        ];
        for (path, origin) in seed {
            let origins = origin
                .map(|o| BTreeSet::from([StampPosition::new(LATEST, o)]))
                .unwrap_or_default();
            registry.cache.make(path, origins);
        }
        registry
    }

    /// Keep at most `capacity` calculators; `None` leaves the cache unbounded.
    pub fn with_calculator_capacity(self, capacity: Option<usize>) -> Self {
        PathRegistry {
            calculators: Mutex::new(CalculatorCache::new(capacity)),
            ..self
        }
    }

    /// Validate and (re)define a path. Redefining a path drops every cached calculator.
    pub fn register(
        &self,
        path: Nid,
        origins: BTreeSet<StampPosition>,
    ) -> Result<Arc<StampPath>, KometError> {
        let _registering = self.registration.lock();
        validate_origins(path, &origins, self)?;
        let registered = self.cache.replace(StampPath::new(path, origins));
        self.calculators.lock().invalidate();
        tracing::info!("Registered path {}", registered.to_user_string());
        Ok(registered)
    }

    pub fn cached_calculator_count(&self) -> usize {
        self.calculators.lock().entries.len()
    }

    pub fn paths(&self) -> Vec<Arc<StampPath>> {
        self.cache.all()
    }

    /// A (cached) calculator for `filter`. Fails with a configuration error when the filter's
    /// path, or any path on its origin chain, is unknown.
    pub fn calculator(
        &self,
        filter: &StampFilter,
    ) -> Result<Arc<RelativePositionCalculator>, KometError> {
        let generation = {
            let mut calculators = self.calculators.lock();
            if let Some(calc) = calculators.get(filter) {
                return Ok(calc);
            }
            calculators.generation
        };
        let calc = Arc::new(RelativePositionCalculator::new(filter, self)?);
        let mut calculators = self.calculators.lock();
        if calculators.generation == generation {
            calculators.insert(filter.clone(), calc.clone());
        } else {
            tracing::debug!(
                "Paths changed while building a calculator for {filter}; not caching it"
            );
        }
        Ok(calc)
    }
}

impl PathService for PathRegistry {
    fn get_path(&self, path: Nid) -> Option<Arc<StampPath>> {
        self.cache.get(path)
    }
}
