use parking_lot::Mutex;
use std::{collections::HashMap, hash::Hash, sync::Arc};

/// Hit/miss/eviction counters for an [Interner].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InternerStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

#[derive(Debug)]
struct InternerState<T> {
    /// Canonical values with the tick they were last interned at.
    entries: HashMap<Arc<T>, u64>,
    tick: u64,
    stats: InternerStats,
}

/// Canonicalizes immutable values: `intern(value)` returns the shared instance equal to
/// `value`. Eviction is least-recently-interned once `capacity` is reached; an evicted value
/// is simply re-created on its next intern, so callers never depend on the cache for
/// correctness.
#[derive(Debug)]
pub struct Interner<T: Eq + Hash> {
    capacity: Option<usize>,
    state: Mutex<InternerState<T>>,
}

impl<T: Eq + Hash> Interner<T> {
    pub fn new(capacity: Option<usize>) -> Self {
        Interner {
            capacity: capacity.filter(|c| *c > 0),
            state: Mutex::new(InternerState {
                entries: HashMap::new(),
                tick: 0,
                stats: InternerStats::default(),
            }),
        }
    }

    pub fn unbounded() -> Self {
        Self::new(None)
    }

    pub fn intern(&self, value: T) -> Arc<T> {
        let mut state = self.state.lock();
        state.tick += 1;
        let tick = state.tick;
        let hit = state
            .entries
            .get_key_value(&value)
            .map(|(canonical, _)| canonical.clone());
        if let Some(canonical) = hit {
            state.entries.insert(canonical.clone(), tick);
            state.stats.hits += 1;
            return canonical;
        }
        state.stats.misses += 1;
        if let Some(capacity) = self.capacity {
            while state.entries.len() >= capacity {
                if !Self::evict_lru(&mut *state) {
                    break;
                }
            }
        }
        let canonical = Arc::new(value);
        state.entries.insert(canonical.clone(), tick);
        canonical
    }

    fn evict_lru(state: &mut InternerState<T>) -> bool {
        let oldest = state
            .entries
            .iter()
            .min_by_key(|(_, last_used)| **last_used)
            .map(|(value, _)| value.clone());
        match oldest {
            Some(value) => {
                state.entries.remove(&value);
                state.stats.evictions += 1;
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, value: &T) -> bool {
        self.state.lock().entries.contains_key(value)
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.state.lock().entries.clear();
    }

    pub fn stats(&self) -> InternerStats {
        self.state.lock().stats
    }
}

impl<T: Eq + Hash> Default for Interner<T> {
    fn default() -> Self {
        Self::unbounded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_values_share_an_instance() {
        let interner = Interner::unbounded();
        let a = interner.intern("development".to_string());
        let b = interner.intern("development".to_string());
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(interner.stats().hits, 1);
        assert_eq!(interner.len(), 1);
    }

    #[test]
    fn test_lru_eviction() {
        let interner = Interner::new(Some(2));
        let one = interner.intern(1);
        interner.intern(2);
        // Touch 1 so that 2 is the least recently used.
        interner.intern(1);
        interner.intern(3);
        assert!(interner.contains(&1));
        assert!(!interner.contains(&2));
        assert!(interner.contains(&3));
        assert_eq!(interner.stats().evictions, 1);
        // Evicted values are rebuilt on demand, surviving ones keep their identity.
        assert!(Arc::ptr_eq(&one, &interner.intern(1)));
    }
}
