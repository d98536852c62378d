//! Version resolution.
//!
//! A [RelativePositionCalculator] is built once per [StampFilter]. It walks the filter path's
//! origin chain into a *route*: one segment per reachable path, each visible up to a time.
//! The filter's own path is visible up to the filter's position; an ancestor path is visible
//! up to the point its descendant forked from it. When a path is reachable along several
//! routes it is visible up to the latest of their fork points.
//!
//! Given the route, [RelativePositionCalculator::latest_version] picks the current version(s)
//! of a chronology:
//!
//! 1. drop versions whose status, module, time sentinel or route position the filter rejects
//! 2. if the filter has a module priority list, keep only the best-ranked module group
//! 3. keep the latest version per path (equal times in one module: the later write wins)
//! 4. drop versions whose path precedes another candidate's path
//!
//! An active-only view of a retired component therefore shows its last active version; views
//! that must notice retirement admit inactive versions and check the status of the result.
//! More than one survivor is a contradiction, reported with every survivor.

use serde::{Deserialize, Serialize};
use std::{
    cmp::{Ordering, Reverse},
    collections::{BTreeMap, BTreeSet},
    fmt::{Display, Formatter},
};

use crate::{
    coordinate::StampFilter,
    error::KometError,
    identifier::Nid,
    metadata::METADATA,
    stamp::{PathService, Stamp, StampPosition, CANCELED, LATEST, MAX_ORIGIN_DEPTH},
};

/// Anything carrying a [Stamp].
pub trait Stamped {
    fn stamp(&self) -> &Stamp;
}

impl Stamped for Stamp {
    fn stamp(&self) -> &Stamp {
        self
    }
}

impl<T: Stamped> Stamped for &T {
    fn stamp(&self) -> &Stamp {
        (*self).stamp()
    }
}

/// How two stamped positions relate under one filter's route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelativePosition {
    Before,
    Equal,
    After,
    /// At least one of the positions is not on the route.
    Unreachable,
    /// Both are on the route but neither path precedes the other.
    Contradiction,
}

/// The current version of a component for some filter.
///
/// Absent when nothing is visible. When several versions are equally current, `value` holds
/// the primary one (by module priority, module nid, then recency) and `contradictions` holds
/// the rest, so callers can both display something and report the conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestVersion<V> {
    value: Option<V>,
    contradictions: Vec<V>,
}

impl<V> Default for LatestVersion<V> {
    fn default() -> Self {
        Self::absent()
    }
}

impl<V> LatestVersion<V> {
    pub fn absent() -> Self {
        LatestVersion {
            value: None,
            contradictions: Vec::new(),
        }
    }

    pub fn of(value: V) -> Self {
        LatestVersion {
            value: Some(value),
            contradictions: Vec::new(),
        }
    }

    pub fn contradicted(primary: V, others: Vec<V>) -> Self {
        LatestVersion {
            value: Some(primary),
            contradictions: others,
        }
    }

    pub fn is_present(&self) -> bool {
        self.value.is_some()
    }

    pub fn is_absent(&self) -> bool {
        self.value.is_none()
    }

    pub fn is_contradicted(&self) -> bool {
        !self.contradictions.is_empty()
    }

    pub fn get(&self) -> Option<&V> {
        self.value.as_ref()
    }

    pub fn into_value(self) -> Option<V> {
        self.value
    }

    pub fn contradictions(&self) -> &[V] {
        &self.contradictions
    }

    /// The primary version followed by every contradicting one.
    pub fn all(&self) -> Vec<&V> {
        self.value.iter().chain(self.contradictions.iter()).collect()
    }

    pub fn into_all(self) -> Vec<V> {
        self.value.into_iter().chain(self.contradictions).collect()
    }

    pub fn len(&self) -> usize {
        self.value.iter().count() + self.contradictions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.is_absent()
    }

    pub fn map<U>(self, mut f: impl FnMut(V) -> U) -> LatestVersion<U> {
        LatestVersion {
            value: self.value.map(&mut f),
            contradictions: self.contradictions.into_iter().map(f).collect(),
        }
    }

    pub fn as_ref(&self) -> LatestVersion<&V> {
        LatestVersion {
            value: self.value.as_ref(),
            contradictions: self.contradictions.iter().collect(),
        }
    }
}

/// One path of a route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteSegment {
    pub path: Nid,
    /// Latest visible time on this path.
    pub end_time: i64,
    /// Paths on the route that precede this one (its transitive origins).
    pub preceding: BTreeSet<Nid>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelativePositionCalculator {
    filter: StampFilter,
    segments: BTreeMap<Nid, RouteSegment>,
}

impl RelativePositionCalculator {
    /// Build the route for `filter`. Unknown paths and origin chains deeper than
    /// [MAX_ORIGIN_DEPTH] are configuration errors.
    pub fn new(filter: &StampFilter, paths: &dyn PathService) -> Result<Self, KometError> {
        let mut end_times = BTreeMap::new();
        Self::walk(filter.path(), filter.time(), 0, paths, &mut end_times)?;
        let mut segments = BTreeMap::new();
        for (path, end_time) in end_times {
            let preceding = Self::ancestors(path, paths)?;
            segments.insert(
                path,
                RouteSegment {
                    path,
                    end_time,
                    preceding,
                },
            );
        }
        tracing::debug!(
            "Route for {filter}: {}",
            segments
                .values()
                .map(|s| format!(
                    "{} to {}",
                    METADATA.name_of(s.path),
                    crate::stamp::time_to_user_string(s.end_time)
                ))
                .collect::<Vec<_>>()
                .join("; ")
        );
        Ok(RelativePositionCalculator {
            filter: filter.clone(),
            segments,
        })
    }

    fn walk(
        path: Nid,
        end_time: i64,
        depth: usize,
        paths: &dyn PathService,
        end_times: &mut BTreeMap<Nid, i64>,
    ) -> Result<(), KometError> {
        if depth > MAX_ORIGIN_DEPTH {
            return Err(KometError::Configuration(format!(
                "Origin chain through {} exceeds {MAX_ORIGIN_DEPTH} levels",
                METADATA.name_of(path)
            )));
        }
        let origins = paths.origins(path).ok_or_else(|| {
            KometError::Configuration(format!("Unknown path {}", METADATA.name_of(path)))
        })?;
        // A later bound was already propagated from here.
        if end_times.get(&path).is_some_and(|existing| *existing >= end_time) {
            return Ok(());
        }
        end_times.insert(path, end_time);
        for origin in origins {
            Self::walk(
                origin.path(),
                end_time.min(origin.time()),
                depth + 1,
                paths,
                end_times,
            )?;
        }
        Ok(())
    }

    fn ancestors(path: Nid, paths: &dyn PathService) -> Result<BTreeSet<Nid>, KometError> {
        let mut found = BTreeSet::new();
        let mut frontier = vec![(path, 0usize)];
        while let Some((current, depth)) = frontier.pop() {
            if depth > MAX_ORIGIN_DEPTH {
                return Err(KometError::Configuration(format!(
                    "Origin chain of {} exceeds {MAX_ORIGIN_DEPTH} levels",
                    METADATA.name_of(path)
                )));
            }
            for origin in paths.origins(current).unwrap_or_default() {
                if found.insert(origin.path()) {
                    frontier.push((origin.path(), depth + 1));
                }
            }
        }
        Ok(found)
    }

    pub fn filter(&self) -> &StampFilter {
        &self.filter
    }

    pub fn segments(&self) -> impl Iterator<Item = &RouteSegment> {
        self.segments.values()
    }

    /// Whether a version at `position` lies on the route. Cancelled positions never do, and
    /// the uncommitted sentinel only does when the filter observes at [LATEST].
    pub fn on_route(&self, position: StampPosition) -> bool {
        if position.time() == CANCELED {
            return false;
        }
        if position.time() == LATEST && !self.filter.sees_uncommitted() {
            return false;
        }
        self.segments
            .get(&position.path())
            .is_some_and(|segment| position.time() <= segment.end_time)
    }

    /// Whether `path` precedes `other` on this route.
    pub fn path_precedes(&self, path: Nid, other: Nid) -> bool {
        self.segments
            .get(&other)
            .is_some_and(|segment| segment.preceding.contains(&path))
    }

    pub fn relative_position(&self, a: StampPosition, b: StampPosition) -> RelativePosition {
        if !self.on_route(a) || !self.on_route(b) {
            return RelativePosition::Unreachable;
        }
        if a.path() == b.path() {
            return match a.time().cmp(&b.time()) {
                Ordering::Less => RelativePosition::Before,
                Ordering::Equal => RelativePosition::Equal,
                Ordering::Greater => RelativePosition::After,
            };
        }
        if self.path_precedes(a.path(), b.path()) {
            RelativePosition::Before
        } else if self.path_precedes(b.path(), a.path()) {
            RelativePosition::After
        } else {
            RelativePosition::Contradiction
        }
    }

    /// Whether the filter admits `stamp` at all: status, module and route.
    pub fn is_visible(&self, stamp: &Stamp) -> bool {
        self.filter.is_status_allowed(stamp.status)
            && self.filter.is_module_allowed(stamp.module)
            && self.on_route(stamp.position())
    }

    /// Every version the filter admits, in input order.
    pub fn visible_versions<'a, V: Stamped>(&self, versions: &'a [V]) -> Vec<&'a V> {
        versions
            .iter()
            .filter(|v| self.is_visible(v.stamp()))
            .collect()
    }

    /// The current version(s) of one component, whose versions are given in insertion order.
    pub fn latest_version<V: Stamped + Clone>(&self, versions: &[V]) -> LatestVersion<V> {
        let mut candidates: Vec<(usize, &V)> = versions
            .iter()
            .enumerate()
            .filter(|(_, v)| self.is_visible(v.stamp()))
            .collect();
        if candidates.is_empty() {
            return LatestVersion::absent();
        }

        if !self.filter.module_priority().is_empty() {
            let best = candidates
                .iter()
                .map(|(_, v)| self.filter.module_rank(v.stamp().module))
                .min()
                .unwrap_or_default();
            candidates.retain(|(_, v)| self.filter.module_rank(v.stamp().module) == best);
        }

        // Per path, the latest time; per (path, module) at that time, the last written.
        let mut latest_time: BTreeMap<Nid, i64> = BTreeMap::new();
        for (_, v) in &candidates {
            let stamp = v.stamp();
            let entry = latest_time.entry(stamp.path).or_insert(stamp.time);
            *entry = (*entry).max(stamp.time);
        }
        let mut per_path_module: BTreeMap<(Nid, Nid), (usize, &V)> = BTreeMap::new();
        for (index, v) in candidates {
            let stamp = v.stamp();
            if latest_time.get(&stamp.path) != Some(&stamp.time) {
                continue;
            }
            per_path_module.insert((stamp.path, stamp.module), (index, v));
        }

        let mut survivors: Vec<(usize, &V)> = per_path_module
            .values()
            .filter(|(_, v)| {
                let path = v.stamp().path;
                !per_path_module
                    .keys()
                    .any(|(other, _)| *other != path && self.path_precedes(path, *other))
            })
            .copied()
            .collect();
        survivors.sort_by_key(|(index, v)| {
            let stamp = v.stamp();
            (
                self.filter.module_rank(stamp.module),
                stamp.module,
                Reverse(stamp.time),
                stamp.path,
                Reverse(*index),
            )
        });
        let mut survivors = survivors.into_iter().map(|(_, v)| v.clone());
        let Some(primary) = survivors.next() else {
            return LatestVersion::absent();
        };
        let others: Vec<V> = survivors.collect();
        if others.is_empty() {
            LatestVersion::of(primary)
        } else {
            tracing::debug!(
                "{} equally current versions under {}",
                others.len() + 1,
                self.filter
            );
            LatestVersion::contradicted(primary, others)
        }
    }
}

impl Display for RelativePosition {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}
