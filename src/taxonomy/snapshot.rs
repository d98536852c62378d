use petgraph::{graphmap::DiGraphMap, Direction};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet, VecDeque},
    fmt::{Debug, Formatter},
    sync::Arc,
};

use crate::{
    calculator::RelativePositionCalculator,
    chronology::VersionData,
    coordinate::{ManifoldCoordinate, VertexSort},
    identifier::Nid,
    logic::LogicalExpression,
    metadata::{IS_A, METADATA},
    stamp::Stamp,
    store::ChronologyStore,
};

/// Weight of one origin → destination edge. One logic graph may state several relationship
/// types between the same pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaxonomyEdge {
    pub types: BTreeSet<Nid>,
    /// Logic graph semantic the edge was read from.
    pub semantic: Nid,
    pub stamp: Stamp,
}

/// A typed edge as returned by link queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaxonomyLink {
    pub origin: Nid,
    pub destination: Nid,
    pub relationship_type: Nid,
    pub semantic: Nid,
}

/// The concept graph visible at one [ManifoldCoordinate].
///
/// Edges point from a concept to its parents (and role fillers). Taxonomy queries follow only
/// the navigation coordinate's taxonomy types; the `all_relationship_*` queries follow every
/// type. A nid with no visible logic graph has no parents and no children.
pub struct TaxonomySnapshot {
    manifold: ManifoldCoordinate,
    graph: DiGraphMap<Nid, TaxonomyEdge>,
    duplicates: BTreeMap<(Nid, Nid), Vec<Nid>>,
    store: Arc<dyn ChronologyStore>,
    vertex_calc: Arc<RelativePositionCalculator>,
}

impl Debug for TaxonomySnapshot {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaxonomySnapshot")
            .field("manifold", &self.manifold.to_user_string())
            .field("concepts", &self.graph.node_count())
            .field("edges", &self.graph.edge_count())
            .finish()
    }
}

impl TaxonomySnapshot {
    /// Read every navigated logic graph visible under the view filter and keep the concepts
    /// the vertex filter shows as active.
    pub fn build(
        manifold: &ManifoldCoordinate,
        store: Arc<dyn ChronologyStore>,
        view_calc: &RelativePositionCalculator,
        vertex_calc: Arc<RelativePositionCalculator>,
    ) -> TaxonomySnapshot {
        let mut graph: DiGraphMap<Nid, TaxonomyEdge> = DiGraphMap::new();
        let mut duplicates = BTreeMap::new();
        let mut is_vertex = BTreeMap::<Nid, bool>::new();
        let mut vertex_visible = |nid: Nid| {
            *is_vertex.entry(nid).or_insert_with(|| {
                store
                    .get_latest_version(nid, &vertex_calc)
                    .get()
                    .is_some_and(|v| v.stamp.status.is_active())
            })
        };

        for assemblage in manifold.navigation.navigation_assemblages() {
            let mut by_concept: BTreeMap<Nid, Vec<(Nid, Stamp, LogicalExpression)>> =
                BTreeMap::new();
            for semantic in store.semantic_nids_of_assemblage(*assemblage) {
                let Some(chronology) = store.get_chronology(semantic) else {
                    continue;
                };
                let Some(concept) = chronology.referenced_component() else {
                    continue;
                };
                let latest = chronology.latest_version(view_calc);
                if latest.is_contradicted() {
                    tracing::warn!(
                        "Logic graph semantic {semantic} of concept {concept} has {} contradictory \
                         versions under {}; using the first",
                        latest.len(),
                        view_calc.filter()
                    );
                }
                let Some(version) = latest.into_value() else {
                    continue;
                };
                if !version.stamp.status.is_active() {
                    continue;
                }
                match version.data {
                    VersionData::LogicGraph(expression) => by_concept
                        .entry(concept)
                        .or_default()
                        .push((semantic, version.stamp, expression)),
                    other => tracing::error!(
                        "Semantic {semantic} of concept {concept} in {} holds {} data, not a \
                         logic graph",
                        METADATA.name_of(*assemblage),
                        other.kind_name()
                    ),
                }
            }

            for (concept, mut graphs) in by_concept {
                if graphs.len() > 1 {
                    let semantics = graphs.iter().map(|(s, _, _)| *s).collect::<Vec<_>>();
                    tracing::error!(
                        "Concept {concept} has {} {} logic graphs {:?} under {}; using the first",
                        graphs.len(),
                        METADATA.name_of(*assemblage),
                        semantics,
                        view_calc.filter()
                    );
                    duplicates.insert((concept, *assemblage), semantics);
                }
                let (semantic, stamp, expression) = graphs.swap_remove(0);
                if !vertex_visible(concept) {
                    continue;
                }
                graph.add_node(concept);
                let mut targets: Vec<(Nid, Nid)> = expression
                    .parent_concepts()
                    .into_iter()
                    .map(|parent| (parent, IS_A.nid))
                    .collect();
                targets.extend(
                    expression
                        .role_restrictions()
                        .into_iter()
                        .filter_map(|r| r.filler.map(|filler| (filler, r.role_type))),
                );
                for (destination, relationship_type) in targets {
                    if !vertex_visible(destination) {
                        tracing::debug!(
                            "Dropped edge {concept} -> {destination}: destination not visible"
                        );
                        continue;
                    }
                    match graph.edge_weight_mut(concept, destination) {
                        Some(edge) => {
                            edge.types.insert(relationship_type);
                        }
                        None => {
                            graph.add_edge(
                                concept,
                                destination,
                                TaxonomyEdge {
                                    types: BTreeSet::from([relationship_type]),
                                    semantic,
                                    stamp,
                                },
                            );
                        }
                    }
                }
            }
        }
        tracing::debug!(
            "Built taxonomy with {} concepts and {} edges for {}",
            graph.node_count(),
            graph.edge_count(),
            manifold.to_user_string()
        );
        TaxonomySnapshot {
            manifold: manifold.clone(),
            graph,
            duplicates,
            store,
            vertex_calc,
        }
    }

    pub fn manifold(&self) -> &ManifoldCoordinate {
        &self.manifold
    }

    pub fn concept_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn contains(&self, nid: Nid) -> bool {
        self.graph.contains_node(nid)
    }

    /// Concepts found with more than one logic graph in one assemblage, keyed by
    /// (concept, assemblage).
    pub fn duplicate_logic_graphs(&self) -> &BTreeMap<(Nid, Nid), Vec<Nid>> {
        &self.duplicates
    }

    fn is_taxonomy_edge(&self, edge: &TaxonomyEdge) -> bool {
        edge.types
            .iter()
            .any(|t| self.manifold.navigation.taxonomy_types().contains(t))
    }

    fn neighbors(&self, nid: Nid, direction: Direction, taxonomy_only: bool) -> BTreeSet<Nid> {
        if !self.graph.contains_node(nid) {
            return BTreeSet::new();
        }
        self.graph
            .neighbors_directed(nid, direction)
            .filter(|other| {
                let (origin, destination) = match direction {
                    Direction::Outgoing => (nid, *other),
                    Direction::Incoming => (*other, nid),
                };
                self.graph
                    .edge_weight(origin, destination)
                    .is_some_and(|edge| !taxonomy_only || self.is_taxonomy_edge(edge))
            })
            .collect()
    }

    fn links(&self, nid: Nid, direction: Direction) -> Vec<TaxonomyLink> {
        let mut links = Vec::new();
        for other in self.neighbors(nid, direction, true) {
            let (origin, destination) = match direction {
                Direction::Outgoing => (nid, other),
                Direction::Incoming => (other, nid),
            };
            let Some(edge) = self.graph.edge_weight(origin, destination) else {
                continue;
            };
            links.extend(
                edge.types
                    .iter()
                    .filter(|t| self.manifold.navigation.taxonomy_types().contains(t))
                    .map(|t| TaxonomyLink {
                        origin,
                        destination,
                        relationship_type: *t,
                        semantic: edge.semantic,
                    }),
            );
        }
        links
    }

    pub fn taxonomy_parent_concept_nids(&self, nid: Nid) -> BTreeSet<Nid> {
        self.neighbors(nid, Direction::Outgoing, true)
    }

    pub fn taxonomy_child_concept_nids(&self, nid: Nid) -> BTreeSet<Nid> {
        self.neighbors(nid, Direction::Incoming, true)
    }

    pub fn taxonomy_parent_links(&self, nid: Nid) -> Vec<TaxonomyLink> {
        self.links(nid, Direction::Outgoing)
    }

    pub fn taxonomy_child_links(&self, nid: Nid) -> Vec<TaxonomyLink> {
        self.links(nid, Direction::Incoming)
    }

    /// Origins of every relationship ending at `nid`, whatever its type.
    pub fn all_relationship_origin_nids(&self, nid: Nid) -> BTreeSet<Nid> {
        self.neighbors(nid, Direction::Incoming, false)
    }

    /// Destinations of every relationship starting at `nid`, whatever its type.
    pub fn all_relationship_destination_nids(&self, nid: Nid) -> BTreeSet<Nid> {
        self.neighbors(nid, Direction::Outgoing, false)
    }

    /// True for nids without children, including nids not in the snapshot.
    pub fn is_leaf(&self, nid: Nid) -> bool {
        self.taxonomy_child_concept_nids(nid).is_empty()
    }

    pub fn is_root(&self, nid: Nid) -> bool {
        self.contains(nid) && self.taxonomy_parent_concept_nids(nid).is_empty()
    }

    pub fn roots(&self) -> BTreeSet<Nid> {
        self.graph.nodes().filter(|nid| self.is_root(*nid)).collect()
    }

    pub fn is_child_of(&self, child: Nid, parent: Nid) -> bool {
        self.taxonomy_parent_concept_nids(child).contains(&parent)
    }

    /// `child` is `parent` or one of its descendants.
    pub fn is_kind_of(&self, child: Nid, parent: Nid) -> bool {
        if child == parent {
            return self.contains(child);
        }
        let mut seen = BTreeSet::from([child]);
        let mut queue = VecDeque::from([child]);
        while let Some(next) = queue.pop_front() {
            for ancestor in self.taxonomy_parent_concept_nids(next) {
                if ancestor == parent {
                    return true;
                }
                if seen.insert(ancestor) {
                    queue.push_back(ancestor);
                }
            }
        }
        false
    }

    /// `nid` and all of its descendants.
    pub fn kind_of_set(&self, nid: Nid) -> BTreeSet<Nid> {
        if !self.contains(nid) {
            return BTreeSet::new();
        }
        let mut seen = BTreeSet::from([nid]);
        let mut queue = VecDeque::from([nid]);
        while let Some(next) = queue.pop_front() {
            for child in self.taxonomy_child_concept_nids(next) {
                if seen.insert(child) {
                    queue.push_back(child);
                }
            }
        }
        seen
    }

    /// Children in the manifold's vertex order. Unnamed concepts sort after named ones.
    pub fn sorted_children(&self, nid: Nid) -> Vec<Nid> {
        let children = self.taxonomy_child_concept_nids(nid);
        let language = &self.manifold.language;
        let name = |child: Nid| match self.manifold.vertex_sort {
            VertexSort::Natural => None,
            VertexSort::ByRegularName => {
                language.regular_name_text(child, self.store.as_ref(), &self.vertex_calc)
            }
            VertexSort::ByFullyQualifiedName => {
                language.fully_qualified_name_text(child, self.store.as_ref(), &self.vertex_calc)
            }
        };
        let mut keyed = children
            .into_iter()
            .map(|child| (name(child).map(|n| n.to_lowercase()), child))
            .collect::<Vec<_>>();
        keyed.sort_by(|(a_name, a), (b_name, b)| match (a_name, b_name) {
            (Some(x), Some(y)) => x.cmp(y).then(a.cmp(b)),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.cmp(b),
        });
        keyed.into_iter().map(|(_, child)| child).collect()
    }
}
