//! Mini-cluster initialization.
//!
//! Builds the starting clusters on the partition graph. In the
//! nearest-neighbour modes full-graph edges are scanned in ascending metric
//! order and linked whenever the merged mini-cluster stays within the
//! partition size budget and the per-label limits. The connected components
//! of the resulting link graph are the mini-clusters that the assigner places
//! as indivisible units.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::disjoint::DisjointSet;
use crate::error::PartitionError;
use crate::graph::{EntityGraph, LabelCounts};
use crate::id::{EntityId, PartitionId};

/// Initialization strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InitMode {
    /// Every entity is its own mini-cluster.
    Simple,
    /// Restricted nearest-neighbour linkage; merged size and label counts
    /// are written to every member after each link.
    #[default]
    SlowNn,
    /// Restricted nearest-neighbour linkage; only the query endpoint's
    /// cached size and label counts are updated, so other members may
    /// carry stale bookkeeping into later checks.
    FastNn,
}

impl InitMode {
    pub fn name(self) -> &'static str {
        match self {
            InitMode::Simple => "simple",
            InitMode::SlowNn => "slow-nn",
            InitMode::FastNn => "fast-nn",
        }
    }
}

impl fmt::Display for InitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for InitMode {
    type Err = PartitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "simple" => Ok(InitMode::Simple),
            "slow-nn" => Ok(InitMode::SlowNn),
            "fast-nn" => Ok(InitMode::FastNn),
            other => Err(PartitionError::config(format!(
                "unknown initialization mode '{}', expected simple/slow-nn/fast-nn",
                other
            ))),
        }
    }
}

/// Mini-clusters produced by initialization, each a list of members in
/// insertion order. Clusters are ordered by their first member.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MiniClusters {
    clusters: Vec<Vec<EntityId>>,
}

impl MiniClusters {
    pub fn new(clusters: Vec<Vec<EntityId>>) -> Self {
        MiniClusters { clusters }
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &[EntityId]> {
        self.clusters.iter().map(Vec::as_slice)
    }

    /// Cluster number of every member, indexed by entity.
    pub fn membership(&self) -> impl Iterator<Item = (EntityId, usize)> + '_ {
        self.clusters
            .iter()
            .enumerate()
            .flat_map(|(nr, members)| members.iter().map(move |&id| (id, nr)))
    }
}

/// Initializes the partition graph and returns the mini-clusters.
///
/// `threshold` is in metric space. Every node's `cluster` ends up as its
/// mini-cluster number.
pub fn initialize(
    graph: &mut EntityGraph,
    threshold: f64,
    n_partitions: usize,
    mode: InitMode,
) -> Result<MiniClusters, PartitionError> {
    if n_partitions == 0 {
        return Err(PartitionError::config("number of partitions must be at least 1"));
    }
    let n_labels = graph.labels().len();
    let part_size = graph.node_count() / n_partitions;
    let limits = graph.labels().limits();
    info!(mode = %mode, part_size, ?limits, "initializing mini-clusters");

    let ids: Vec<EntityId> = graph.entity_ids().collect();
    for &id in &ids {
        let label = match graph.entity(id) {
            Some(entity) => entity.label,
            None => continue,
        };
        if let Some(attrs) = graph.attrs_mut(id) {
            attrs.cluster = PartitionId(id.0);
            attrs.component_size = 1;
            attrs.label_counts = EntityGraph::unit_counts(label, n_labels);
        }
    }

    let mut forest = DisjointSet::new(graph.node_bound());
    if mode != InitMode::Simple {
        link_nearest_neighbours(graph, &mut forest, threshold, part_size, &limits, mode)?;
    }

    // Components ordered by their first member in insertion order.
    let mut slot_of_root: Vec<Option<usize>> = vec![None; forest.len()];
    let mut clusters: Vec<Vec<EntityId>> = Vec::new();
    for &id in &ids {
        let root = forest.find(id.index());
        let slot = *slot_of_root[root].get_or_insert_with(|| {
            clusters.push(Vec::new());
            clusters.len() - 1
        });
        clusters[slot].push(id);
    }
    for (nr, members) in clusters.iter().enumerate() {
        for &id in members {
            graph.set_cluster(id, PartitionId(nr as u32));
        }
    }

    info!(
        mini_clusters = clusters.len(),
        links = graph.link_count(),
        "initialization complete"
    );
    Ok(MiniClusters::new(clusters))
}

fn link_nearest_neighbours(
    graph: &mut EntityGraph,
    forest: &mut DisjointSet,
    threshold: f64,
    part_size: usize,
    limits: &[usize],
    mode: InitMode,
) -> Result<(), PartitionError> {
    let edges: Vec<(EntityId, EntityId, f64)> = graph.edges().collect();
    // Equal metrics fall back to the lexicographic id pair.
    let key = |graph: &EntityGraph, a: EntityId, b: EntityId| -> (String, String) {
        let name = |id| graph.entity(id).map(|e| e.name.clone()).unwrap_or_default();
        let (na, nb) = (name(a), name(b));
        if na <= nb {
            (na, nb)
        } else {
            (nb, na)
        }
    };
    let mut keyed: Vec<((String, String), (EntityId, EntityId, f64))> = edges
        .into_iter()
        .map(|(a, b, m)| (key(graph, a, b), (a, b, m)))
        .collect();
    keyed.sort_by(|(ka, (_, _, ma)), (kb, (_, _, mb))| ma.total_cmp(mb).then_with(|| ka.cmp(kb)));

    let mut linked = 0usize;
    for ((name_a, _), (a, b, metric)) in keyed {
        if metric > threshold {
            break;
        }
        if forest.same(a.index(), b.index()) {
            continue;
        }
        // The query endpoint is the lexicographically smaller id.
        let (qry, lib) = match graph.entity(a) {
            Some(entity) if entity.name == name_a => (a, b),
            _ => (b, a),
        };

        let (qry_attrs, lib_attrs) = match (graph.attrs(qry), graph.attrs(lib)) {
            (Some(q), Some(l)) => (q, l),
            _ => {
                return Err(PartitionError::Consistency {
                    reason: format!("edge {}-{} has no partition-graph node", qry, lib),
                })
            }
        };
        if qry_attrs.component_size + lib_attrs.component_size > part_size {
            continue;
        }
        let merged: LabelCounts = qry_attrs
            .label_counts
            .iter()
            .zip(lib_attrs.label_counts.iter())
            .map(|(x, y)| x + y)
            .collect();
        if merged
            .iter()
            .zip(limits)
            .any(|(&count, &limit)| count as usize > limit)
        {
            continue;
        }
        let merged_size = qry_attrs.component_size + lib_attrs.component_size;

        graph.link(qry, lib, metric);
        let root = forest.union(qry.index(), lib.index());
        match mode {
            InitMode::SlowNn => {
                for &member in forest.members(root) {
                    if let Some(attrs) = graph.attrs_mut(EntityId(member as u32)) {
                        attrs.component_size = merged_size;
                        attrs.label_counts = merged.clone();
                    }
                }
            }
            InitMode::FastNn => {
                if let Some(attrs) = graph.attrs_mut(qry) {
                    attrs.component_size = merged_size;
                    attrs.label_counts = merged;
                }
            }
            InitMode::Simple => {}
        }

        linked += 1;
        if linked % 10_000 == 0 {
            debug!(links = linked, metric, "nearest-neighbour linkage progress");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityInput;

    fn build(entities: &[(&str, &str)], edges: &[(&str, &str, f64)], n_partitions: usize) -> EntityGraph {
        let mut g = EntityGraph::from_entities(
            entities
                .iter()
                .map(|(id, label)| EntityInput::new(*id).with_label(*label)),
        )
        .unwrap();
        g.labels_mut().set_limits(n_partitions);
        for (a, b, m) in edges {
            let (a, b) = (g.lookup(a).unwrap(), g.lookup(b).unwrap());
            g.upsert_edge(a, b, *m).unwrap();
        }
        g
    }

    fn names(g: &EntityGraph, clusters: &MiniClusters) -> Vec<Vec<String>> {
        clusters
            .iter()
            .map(|members| {
                members
                    .iter()
                    .map(|&id| g.entity(id).unwrap().name.clone())
                    .collect()
            })
            .collect()
    }

    #[test]
    fn simple_mode_makes_singletons() {
        let mut g = build(&[("a", "x"), ("b", "x")], &[("a", "b", 0.0)], 1);
        let clusters = initialize(&mut g, 0.5, 1, InitMode::Simple).unwrap();
        assert_eq!(clusters.len(), 2);
        assert_eq!(g.link_count(), 0);
    }

    #[test]
    fn links_pairs_under_threshold() {
        let mut g = build(
            &[("1", "A"), ("2", "B"), ("3", "A"), ("4", "B"), ("5", "A"), ("6", "B")],
            &[("1", "2", 0.1), ("3", "4", 0.1), ("5", "6", 0.1)],
            3,
        );
        let clusters = initialize(&mut g, 0.3, 3, InitMode::SlowNn).unwrap();
        assert_eq!(
            names(&g, &clusters),
            vec![vec!["1", "2"], vec!["3", "4"], vec!["5", "6"]]
        );
        let one = g.lookup("1").unwrap();
        assert_eq!(g.attrs(one).unwrap().component_size, 2);
        assert_eq!(g.cluster(g.lookup("4").unwrap()), PartitionId(1));
    }

    #[test]
    fn size_budget_blocks_merges() {
        // part_size = 4 / 2 = 2, so the chain a-b-c cannot become one cluster.
        let mut g = build(
            &[("a", "x"), ("b", "x"), ("c", "x"), ("d", "x")],
            &[("a", "b", 0.1), ("b", "c", 0.2)],
            2,
        );
        let clusters = initialize(&mut g, 0.5, 2, InitMode::SlowNn).unwrap();
        assert_eq!(
            names(&g, &clusters),
            vec![vec!["a", "b"], vec!["c"], vec!["d"]]
        );
    }

    #[test]
    fn label_limits_block_merges() {
        // Label y has one entity, so its limit with 2 partitions is 0.
        let mut g = build(
            &[("a", "x"), ("b", "x"), ("c", "y"), ("d", "x"), ("e", "x")],
            &[("a", "c", 0.1), ("a", "b", 0.2)],
            2,
        );
        let clusters = initialize(&mut g, 0.5, 2, InitMode::SlowNn).unwrap();
        assert_eq!(
            names(&g, &clusters),
            vec![vec!["a", "b"], vec!["c"], vec!["d"], vec!["e"]]
        );
    }

    #[test]
    fn edges_above_threshold_are_not_linked() {
        let mut g = build(&[("a", "x"), ("b", "x")], &[("a", "b", 0.4)], 1);
        let clusters = initialize(&mut g, 0.3, 1, InitMode::FastNn).unwrap();
        assert_eq!(clusters.len(), 2);
    }

    #[test]
    fn fast_mode_updates_only_the_query_endpoint() {
        let mut g = build(
            &[("a", "x"), ("b", "x"), ("c", "x"), ("d", "x")],
            &[("a", "b", 0.1)],
            1,
        );
        initialize(&mut g, 0.5, 1, InitMode::FastNn).unwrap();
        assert_eq!(g.attrs(g.lookup("a").unwrap()).unwrap().component_size, 2);
        assert_eq!(g.attrs(g.lookup("b").unwrap()).unwrap().component_size, 1);
    }

    #[test]
    fn equal_metrics_are_scanned_in_id_order() {
        // a-b and a-c link first, after which b-c is internal.
        let mut g = build(
            &[("a", "x"), ("b", "x"), ("c", "x")],
            &[("a", "b", 0.1), ("b", "c", 0.1), ("a", "c", 0.1)],
            1,
        );
        initialize(&mut g, 0.5, 1, InitMode::SlowNn).unwrap();
        assert_eq!(g.link_count(), 2);
    }

    #[test]
    fn parse_modes() {
        assert_eq!("fast-nn".parse::<InitMode>().unwrap(), InitMode::FastNn);
        assert!("fastest".parse::<InitMode>().is_err());
    }
}
