//! EntityGraph: the dual-graph container for one partitioning run.
//!
//! # Dual-Graph Architecture
//!
//! Two undirected `StableGraph`s share one node set:
//! - **Full graph** (`StableGraph<Entity, f64>`): every pair whose metric is
//!   within the threshold, weighted by the minimum metric ever observed for
//!   the pair. Edges are only written during ingestion; later phases only
//!   delete nodes.
//! - **Partition graph** (`StableGraph<PartitionAttrs, f64>`): per-node
//!   cluster bookkeeping plus the restricted nearest-neighbour links created
//!   by the initializer.
//!
//! Nodes are added to both graphs in lockstep, so an [`EntityId`] indexes the
//! same entity in either graph. Removal only touches the full graph: the
//! partition graph keeps the last known cluster of removed entities.

use std::collections::HashMap;

use petgraph::graph::NodeIndex;
use petgraph::stable_graph::StableGraph;
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use petgraph::Undirected;
use smallvec::SmallVec;

use crate::entity::{Entity, EntityInput, LabelRegistry, DEFAULT_LABEL};
use crate::error::PartitionError;
use crate::id::{EntityId, LabelId, PartitionId};

/// Per-label entity counts of a mini-cluster or partition.
pub type LabelCounts = SmallVec<[u32; 4]>;

/// Partition-graph node weight.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionAttrs {
    /// Current mini-cluster or partition number.
    pub cluster: PartitionId,
    /// Size of the mini-cluster this node represents during initialization.
    pub component_size: usize,
    /// Label counts accumulated in that mini-cluster.
    pub label_counts: LabelCounts,
}

/// Outcome of [`EntityGraph::upsert_edge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeUpdate {
    Inserted,
    /// An existing edge got a smaller metric.
    Lowered,
    /// An existing edge already had a metric at least as small.
    Kept,
}

/// The dual-graph entity container.
#[derive(Debug, Clone, Default)]
pub struct EntityGraph {
    full: StableGraph<Entity, f64, Undirected, u32>,
    part: StableGraph<PartitionAttrs, f64, Undirected, u32>,
    names: HashMap<String, EntityId>,
    labels: LabelRegistry,
}

impl EntityGraph {
    pub fn new() -> Self {
        EntityGraph::default()
    }

    /// Builds both graphs from an entity list.
    ///
    /// Errors on duplicate ids.
    pub fn from_entities<I>(entities: I) -> Result<Self, PartitionError>
    where
        I: IntoIterator<Item = EntityInput>,
    {
        let mut graph = EntityGraph::new();
        for entity in entities {
            graph.add_entity(entity)?;
        }
        Ok(graph)
    }

    // -----------------------------------------------------------------------
    // Node methods
    // -----------------------------------------------------------------------

    /// Adds one entity to both graphs. The partition-graph node starts as a
    /// singleton cluster numbered after the entity.
    pub fn add_entity(&mut self, input: EntityInput) -> Result<EntityId, PartitionError> {
        if self.names.contains_key(&input.id) {
            return Err(PartitionError::config(format!(
                "duplicate entity id '{}'",
                input.id
            )));
        }
        let label = self
            .labels
            .intern(input.label.as_deref().unwrap_or(DEFAULT_LABEL));

        let idx = self.full.add_node(Entity {
            name: input.id.clone(),
            label,
            priority: input.priority,
        });
        let part_idx = self.part.add_node(PartitionAttrs {
            cluster: PartitionId(idx.index() as u32),
            component_size: 1,
            label_counts: LabelCounts::new(),
        });
        if idx != part_idx {
            return Err(PartitionError::Consistency {
                reason: format!(
                    "full graph node {} and partition graph node {} diverged",
                    idx.index(),
                    part_idx.index()
                ),
            });
        }

        let id = EntityId::from(idx);
        self.names.insert(input.id, id);
        Ok(id)
    }

    /// Deletes an entity from the full graph along with its edges.
    pub fn remove_entity(&mut self, id: EntityId) -> Option<Entity> {
        self.full.remove_node(id.into())
    }

    /// Looks up an entity by name. Removed entities are still resolved.
    pub fn lookup(&self, name: &str) -> Option<EntityId> {
        self.names.get(name).copied()
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.full.node_weight(id.into())
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.full.contains_node(id.into())
    }

    /// Live entities in insertion order.
    pub fn entity_ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.full.node_indices().map(EntityId::from)
    }

    pub fn node_count(&self) -> usize {
        self.full.node_count()
    }

    /// Upper bound on entity indices, including removed ones.
    pub fn node_bound(&self) -> usize {
        self.part.node_count()
    }

    pub fn labels(&self) -> &LabelRegistry {
        &self.labels
    }

    pub fn labels_mut(&mut self) -> &mut LabelRegistry {
        &mut self.labels
    }

    /// Name-to-id index, used by concurrent ingestion.
    pub fn name_index(&self) -> &HashMap<String, EntityId> {
        &self.names
    }

    // -----------------------------------------------------------------------
    // Full-graph edge methods
    // -----------------------------------------------------------------------

    /// Inserts the edge `a - b`, or lowers its metric if a smaller one is
    /// offered. A larger metric never overwrites a smaller one.
    pub fn upsert_edge(
        &mut self,
        a: EntityId,
        b: EntityId,
        metric: f64,
    ) -> Result<EdgeUpdate, PartitionError> {
        let (ai, bi): (NodeIndex<u32>, NodeIndex<u32>) = (a.into(), b.into());
        if !self.full.contains_node(ai) || !self.full.contains_node(bi) {
            return Err(PartitionError::Consistency {
                reason: format!("edge {}-{} references a missing node", a, b),
            });
        }
        match self.full.find_edge(ai, bi) {
            Some(edge) => {
                let weight = &mut self.full[edge];
                if metric < *weight {
                    *weight = metric;
                    Ok(EdgeUpdate::Lowered)
                } else {
                    Ok(EdgeUpdate::Kept)
                }
            }
            None => {
                self.full.add_edge(ai, bi, metric);
                Ok(EdgeUpdate::Inserted)
            }
        }
    }

    /// Metric of the edge `a - b`, if present.
    pub fn metric(&self, a: EntityId, b: EntityId) -> Option<f64> {
        self.full
            .find_edge(a.into(), b.into())
            .map(|edge| self.full[edge])
    }

    /// Neighbours of `id` in the full graph with the connecting metric.
    pub fn neighbors(&self, id: EntityId) -> impl Iterator<Item = (EntityId, f64)> + '_ {
        self.full
            .edges(id.into())
            .map(|edge| (EntityId::from(edge.target()), *edge.weight()))
    }

    /// All full-graph edges as `(a, b, metric)`.
    pub fn edges(&self) -> impl Iterator<Item = (EntityId, EntityId, f64)> + '_ {
        self.full.edge_references().map(|edge| {
            (
                EntityId::from(edge.source()),
                EntityId::from(edge.target()),
                *edge.weight(),
            )
        })
    }

    pub fn edge_count(&self) -> usize {
        self.full.edge_count()
    }

    // -----------------------------------------------------------------------
    // Partition-graph methods
    // -----------------------------------------------------------------------

    pub fn attrs(&self, id: EntityId) -> Option<&PartitionAttrs> {
        self.part.node_weight(id.into())
    }

    pub fn attrs_mut(&mut self, id: EntityId) -> Option<&mut PartitionAttrs> {
        self.part.node_weight_mut(id.into())
    }

    /// Current cluster of `id`. Entities are never removed from the
    /// partition graph, so this is defined for every id handed out.
    pub fn cluster(&self, id: EntityId) -> PartitionId {
        self.part[NodeIndex::from(id)].cluster
    }

    pub fn set_cluster(&mut self, id: EntityId, cluster: PartitionId) {
        self.part[NodeIndex::from(id)].cluster = cluster;
    }

    /// Adds an initializer link `a - b` to the partition graph.
    pub fn link(&mut self, a: EntityId, b: EntityId, metric: f64) {
        self.part.add_edge(a.into(), b.into(), metric);
    }

    pub fn link_count(&self) -> usize {
        self.part.edge_count()
    }

    /// One-hot label counts for `label` over `n_labels` labels.
    pub fn unit_counts(label: LabelId, n_labels: usize) -> LabelCounts {
        let mut counts = LabelCounts::from_elem(0, n_labels);
        counts[label.index()] = 1;
        counts
    }

    /// Distinct clusters among live entities, ascending.
    pub fn live_clusters(&self) -> Vec<PartitionId> {
        let mut clusters: Vec<PartitionId> = self.entity_ids().map(|id| self.cluster(id)).collect();
        clusters.sort_unstable();
        clusters.dedup();
        clusters
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three() -> EntityGraph {
        EntityGraph::from_entities([
            EntityInput::new("a").with_label("x"),
            EntityInput::new("b").with_label("y"),
            EntityInput::new("c"),
        ])
        .unwrap()
    }

    #[test]
    fn entities_share_ids_across_both_graphs() {
        let g = three();
        let b = g.lookup("b").unwrap();
        assert_eq!(g.entity(b).unwrap().name, "b");
        assert_eq!(g.cluster(b), PartitionId(1));
        assert_eq!(g.attrs(b).unwrap().component_size, 1);
    }

    #[test]
    fn missing_label_defaults_to_zero() {
        let g = three();
        let c = g.lookup("c").unwrap();
        let label = g.entity(c).unwrap().label;
        assert_eq!(g.labels().name(label), Some(DEFAULT_LABEL));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let err = EntityGraph::from_entities([EntityInput::new("a"), EntityInput::new("a")])
            .unwrap_err();
        assert!(matches!(err, PartitionError::Configuration { .. }));
    }

    #[test]
    fn upsert_keeps_the_minimum() {
        let mut g = three();
        let (a, b) = (g.lookup("a").unwrap(), g.lookup("b").unwrap());
        assert_eq!(g.upsert_edge(a, b, 0.2).unwrap(), EdgeUpdate::Inserted);
        assert_eq!(g.upsert_edge(b, a, 0.5).unwrap(), EdgeUpdate::Kept);
        assert_eq!(g.metric(a, b), Some(0.2));
        assert_eq!(g.upsert_edge(b, a, 0.1).unwrap(), EdgeUpdate::Lowered);
        assert_eq!(g.metric(b, a), Some(0.1));
        assert_eq!(g.edge_count(), 1);
    }

    #[test]
    fn removal_only_touches_the_full_graph() {
        let mut g = three();
        let (a, b) = (g.lookup("a").unwrap(), g.lookup("b").unwrap());
        g.upsert_edge(a, b, 0.2).unwrap();
        g.remove_entity(a);
        assert_eq!(g.node_count(), 2);
        assert_eq!(g.edge_count(), 0);
        assert!(!g.contains(a));
        assert_eq!(g.cluster(a), PartitionId(0));
        assert_eq!(g.entity_ids().collect::<Vec<_>>(), vec![b, g.lookup("c").unwrap()]);
    }

    #[test]
    fn upsert_on_removed_node_is_a_consistency_error() {
        let mut g = three();
        let (a, b) = (g.lookup("a").unwrap(), g.lookup("b").unwrap());
        g.remove_entity(b);
        assert!(matches!(
            g.upsert_edge(a, b, 0.1),
            Err(PartitionError::Consistency { .. })
        ));
    }
}
