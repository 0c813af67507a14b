//! Partition summaries and the machine-readable run report.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::PartitionConfig;
use crate::entity::LabelInfo;
use crate::error::PartitionError;
use crate::graph::EntityGraph;
use crate::ingest::IngestStats;
use crate::merge::SplitPlan;
use crate::remove::RoundStats;

/// Label × partition entity counts over the live entities.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartitionTable {
    /// Row names, in label id order.
    pub labels: Vec<String>,
    /// `counts[label][partition]`.
    pub counts: Vec<Vec<usize>>,
}

impl PartitionTable {
    /// Counts the live entities of `graph` over partitions `0..n_partitions`.
    ///
    /// Entities whose cluster lies outside that range are not counted.
    pub fn from_graph(graph: &EntityGraph, n_partitions: usize) -> Self {
        let labels: Vec<String> = graph.labels().iter().map(|(name, _)| name.to_string()).collect();
        let mut counts = vec![vec![0usize; n_partitions]; labels.len()];
        for id in graph.entity_ids() {
            let partition = graph.cluster(id).index();
            if partition >= n_partitions {
                continue;
            }
            if let Some(entity) = graph.entity(id) {
                counts[entity.label.index()][partition] += 1;
            }
        }
        PartitionTable { labels, counts }
    }

    pub fn n_partitions(&self) -> usize {
        self.counts.first().map_or(0, Vec::len)
    }

    /// Entities per partition.
    pub fn partition_totals(&self) -> Vec<usize> {
        let mut totals = vec![0usize; self.n_partitions()];
        for row in &self.counts {
            for (total, count) in totals.iter_mut().zip(row) {
                *total += count;
            }
        }
        totals
    }

    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }

    pub fn score(&self) -> f64 {
        score_partitioning(&self.counts)
    }

    /// Fails when any partition holds no entity at all.
    pub fn ensure_complete(&self) -> Result<(), PartitionError> {
        let requested = self.n_partitions();
        let lost = self.partition_totals().iter().filter(|&&t| t == 0).count();
        if lost > 0 {
            return Err(PartitionError::InsufficientData { requested, lost });
        }
        Ok(())
    }

    /// Logs one line per label.
    pub fn log(&self, stage: &str) {
        for (label, row) in self.labels.iter().zip(&self.counts) {
            info!(stage, label = %label, counts = ?row, "partition table");
        }
        info!(stage, score = self.score(), totals = ?self.partition_totals(), "partitioning score");
    }
}

/// Balance score of a label × partition count table.
///
/// Geometric mean over labels of each label's geometric mean over
/// partitions. Zero cells are left out of the products but still count
/// towards the exponents. Computed in log space.
pub fn score_partitioning(counts: &[Vec<usize>]) -> f64 {
    if counts.is_empty() {
        return 0.0;
    }
    let rows = counts.len() as f64;
    let mut log_total = 0.0;
    for row in counts {
        if row.is_empty() {
            return 0.0;
        }
        let cols = row.len() as f64;
        let log_row: f64 = row
            .iter()
            .filter(|&&count| count > 0)
            .map(|&count| (count as f64).ln())
            .sum();
        log_total += log_row / cols;
    }
    (log_total / rows).exp()
}

/// Everything reported about one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    pub config: PartitionConfig,
    pub threshold_transformed: f64,
    pub labels_start: IndexMap<String, LabelInfo>,
    pub ingest: IngestStats,
    pub graph_edges_start: usize,
    pub mini_clusters: usize,
    pub split: Option<SplitPlan>,
    pub partitioning_pre_removal: PartitionTable,
    pub partitioning_after_removal: PartitionTable,
    pub samples_pre_removal: usize,
    pub samples_after_removal: usize,
    pub score_pre_removal: f64,
    pub score_after_removal: f64,
    pub removal_step_1: Vec<RoundStats>,
    pub removal_step_2: Vec<RoundStats>,
    pub removal_needed_end: bool,
    /// Seconds spent building the graph and ingesting edges.
    pub time_edges_seconds: f64,
    /// Seconds for the whole run.
    pub time_total_seconds: f64,
}

impl RunReport {
    pub fn to_json(&self) -> Result<String, PartitionError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityInput;
    use crate::id::PartitionId;

    #[test]
    fn perfectly_balanced_table_scores_its_cell_value() {
        let counts = vec![vec![4, 4], vec![4, 4]];
        assert!((score_partitioning(&counts) - 4.0).abs() < 1e-12);
    }

    #[test]
    fn zero_cells_are_skipped_but_still_count_as_columns() {
        // Row 0: (9 * 1)^(1/2) = 3. Row 1: 4^(1/2) = 2. Score: sqrt(6).
        let counts = vec![vec![9, 1], vec![4, 0]];
        assert!((score_partitioning(&counts) - 6f64.sqrt()).abs() < 1e-12);
        assert_eq!(score_partitioning(&[]), 0.0);
    }

    #[test]
    fn table_counts_live_entities() {
        let mut g = EntityGraph::from_entities([
            EntityInput::new("a").with_label("x"),
            EntityInput::new("b").with_label("y"),
            EntityInput::new("c").with_label("x"),
        ])
        .unwrap();
        let (a, b, c) = (g.lookup("a").unwrap(), g.lookup("b").unwrap(), g.lookup("c").unwrap());
        g.set_cluster(a, PartitionId(0));
        g.set_cluster(b, PartitionId(0));
        g.set_cluster(c, PartitionId(1));

        let table = PartitionTable::from_graph(&g, 2);
        assert_eq!(table.labels, vec!["x", "y"]);
        assert_eq!(table.counts, vec![vec![1, 1], vec![1, 0]]);
        assert_eq!(table.total(), 3);
        assert!(table.ensure_complete().is_ok());

        g.remove_entity(c);
        let table = PartitionTable::from_graph(&g, 2);
        assert!(matches!(
            table.ensure_complete(),
            Err(PartitionError::InsufficientData { requested: 2, lost: 1 })
        ));
    }
}
