//! Class-balanced placement of mini-clusters into partitions.
//!
//! Greedy: each mini-cluster goes, whole, to the partition where it least
//! increases the per-class concentration. Partition/class counts start at 1
//! so that empty partitions do not divide by zero.

use tracing::debug;

use crate::error::PartitionError;
use crate::graph::EntityGraph;
use crate::id::PartitionId;
use crate::init::MiniClusters;

/// Returns the partition index for every cluster, given each cluster's
/// per-class counts.
///
/// For each cluster, in order, the partition minimizing
/// `sum_c current[p][c] / (current[p][c] + cluster[c])` wins; ties go to the
/// lowest partition index.
pub fn balance_assignment(cluster_counts: &[Vec<u32>], n_partitions: usize, n_classes: usize) -> Vec<usize> {
    let mut loc = vec![vec![1.0f64; n_classes]; n_partitions];
    let mut assignment = Vec::with_capacity(cluster_counts.len());

    for counts in cluster_counts {
        let mut best = 0usize;
        let mut best_score = f64::INFINITY;
        for (p, row) in loc.iter().enumerate() {
            let score: f64 = row
                .iter()
                .enumerate()
                .map(|(c, &current)| {
                    let added = counts.get(c).copied().unwrap_or(0) as f64;
                    current / (current + added)
                })
                .sum();
            if score < best_score {
                best_score = score;
                best = p;
            }
        }
        for (c, &added) in counts.iter().enumerate().take(n_classes) {
            loc[best][c] += added as f64;
        }
        assignment.push(best);
    }
    assignment
}

/// Assigns every mini-cluster to one of `n_partitions` partitions and writes
/// the result into the partition graph.
pub fn assign_partitions(
    graph: &mut EntityGraph,
    clusters: &MiniClusters,
    n_partitions: usize,
) -> Result<Vec<usize>, PartitionError> {
    if n_partitions == 0 {
        return Err(PartitionError::config("number of partitions must be at least 1"));
    }
    let n_classes = graph.labels().len();
    let mut cluster_counts = Vec::with_capacity(clusters.len());
    for members in clusters.iter() {
        let mut counts = vec![0u32; n_classes];
        for &id in members {
            let entity = graph.entity(id).ok_or_else(|| PartitionError::Consistency {
                reason: format!("mini-cluster member {} is not in the graph", id),
            })?;
            counts[entity.label.index()] += 1;
        }
        cluster_counts.push(counts);
    }

    let assignment = balance_assignment(&cluster_counts, n_partitions, n_classes);
    for (members, &partition) in clusters.iter().zip(&assignment) {
        for &id in members {
            graph.set_cluster(id, PartitionId(partition as u32));
        }
    }
    debug!(clusters = clusters.len(), n_partitions, "assigned mini-clusters");
    Ok(assignment)
}
