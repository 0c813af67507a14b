//! Threshold enforcement by relocation and removal.
//!
//! After assignment, entities may still have sub-threshold neighbours in
//! other partitions. [`remover`] runs rounds of (optional) relocation to the
//! most neighbourly partition followed by removal of the worst offenders
//! until no such edge is left or no further progress is possible.
//! [`enforce_threshold`] runs the priority-respecting pass, then the pass
//! that may also remove priority entities, and fails loudly if violations
//! survive both.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::PartitionError;
use crate::graph::EntityGraph;
use crate::id::{EntityId, PartitionId};

/// Switches for one removal pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemovalOptions {
    /// Move entities to the partition holding most of their sub-threshold
    /// neighbours before scoring.
    pub move_to_most_neighbourly: bool,
    /// Priority entities are never selected for removal (they may still move).
    pub ignore_priority: bool,
    /// Score by cross-partition neighbour count only. When false, pairs of
    /// same-partition and cross-partition neighbours whose metrics add up to
    /// at least the threshold count as extra risk.
    pub simplistic_removal: bool,
}

impl Default for RemovalOptions {
    fn default() -> Self {
        RemovalOptions {
            move_to_most_neighbourly: true,
            ignore_priority: true,
            simplistic_removal: true,
        }
    }
}

/// Statistics for one removal round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundStats {
    pub round: usize,
    /// Smallest sub-threshold cross-partition metric seen this round.
    pub min_cross_metric: Option<f64>,
    pub entities: usize,
    pub edges: usize,
    /// Sum of all connectivity scores.
    pub connectivity: usize,
    /// Entities with a positive connectivity score.
    pub problematic: usize,
    pub relocated: usize,
    pub removed: usize,
}

/// A cross-partition edge below the threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub a: EntityId,
    pub b: EntityId,
    pub metric: f64,
}

/// Returns the first full-graph edge below `threshold` that crosses
/// partitions, if any.
pub fn find_violation(graph: &EntityGraph, threshold: f64) -> Option<Violation> {
    graph
        .edges()
        .find(|&(a, b, metric)| metric < threshold && graph.cluster(a) != graph.cluster(b))
        .map(|(a, b, metric)| Violation { a, b, metric })
}

/// True when some cross-partition edge is still below `threshold`.
pub fn removal_needed(graph: &EntityGraph, threshold: f64) -> bool {
    find_violation(graph, threshold).is_some()
}

/// Number of entities removed in `round` given the current problem count:
/// `ceil(log10(round) * problematic / 100) + 1`.
pub fn removal_batch_size(round: usize, problematic: usize) -> usize {
    let scaled = (round.max(1) as f64).log10() * problematic as f64 / 100.0;
    scaled.ceil() as usize + 1
}

/// Picks the partition with the most sub-threshold neighbours. Ties keep the
/// current partition, otherwise the lowest partition id.
fn most_neighbourly(counts: &BTreeMap<PartitionId, usize>, current: PartitionId) -> Option<PartitionId> {
    let best = counts.values().copied().max()?;
    if counts.get(&current) == Some(&best) {
        return Some(current);
    }
    counts
        .iter()
        .find(|(_, &count)| count == best)
        .map(|(&partition, _)| partition)
}

/// Runs removal rounds until convergence and returns per-round statistics.
///
/// Terminates when the graph is empty, no connectivity is left, or a round
/// removes every problematic entity.
pub fn remover(graph: &mut EntityGraph, threshold: f64, options: RemovalOptions) -> Vec<RoundStats> {
    let mut rounds = Vec::new();
    let mut round = 0usize;

    loop {
        let ids: Vec<EntityId> = graph.entity_ids().collect();
        let mut scores: Vec<(EntityId, usize)> = Vec::with_capacity(ids.len());
        let mut min_cross: Option<f64> = None;
        let mut relocated = 0usize;

        if options.move_to_most_neighbourly {
            for &id in &ids {
                let cluster = graph.cluster(id);
                let mut counts: BTreeMap<PartitionId, usize> = BTreeMap::new();
                for (nb, metric) in graph.neighbors(id) {
                    if metric < threshold {
                        *counts.entry(graph.cluster(nb)).or_insert(0) += 1;
                    }
                }
                if let Some(target) = most_neighbourly(&counts, cluster) {
                    if target != cluster {
                        graph.set_cluster(id, target);
                        relocated += 1;
                    }
                }
            }
        }

        // Scores see the partitions after every move of this round.
        for &id in &ids {
            let cluster = graph.cluster(id);
            let exempt = options.ignore_priority
                && graph.entity(id).map_or(false, |entity| entity.priority);
            if exempt {
                scores.push((id, 0));
                continue;
            }

            let mut same: Vec<f64> = Vec::new();
            let mut other: Vec<f64> = Vec::new();
            for (nb, metric) in graph.neighbors(id) {
                if metric >= threshold {
                    continue;
                }
                if graph.cluster(nb) == cluster {
                    if !options.simplistic_removal {
                        same.push(metric);
                    }
                } else {
                    min_cross = Some(min_cross.map_or(metric, |m: f64| m.min(metric)));
                    other.push(metric);
                }
            }
            let combined = same
                .iter()
                .map(|s| other.iter().filter(|&&o| s + o >= threshold).count())
                .sum::<usize>();
            scores.push((id, other.len() + combined));
        }

        let connectivity: usize = scores.iter().map(|(_, score)| score).sum();
        let problematic = scores.iter().filter(|(_, score)| *score > 0).count();

        round += 1;
        let batch = removal_batch_size(round, problematic);
        let mut candidates: Vec<(EntityId, usize)> =
            scores.into_iter().filter(|(_, score)| *score > 0).collect();
        candidates.sort_by(|x, y| y.1.cmp(&x.1));
        candidates.truncate(batch);

        let stats = RoundStats {
            round,
            min_cross_metric: min_cross,
            entities: graph.node_count(),
            edges: graph.edge_count(),
            connectivity,
            problematic,
            relocated,
            removed: candidates.len(),
        };
        info!(
            round,
            min_cross_metric = ?stats.min_cross_metric,
            entities = stats.entities,
            edges = stats.edges,
            connectivity,
            problematic,
            relocated,
            removed = stats.removed,
            "removal round"
        );
        rounds.push(stats);

        for (id, _) in &candidates {
            graph.remove_entity(*id);
        }
        if graph.node_count() == 0 || connectivity == 0 || candidates.len() == problematic {
            break;
        }
    }
    rounds
}

/// Outcome of [`enforce_threshold`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemovalSummary {
    /// Rounds of the priority-respecting pass; empty if it was not needed.
    pub step_1: Vec<RoundStats>,
    /// Rounds of the pass that may remove priority entities.
    pub step_2: Vec<RoundStats>,
}

/// Runs up to two removal passes and verifies that no cross-partition edge
/// below `threshold` remains.
pub fn enforce_threshold(
    graph: &mut EntityGraph,
    threshold: f64,
    allow_moving: bool,
    simplistic_removal: bool,
) -> Result<RemovalSummary, PartitionError> {
    let mut summary = RemovalSummary::default();
    let mut options = RemovalOptions {
        move_to_most_neighbourly: allow_moving,
        ignore_priority: true,
        simplistic_removal,
    };

    if removal_needed(graph, threshold) {
        info!(entities = graph.node_count(), "removal needed");
        summary.step_1 = remover(graph, threshold, options);
    }
    if removal_needed(graph, threshold) {
        info!(entities = graph.node_count(), "removal of priority entities needed");
        options.ignore_priority = false;
        summary.step_2 = remover(graph, threshold, options);
    }

    check_separated(graph, threshold)?;
    info!(entities = graph.node_count(), "threshold separation achieved");
    Ok(summary)
}

/// Fails with [`PartitionError::ConvergenceFailure`] naming the first
/// cross-partition pair still below `threshold`.
pub fn check_separated(graph: &EntityGraph, threshold: f64) -> Result<(), PartitionError> {
    let Some(violation) = find_violation(graph, threshold) else {
        return Ok(());
    };
    let name = |id: EntityId| {
        graph
            .entity(id)
            .map(|entity| entity.name.clone())
            .unwrap_or_else(|| id.to_string())
    };
    warn!(a = %name(violation.a), b = %name(violation.b), metric = violation.metric, "removal still needed");
    Err(PartitionError::ConvergenceFailure {
        id_a: name(violation.a),
        id_b: name(violation.b),
        metric: violation.metric,
        threshold,
        remaining: graph.node_count(),
    })
}
