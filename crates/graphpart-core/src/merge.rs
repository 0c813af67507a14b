//! Train/validation/test merging.
//!
//! Fine-grained partitions (10 or 20) are recombined into train, test and
//! validation buckets. Partitions that share many sub-threshold edges are
//! grouped together, which leaves fewer violations for the remover.

use std::collections::BTreeMap;
use std::fmt;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::PartitionError;
use crate::graph::{EntityGraph, LabelCounts};
use crate::id::PartitionId;

/// Largest partition count the exhaustive search accepts.
pub const MAX_EXHAUSTIVE_PARTITIONS: usize = 20;

const RATIO_TOLERANCE: f64 = 1e-9;

/// Bucket numbers written into the partition graph after merging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bucket {
    Train,
    Test,
    Val,
}

impl Bucket {
    pub fn partition(self) -> PartitionId {
        match self {
            Bucket::Train => PartitionId(0),
            Bucket::Test => PartitionId(1),
            Bucket::Val => PartitionId(2),
        }
    }

    pub fn from_partition(partition: PartitionId) -> Option<Bucket> {
        match partition.0 {
            0 => Some(Bucket::Train),
            1 => Some(Bucket::Test),
            2 => Some(Bucket::Val),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Bucket::Train => "train",
            Bucket::Test => "test",
            Bucket::Val => "val",
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How partition subsets are searched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CombinationSearch {
    /// Every subset of the requested size; at most
    /// [`MAX_EXHAUSTIVE_PARTITIONS`] partitions.
    #[default]
    Exhaustive,
    /// Greedy growth from every seed partition. Not exhaustive, but
    /// quadratic-times-k instead of binomial.
    Greedy,
}

/// Validated test/validation ratios.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitRatios {
    test: f64,
    val: f64,
}

fn is_multiple_of(ratio: f64, step_percent: f64) -> bool {
    let percent = ratio * 100.0;
    let steps = (percent / step_percent).round();
    (percent - steps * step_percent).abs() < RATIO_TOLERANCE * 100.0
}

impl SplitRatios {
    /// Validates ratios. A validation-only request is moved into the test
    /// slot.
    pub fn new(test: f64, val: f64) -> Result<Self, PartitionError> {
        for (name, ratio) in [("test", test), ("val", val)] {
            if !ratio.is_finite() || !(0.0..1.0).contains(&ratio) {
                return Err(PartitionError::config(format!(
                    "{} ratio must be in [0, 1), got {}",
                    name, ratio
                )));
            }
            if !is_multiple_of(ratio, 5.0) {
                return Err(PartitionError::config(format!(
                    "{} ratio {} is not a multiple of 0.05",
                    name, ratio
                )));
            }
        }
        if test + val >= 1.0 - RATIO_TOLERANCE {
            return Err(PartitionError::config(format!(
                "test ratio {} and val ratio {} leave no training data",
                test, val
            )));
        }
        if test == 0.0 {
            return Ok(SplitRatios { test: val, val: 0.0 });
        }
        Ok(SplitRatios { test, val })
    }

    pub fn test(&self) -> f64 {
        self.test
    }

    pub fn val(&self) -> f64 {
        self.val
    }

    /// True when there is anything to split off.
    pub fn is_split(&self) -> bool {
        self.test > 0.0
    }

    /// Fine-grained partition count: 10 when both ratios are multiples of
    /// 0.1, otherwise 20.
    pub fn fine_partitions(&self) -> usize {
        if is_multiple_of(self.test, 10.0) && is_multiple_of(self.val, 10.0) {
            10
        } else {
            20
        }
    }

    /// Number of buckets after merging.
    pub fn buckets(&self) -> usize {
        if self.val > 0.0 {
            3
        } else {
            2
        }
    }

    /// `(n_train, n_test, n_val)` for `n_partitions` fine partitions.
    pub fn counts(&self, n_partitions: usize) -> (usize, usize, usize) {
        let n = n_partitions as f64;
        let n_train = (n * (1.0 - self.val - self.test)).round() as usize;
        let n_test = (n * self.test).round() as usize;
        let n_val = n_partitions.saturating_sub(n_train + n_test);
        (n_train, n_test, n_val)
    }
}

/// Partition numbers grouped into buckets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitPlan {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
    pub val: Vec<usize>,
}

impl SplitPlan {
    pub fn bucket_of(&self, partition: usize) -> Bucket {
        if self.train.contains(&partition) {
            Bucket::Train
        } else if self.test.contains(&partition) {
            Bucket::Test
        } else {
            Bucket::Val
        }
    }
}

/// Counts sub-threshold edges between partitions.
///
/// Every entity adds its sub-threshold neighbours to
/// `matrix[own partition][neighbour partition]`, so off-diagonal cells are
/// symmetric and edges are counted from both ends.
pub fn partition_similarity_matrix(
    graph: &EntityGraph,
    n_partitions: usize,
    threshold: f64,
) -> Result<Vec<Vec<u64>>, PartitionError> {
    let mut matrix = vec![vec![0u64; n_partitions]; n_partitions];
    for id in graph.entity_ids() {
        let own = graph.cluster(id).index();
        if own >= n_partitions {
            return Err(PartitionError::Consistency {
                reason: format!("entity {} is in partition {} of {}", id, own, n_partitions),
            });
        }
        for (nb, metric) in graph.neighbors(id) {
            if metric < threshold {
                let other = graph.cluster(nb).index();
                if other < n_partitions {
                    matrix[own][other] += 1;
                }
            }
        }
    }
    Ok(matrix)
}

fn subset_score(matrix: &[Vec<u64>], subset: &[usize]) -> u64 {
    subset
        .iter()
        .flat_map(|&i| subset.iter().map(move |&j| (i, j)))
        .map(|(i, j)| matrix[i][j])
        .sum()
}

fn best_exhaustive(matrix: &[Vec<u64>], candidates: &[usize], size: usize) -> Vec<usize> {
    let mut best: Vec<usize> = Vec::new();
    let mut best_score: i128 = -1;
    for subset in candidates.iter().copied().combinations(size) {
        let score = subset_score(matrix, &subset) as i128;
        if score > best_score {
            best_score = score;
            best = subset;
        }
    }
    best
}

fn best_greedy(matrix: &[Vec<u64>], candidates: &[usize], size: usize) -> Vec<usize> {
    if size == 0 {
        return Vec::new();
    }
    let mut best: Vec<usize> = Vec::new();
    let mut best_score: i128 = -1;
    for &seed in candidates {
        let mut current = vec![seed];
        while current.len() < size {
            let next = candidates
                .iter()
                .copied()
                .filter(|c| !current.contains(c))
                .map(|c| (c, current.iter().map(|&m| matrix[c][m]).sum::<u64>()))
                // max_by_key keeps the last maximum; reverse to keep the first.
                .rev()
                .max_by_key(|&(_, connections)| connections);
            match next {
                Some((c, _)) => current.push(c),
                None => break,
            }
        }
        let score = subset_score(matrix, &current) as i128;
        if score > best_score {
            best_score = score;
            best = current;
        }
    }
    best.sort_unstable();
    best
}

/// Picks train partitions with maximal internal connectivity, then test
/// partitions among the rest; the remainder is validation.
pub fn best_partition_combinations(
    matrix: &[Vec<u64>],
    n_train: usize,
    n_test: usize,
    search: CombinationSearch,
) -> Result<SplitPlan, PartitionError> {
    let n = matrix.len();
    if n_train + n_test > n {
        return Err(PartitionError::config(format!(
            "cannot take {} train and {} test partitions out of {}",
            n_train, n_test, n
        )));
    }
    let pick: fn(&[Vec<u64>], &[usize], usize) -> Vec<usize> = match search {
        CombinationSearch::Exhaustive => {
            if n > MAX_EXHAUSTIVE_PARTITIONS {
                return Err(PartitionError::config(format!(
                    "exhaustive split search supports at most {} partitions, got {}; use the greedy search",
                    MAX_EXHAUSTIVE_PARTITIONS, n
                )));
            }
            best_exhaustive
        }
        CombinationSearch::Greedy => best_greedy,
    };

    let all: Vec<usize> = (0..n).collect();
    let train = pick(matrix, &all, n_train);
    let remainder: Vec<usize> = all.into_iter().filter(|p| !train.contains(p)).collect();
    let test = pick(matrix, &remainder, n_test);
    let val = remainder.into_iter().filter(|p| !test.contains(p)).collect();
    Ok(SplitPlan { train, test, val })
}

/// Merges the graph's fine partitions into buckets.
///
/// Every node's cluster becomes its bucket's partition number and its
/// size/label-count bookkeeping becomes the bucket's totals.
pub fn train_val_test_split(
    graph: &mut EntityGraph,
    threshold: f64,
    ratios: SplitRatios,
    search: CombinationSearch,
) -> Result<SplitPlan, PartitionError> {
    let n_partitions = ratios.fine_partitions();
    let (n_train, n_test, n_val) = ratios.counts(n_partitions);
    let matrix = partition_similarity_matrix(graph, n_partitions, threshold)?;
    let plan = best_partition_combinations(&matrix, n_train, n_test, search)?;
    info!(
        n_train,
        n_test,
        n_val,
        train = ?plan.train,
        test = ?plan.test,
        val = ?plan.val,
        "merged partitions"
    );

    let n_labels = graph.labels().len();
    let mut totals: BTreeMap<Bucket, (usize, LabelCounts)> = BTreeMap::new();
    let ids: Vec<_> = graph.entity_ids().collect();
    for &id in &ids {
        let bucket = plan.bucket_of(graph.cluster(id).index());
        let label = graph.entity(id).map(|e| e.label.index());
        let entry = totals
            .entry(bucket)
            .or_insert_with(|| (0, LabelCounts::from_elem(0, n_labels)));
        entry.0 += 1;
        if let Some(label) = label {
            entry.1[label] += 1;
        }
    }
    for &id in &ids {
        let bucket = plan.bucket_of(graph.cluster(id).index());
        let (size, counts) = totals.get(&bucket).cloned().unwrap_or_default();
        if let Some(attrs) = graph.attrs_mut(id) {
            attrs.cluster = bucket.partition();
            attrs.component_size = size;
            attrs.label_counts = counts;
        }
    }
    Ok(plan)
}
