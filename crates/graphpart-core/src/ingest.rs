//! Edge ingestion.
//!
//! Consumes `(id_a, id_b, raw_score)` records from an edge source, maps the
//! score through the run's [`Transform`] and keeps every pair whose metric is
//! within the threshold. Duplicate pairs keep the smallest metric seen.
//!
//! Two entry points:
//! - [`ingest_edges`] writes straight into an [`EntityGraph`] from a single
//!   thread.
//! - [`ConcurrentEdgeSink`] accepts records from many workers at once,
//!   serializing updates per edge, and is committed into the graph when all
//!   workers are done.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::PartitionError;
use crate::graph::{EdgeUpdate, EntityGraph};
use crate::id::EntityId;
use crate::transform::Transform;

/// One scored pair as reported by an edge source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub id_a: String,
    pub id_b: String,
    pub raw_score: f64,
}

impl EdgeRecord {
    pub fn new(id_a: impl Into<String>, id_b: impl Into<String>, raw_score: f64) -> Self {
        EdgeRecord {
            id_a: id_a.into(),
            id_b: id_b.into(),
            raw_score,
        }
    }
}

/// How records naming unknown entities are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestMode {
    /// The edge source was run over the same entity list the graph was built
    /// from; an unknown id is a [`PartitionError::Consistency`].
    Strict,
    /// The edge source may cover entities outside the graph (precomputed
    /// lists, checkpoints); unknown ids are skipped.
    #[default]
    Relaxed,
}

/// Counters for one ingestion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestStats {
    pub records: usize,
    pub inserted: usize,
    pub lowered: usize,
    pub self_pairs: usize,
    pub above_threshold: usize,
    pub unknown_ids: usize,
}

impl IngestStats {
    /// Adds another ingestion's counters to these.
    pub fn accumulate(&mut self, other: IngestStats) {
        self.records += other.records;
        self.inserted += other.inserted;
        self.lowered += other.lowered;
        self.self_pairs += other.self_pairs;
        self.above_threshold += other.above_threshold;
        self.unknown_ids += other.unknown_ids;
    }
}

enum Verdict {
    Accept(EntityId, EntityId, f64),
    SelfPair,
    Unknown,
    AboveThreshold,
}

fn classify(
    names: &HashMap<String, EntityId>,
    record: &EdgeRecord,
    transform: Transform,
    threshold: f64,
    mode: IngestMode,
) -> Result<Verdict, PartitionError> {
    let metric = transform.apply(record.raw_score)?;
    if record.id_a == record.id_b {
        return Ok(Verdict::SelfPair);
    }
    let (a, b) = match (names.get(&record.id_a), names.get(&record.id_b)) {
        (Some(&a), Some(&b)) => (a, b),
        _ => {
            return match mode {
                IngestMode::Relaxed => Ok(Verdict::Unknown),
                IngestMode::Strict => Err(PartitionError::Consistency {
                    reason: format!(
                        "edge {}-{} references an id that is not in the entity set",
                        record.id_a, record.id_b
                    ),
                }),
            };
        }
    };
    if metric > threshold {
        return Ok(Verdict::AboveThreshold);
    }
    Ok(Verdict::Accept(a, b, metric))
}

/// Ingests `records` into `graph`.
///
/// `threshold` is already in metric space. Stops at the first source or
/// domain error.
pub fn ingest_edges<I, E>(
    graph: &mut EntityGraph,
    records: I,
    transform: Transform,
    threshold: f64,
    mode: IngestMode,
) -> Result<IngestStats, PartitionError>
where
    I: IntoIterator<Item = Result<EdgeRecord, E>>,
    PartitionError: From<E>,
{
    let mut stats = IngestStats::default();
    for record in records {
        let record = record?;
        stats.records += 1;
        match classify(graph.name_index(), &record, transform, threshold, mode)? {
            Verdict::SelfPair => stats.self_pairs += 1,
            Verdict::Unknown => stats.unknown_ids += 1,
            Verdict::AboveThreshold => stats.above_threshold += 1,
            Verdict::Accept(a, b, metric) => match graph.upsert_edge(a, b, metric)? {
                EdgeUpdate::Inserted => stats.inserted += 1,
                EdgeUpdate::Lowered => stats.lowered += 1,
                EdgeUpdate::Kept => {}
            },
        }
    }
    debug!(?stats, "ingested edge records");
    Ok(stats)
}

#[derive(Default)]
struct AtomicStats {
    records: AtomicUsize,
    inserted: AtomicUsize,
    lowered: AtomicUsize,
    self_pairs: AtomicUsize,
    above_threshold: AtomicUsize,
    unknown_ids: AtomicUsize,
}

/// Thread-safe edge accumulator.
///
/// Workers call [`offer`](Self::offer) through a shared reference. Each
/// unordered pair lives in one `DashMap` entry, so insert-or-lower is
/// serialized per edge.
pub struct ConcurrentEdgeSink {
    names: HashMap<String, EntityId>,
    transform: Transform,
    threshold: f64,
    mode: IngestMode,
    edges: DashMap<(EntityId, EntityId), f64>,
    stats: AtomicStats,
}

impl ConcurrentEdgeSink {
    /// Creates a sink resolving ids against `graph`'s entities.
    pub fn new(graph: &EntityGraph, transform: Transform, threshold: f64, mode: IngestMode) -> Self {
        ConcurrentEdgeSink {
            names: graph.name_index().clone(),
            transform,
            threshold,
            mode,
            edges: DashMap::new(),
            stats: AtomicStats::default(),
        }
    }

    /// Offers one record.
    pub fn offer(&self, record: &EdgeRecord) -> Result<(), PartitionError> {
        self.stats.records.fetch_add(1, Ordering::Relaxed);
        let verdict = classify(&self.names, record, self.transform, self.threshold, self.mode)?;
        let counter = match verdict {
            Verdict::SelfPair => &self.stats.self_pairs,
            Verdict::Unknown => &self.stats.unknown_ids,
            Verdict::AboveThreshold => &self.stats.above_threshold,
            Verdict::Accept(a, b, metric) => {
                let key = if a <= b { (a, b) } else { (b, a) };
                match self.edges.entry(key) {
                    Entry::Occupied(mut entry) => {
                        if metric < *entry.get() {
                            *entry.get_mut() = metric;
                            &self.stats.lowered
                        } else {
                            return Ok(());
                        }
                    }
                    Entry::Vacant(entry) => {
                        entry.insert(metric);
                        &self.stats.inserted
                    }
                }
            }
        };
        counter.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Number of distinct pairs currently held.
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Writes the accumulated edges into `graph` in ascending pair order.
    ///
    /// Pairs already present in `graph` keep the smaller metric.
    pub fn commit(self, graph: &mut EntityGraph) -> Result<IngestStats, PartitionError> {
        let mut edges: Vec<((EntityId, EntityId), f64)> = self.edges.into_iter().collect();
        edges.sort_unstable_by_key(|(key, _)| *key);

        let mut stats = IngestStats {
            records: self.stats.records.load(Ordering::Relaxed),
            inserted: 0,
            lowered: self.stats.lowered.load(Ordering::Relaxed),
            self_pairs: self.stats.self_pairs.load(Ordering::Relaxed),
            above_threshold: self.stats.above_threshold.load(Ordering::Relaxed),
            unknown_ids: self.stats.unknown_ids.load(Ordering::Relaxed),
        };
        for ((a, b), metric) in edges {
            match graph.upsert_edge(a, b, metric)? {
                EdgeUpdate::Inserted => stats.inserted += 1,
                EdgeUpdate::Lowered => stats.lowered += 1,
                EdgeUpdate::Kept => {}
            }
        }
        debug!(?stats, "committed concurrent edge sink");
        Ok(stats)
    }
}
