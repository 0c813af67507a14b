//! End-to-end orchestration of one partitioning run.
//!
//! A [`Partitioner`] owns the entity graph and the run report. Edge sources
//! feed it through [`Partitioner::ingest`] or a [`ConcurrentEdgeSink`]; then
//! [`Partitioner::partition`] runs initialization, assignment, the optional
//! train/test/val merge and threshold enforcement, and returns the final
//! [`Assignment`] together with the [`RunReport`].

use std::io::Write;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::assign::assign_partitions;
use crate::checkpoint::write_checkpoint;
use crate::config::{PartitionConfig, RunPlan};
use crate::entity::EntityInput;
use crate::error::PartitionError;
use crate::graph::EntityGraph;
use crate::id::PartitionId;
use crate::ingest::{ingest_edges, ConcurrentEdgeSink, EdgeRecord, IngestMode, IngestStats};
use crate::init::initialize;
use crate::merge::{train_val_test_split, Bucket};
use crate::remove::{enforce_threshold, removal_needed};
use crate::report::{PartitionTable, RunReport};

/// One output row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentRow {
    pub id: String,
    pub label: String,
    pub partition: PartitionId,
    /// Set when partitions were merged into train/test/val.
    pub bucket: Option<Bucket>,
}

impl AssignmentRow {
    /// The partition as printed: its number, or the bucket name after a merge.
    pub fn partition_name(&self) -> String {
        match self.bucket {
            Some(bucket) => bucket.name().to_string(),
            None => self.partition.to_string(),
        }
    }
}

/// Final partition of every surviving entity, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub rows: Vec<AssignmentRow>,
}

impl Assignment {
    pub fn from_graph(graph: &EntityGraph, merged: bool) -> Self {
        let rows = graph
            .entity_ids()
            .filter_map(|id| {
                let entity = graph.entity(id)?;
                let partition = graph.cluster(id);
                Some(AssignmentRow {
                    id: entity.name.clone(),
                    label: graph.labels().name(entity.label).unwrap_or_default().to_string(),
                    partition,
                    bucket: if merged { Bucket::from_partition(partition) } else { None },
                })
            })
            .collect();
        Assignment { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AssignmentRow> {
        self.rows.iter()
    }

    /// Row for entity `id`, if it survived.
    pub fn get(&self, id: &str) -> Option<&AssignmentRow> {
        self.rows.iter().find(|row| row.id == id)
    }
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct PartitionOutcome {
    pub assignment: Assignment,
    pub report: RunReport,
}

/// Drives a single run from entity list to assignment.
#[derive(Debug)]
pub struct Partitioner {
    config: PartitionConfig,
    plan: RunPlan,
    graph: EntityGraph,
    report: RunReport,
    started: Instant,
}

impl Partitioner {
    /// Validates `config` and builds the graph nodes from `entities`.
    pub fn new<I>(config: PartitionConfig, entities: I) -> Result<Self, PartitionError>
    where
        I: IntoIterator<Item = EntityInput>,
    {
        let started = Instant::now();
        let plan = config.validate()?;
        let mut graph = EntityGraph::from_entities(entities)?;
        if plan.partitions > graph.node_count() {
            return Err(PartitionError::config(format!(
                "cannot build {} partitions from {} entities",
                plan.partitions,
                graph.node_count()
            )));
        }
        graph.labels_mut().set_limits(plan.partitions);
        for (name, label) in graph.labels().iter() {
            info!(label = %name, num = label.num, lim = label.lim, "label distribution");
        }

        let report = RunReport {
            config: config.clone(),
            threshold_transformed: plan.threshold,
            labels_start: graph.labels().to_map(),
            ..RunReport::default()
        };
        Ok(Partitioner {
            config,
            plan,
            graph,
            report,
            started,
        })
    }

    pub fn config(&self) -> &PartitionConfig {
        &self.config
    }

    pub fn plan(&self) -> &RunPlan {
        &self.plan
    }

    /// Threshold in metric space.
    pub fn threshold(&self) -> f64 {
        self.plan.threshold
    }

    pub fn graph(&self) -> &EntityGraph {
        &self.graph
    }

    // -----------------------------------------------------------------------
    // Edge intake
    // -----------------------------------------------------------------------

    /// Ingests edge records from a single-threaded source.
    pub fn ingest<I, E>(&mut self, records: I, mode: IngestMode) -> Result<IngestStats, PartitionError>
    where
        I: IntoIterator<Item = Result<EdgeRecord, E>>,
        PartitionError: From<E>,
    {
        let stats = ingest_edges(
            &mut self.graph,
            records,
            self.config.transformation,
            self.plan.threshold,
            mode,
        )?;
        self.report.ingest.accumulate(stats);
        Ok(stats)
    }

    /// A sink for multi-threaded sources. Hand it back to [`Self::commit`].
    pub fn edge_sink(&self, mode: IngestMode) -> ConcurrentEdgeSink {
        ConcurrentEdgeSink::new(&self.graph, self.config.transformation, self.plan.threshold, mode)
    }

    pub fn commit(&mut self, sink: ConcurrentEdgeSink) -> Result<IngestStats, PartitionError> {
        let stats = sink.commit(&mut self.graph)?;
        self.report.ingest.accumulate(stats);
        Ok(stats)
    }

    /// Writes the current edge list in raw score units.
    pub fn write_checkpoint<W: Write>(&self, out: W) -> Result<usize, PartitionError> {
        write_checkpoint(&self.graph, self.config.transformation, out)
    }

    // -----------------------------------------------------------------------
    // Partitioning
    // -----------------------------------------------------------------------

    /// Partitions the ingested graph.
    pub fn partition(mut self) -> Result<PartitionOutcome, PartitionError> {
        let graph = &mut self.graph;
        let report = &mut self.report;
        let threshold = self.plan.threshold;

        report.time_edges_seconds = self.started.elapsed().as_secs_f64();
        report.graph_edges_start = graph.edge_count();
        info!(edges = graph.edge_count(), entities = graph.node_count(), "full graph built");

        let clusters = initialize(graph, threshold, self.plan.partitions, self.config.initialization_mode)?;
        report.mini_clusters = clusters.len();
        assign_partitions(graph, &clusters, self.plan.partitions)?;

        let table = PartitionTable::from_graph(graph, self.plan.partitions);
        table.ensure_complete()?;
        table.log("assigned");

        let mut n_partitions = self.plan.partitions;
        if let Some(ratios) = self.plan.split {
            let split = train_val_test_split(graph, threshold, ratios, self.config.combination_search)?;
            report.split = Some(split);
            n_partitions = ratios.buckets();
        }

        let table = PartitionTable::from_graph(graph, n_partitions);
        table.ensure_complete()?;
        report.samples_pre_removal = graph.node_count();
        report.score_pre_removal = table.score();
        report.partitioning_pre_removal = table;

        let summary = enforce_threshold(
            graph,
            threshold,
            self.config.allow_moving,
            self.config.simplistic_removal,
        )?;
        report.removal_step_1 = summary.step_1;
        report.removal_step_2 = summary.step_2;

        let table = PartitionTable::from_graph(graph, n_partitions);
        table.ensure_complete()?;
        table.log("after removal");
        report.samples_after_removal = graph.node_count();
        report.score_after_removal = table.score();
        report.partitioning_after_removal = table;
        report.removal_needed_end = removal_needed(graph, threshold);

        let assignment = Assignment::from_graph(graph, self.plan.split.is_some());
        report.time_total_seconds = self.started.elapsed().as_secs_f64();
        info!(
            entities = assignment.len(),
            removed = report.samples_pre_removal - report.samples_after_removal,
            seconds = report.time_total_seconds,
            "partitioning complete"
        );
        Ok(PartitionOutcome {
            assignment,
            report: self.report,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::Transform;

    fn config(partitions: usize) -> PartitionConfig {
        PartitionConfig {
            threshold: 0.3,
            transformation: Transform::Identity,
            partitions,
            ..PartitionConfig::default()
        }
    }

    fn records(edges: &[(&str, &str, f64)]) -> Vec<Result<EdgeRecord, PartitionError>> {
        edges.iter().map(|(a, b, s)| Ok(EdgeRecord::new(*a, *b, *s))).collect()
    }

    #[test]
    fn rejects_more_partitions_than_entities() {
        let err = Partitioner::new(config(3), ["a", "b"].map(EntityInput::new)).unwrap_err();
        assert!(matches!(err, PartitionError::Configuration { .. }));
    }

    #[test]
    fn report_accumulates_ingestion() {
        let mut p = Partitioner::new(config(2), ["a", "b", "c", "d"].map(EntityInput::new)).unwrap();
        p.ingest(records(&[("a", "b", 0.1), ("c", "d", 0.9)]), IngestMode::Strict)
            .unwrap();
        p.ingest(records(&[("a", "zz", 0.1)]), IngestMode::Relaxed).unwrap();
        let outcome = p.partition().unwrap();
        assert_eq!(outcome.report.ingest.records, 3);
        assert_eq!(outcome.report.ingest.inserted, 1);
        assert_eq!(outcome.report.ingest.above_threshold, 1);
        assert_eq!(outcome.report.ingest.unknown_ids, 1);
        assert_eq!(outcome.report.graph_edges_start, 1);
        assert!(!outcome.report.removal_needed_end);
    }

    #[test]
    fn assignment_keeps_insertion_order_and_labels() {
        let entities = vec![
            EntityInput::new("b").with_label("pos"),
            EntityInput::new("a").with_label("neg"),
            EntityInput::new("c"),
        ];
        let p = Partitioner::new(config(1), entities).unwrap();
        let outcome = p.partition().unwrap();
        let ids: Vec<&str> = outcome.assignment.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
        let row = outcome.assignment.get("c").unwrap();
        assert_eq!(row.label, "0");
        assert_eq!(row.partition_name(), "0");
    }

    #[test]
    fn concurrent_sink_feeds_the_run() {
        let mut p = Partitioner::new(config(2), ["a", "b", "c", "d"].map(EntityInput::new)).unwrap();
        let sink = p.edge_sink(IngestMode::Strict);
        sink.offer(&EdgeRecord::new("a", "b", 0.2)).unwrap();
        sink.offer(&EdgeRecord::new("b", "a", 0.1)).unwrap();
        p.commit(sink).unwrap();
        let a = p.graph().lookup("a").unwrap();
        let b = p.graph().lookup("b").unwrap();
        assert_eq!(p.graph().metric(a, b), Some(0.1));
    }
}
