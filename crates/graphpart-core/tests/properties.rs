//! Property tests over randomly generated entity graphs.

use std::collections::HashMap;

use proptest::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use graphpart_core::assign::{assign_partitions, balance_assignment};
use graphpart_core::init::initialize;
use graphpart_core::{
    EdgeRecord, EntityGraph, EntityInput, IngestMode, InitMode, PartitionConfig, PartitionError,
    Partitioner, Transform,
};

const THRESHOLD: f64 = 0.3;

struct Fixture {
    entities: Vec<EntityInput>,
    edges: Vec<EdgeRecord>,
}

/// Random entities with two labels and sparse edges with uniform scores.
fn random_fixture(seed: u64, n: usize) -> Fixture {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let entities: Vec<EntityInput> = (0..n)
        .map(|i| {
            EntityInput::new(format!("e{}", i))
                .with_label(if rng.gen_bool(0.5) { "pos" } else { "neg" })
                .with_priority(rng.gen_bool(0.1))
        })
        .collect();
    let n_edges = rng.gen_range(n..3 * n);
    let edges = (0..n_edges)
        .map(|_| {
            let a = rng.gen_range(0..n);
            let b = rng.gen_range(0..n);
            EdgeRecord::new(format!("e{}", a), format!("e{}", b), rng.gen::<f64>())
        })
        .collect();
    Fixture { entities, edges }
}

fn ok_records(edges: &[EdgeRecord]) -> impl Iterator<Item = Result<EdgeRecord, PartitionError>> + '_ {
    edges.iter().cloned().map(Ok)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn transforms_round_trip(x in 0.001f64..100.0) {
        for transform in Transform::ALL {
            let metric = transform.apply(x).unwrap();
            let back = transform.inverse(metric).unwrap();
            prop_assert!((back - x).abs() <= 1e-9 * x.max(1.0), "{} {} {}", transform, x, back);
        }
    }

    #[test]
    fn duplicate_pairs_keep_the_minimum(first in 0.0f64..1.0, second in 0.0f64..1.0, flip in any::<bool>()) {
        let mut graph = EntityGraph::from_entities(["a", "b"].map(EntityInput::new)).unwrap();
        let (x, y) = if flip { ("b", "a") } else { ("a", "b") };
        let stream = vec![EdgeRecord::new("a", "b", first), EdgeRecord::new(x, y, second)];
        graphpart_core::ingest::ingest_edges(
            &mut graph,
            ok_records(&stream),
            Transform::Identity,
            1.0,
            IngestMode::Strict,
        )
        .unwrap();
        let (a, b) = (graph.lookup("a").unwrap(), graph.lookup("b").unwrap());
        prop_assert_eq!(graph.metric(a, b), Some(first.min(second)));
        prop_assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn assigner_is_deterministic_and_greedy(
        clusters in prop::collection::vec(prop::collection::vec(0u32..5, 3), 1..30),
        n_partitions in 1usize..6,
    ) {
        let first = balance_assignment(&clusters, n_partitions, 3);
        prop_assert_eq!(&first, &balance_assignment(&clusters, n_partitions, 3));

        // Replay: every choice must be a minimum of the imbalance sum.
        let mut loc = vec![vec![1.0f64; 3]; n_partitions];
        for (counts, &chosen) in clusters.iter().zip(&first) {
            let score = |row: &Vec<f64>| -> f64 {
                row.iter().zip(counts).map(|(&c, &a)| c / (c + a as f64)).sum()
            };
            let chosen_score = score(&loc[chosen]);
            for row in &loc {
                prop_assert!(chosen_score <= score(row));
            }
            for (c, &a) in counts.iter().enumerate() {
                loc[chosen][c] += a as f64;
            }
        }
    }

    #[test]
    fn mini_clusters_are_never_split(seed in any::<u64>(), n in 8usize..40, n_partitions in 2usize..5) {
        let fixture = random_fixture(seed, n);
        let mut graph = EntityGraph::from_entities(fixture.entities).unwrap();
        graph.labels_mut().set_limits(n_partitions);
        graphpart_core::ingest::ingest_edges(
            &mut graph,
            ok_records(&fixture.edges),
            Transform::Identity,
            THRESHOLD,
            IngestMode::Strict,
        )
        .unwrap();

        let clusters = initialize(&mut graph, THRESHOLD, n_partitions, InitMode::SlowNn).unwrap();
        prop_assert!(clusters.len() >= n_partitions);
        assign_partitions(&mut graph, &clusters, n_partitions).unwrap();
        for members in clusters.iter() {
            let partition = graph.cluster(members[0]);
            prop_assert!(members.iter().all(|&id| graph.cluster(id) == partition));
        }
    }

    #[test]
    fn no_sub_threshold_edge_crosses_partitions(seed in any::<u64>(), n in 8usize..40, partitions in 2usize..5) {
        let fixture = random_fixture(seed, n);
        let config = PartitionConfig {
            threshold: THRESHOLD,
            transformation: Transform::Identity,
            partitions,
            ..PartitionConfig::default()
        };
        let mut partitioner = Partitioner::new(config, fixture.entities).unwrap();
        partitioner.ingest(ok_records(&fixture.edges), IngestMode::Strict).unwrap();

        match partitioner.partition() {
            Ok(outcome) => {
                let partition_of: HashMap<&str, _> = outcome
                    .assignment
                    .iter()
                    .map(|row| (row.id.as_str(), row.partition))
                    .collect();
                for edge in &fixture.edges {
                    if edge.raw_score >= THRESHOLD || edge.id_a == edge.id_b {
                        continue;
                    }
                    if let (Some(a), Some(b)) = (
                        partition_of.get(edge.id_a.as_str()),
                        partition_of.get(edge.id_b.as_str()),
                    ) {
                        prop_assert_eq!(a, b);
                    }
                }
                prop_assert!(!outcome.report.removal_needed_end);
                for pass in [&outcome.report.removal_step_1, &outcome.report.removal_step_2] {
                    for pair in pass.windows(2) {
                        prop_assert!(pair[1].entities <= pair[0].entities);
                    }
                }
            }
            Err(PartitionError::InsufficientData { .. }) => {}
            Err(other) => prop_assert!(false, "unexpected error: {}", other),
        }
    }
}
