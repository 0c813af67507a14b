//! Edge checkpoints.
//!
//! A checkpoint is the full graph's edge list written back in raw score
//! units (`id_a,id_b,raw`), so that a later run can load it as a precomputed
//! edge list with the same transform instead of recomputing the scores.

use std::io::Write;

use tracing::info;

use crate::error::PartitionError;
use crate::graph::EntityGraph;
use crate::transform::Transform;

/// Writes every full-graph edge to `out`. Returns the number of rows.
pub fn write_checkpoint<W: Write>(
    graph: &EntityGraph,
    transform: Transform,
    mut out: W,
) -> Result<usize, PartitionError> {
    let mut rows = 0;
    for (a, b, metric) in graph.edges() {
        let (name_a, name_b) = match (graph.entity(a), graph.entity(b)) {
            (Some(a), Some(b)) => (&a.name, &b.name),
            _ => continue,
        };
        let raw = transform.inverse(metric)?;
        writeln!(out, "{},{},{}", name_a, name_b, raw)?;
        rows += 1;
    }
    out.flush()?;
    info!(rows, "wrote edge checkpoint");
    Ok(rows)
}
