//! Error types for graphpart-core.
//!
//! Uses `thiserror` for structured, matchable error variants. The first five
//! variants are the fatal partitioning failures; the rest wrap ambient I/O,
//! serialization and input parsing failures raised while feeding the engine.

use thiserror::Error;

/// Errors produced while building, partitioning or reporting on an entity graph.
#[derive(Debug, Error)]
pub enum PartitionError {
    /// Invalid run parameters (transform name, split ratios, partition count).
    #[error("configuration error: {reason}")]
    Configuration { reason: String },

    /// An edge referenced an id that is not part of the entity set.
    #[error("consistency error: {reason}")]
    Consistency { reason: String },

    /// Cross-partition violations survived both removal passes.
    #[error(
        "removal did not converge: '{id_a}' and '{id_b}' are in different partitions \
         with metric {metric} below threshold {threshold} ({remaining} entities left)"
    )]
    ConvergenceFailure {
        id_a: String,
        id_b: String,
        metric: f64,
        threshold: f64,
        remaining: usize,
    },

    /// Removal emptied whole partitions.
    #[error(
        "cannot produce {requested} partitions at this threshold: removal to achieve \
         separation lost {lost} complete partition(s)"
    )]
    InsufficientData { requested: usize, lost: usize },

    /// A transform was applied outside its domain.
    #[error("domain error: transform '{transform}' is undefined for {value}")]
    Domain { transform: &'static str, value: f64 },

    /// Malformed entity or edge input.
    #[error("parse error at line {line}: {reason}")]
    Parse { line: usize, reason: String },

    /// One or more edge-generating workers failed.
    #[error("{failed} edge source job(s) failed; first failure: {reason}")]
    EdgeSource { failed: usize, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PartitionError {
    /// Shorthand for a [`PartitionError::Configuration`] with a formatted reason.
    pub fn config(reason: impl Into<String>) -> Self {
        PartitionError::Configuration {
            reason: reason.into(),
        }
    }
}
