pub mod assign;
pub mod checkpoint;
pub mod config;
pub mod disjoint;
pub mod entity;
pub mod error;
pub mod graph;
pub mod id;
pub mod ingest;
pub mod init;
pub mod merge;
pub mod pipeline;
pub mod remove;
pub mod report;
pub mod transform;

// Re-export commonly used types
pub use config::{PartitionConfig, RunPlan};
pub use entity::{Entity, EntityInput, LabelInfo, LabelRegistry, DEFAULT_LABEL};
pub use error::PartitionError;
pub use graph::{EntityGraph, PartitionAttrs};
pub use id::{EntityId, LabelId, PartitionId};
pub use ingest::{ConcurrentEdgeSink, EdgeRecord, IngestMode, IngestStats};
pub use init::{InitMode, MiniClusters};
pub use merge::{Bucket, CombinationSearch, SplitPlan, SplitRatios};
pub use pipeline::{Assignment, AssignmentRow, PartitionOutcome, Partitioner};
pub use remove::{RemovalSummary, RoundStats};
pub use report::{PartitionTable, RunReport};
pub use transform::Transform;
