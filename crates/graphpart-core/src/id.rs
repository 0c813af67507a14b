//! Stable ID newtypes for the entity graph.
//!
//! All IDs are distinct newtype wrappers over `u32`, so an `EntityId` cannot
//! be passed where a `PartitionId` or `LabelId` is expected.

use std::fmt;

use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};

/// Stable entity handle. Maps to a petgraph `NodeIndex<u32>` in both the
/// full graph and the partition graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub u32);

/// Partition (or mini-cluster) number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartitionId(pub u32);

/// Dense label index handed out by the label registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LabelId(pub u32);

impl EntityId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl PartitionId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl LabelId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for LabelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Bridge between EntityId and petgraph's NodeIndex<u32>.

impl From<NodeIndex<u32>> for EntityId {
    fn from(idx: NodeIndex<u32>) -> Self {
        EntityId(idx.index() as u32)
    }
}

impl From<EntityId> for NodeIndex<u32> {
    fn from(id: EntityId) -> Self {
        NodeIndex::new(id.0 as usize)
    }
}
