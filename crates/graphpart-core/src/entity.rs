//! Entities and the label registry.
//!
//! Every entity carries a dense [`LabelId`] handed out by the
//! [`LabelRegistry`] in first-seen order. The registry also holds the
//! per-label counts and the per-partition limits used by the initializer.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::id::LabelId;

/// Label assigned to entities that do not declare one.
pub const DEFAULT_LABEL: &str = "0";

/// An entity as supplied by a caller, before it is placed in the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityInput {
    pub id: String,
    pub label: Option<String>,
    #[serde(default)]
    pub priority: bool,
}

impl EntityInput {
    pub fn new(id: impl Into<String>) -> Self {
        EntityInput {
            id: id.into(),
            label: None,
            priority: false,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_priority(mut self, priority: bool) -> Self {
        self.priority = priority;
        self
    }
}

/// Full-graph node weight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    pub label: LabelId,
    /// Protected from removal in the first removal pass.
    pub priority: bool,
}

/// Statistics for one label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelInfo {
    pub val: LabelId,
    /// Number of entities carrying the label.
    pub num: usize,
    /// Maximum number of entities with this label in one initialization
    /// mini-cluster (`num / partitions`).
    pub lim: usize,
}

/// Interns label strings into dense [`LabelId`]s.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LabelRegistry {
    labels: IndexMap<String, LabelInfo>,
}

impl LabelRegistry {
    pub fn new() -> Self {
        LabelRegistry::default()
    }

    /// Returns the id for `name`, registering it on first sight, and counts
    /// one more entity carrying it.
    pub fn intern(&mut self, name: &str) -> LabelId {
        let next = LabelId(self.labels.len() as u32);
        let info = self.labels.entry(name.to_string()).or_insert(LabelInfo {
            val: next,
            num: 0,
            lim: 0,
        });
        info.num += 1;
        info.val
    }

    /// Recomputes `lim` for every label as `num / n_partitions`.
    pub fn set_limits(&mut self, n_partitions: usize) {
        for info in self.labels.values_mut() {
            info.lim = info.num / n_partitions.max(1);
        }
    }

    /// Per-label limits indexed by [`LabelId`].
    pub fn limits(&self) -> Vec<usize> {
        self.labels.values().map(|info| info.lim).collect()
    }

    pub fn name(&self, id: LabelId) -> Option<&str> {
        self.labels.get_index(id.index()).map(|(name, _)| name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&LabelInfo> {
        self.labels.get(name)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Iterates labels in id order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &LabelInfo)> {
        self.labels.iter().map(|(name, info)| (name.as_str(), info))
    }

    /// Snapshot of the label table, keyed by label name in id order.
    pub fn to_map(&self) -> IndexMap<String, LabelInfo> {
        self.labels.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_assigns_dense_ids_in_first_seen_order() {
        let mut reg = LabelRegistry::new();
        assert_eq!(reg.intern("pos"), LabelId(0));
        assert_eq!(reg.intern("neg"), LabelId(1));
        assert_eq!(reg.intern("pos"), LabelId(0));
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.get("pos").unwrap().num, 2);
        assert_eq!(reg.name(LabelId(1)), Some("neg"));
    }

    #[test]
    fn limits_use_floor_division() {
        let mut reg = LabelRegistry::new();
        for _ in 0..7 {
            reg.intern("a");
        }
        reg.intern("b");
        reg.set_limits(3);
        assert_eq!(reg.limits(), vec![2, 0]);
    }

    #[test]
    fn builder_helpers() {
        let e = EntityInput::new("P1").with_label("x").with_priority(true);
        assert_eq!(e.label.as_deref(), Some("x"));
        assert!(e.priority);
    }
}
