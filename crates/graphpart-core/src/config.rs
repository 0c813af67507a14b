//! Run configuration.
//!
//! [`PartitionConfig`] is the serde-backed parameter set for one run. It is
//! loaded from JSON (missing fields take their defaults) and then overridden
//! field by field from the command line. [`PartitionConfig::validate`]
//! resolves it into a [`RunPlan`] the pipeline can execute.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::PartitionError;
use crate::init::InitMode;
use crate::merge::{CombinationSearch, SplitRatios};
use crate::transform::Transform;

/// All tunables of a partitioning run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionConfig {
    /// Threshold in raw score space; transformed like the edge scores.
    pub threshold: f64,
    pub transformation: Transform,
    /// Requested number of partitions. Ignored when a test ratio is set.
    pub partitions: usize,
    pub initialization_mode: InitMode,
    /// Let the remover relocate entities before removing any.
    pub allow_moving: bool,
    /// Score removal candidates by cross-partition neighbour count only.
    pub simplistic_removal: bool,
    pub test_ratio: f64,
    pub val_ratio: f64,
    pub combination_search: CombinationSearch,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        PartitionConfig {
            threshold: 0.3,
            transformation: Transform::OneMinus,
            partitions: 5,
            initialization_mode: InitMode::SlowNn,
            allow_moving: true,
            simplistic_removal: true,
            test_ratio: 0.0,
            val_ratio: 0.0,
            combination_search: CombinationSearch::Exhaustive,
        }
    }
}

/// A validated configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunPlan {
    /// Threshold mapped into metric space.
    pub threshold: f64,
    /// Partitions to build before any merge.
    pub partitions: usize,
    /// Present when the fine partitions are merged into train/test(/val).
    pub split: Option<SplitRatios>,
}

impl RunPlan {
    /// Partitions the caller ends up with.
    pub fn final_partitions(&self) -> usize {
        match self.split {
            Some(ratios) => ratios.buckets(),
            None => self.partitions,
        }
    }
}

impl PartitionConfig {
    /// Reads a JSON config file. Absent keys keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, PartitionError> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn to_json(&self) -> Result<String, PartitionError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Checks parameter ranges and resolves the threshold and partition
    /// count actually used.
    pub fn validate(&self) -> Result<RunPlan, PartitionError> {
        if !self.threshold.is_finite() {
            return Err(PartitionError::config(format!(
                "threshold must be finite, got {}",
                self.threshold
            )));
        }
        let threshold = self.transformation.apply(self.threshold)?;

        let split = if self.test_ratio > 0.0 || self.val_ratio > 0.0 {
            let ratios = SplitRatios::new(self.test_ratio, self.val_ratio)?;
            ratios.is_split().then_some(ratios)
        } else {
            None
        };

        let partitions = match split {
            Some(ratios) => ratios.fine_partitions(),
            None => self.partitions,
        };
        if partitions < 1 {
            return Err(PartitionError::config("number of partitions must be at least 1"));
        }

        Ok(RunPlan {
            threshold,
            partitions,
            split,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let plan = PartitionConfig::default().validate().unwrap();
        assert!((plan.threshold - 0.7).abs() < 1e-12);
        assert_eq!(plan.partitions, 5);
        assert!(plan.split.is_none());
        assert_eq!(plan.final_partitions(), 5);
    }

    #[test]
    fn missing_json_fields_take_defaults() {
        let config: PartitionConfig =
            serde_json::from_str(r#"{"threshold": 0.5, "transformation": "none"}"#).unwrap();
        assert_eq!(config.threshold, 0.5);
        assert_eq!(config.transformation, Transform::Identity);
        assert_eq!(config.partitions, 5);
        assert!(config.allow_moving);
    }

    #[test]
    fn json_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = PartitionConfig {
            partitions: 3,
            initialization_mode: InitMode::FastNn,
            combination_search: CombinationSearch::Greedy,
            ..PartitionConfig::default()
        };
        std::fs::write(&path, config.to_json().unwrap()).unwrap();
        assert_eq!(PartitionConfig::from_json_file(&path).unwrap(), config);
    }

    #[test]
    fn split_forces_fine_partition_count() {
        let config = PartitionConfig {
            test_ratio: 0.1,
            val_ratio: 0.1,
            partitions: 3,
            ..PartitionConfig::default()
        };
        let plan = config.validate().unwrap();
        assert_eq!(plan.partitions, 10);
        assert_eq!(plan.final_partitions(), 3);

        let config = PartitionConfig {
            test_ratio: 0.15,
            ..PartitionConfig::default()
        };
        let plan = config.validate().unwrap();
        assert_eq!(plan.partitions, 20);
        assert_eq!(plan.final_partitions(), 2);
    }

    #[test]
    fn rejects_bad_parameters() {
        let zero = PartitionConfig {
            partitions: 0,
            ..PartitionConfig::default()
        };
        assert!(matches!(zero.validate(), Err(PartitionError::Configuration { .. })));

        let nan = PartitionConfig {
            threshold: f64::NAN,
            ..PartitionConfig::default()
        };
        assert!(matches!(nan.validate(), Err(PartitionError::Configuration { .. })));

        let ratio = PartitionConfig {
            test_ratio: 0.33,
            ..PartitionConfig::default()
        };
        assert!(matches!(ratio.validate(), Err(PartitionError::Configuration { .. })));
    }
}
