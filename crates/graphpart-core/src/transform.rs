//! Metric transforms.
//!
//! The engine works in a "lower is more similar" metric space. A
//! [`Transform`] maps raw scores (identities, similarities, distances) into
//! that space and back. The same transform must be applied to the raw edge
//! scores and to the user threshold before they are compared; nothing here
//! checks that the chosen transform actually makes lower mean closer.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PartitionError;

/// Closed registry of metric transforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Transform {
    /// `x`
    #[default]
    #[serde(rename = "none", alias = "identity", alias = "None")]
    Identity,
    /// `1 - x`
    OneMinus,
    /// `1 / x`, `+inf` at zero
    Inverse,
    /// `x^2`
    Square,
    /// `ln(x)`, undefined for `x <= 0`
    Log,
}

impl Transform {
    pub const ALL: [Transform; 5] = [
        Transform::Identity,
        Transform::OneMinus,
        Transform::Inverse,
        Transform::Square,
        Transform::Log,
    ];

    /// Canonical name, as accepted by [`FromStr`].
    pub fn name(self) -> &'static str {
        match self {
            Transform::Identity => "none",
            Transform::OneMinus => "one-minus",
            Transform::Inverse => "inverse",
            Transform::Square => "square",
            Transform::Log => "log",
        }
    }

    /// Maps a raw score into metric space.
    pub fn apply(self, raw: f64) -> Result<f64, PartitionError> {
        let metric = match self {
            Transform::Identity => raw,
            Transform::OneMinus => 1.0 - raw,
            Transform::Inverse => invert(raw),
            Transform::Square => raw * raw,
            Transform::Log => {
                if raw <= 0.0 {
                    return Err(self.domain_error(raw));
                }
                raw.ln()
            }
        };
        if metric.is_nan() {
            return Err(self.domain_error(raw));
        }
        Ok(metric)
    }

    /// Maps a metric back to raw score units.
    ///
    /// `Square` only inverts on the non-negative half line, so a negative
    /// metric is a domain error.
    pub fn inverse(self, metric: f64) -> Result<f64, PartitionError> {
        let raw = match self {
            Transform::Identity => metric,
            Transform::OneMinus => 1.0 - metric,
            Transform::Inverse => invert(metric),
            Transform::Square => {
                if metric < 0.0 {
                    return Err(self.domain_error(metric));
                }
                metric.sqrt()
            }
            Transform::Log => metric.exp(),
        };
        if raw.is_nan() {
            return Err(self.domain_error(metric));
        }
        Ok(raw)
    }

    fn domain_error(self, value: f64) -> PartitionError {
        PartitionError::Domain {
            transform: self.name(),
            value,
        }
    }
}

fn invert(x: f64) -> f64 {
    if x > 0.0 {
        1.0 / x
    } else {
        f64::INFINITY
    }
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Transform {
    type Err = PartitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" | "None" | "identity" => Ok(Transform::Identity),
            "one-minus" => Ok(Transform::OneMinus),
            "inverse" => Ok(Transform::Inverse),
            "square" => Ok(Transform::Square),
            "log" => Ok(Transform::Log),
            other => Err(PartitionError::config(format!(
                "unknown transformation '{}', expected one of none/one-minus/inverse/square/log",
                other
            ))),
        }
    }
}
