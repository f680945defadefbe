//! Thresholds and selection parameters for distance-based pairing.

use std::fs::File;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::{PairingError, Result};

/// Selection parameters for [`compute_pairs`](super::compute_pairs).
///
/// Distances are in the unit of the pose translations, angles in degrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PairingConfig {
    /// Maximum number of candidates kept per query; `None` keeps all.
    pub top_k: Option<usize>,
    /// Pairs closer than this are rejected.
    pub min_distance: f64,
    /// Pairs farther than this are rejected; also normalizes the distance term.
    pub max_distance: f64,
    /// Pairs whose rotations differ by more than this are rejected; also
    /// normalizes the angle term.
    pub max_angle: f64,
    /// Keep rejected pairs in the output (they still count towards `top_k`).
    pub keep_rejected: bool,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            top_k: Some(20),
            min_distance: 0.0,
            max_distance: 25.0,
            max_angle: 45.0,
            keep_rejected: false,
        }
    }
}

impl PairingConfig {
    /// Load from a YAML file. Missing fields take their default value.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
        let config: Self = serde_yaml::from_reader(file)
            .with_context(|| format!("Failed to parse pairing config {:?}", path))?;
        Ok(config)
    }

    /// Checks the thresholds the score formula divides by.
    ///
    /// `compute_pairs` does not call this: a non-positive `max_distance`
    /// or `max_angle` only produces non-finite or reordered scores there.
    /// `min_distance > max_distance` is accepted (every pair is rejected).
    pub fn validate(&self) -> Result<()> {
        if !self.min_distance.is_finite() {
            return Err(PairingError::InvalidConfiguration(format!(
                "min_distance must be finite, got {}",
                self.min_distance
            )));
        }
        if !(self.max_distance.is_finite() && self.max_distance > 0.0) {
            return Err(PairingError::InvalidConfiguration(format!(
                "max_distance must be positive and finite, got {}",
                self.max_distance
            )));
        }
        if !(self.max_angle.is_finite() && self.max_angle > 0.0) {
            return Err(PairingError::InvalidConfiguration(format!(
                "max_angle must be positive and finite, got {}",
                self.max_angle
            )));
        }
        Ok(())
    }
}
