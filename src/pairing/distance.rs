//! All-pairs translation and rotation distances between two pose sets.

use nalgebra::{DMatrix, Matrix3, Vector3};
use tracing::debug;

use super::NamedPose;
use super::backend::ComputeBackend;
use crate::error::Result;
use crate::geometry::so3::rotation_matrix_from_wxyz;

/// Distance matrices for a query set (rows) against a map set (columns).
#[derive(Debug, Clone, PartialEq)]
pub struct PairwiseDistances {
    /// Euclidean distance between translations.
    pub translation: DMatrix<f64>,
    /// Geodesic rotation angle in degrees, in [0, 180].
    pub rotation_deg: DMatrix<f64>,
}

impl PairwiseDistances {
    /// Builds both matrices on `backend`.
    ///
    /// Rotation matrices are derived once per pose from the (w, x, y, z)
    /// quaternion, not once per pair.
    pub fn compute(
        query: &[NamedPose],
        map: &[NamedPose],
        backend: &dyn ComputeBackend,
    ) -> Result<Self> {
        let query_t = translations(query);
        let map_t = translations(map);
        let query_r = rotation_matrices(query);
        let map_r = rotation_matrices(map);

        let (translation, rotation_deg) = backend.pairwise(&query_t, &map_t, &query_r, &map_r)?;
        debug!(
            "Computed {}x{} distance matrices on '{}'",
            translation.nrows(),
            translation.ncols(),
            backend.name()
        );

        Ok(Self {
            translation,
            rotation_deg,
        })
    }

    pub fn n_query(&self) -> usize {
        self.translation.nrows()
    }

    pub fn n_map(&self) -> usize {
        self.translation.ncols()
    }
}

fn translations(poses: &[NamedPose]) -> Vec<Vector3<f64>> {
    poses.iter().map(|p| p.pose.translation).collect()
}

fn rotation_matrices(poses: &[NamedPose]) -> Vec<Matrix3<f64>> {
    poses
        .iter()
        .map(|p| rotation_matrix_from_wxyz(p.pose.quaternion_wxyz()))
        .collect()
}
