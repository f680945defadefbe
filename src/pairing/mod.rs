//! Distance-based image pairing.
//!
//! Ranks map images against query images by how close their camera poses
//! are, in position and in orientation:
//! - [`extractor`] turns a dataset into ordered `(image name, camera pose)` lists
//! - [`distance`] builds the all-pairs translation / rotation matrices
//! - [`selector`] scores, filters and keeps the best candidates per query
//!
//! [`compute_pairs`] runs the last two steps.

pub mod backend;
pub mod config;
pub mod distance;
pub mod extractor;
pub mod selector;

use tracing::info;

use crate::error::Result;
use crate::geometry::SE3;

pub use backend::{ComputeBackend, CpuBackend, Device, ThreadPoolBackend};
pub use config::PairingConfig;
pub use distance::PairwiseDistances;
pub use extractor::extract_camera_poses;
pub use selector::select_pairs;

/// An image and the pose of its camera.
///
/// Poses of all images passed to one call must share a frame convention;
/// the extractor produces `world_from_camera`, so the translation is the
/// camera center.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedPose {
    pub name: String,
    pub pose: SE3,
}

impl NamedPose {
    pub fn new(name: impl Into<String>, pose: SE3) -> Self {
        Self {
            name: name.into(),
            pose,
        }
    }
}

/// A retained candidate: `map` is worth matching against `query`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePair {
    pub query: String,
    pub map: String,
    pub score: f64,
}

/// Ranks `map` images for every image of `query`.
///
/// Output is grouped by query name in ascending order; each group lists at
/// most `config.top_k` map images by descending score. Empty inputs give
/// an empty result. The configuration is used as given, see
/// [`PairingConfig::validate`].
pub fn compute_pairs(
    query: &[NamedPose],
    map: &[NamedPose],
    config: &PairingConfig,
    backend: &dyn ComputeBackend,
) -> Result<Vec<ImagePair>> {
    let distances = PairwiseDistances::compute(query, map, backend)?;
    let pairs = select_pairs(query, map, &distances, config);
    info!(
        "Paired {} query images against {} map images: {} pairs",
        query.len(),
        map.len(),
        pairs.len()
    );
    Ok(pairs)
}
