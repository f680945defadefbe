//! Geometry utilities: SE3 transforms, SO(3) rotation distances.

pub mod se3;
pub mod so3;

pub use se3::SE3;
pub use so3::{geodesic_distance, geodesic_distance_deg, rotation_matrix_from_wxyz};
