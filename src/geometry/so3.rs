//! SO(3) helpers for comparing camera orientations.
//!
//! Quaternions are always handled in (w, x, y, z) order. The rotation
//! matrix built here is the one that maps a vector through `q v q*`.

use nalgebra::Matrix3;

/// Converts a (w, x, y, z) quaternion to a 3×3 rotation matrix.
///
/// The input is scaled by `2 / |q|²`, so a quaternion that drifted
/// slightly off the unit sphere still yields an orthonormal matrix.
///
/// ```text
/// R = | 1 - s(y² + z²)   s(xy - zw)       s(xz + yw)     |
///     | s(xy + zw)       1 - s(x² + z²)   s(yz - xw)     |
///     | s(xz - yw)       s(yz + xw)       1 - s(x² + y²) |
/// ```
pub fn rotation_matrix_from_wxyz(q: [f64; 4]) -> Matrix3<f64> {
    let [w, x, y, z] = q;
    let s = 2.0 / (w * w + x * x + y * y + z * z);

    Matrix3::new(
        1.0 - s * (y * y + z * z), s * (x * y - z * w), s * (x * z + y * w),
        s * (x * y + z * w), 1.0 - s * (x * x + z * z), s * (y * z - x * w),
        s * (x * z - y * w), s * (y * z + x * w), 1.0 - s * (x * x + y * y),
    )
}

/// Geodesic distance on SO(3) in radians: the angle of `R_aᵀ R_b`.
///
/// `trace(R_aᵀ R_b)` equals the Frobenius inner product of the two
/// matrices, so the product itself is never formed. The cosine is clamped
/// to [-1, 1] before `acos`; rounding pushes it slightly outside near 0°
/// and 180°.
#[inline]
pub fn geodesic_distance(r_a: &Matrix3<f64>, r_b: &Matrix3<f64>) -> f64 {
    let trace = r_a.dot(r_b);
    ((trace - 1.0) / 2.0).clamp(-1.0, 1.0).acos()
}

/// [`geodesic_distance`] converted to degrees.
#[inline]
pub fn geodesic_distance_deg(r_a: &Matrix3<f64>, r_b: &Matrix3<f64>) -> f64 {
    geodesic_distance(r_a, r_b).to_degrees()
}
