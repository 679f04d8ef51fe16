//! Some shared linear algebra concepts

use crate::numeric::Float;

/// 3-vectors of real numbers, used for positions and directions
pub type Vector3 = nalgebra::Vector3<Float>;

/// Convenience const for accessing the X coordinate of a 3-vector
pub const X: usize = 0;

/// Convenience const for accessing the Y coordinate of a 3-vector
pub const Y: usize = 1;

/// Convenience const for accessing the Z coordinate of a 3-vector
pub const Z: usize = 2;

/// Truth that every coordinate of a vector is finite
pub fn is_finite(v: &Vector3) -> bool {
    v.iter().all(|x| x.is_finite())
}
