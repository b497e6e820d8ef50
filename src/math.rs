//! Mathematical structs and functions.

use cgmath::{Point3, Vector3};
pub use cube::Cube;

mod cube;

/// A 3D point
pub type Point3d = Point3<f64>;

/// A 3D vector
pub type Vector3d = Vector3<f64>;

/// The unit vector along dimension `dim`, pointing in the positive direction if `dir` is true.
pub fn axis_vector(dim: usize, dir: bool) -> Vector3d {
    let mut v = Vector3d::new(0.0, 0.0, 0.0);
    v[dim] = if dir { 1.0 } else { -1.0 };
    v
}
