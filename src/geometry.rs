use nalgebra::{Point3, Vector3};

/// 3D point type
pub type Point3D = Point3<f64>;

/// 3D vector type
pub type Vector3D = Vector3<f64>;
