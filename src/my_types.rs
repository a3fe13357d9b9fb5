use nalgebra as na;

pub type Vector2d = na::Vector2<f64>;
pub type Vector3d = na::Vector3<f64>;
pub type Matrix3d = na::Matrix3<f64>;
pub type Matrix8d = na::SMatrix<f64, 8, 8>;
pub type Vector8d = na::SVector<f64, 8>;

/// Integer pixel coordinates, x to the right and y down.
pub type Pixel = na::Vector2<i32>;

/// Stable handle of a tracked object inside the engine, never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub usize);
