/// Small helpers for common float operations: `min_max` and closeness macros.
pub mod float;

/// 3D vector and point types. Components can be accessed by field (`v.x`) or
/// by index (`v[axis]` with axis in 0..3).
pub mod vecmath;

pub use vecmath::{point3, vec3, Point3, Vec3};
