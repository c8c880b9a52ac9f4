pub mod cube;
pub mod ray;

pub use cube::{BBox, Cube};
pub use ray::Ray;
