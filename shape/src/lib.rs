use std::fmt::{Display, Formatter, Result};

use geometry::{BBox, Cube, Ray};
use math::{Point3, Vec3};
use radiometry::Color;

/// Concrete `Primitive` implementations: `Sphere`, `Plane`, `Triangle`.
pub mod simple;

pub use simple::{Plane, Sphere, Triangle};

/// How a primitive's surface relates to a cubic cell. Three-valued: `Spans`
/// marks surfaces (infinite planes, cell-covering geometry) that belong in
/// the cell's set no matter how far the cell subdivides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CubeOverlap {
    /// No part of the surface passes through the cube.
    Disjoint,
    /// The surface passes through part of the cube.
    Partial,
    /// The surface cuts the whole cell; subdividing cannot separate it from
    /// any octant, so it is always added to the set.
    Spans,
}

/// Geometric record of a ray-surface intersection.
#[derive(Debug, Clone, Copy)]
pub struct Hit {
    pub t: f32,
    pub pos: Point3,
    pub normal: Vec3,
}

impl Hit {
    pub fn new(t: f32, pos: Point3, normal: Vec3) -> Hit {
        Hit { t, pos, normal }
    }
}

impl Display for Hit {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "pos = {}, t = {:.2}, normal = {}", self.pos, self.t, self.normal)
    }
}

/// The geometry-provider contract the spatial index and the ray loop are
/// built against. Implementations supply axis-aligned bounding information,
/// the three-valued cube-overlap predicate, and a ray intersection test.
pub trait Primitive: Send + Sync {
    /// Axis-aligned bounds, or `None` for unbounded surfaces (which then take
    /// no part in automatic scene-bounds derivation).
    fn bbox(&self) -> Option<BBox>;

    /// Tests the surface against a cubic cell.
    fn cube_overlap(&self, cube: &Cube) -> CubeOverlap;

    /// Closest intersection within the ray's extent, if any.
    fn intersect(&self, ray: &Ray) -> Option<Hit>;

    /// Name of the modifier (material group) this surface contributes to.
    fn modifier(&self) -> &str;
}

/// Shading collaborator: maps a ray-surface interaction to a radiometric
/// triple. Evaluated outside the index and the accumulator; only its output
/// is routed into contribution bins.
pub trait Shader: Send + Sync {
    fn shade(&self, ray: &Ray, hit: &Hit) -> Color;
}

/// Headlight-style shader used by the demo binary and tests: constant albedo
/// scaled by the cosine between the surface normal and the reversed ray.
pub struct FlatShader {
    pub albedo: Color,
}

impl Shader for FlatShader {
    fn shade(&self, ray: &Ray, hit: &Hit) -> Color {
        let cos = hit.normal.dot(-ray.dir.hat()).abs();
        self.albedo * cos
    }
}
