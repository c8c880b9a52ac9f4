use std::fmt::{Display, Formatter, Result};

use crate::ray::Ray;
use math::{float::min_max, Point3, Vec3};

/// 3D bounding-box type. Boundary check is closed (`[min, max]`) on all axes.
/// - Build one from 2 `Point3`s, or grow an `empty()` one by `union()`;
/// - Check if it `contains()` a point or `encloses()` another box, or
///   `intersect()`s with a `Ray`.
#[derive(Debug, Clone, Copy)]
pub struct BBox {
    min: Point3,
    max: Point3,
}

impl BBox {
    pub fn empty() -> BBox {
        BBox {
            min: Point3::new(f32::INFINITY, f32::INFINITY, f32::INFINITY),
            max: Point3::new(-f32::INFINITY, -f32::INFINITY, -f32::INFINITY),
        }
    }
    pub fn new(p0: Point3, p1: Point3) -> BBox {
        let (xmin, xmax) = min_max(p0.x, p1.x);
        let (ymin, ymax) = min_max(p0.y, p1.y);
        let (zmin, zmax) = min_max(p0.z, p1.z);
        BBox {
            min: Point3::new(xmin, ymin, zmin),
            max: Point3::new(xmax, ymax, zmax),
        }
    }

    pub fn union(self, p: Point3) -> BBox {
        let mut result = self;
        for i in 0..3 {
            result.min[i] = self.min[i].min(p[i]);
            result.max[i] = self.max[i].max(p[i]);
        }
        result
    }

    pub fn is_empty(&self) -> bool {
        (0..3).any(|i| self.min[i] > self.max[i])
    }

    pub fn min(&self) -> Point3 {
        self.min
    }
    pub fn max(&self) -> Point3 {
        self.max
    }
    pub fn diag(&self) -> Vec3 {
        self.max - self.min
    }
    pub fn midpoint(&self) -> Point3 {
        self.min + self.diag() * 0.5
    }

    pub fn encloses(&self, other: Self) -> bool {
        for axis in 0..3 {
            if self.min[axis] > other.min[axis] {
                return false;
            }
            if self.max[axis] < other.max[axis] {
                return false;
            }
        }
        true
    }

    pub fn contains(&self, p: Point3) -> bool {
        for axis in 0..3 {
            if self.min[axis] > p[axis] {
                return false;
            }
            if self.max[axis] < p[axis] {
                return false;
            }
        }
        true
    }

    pub fn overlaps(&self, other: Self) -> bool {
        for axis in 0..3 {
            if self.min[axis] > other.max[axis] {
                return false;
            }
            if self.max[axis] < other.min[axis] {
                return false;
            }
        }
        true
    }

    pub fn intersect(&self, r: &Ray) -> bool {
        let (mut t_min, mut t_max) = (0.0f32, r.t_max);
        for axis in 0..3 {
            let inv_dir = 1.0 / r.dir[axis];
            let t0 = (self.min[axis] - r.origin[axis]) * inv_dir;
            let t1 = (self.max[axis] - r.origin[axis]) * inv_dir;
            let (t0, t1) = min_max(t0, t1);
            // Shrinks [t_min, t_max] by intersecting it with [t0, t1].
            t_min = t_min.max(t0);
            t_max = t_max.min(t1);
            if t_max < t_min {
                return false;
            }
        }
        true
    }
}

impl Display for BBox {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "box[{} -> {}]", self.min, self.max)
    }
}

pub fn union(b0: BBox, b1: BBox) -> BBox {
    b0.union(b1.min).union(b1.max)
}

/// An axis-aligned cubic region: origin corner plus edge length. The unit of
/// spatial subdivision - a cube splits into 8 equal octants, indexed by a
/// 3-bit code where bit 0/1/2 set selects the +X/+Y/+Z half.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cube {
    pub origin: Point3,
    pub size: f32,
}

impl Cube {
    pub fn new(origin: Point3, size: f32) -> Cube {
        assert!(size >= 0.0, "negative cube size {}", size);
        Cube { origin, size }
    }

    pub fn center(&self) -> Point3 {
        self.origin + Vec3::new(0.5, 0.5, 0.5) * self.size
    }

    pub fn bbox(&self) -> BBox {
        BBox::new(
            self.origin,
            self.origin + Vec3::new(1.0, 1.0, 1.0) * self.size,
        )
    }

    /// Returns the octant sub-cube with the given 3-bit index: half the edge
    /// length, origin offset along each axis whose bit is set.
    pub fn octant(&self, i: usize) -> Cube {
        debug_assert!(i < 8);
        let half = self.size * 0.5;
        let mut origin = self.origin;
        for axis in 0..3 {
            if (1 << axis) & i != 0 {
                origin[axis] += half;
            }
        }
        Cube { origin, size: half }
    }

    pub fn contains(&self, p: Point3) -> bool {
        self.bbox().contains(p)
    }

    pub fn encloses(&self, b: BBox) -> bool {
        self.bbox().encloses(b)
    }

    pub fn intersect(&self, r: &Ray) -> bool {
        self.bbox().intersect(r)
    }
}

impl Display for Cube {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "cube[{} + {}]", self.origin, self.size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use math::{point3, vec3};

    #[test]
    fn octants_partition_the_cube() {
        let cu = Cube::new(point3(0.0, 0.0, 0.0), 2.0);
        for i in 0..8 {
            let kid = cu.octant(i);
            assert_eq!(kid.size, 1.0);
            assert!(cu.encloses(kid.bbox()), "octant {} escapes parent", i);
        }
        // Octant 5 = +X, +Z halves.
        assert_eq!(cu.octant(5).origin, point3(1.0, 0.0, 1.0));
        // Octant centers are pairwise distinct.
        for i in 0..8 {
            for j in (i + 1)..8 {
                assert_ne!(cu.octant(i).center(), cu.octant(j).center());
            }
        }
    }

    #[test]
    fn slab_test_accepts_and_rejects() {
        let cu = Cube::new(point3(-1.0, -1.0, -1.0), 2.0);
        let hit = Ray::new(point3(-5.0, 0.0, 0.0), vec3(1.0, 0.0, 0.0));
        let miss = Ray::new(point3(-5.0, 3.0, 0.0), vec3(1.0, 0.0, 0.0));
        let behind = Ray::new(point3(-5.0, 0.0, 0.0), vec3(-1.0, 0.0, 0.0));
        assert!(cu.intersect(&hit));
        assert!(!cu.intersect(&miss));
        assert!(!cu.intersect(&behind));
    }

    #[test]
    fn ray_extent_limits_box_hits() {
        let cu = Cube::new(point3(10.0, -1.0, -1.0), 2.0);
        let ray = Ray::new(point3(0.0, 0.0, 0.0), vec3(1.0, 0.0, 0.0));
        assert!(cu.intersect(&ray));
        assert!(!cu.intersect(&ray.with_extent(5.0)));
    }
}
