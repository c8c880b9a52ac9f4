use crate::{CubeOverlap, Hit, Primitive};
use geometry::{BBox, Cube, Ray};
use math::{Point3, Vec3};

/// Sphere surface given by center and radius.
pub struct Sphere {
    center: Point3,
    radius: f32,
    modifier: String,
}

impl Sphere {
    pub fn new(center: Point3, radius: f32, modifier: &str) -> Sphere {
        assert!(radius > 0.0, "sphere radius must be positive");
        Sphere {
            center,
            radius,
            modifier: modifier.to_string(),
        }
    }
}

impl Primitive for Sphere {
    fn bbox(&self) -> Option<BBox> {
        let r = Vec3::new(self.radius, self.radius, self.radius);
        Some(BBox::new(self.center - r, self.center + r))
    }

    fn cube_overlap(&self, cube: &Cube) -> CubeOverlap {
        let b = cube.bbox();
        let r2 = self.radius * self.radius;
        // Squared distance from the center to the nearest and farthest points
        // of the cube.
        let (mut d_near, mut d_far) = (0.0f32, 0.0f32);
        for axis in 0..3 {
            let c = self.center[axis];
            let (lo, hi) = (b.min()[axis], b.max()[axis]);
            let near = c.clamp(lo, hi) - c;
            let far = if c - lo > hi - c { c - lo } else { hi - c };
            d_near += near * near;
            d_far += far * far;
        }
        if d_near > r2 || d_far < r2 {
            // Either the cube is outside the sphere, or the whole cube lies
            // strictly inside it; the surface misses the cell both ways.
            CubeOverlap::Disjoint
        } else {
            CubeOverlap::Partial
        }
    }

    fn intersect(&self, ray: &Ray) -> Option<Hit> {
        let oc = ray.origin - self.center;
        let a = ray.dir.norm_squared();
        let half_b = oc.dot(ray.dir);
        let c = oc.norm_squared() - self.radius * self.radius;
        let discriminant = half_b * half_b - a * c;
        if discriminant < 0.0 {
            return None;
        }
        let sqrt_d = discriminant.sqrt();
        let t = ray
            .truncated_t((-half_b - sqrt_d) / a)
            .or_else(|| ray.truncated_t((-half_b + sqrt_d) / a))?;
        let pos = ray.position_at(t);
        let normal = (pos - self.center) * (1.0 / self.radius);
        Some(Hit::new(t, pos, normal))
    }

    fn modifier(&self) -> &str {
        &self.modifier
    }
}

/// Unbounded plane through `point` with the given `normal`. The canonical
/// `Spans` surface: once it cuts a cell, no amount of subdivision separates
/// it from the octants.
pub struct Plane {
    point: Point3,
    normal: Vec3,
    modifier: String,
}

impl Plane {
    pub fn new(point: Point3, normal: Vec3, modifier: &str) -> Plane {
        Plane {
            point,
            normal: normal.hat(),
            modifier: modifier.to_string(),
        }
    }
}

impl Primitive for Plane {
    fn bbox(&self) -> Option<BBox> {
        None
    }

    fn cube_overlap(&self, cube: &Cube) -> CubeOverlap {
        let mut above = false;
        let mut below = false;
        for i in 0..8 {
            let mut corner = cube.origin;
            for axis in 0..3 {
                if (1 << axis) & i != 0 {
                    corner[axis] += cube.size;
                }
            }
            let d = (corner - self.point).dot(self.normal);
            above |= d >= 0.0;
            below |= d <= 0.0;
        }
        if above && below {
            CubeOverlap::Spans
        } else {
            CubeOverlap::Disjoint
        }
    }

    fn intersect(&self, ray: &Ray) -> Option<Hit> {
        let denom = ray.dir.dot(self.normal);
        if denom.abs() < 1e-12 {
            return None;
        }
        let t = ray.truncated_t((self.point - ray.origin).dot(self.normal) / denom)?;
        Some(Hit::new(t, ray.position_at(t), self.normal))
    }

    fn modifier(&self) -> &str {
        &self.modifier
    }
}

/// Single triangle with vertices in counter-clockwise order.
pub struct Triangle {
    vertices: [Point3; 3],
    modifier: String,
}

impl Triangle {
    pub fn new(p0: Point3, p1: Point3, p2: Point3, modifier: &str) -> Triangle {
        Triangle {
            vertices: [p0, p1, p2],
            modifier: modifier.to_string(),
        }
    }
}

impl Primitive for Triangle {
    fn bbox(&self) -> Option<BBox> {
        let [p0, p1, p2] = self.vertices;
        Some(BBox::new(p0, p1).union(p2))
    }

    fn cube_overlap(&self, cube: &Cube) -> CubeOverlap {
        // Conservative: the bounding boxes overlapping may admit a cell the
        // triangle itself misses, which costs query time but never drops a
        // candidate.
        if self.bbox().unwrap().overlaps(cube.bbox()) {
            CubeOverlap::Partial
        } else {
            CubeOverlap::Disjoint
        }
    }

    fn intersect(&self, ray: &Ray) -> Option<Hit> {
        // Moller-Trumbore.
        let [p0, p1, p2] = self.vertices;
        let e1 = p1 - p0;
        let e2 = p2 - p0;
        let pv = ray.dir.cross(e2);
        let det = e1.dot(pv);
        if det.abs() < 1e-12 {
            return None;
        }
        let inv_det = 1.0 / det;
        let tv = ray.origin - p0;
        let u = tv.dot(pv) * inv_det;
        if !(0.0..=1.0).contains(&u) {
            return None;
        }
        let qv = tv.cross(e1);
        let v = ray.dir.dot(qv) * inv_det;
        if v < 0.0 || u + v > 1.0 {
            return None;
        }
        let t = ray.truncated_t(e2.dot(qv) * inv_det)?;
        Some(Hit::new(t, ray.position_at(t), e1.cross(e2).hat()))
    }

    fn modifier(&self) -> &str {
        &self.modifier
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use math::{point3, vec3};

    #[test]
    fn sphere_overlap_three_ways() {
        let sp = Sphere::new(point3(0.0, 0.0, 0.0), 1.0, "m");
        let outside = Cube::new(point3(5.0, 5.0, 5.0), 1.0);
        let crossing = Cube::new(point3(0.5, -0.5, -0.5), 1.0);
        let inside = Cube::new(point3(-0.2, -0.2, -0.2), 0.4);
        assert_eq!(sp.cube_overlap(&outside), CubeOverlap::Disjoint);
        assert_eq!(sp.cube_overlap(&crossing), CubeOverlap::Partial);
        // The surface never enters a cell buried inside the sphere.
        assert_eq!(sp.cube_overlap(&inside), CubeOverlap::Disjoint);
    }

    #[test]
    fn plane_spans_cells_it_cuts() {
        let pl = Plane::new(point3(0.0, 0.0, 0.0), vec3(0.0, 1.0, 0.0), "floor");
        let cut = Cube::new(point3(-1.0, -0.5, -1.0), 2.0);
        let above = Cube::new(point3(-1.0, 2.0, -1.0), 2.0);
        assert_eq!(pl.cube_overlap(&cut), CubeOverlap::Spans);
        assert_eq!(pl.cube_overlap(&above), CubeOverlap::Disjoint);
    }

    #[test]
    fn sphere_ray_hits_near_surface() {
        let sp = Sphere::new(point3(0.0, 0.0, 5.0), 1.0, "m");
        let ray = Ray::new(point3(0.0, 0.0, 0.0), vec3(0.0, 0.0, 1.0));
        let hit = sp.intersect(&ray).unwrap();
        assert!((hit.t - 4.0).abs() < 1e-4);
        assert!((hit.normal.dot(vec3(0.0, 0.0, -1.0)) - 1.0).abs() < 1e-4);
        // From inside, the far surface is hit instead.
        let inside = Ray::new(point3(0.0, 0.0, 5.0), vec3(0.0, 0.0, 1.0));
        let far = sp.intersect(&inside).unwrap();
        assert!((far.t - 1.0).abs() < 1e-4);
    }

    #[test]
    fn triangle_ray_barycentric_bounds() {
        let tri = Triangle::new(
            point3(0.0, 0.0, 2.0),
            point3(1.0, 0.0, 2.0),
            point3(0.0, 1.0, 2.0),
            "m",
        );
        let center = Ray::new(point3(0.25, 0.25, 0.0), vec3(0.0, 0.0, 1.0));
        let outside = Ray::new(point3(0.9, 0.9, 0.0), vec3(0.0, 0.0, 1.0));
        assert!(tri.intersect(&center).is_some());
        assert!(tri.intersect(&outside).is_none());
    }
}
