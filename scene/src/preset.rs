//! Built-in demo scene, used by the binary when no scene input is wired up
//! and by tests that want realistic geometry without a loader.

use std::sync::Arc;

use math::{point3, vec3};
use octree::OctreeOptions;
use shape::{Plane, Primitive, Sphere, Triangle};

use crate::{Scene, SceneBuilder, SceneError};

/// A floor plane plus two modifier groups of spheres and a triangle pair.
/// Registered modifier names: `floor`, `red`, `green`.
pub fn demo(options: OctreeOptions) -> Result<Scene, SceneError> {
    let mut primitives: Vec<Arc<dyn Primitive>> = vec![Arc::new(Plane::new(
        point3(0.0, 0.0, 0.0),
        vec3(0.0, 1.0, 0.0),
        "floor",
    ))];
    for i in 0..4 {
        for j in 0..4 {
            let center = point3(i as f32 * 2.0 - 3.0, 0.5, j as f32 * 2.0 - 3.0);
            let group = if (i + j) % 2 == 0 { "red" } else { "green" };
            primitives.push(Arc::new(Sphere::new(center, 0.4, group)));
        }
    }
    primitives.push(Arc::new(Triangle::new(
        point3(-4.0, 0.0, -4.0),
        point3(4.0, 0.0, -4.0),
        point3(0.0, 4.0, -4.0),
        "red",
    )));
    primitives.push(Arc::new(Triangle::new(
        point3(-4.0, 0.0, 4.0),
        point3(0.0, 4.0, 4.0),
        point3(4.0, 0.0, 4.0),
        "green",
    )));

    let mut builder = SceneBuilder::new(options).fixed_bounds(geometry::Cube::new(
        point3(-8.0, -8.0, -8.0),
        16.0,
    ))?;
    builder.add_file("<demo>", primitives)?;
    builder.build()
}

/// The modifier names `demo` emits, in registration order.
pub fn demo_modifiers() -> [&'static str; 3] {
    ["floor", "red", "green"]
}
