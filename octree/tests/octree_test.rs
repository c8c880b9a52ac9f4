use std::sync::Arc;

use geometry::{Cube, Ray};
use math::{point3, vec3, Point3};
use octree::{BuildError, ObjectId, OctreeIndex, OctreeNode, OctreeOptions};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shape::{Plane, Primitive, Sphere};

fn random_sphere_table(rng: &mut StdRng, count: usize) -> Vec<Arc<dyn Primitive>> {
    (0..count)
        .map(|_| {
            let center = point3(
                rng.gen_range(-8.0..8.0),
                rng.gen_range(-8.0..8.0),
                rng.gen_range(-8.0..8.0),
            );
            let radius = rng.gen_range(0.1..1.5);
            Arc::new(Sphere::new(center, radius, "m")) as Arc<dyn Primitive>
        })
        .collect()
}

fn random_ray(rng: &mut StdRng) -> Ray {
    let origin = point3(
        rng.gen_range(-12.0..12.0),
        rng.gen_range(-12.0..12.0),
        rng.gen_range(-12.0..12.0),
    );
    let dir = vec3(
        rng.gen_range(-1.0..1.0f32),
        rng.gen_range(-1.0..1.0),
        rng.gen_range(-1.0..1.0),
    );
    let dir = if dir.is_zero() { vec3(1.0, 0.0, 0.0) } else { dir };
    Ray::new(origin, dir)
}

fn hits_of(table: &[Arc<dyn Primitive>], ids: impl Iterator<Item = ObjectId>, ray: &Ray) -> Vec<ObjectId> {
    let mut hit_ids = ids
        .filter(|&id| table[id].intersect(ray).is_some())
        .collect::<Vec<_>>();
    hit_ids.sort_unstable();
    hit_ids
}

const SCENE_CUBE: Cube = Cube {
    origin: Point3::new(-10.0, -10.0, -10.0),
    size: 20.0,
};

#[test]
fn query_has_no_false_negatives_vs_linear_scan() {
    let mut rng = StdRng::seed_from_u64(0x0c7ee);
    for round in 0..8 {
        let table = random_sphere_table(&mut rng, 120);
        let index = OctreeIndex::build(&table, SCENE_CUBE, OctreeOptions::default()).unwrap();
        for _ in 0..200 {
            let ray = random_ray(&mut rng);
            let from_index = hits_of(&table, index.query(ray), &ray);
            let brute_force = hits_of(&table, 0..table.len(), &ray);
            assert_eq!(
                from_index, brute_force,
                "round {}: octree missed a hit for {}",
                round, ray
            );
        }
    }
}

fn assert_no_undersized_internal(node: &OctreeNode, size: f32, min_cell: f32) {
    if let OctreeNode::Internal(kids) = node {
        assert!(
            size * 0.5 >= min_cell,
            "internal node subdivided below the minimum cell size: {} < {}",
            size * 0.5,
            min_cell
        );
        for kid in kids.iter() {
            assert_no_undersized_internal(kid, size * 0.5, min_cell);
        }
    }
}

#[test]
fn coincident_primitives_never_subdivide_below_min_cell() {
    // 1000 identical spheres defeat the count heuristic entirely; only the
    // minimum cell size bounds the depth.
    let table: Vec<Arc<dyn Primitive>> = (0..1000)
        .map(|_| Arc::new(Sphere::new(point3(0.0, 0.0, 0.0), 1.0, "m")) as Arc<dyn Primitive>)
        .collect();
    let options = OctreeOptions {
        split_threshold: 5,
        resolution_limit: 8,
        leaf_capacity: 5000,
    };
    let index = OctreeIndex::build(&table, SCENE_CUBE, options).unwrap();
    assert_no_undersized_internal(index.root(), index.cube().size, index.min_cell_size());
    // Sanity: the scene is actually deep enough to have subdivided at all.
    assert!(index.root().height() > 1);
}

#[test]
fn optimize_is_idempotent_and_query_transparent() {
    let mut rng = StdRng::seed_from_u64(42);
    let table = random_sphere_table(&mut rng, 150);
    let mut index = OctreeIndex::build(&table, SCENE_CUBE, OctreeOptions::default()).unwrap();
    let unoptimized_root = index.root().clone();

    index.optimize();
    let once = index.root().clone();
    index.optimize();
    let twice = index.root().clone();

    assert_eq!(once, unoptimized_root);
    assert_eq!(twice, once);

    let rebuilt = OctreeIndex::build(&table, SCENE_CUBE, OctreeOptions::default()).unwrap();
    for _ in 0..200 {
        let ray = random_ray(&mut rng);
        let optimized: Vec<_> = {
            let mut ids = index.query(ray).collect::<Vec<_>>();
            ids.sort_unstable();
            ids
        };
        let plain: Vec<_> = {
            let mut ids = rebuilt.query(ray).collect::<Vec<_>>();
            ids.sort_unstable();
            ids
        };
        assert_eq!(optimized, plain);
    }
}

#[test]
fn spanning_surfaces_stay_in_the_set_and_overflow_is_fatal() {
    let table: Vec<Arc<dyn Primitive>> = (0..5)
        .map(|i| {
            Arc::new(Plane::new(
                point3(0.0, i as f32 * 1e-3, 0.0),
                vec3(0.0, 1.0, 0.0),
                "p",
            )) as Arc<dyn Primitive>
        })
        .collect();
    let options = OctreeOptions {
        split_threshold: 2,
        resolution_limit: 1024,
        leaf_capacity: 4,
    };
    let err = OctreeIndex::build(&table, SCENE_CUBE, options).unwrap_err();
    match err {
        BuildError::SetOverflow { id, capacity, .. } => {
            assert_eq!(id, 4);
            assert_eq!(capacity, 4);
        }
    }
}

#[test]
fn duplicate_insertion_is_a_no_op() {
    let table: Vec<Arc<dyn Primitive>> =
        vec![Arc::new(Sphere::new(point3(0.0, 0.0, 0.0), 1.0, "m"))];
    let mut index = OctreeIndex::build(&table, SCENE_CUBE, OctreeOptions::default()).unwrap();
    let before = index.root().clone();
    index.insert(&table, 0).unwrap();
    assert_eq!(*index.root(), before);
}
