use std::sync::Arc;

use geometry::{Cube, Ray};
use math::float::TINY;
use shape::{CubeOverlap, Primitive};
use thiserror::Error;

mod intern;
mod query;

pub use query::Candidates;

/// Dense index into the scene's primitive table.
pub type ObjectId = usize;

/// One cell of the spatial index. Children of an `Internal` node partition
/// the parent cube into 8 equal octants, ordered by the 3-bit axis encoding
/// of `Cube::octant`. Children are owned top-down; `optimize` may replace
/// structurally identical subtrees with shared `Arc` handles, but the tree
/// reads as a pure value either way.
#[derive(Debug, Clone, PartialEq)]
pub enum OctreeNode {
    /// No primitives below this cell.
    Empty,
    /// Sorted, bounded set of ids whose surfaces pass through this cell.
    Leaf(Vec<ObjectId>),
    Internal(Arc<[OctreeNode; 8]>),
}

impl OctreeNode {
    fn empty_children() -> [OctreeNode; 8] {
        use OctreeNode::Empty as E;
        [
            E.clone(),
            E.clone(),
            E.clone(),
            E.clone(),
            E.clone(),
            E.clone(),
            E.clone(),
            E,
        ]
    }

    pub fn height(&self) -> u32 {
        match self {
            OctreeNode::Internal(kids) => kids.iter().map(|k| k.height()).max().unwrap() + 1,
            _ => 1,
        }
    }

    /// Number of `Internal` nodes reachable from this one, counting shared
    /// subtrees once per reference.
    pub fn internal_count(&self) -> usize {
        match self {
            OctreeNode::Internal(kids) => {
                1 + kids.iter().map(|k| k.internal_count()).sum::<usize>()
            }
            _ => 0,
        }
    }
}

/// Tuning knobs of the subdivision policy.
#[derive(Debug, Clone, Copy)]
pub struct OctreeOptions {
    /// Number of primitives tolerated in a leaf before subdivision is tried.
    pub split_threshold: usize,
    /// Bounds the minimum cell size: `min_cell = root_size / resolution_limit`.
    pub resolution_limit: u32,
    /// Hard bound on a leaf set. Overflow is a fatal build error; it is only
    /// reachable when subdivision is already disallowed.
    pub leaf_capacity: usize,
}

impl Default for OctreeOptions {
    fn default() -> Self {
        OctreeOptions {
            split_threshold: 5,
            resolution_limit: 1024,
            leaf_capacity: 511,
        }
    }
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("leaf set overflow adding object {id} at {cube} (capacity {capacity})")]
    SetOverflow {
        id: ObjectId,
        capacity: usize,
        cube: Cube,
    },
}

/// The octree spatial index. Built once over a primitive table, optionally
/// canonicalized with `optimize`, then queried read-only from any number of
/// threads (no interior mutability anywhere in the tree).
#[derive(Debug)]
pub struct OctreeIndex {
    root: OctreeNode,
    cube: Cube,
    min_cell_size: f32,
    options: OctreeOptions,
}

impl OctreeIndex {
    /// An empty index over `cube`, ready for insertion.
    pub fn new(cube: Cube, options: OctreeOptions) -> Self {
        OctreeIndex {
            root: OctreeNode::Empty,
            cube,
            min_cell_size: cube.size / options.resolution_limit as f32 - TINY,
            options,
        }
    }

    /// Builds the index over all of `table` within `cube`.
    pub fn build(
        table: &[Arc<dyn Primitive>],
        cube: Cube,
        options: OctreeOptions,
    ) -> Result<Self, BuildError> {
        Self::build_from(table, 0, cube, options)
    }

    /// Builds the index inserting only ids `start..table.len()`, for the
    /// incremental case where ids below `start` belong to an index loaded as
    /// read-only context.
    pub fn build_from(
        table: &[Arc<dyn Primitive>],
        start: ObjectId,
        cube: Cube,
        options: OctreeOptions,
    ) -> Result<Self, BuildError> {
        let mut index = Self::new(cube, options);
        for id in start..table.len() {
            index.insert(table, id)?;
        }
        Ok(index)
    }

    /// Inserts one primitive, subdividing overfull cells per the policy.
    pub fn insert(&mut self, table: &[Arc<dyn Primitive>], id: ObjectId) -> Result<(), BuildError> {
        let cube = self.cube;
        add_object(
            &mut self.root,
            cube,
            id,
            table,
            &self.options,
            self.min_cell_size,
        )
    }

    /// Canonicalization pass: deduplicates structurally identical subtrees
    /// bottom-up into shared handles. Purely a memory optimization; queries
    /// see the same tree. Idempotent.
    pub fn optimize(&mut self) {
        let root = std::mem::replace(&mut self.root, OctreeNode::Empty);
        self.root = intern::combine(root);
    }

    /// Candidate primitives for `ray`: ids of every leaf set whose cell the
    /// ray's slab test admits, each id yielded once, cells visited in
    /// front-to-back order along the ray's direction signs. One independent
    /// cursor per call.
    pub fn query(&self, ray: Ray) -> Candidates<'_> {
        Candidates::new(&self.root, self.cube, ray)
    }

    pub fn root(&self) -> &OctreeNode {
        &self.root
    }
    pub fn cube(&self) -> Cube {
        self.cube
    }
    pub fn min_cell_size(&self) -> f32 {
        self.min_cell_size
    }
    pub fn options(&self) -> OctreeOptions {
        self.options
    }
}

fn add_object(
    node: &mut OctreeNode,
    cube: Cube,
    id: ObjectId,
    table: &[Arc<dyn Primitive>],
    options: &OctreeOptions,
    min_cell_size: f32,
) -> Result<(), BuildError> {
    let overlap = table[id].cube_overlap(&cube);
    if overlap == CubeOverlap::Disjoint {
        return Ok(());
    }
    match node {
        OctreeNode::Internal(kids) => {
            // Copy-on-write: during a fresh build the children are uniquely
            // owned and this mutates in place.
            let kids = Arc::make_mut(kids);
            for i in 0..8 {
                add_object(&mut kids[i], cube.octant(i), id, table, options, min_cell_size)?;
            }
        }
        OctreeNode::Empty => *node = OctreeNode::Leaf(vec![id]),
        OctreeNode::Leaf(set) => {
            let kid_size = cube.size * 0.5;
            let keep_in_set = overlap == CubeOverlap::Spans
                || set.len() < options.split_threshold
                || kid_size < min_cell_size;
            if keep_in_set {
                if set.len() >= options.leaf_capacity {
                    return Err(BuildError::SetOverflow {
                        id,
                        capacity: options.leaf_capacity,
                        cube,
                    });
                }
                if let Err(pos) = set.binary_search(&id) {
                    set.insert(pos, id);
                }
            } else {
                // Subdivide: re-insert every member plus the newcomer into 8
                // fresh octants, then become internal.
                let members = std::mem::take(set);
                let mut kids = OctreeNode::empty_children();
                for i in 0..8 {
                    let kid_cube = cube.octant(i);
                    for &member in &members {
                        add_object(&mut kids[i], kid_cube, member, table, options, min_cell_size)?;
                    }
                    add_object(&mut kids[i], kid_cube, id, table, options, min_cell_size)?;
                }
                *node = OctreeNode::Internal(Arc::new(kids));
            }
        }
    }
    Ok(())
}
