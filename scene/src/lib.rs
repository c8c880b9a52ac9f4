//! Scene container: the root cube, the primitive table, per-file provenance,
//! and the frozen octree index built over them.

pub mod preset;

use std::sync::Arc;

use geometry::{cube::union, BBox, Cube, Ray};
use math::float::TINY;
use octree::{BuildError, ObjectId, OctreeIndex, OctreeOptions};
use shape::{Hit, Primitive};
use thiserror::Error;

/// Provenance tables are fixed-width; more scene files than this is a
/// configuration error, not a growth point.
pub const MAX_SCENE_FILES: usize = 63;

/// Padding added around derived scene bounds so geometry on the boundary
/// still tests inside the root cube.
const BOUNDS_MARGIN: f32 = 10.0 * TINY;

#[derive(Debug, Error)]
pub enum SceneError {
    #[error("boundary does not encompass scene ({bbox} outside {cube})")]
    BoundsTooSmall { bbox: BBox, cube: Cube },
    #[error("cannot derive scene bounds: no bounded primitives (fix the bounds explicitly)")]
    NoBounds,
    #[error("too many scene files (limit {0})")]
    TooManyFiles(usize),
    #[error("only one of fixed bounds or a loaded scene may be given")]
    ConflictingBounds,
    #[error(transparent)]
    Build(#[from] BuildError),
}

/// Which input file contributed the primitives starting at `start_id`.
#[derive(Debug, Clone)]
pub struct FileOrigin {
    pub name: String,
    pub start_id: ObjectId,
}

/// A fully built scene: the index is frozen, queries need no locks.
pub struct Scene {
    pub cube: Cube,
    pub index: OctreeIndex,
    pub table: Vec<Arc<dyn Primitive>>,
    pub files: Vec<FileOrigin>,
}

impl std::fmt::Debug for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scene")
            .field("cube", &self.cube)
            .field("index", &self.index)
            .field("primitives", &self.table.len())
            .field("files", &self.files)
            .finish()
    }
}

impl Scene {
    /// Closest surface hit for `ray`, walking the index front to back and
    /// shrinking the ray extent as hits are found.
    pub fn nearest_hit(&self, ray: &Ray) -> Option<(Hit, &dyn Primitive)> {
        let mut ray = *ray;
        let mut best: Option<(Hit, ObjectId)> = None;
        for id in self.index.query(ray) {
            if let Some(hit) = self.table[id].intersect(&ray) {
                ray.set_extent(hit.t);
                best = Some((hit, id));
            }
        }
        best.map(|(hit, id)| (hit, &*self.table[id]))
    }
}

/// Accumulates primitives file by file, then builds (or extends) the octree.
/// Mirrors the two loading modes: a fresh build with derived or fixed
/// bounds, and incremental extension of a previously built index whose
/// geometry is read-only context.
pub struct SceneBuilder {
    fixed_cube: Option<Cube>,
    base: Option<Scene>,
    table: Vec<Arc<dyn Primitive>>,
    files: Vec<FileOrigin>,
    options: OctreeOptions,
}

impl SceneBuilder {
    pub fn new(options: OctreeOptions) -> Self {
        SceneBuilder {
            fixed_cube: None,
            base: None,
            table: Vec::new(),
            files: Vec::new(),
            options,
        }
    }

    /// Fixes the root cube instead of deriving it from the geometry.
    pub fn fixed_bounds(mut self, cube: Cube) -> Result<Self, SceneError> {
        if self.base.is_some() {
            return Err(SceneError::ConflictingBounds);
        }
        self.fixed_cube = Some(cube);
        Ok(self)
    }

    /// Continues from a previously built scene: its table and index become
    /// read-only context, newly added files append after its last id and
    /// only their bounds are validated.
    pub fn extending(scene: Scene) -> Result<Self, SceneError> {
        let options = scene.index.options();
        Ok(SceneBuilder {
            fixed_cube: None,
            table: scene.table.clone(),
            files: scene.files.clone(),
            base: Some(scene),
            options,
        })
    }

    /// Appends one file's primitives, recording provenance.
    pub fn add_file(
        &mut self,
        name: &str,
        primitives: Vec<Arc<dyn Primitive>>,
    ) -> Result<(), SceneError> {
        if self.files.len() >= MAX_SCENE_FILES {
            return Err(SceneError::TooManyFiles(MAX_SCENE_FILES));
        }
        self.files.push(FileOrigin {
            name: name.to_string(),
            start_id: self.table.len(),
        });
        self.table.extend(primitives);
        Ok(())
    }

    /// Validates bounds and inserts every new primitive, then canonicalizes
    /// the tree. Bounds violations surface before any insertion happens.
    pub fn build(self) -> Result<Scene, SceneError> {
        let SceneBuilder {
            fixed_cube,
            base,
            table,
            files,
            options,
        } = self;

        let start = base.as_ref().map(|s| s.table.len()).unwrap_or(0);
        // Bounding box of the newly added primitives only; unbounded
        // surfaces take no part.
        let added_bbox = table[start..]
            .iter()
            .filter_map(|p| p.bbox())
            .fold(BBox::empty(), union);

        let cube = match (&base, fixed_cube) {
            (Some(scene), _) => scene.cube,
            (None, Some(cube)) => cube,
            (None, None) => derive_bounds(&added_bbox)?,
        };
        if fixed_cube.is_some() || base.is_some() {
            if !added_bbox.is_empty() && !cube.encloses(added_bbox) {
                return Err(SceneError::BoundsTooSmall {
                    bbox: added_bbox,
                    cube,
                });
            }
        }

        let mut index = match base {
            Some(scene) => scene.index,
            None => OctreeIndex::new(cube, options),
        };
        for id in start..table.len() {
            index.insert(&table, id)?;
        }
        index.optimize();
        log::info!(
            "scene: {} primitives from {} files, octree height {} ({} internal nodes)",
            table.len(),
            files.len(),
            index.root().height(),
            index.root().internal_count()
        );

        Ok(Scene {
            cube,
            index,
            table,
            files,
        })
    }
}

fn derive_bounds(bbox: &BBox) -> Result<Cube, SceneError> {
    if bbox.is_empty() {
        return Err(SceneError::NoBounds);
    }
    let min = bbox.min() - math::vec3(BOUNDS_MARGIN, BOUNDS_MARGIN, BOUNDS_MARGIN);
    let max = bbox.max() + math::vec3(BOUNDS_MARGIN, BOUNDS_MARGIN, BOUNDS_MARGIN);
    let diag = max - min;
    let size = diag.x.max(diag.y).max(diag.z);
    // Center the cube on the box along every axis.
    let mut origin = min;
    for axis in 0..3 {
        origin[axis] = (max[axis] + min[axis] - size) * 0.5;
    }
    Ok(Cube::new(origin, size))
}
