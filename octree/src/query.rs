use std::collections::{HashSet, VecDeque};

use geometry::{Cube, Ray};

use crate::{ObjectId, OctreeNode};

/// Lazy candidate sequence for one ray. Holds its own traversal stack and
/// visited set, so any number of `Candidates` can walk a frozen tree
/// concurrently. Restart a query by constructing a new one.
pub struct Candidates<'a> {
    stack: Vec<(&'a OctreeNode, Cube)>,
    pending: VecDeque<ObjectId>,
    seen: HashSet<ObjectId>,
    ray: Ray,
    /// Octant visit order mask: bit set where the ray heads -X/-Y/-Z, so
    /// `i ^ order` for i in 0..8 enumerates children front to back.
    order: usize,
}

impl<'a> Candidates<'a> {
    pub(crate) fn new(root: &'a OctreeNode, cube: Cube, ray: Ray) -> Self {
        let mut order = 0;
        for axis in 0..3 {
            if ray.dir[axis] < 0.0 {
                order |= 1 << axis;
            }
        }
        Candidates {
            stack: vec![(root, cube)],
            pending: VecDeque::new(),
            seen: HashSet::new(),
            ray,
            order,
        }
    }
}

impl<'a> Iterator for Candidates<'a> {
    type Item = ObjectId;

    fn next(&mut self) -> Option<ObjectId> {
        loop {
            if let Some(id) = self.pending.pop_front() {
                return Some(id);
            }
            let (node, cube) = self.stack.pop()?;
            match node {
                OctreeNode::Empty => {}
                OctreeNode::Leaf(set) => {
                    if cube.intersect(&self.ray) {
                        for &id in set {
                            if self.seen.insert(id) {
                                self.pending.push_back(id);
                            }
                        }
                    }
                }
                OctreeNode::Internal(kids) => {
                    if cube.intersect(&self.ray) {
                        // Push far octants first so near ones pop first.
                        for i in (0..8).rev() {
                            let octant = i ^ self.order;
                            self.stack.push((&kids[octant], cube.octant(octant)));
                        }
                    }
                }
            }
        }
    }
}
