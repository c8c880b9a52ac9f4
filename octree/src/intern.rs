use std::collections::HashMap;
use std::sync::Arc;

use crate::{ObjectId, OctreeNode};

/// Identity of one canonicalized child. Internal children are compared by
/// handle address: once canonical, structurally equal subtrees share the same
/// `Arc`, so pointer identity is structural identity.
#[derive(Hash, PartialEq, Eq)]
enum ChildKey {
    Empty,
    Leaf(Vec<ObjectId>),
    Shared(usize),
}

fn child_key(node: &OctreeNode) -> ChildKey {
    match node {
        OctreeNode::Empty => ChildKey::Empty,
        OctreeNode::Leaf(set) => ChildKey::Leaf(set.clone()),
        OctreeNode::Internal(kids) => ChildKey::Shared(Arc::as_ptr(kids) as usize),
    }
}

/// Rebuilds the tree bottom-up, interning every `Internal` node so that
/// structurally identical subtrees collapse into one shared handle.
pub(crate) fn combine(root: OctreeNode) -> OctreeNode {
    let mut pool: HashMap<[ChildKey; 8], Arc<[OctreeNode; 8]>> = HashMap::new();
    canonical(root, &mut pool)
}

fn canonical(
    node: OctreeNode,
    pool: &mut HashMap<[ChildKey; 8], Arc<[OctreeNode; 8]>>,
) -> OctreeNode {
    match node {
        OctreeNode::Internal(kids) => {
            let mut kids = Arc::try_unwrap(kids).unwrap_or_else(|shared| (*shared).clone());
            for slot in kids.iter_mut() {
                let child = std::mem::replace(slot, OctreeNode::Empty);
                *slot = canonical(child, pool);
            }
            let key = [
                child_key(&kids[0]),
                child_key(&kids[1]),
                child_key(&kids[2]),
                child_key(&kids[3]),
                child_key(&kids[4]),
                child_key(&kids[5]),
                child_key(&kids[6]),
                child_key(&kids[7]),
            ];
            let canon = pool.entry(key).or_insert_with(|| Arc::new(kids));
            OctreeNode::Internal(canon.clone())
        }
        other => other,
    }
}
