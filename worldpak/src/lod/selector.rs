//! Leaf selection against a viewpoint.
//!
//! Selection is stateless: one depth-first pass over the tree per call,
//! no mutation. For each node the viewpoint distance decides one of
//! three outcomes:
//!
//! * `distance >= own_lod_distance`: the node is out of range, the whole
//!   subtree contributes nothing,
//! * `distance < child_lod_distance` and the node has children: descend,
//!   the node itself is superseded by its children,
//! * otherwise: the node is a leaf and contributes its content.
//!
//! Both comparisons are strict, so a viewpoint exactly on a threshold
//! falls on the far side. The returned set is an antichain: descending
//! replaces the parent, so no selected node is an ancestor of another.

use glam::Vec3;

use super::tree::{AssetRef, LodNodeId, LodTree};

/// Leaves chosen by one selection pass, in traversal order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeafSet {
    leaves: Vec<LodNodeId>,
}

impl LeafSet {
    pub fn ids(&self) -> &[LodNodeId] {
        &self.leaves
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    pub fn contains(&self, id: LodNodeId) -> bool {
        self.leaves.contains(&id)
    }

    /// Content refs of every selected leaf, in traversal order. These are
    /// the hashes the render loop feeds into the caches.
    pub fn content<'a>(&'a self, tree: &'a LodTree) -> impl Iterator<Item = AssetRef> + 'a {
        self.leaves
            .iter()
            .filter_map(move |&id| tree.node(id))
            .flat_map(|node| node.content().iter().copied())
    }
}

/// Select the visible leaves of `tree` for a viewpoint.
pub fn select_leaves(tree: &LodTree, viewpoint: Vec3) -> LeafSet {
    let mut leaves = Vec::new();
    for &root in tree.roots() {
        visit(tree, root, viewpoint, &mut leaves);
    }
    LeafSet { leaves }
}

fn visit(tree: &LodTree, id: LodNodeId, viewpoint: Vec3, leaves: &mut Vec<LodNodeId>) {
    let node = match tree.node(id) {
        Some(node) => node,
        None => return,
    };
    let distance = viewpoint.distance(node.position());
    if distance >= node.own_lod_distance() {
        return;
    }
    if distance < node.child_lod_distance() && !node.children().is_empty() {
        for &child in node.children() {
            visit(tree, child, viewpoint, leaves);
        }
    } else {
        leaves.push(id);
    }
}
