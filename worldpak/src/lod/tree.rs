//! Level-of-detail tree model.
//!
//! The viewer maintains one tree per loaded region. Nodes carry a world
//! position, two distance thresholds and the content refs rendered when
//! the node is selected as a leaf. Nodes live in an arena indexed by
//! [`LodNodeId`]; the tree only grows, selection never mutates it.

use std::fmt;

use glam::Vec3;
use thiserror::Error;

use crate::cache::CacheKind;
use crate::hash::ContentHash;

/// Arena index of a node within one tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LodNodeId(usize);

impl fmt::Display for LodNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Error)]
pub enum LodTreeError {
    #[error("unknown parent node {parent}")]
    UnknownParent { parent: LodNodeId },
}

/// One streamable asset a leaf contributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AssetRef {
    pub kind: CacheKind,
    pub hash: ContentHash,
}

impl AssetRef {
    pub fn mesh(hash: ContentHash) -> Self {
        Self {
            kind: CacheKind::Mesh,
            hash,
        }
    }

    pub fn texture(hash: ContentHash) -> Self {
        Self {
            kind: CacheKind::Texture,
            hash,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LodNode {
    id: LodNodeId,
    parent: Option<LodNodeId>,
    children: Vec<LodNodeId>,
    position: Vec3,
    own_lod_distance: f32,
    child_lod_distance: f32,
    content: Vec<AssetRef>,
}

impl LodNode {
    pub fn id(&self) -> LodNodeId {
        self.id
    }

    pub fn parent(&self) -> Option<LodNodeId> {
        self.parent
    }

    /// Children in insertion order; selection preserves this order.
    pub fn children(&self) -> &[LodNodeId] {
        &self.children
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Viewpoints closer than this see the node at all.
    pub fn own_lod_distance(&self) -> f32 {
        self.own_lod_distance
    }

    /// Viewpoints closer than this descend into the children instead.
    pub fn child_lod_distance(&self) -> f32 {
        self.child_lod_distance
    }

    pub fn content(&self) -> &[AssetRef] {
        &self.content
    }
}

/// Arena of LOD nodes with explicit roots.
#[derive(Debug, Clone, Default)]
pub struct LodTree {
    nodes: Vec<LodNode>,
    roots: Vec<LodNodeId>,
}

impl LodTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_root(
        &mut self,
        position: Vec3,
        own_lod_distance: f32,
        child_lod_distance: f32,
        content: Vec<AssetRef>,
    ) -> LodNodeId {
        let id = LodNodeId(self.nodes.len());
        self.nodes.push(LodNode {
            id,
            parent: None,
            children: Vec::new(),
            position,
            own_lod_distance,
            child_lod_distance,
            content,
        });
        self.roots.push(id);
        id
    }

    pub fn add_child(
        &mut self,
        parent: LodNodeId,
        position: Vec3,
        own_lod_distance: f32,
        child_lod_distance: f32,
        content: Vec<AssetRef>,
    ) -> Result<LodNodeId, LodTreeError> {
        if parent.0 >= self.nodes.len() {
            return Err(LodTreeError::UnknownParent { parent });
        }
        let id = LodNodeId(self.nodes.len());
        self.nodes.push(LodNode {
            id,
            parent: Some(parent),
            children: Vec::new(),
            position,
            own_lod_distance,
            child_lod_distance,
            content,
        });
        self.nodes[parent.0].children.push(id);
        Ok(id)
    }

    pub fn node(&self, id: LodNodeId) -> Option<&LodNode> {
        self.nodes.get(id.0)
    }

    pub fn roots(&self) -> &[LodNodeId] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// True when `ancestor` appears on `node`'s parent chain.
    pub fn is_ancestor(&self, ancestor: LodNodeId, node: LodNodeId) -> bool {
        let mut current = self.node(node).and_then(LodNode::parent);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.node(id).and_then(LodNode::parent);
        }
        false
    }
}
