//! Level-of-detail trees and leaf selection.
//!
//! The render loop owns the tree and calls [`select_leaves`] once per
//! frame with the current viewpoint; the resulting [`LeafSet`] names the
//! nodes to draw and the content hashes to stream.

pub mod selector;
pub mod tree;

pub use selector::{select_leaves, LeafSet};
pub use tree::{AssetRef, LodNode, LodNodeId, LodTree, LodTreeError};
