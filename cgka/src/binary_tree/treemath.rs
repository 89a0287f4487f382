use serde::{Deserialize, Serialize};
use thiserror::Error;
use tls_codec::{TlsDeserialize, TlsSerialize, TlsSize};

use crate::error::{ErrorCategory, ErrorKind};

/// Upper bound for the number of nodes in a tree.
pub(crate) const MAX_TREE_SIZE: u32 = 1 << 30;

/// Index of a node in the array representation.
pub type NodeIndex = u32;

/// Tree math errors.
#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum TreeMathError {
    /// Leaf nodes don't have children.
    #[error("Leaf nodes don't have children.")]
    LeafHasNoChildren,
    /// The root doesn't have a parent.
    #[error("The root doesn't have a parent.")]
    RootHasNoParent,
    /// The node index is outside of the tree.
    #[error("The node index is outside of the tree.")]
    NodeNotInTree,
}

impl ErrorCategory for TreeMathError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Internal
    }
}

/// LeafNodeIndex references a leaf node in a tree.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    TlsDeserialize,
    TlsSerialize,
    TlsSize,
)]
pub struct LeafNodeIndex(u32);

impl LeafNodeIndex {
    /// Create a new `LeafNodeIndex` from a `u32`.
    pub fn new(index: u32) -> Self {
        LeafNodeIndex(index)
    }

    /// Return the inner value as `u32`.
    pub fn u32(&self) -> u32 {
        self.0
    }

    /// Return the inner value as `usize`.
    pub fn usize(&self) -> usize {
        self.u32() as usize
    }

    /// Return the index of the leaf in the array representation.
    pub fn to_node_index(self) -> NodeIndex {
        self.0 * 2
    }

    /// Only use when the node index represents a leaf node.
    pub(crate) fn from_node_index(node_index: NodeIndex) -> Self {
        debug_assert!(node_index % 2 == 0);
        LeafNodeIndex(node_index / 2)
    }
}

impl std::fmt::Display for LeafNodeIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The number of nodes of a complete tree, always `2^(d+1) - 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TreeSize(u32);

impl TreeSize {
    /// The size of a complete tree with at least `leaf_count` leaves.
    pub fn from_leaf_count(leaf_count: u32) -> Self {
        let leaves = leaf_count.max(1).next_power_of_two();
        TreeSize(2 * leaves - 1)
    }

    /// Return the number of leaf nodes in the tree.
    pub fn leaf_count(&self) -> u32 {
        (self.0 / 2) + 1
    }

    /// Return the number of nodes in the tree.
    pub fn u32(&self) -> u32 {
        self.0
    }

    /// Return the number of nodes in the tree.
    pub fn usize(&self) -> usize {
        self.0 as usize
    }

    /// Whether `index` lies within this tree.
    pub fn contains(&self, index: NodeIndex) -> bool {
        index < self.0
    }

    /// Whether the leaf lies within this tree.
    pub fn contains_leaf(&self, leaf_index: LeafNodeIndex) -> bool {
        leaf_index.u32() < self.leaf_count()
    }
}

fn log2(x: u32) -> usize {
    if x == 0 {
        return 0;
    }
    let mut k = 0;
    while (x >> k) > 0 {
        k += 1
    }
    k - 1
}

/// The level of a node, leaves are at level 0.
pub fn level(index: NodeIndex) -> usize {
    index.trailing_ones() as usize
}

/// Whether the node is a leaf.
pub fn is_leaf(index: NodeIndex) -> bool {
    index % 2 == 0
}

/// The root of a tree of the given size.
pub fn root(size: TreeSize) -> NodeIndex {
    (1 << log2(size.u32())) - 1
}

/// The left child of a parent node.
pub fn left(index: NodeIndex) -> Result<NodeIndex, TreeMathError> {
    let k = level(index);
    if k == 0 {
        return Err(TreeMathError::LeafHasNoChildren);
    }
    Ok(index ^ (0x01 << (k - 1)))
}

/// The right child of a parent node.
pub fn right(index: NodeIndex) -> Result<NodeIndex, TreeMathError> {
    let k = level(index);
    if k == 0 {
        return Err(TreeMathError::LeafHasNoChildren);
    }
    Ok(index ^ (0x03 << (k - 1)))
}

/// The parent of a node. Fails for the root and for nodes outside the tree.
pub fn parent(index: NodeIndex, size: TreeSize) -> Result<NodeIndex, TreeMathError> {
    if !size.contains(index) {
        return Err(TreeMathError::NodeNotInTree);
    }
    if index == root(size) {
        return Err(TreeMathError::RootHasNoParent);
    }
    let k = level(index);
    let b = (index >> (k + 1)) & 0x01;
    Ok((index | (1 << k)) ^ (b << (k + 1)))
}

/// The other child of the node's parent.
pub fn sibling(index: NodeIndex, size: TreeSize) -> Result<NodeIndex, TreeMathError> {
    let p = parent(index, size)?;
    if index < p {
        right(p)
    } else {
        left(p)
    }
}

/// Direct path from a node to the root, ordered from the node's parent up to
/// and including the root. Does not include the node itself.
pub fn direct_path(index: NodeIndex, size: TreeSize) -> Result<Vec<NodeIndex>, TreeMathError> {
    if !size.contains(index) {
        return Err(TreeMathError::NodeNotInTree);
    }
    let r = root(size);
    let mut d = vec![];
    let mut x = index;
    while x != r {
        x = parent(x, size)?;
        d.push(x);
    }
    Ok(d)
}

/// Copath of a node: the sibling of the node and of every node on its direct
/// path below the root.
pub fn copath(index: NodeIndex, size: TreeSize) -> Result<Vec<NodeIndex>, TreeMathError> {
    let mut path = vec![index];
    let mut dpath = direct_path(index, size)?;
    // Remove the root
    dpath.pop();
    path.append(&mut dpath);
    path.into_iter().map(|node| sibling(node, size)).collect()
}

/// Common ancestor of two leaf nodes, aka the node where their direct paths
/// intersect. For `x == y` this is the leaf itself.
pub fn lowest_common_ancestor(x: LeafNodeIndex, y: LeafNodeIndex) -> NodeIndex {
    let (mut xn, mut yn) = (x.u32(), y.u32());
    let mut k = 0;
    while xn != yn {
        xn >>= 1;
        yn >>= 1;
        k += 1;
    }
    if k == 0 {
        return x.to_node_index();
    }
    (xn << (k + 1)) + (1 << k) - 1
}

/// Whether `descendant` is in the subtree rooted at `ancestor` (or is
/// `ancestor` itself).
pub fn in_subtree(ancestor: NodeIndex, descendant: NodeIndex) -> bool {
    let k = level(ancestor);
    level(descendant) <= k && (descendant >> (k + 1)) == (ancestor >> (k + 1))
}

/// The leaves below a node, in order.
pub fn leaves_below(index: NodeIndex) -> impl Iterator<Item = LeafNodeIndex> {
    let k = level(index) as u32;
    let first = (index >> k) << k;
    let last = first + (1 << (k + 1)) - 2;
    (first..=last)
        .step_by(2)
        .map(LeafNodeIndex::from_node_index)
}
