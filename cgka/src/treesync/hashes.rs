//! Tree hashes and parent hashes.
//!
//! ```c
//! struct {
//!     uint32 leaf_index;
//!     optional<LeafNode> leaf_node;
//! } LeafNodeHashInput;
//!
//! struct {
//!     optional<ParentNode> parent_node;
//!     opaque left_hash<V>;
//!     opaque right_hash<V>;
//! } ParentNodeHashInput;
//!
//! struct {
//!   NodeType node_type;
//!   select (TreeHashInput.node_type) {
//!     case leaf:   LeafNodeHashInput leaf_node;
//!     case parent: ParentNodeHashInput parent_node;
//!   };
//! } TreeHashInput;
//!
//! struct {
//!     HPKEPublicKey encryption_key;
//!     opaque parent_hash<V>;
//!     opaque original_sibling_tree_hash<V>;
//! } ParentHashInput;
//! ```
//!
//! The original sibling tree hash is the tree hash of the sibling subtree with
//! the unmerged leaves of the parent blanked and removed from the unmerged
//! leaves of all parents in that subtree.

use std::collections::BTreeSet;

use cgka_traits::crypto::CgkaCrypto;
use tls_codec::{Serialize, Size, VLByteSlice};

use crate::{
    binary_tree::{
        treemath::{is_leaf, left, right},
        LeafNodeIndex, NodeIndex,
    },
    ciphersuite::{Ciphersuite, HpkePublicKey},
    error::LibraryError,
};

use super::{
    node::{leaf_node::LeafNode, parent_node::ParentNode, Node},
    RatchetTree,
};

const NODE_TYPE_LEAF: u8 = 1;
const NODE_TYPE_PARENT: u8 = 2;

struct LeafNodeHashInput<'a> {
    leaf_index: LeafNodeIndex,
    leaf_node: Option<&'a LeafNode>,
}

impl<'a> Size for LeafNodeHashInput<'a> {
    fn tls_serialized_len(&self) -> usize {
        1 + self.leaf_index.tls_serialized_len()
            + 1
            + self.leaf_node.map(|l| l.tls_serialized_len()).unwrap_or(0)
    }
}

impl<'a> Serialize for LeafNodeHashInput<'a> {
    fn tls_serialize<W: std::io::Write>(&self, writer: &mut W) -> Result<usize, tls_codec::Error> {
        let mut written = NODE_TYPE_LEAF.tls_serialize(writer)?;
        written += self.leaf_index.tls_serialize(writer)?;
        written += match self.leaf_node {
            Some(leaf_node) => 1u8.tls_serialize(writer)? + leaf_node.tls_serialize(writer)?,
            None => 0u8.tls_serialize(writer)?,
        };
        Ok(written)
    }
}

struct ParentNodeHashInput<'a> {
    parent_node: Option<&'a ParentNode>,
    left_hash: VLByteSlice<'a>,
    right_hash: VLByteSlice<'a>,
}

impl<'a> Size for ParentNodeHashInput<'a> {
    fn tls_serialized_len(&self) -> usize {
        1 + 1
            + self
                .parent_node
                .map(|p| p.tls_serialized_len())
                .unwrap_or(0)
            + self.left_hash.tls_serialized_len()
            + self.right_hash.tls_serialized_len()
    }
}

impl<'a> Serialize for ParentNodeHashInput<'a> {
    fn tls_serialize<W: std::io::Write>(&self, writer: &mut W) -> Result<usize, tls_codec::Error> {
        let mut written = NODE_TYPE_PARENT.tls_serialize(writer)?;
        written += match self.parent_node {
            Some(parent_node) => {
                1u8.tls_serialize(writer)? + parent_node.tls_serialize(writer)?
            }
            None => 0u8.tls_serialize(writer)?,
        };
        written += self.left_hash.tls_serialize(writer)?;
        written += self.right_hash.tls_serialize(writer)?;
        Ok(written)
    }
}

struct ParentHashInput<'a> {
    encryption_key: &'a HpkePublicKey,
    parent_hash: VLByteSlice<'a>,
    original_sibling_tree_hash: VLByteSlice<'a>,
}

impl<'a> Size for ParentHashInput<'a> {
    fn tls_serialized_len(&self) -> usize {
        self.encryption_key.tls_serialized_len()
            + self.parent_hash.tls_serialized_len()
            + self.original_sibling_tree_hash.tls_serialized_len()
    }
}

impl<'a> Serialize for ParentHashInput<'a> {
    fn tls_serialize<W: std::io::Write>(&self, writer: &mut W) -> Result<usize, tls_codec::Error> {
        Ok(self.encryption_key.tls_serialize(writer)?
            + self.parent_hash.tls_serialize(writer)?
            + self.original_sibling_tree_hash.tls_serialize(writer)?)
    }
}

fn hash_input(
    crypto: &impl CgkaCrypto,
    ciphersuite: Ciphersuite,
    input: &impl Serialize,
) -> Result<Vec<u8>, LibraryError> {
    let payload = input
        .tls_serialize_detached()
        .map_err(LibraryError::missing_bound_check)?;
    crypto
        .hash(ciphersuite.hash_algorithm(), &payload)
        .map_err(LibraryError::unexpected_crypto_error)
}

impl ParentNode {
    /// Compute the parent hash a child of this node carries, given the
    /// original tree hash of the other child.
    pub(crate) fn compute_parent_hash(
        &self,
        crypto: &impl CgkaCrypto,
        ciphersuite: Ciphersuite,
        original_sibling_tree_hash: &[u8],
    ) -> Result<Vec<u8>, LibraryError> {
        let input = ParentHashInput {
            encryption_key: self.encryption_key(),
            parent_hash: VLByteSlice(self.parent_hash()),
            original_sibling_tree_hash: VLByteSlice(original_sibling_tree_hash),
        };
        hash_input(crypto, ciphersuite, &input)
    }
}

impl RatchetTree {
    /// The tree hash of the whole tree, i.e. the hash of the root.
    pub fn tree_hash(
        &self,
        crypto: &impl CgkaCrypto,
        ciphersuite: Ciphersuite,
    ) -> Result<Vec<u8>, LibraryError> {
        self.node_hash(crypto, ciphersuite, self.root(), &BTreeSet::new())
    }

    /// The tree hash of the subtree rooted at `node_index`, computed as if the
    /// leaves in `excluded` were blank and not listed as unmerged anywhere.
    pub(crate) fn node_hash(
        &self,
        crypto: &impl CgkaCrypto,
        ciphersuite: Ciphersuite,
        node_index: NodeIndex,
        excluded: &BTreeSet<LeafNodeIndex>,
    ) -> Result<Vec<u8>, LibraryError> {
        if is_leaf(node_index) {
            let leaf_index = LeafNodeIndex::from_node_index(node_index);
            let leaf_node = if excluded.contains(&leaf_index) {
                None
            } else {
                self.leaf(leaf_index)
            };
            let input = LeafNodeHashInput {
                leaf_index,
                leaf_node,
            };
            return hash_input(crypto, ciphersuite, &input);
        }

        let left_index =
            left(node_index).map_err(|_| LibraryError::custom("Parent has no left child"))?;
        let right_index =
            right(node_index).map_err(|_| LibraryError::custom("Parent has no right child"))?;
        let left_hash = self.node_hash(crypto, ciphersuite, left_index, excluded)?;
        let right_hash = self.node_hash(crypto, ciphersuite, right_index, excluded)?;

        let filtered;
        let parent_node = match self.node(node_index) {
            Some(Node::ParentNode(parent)) if excluded.is_empty() => Some(parent.as_ref()),
            Some(Node::ParentNode(parent)) => {
                filtered = parent.without_unmerged_leaves(excluded);
                Some(&filtered)
            }
            Some(Node::LeafNode(_)) => {
                return Err(LibraryError::custom("Found a leaf node at a parent position"))
            }
            None => None,
        };
        let input = ParentNodeHashInput {
            parent_node,
            left_hash: VLByteSlice(&left_hash),
            right_hash: VLByteSlice(&right_hash),
        };
        hash_input(crypto, ciphersuite, &input)
    }

    /// The original tree hash of the child `child_index` of the parent at
    /// `parent_index`.
    pub(crate) fn original_child_hash(
        &self,
        crypto: &impl CgkaCrypto,
        ciphersuite: Ciphersuite,
        parent: &ParentNode,
        child_index: NodeIndex,
    ) -> Result<Vec<u8>, LibraryError> {
        let excluded = parent.unmerged_leaves().iter().copied().collect();
        self.node_hash(crypto, ciphersuite, child_index, &excluded)
    }

    /// Check that every non-blank parent is covered by exactly one parent
    /// hash chain: exactly one node in the resolutions of its children
    /// (without the parent's unmerged leaves) carries the parent hash of the
    /// parent computed with the other child as sibling.
    pub fn verify_parent_hashes(
        &self,
        crypto: &impl CgkaCrypto,
        ciphersuite: Ciphersuite,
    ) -> Result<bool, LibraryError> {
        for (parent_index, parent) in self.parents() {
            let left_index =
                left(parent_index).map_err(|_| LibraryError::custom("Parent has no left child"))?;
            let right_index =
                right(parent_index).map_err(|_| LibraryError::custom("Parent has no right child"))?;

            let left_hash = self.original_child_hash(crypto, ciphersuite, parent, left_index)?;
            let right_hash = self.original_child_hash(crypto, ciphersuite, parent, right_index)?;
            // The hash a node below the left child carries has the right
            // child as sibling and vice versa.
            let expected_left = parent.compute_parent_hash(crypto, ciphersuite, &right_hash)?;
            let expected_right = parent.compute_parent_hash(crypto, ciphersuite, &left_hash)?;

            let covering = |child_index: NodeIndex, expected: &[u8]| -> usize {
                self.resolution(child_index, parent.unmerged_leaves())
                    .into_iter()
                    .filter(|&index| self.stored_parent_hash(index) == Some(expected))
                    .count()
            };
            let chains =
                covering(left_index, &expected_left) + covering(right_index, &expected_right);
            if chains != 1 {
                log::debug!(
                    "Parent node {} is covered by {} parent hash chains.",
                    parent_index,
                    chains
                );
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// The parent hash stored in the node at `node_index`: the parent hash
    /// of a parent node or of a leaf node created by a commit.
    fn stored_parent_hash(&self, node_index: NodeIndex) -> Option<&[u8]> {
        match self.node(node_index)? {
            Node::LeafNode(leaf) => leaf.parent_hash(),
            Node::ParentNode(parent) => Some(parent.parent_hash()),
        }
    }

    /// Set the parent hashes along the direct path `path` (ordered from the
    /// leaf's parent to the root), which must consist of freshly set parent
    /// nodes. Returns the parent hash the leaf has to carry.
    pub(crate) fn set_path_parent_hashes(
        &mut self,
        crypto: &impl CgkaCrypto,
        ciphersuite: Ciphersuite,
        leaf_index: LeafNodeIndex,
        path: &[NodeIndex],
    ) -> Result<Vec<u8>, LibraryError> {
        let mut parent_hash: Vec<u8> = vec![];
        // Walk from the root down to the leaf.
        for (position, &node_index) in path.iter().enumerate().rev() {
            let child_index = match position {
                0 => leaf_index.to_node_index(),
                _ => path[position - 1],
            };
            let sibling_index = if child_index < node_index {
                right(node_index)
            } else {
                left(node_index)
            }
            .map_err(|_| LibraryError::custom("Parent has no children"))?;

            let parent = self
                .parent_mut(node_index)
                .ok_or_else(|| LibraryError::custom("Path node is blank"))?;
            parent.set_parent_hash(parent_hash);
            let parent = parent.clone();

            let sibling_hash =
                self.original_child_hash(crypto, ciphersuite, &parent, sibling_index)?;
            parent_hash = parent.compute_parent_hash(crypto, ciphersuite, &sibling_hash)?;
        }
        Ok(parent_hash)
    }
}
