//! # Ratchet tree
//!
//! This module contains the public half of the ratchet tree ([`RatchetTree`]),
//! its node types, the tree and parent hashes and TreeKEM.
//!
//! The tree is kept in array representation as a complete binary tree: its
//! length is always `2^(d+1) - 1` and blank nodes are `None`. Whenever a leaf
//! is added to a full tree, the tree is doubled. Whenever a removal leaves the
//! right half of the tree without members, the tree is cut in half.
//!
//! On the wire (see [`RatchetTree::export_nodes()`]) trailing blank nodes are
//! omitted, so the last node of an exported tree is never blank.

use std::collections::HashSet;

use cgka_traits::crypto::CgkaCrypto;
use serde::{Deserialize, Serialize};

use crate::{
    binary_tree::{
        treemath::{direct_path, is_leaf, left, right, root, MAX_TREE_SIZE},
        LeafNodeIndex, NodeIndex, TreeSize,
    },
    ciphersuite::Ciphersuite,
    group::GroupId,
};

use self::{
    errors::{LeafNodeValidationError, RatchetTreeError, TreeSyncError},
    node::{
        leaf_node::{LeafNodeSource, TreePosition},
        LeafNode, Node, ParentNode,
    },
};

pub mod errors;
mod hashes;
pub mod node;
pub(crate) mod private_tree;
pub mod treekem;

#[cfg(test)]
mod tests;

/// The public ratchet tree of a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatchetTree {
    nodes: Vec<Option<Node>>,
}

impl RatchetTree {
    /// A tree holding only the given leaf.
    pub fn new(leaf_node: LeafNode) -> Self {
        Self {
            nodes: vec![Some(Node::leaf_node(leaf_node))],
        }
    }

    /// Import a tree from a list of nodes as found in the ratchet tree
    /// extension. The list is padded to a complete tree.
    ///
    /// This only checks the structure of the tree. Use [`Self::validate()`]
    /// to check signatures, keys and parent hashes.
    pub fn from_nodes(nodes: Vec<Option<Node>>) -> Result<Self, RatchetTreeError> {
        match nodes.last() {
            Some(Some(_)) => (),
            _ => {
                log::debug!("The node list is empty or ends with a blank node.");
                return Err(RatchetTreeError::MalformedTree);
            }
        }
        if nodes.len() as u64 >= MAX_TREE_SIZE as u64 {
            return Err(RatchetTreeError::MalformedTree);
        }

        let size = TreeSize::from_leaf_count(nodes.len() as u32 / 2 + 1);
        let mut nodes = nodes;
        nodes.resize(size.usize(), None);
        let tree = Self { nodes };

        for (index, node) in tree.nodes.iter().enumerate() {
            let index = index as NodeIndex;
            match node {
                Some(Node::LeafNode(_)) if !is_leaf(index) => {
                    log::debug!("Found a leaf node at parent position {}.", index);
                    return Err(RatchetTreeError::MalformedTree);
                }
                Some(Node::ParentNode(_)) if is_leaf(index) => {
                    log::debug!("Found a parent node at leaf position {}.", index);
                    return Err(RatchetTreeError::MalformedTree);
                }
                Some(Node::ParentNode(parent)) => {
                    let leaves = tree.leaves_below(index);
                    for unmerged in parent.unmerged_leaves() {
                        if !leaves.contains(unmerged) || tree.leaf(*unmerged).is_none() {
                            log::debug!(
                                "Unmerged leaf {} of parent {} is blank or not below it.",
                                unmerged,
                                index
                            );
                            return Err(RatchetTreeError::MalformedTree);
                        }
                    }
                }
                _ => (),
            }
        }

        if tree.leaves().next().is_none() {
            return Err(RatchetTreeError::MalformedTree);
        }

        Ok(tree)
    }

    /// The nodes of the tree without trailing blank nodes.
    pub fn export_nodes(&self) -> Vec<Option<Node>> {
        let end = self
            .nodes
            .iter()
            .rposition(|node| node.is_some())
            .map(|position| position + 1)
            .unwrap_or(0);
        self.nodes[..end].to_vec()
    }

    /// The size of the complete tree.
    pub fn size(&self) -> TreeSize {
        TreeSize::from_leaf_count((self.nodes.len() as u32 + 1) / 2)
    }

    /// The number of leaves of the complete tree, blank leaves included.
    pub fn leaf_count(&self) -> u32 {
        self.size().leaf_count()
    }

    /// The index of the root node.
    pub fn root(&self) -> NodeIndex {
        root(self.size())
    }

    /// The node at `node_index`, `None` if the node is blank or outside of the
    /// tree.
    pub fn node(&self, node_index: NodeIndex) -> Option<&Node> {
        self.nodes.get(node_index as usize).and_then(|node| node.as_ref())
    }

    /// The leaf node at `leaf_index`, `None` if it is blank or outside of the
    /// tree.
    pub fn leaf(&self, leaf_index: LeafNodeIndex) -> Option<&LeafNode> {
        self.node(leaf_index.to_node_index())
            .and_then(|node| node.as_leaf_node())
    }

    /// The parent node at `node_index`, `None` if it is blank or outside of
    /// the tree.
    pub fn parent(&self, node_index: NodeIndex) -> Option<&ParentNode> {
        self.node(node_index).and_then(|node| node.as_parent_node())
    }

    pub(crate) fn parent_mut(&mut self, node_index: NodeIndex) -> Option<&mut ParentNode> {
        self.nodes
            .get_mut(node_index as usize)
            .and_then(|node| node.as_mut())
            .and_then(|node| node.as_parent_node_mut())
    }

    /// All non-blank leaves with their index.
    pub fn leaves(&self) -> impl Iterator<Item = (LeafNodeIndex, &LeafNode)> {
        self.nodes
            .iter()
            .enumerate()
            .step_by(2)
            .filter_map(|(index, node)| {
                node.as_ref()
                    .and_then(|node| node.as_leaf_node())
                    .map(|leaf| (LeafNodeIndex::from_node_index(index as NodeIndex), leaf))
            })
    }

    /// All non-blank parents with their index.
    pub fn parents(&self) -> impl Iterator<Item = (NodeIndex, &ParentNode)> {
        self.nodes
            .iter()
            .enumerate()
            .skip(1)
            .step_by(2)
            .filter_map(|(index, node)| {
                node.as_ref()
                    .and_then(|node| node.as_parent_node())
                    .map(|parent| (index as NodeIndex, parent))
            })
    }

    /// The direct path of a leaf, from its parent up to the root.
    pub fn direct_path(&self, leaf_index: LeafNodeIndex) -> Result<Vec<NodeIndex>, TreeSyncError> {
        Ok(direct_path(leaf_index.to_node_index(), self.size())?)
    }

    /// The index of the leaf whose leaf node carries the given signature key.
    pub fn leaf_index_by_signature_key(&self, signature_key: &[u8]) -> Option<LeafNodeIndex> {
        self.leaves()
            .find(|(_, leaf)| leaf.signature_key().as_slice() == signature_key)
            .map(|(index, _)| index)
    }

    /// The leftmost blank leaf, if there is one.
    pub fn free_leaf_index(&self) -> Option<LeafNodeIndex> {
        (0..self.leaf_count())
            .map(LeafNodeIndex::new)
            .find(|&leaf_index| self.leaf(leaf_index).is_none())
    }

    /// The resolution of a node: the node itself if it is not blank, together
    /// with its unmerged leaves; otherwise the resolutions of its children.
    /// Leaves in `exclusion_list` are left out.
    pub fn resolution(
        &self,
        node_index: NodeIndex,
        exclusion_list: &[LeafNodeIndex],
    ) -> Vec<NodeIndex> {
        let excluded = |index: NodeIndex| {
            is_leaf(index) && exclusion_list.contains(&LeafNodeIndex::from_node_index(index))
        };
        match self.node(node_index) {
            Some(Node::LeafNode(_)) if excluded(node_index) => vec![],
            Some(Node::LeafNode(_)) => vec![node_index],
            Some(Node::ParentNode(parent)) => {
                let mut resolution = vec![node_index];
                resolution.extend(
                    parent
                        .unmerged_leaves()
                        .iter()
                        .map(|leaf| leaf.to_node_index())
                        .filter(|&index| !excluded(index)),
                );
                resolution
            }
            None if is_leaf(node_index) => vec![],
            None => match (left(node_index), right(node_index)) {
                (Ok(left), Ok(right)) => {
                    let mut resolution = self.resolution(left, exclusion_list);
                    resolution.append(&mut self.resolution(right, exclusion_list));
                    resolution
                }
                _ => vec![],
            },
        }
    }

    /// Add a leaf at the leftmost blank leaf, doubling the tree if there is
    /// none. The new leaf becomes an unmerged leaf of every non-blank parent on
    /// its direct path.
    pub fn add_leaf(&mut self, leaf_node: LeafNode) -> Result<LeafNodeIndex, TreeSyncError> {
        let leaf_index = match self.free_leaf_index() {
            Some(leaf_index) => leaf_index,
            None => {
                let leaf_index = LeafNodeIndex::new(self.leaf_count());
                self.extend()?;
                leaf_index
            }
        };
        self.nodes[leaf_index.to_node_index() as usize] = Some(Node::leaf_node(leaf_node));

        for node_index in self.direct_path(leaf_index)? {
            if let Some(parent) = self.parent_mut(node_index) {
                parent.add_unmerged_leaf(leaf_index);
            }
        }
        log::trace!("Added leaf {} to the tree.", leaf_index);
        Ok(leaf_index)
    }

    /// Blank a leaf and its direct path, then shrink the tree as far as
    /// possible.
    pub fn remove_leaf(&mut self, leaf_index: LeafNodeIndex) -> Result<(), TreeSyncError> {
        if self.leaf(leaf_index).is_none() {
            return Err(TreeSyncError::LeafNotInTree);
        }
        self.nodes[leaf_index.to_node_index() as usize] = None;
        self.blank_direct_path(leaf_index)?;
        self.trim();
        log::trace!("Removed leaf {} from the tree.", leaf_index);
        Ok(())
    }

    /// Replace a leaf and blank its direct path.
    pub fn update_leaf(
        &mut self,
        leaf_index: LeafNodeIndex,
        leaf_node: LeafNode,
    ) -> Result<(), TreeSyncError> {
        if self.leaf(leaf_index).is_none() {
            return Err(TreeSyncError::LeafNotInTree);
        }
        self.blank_direct_path(leaf_index)?;
        self.nodes[leaf_index.to_node_index() as usize] = Some(Node::leaf_node(leaf_node));
        Ok(())
    }

    /// Set a leaf without touching the rest of the tree.
    pub(crate) fn set_leaf(&mut self, leaf_index: LeafNodeIndex, leaf_node: LeafNode) {
        if let Some(node) = self.nodes.get_mut(leaf_index.to_node_index() as usize) {
            *node = Some(Node::leaf_node(leaf_node));
        }
    }

    /// Set the parents of a direct path. `path` and `parents` are ordered
    /// from the leaf upwards.
    pub(crate) fn set_path(
        &mut self,
        path: &[NodeIndex],
        parents: impl IntoIterator<Item = ParentNode>,
    ) -> Result<(), TreeSyncError> {
        for (&node_index, parent) in path.iter().zip(parents) {
            let node = self
                .nodes
                .get_mut(node_index as usize)
                .ok_or(TreeSyncError::LeafNotInTree)?;
            *node = Some(Node::parent_node(parent));
        }
        Ok(())
    }

    fn blank_direct_path(&mut self, leaf_index: LeafNodeIndex) -> Result<(), TreeSyncError> {
        for node_index in self.direct_path(leaf_index)? {
            self.nodes[node_index as usize] = None;
        }
        Ok(())
    }

    fn extend(&mut self) -> Result<(), TreeSyncError> {
        let new_size = 2 * self.nodes.len() + 1;
        if new_size as u64 > MAX_TREE_SIZE as u64 {
            return Err(TreeSyncError::TreeFull);
        }
        self.nodes.resize(new_size, None);
        Ok(())
    }

    fn trim(&mut self) {
        while self.leaf_count() > 1 {
            let half = self.nodes.len() / 2;
            if self.nodes[half + 1..].iter().any(|node| node.is_some()) {
                break;
            }
            self.nodes.truncate(half);
        }
    }

    fn leaves_below(&self, node_index: NodeIndex) -> Vec<LeafNodeIndex> {
        crate::binary_tree::treemath::leaves_below(node_index)
            .filter(|leaf| self.size().contains_leaf(*leaf))
            .collect()
    }

    /// Validate a tree received from another party:
    /// - every leaf node is valid on its own and its signature verifies
    /// - no two leaves share a signature key, no two nodes an encryption key
    /// - leaves created by a commit carry the source `Commit`, leaves that
    ///   never updated `KeyPackage` or `Update`
    /// - every non-blank parent is covered by exactly one parent hash chain
    pub fn validate(
        &self,
        crypto: &impl CgkaCrypto,
        ciphersuite: Ciphersuite,
        group_id: &GroupId,
    ) -> Result<(), RatchetTreeError> {
        let mut signature_keys = HashSet::new();
        let mut encryption_keys = HashSet::new();

        for (leaf_index, leaf) in self.leaves() {
            leaf.validate_locally()?;
            let tree_position = match leaf.leaf_node_source() {
                LeafNodeSource::KeyPackage(_) => None,
                LeafNodeSource::Update | LeafNodeSource::Commit(_) => {
                    Some(TreePosition::new(group_id.clone(), leaf_index))
                }
            };
            leaf.verify(crypto, ciphersuite, tree_position)?;
            if !signature_keys.insert(leaf.signature_key().as_slice().to_vec()) {
                log::debug!("Duplicate signature key in leaf {}.", leaf_index);
                return Err(RatchetTreeError::DuplicateKey);
            }
            if !leaf.capabilities().ciphersuites().contains(&ciphersuite) {
                return Err(LeafNodeValidationError::CiphersuiteNotInCapabilities.into());
            }
        }

        for node in self.nodes.iter().flatten() {
            if !encryption_keys.insert(node.encryption_key().clone()) {
                log::debug!("Duplicate encryption key in the tree.");
                return Err(RatchetTreeError::DuplicateKey);
            }
        }

        if !self.verify_parent_hashes(crypto, ciphersuite)? {
            return Err(RatchetTreeError::ParentHashMismatch);
        }
        Ok(())
    }
}
