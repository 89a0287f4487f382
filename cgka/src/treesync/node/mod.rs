//! This module contains types and methods around the [`Node`] enum. The
//! variants of the enum are [`LeafNode`] and [`ParentNode`], both of which are
//! defined in the respective [`leaf_node`] and [`parent_node`] submodules.
use serde::{Deserialize, Serialize};
use tls_codec::{TlsDeserialize, TlsSerialize, TlsSize};

use crate::ciphersuite::HpkePublicKey;

pub mod leaf_node;
pub mod parent_node;

#[cfg(test)]
mod tests;

pub use leaf_node::LeafNode;
pub use parent_node::ParentNode;

/// Container enum for leaf and parent nodes.
///
/// ```c
/// struct {
///     NodeType node_type;
///     select (Node.node_type) {
///         case leaf:   LeafNode leaf_node;
///         case parent: ParentNode parent_node;
///     };
/// } Node;
/// ```
#[derive(
    Debug, PartialEq, Eq, Clone, Serialize, Deserialize, TlsSize, TlsSerialize, TlsDeserialize,
)]
#[repr(u8)]
pub enum Node {
    /// A leaf node.
    #[tls_codec(discriminant = 1)]
    LeafNode(Box<LeafNode>),
    /// A parent node.
    ParentNode(Box<ParentNode>),
}

impl Node {
    pub(crate) fn leaf_node(leaf: LeafNode) -> Self {
        Self::LeafNode(Box::new(leaf))
    }

    pub(crate) fn parent_node(parent: ParentNode) -> Self {
        Self::ParentNode(Box::new(parent))
    }

    /// Returns the public HPKE key of either node type.
    pub fn encryption_key(&self) -> &HpkePublicKey {
        match self {
            Node::LeafNode(ln) => ln.encryption_key(),
            Node::ParentNode(pn) => pn.encryption_key(),
        }
    }

    pub(crate) fn as_leaf_node(&self) -> Option<&LeafNode> {
        match self {
            Node::LeafNode(ln) => Some(ln),
            Node::ParentNode(_) => None,
        }
    }

    pub(crate) fn as_parent_node(&self) -> Option<&ParentNode> {
        match self {
            Node::LeafNode(_) => None,
            Node::ParentNode(pn) => Some(pn),
        }
    }

    pub(crate) fn as_parent_node_mut(&mut self) -> Option<&mut ParentNode> {
        match self {
            Node::LeafNode(_) => None,
            Node::ParentNode(pn) => Some(pn),
        }
    }
}
