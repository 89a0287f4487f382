use serde::{Deserialize, Serialize};
use tls_codec::{TlsDeserialize, TlsSerialize, TlsSize};

use crate::treesync::node::Node;

/// # Ratchet Tree Extension.
///
/// The ratchet tree extension contains a list of (optional) [`Node`]s that
/// represent the public state of the tree in an MLS group.
///
/// ```c
/// optional<Node> ratchet_tree<V>;
/// ```
#[derive(
    PartialEq, Eq, Clone, Debug, Serialize, Deserialize, TlsSerialize, TlsDeserialize, TlsSize,
)]
pub struct RatchetTreeExtension {
    tree: Vec<Option<Node>>,
}

impl RatchetTreeExtension {
    /// Build a new extension from a vector of [`Node`]s.
    pub fn new(tree: Vec<Option<Node>>) -> Self {
        RatchetTreeExtension { tree }
    }

    /// Return the nodes of the tree.
    pub fn nodes(&self) -> &[Option<Node>] {
        &self.tree
    }

    pub(crate) fn into_nodes(self) -> Vec<Option<Node>> {
        self.tree
    }
}
