//! This module contains the [`ParentNode`] struct, its implementation, as well
//! as the [`PlainUpdatePathNode`], a helper struct for the creation of
//! update paths.
use std::collections::BTreeSet;

use cgka_traits::crypto::CgkaCrypto;
use serde::{Deserialize, Serialize};
use tls_codec::{TlsDeserialize, TlsSerialize, TlsSize, VLBytes};

use crate::{
    binary_tree::LeafNodeIndex,
    ciphersuite::{Ciphersuite, HpkePrivateKey, HpkePublicKey},
    error::LibraryError,
    schedule::CommitSecret,
    treesync::{
        errors::PathSecretError,
        private_tree::PathSecret,
        treekem::UpdatePathNode,
    },
};

/// This struct implements the parent nodes of the ratchet tree.
///
/// ```c
/// struct {
///     HPKEPublicKey encryption_key;
///     opaque parent_hash<V>;
///     uint32 unmerged_leaves<V>;
/// } ParentNode;
/// ```
#[derive(
    Debug, Eq, PartialEq, Clone, Serialize, Deserialize, TlsSerialize, TlsDeserialize, TlsSize,
)]
pub struct ParentNode {
    encryption_key: HpkePublicKey,
    parent_hash: VLBytes,
    unmerged_leaves: Vec<LeafNodeIndex>,
}

impl From<HpkePublicKey> for ParentNode {
    fn from(public_key: HpkePublicKey) -> Self {
        Self {
            encryption_key: public_key,
            parent_hash: vec![].into(),
            unmerged_leaves: vec![],
        }
    }
}

/// Helper struct for the encryption of a [`ParentNode`].
#[derive(Debug)]
pub(crate) struct PlainUpdatePathNode {
    public_key: HpkePublicKey,
    path_secret: PathSecret,
}

impl PlainUpdatePathNode {
    /// Encrypt this node and return the resulting [`UpdatePathNode`].
    pub(in crate::treesync) fn encrypt(
        &self,
        crypto: &impl CgkaCrypto,
        ciphersuite: Ciphersuite,
        public_keys: &[HpkePublicKey],
        group_context: &[u8],
    ) -> Result<UpdatePathNode, LibraryError> {
        public_keys
            .iter()
            .map(|pk| {
                self.path_secret
                    .encrypt(crypto, ciphersuite, pk, group_context)
            })
            .collect::<Result<Vec<_>, LibraryError>>()
            .map(|encrypted_path_secrets| UpdatePathNode {
                encryption_key: self.public_key.clone(),
                encrypted_path_secrets,
            })
    }

    /// Return a reference to the `path_secret` of this node.
    pub(in crate::treesync) fn path_secret(&self) -> &PathSecret {
        &self.path_secret
    }
}

/// The result of a path derivation: the new parent nodes, their private keys,
/// the plain update path nodes and the commit secret.
pub(crate) type PathDerivationResult = (
    Vec<(ParentNode, HpkePrivateKey)>,
    Vec<PlainUpdatePathNode>,
    CommitSecret,
);

impl ParentNode {
    /// Create a new [`ParentNode`] from its components.
    pub(crate) fn new(
        encryption_key: HpkePublicKey,
        parent_hash: VLBytes,
        unmerged_leaves: Vec<LeafNodeIndex>,
    ) -> Self {
        Self {
            encryption_key,
            parent_hash,
            unmerged_leaves,
        }
    }

    /// Derive a path of parent nodes from the given `path_secret`, which is
    /// the path secret of the first parent on the path.
    ///
    /// Returns the resulting vector of [`ParentNode`]s with their private
    /// keys, as well as the intermediate [`PathSecret`]s and the
    /// [`CommitSecret`].
    pub(crate) fn derive_path(
        crypto: &impl CgkaCrypto,
        ciphersuite: Ciphersuite,
        path_secret: PathSecret,
        path_length: usize,
    ) -> Result<PathDerivationResult, PathSecretError> {
        let mut next_path_secret = path_secret;
        let mut path_secrets = Vec::with_capacity(path_length);

        for _ in 0..path_length {
            let path_secret = next_path_secret;
            // Derive the next path secret.
            next_path_secret = path_secret.derive_path_secret(crypto, ciphersuite)?;
            path_secrets.push(path_secret);
        }

        let commit_secret = CommitSecret::new(next_path_secret.path_secret);

        let mut path = Vec::with_capacity(path_length);
        let mut update_path_nodes = Vec::with_capacity(path_length);
        for path_secret in path_secrets {
            let key_pair = path_secret.derive_key_pair(crypto, ciphersuite)?;
            let public_key = HpkePublicKey::from(key_pair.public);
            let parent_node = ParentNode::from(public_key.clone());
            path.push((parent_node, key_pair.private));
            update_path_nodes.push(PlainUpdatePathNode {
                public_key,
                path_secret,
            });
        }

        Ok((path, update_path_nodes, commit_secret))
    }

    /// Return the value of the parent hash of this node.
    pub fn parent_hash(&self) -> &[u8] {
        self.parent_hash.as_slice()
    }

    /// Returns the node's HPKE public key.
    pub fn encryption_key(&self) -> &HpkePublicKey {
        &self.encryption_key
    }

    /// Get the list of unmerged leaves.
    pub fn unmerged_leaves(&self) -> &[LeafNodeIndex] {
        self.unmerged_leaves.as_slice()
    }

    /// Add a [`LeafNodeIndex`] to the node's list of unmerged leaves.
    pub(crate) fn add_unmerged_leaf(&mut self, leaf_index: LeafNodeIndex) {
        if !self.unmerged_leaves.contains(&leaf_index) {
            self.unmerged_leaves.push(leaf_index);
        }
    }

    /// Set the parent hash value of this node.
    pub(crate) fn set_parent_hash(&mut self, parent_hash: Vec<u8>) {
        self.parent_hash = parent_hash.into()
    }

    /// A copy of this node with the given leaves removed from the unmerged
    /// leaves.
    pub(crate) fn without_unmerged_leaves(&self, excluded: &BTreeSet<LeafNodeIndex>) -> Self {
        Self {
            encryption_key: self.encryption_key.clone(),
            parent_hash: self.parent_hash.clone(),
            unmerged_leaves: self
                .unmerged_leaves
                .iter()
                .filter(|leaf| !excluded.contains(leaf))
                .copied()
                .collect(),
        }
    }
}
