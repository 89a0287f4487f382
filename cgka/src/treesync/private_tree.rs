//! The private part of the ratchet tree: the path secrets and the HPKE private
//! keys a member holds for its own leaf and the parents on its direct path.

use std::collections::BTreeMap;

use cgka_traits::{
    crypto::CgkaCrypto,
    types::{HpkeCiphertext, HpkeKeyPair, HpkePrivateKey},
};
use serde::{Deserialize, Serialize};
use tls_codec::{Deserialize as TlsDeserializeTrait, Serialize as TlsSerializeTrait};
use tls_codec::{TlsDeserialize, TlsSerialize, TlsSize};

use crate::{
    binary_tree::{
        treemath::{direct_path, lowest_common_ancestor},
        LeafNodeIndex, NodeIndex,
    },
    ciphersuite::{hpke, Ciphersuite, HpkePublicKey, Secret},
    error::LibraryError,
};

use super::{
    errors::{ApplyUpdatePathError, PathSecretError},
    node::parent_node::ParentNode,
    RatchetTree,
};

const UPDATE_PATH_NODE_LABEL: &str = "UpdatePathNode";

/// A path secret. The path secret of a node is derived from the one of its
/// child on the committer's direct path, the key pair of the node from its
/// path secret.
///
/// ```text
/// path_secret[n] = DeriveSecret(path_secret[n-1], "path")
/// node_secret[n] = DeriveSecret(path_secret[n], "node")
/// node_priv[n], node_pub[n] = KEM.DeriveKeyPair(node_secret[n])
/// ```
#[derive(Debug, Clone, PartialEq, TlsSerialize, TlsDeserialize, TlsSize)]
pub(crate) struct PathSecret {
    pub(crate) path_secret: Secret,
}

impl From<Secret> for PathSecret {
    fn from(path_secret: Secret) -> Self {
        Self { path_secret }
    }
}

impl PathSecret {
    /// Derive the HPKE key pair of the node this is the path secret of.
    pub(crate) fn derive_key_pair(
        &self,
        crypto: &impl CgkaCrypto,
        ciphersuite: Ciphersuite,
    ) -> Result<HpkeKeyPair, PathSecretError> {
        let node_secret = self
            .path_secret
            .derive_secret(crypto, ciphersuite, "node")
            .map_err(LibraryError::unexpected_crypto_error)?;
        log_crypto!(trace, "Node secret: {:x?}", node_secret.as_slice());
        crypto
            .derive_hpke_keypair(ciphersuite.hpke_config(), node_secret.as_slice())
            .map_err(|e| LibraryError::unexpected_crypto_error(e).into())
    }

    /// Derive the path secret of the next node on the path.
    pub(crate) fn derive_path_secret(
        &self,
        crypto: &impl CgkaCrypto,
        ciphersuite: Ciphersuite,
    ) -> Result<Self, PathSecretError> {
        let path_secret = self
            .path_secret
            .derive_secret(crypto, ciphersuite, "path")
            .map_err(LibraryError::unexpected_crypto_error)?;
        log_crypto!(trace, "Path secret: {:x?}", path_secret.as_slice());
        Ok(Self { path_secret })
    }

    /// Encrypt this path secret to `public_key`, bound to the encoded group
    /// context of the new epoch.
    pub(crate) fn encrypt(
        &self,
        crypto: &impl CgkaCrypto,
        ciphersuite: Ciphersuite,
        public_key: &HpkePublicKey,
        group_context: &[u8],
    ) -> Result<HpkeCiphertext, LibraryError> {
        let plaintext = self
            .tls_serialize_detached()
            .map_err(LibraryError::missing_bound_check)?;
        hpke::encrypt_with_label(
            public_key.as_slice(),
            UPDATE_PATH_NODE_LABEL,
            group_context,
            &plaintext,
            ciphersuite,
            crypto,
        )
        .map_err(|_| LibraryError::custom("Encrypting a path secret failed"))
    }

    /// Decrypt a path secret from an update path node.
    pub(crate) fn decrypt(
        crypto: &impl CgkaCrypto,
        ciphersuite: Ciphersuite,
        ciphertext: &HpkeCiphertext,
        private_key: &HpkePrivateKey,
        group_context: &[u8],
    ) -> Result<PathSecret, PathSecretError> {
        let plaintext = hpke::decrypt_with_label(
            private_key,
            UPDATE_PATH_NODE_LABEL,
            group_context,
            ciphertext,
            ciphersuite,
            crypto,
        )
        .map_err(|_| PathSecretError::DecryptionError)?;
        PathSecret::tls_deserialize_exact(plaintext).map_err(|_| PathSecretError::DecryptionError)
    }
}

/// The HPKE key pairs of the own leaf and of the parents on the own direct
/// path, keyed by node index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct PrivateTree {
    own_leaf_index: LeafNodeIndex,
    key_pairs: BTreeMap<NodeIndex, HpkeKeyPair>,
}

impl PrivateTree {
    /// A private tree holding only the key pair of the own leaf.
    pub(crate) fn from_leaf_key_pair(own_leaf_index: LeafNodeIndex, key_pair: HpkeKeyPair) -> Self {
        let mut key_pairs = BTreeMap::new();
        key_pairs.insert(own_leaf_index.to_node_index(), key_pair);
        Self {
            own_leaf_index,
            key_pairs,
        }
    }

    /// Build the private tree of a new member from the path secret it got in
    /// a Welcome. `path_secret` is the secret of the lowest common ancestor of
    /// the committer and the new member. The derived public keys are checked
    /// against the tree.
    pub(crate) fn from_path_secret(
        crypto: &impl CgkaCrypto,
        ciphersuite: Ciphersuite,
        tree: &RatchetTree,
        own_leaf_index: LeafNodeIndex,
        leaf_key_pair: HpkeKeyPair,
        committer: LeafNodeIndex,
        path_secret: PathSecret,
    ) -> Result<Self, ApplyUpdatePathError> {
        let mut private_tree = Self::from_leaf_key_pair(own_leaf_index, leaf_key_pair);
        let lca = lowest_common_ancestor(own_leaf_index, committer);
        let path = direct_path(own_leaf_index.to_node_index(), tree.size())?;
        let start = path
            .iter()
            .position(|&node| node == lca)
            .ok_or(ApplyUpdatePathError::PathMismatch)?;
        let (parents, _, _) =
            ParentNode::derive_path(crypto, ciphersuite, path_secret, path.len() - start)?;
        private_tree.insert_path(tree, &path[start..], parents)?;
        Ok(private_tree)
    }

    /// The own leaf index.
    pub(crate) fn own_leaf_index(&self) -> LeafNodeIndex {
        self.own_leaf_index
    }

    /// Insert the key pairs of freshly derived parents on `path`, after
    /// checking that their public keys are the ones in `tree`.
    pub(crate) fn insert_path(
        &mut self,
        tree: &RatchetTree,
        path: &[NodeIndex],
        parents: Vec<(ParentNode, HpkePrivateKey)>,
    ) -> Result<(), ApplyUpdatePathError> {
        if path.len() != parents.len() {
            return Err(ApplyUpdatePathError::PathLengthMismatch);
        }
        for (&node_index, (parent, private_key)) in path.iter().zip(parents.into_iter()) {
            let in_tree = tree
                .parent(node_index)
                .ok_or(ApplyUpdatePathError::PathMismatch)?;
            if in_tree.encryption_key() != parent.encryption_key() {
                log::error!("Derived public key of node {} doesn't match.", node_index);
                return Err(ApplyUpdatePathError::PathMismatch);
            }
            self.key_pairs.insert(
                node_index,
                HpkeKeyPair {
                    private: private_key,
                    public: parent.encryption_key().as_slice().to_vec(),
                },
            );
        }
        Ok(())
    }

    /// Replace the key pair of the own leaf.
    pub(crate) fn set_leaf_key_pair(&mut self, key_pair: HpkeKeyPair) {
        self.key_pairs
            .insert(self.own_leaf_index.to_node_index(), key_pair);
    }

    /// Find a private key for the node at `node_index`. The key is only
    /// returned if its public key is the one of `public_key`.
    pub(crate) fn private_key(
        &self,
        node_index: NodeIndex,
        public_key: &HpkePublicKey,
    ) -> Option<&HpkePrivateKey> {
        self.key_pairs
            .get(&node_index)
            .filter(|key_pair| key_pair.public.as_slice() == public_key.as_slice())
            .map(|key_pair| &key_pair.private)
    }

    /// Drop all key pairs that don't belong to the node currently in `tree`.
    pub(crate) fn prune(&mut self, tree: &RatchetTree) {
        self.key_pairs.retain(|node_index, key_pair| {
            tree.node(*node_index)
                .map(|node| node.encryption_key().as_slice() == key_pair.public.as_slice())
                .unwrap_or(false)
        });
    }

    #[cfg(test)]
    pub(crate) fn node_indices(&self) -> Vec<NodeIndex> {
        self.key_pairs.keys().copied().collect()
    }
}

