//! # TreeKEM
//!
//! A member refreshes its direct path with an [`UpdatePath`]: it picks a fresh
//! path secret for its leaf, derives one path secret per parent on its direct
//! path and encrypts each of them to the resolution of the copath node below
//! it. Every other member can decrypt exactly one of the path secrets, namely
//! the one of the lowest common ancestor of the two leaves, and derives the
//! rest of the path up to the root from it. All members therefore end up with
//! the same commit secret.

use cgka_traits::{crypto::CgkaCrypto, random::CgkaRand, types::HpkeCiphertext};
use serde::{Deserialize, Serialize};
use tls_codec::{TlsDeserialize, TlsSerialize, TlsSize};

use crate::{
    binary_tree::{
        treemath::{copath, direct_path, left, lowest_common_ancestor, right},
        LeafNodeIndex, NodeIndex,
    },
    ciphersuite::{Ciphersuite, HpkePublicKey, Secret},
    credentials::SignatureKeyPair,
    error::LibraryError,
    group::{group_context::GroupContext, GroupId},
    schedule::CommitSecret,
};

use super::{
    errors::{ApplyUpdatePathError, LeafNodeValidationError, PathSecretError},
    node::{
        leaf_node::{LeafNode, LeafNodeSource, TreeInfoTbs, TreePosition},
        parent_node::{ParentNode, PlainUpdatePathNode},
    },
    private_tree::{PathSecret, PrivateTree},
    RatchetTree,
};

/// ```c
/// struct {
///     HPKEPublicKey encryption_key;
///     HPKECiphertext encrypted_path_secret<V>;
/// } UpdatePathNode;
/// ```
#[derive(
    Debug, Eq, PartialEq, Clone, Serialize, Deserialize, TlsSerialize, TlsDeserialize, TlsSize,
)]
pub struct UpdatePathNode {
    pub(crate) encryption_key: HpkePublicKey,
    pub(crate) encrypted_path_secrets: Vec<HpkeCiphertext>,
}

impl UpdatePathNode {
    /// Returns the `encryption_key` of this node.
    pub fn encryption_key(&self) -> &HpkePublicKey {
        &self.encryption_key
    }

    /// The path secret encrypted to the `index`th node of the copath
    /// resolution.
    pub fn encrypted_path_secret(&self, index: usize) -> Option<&HpkeCiphertext> {
        self.encrypted_path_secrets.get(index)
    }
}

/// ```c
/// struct {
///     LeafNode leaf_node;
///     UpdatePathNode nodes<V>;
/// } UpdatePath;
/// ```
#[derive(
    Debug, Eq, PartialEq, Clone, Serialize, Deserialize, TlsSerialize, TlsDeserialize, TlsSize,
)]
pub struct UpdatePath {
    leaf_node: LeafNode,
    nodes: Vec<UpdatePathNode>,
}

impl UpdatePath {
    pub(crate) fn new(leaf_node: LeafNode, nodes: Vec<UpdatePathNode>) -> Self {
        Self { leaf_node, nodes }
    }

    /// The new leaf node of the committer.
    pub fn leaf_node(&self) -> &LeafNode {
        &self.leaf_node
    }

    /// One node per parent on the committer's direct path, from the leaf's
    /// parent up to the root.
    pub fn nodes(&self) -> &[UpdatePathNode] {
        &self.nodes
    }

    #[cfg(any(feature = "test-utils", test))]
    pub(crate) fn nodes_mut(&mut self) -> &mut Vec<UpdatePathNode> {
        &mut self.nodes
    }
}

/// Everything a committer gets out of creating an update path.
pub(crate) struct CreatedUpdatePath {
    /// The tree with the new leaf, the new parents and their parent hashes.
    pub(crate) tree: RatchetTree,
    pub(crate) update_path: UpdatePath,
    /// The plain path secrets, needed to give new members the path secret of
    /// their lowest common ancestor with the committer.
    pub(crate) plain_path: Vec<PlainUpdatePathNode>,
    pub(crate) commit_secret: CommitSecret,
    pub(crate) private_tree: PrivateTree,
    /// The provisional group context with the tree hash of the new tree.
    pub(crate) group_context: GroupContext,
}

impl CreatedUpdatePath {
    /// The path secret of the lowest common ancestor of the committer and
    /// `leaf_index`. `None` if the leaf is the committer's own.
    pub(crate) fn path_secret_for(
        &self,
        committer: LeafNodeIndex,
        leaf_index: LeafNodeIndex,
    ) -> Result<Option<PathSecret>, LibraryError> {
        if committer == leaf_index {
            return Ok(None);
        }
        let lca = lowest_common_ancestor(committer, leaf_index);
        let path = self
            .tree
            .direct_path(committer)
            .map_err(|_| LibraryError::custom("Committer is not in the tree"))?;
        let position = path
            .iter()
            .position(|&node_index| node_index == lca)
            .ok_or_else(|| LibraryError::custom("Common ancestor is not on the direct path"))?;
        self.plain_path
            .get(position)
            .map(|node| Some(node.path_secret().clone()))
            .ok_or_else(|| LibraryError::custom("Update path is too short"))
    }
}

fn library_error(e: PathSecretError) -> LibraryError {
    match e {
        PathSecretError::LibraryError(e) => e,
        PathSecretError::DecryptionError => LibraryError::custom("Unexpected decryption error"),
    }
}

/// Create an update path for the leaf at `own_leaf_index`.
///
/// The leaf is re-signed with a fresh encryption key and the source
/// `Commit`. `provisional_context` is the group context of the next epoch; its
/// tree hash is replaced with the one of the new tree before the path secrets
/// are encrypted to it. Leaves in `exclusion_list` (the ones added by the same
/// commit) are left out of the copath resolutions.
pub(crate) fn create_update_path(
    crypto: &impl CgkaCrypto,
    rand: &impl CgkaRand,
    tree: &RatchetTree,
    own_leaf_index: LeafNodeIndex,
    signer: &SignatureKeyPair,
    provisional_context: GroupContext,
    exclusion_list: &[LeafNodeIndex],
) -> Result<CreatedUpdatePath, LibraryError> {
    let ciphersuite = provisional_context.ciphersuite();
    let own_leaf = tree
        .leaf(own_leaf_index)
        .ok_or_else(|| LibraryError::custom("Own leaf is blank"))?;
    let path = direct_path(own_leaf_index.to_node_index(), tree.size())
        .map_err(|_| LibraryError::custom("Own leaf is not in the tree"))?;
    let copath = copath(own_leaf_index.to_node_index(), tree.size())
        .map_err(|_| LibraryError::custom("Own leaf is not in the tree"))?;

    log::debug!(
        "Creating an update path for leaf {} ({} parents)",
        own_leaf_index,
        path.len()
    );

    let leaf_path_secret = PathSecret::from(
        Secret::random(ciphersuite, rand).map_err(LibraryError::unexpected_crypto_error)?,
    );
    let leaf_key_pair = leaf_path_secret
        .derive_key_pair(crypto, ciphersuite)
        .map_err(library_error)?;
    let first_parent_secret = leaf_path_secret
        .derive_path_secret(crypto, ciphersuite)
        .map_err(library_error)?;
    let (parents, plain_path, commit_secret) =
        ParentNode::derive_path(crypto, ciphersuite, first_parent_secret, path.len())
            .map_err(library_error)?;

    let mut new_tree = tree.clone();
    new_tree
        .set_path(&path, parents.iter().map(|(parent, _)| parent.clone()))
        .map_err(|_| LibraryError::custom("Direct path is outside of the tree"))?;
    let leaf_parent_hash =
        new_tree.set_path_parent_hashes(crypto, ciphersuite, own_leaf_index, &path)?;

    let new_leaf = own_leaf.rekeyed(
        crypto,
        signer,
        HpkePublicKey::from(leaf_key_pair.public.clone()),
        LeafNodeSource::Commit(leaf_parent_hash.into()),
        TreeInfoTbs::Commit(TreePosition::new(
            provisional_context.group_id().clone(),
            own_leaf_index,
        )),
    )?;
    new_tree.set_leaf(own_leaf_index, new_leaf.clone());

    let mut group_context = provisional_context;
    group_context.set_tree_hash(new_tree.tree_hash(crypto, ciphersuite)?);
    let serialized_context = group_context.serialize()?;

    let mut update_path_nodes = Vec::with_capacity(plain_path.len());
    for (plain_node, &copath_node) in plain_path.iter().zip(copath.iter()) {
        let public_keys: Vec<HpkePublicKey> = new_tree
            .resolution(copath_node, exclusion_list)
            .into_iter()
            .filter_map(|node_index| new_tree.node(node_index))
            .map(|node| node.encryption_key().clone())
            .collect();
        update_path_nodes.push(plain_node.encrypt(
            crypto,
            ciphersuite,
            &public_keys,
            &serialized_context,
        )?);
    }

    let mut private_tree = PrivateTree::from_leaf_key_pair(own_leaf_index, leaf_key_pair);
    private_tree
        .insert_path(&new_tree, &path, parents)
        .map_err(|_| LibraryError::custom("Derived keys don't match the new tree"))?;

    Ok(CreatedUpdatePath {
        tree: new_tree,
        update_path: UpdatePath::new(new_leaf, update_path_nodes),
        plain_path,
        commit_secret,
        private_tree,
        group_context,
    })
}

/// Apply the public part of an update path sent by `sender`: check and set the
/// new leaf node, set the new parents and check that the parent hash chain
/// from the leaf to the root is intact.
pub(crate) fn apply_update_path(
    crypto: &impl CgkaCrypto,
    ciphersuite: Ciphersuite,
    tree: &RatchetTree,
    sender: LeafNodeIndex,
    update_path: &UpdatePath,
    group_id: &GroupId,
) -> Result<RatchetTree, ApplyUpdatePathError> {
    if tree.leaf(sender).is_none() {
        return Err(ApplyUpdatePathError::UnknownSender);
    }
    let path = direct_path(sender.to_node_index(), tree.size())?;
    if path.len() != update_path.nodes().len() {
        log::debug!(
            "Update path has {} nodes, the direct path {}.",
            update_path.nodes().len(),
            path.len()
        );
        return Err(ApplyUpdatePathError::PathLengthMismatch);
    }

    let leaf_node = update_path.leaf_node();
    if !matches!(leaf_node.leaf_node_source(), LeafNodeSource::Commit(_)) {
        return Err(LeafNodeValidationError::InvalidLeafNodeSource.into());
    }
    leaf_node.validate_locally()?;
    leaf_node.verify(
        crypto,
        ciphersuite,
        Some(TreePosition::new(group_id.clone(), sender)),
    )?;

    // None of the new keys may already be in use outside of the replaced path.
    let sender_node = sender.to_node_index();
    let in_use = |key: &HpkePublicKey| {
        tree.leaves()
            .filter(|(index, _)| index.to_node_index() != sender_node)
            .any(|(_, leaf)| leaf.encryption_key() == key)
            || tree
                .parents()
                .filter(|(index, _)| !path.contains(index))
                .any(|(_, parent)| parent.encryption_key() == key)
    };
    if in_use(leaf_node.encryption_key())
        || update_path
            .nodes()
            .iter()
            .any(|node| in_use(node.encryption_key()))
    {
        return Err(LeafNodeValidationError::EncryptionKeyAlreadyInUse.into());
    }

    let mut new_tree = tree.clone();
    new_tree
        .set_path(
            &path,
            update_path
                .nodes()
                .iter()
                .map(|node| ParentNode::from(node.encryption_key().clone())),
        )
        .map_err(|_| LibraryError::custom("Direct path is outside of the tree"))?;
    let parent_hash = new_tree.set_path_parent_hashes(crypto, ciphersuite, sender, &path)?;
    if leaf_node.parent_hash() != Some(parent_hash.as_slice()) {
        log::debug!("The parent hash of the new leaf does not match the update path.");
        return Err(ApplyUpdatePathError::ParentHashMismatch);
    }
    new_tree.set_leaf(sender, leaf_node.clone());

    Ok(new_tree)
}

/// Recover the path secret of the lowest common ancestor of our leaf and the
/// `sender`'s from an update path and derive the rest of the path from it.
///
/// `new_tree` is the tree after [`apply_update_path()`]. Returns the private
/// tree with the keys of the refreshed part of our direct path and the commit
/// secret.
#[allow(clippy::too_many_arguments)]
pub(crate) fn decrypt_update_path(
    crypto: &impl CgkaCrypto,
    ciphersuite: Ciphersuite,
    new_tree: &RatchetTree,
    private_tree: &PrivateTree,
    sender: LeafNodeIndex,
    update_path: &UpdatePath,
    exclusion_list: &[LeafNodeIndex],
    serialized_context: &[u8],
) -> Result<(PrivateTree, CommitSecret), ApplyUpdatePathError> {
    let own_leaf_index = private_tree.own_leaf_index();
    let sender_path = direct_path(sender.to_node_index(), new_tree.size())?;
    let lca = lowest_common_ancestor(own_leaf_index, sender);
    let position = sender_path
        .iter()
        .position(|&node_index| node_index == lca)
        .ok_or(ApplyUpdatePathError::UnknownSender)?;
    let update_path_node = update_path
        .nodes()
        .get(position)
        .ok_or(ApplyUpdatePathError::PathLengthMismatch)?;

    // The child of the common ancestor on our side is on the sender's copath.
    let copath_node: NodeIndex = if own_leaf_index.to_node_index() < lca {
        left(lca)?
    } else {
        right(lca)?
    };
    let resolution = new_tree.resolution(copath_node, exclusion_list);
    let (ciphertext_index, private_key) = resolution
        .iter()
        .enumerate()
        .find_map(|(index, &node_index)| {
            let public_key = new_tree.node(node_index)?.encryption_key();
            private_tree
                .private_key(node_index, public_key)
                .map(|private_key| (index, private_key))
        })
        .ok_or_else(|| {
            log::error!(
                "No private key for the resolution of node {} ({:?}).",
                copath_node,
                resolution
            );
            ApplyUpdatePathError::NoMatchingKey
        })?;
    let ciphertext = update_path_node
        .encrypted_path_secret(ciphertext_index)
        .ok_or(ApplyUpdatePathError::MissingCiphertext)?;

    let path_secret = PathSecret::decrypt(
        crypto,
        ciphersuite,
        ciphertext,
        private_key,
        serialized_context,
    )?;
    let (parents, _, commit_secret) = ParentNode::derive_path(
        crypto,
        ciphersuite,
        path_secret,
        sender_path.len() - position,
    )?;

    let mut new_private_tree = private_tree.clone();
    new_private_tree.prune(new_tree);
    new_private_tree.insert_path(new_tree, &sender_path[position..], parents)?;

    Ok((new_private_tree, commit_secret))
}
