use std::collections::BTreeSet;

use tls_codec::{Deserialize, Serialize};

use super::{
    leaf_node::{Capabilities, LeafNodeSource, NewLeafNodeParams, TreeInfoTbs, TreePosition},
    *,
};
use crate::{
    binary_tree::LeafNodeIndex,
    ciphersuite::Secret,
    credentials::{CredentialWithKey, SignatureKeyPair},
    extensions::{Extension, Extensions, UnknownExtension},
    group::GroupId,
    key_packages::Lifetime,
    test_utils::*,
    treesync::{errors::LeafNodeValidationError, private_tree::PathSecret},
};

fn new_leaf(
    ciphersuite: Ciphersuite,
    provider: &impl CgkaProvider,
    credential_with_key: CredentialWithKey,
    signer: &SignatureKeyPair,
    capabilities: Capabilities,
    extensions: Extensions,
) -> LeafNode {
    LeafNode::new(
        provider.crypto(),
        provider.rand(),
        signer,
        NewLeafNodeParams {
            ciphersuite,
            credential_with_key,
            leaf_node_source: LeafNodeSource::KeyPackage(Lifetime::default()),
            capabilities,
            extensions,
            tree_info_tbs: TreeInfoTbs::KeyPackage,
        },
    )
    .expect("error creating leaf node")
    .0
}

#[apply(ciphersuites_and_providers)]
fn leaf_node_signatures(ciphersuite: Ciphersuite, provider: &impl CgkaProvider) {
    let _ = pretty_env_logger::try_init();
    let crypto = provider.crypto();
    let (credential_with_key, signer) =
        generate_credential_with_key("Alice", ciphersuite, provider);
    let leaf = new_leaf(
        ciphersuite,
        provider,
        credential_with_key,
        &signer,
        Capabilities::default(),
        Extensions::empty(),
    );
    assert!(leaf.verify(crypto, ciphersuite, None).is_ok());
    assert!(leaf.life_time().is_some());
    assert!(leaf.parent_hash().is_none());

    // Leaf nodes of updates and commits are bound to their position
    let group_id = GroupId::from_slice(b"group");
    let position = || TreePosition::new(group_id.clone(), LeafNodeIndex::new(2));
    let encryption_key = leaf.encryption_key().clone();
    let updated = leaf
        .rekeyed(
            crypto,
            &signer,
            encryption_key.clone(),
            LeafNodeSource::Update,
            TreeInfoTbs::Update(position()),
        )
        .expect("error signing leaf node");
    assert_eq!(updated.credential(), leaf.credential());
    assert_eq!(updated.leaf_node_source(), &LeafNodeSource::Update);
    assert!(updated.life_time().is_none());
    assert!(updated.verify(crypto, ciphersuite, Some(position())).is_ok());
    assert_eq!(
        updated.verify(crypto, ciphersuite, None),
        Err(LeafNodeValidationError::MissingTreePosition)
    );
    assert_eq!(
        updated.verify(
            crypto,
            ciphersuite,
            Some(TreePosition::new(group_id.clone(), LeafNodeIndex::new(3)))
        ),
        Err(LeafNodeValidationError::InvalidSignature)
    );
    assert_eq!(
        updated.verify(
            crypto,
            ciphersuite,
            Some(TreePosition::new(
                GroupId::from_slice(b"other group"),
                LeafNodeIndex::new(2)
            ))
        ),
        Err(LeafNodeValidationError::InvalidSignature)
    );

    let committed = leaf
        .rekeyed(
            crypto,
            &signer,
            encryption_key,
            LeafNodeSource::Commit(vec![1, 2, 3].into()),
            TreeInfoTbs::Commit(position()),
        )
        .expect("error signing leaf node");
    assert_eq!(committed.parent_hash(), Some(&[1u8, 2, 3][..]));
    assert!(committed.verify(crypto, ciphersuite, Some(position())).is_ok());

    // The encryption key is covered by the signature
    let mut tampered = leaf.clone();
    tampered.set_encryption_key_unsigned(updated.signature_key().as_slice().into());
    assert_eq!(
        tampered.verify(crypto, ciphersuite, None),
        Err(LeafNodeValidationError::InvalidSignature)
    );
}

#[apply(ciphersuites_and_providers)]
fn leaf_node_local_validation(ciphersuite: Ciphersuite, provider: &impl CgkaProvider) {
    let _ = pretty_env_logger::try_init();
    let (credential_with_key, signer) =
        generate_credential_with_key("Alice", ciphersuite, provider);
    let unknown_extension = Extensions::single(Extension::Unknown(
        0xff00,
        UnknownExtension(vec![1, 2, 3]),
    ));

    let leaf = new_leaf(
        ciphersuite,
        provider,
        credential_with_key.clone(),
        &signer,
        Capabilities::default(),
        unknown_extension.clone(),
    );
    assert_eq!(
        leaf.validate_locally(),
        Err(LeafNodeValidationError::UnsupportedExtensions)
    );

    let leaf = new_leaf(
        ciphersuite,
        provider,
        credential_with_key.clone(),
        &signer,
        Capabilities::new(
            None,
            None,
            Some(&[crate::extensions::ExtensionType::Unknown(0xff00)]),
            None,
            None,
        ),
        unknown_extension,
    );
    assert!(leaf.validate_locally().is_ok());
    assert!(leaf.supports_extension(crate::extensions::ExtensionType::Unknown(0xff00)));

    let leaf = new_leaf(
        ciphersuite,
        provider,
        credential_with_key,
        &signer,
        Capabilities::new(None, None, None, None, Some(&[])),
        Extensions::empty(),
    );
    assert_eq!(
        leaf.validate_locally(),
        Err(LeafNodeValidationError::UnsupportedCredentials)
    );
}

#[apply(ciphersuites_and_providers)]
fn parent_path_derivation(ciphersuite: Ciphersuite, provider: &impl CgkaProvider) {
    let _ = pretty_env_logger::try_init();
    let crypto = provider.crypto();
    let secret = Secret::random(ciphersuite, provider.rand()).expect("Not enough randomness.");

    let (path, update_path_nodes, commit_secret) =
        ParentNode::derive_path(crypto, ciphersuite, PathSecret::from(secret.clone()), 3)
            .expect("error deriving path");
    assert_eq!(path.len(), 3);
    assert_eq!(update_path_nodes.len(), 3);
    // All nodes get distinct keys
    let keys: BTreeSet<Vec<u8>> = path
        .iter()
        .map(|(node, _)| node.encryption_key().as_slice().to_vec())
        .collect();
    assert_eq!(keys.len(), 3);
    assert!(path.iter().all(|(node, _)| node.parent_hash().is_empty()
        && node.unmerged_leaves().is_empty()));

    // The derivation is deterministic
    let (same_path, _, same_commit_secret) =
        ParentNode::derive_path(crypto, ciphersuite, PathSecret::from(secret.clone()), 3)
            .expect("error deriving path");
    assert_eq!(same_commit_secret, commit_secret);
    assert_eq!(
        same_path.into_iter().map(|(node, _)| node).collect::<Vec<_>>(),
        path.iter().map(|(node, _)| node.clone()).collect::<Vec<_>>()
    );

    // A shorter path ends in a different commit secret
    let (_, _, short_commit_secret) =
        ParentNode::derive_path(crypto, ciphersuite, PathSecret::from(secret), 2)
            .expect("error deriving path");
    assert_ne!(short_commit_secret, commit_secret);
}

#[test]
fn unmerged_leaves() {
    let mut parent = ParentNode::new(vec![1, 2, 3].into(), Vec::<u8>::new().into(), vec![]);
    parent.add_unmerged_leaf(LeafNodeIndex::new(4));
    parent.add_unmerged_leaf(LeafNodeIndex::new(2));
    parent.add_unmerged_leaf(LeafNodeIndex::new(4));
    assert_eq!(
        parent.unmerged_leaves(),
        &[LeafNodeIndex::new(4), LeafNodeIndex::new(2)]
    );

    let excluded = [LeafNodeIndex::new(4)].into_iter().collect();
    let filtered = parent.without_unmerged_leaves(&excluded);
    assert_eq!(filtered.unmerged_leaves(), &[LeafNodeIndex::new(2)]);
    assert_eq!(filtered.encryption_key(), parent.encryption_key());

    parent.set_parent_hash(vec![9, 9]);
    assert_eq!(parent.parent_hash(), &[9, 9]);
}

#[apply(ciphersuites_and_providers)]
fn node_encoding(ciphersuite: Ciphersuite, provider: &impl CgkaProvider) {
    let _ = pretty_env_logger::try_init();
    let (credential_with_key, signer) =
        generate_credential_with_key("Alice", ciphersuite, provider);
    let leaf = new_leaf(
        ciphersuite,
        provider,
        credential_with_key,
        &signer,
        Capabilities::default(),
        Extensions::empty(),
    );
    let parent = ParentNode::new(
        vec![1, 2, 3].into(),
        vec![4, 5].into(),
        vec![LeafNodeIndex::new(1)],
    );

    for node in [Node::leaf_node(leaf), Node::parent_node(parent)] {
        let encoded = node.tls_serialize_detached().expect("error encoding node");
        let decoded = Node::tls_deserialize(&mut encoded.as_slice()).expect("error decoding node");
        assert_eq!(decoded.encryption_key(), node.encryption_key());
        assert_eq!(decoded.as_leaf_node(), node.as_leaf_node());
        assert_eq!(decoded.as_parent_node(), node.as_parent_node());
        assert_eq!(decoded, node);
    }
    assert!(Node::tls_deserialize(&mut [3u8].as_slice()).is_err());
}
