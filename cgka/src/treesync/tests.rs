use cgka_traits::types::HpkeKeyPair;

use super::{
    node::parent_node::ParentNode,
    private_tree::PrivateTree,
    treekem::{apply_update_path, create_update_path, decrypt_update_path},
    *,
};
use crate::{
    binary_tree::LeafNodeIndex,
    ciphersuite::HpkePublicKey,
    credentials::SignatureKeyPair,
    extensions::Extensions,
    group::group_context::GroupContext,
    test_utils::*,
    treesync::errors::ApplyUpdatePathError,
};

struct TestMember {
    leaf_index: LeafNodeIndex,
    signer: SignatureKeyPair,
    private_tree: PrivateTree,
}

/// A fresh leaf node from a key package, with its encryption key pair.
fn leaf(
    identity: &str,
    ciphersuite: Ciphersuite,
    provider: &impl CgkaProvider,
) -> (LeafNode, HpkeKeyPair, SignatureKeyPair) {
    let (credential_with_key, signer) =
        generate_credential_with_key(identity, ciphersuite, provider);
    let bundle = generate_key_package(ciphersuite, provider, &signer, credential_with_key);
    let leaf_node = bundle.key_package().leaf_node().clone();
    let key_pair = HpkeKeyPair {
        private: bundle.encryption_private_key.clone(),
        public: leaf_node.encryption_key().as_slice().to_vec(),
    };
    (leaf_node, key_pair, signer)
}

/// A tree with `n` members, added one after the other.
fn tree_with_members(
    n: usize,
    ciphersuite: Ciphersuite,
    provider: &impl CgkaProvider,
) -> (RatchetTree, Vec<TestMember>) {
    let mut tree: Option<RatchetTree> = None;
    let mut members = Vec::new();
    for i in 0..n {
        let (leaf_node, key_pair, signer) = leaf(&format!("member {i}"), ciphersuite, provider);
        let leaf_index = match tree.as_mut() {
            None => {
                tree = Some(RatchetTree::new(leaf_node));
                LeafNodeIndex::new(0)
            }
            Some(tree) => tree.add_leaf(leaf_node).expect("error adding leaf"),
        };
        members.push(TestMember {
            leaf_index,
            signer,
            private_tree: PrivateTree::from_leaf_key_pair(leaf_index, key_pair),
        });
    }
    (tree.expect("no members"), members)
}

fn context(ciphersuite: Ciphersuite, epoch: u64) -> GroupContext {
    GroupContext::new(
        ciphersuite,
        GroupId::from_slice(b"Test Group"),
        epoch,
        vec![],
        vec![],
        Extensions::empty(),
    )
}

/// Let `committer` commit to `tree` and check that every other member
/// recovers the same commit secret. Returns the new tree.
fn commit_and_check(
    ciphersuite: Ciphersuite,
    provider: &impl CgkaProvider,
    tree: &RatchetTree,
    members: &mut [TestMember],
    committer: usize,
    epoch: u64,
    exclusion_list: &[LeafNodeIndex],
) -> RatchetTree {
    let committer_index = members[committer].leaf_index;
    let created = create_update_path(
        provider.crypto(),
        provider.rand(),
        tree,
        committer_index,
        &members[committer].signer,
        context(ciphersuite, epoch),
        exclusion_list,
    )
    .expect("error creating update path");
    assert!(created
        .tree
        .verify_parent_hashes(provider.crypto(), ciphersuite)
        .expect("error verifying parent hashes"));
    let serialized_context = created
        .group_context
        .serialize()
        .expect("error serializing context");
    let group_id = created.group_context.group_id().clone();

    for (i, member) in members.iter_mut().enumerate() {
        if i == committer || exclusion_list.contains(&member.leaf_index) {
            continue;
        }
        let new_tree = apply_update_path(
            provider.crypto(),
            ciphersuite,
            tree,
            committer_index,
            &created.update_path,
            &group_id,
        )
        .expect("error applying update path");
        assert_eq!(new_tree, created.tree);
        let (private_tree, commit_secret) = decrypt_update_path(
            provider.crypto(),
            ciphersuite,
            &new_tree,
            &member.private_tree,
            committer_index,
            &created.update_path,
            exclusion_list,
            &serialized_context,
        )
        .expect("error decrypting update path");
        assert_eq!(commit_secret, created.commit_secret);
        member.private_tree = private_tree;
    }
    members[committer].private_tree = created.private_tree;
    created.tree
}

#[apply(ciphersuites_and_providers)]
fn add_remove_update(ciphersuite: Ciphersuite, provider: &impl CgkaProvider) {
    let _ = pretty_env_logger::try_init();
    let (mut tree, _) = tree_with_members(5, ciphersuite, provider);
    assert_eq!(tree.leaf_count(), 8);
    assert_eq!(tree.size().u32(), 15);
    assert_eq!(tree.leaves().count(), 5);
    assert_eq!(tree.free_leaf_index(), Some(LeafNodeIndex::new(5)));

    // Removing a leaf in the middle keeps the size, the slot is reused.
    tree.remove_leaf(LeafNodeIndex::new(2))
        .expect("error removing leaf");
    assert_eq!(tree.leaf_count(), 8);
    assert_eq!(tree.free_leaf_index(), Some(LeafNodeIndex::new(2)));
    let (new_leaf, _, _) = leaf("new member", ciphersuite, provider);
    assert_eq!(
        tree.add_leaf(new_leaf).expect("error adding leaf"),
        LeafNodeIndex::new(2)
    );

    // Removing the only member of the right half shrinks the tree.
    tree.remove_leaf(LeafNodeIndex::new(4))
        .expect("error removing leaf");
    assert_eq!(tree.leaf_count(), 4);
    assert_eq!(tree.size().u32(), 7);

    assert_eq!(
        tree.remove_leaf(LeafNodeIndex::new(4)),
        Err(TreeSyncError::LeafNotInTree)
    );
    assert_eq!(
        tree.remove_leaf(LeafNodeIndex::new(17)),
        Err(TreeSyncError::LeafNotInTree)
    );

    let (updated_leaf, _, _) = leaf("member 1", ciphersuite, provider);
    tree.update_leaf(LeafNodeIndex::new(1), updated_leaf.clone())
        .expect("error updating leaf");
    assert_eq!(tree.leaf(LeafNodeIndex::new(1)), Some(&updated_leaf));

    // Shrinking all the way down to a single leaf.
    for index in [3, 2, 1] {
        tree.remove_leaf(LeafNodeIndex::new(index))
            .expect("error removing leaf");
    }
    assert_eq!(tree.leaf_count(), 1);
    assert_eq!(tree.root(), 0);
}

#[apply(ciphersuites_and_providers)]
fn unmerged_leaves_and_resolution(ciphersuite: Ciphersuite, provider: &impl CgkaProvider) {
    let _ = pretty_env_logger::try_init();
    let (tree, mut members) = tree_with_members(3, ciphersuite, provider);

    // Blank parents resolve to the leaves below them.
    assert_eq!(tree.resolution(3, &[]), vec![0, 2, 4]);
    assert_eq!(tree.resolution(5, &[]), vec![4]);
    assert_eq!(tree.resolution(3, &[LeafNodeIndex::new(1)]), vec![0, 4]);

    let mut tree = commit_and_check(ciphersuite, provider, &tree, &mut members, 0, 1, &[]);
    assert!(tree.parent(1).is_some());
    assert!(tree.parent(3).is_some());
    assert!(tree.parent(5).is_none());

    // A new leaf becomes unmerged in every non-blank parent above it.
    let (new_leaf, key_pair, signer) = leaf("member 3", ciphersuite, provider);
    let new_index = tree.add_leaf(new_leaf).expect("error adding leaf");
    assert_eq!(new_index, LeafNodeIndex::new(3));
    let root = tree.parent(3).expect("root is blank");
    assert_eq!(root.unmerged_leaves(), &[new_index]);
    assert!(tree.parent(5).is_none());
    assert_eq!(tree.resolution(3, &[]), vec![3, 6]);
    assert_eq!(tree.resolution(5, &[]), vec![4, 6]);
    assert_eq!(tree.resolution(5, &[new_index]), vec![4]);

    members.push(TestMember {
        leaf_index: new_index,
        signer,
        private_tree: PrivateTree::from_leaf_key_pair(new_index, key_pair),
    });

    // The new member can decrypt through its leaf key as long as it's not
    // excluded.
    let tree = commit_and_check(ciphersuite, provider, &tree, &mut members, 0, 2, &[]);
    assert!(tree.verify_parent_hashes(provider.crypto(), ciphersuite).expect("error"));
    assert!(tree
        .parent(3)
        .expect("root is blank")
        .unmerged_leaves()
        .is_empty());
}

#[apply(ciphersuites_and_providers)]
fn export_import(ciphersuite: Ciphersuite, provider: &impl CgkaProvider) {
    let _ = pretty_env_logger::try_init();
    let (tree, mut members) = tree_with_members(5, ciphersuite, provider);
    let mut tree = commit_and_check(ciphersuite, provider, &tree, &mut members, 4, 1, &[]);

    // Leaf 4 (node 8) is the last non-blank leaf, its parents are not blank.
    let nodes = tree.export_nodes();
    assert!(nodes.last().map(|node| node.is_some()).unwrap_or(false));
    assert_eq!(nodes.len(), 12);
    let imported = RatchetTree::from_nodes(nodes).expect("error importing tree");
    assert_eq!(imported, tree);
    imported
        .validate(
            provider.crypto(),
            ciphersuite,
            &GroupId::from_slice(b"Test Group"),
        )
        .expect("imported tree is invalid");

    // Structurally broken trees are rejected.
    assert_eq!(
        RatchetTree::from_nodes(vec![]),
        Err(RatchetTreeError::MalformedTree)
    );
    let mut trailing_blank = tree.export_nodes();
    trailing_blank.push(None);
    assert_eq!(
        RatchetTree::from_nodes(trailing_blank),
        Err(RatchetTreeError::MalformedTree)
    );
    let mut swapped = tree.export_nodes();
    swapped.swap(0, 1);
    assert_eq!(
        RatchetTree::from_nodes(swapped),
        Err(RatchetTreeError::MalformedTree)
    );

    // A tree with a duplicate leaf is rejected by the validation.
    let duplicate = tree.leaf(LeafNodeIndex::new(0)).cloned().expect("blank leaf");
    tree.remove_leaf(LeafNodeIndex::new(1))
        .expect("error removing leaf");
    tree.add_leaf(duplicate).expect("error adding leaf");
    let imported = RatchetTree::from_nodes(tree.export_nodes()).expect("error importing tree");
    assert_eq!(
        imported.validate(
            provider.crypto(),
            ciphersuite,
            &GroupId::from_slice(b"Test Group"),
        ),
        Err(RatchetTreeError::DuplicateKey)
    );
}

#[apply(ciphersuites_and_providers)]
fn tree_hash_changes(ciphersuite: Ciphersuite, provider: &impl CgkaProvider) {
    let _ = pretty_env_logger::try_init();
    let (tree, mut members) = tree_with_members(4, ciphersuite, provider);
    let tree = commit_and_check(ciphersuite, provider, &tree, &mut members, 1, 1, &[]);

    let tree_hash = tree
        .tree_hash(provider.crypto(), ciphersuite)
        .expect("error computing tree hash");
    assert_eq!(
        tree_hash,
        tree.clone()
            .tree_hash(provider.crypto(), ciphersuite)
            .expect("error computing tree hash")
    );
    assert_eq!(tree_hash.len(), ciphersuite.hash_length());

    // A different parent hash changes the tree hash.
    let mut changed = tree.clone();
    changed
        .parent_mut(3)
        .expect("root is blank")
        .set_parent_hash(vec![1, 2, 3]);
    assert_ne!(
        changed
            .tree_hash(provider.crypto(), ciphersuite)
            .expect("error computing tree hash"),
        tree_hash
    );

    // So does a different encryption key in a parent.
    let mut changed = tree.clone();
    let parent = changed.parent(1).expect("parent is blank").clone();
    changed
        .set_path(
            &[1],
            [ParentNode::new(
                HpkePublicKey::from(vec![7u8; 32]),
                parent.parent_hash().to_vec().into(),
                vec![],
            )],
        )
        .expect("error setting path");
    assert_ne!(
        changed
            .tree_hash(provider.crypto(), ciphersuite)
            .expect("error computing tree hash"),
        tree_hash
    );
}

#[apply(ciphersuites_and_providers)]
fn parent_hash_coverage(ciphersuite: Ciphersuite, provider: &impl CgkaProvider) {
    let _ = pretty_env_logger::try_init();
    let (tree, mut members) = tree_with_members(6, ciphersuite, provider);
    let tree = commit_and_check(ciphersuite, provider, &tree, &mut members, 0, 1, &[]);
    let tree = commit_and_check(ciphersuite, provider, &tree, &mut members, 5, 2, &[]);
    assert!(tree
        .verify_parent_hashes(provider.crypto(), ciphersuite)
        .expect("error verifying parent hashes"));

    let mut corrupted = tree.clone();
    corrupted
        .parent_mut(1)
        .expect("parent is blank")
        .set_parent_hash(vec![0u8; ciphersuite.hash_length()]);
    assert!(!corrupted
        .verify_parent_hashes(provider.crypto(), ciphersuite)
        .expect("error verifying parent hashes"));

    // A tampered update path doesn't match the parent hash of its leaf.
    let created = create_update_path(
        provider.crypto(),
        provider.rand(),
        &tree,
        members[2].leaf_index,
        &members[2].signer,
        context(ciphersuite, 3),
        &[],
    )
    .expect("error creating update path");
    let mut update_path = created.update_path.clone();
    update_path.nodes_mut()[0].encryption_key = HpkePublicKey::from(vec![9u8; 32]);
    assert_eq!(
        apply_update_path(
            provider.crypto(),
            ciphersuite,
            &tree,
            members[2].leaf_index,
            &update_path,
            created.group_context.group_id(),
        ),
        Err(ApplyUpdatePathError::ParentHashMismatch)
    );

    // A path with a missing node is rejected.
    let mut update_path = created.update_path.clone();
    update_path.nodes_mut().pop();
    assert_eq!(
        apply_update_path(
            provider.crypto(),
            ciphersuite,
            &tree,
            members[2].leaf_index,
            &update_path,
            created.group_context.group_id(),
        ),
        Err(ApplyUpdatePathError::PathLengthMismatch)
    );
}

#[apply(ciphersuites_and_providers)]
fn path_secret_convergence(ciphersuite: Ciphersuite, provider: &impl CgkaProvider) {
    let _ = pretty_env_logger::try_init();
    let (mut tree, mut members) = tree_with_members(7, ciphersuite, provider);

    // Every member commits once, then a few more in a different order. Later
    // commits are decrypted with parent keys from earlier ones.
    for (epoch, committer) in [0, 1, 2, 3, 4, 5, 6, 3, 0, 6, 2].into_iter().enumerate() {
        tree = commit_and_check(
            ciphersuite,
            provider,
            &tree,
            &mut members,
            committer,
            epoch as u64 + 1,
            &[],
        );
    }

    // Everybody holds the root key.
    let root = tree.root();
    let root_key = tree.node(root).expect("root is blank").encryption_key().clone();
    for member in members.iter() {
        assert!(member.private_tree.private_key(root, &root_key).is_some());
    }
    // The last committer holds keys for its whole direct path
    let indices = members[2].private_tree.node_indices();
    assert!(indices.contains(&root));
    assert!(indices.len() >= 3);
}

#[apply(ciphersuites_and_providers)]
fn no_matching_key(ciphersuite: Ciphersuite, provider: &impl CgkaProvider) {
    let _ = pretty_env_logger::try_init();
    let (tree, members) = tree_with_members(3, ciphersuite, provider);
    let created = create_update_path(
        provider.crypto(),
        provider.rand(),
        &tree,
        members[0].leaf_index,
        &members[0].signer,
        context(ciphersuite, 1),
        &[],
    )
    .expect("error creating update path");

    // A member with a private tree that doesn't match its leaf can't decrypt.
    let (_, other_key_pair, _) = leaf("stranger", ciphersuite, provider);
    let stranger = PrivateTree::from_leaf_key_pair(members[1].leaf_index, other_key_pair);
    let error = decrypt_update_path(
        provider.crypto(),
        ciphersuite,
        &created.tree,
        &stranger,
        members[0].leaf_index,
        &created.update_path,
        &[],
        &created
            .group_context
            .serialize()
            .expect("error serializing context"),
    )
    .expect_err("decryption should fail");
    assert_eq!(error, ApplyUpdatePathError::NoMatchingKey);
    assert_eq!(
        crate::error::ErrorCategory::kind(&error),
        crate::error::ErrorKind::Internal
    );
}
