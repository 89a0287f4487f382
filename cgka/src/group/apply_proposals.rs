//! Validation and application of the proposals covered by a commit.
//!
//! [`apply_proposals`] is used by both sides of a commit: the committer runs it
//! before creating the commit and every receiver runs it on the proposals the
//! commit resolves to. Both end up with the same tree and the same outcome.

use std::collections::HashSet;

use cgka_traits::{authentication::AuthenticationService, CgkaProvider};

use super::{errors::ProposalValidationError, group_context::GroupContext, QueuedProposal};
use crate::{
    binary_tree::LeafNodeIndex,
    config::ClientConfig,
    extensions::Extensions,
    framing::Sender,
    key_packages::KeyPackage,
    messages::proposals::{
        AddProposal, GroupContextExtensionProposal, PreSharedKeyProposal, Proposal,
        ReInitProposal, RemoveProposal, UpdateProposal,
    },
    schedule::psk::{check_for_duplicates, PreSharedKeyId},
    treesync::{
        errors::LeafNodeValidationError,
        node::leaf_node::{LeafNodeSource, TreePosition},
        RatchetTree,
    },
};

/// What a commit does to the group besides changing the tree.
#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    /// A regular commit of a member.
    MemberCommit {
        /// The leaves filled by Add proposals, with the key packages they
        /// were filled from.
        added_leaves: Vec<(LeafNodeIndex, KeyPackage)>,
        /// The new group context extensions, if the commit changes them.
        extensions: Option<Extensions>,
    },
    /// An external commit. The KEM output lets the members derive the init
    /// secret the joiner chose.
    ExternalCommit {
        kem_output: Vec<u8>,
    },
    /// A commit of a single ReInit proposal. The group is suspended after it.
    ReInit(ReInitProposal),
}

/// The result of [`apply_proposals`].
#[derive(Debug, Clone)]
pub struct ApplyProposalsResult {
    /// The tree after all updates, removes and adds.
    pub tree: RatchetTree,
    pub outcome: CommitOutcome,
    /// `true` if the commit must carry an update path.
    pub path_required: bool,
    /// `true` if the own leaf was removed.
    pub self_removed: bool,
    /// The PSKs that go into the key schedule of the next epoch.
    pub psks: Vec<PreSharedKeyId>,
}

impl ApplyProposalsResult {
    /// The leaves that must not receive path secrets in the update path.
    pub(crate) fn exclusion_list(&self) -> Vec<LeafNodeIndex> {
        match &self.outcome {
            CommitOutcome::MemberCommit { added_leaves, .. } => {
                added_leaves.iter().map(|(index, _)| *index).collect()
            }
            _ => Vec::new(),
        }
    }

    /// The group context extensions of the next epoch, or `None` if they
    /// don't change.
    pub(crate) fn new_extensions(&self) -> Option<&Extensions> {
        match &self.outcome {
            CommitOutcome::MemberCommit { extensions, .. } => extensions.as_ref(),
            _ => None,
        }
    }
}

/// Validate `proposals` as a whole and apply them to a copy of `tree`.
///
/// The proposals are applied in the order updates, removes, adds. PSK and
/// group context extensions proposals don't touch the tree; they show up in
/// the returned [`ApplyProposalsResult`].
///
/// `own_leaf_index` is the leaf of the caller, if it is in the tree, and is
/// only used to find out whether the caller gets removed.
pub fn apply_proposals(
    provider: &impl CgkaProvider,
    group_context: &GroupContext,
    tree: &RatchetTree,
    committer: &Sender,
    proposals: &[QueuedProposal],
    own_leaf_index: Option<LeafNodeIndex>,
    client_config: &ClientConfig,
) -> Result<ApplyProposalsResult, ProposalValidationError> {
    log::debug!("Applying {} proposals", proposals.len());
    let ciphersuite = group_context.ciphersuite();
    let external_commit = matches!(committer, Sender::NewMemberCommit);

    let mut updates: Vec<(&Sender, &UpdateProposal)> = Vec::new();
    let mut removes: Vec<&RemoveProposal> = Vec::new();
    let mut adds: Vec<&AddProposal> = Vec::new();
    let mut psks: Vec<&PreSharedKeyProposal> = Vec::new();
    let mut reinits: Vec<&ReInitProposal> = Vec::new();
    let mut external_inits = Vec::new();
    let mut context_extensions: Vec<&GroupContextExtensionProposal> = Vec::new();

    for queued_proposal in proposals {
        match queued_proposal.proposal() {
            Proposal::Add(add) => adds.push(add),
            Proposal::Update(update) => updates.push((queued_proposal.sender(), update)),
            Proposal::Remove(remove) => removes.push(remove),
            Proposal::PreSharedKey(psk) => psks.push(psk),
            Proposal::ReInit(reinit) => reinits.push(reinit),
            Proposal::ExternalInit(external_init) => external_inits.push(external_init),
            Proposal::GroupContextExtensions(extensions) => context_extensions.push(extensions),
        }
    }

    // Check the proposal list as a whole
    if external_inits.len() > 1 {
        return Err(ProposalValidationError::MultipleExternalInit);
    }
    if external_commit {
        if external_inits.is_empty() {
            return Err(ProposalValidationError::MissingExternalInit);
        }
        if !updates.is_empty()
            || !adds.is_empty()
            || !reinits.is_empty()
            || !context_extensions.is_empty()
        {
            return Err(ProposalValidationError::InvalidExternalCommitProposal);
        }
        if removes.len() > 1 {
            return Err(ProposalValidationError::MultipleResyncRemovals);
        }
    } else if !external_inits.is_empty() {
        return Err(ProposalValidationError::ExternalInitFromMember);
    }
    if !reinits.is_empty() && proposals.len() > 1 {
        return Err(ProposalValidationError::ReInitNotAlone);
    }
    if context_extensions.len() > 1 {
        return Err(ProposalValidationError::MultipleGroupContextExtensions);
    }

    if let Some(reinit) = reinits.first() {
        log::debug!("Committing a ReInit proposal");
        return Ok(ApplyProposalsResult {
            tree: tree.clone(),
            outcome: CommitOutcome::ReInit((*reinit).clone()),
            path_required: false,
            self_removed: false,
            psks: Vec::new(),
        });
    }

    // Collect the removed leaves first, updates of removed leaves are invalid
    let mut removed_leaves = HashSet::new();
    for remove in &removes {
        let removed = remove.removed();
        if tree.leaf(removed).is_none() {
            return Err(ProposalValidationError::UnknownMember);
        }
        if !removed_leaves.insert(removed) {
            return Err(ProposalValidationError::DuplicateRemove);
        }
        if !external_commit && committer.as_member() == Some(removed) {
            return Err(ProposalValidationError::SelfRemoval);
        }
    }

    let new_extensions = context_extensions
        .first()
        .map(|proposal| proposal.extensions().clone());
    let extensions = new_extensions
        .as_ref()
        .unwrap_or_else(|| group_context.extensions());

    let mut new_tree = tree.clone();

    // Process updates first
    let mut updated_leaves = HashSet::new();
    for (sender, update) in &updates {
        log::debug!("Applying update proposal");
        let leaf_index = sender
            .as_member()
            .ok_or(ProposalValidationError::UpdateFromNonMember)?;
        if committer.as_member() == Some(leaf_index) {
            return Err(ProposalValidationError::CommitterUpdate);
        }
        if !updated_leaves.insert(leaf_index) {
            return Err(ProposalValidationError::DuplicateUpdate);
        }
        if removed_leaves.contains(&leaf_index) {
            return Err(ProposalValidationError::UpdateOfRemovedLeaf);
        }
        if tree.leaf(leaf_index).is_none() {
            return Err(ProposalValidationError::UnknownMember);
        }
        let leaf_node = update.leaf_node();
        if leaf_node.leaf_node_source() != &LeafNodeSource::Update {
            return Err(LeafNodeValidationError::InvalidLeafNodeSource.into());
        }
        leaf_node.validate_locally()?;
        leaf_node.verify(
            provider.crypto(),
            ciphersuite,
            Some(TreePosition::new(
                group_context.group_id().clone(),
                leaf_index,
            )),
        )?;
        if !provider
            .authentication_service()
            .validate_credential(leaf_node.credential(), leaf_node.signature_key().as_slice())
        {
            return Err(LeafNodeValidationError::InvalidCredential.into());
        }
        new_tree.update_leaf(leaf_index, leaf_node.clone())?;
    }

    // Process removes
    for remove in &removes {
        log::debug!("Applying remove proposal for leaf {}", remove.removed());
        new_tree.remove_leaf(remove.removed())?;
    }

    // Process adds
    let mut added_leaves: Vec<(LeafNodeIndex, KeyPackage)> = Vec::new();
    for add in &adds {
        log::debug!("Applying add proposal");
        let key_package = add.key_package();
        key_package.validate(provider.crypto(), ciphersuite, client_config)?;
        if added_leaves
            .iter()
            .any(|(_, other)| client_config.key_packages_equal(other, key_package))
        {
            return Err(ProposalValidationError::DuplicateSignatureKey);
        }
        let leaf_node = key_package.leaf_node();
        if !provider
            .authentication_service()
            .validate_credential(leaf_node.credential(), leaf_node.signature_key().as_slice())
        {
            return Err(LeafNodeValidationError::InvalidCredential.into());
        }
        // Every member must be able to verify every other member's credential
        for (_, member) in new_tree.leaves() {
            if !member
                .capabilities()
                .supports_credential(leaf_node.credential().credential_type())
            {
                return Err(LeafNodeValidationError::LeafNodeCredentialNotSupportedByMember.into());
            }
            if !leaf_node
                .capabilities()
                .supports_credential(member.credential().credential_type())
            {
                return Err(LeafNodeValidationError::MemberCredentialNotSupportedByLeafNode.into());
            }
        }
        if !leaf_node.capabilities().supports_extensions(extensions) {
            return Err(LeafNodeValidationError::UnsupportedExtensions.into());
        }
        if let Some(required_capabilities) = extensions.required_capabilities() {
            leaf_node
                .capabilities()
                .supports_required_capabilities(required_capabilities)?;
        }
        let leaf_index = new_tree.add_leaf(leaf_node.clone())?;
        added_leaves.push((leaf_index, key_package.clone()));
    }

    // New group context extensions must be supported by everyone
    if new_extensions.is_some() {
        for (_, member) in new_tree.leaves() {
            if !member.capabilities().supports_extensions(extensions) {
                return Err(LeafNodeValidationError::UnsupportedExtensions.into());
            }
            if let Some(required_capabilities) = extensions.required_capabilities() {
                member
                    .capabilities()
                    .supports_required_capabilities(required_capabilities)?;
            }
        }
    }

    // Signature and encryption keys must stay unique in the tree
    let mut signature_keys = HashSet::new();
    let mut encryption_keys = HashSet::new();
    for (_, leaf_node) in new_tree.leaves() {
        if !signature_keys.insert(leaf_node.signature_key().as_slice().to_vec()) {
            return Err(ProposalValidationError::DuplicateSignatureKey);
        }
        if !encryption_keys.insert(leaf_node.encryption_key().as_slice().to_vec()) {
            return Err(ProposalValidationError::DuplicateEncryptionKey);
        }
    }

    // Process PSKs
    let psks: Vec<PreSharedKeyId> = psks
        .iter()
        .map(|proposal| proposal.psk().clone())
        .collect();
    for psk in &psks {
        psk.validate_in_proposal(ciphersuite)?;
    }
    check_for_duplicates(&psks)?;

    let self_removed = own_leaf_index
        .map(|own| removed_leaves.contains(&own))
        .unwrap_or(false);

    let path_required =
        external_commit || proposals.is_empty() || updates.len() > 1 || removes.len() > 1;

    let outcome = match external_inits.first() {
        Some(external_init) => CommitOutcome::ExternalCommit {
            kem_output: external_init.kem_output().to_vec(),
        },
        None => CommitOutcome::MemberCommit {
            added_leaves,
            extensions: new_extensions,
        },
    };

    Ok(ApplyProposalsResult {
        tree: new_tree,
        outcome,
        path_required,
        self_removed,
        psks,
    })
}
