use cgka_traits::CgkaProvider;

use super::{
    errors::ExternalCommitError, past_secrets::MessageSecretsStore, proposal_store::ProposalStore,
    GroupLifecycle, GroupState, QueuedProposal,
};
use crate::{
    binary_tree::LeafNodeIndex,
    config::GroupConfig,
    credentials::{CredentialWithKey, SignatureKeyPair},
    error::LibraryError,
    extensions::Extensions,
    framing::{
        public_message::{ConfirmedTranscriptHashInput, InterimTranscriptHashInput},
        AuthenticatedContent, MlsMessage, PublicMessage, Sender, WireFormat,
    },
    key_packages::Lifetime,
    messages::{
        group_info::GroupInfo,
        proposals::{ExternalInitProposal, Proposal, RemoveProposal},
        Commit,
    },
    schedule::{InitSecret, JoinerSecret, KeySchedule, PskSecret, ResumptionPskStore},
    treesync::{
        errors::{LeafNodeValidationError, RatchetTreeError},
        node::leaf_node::{LeafNode, LeafNodeSource, NewLeafNodeParams, TreeInfoTbs},
        treekem::create_update_path,
        RatchetTree,
    },
};

impl GroupState {
    /// Join a group with an external commit.
    ///
    /// The commit is built from the group info alone and is returned as a
    /// [`PublicMessage`] for the members of the group. If `resync_leaf` is
    /// set, the commit also removes that leaf, which must carry the same
    /// credential as `credential_with_key`.
    #[allow(clippy::too_many_arguments)]
    pub fn join_group_external(
        provider: &impl CgkaProvider,
        config: GroupConfig,
        group_info: GroupInfo,
        ratchet_tree: Option<RatchetTree>,
        credential_with_key: CredentialWithKey,
        signer: SignatureKeyPair,
        resync_leaf: Option<LeafNodeIndex>,
        authenticated_data: &[u8],
    ) -> Result<(Self, MlsMessage), ExternalCommitError> {
        let crypto = provider.crypto();
        let group_context = group_info.group_context().clone();
        let ciphersuite = group_context.ciphersuite();
        log::debug!(
            "Joining group {:x?} with an external commit",
            group_context.group_id().as_slice()
        );
        if ciphersuite != config.ciphersuite()
            || ciphersuite.signature_algorithm() != signer.signature_scheme()
        {
            return Err(ExternalCommitError::CiphersuiteMismatch);
        }

        // Build and verify the ratchet tree
        let mut tree = match group_info.extensions().ratchet_tree() {
            Some(extension) => RatchetTree::from_nodes(extension.nodes().to_vec())?,
            None => ratchet_tree.ok_or(ExternalCommitError::MissingRatchetTree)?,
        };
        tree.validate(crypto, ciphersuite, group_context.group_id())?;
        if tree.tree_hash(crypto, ciphersuite)? != group_context.tree_hash() {
            log::error!("Tree hash of the ratchet tree doesn't match the group context");
            return Err(RatchetTreeError::TreeHashMismatch.into());
        }
        let signer_leaf = tree
            .leaf(group_info.signer())
            .ok_or(ExternalCommitError::UnknownGroupInfoSigner)?;
        group_info
            .verify(
                crypto,
                ciphersuite.signature_algorithm(),
                signer_leaf.signature_key(),
            )
            .map_err(|_| ExternalCommitError::InvalidGroupInfoSignature)?;

        let external_pub = group_info
            .extensions()
            .external_pub()
            .ok_or(ExternalCommitError::MissingExternalPub)?;
        let (init_secret, kem_output) =
            InitSecret::from_group_context(crypto, ciphersuite, external_pub.external_pub())
                .map_err(LibraryError::unexpected_crypto_error)?;

        let mut proposals = vec![Proposal::ExternalInit(ExternalInitProposal::from(
            kem_output,
        ))];
        if let Some(resync_leaf) = resync_leaf {
            let old_leaf = tree
                .leaf(resync_leaf)
                .ok_or(ExternalCommitError::InvalidResyncLeaf)?;
            if old_leaf.credential() != &credential_with_key.credential {
                return Err(ExternalCommitError::InvalidResyncLeaf);
            }
            log::debug!("Resyncing leaf {}", resync_leaf);
            tree.remove_leaf(resync_leaf)?;
            proposals.push(Proposal::Remove(RemoveProposal {
                removed: resync_leaf,
            }));
        }

        // Create and place the own leaf
        let capabilities = config.client_config().capabilities().clone();
        if !capabilities.supports_extensions(group_context.extensions()) {
            return Err(LeafNodeValidationError::UnsupportedExtensions.into());
        }
        if let Some(required_capabilities) = group_context.required_capabilities() {
            capabilities.supports_required_capabilities(required_capabilities)?;
        }
        let (leaf_node, _) = LeafNode::new(
            crypto,
            provider.rand(),
            &signer,
            NewLeafNodeParams {
                ciphersuite,
                credential_with_key,
                leaf_node_source: LeafNodeSource::KeyPackage(Lifetime::default()),
                capabilities,
                extensions: Extensions::empty(),
                tree_info_tbs: TreeInfoTbs::KeyPackage,
            },
        )?;
        let own_leaf_index = tree.add_leaf(leaf_node)?;

        let mut provisional_group_context =
            group_context.provisional(Vec::new(), group_context.extensions().clone())?;
        let created_path = create_update_path(
            crypto,
            provider.rand(),
            &tree,
            own_leaf_index,
            &signer,
            provisional_group_context.clone(),
            &[],
        )?;
        provisional_group_context.set_tree_hash(created_path.tree.tree_hash(crypto, ciphersuite)?);

        let sender = Sender::NewMemberCommit;
        let mut queued_proposals = Vec::with_capacity(proposals.len());
        for proposal in proposals {
            queued_proposals.push(QueuedProposal::from_proposal_and_sender(
                ciphersuite,
                crypto,
                proposal,
                &sender,
            )?);
        }
        let commit = Commit {
            proposals: queued_proposals
                .iter()
                .map(QueuedProposal::to_proposal_or_ref)
                .collect(),
            path: Some(created_path.update_path.clone()),
        };
        let mut commit_content = AuthenticatedContent::commit(
            WireFormat::PublicMessage,
            sender,
            authenticated_data,
            commit,
            &signer,
            &group_context,
            crypto,
        )?;

        // The interim transcript hash of the current epoch follows from the
        // group info
        let interim_transcript_hash = InterimTranscriptHashInput::from(
            group_info.confirmation_tag(),
        )
        .calculate_interim_transcript_hash(
            crypto,
            ciphersuite,
            group_context.confirmed_transcript_hash(),
        )?;
        let confirmed_transcript_hash = ConfirmedTranscriptHashInput::try_from(&commit_content)
            .map_err(LibraryError::custom)?
            .calculate_confirmed_transcript_hash(crypto, ciphersuite, &interim_transcript_hash)?;
        provisional_group_context.set_confirmed_transcript_hash(confirmed_transcript_hash.clone());
        let serialized_provisional_group_context = provisional_group_context.serialize()?;

        // Create key schedule
        let joiner_secret = JoinerSecret::new(
            crypto,
            ciphersuite,
            created_path.commit_secret.clone(),
            &init_secret,
            &serialized_provisional_group_context,
        )?;
        let mut key_schedule = KeySchedule::init(
            ciphersuite,
            crypto,
            &joiner_secret,
            PskSecret::zero(ciphersuite),
        )?;
        key_schedule.add_context(crypto, &serialized_provisional_group_context)?;
        let epoch_secrets = key_schedule.epoch_secrets(crypto)?;

        let confirmation_tag = epoch_secrets
            .confirmation_key()
            .tag(crypto, ciphersuite, &confirmed_transcript_hash)
            .map_err(LibraryError::unexpected_crypto_error)?;
        commit_content.set_confirmation_tag(confirmation_tag.clone());
        let interim_transcript_hash = InterimTranscriptHashInput::from(&confirmation_tag)
            .calculate_interim_transcript_hash(crypto, ciphersuite, &confirmed_transcript_hash)?;

        let (group_epoch_secrets, message_secrets) = epoch_secrets.split_secrets(
            serialized_provisional_group_context,
            created_path.tree.size(),
            own_leaf_index,
        );
        let mut resumption_psk_store = ResumptionPskStore::new(config.max_resumption_psks());
        resumption_psk_store.add(
            provisional_group_context.epoch(),
            group_epoch_secrets.resumption_psk().clone(),
        );

        // External commits carry no membership tag
        let commit_message = MlsMessage::from(PublicMessage::from(commit_content));

        log::debug!(
            "Joined group {:x?} in epoch {} at leaf {}",
            provisional_group_context.group_id().as_slice(),
            provisional_group_context.epoch(),
            own_leaf_index
        );
        let state = GroupState {
            message_secrets_store: MessageSecretsStore::new_with_secret(
                config.max_past_epochs(),
                message_secrets,
            ),
            config,
            group_context: provisional_group_context,
            tree: created_path.tree,
            private_tree: created_path.private_tree,
            signer,
            group_epoch_secrets,
            interim_transcript_hash,
            confirmation_tag,
            proposal_store: ProposalStore::new(),
            resumption_psk_store,
            pending_update_key_pairs: Vec::new(),
            lifecycle: GroupLifecycle::Active,
        };
        Ok((state, commit_message))
    }
}
