use cgka_traits::{authentication::AuthenticationService, CgkaProvider};

use super::{
    apply_proposals::{apply_proposals, CommitOutcome},
    errors::{ProcessMessageError, ProposalValidationError, StageCommitError},
    proposal_store::resolve_committed_proposals,
    EpochTransition, GroupEpoch, GroupLifecycle, GroupState, ProcessedMessage,
    ProcessedMessageContent,
    QueuedProposal,
};
use crate::{
    ciphersuite::SignaturePublicKey,
    error::LibraryError,
    framing::{
        public_message::{ConfirmedTranscriptHashInput, InterimTranscriptHashInput},
        AuthenticatedContent, ContentType, FramedContentBody, MlsMessage, MlsMessageBody,
        PrivateMessage, PublicMessage, Sender, VerifiableAuthenticatedContent, WireFormat,
    },
    messages::proposals::Proposal,
    schedule::{psk::load_psks, CommitSecret, InitSecret, JoinerSecret, KeySchedule, PskSecret},
    treesync::{
        errors::{ApplyUpdatePathError, LeafNodeValidationError},
        node::leaf_node::{LeafNodeSource, TreePosition},
        treekem::{apply_update_path, decrypt_update_path},
    },
};

impl GroupState {
    /// Process a message of the group.
    ///
    /// Application messages are decrypted, proposals are validated and
    /// stored, and commits are validated and merged. The returned state
    /// reflects the message: for a commit it is the state of the new epoch.
    ///
    /// Application messages of past epochs are accepted as long as the
    /// secrets of that epoch are kept, handshake messages only in the
    /// current epoch.
    pub fn process_message(
        &self,
        provider: &impl CgkaProvider,
        message: MlsMessage,
    ) -> Result<(GroupState, ProcessedMessage), ProcessMessageError> {
        self.ensure_active(ProcessMessageError::GroupNotActive)?;
        match message.into_body() {
            MlsMessageBody::PublicMessage(public_message) => {
                self.process_public_message(provider, public_message)
            }
            MlsMessageBody::PrivateMessage(private_message) => {
                self.process_private_message(provider, private_message)
            }
            _ => Err(ProcessMessageError::UnsupportedWireFormat),
        }
    }

    /// Process a message that must carry a commit.
    pub fn process_commit(
        &self,
        provider: &impl CgkaProvider,
        message: MlsMessage,
    ) -> Result<(GroupState, ProcessedMessage), ProcessMessageError> {
        self.process_expected(provider, message, ContentType::Commit)
    }

    /// Process a message that must carry a proposal.
    pub fn process_proposal(
        &self,
        provider: &impl CgkaProvider,
        message: MlsMessage,
    ) -> Result<(GroupState, ProcessedMessage), ProcessMessageError> {
        self.process_expected(provider, message, ContentType::Proposal)
    }

    fn process_expected(
        &self,
        provider: &impl CgkaProvider,
        message: MlsMessage,
        expected: ContentType,
    ) -> Result<(GroupState, ProcessedMessage), ProcessMessageError> {
        let content_type = match message.body() {
            MlsMessageBody::PublicMessage(public_message) => public_message.content_type(),
            MlsMessageBody::PrivateMessage(private_message) => private_message.content_type(),
            _ => return Err(ProcessMessageError::UnsupportedWireFormat),
        };
        if content_type != expected {
            return Err(ProcessMessageError::UnexpectedContentType);
        }
        self.process_message(provider, message)
    }

    fn process_public_message(
        &self,
        provider: &impl CgkaProvider,
        public_message: PublicMessage,
    ) -> Result<(GroupState, ProcessedMessage), ProcessMessageError> {
        if public_message.content_type() == ContentType::Application {
            return Err(ProcessMessageError::UnencryptedApplicationMessage);
        }
        if !self
            .config
            .wire_format_policy()
            .incoming()
            .is_compatible(WireFormat::PublicMessage)
        {
            return Err(ProcessMessageError::IncompatibleWireFormat);
        }
        if public_message.group_id() != self.group_id() {
            return Err(ProcessMessageError::WrongGroupId);
        }
        self.check_handshake_epoch(public_message.epoch())?;

        let message_secrets = self.message_secrets_store.message_secrets();
        public_message.verify_membership(
            provider.crypto(),
            self.ciphersuite(),
            message_secrets.membership_key(),
            message_secrets.serialized_context(),
        )?;
        let verifiable_content =
            public_message.into_verifiable_content(self.group_context.serialize()?);
        self.clone().process_verifiable_content(provider, verifiable_content)
    }

    fn process_private_message(
        &self,
        provider: &impl CgkaProvider,
        private_message: PrivateMessage,
    ) -> Result<(GroupState, ProcessedMessage), ProcessMessageError> {
        let ciphersuite = self.ciphersuite();
        let handshake = private_message.content_type().is_handshake_message();
        if handshake
            && !self
                .config
                .wire_format_policy()
                .incoming()
                .is_compatible(WireFormat::PrivateMessage)
        {
            return Err(ProcessMessageError::IncompatibleWireFormat);
        }
        if private_message.group_id() != self.group_id() {
            return Err(ProcessMessageError::WrongGroupId);
        }
        let sender_ratchet_configuration = *self.config.sender_ratchet_configuration();

        let epoch = private_message.epoch();
        if epoch == self.epoch() {
            let mut state = self.clone();
            let verifiable_content = private_message.decrypt(
                provider.crypto(),
                ciphersuite,
                state.message_secrets_store.message_secrets_mut(),
                &sender_ratchet_configuration,
            )?;
            return state.process_verifiable_content(provider, verifiable_content);
        }
        if handshake || epoch > self.epoch() {
            self.check_handshake_epoch(epoch)?;
        }

        // A late application message
        log::debug!("Decrypting an application message of past epoch {}", epoch);
        let mut state = self.clone();
        let (message_secrets, past_members) = state
            .message_secrets_store
            .secrets_for_epoch_mut(epoch)
            .ok_or(ProcessMessageError::NoPastEpochData)?;
        let verifiable_content = private_message.decrypt(
            provider.crypto(),
            ciphersuite,
            message_secrets,
            &sender_ratchet_configuration,
        )?;
        let sender_index = verifiable_content
            .sender()
            .as_member()
            .ok_or(ProcessMessageError::UnknownSender)?;
        if sender_index == self.own_leaf_index() {
            return Err(ProcessMessageError::OwnMessage);
        }
        let signature_key = past_members
            .iter()
            .find(|member| member.index == sender_index)
            .map(|member| SignaturePublicKey::from(member.signature_key.as_slice()))
            .ok_or(ProcessMessageError::UnknownSender)?;
        let content = verifiable_content.verify(
            provider.crypto(),
            ciphersuite.signature_algorithm(),
            &signature_key,
        )?;
        let plaintext = match content.body() {
            FramedContentBody::Application(bytes) => bytes.as_slice().to_vec(),
            _ => return Err(ProcessMessageError::UnexpectedContentType),
        };
        let processed_message = ProcessedMessage::new(
            &content,
            ProcessedMessageContent::ApplicationMessage(plaintext),
        );
        Ok((state, processed_message))
    }

    fn check_handshake_epoch(
        &self,
        epoch: GroupEpoch,
    ) -> Result<(), ProcessMessageError> {
        if epoch < self.epoch() {
            log::error!(
                "Handshake message of epoch {} in epoch {}",
                epoch,
                self.epoch()
            );
            Err(ProcessMessageError::PastEpochHandshakeMessage)
        } else if epoch > self.epoch() {
            Err(ProcessMessageError::WrongEpoch)
        } else {
            Ok(())
        }
    }

    /// Verify the signature of content of the current epoch and dispatch it
    /// on its content type.
    fn process_verifiable_content(
        mut self,
        provider: &impl CgkaProvider,
        verifiable_content: VerifiableAuthenticatedContent,
    ) -> Result<(GroupState, ProcessedMessage), ProcessMessageError> {
        let crypto = provider.crypto();
        let ciphersuite = self.ciphersuite();
        let signature_key = match verifiable_content.sender() {
            Sender::Member(leaf_index) => {
                if *leaf_index == self.own_leaf_index() {
                    return Err(ProcessMessageError::OwnMessage);
                }
                self.tree
                    .leaf(*leaf_index)
                    .ok_or(ProcessMessageError::UnknownSender)?
                    .signature_key()
                    .clone()
            }
            Sender::NewMemberCommit => {
                if verifiable_content.wire_format() != WireFormat::PublicMessage {
                    return Err(ProcessMessageError::InvalidNewMemberMessage);
                }
                // The joiner signs with the key of the leaf in its path
                verifiable_content
                    .commit()
                    .and_then(|commit| commit.path())
                    .map(|path| path.leaf_node().signature_key().clone())
                    .ok_or(ProcessMessageError::InvalidNewMemberMessage)?
            }
        };
        let content =
            verifiable_content.verify(crypto, ciphersuite.signature_algorithm(), &signature_key)?;

        match content.body() {
            FramedContentBody::Application(bytes) => {
                let plaintext = bytes.as_slice().to_vec();
                let processed_message = ProcessedMessage::new(
                    &content,
                    ProcessedMessageContent::ApplicationMessage(plaintext),
                );
                Ok((self, processed_message))
            }
            FramedContentBody::Proposal(proposal) => {
                self.validate_received_proposal(provider, content.sender(), proposal)?;
                let queued_proposal =
                    QueuedProposal::from_authenticated_content(ciphersuite, crypto, &content)?;
                log::debug!(
                    "Storing proposal {} of {:?}",
                    queued_proposal.proposal_reference(),
                    content.sender()
                );
                self.proposal_store.add(queued_proposal.clone());
                let processed_message = ProcessedMessage::new(
                    &content,
                    ProcessedMessageContent::Proposal(Box::new(queued_proposal)),
                );
                Ok((self, processed_message))
            }
            FramedContentBody::Commit(_) => {
                let state = self.stage_commit(provider, &content)?;
                let processed_message = ProcessedMessage::new(
                    &content,
                    ProcessedMessageContent::Commit {
                        new_epoch: state.epoch(),
                    },
                );
                Ok((state, processed_message))
            }
        }
    }

    /// Checks of a single proposal that don't depend on the other proposals
    /// of the commit.
    fn validate_received_proposal(
        &self,
        provider: &impl CgkaProvider,
        sender: &Sender,
        proposal: &Proposal,
    ) -> Result<(), ProposalValidationError> {
        let ciphersuite = self.ciphersuite();
        match proposal {
            Proposal::Add(add) => add.key_package().validate(
                provider.crypto(),
                ciphersuite,
                self.config.client_config(),
            )?,
            Proposal::Update(update) => {
                let leaf_index = sender
                    .as_member()
                    .ok_or(ProposalValidationError::UpdateFromNonMember)?;
                let leaf_node = update.leaf_node();
                if leaf_node.leaf_node_source() != &LeafNodeSource::Update {
                    return Err(LeafNodeValidationError::InvalidLeafNodeSource.into());
                }
                leaf_node.verify(
                    provider.crypto(),
                    ciphersuite,
                    Some(TreePosition::new(self.group_id().clone(), leaf_index)),
                )?;
            }
            Proposal::Remove(remove) => {
                if self.tree.leaf(remove.removed()).is_none() {
                    return Err(ProposalValidationError::UnknownMember);
                }
            }
            Proposal::PreSharedKey(psk) => psk.psk().validate_in_proposal(ciphersuite)?,
            Proposal::ExternalInit(_) => {
                return Err(ProposalValidationError::ExternalInitFromMember)
            }
            Proposal::ReInit(_) | Proposal::GroupContextExtensions(_) => {}
        }
        Ok(())
    }

    /// Validate a commit of the current epoch and compute the state of the
    /// epoch it creates.
    ///
    /// If the commit removes the own leaf, the returned state stays in the
    /// current epoch and is marked as removed.
    pub(crate) fn stage_commit(
        &self,
        provider: &impl CgkaProvider,
        commit_content: &AuthenticatedContent,
    ) -> Result<GroupState, StageCommitError> {
        let crypto = provider.crypto();
        let ciphersuite = self.ciphersuite();
        let own_leaf_index = self.own_leaf_index();

        let commit = match commit_content.body() {
            FramedContentBody::Commit(commit) => commit,
            _ => return Err(LibraryError::custom("Staging content that is not a commit").into()),
        };
        let received_confirmation_tag = commit_content
            .confirmation_tag()
            .ok_or(StageCommitError::MissingConfirmationTag)?;
        let sender = *commit_content.sender();

        // The leaf of the committer's path enters the tree with the commit
        if let Some(path) = commit.path() {
            let leaf_node = path.leaf_node();
            if !provider
                .authentication_service()
                .validate_credential(leaf_node.credential(), leaf_node.signature_key().as_slice())
            {
                log::error!("Invalid credential in the update path of {:?}", sender);
                return Err(ApplyUpdatePathError::from(
                    LeafNodeValidationError::InvalidCredential,
                )
                .into());
            }
        }

        let proposals = resolve_committed_proposals(
            ciphersuite,
            crypto,
            &self.proposal_store,
            commit.proposals(),
            &sender,
        )?;
        let apply_proposals_result = apply_proposals(
            provider,
            &self.group_context,
            &self.tree,
            &sender,
            &proposals,
            Some(own_leaf_index),
            self.config.client_config(),
        )?;

        if apply_proposals_result.path_required && commit.path().is_none() {
            return Err(StageCommitError::RequiredPathNotFound);
        }

        if apply_proposals_result.self_removed {
            log::info!(
                "Removed from group {:x?} in epoch {}",
                self.group_id().as_slice(),
                self.epoch()
            );
            let mut removed = self.clone();
            removed.lifecycle = GroupLifecycle::RemovedFromGroup;
            removed.proposal_store.empty();
            removed.pending_update_key_pairs.clear();
            return Ok(removed);
        }

        // Committed own updates come with new leaf keys
        let mut private_tree = self.private_tree.clone();
        for queued_proposal in &proposals {
            if let Proposal::Update(update) = queued_proposal.proposal() {
                if queued_proposal.sender().as_member() == Some(own_leaf_index) {
                    let encryption_key = update.leaf_node().encryption_key();
                    let key_pair = self
                        .pending_update_key_pairs
                        .iter()
                        .find(|key_pair| key_pair.public == encryption_key.as_slice())
                        .ok_or_else(|| LibraryError::custom("Missing key of own update"))?;
                    private_tree.set_leaf_key_pair(key_pair.clone());
                }
            }
        }

        let mut tree = apply_proposals_result.tree.clone();
        let (committer, external_init_secret) = match (&sender, &apply_proposals_result.outcome)
        {
            (Sender::Member(leaf_index), _) => (*leaf_index, None),
            (Sender::NewMemberCommit, CommitOutcome::ExternalCommit { kem_output }) => {
                let path = commit
                    .path()
                    .ok_or(StageCommitError::RequiredPathNotFound)?;
                // A resync may only remove the joiner's old leaf
                for queued_proposal in &proposals {
                    if let Proposal::Remove(remove) = queued_proposal.proposal() {
                        let removed_leaf = self
                            .tree
                            .leaf(remove.removed())
                            .ok_or(StageCommitError::InvalidResyncRemoval)?;
                        if removed_leaf.credential() != path.leaf_node().credential() {
                            return Err(StageCommitError::InvalidResyncRemoval);
                        }
                    }
                }
                let joiner_leaf_index = tree.add_leaf(path.leaf_node().clone())?;
                let external_key_pair = self
                    .group_epoch_secrets
                    .external_secret()
                    .derive_external_keypair(crypto, ciphersuite)
                    .map_err(LibraryError::unexpected_crypto_error)?;
                let init_secret = InitSecret::from_kem_output(
                    crypto,
                    ciphersuite,
                    &external_key_pair.private,
                    kem_output,
                )
                .map_err(LibraryError::unexpected_crypto_error)?;
                log::debug!("External commit of leaf {}", joiner_leaf_index);
                (joiner_leaf_index, Some(init_secret))
            }
            _ => {
                return Err(
                    LibraryError::custom("External commit without ExternalInit outcome").into(),
                )
            }
        };

        let extensions = apply_proposals_result
            .new_extensions()
            .cloned()
            .unwrap_or_else(|| self.group_context.extensions().clone());
        let mut provisional_group_context =
            self.group_context.provisional(Vec::new(), extensions)?;

        let (new_tree, private_tree, commit_secret) = match commit.path() {
            Some(path) => {
                let new_tree = apply_update_path(
                    crypto,
                    ciphersuite,
                    &tree,
                    committer,
                    path,
                    self.group_id(),
                )?;
                provisional_group_context.set_tree_hash(new_tree.tree_hash(crypto, ciphersuite)?);
                // The path secrets are encrypted to the context before the
                // confirmed transcript hash is updated
                let serialized_provisional_group_context = provisional_group_context.serialize()?;
                let (private_tree, commit_secret) = decrypt_update_path(
                    crypto,
                    ciphersuite,
                    &new_tree,
                    &private_tree,
                    committer,
                    path,
                    &apply_proposals_result.exclusion_list(),
                    &serialized_provisional_group_context,
                )?;
                (new_tree, private_tree, commit_secret)
            }
            None => {
                provisional_group_context.set_tree_hash(tree.tree_hash(crypto, ciphersuite)?);
                private_tree.prune(&tree);
                (tree, private_tree, CommitSecret::zero_secret(ciphersuite))
            }
        };

        // Calculate the confirmed transcript hash
        let confirmed_transcript_hash = ConfirmedTranscriptHashInput::try_from(commit_content)
            .map_err(LibraryError::custom)?
            .calculate_confirmed_transcript_hash(
                crypto,
                ciphersuite,
                &self.interim_transcript_hash,
            )?;
        provisional_group_context.set_confirmed_transcript_hash(confirmed_transcript_hash.clone());
        let serialized_provisional_group_context = provisional_group_context.serialize()?;

        // Prepare the PreSharedKeys
        let psk_secret = {
            let psks = load_psks(
                provider.psk_index(),
                &self.resumption_psk_store,
                self.group_id(),
                &apply_proposals_result.psks,
            )?;
            PskSecret::new(crypto, ciphersuite, psks)?
        };

        // Create key schedule
        let init_secret = external_init_secret
            .as_ref()
            .unwrap_or_else(|| self.group_epoch_secrets.init_secret());
        let joiner_secret = JoinerSecret::new(
            crypto,
            ciphersuite,
            commit_secret,
            init_secret,
            &serialized_provisional_group_context,
        )?;
        let mut key_schedule = KeySchedule::init(ciphersuite, crypto, &joiner_secret, psk_secret)?;
        key_schedule.add_context(crypto, &serialized_provisional_group_context)?;
        let epoch_secrets = key_schedule.epoch_secrets(crypto)?;

        // Verify the confirmation tag
        let own_confirmation_tag = epoch_secrets
            .confirmation_key()
            .tag(crypto, ciphersuite, &confirmed_transcript_hash)
            .map_err(LibraryError::unexpected_crypto_error)?;
        if &own_confirmation_tag != received_confirmation_tag {
            log::error!("Confirmation tag mismatch");
            log_crypto!(trace, "  Got:      {:x?}", received_confirmation_tag);
            log_crypto!(trace, "  Expected: {:x?}", own_confirmation_tag);
            return Err(StageCommitError::ConfirmationTagMismatch);
        }

        let interim_transcript_hash = InterimTranscriptHashInput::from(received_confirmation_tag)
            .calculate_interim_transcript_hash(crypto, ciphersuite, &confirmed_transcript_hash)?;

        let reinit = match &apply_proposals_result.outcome {
            CommitOutcome::ReInit(reinit) => Some(reinit.clone()),
            _ => None,
        };
        Ok(self.clone().into_next_epoch(EpochTransition {
            group_context: provisional_group_context,
            tree: new_tree,
            private_tree,
            epoch_secrets,
            confirmation_tag: own_confirmation_tag,
            interim_transcript_hash,
            reinit,
        })?)
    }
}
