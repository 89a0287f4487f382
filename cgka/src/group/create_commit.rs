use cgka_traits::CgkaProvider;
use tls_codec::Serialize as TlsSerializeTrait;

use std::collections::HashSet;

use super::{
    apply_proposals::{apply_proposals, CommitOutcome},
    errors::{CreateCommitError, ProposalValidationError},
    CommitParams, CreateCommitResult, EpochTransition, GroupState, QueuedProposal,
};
use crate::{
    error::LibraryError,
    framing::{
        public_message::{ConfirmedTranscriptHashInput, InterimTranscriptHashInput},
        AuthenticatedContent, MlsMessage, Sender,
    },
    messages::{proposals::Proposal, Commit, EncryptedGroupSecrets, GroupSecrets, Welcome},
    schedule::{psk::load_psks, CommitSecret, JoinerSecret, KeySchedule, PskSecret},
    treesync::treekem::create_update_path,
};

impl GroupState {
    /// The stored proposals `committer` can put into a commit. Proposals that
    /// would make the whole commit invalid are skipped. The flag is set if an
    /// own Update was skipped; the update path of the commit replaces it.
    fn committable_proposals(&self, committer: &Sender) -> (Vec<QueuedProposal>, bool) {
        let own_leaf_index = self.own_leaf_index();
        let removed_leaves: HashSet<_> = self
            .proposal_store
            .proposals()
            .filter_map(|queued_proposal| match queued_proposal.proposal() {
                Proposal::Remove(remove) if remove.removed() != own_leaf_index => {
                    Some(remove.removed())
                }
                _ => None,
            })
            .collect();

        let mut own_update_dropped = false;
        let mut committed_removes = HashSet::new();
        let mut updated_leaves = HashSet::new();
        let mut has_context_extensions = false;
        let mut proposals = Vec::new();
        for queued_proposal in self.proposal_store.proposals() {
            let reference = queued_proposal.proposal_reference();
            match queued_proposal.proposal() {
                Proposal::Update(_) if queued_proposal.sender() == committer => {
                    own_update_dropped = true;
                    continue;
                }
                Proposal::Update(_) => {
                    let leaf_index = match queued_proposal.sender().as_member() {
                        Some(leaf_index) => leaf_index,
                        None => {
                            log::warn!("Skipping update {} of a non-member", reference);
                            continue;
                        }
                    };
                    if removed_leaves.contains(&leaf_index) {
                        log::warn!("Skipping update {} of removed leaf {}", reference, leaf_index);
                        continue;
                    }
                    if !updated_leaves.insert(leaf_index) {
                        log::warn!("Skipping second update {} of leaf {}", reference, leaf_index);
                        continue;
                    }
                }
                Proposal::Remove(remove) => {
                    let removed = remove.removed();
                    if removed == own_leaf_index {
                        log::warn!("Skipping remove {} of the committer", reference);
                        continue;
                    }
                    if self.tree.leaf(removed).is_none() {
                        log::warn!("Skipping remove {} of blank leaf {}", reference, removed);
                        continue;
                    }
                    if !committed_removes.insert(removed) {
                        log::warn!("Skipping second remove {} of leaf {}", reference, removed);
                        continue;
                    }
                }
                Proposal::GroupContextExtensions(_) => {
                    if has_context_extensions {
                        log::warn!("Skipping second group context extensions {}", reference);
                        continue;
                    }
                    has_context_extensions = true;
                }
                _ => {}
            }
            proposals.push(queued_proposal.clone());
        }
        (proposals, own_update_dropped)
    }

    /// Commit the pending proposals of the epoch together with the inline
    /// proposals in `params`.
    ///
    /// The returned state is the committer's state in the new epoch. Own
    /// Update proposals can't be committed by the committer; they are
    /// dropped and replaced by an update path. Stored proposals the committer
    /// can't commit, such as a Remove of the committer, stay out of the commit
    /// with a warning.
    pub fn create_commit(
        &self,
        provider: &impl CgkaProvider,
        params: CommitParams,
    ) -> Result<CreateCommitResult, CreateCommitError> {
        self.ensure_active(CreateCommitError::GroupNotActive)?;
        let ciphersuite = self.ciphersuite();
        let crypto = provider.crypto();
        let own_leaf_index = self.own_leaf_index();
        let sender = Sender::build_member(own_leaf_index);

        let (mut proposals, own_update_dropped) = self.committable_proposals(&sender);
        for proposal in params.inline_proposals {
            proposals.push(QueuedProposal::from_proposal_and_sender(
                ciphersuite,
                crypto,
                proposal,
                &sender,
            )?);
        }

        let apply_proposals_result = apply_proposals(
            provider,
            &self.group_context,
            &self.tree,
            &sender,
            &proposals,
            Some(own_leaf_index),
            self.config.client_config(),
        )?;
        if apply_proposals_result.self_removed {
            return Err(ProposalValidationError::SelfRemoval.into());
        }
        let path_required = apply_proposals_result.path_required
            || own_update_dropped
            || params.force_self_update;

        let extensions = apply_proposals_result
            .new_extensions()
            .cloned()
            .unwrap_or_else(|| self.group_context.extensions().clone());
        let exclusion_list = apply_proposals_result.exclusion_list();
        let mut provisional_group_context =
            self.group_context.provisional(Vec::new(), extensions)?;

        let (new_tree, update_path, commit_secret, private_tree, created_path) = if path_required
        {
            log::debug!("Creating an update path for the commit");
            let created_path = create_update_path(
                crypto,
                provider.rand(),
                &apply_proposals_result.tree,
                own_leaf_index,
                &self.signer,
                provisional_group_context.clone(),
                &exclusion_list,
            )?;
            (
                created_path.tree.clone(),
                Some(created_path.update_path.clone()),
                created_path.commit_secret.clone(),
                created_path.private_tree.clone(),
                Some(created_path),
            )
        } else {
            let mut private_tree = self.private_tree.clone();
            private_tree.prune(&apply_proposals_result.tree);
            (
                apply_proposals_result.tree.clone(),
                None,
                CommitSecret::zero_secret(ciphersuite),
                private_tree,
                None,
            )
        };
        provisional_group_context.set_tree_hash(new_tree.tree_hash(crypto, ciphersuite)?);

        let commit = Commit {
            proposals: proposals
                .iter()
                .map(QueuedProposal::to_proposal_or_ref)
                .collect(),
            path: update_path,
        };

        // The commit is signed in the current epoch
        let mut commit_content = AuthenticatedContent::commit(
            self.outgoing_wire_format(),
            sender,
            &params.authenticated_data,
            commit,
            &self.signer,
            &self.group_context,
            crypto,
        )?;

        // Calculate the confirmed transcript hash
        let confirmed_transcript_hash = ConfirmedTranscriptHashInput::try_from(&commit_content)
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
        let joiner_secret = JoinerSecret::new(
            crypto,
            ciphersuite,
            commit_secret,
            self.group_epoch_secrets.init_secret(),
            &serialized_provisional_group_context,
        )?;
        let mut key_schedule = KeySchedule::init(ciphersuite, crypto, &joiner_secret, psk_secret)?;
        let welcome_secret = key_schedule.welcome(crypto)?;
        key_schedule.add_context(crypto, &serialized_provisional_group_context)?;
        let epoch_secrets = key_schedule.epoch_secrets(crypto)?;

        // Calculate the confirmation tag
        let confirmation_tag = epoch_secrets
            .confirmation_key()
            .tag(crypto, ciphersuite, &confirmed_transcript_hash)
            .map_err(LibraryError::unexpected_crypto_error)?;
        commit_content.set_confirmation_tag(confirmation_tag.clone());

        let interim_transcript_hash = InterimTranscriptHashInput::from(&confirmation_tag)
            .calculate_interim_transcript_hash(crypto, ciphersuite, &confirmed_transcript_hash)?;

        // Frame the commit before the secrets of the epoch are replaced
        let mut state = self.clone();
        let commit_message = state.frame_handshake(provider, commit_content)?;

        let reinit = match &apply_proposals_result.outcome {
            CommitOutcome::ReInit(reinit) => Some(reinit.clone()),
            _ => None,
        };
        let state = state.into_next_epoch(EpochTransition {
            group_context: provisional_group_context,
            tree: new_tree,
            private_tree,
            epoch_secrets,
            confirmation_tag,
            interim_transcript_hash,
            reinit,
        })?;

        // Create the Welcome for the new members
        let welcome = match &apply_proposals_result.outcome {
            CommitOutcome::MemberCommit { added_leaves, .. } if !added_leaves.is_empty() => {
                log::debug!("Creating a Welcome for {} new members", added_leaves.len());
                let group_info = state.group_info(
                    crypto,
                    state.config.use_ratchet_tree_extension(),
                    state.config.publish_external_pub(),
                )?;
                let group_info_bytes = group_info
                    .tls_serialize_detached()
                    .map_err(LibraryError::missing_bound_check)?;
                let (welcome_key, welcome_nonce) = welcome_secret
                    .derive_welcome_key_nonce(crypto)
                    .map_err(LibraryError::unexpected_crypto_error)?;
                let encrypted_group_info = welcome_key
                    .aead_seal(crypto, &group_info_bytes, &[], &welcome_nonce)
                    .map_err(LibraryError::unexpected_crypto_error)?;

                let mut secrets = Vec::with_capacity(added_leaves.len());
                for (leaf_index, key_package) in added_leaves {
                    let path_secret = match &created_path {
                        Some(created_path) => {
                            created_path.path_secret_for(own_leaf_index, *leaf_index)?
                        }
                        None => None,
                    };
                    let group_secrets = GroupSecrets {
                        joiner_secret: joiner_secret.clone(),
                        path_secret,
                        psks: apply_proposals_result.psks.clone(),
                    };
                    let encrypted_group_secrets = group_secrets.encrypt(
                        crypto,
                        ciphersuite,
                        key_package.hpke_init_key().as_slice(),
                        &encrypted_group_info,
                    )?;
                    secrets.push(EncryptedGroupSecrets::new(
                        key_package.hash_ref(crypto)?,
                        encrypted_group_secrets,
                    ));
                }
                Some(MlsMessage::from(Welcome::new(
                    ciphersuite,
                    secrets,
                    encrypted_group_info,
                )))
            }
            _ => None,
        };

        let group_info = if state.config.publish_external_pub() && state.is_active() {
            let group_info =
                state.group_info(crypto, state.config.use_ratchet_tree_extension(), true)?;
            Some(MlsMessage::from(group_info))
        } else {
            None
        };

        log::debug!("Created commit for epoch {}", state.epoch());
        Ok(CreateCommitResult {
            state,
            commit: commit_message,
            welcome,
            group_info,
        })
    }
}
