use cgka_traits::CgkaProvider;
use tls_codec::Deserialize as TlsDeserializeTrait;

use super::{
    errors::WelcomeError, past_secrets::MessageSecretsStore, proposal_store::ProposalStore,
    GroupId, GroupLifecycle, GroupState,
};
use crate::{
    ciphersuite::HpkeKeyPair,
    config::GroupConfig,
    credentials::SignatureKeyPair,
    error::LibraryError,
    framing::public_message::InterimTranscriptHashInput,
    key_packages::KeyPackageBundle,
    messages::{group_info::GroupInfo, GroupSecrets, Welcome},
    schedule::{
        psk::{check_for_duplicates, load_psks},
        KeySchedule, PskSecret, ResumptionPskStore,
    },
    treesync::{errors::RatchetTreeError, private_tree::PrivateTree, RatchetTree},
};

impl GroupState {
    /// Join a group from a Welcome.
    ///
    /// `key_package_bundle` is the bundle of the key package the Welcome was
    /// created for. The ratchet tree is taken from the group info if it
    /// carries one and from `ratchet_tree` otherwise.
    pub fn join_group(
        provider: &impl CgkaProvider,
        config: GroupConfig,
        welcome: Welcome,
        ratchet_tree: Option<RatchetTree>,
        key_package_bundle: KeyPackageBundle,
        signer: SignatureKeyPair,
    ) -> Result<Self, WelcomeError> {
        log::debug!("Joining a group from a Welcome");
        let crypto = provider.crypto();
        let ciphersuite = welcome.ciphersuite();
        let key_package = key_package_bundle.key_package();
        if ciphersuite != key_package.ciphersuite() {
            log::error!("Ciphersuite of the Welcome and the key package differ");
            return Err(WelcomeError::CiphersuiteMismatch);
        }

        let key_package_ref = key_package.hash_ref(crypto)?;
        let encrypted_group_secrets = welcome
            .find_secrets(&key_package_ref)
            .ok_or(WelcomeError::JoinerSecretNotFound)?;
        let group_secrets = GroupSecrets::decrypt(
            crypto,
            ciphersuite,
            key_package_bundle.init_private_key(),
            encrypted_group_secrets.encrypted_group_secrets(),
            welcome.encrypted_group_info(),
        )
        .ok_or(WelcomeError::GroupSecretsDecryptionFailure)?;

        // Prepare the PreSharedKeys
        check_for_duplicates(&group_secrets.psks)?;
        // A joiner has no resumption secrets of the group yet
        let resumption_psk_store = ResumptionPskStore::new(config.max_resumption_psks());
        let psk_secret = {
            let psks = load_psks(
                provider.psk_index(),
                &resumption_psk_store,
                &GroupId::from_slice(&[]),
                &group_secrets.psks,
            )?;
            PskSecret::new(crypto, ciphersuite, psks)?
        };

        // Create key schedule
        let mut key_schedule = KeySchedule::init(
            ciphersuite,
            crypto,
            &group_secrets.joiner_secret,
            psk_secret,
        )?;
        let (welcome_key, welcome_nonce) = key_schedule
            .welcome(crypto)?
            .derive_welcome_key_nonce(crypto)
            .map_err(LibraryError::unexpected_crypto_error)?;
        let group_info_bytes = welcome_key
            .aead_open(crypto, welcome.encrypted_group_info(), &[], &welcome_nonce)
            .map_err(|_| WelcomeError::GroupInfoDecryptionFailure)?;
        let group_info = GroupInfo::tls_deserialize(&mut group_info_bytes.as_slice())?;
        let group_context = group_info.group_context().clone();
        if group_context.ciphersuite() != ciphersuite {
            return Err(WelcomeError::CiphersuiteMismatch);
        }

        // Build and verify the ratchet tree
        let tree = match group_info.extensions().ratchet_tree() {
            Some(extension) => RatchetTree::from_nodes(extension.nodes().to_vec())?,
            None => ratchet_tree.ok_or(WelcomeError::MissingRatchetTree)?,
        };
        tree.validate(crypto, ciphersuite, group_context.group_id())?;
        if tree.tree_hash(crypto, ciphersuite)? != group_context.tree_hash() {
            log::error!("Tree hash of the ratchet tree doesn't match the group context");
            return Err(RatchetTreeError::TreeHashMismatch.into());
        }

        let signer_leaf = tree
            .leaf(group_info.signer())
            .ok_or(WelcomeError::UnknownGroupInfoSigner)?;
        group_info
            .verify(
                crypto,
                ciphersuite.signature_algorithm(),
                signer_leaf.signature_key(),
            )
            .map_err(|_| WelcomeError::InvalidGroupInfoSignature)?;

        if let Some(required_capabilities) = group_context.required_capabilities() {
            key_package
                .leaf_node()
                .capabilities()
                .supports_required_capabilities(required_capabilities)?;
        }

        // Find the own leaf
        let own_leaf_node = key_package.leaf_node();
        let own_leaf_index = tree
            .leaf_index_by_signature_key(own_leaf_node.signature_key().as_slice())
            .ok_or(WelcomeError::OwnLeafNotFound)?;
        if tree
            .leaf(own_leaf_index)
            .map(|leaf_node| leaf_node.encryption_key() != own_leaf_node.encryption_key())
            .unwrap_or(true)
        {
            return Err(WelcomeError::OwnLeafNotFound);
        }

        let leaf_key_pair = HpkeKeyPair {
            private: key_package_bundle.encryption_private_key.clone(),
            public: own_leaf_node.encryption_key().as_slice().to_vec(),
        };
        let private_tree = match group_secrets.path_secret {
            Some(path_secret) => PrivateTree::from_path_secret(
                crypto,
                ciphersuite,
                &tree,
                own_leaf_index,
                leaf_key_pair,
                group_info.signer(),
                path_secret,
            )?,
            None => PrivateTree::from_leaf_key_pair(own_leaf_index, leaf_key_pair),
        };

        let serialized_group_context = group_context.serialize()?;
        key_schedule.add_context(crypto, &serialized_group_context)?;
        let epoch_secrets = key_schedule.epoch_secrets(crypto)?;

        // Verify the confirmation tag
        let confirmation_tag = epoch_secrets
            .confirmation_key()
            .tag(
                crypto,
                ciphersuite,
                group_context.confirmed_transcript_hash(),
            )
            .map_err(LibraryError::unexpected_crypto_error)?;
        if &confirmation_tag != group_info.confirmation_tag() {
            log::error!("Confirmation tag mismatch");
            log_crypto!(trace, "  Got:      {:x?}", group_info.confirmation_tag());
            log_crypto!(trace, "  Expected: {:x?}", confirmation_tag);
            return Err(WelcomeError::ConfirmationTagMismatch);
        }

        let interim_transcript_hash = InterimTranscriptHashInput::from(&confirmation_tag)
            .calculate_interim_transcript_hash(
                crypto,
                ciphersuite,
                group_context.confirmed_transcript_hash(),
            )?;

        let (group_epoch_secrets, message_secrets) =
            epoch_secrets.split_secrets(serialized_group_context, tree.size(), own_leaf_index);
        let mut resumption_psk_store = resumption_psk_store;
        resumption_psk_store.add(
            group_context.epoch(),
            group_epoch_secrets.resumption_psk().clone(),
        );

        log::debug!(
            "Joined group {:x?} in epoch {} at leaf {}",
            group_context.group_id().as_slice(),
            group_context.epoch(),
            own_leaf_index
        );
        Ok(GroupState {
            message_secrets_store: MessageSecretsStore::new_with_secret(
                config.max_past_epochs(),
                message_secrets,
            ),
            config,
            group_context,
            tree,
            private_tree,
            signer,
            group_epoch_secrets,
            interim_transcript_hash,
            confirmation_tag,
            proposal_store: ProposalStore::new(),
            resumption_psk_store,
            pending_update_key_pairs: Vec::new(),
            lifecycle: GroupLifecycle::Active,
        })
    }
}
