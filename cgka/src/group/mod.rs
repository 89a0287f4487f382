//! # Groups
//!
//! This module contains the [`GroupState`] of a member and the operations that
//! move it from one epoch to the next.
//!
//! ### Don't Panic!
//!
//! Functions in this module should never panic. However, if there is a bug in
//! the implementation, a function will return an unrecoverable `LibraryError`.
//! This means that some functions that are not expected to fail and throw an
//! error, will still return a `Result` since they may throw a `LibraryError`.

use cgka_traits::{crypto::CgkaCrypto, random::CgkaRand, types::CryptoError, CgkaProvider};
use serde::{Deserialize, Serialize};
use tls_codec::{TlsDeserialize, TlsSerialize, TlsSize, VLBytes};

use crate::{
    binary_tree::LeafNodeIndex,
    ciphersuite::{signable::Signable, Ciphersuite, HpkeKeyPair, HpkePublicKey, Secret},
    config::{GroupConfig, OutgoingWireFormatPolicy},
    credentials::{Credential, CredentialWithKey, SignatureKeyPair},
    error::LibraryError,
    extensions::{Extension, Extensions, ExternalPubExtension, RatchetTreeExtension},
    framing::{
        public_message::InterimTranscriptHashInput, AuthenticatedContent,
        MessageEncryptionError, MlsMessage, PrivateMessage, PublicMessage, Sender, WireFormat,
    },
    key_packages::{KeyPackage, Lifetime},
    messages::{
        group_info::{GroupInfo, GroupInfoTbs},
        proposals::{
            AddProposal, GroupContextExtensionProposal, PreSharedKeyProposal, Proposal,
            ReInitProposal, RemoveProposal, UpdateProposal,
        },
        ConfirmationTag,
    },
    schedule::{
        psk::load_psks, CommitSecret, EpochAuthenticator, EpochSecrets, GroupEpochSecrets,
        InitSecret, JoinerSecret, KeySchedule, PreSharedKeyId, PskSecret, ResumptionPskStore,
    },
    treesync::{
        errors::LeafNodeValidationError,
        node::{
            leaf_node::{LeafNode, LeafNodeSource, NewLeafNodeParams, TreeInfoTbs, TreePosition},
            Node,
        },
        private_tree::PrivateTree,
        RatchetTree,
    },
    versions::ProtocolVersion,
};

pub mod apply_proposals;
pub mod errors;
pub mod group_context;
pub(crate) mod past_secrets;
pub(crate) mod proposal_store;

mod create_commit;
mod new_from_external_init;
mod new_from_welcome;
mod process;


pub use apply_proposals::{apply_proposals, ApplyProposalsResult, CommitOutcome};
pub use errors::*;
pub use group_context::GroupContext;
pub use proposal_store::QueuedProposal;

use past_secrets::MessageSecretsStore;
use proposal_store::ProposalStore;

/// A group ID. The group ID is chosen by the creator of the group and should be globally unique.
#[derive(
    Hash,
    Eq,
    Debug,
    PartialEq,
    Clone,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    TlsSerialize,
    TlsDeserialize,
    TlsSize,
)]
pub struct GroupId {
    value: VLBytes,
}

impl GroupId {
    /// Create a new (random) group ID.
    ///
    /// Group IDs should be random and not be misused as, e.g., a group name.
    pub fn random(rand: &impl CgkaRand) -> Result<Self, CryptoError> {
        Ok(Self {
            value: rand
                .random_vec(16)
                .map_err(|_| CryptoError::InsufficientRandomness)?
                .into(),
        })
    }

    /// Create a group ID from a byte slice.
    pub fn from_slice(bytes: &[u8]) -> Self {
        GroupId {
            value: bytes.into(),
        }
    }

    /// Returns the group ID as a byte slice.
    pub fn as_slice(&self) -> &[u8] {
        self.value.as_slice()
    }

    /// Returns the group ID as a byte vector.
    pub fn to_vec(&self) -> Vec<u8> {
        self.value.as_slice().to_vec()
    }
}

/// Group epoch. Internally this is stored as a `u64`.
/// The group epoch is incremented with every valid Commit that is merged into the group state.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    TlsDeserialize,
    TlsSerialize,
    TlsSize,
)]
pub struct GroupEpoch(u64);

impl GroupEpoch {
    /// Increment the group epoch by 1.
    pub(crate) fn increment(&mut self) -> Result<(), LibraryError> {
        self.0 = self
            .0
            .checked_add(1)
            .ok_or_else(|| LibraryError::custom("The group epoch overflowed"))?;
        Ok(())
    }

    /// Returns the group epoch as a `u64`.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl From<u64> for GroupEpoch {
    fn from(val: u64) -> Self {
        Self(val)
    }
}

impl std::fmt::Display for GroupEpoch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A member of a group as seen from the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    /// The leaf of the member.
    pub index: LeafNodeIndex,
    pub credential: Credential,
    pub signature_key: Vec<u8>,
    pub encryption_key: Vec<u8>,
}

impl Member {
    fn from_leaf(index: LeafNodeIndex, leaf_node: &LeafNode) -> Self {
        Self {
            index,
            credential: leaf_node.credential().clone(),
            signature_key: leaf_node.signature_key().as_slice().to_vec(),
            encryption_key: leaf_node.encryption_key().as_slice().to_vec(),
        }
    }
}

/// Where a group is in its life.
#[derive(Debug, Clone, PartialEq)]
pub enum GroupLifecycle {
    /// The own client is a member and can send and process messages.
    Active,
    /// A commit removed the own leaf. The state can still export what it had,
    /// but takes no part in the group anymore.
    RemovedFromGroup,
    /// A ReInit was committed. The group waits to be replaced by a new one
    /// with the parameters of the proposal.
    SuspendedPendingReinit(ReInitProposal),
}

/// The content of a [`ProcessedMessage`].
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessedMessageContent {
    /// The plaintext of an application message.
    ApplicationMessage(Vec<u8>),
    /// A proposal. It was added to the proposals of the epoch.
    Proposal(Box<QueuedProposal>),
    /// A commit. The returned state is in the epoch the commit created.
    Commit {
        new_epoch: GroupEpoch,
    },
}

/// A message that was processed by [`GroupState::process_message`].
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedMessage {
    group_id: GroupId,
    epoch: GroupEpoch,
    sender: Sender,
    authenticated_data: Vec<u8>,
    content: ProcessedMessageContent,
}

impl ProcessedMessage {
    pub(crate) fn new(
        content: &AuthenticatedContent,
        processed_content: ProcessedMessageContent,
    ) -> Self {
        Self {
            group_id: content.group_id().clone(),
            epoch: content.epoch(),
            sender: *content.sender(),
            authenticated_data: content.authenticated_data().to_vec(),
            content: processed_content,
        }
    }

    pub fn group_id(&self) -> &GroupId {
        &self.group_id
    }

    /// The epoch the message was sent in.
    pub fn epoch(&self) -> GroupEpoch {
        self.epoch
    }

    pub fn sender(&self) -> &Sender {
        &self.sender
    }

    pub fn authenticated_data(&self) -> &[u8] {
        &self.authenticated_data
    }

    pub fn content(&self) -> &ProcessedMessageContent {
        &self.content
    }

    pub fn into_content(self) -> ProcessedMessageContent {
        self.content
    }
}

/// Parameters of [`GroupState::create_commit`].
#[derive(Debug, Clone)]
pub struct CommitParams {
    inline_proposals: Vec<Proposal>,
    force_self_update: bool,
    authenticated_data: Vec<u8>,
}

impl Default for CommitParams {
    fn default() -> Self {
        Self {
            inline_proposals: Vec::new(),
            force_self_update: true,
            authenticated_data: Vec::new(),
        }
    }
}

impl CommitParams {
    pub fn builder() -> CommitParamsBuilder {
        CommitParamsBuilder::default()
    }

    pub fn inline_proposals(&self) -> &[Proposal] {
        &self.inline_proposals
    }

    pub fn force_self_update(&self) -> bool {
        self.force_self_update
    }

    pub fn authenticated_data(&self) -> &[u8] {
        &self.authenticated_data
    }
}

/// Builder for [`CommitParams`].
#[derive(Debug, Clone, Default)]
pub struct CommitParamsBuilder {
    params: CommitParams,
}

impl CommitParamsBuilder {
    /// Proposals sent by value in the commit, on top of the stored ones.
    pub fn inline_proposals(mut self, inline_proposals: Vec<Proposal>) -> Self {
        self.params.inline_proposals = inline_proposals;
        self
    }

    /// Always include an update path, even if the proposals don't need one.
    /// Defaults to `true`.
    pub fn force_self_update(mut self, force_self_update: bool) -> Self {
        self.params.force_self_update = force_self_update;
        self
    }

    pub fn authenticated_data(mut self, authenticated_data: Vec<u8>) -> Self {
        self.params.authenticated_data = authenticated_data;
        self
    }

    pub fn build(self) -> CommitParams {
        self.params
    }
}

/// The result of [`GroupState::create_commit`].
#[derive(Debug, Clone)]
pub struct CreateCommitResult {
    /// The state of the committer in the new epoch.
    pub state: GroupState,
    /// The commit for the existing members.
    pub commit: MlsMessage,
    /// A Welcome for the members added by the commit.
    pub welcome: Option<MlsMessage>,
    /// The group info of the new epoch, if the group publishes it.
    pub group_info: Option<MlsMessage>,
}

/// Everything that changes when a group moves to the next epoch.
pub(crate) struct EpochTransition {
    pub(crate) group_context: GroupContext,
    pub(crate) tree: RatchetTree,
    pub(crate) private_tree: PrivateTree,
    pub(crate) epoch_secrets: EpochSecrets,
    pub(crate) confirmation_tag: ConfirmationTag,
    pub(crate) interim_transcript_hash: Vec<u8>,
    pub(crate) reinit: Option<ReInitProposal>,
}

/// The state of a member in one epoch of a group.
///
/// A `GroupState` is a value: every operation that changes the group returns
/// a new state and leaves `self` untouched.
#[derive(Debug, Clone)]
pub struct GroupState {
    config: GroupConfig,
    group_context: GroupContext,
    tree: RatchetTree,
    private_tree: PrivateTree,
    signer: SignatureKeyPair,
    group_epoch_secrets: GroupEpochSecrets,
    message_secrets_store: MessageSecretsStore,
    // Hash of the confirmed transcript and the confirmation tag of the epoch.
    interim_transcript_hash: Vec<u8>,
    confirmation_tag: ConfirmationTag,
    proposal_store: ProposalStore,
    resumption_psk_store: ResumptionPskStore,
    // Private keys of own Update proposals that are not committed yet.
    pending_update_key_pairs: Vec<HpkeKeyPair>,
    lifecycle: GroupLifecycle,
}

impl GroupState {
    /// Create a new group with the own client as its only member.
    pub fn create_group(
        provider: &impl CgkaProvider,
        config: GroupConfig,
        group_id: GroupId,
        credential_with_key: CredentialWithKey,
        signer: SignatureKeyPair,
    ) -> Result<Self, CreateGroupError> {
        let ciphersuite = config.ciphersuite();
        let crypto = provider.crypto();
        if ciphersuite.signature_algorithm() != signer.signature_scheme() {
            return Err(CreateGroupError::CiphersuiteSignatureSchemeMismatch);
        }
        log::debug!(
            "Creating group {:x?} with {}",
            group_id.as_slice(),
            ciphersuite
        );

        let required_capabilities = config.required_capabilities();
        let capabilities = config.client_config().capabilities().clone();
        capabilities.supports_required_capabilities(required_capabilities)?;
        let extensions = if required_capabilities.extension_types().is_empty()
            && required_capabilities.proposal_types().is_empty()
            && required_capabilities.credential_types().is_empty()
        {
            Extensions::empty()
        } else {
            Extensions::single(Extension::RequiredCapabilities(
                required_capabilities.clone(),
            ))
        };

        let (leaf_node, leaf_key_pair) = LeafNode::new(
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
        let tree = RatchetTree::new(leaf_node);
        let own_leaf_index = LeafNodeIndex::new(0);

        let group_context = GroupContext::create_initial_group_context(
            ciphersuite,
            group_id,
            tree.tree_hash(crypto, ciphersuite)?,
            extensions,
        );
        let serialized_group_context = group_context.serialize()?;

        // Create key schedule
        let commit_secret = CommitSecret::new(
            Secret::random(ciphersuite, provider.rand())
                .map_err(LibraryError::unexpected_crypto_error)?,
        );
        let init_secret = InitSecret::random(ciphersuite, provider.rand())
            .map_err(LibraryError::unexpected_crypto_error)?;
        let joiner_secret = JoinerSecret::new(
            crypto,
            ciphersuite,
            commit_secret,
            &init_secret,
            &serialized_group_context,
        )?;
        let mut key_schedule = KeySchedule::init(
            ciphersuite,
            crypto,
            &joiner_secret,
            PskSecret::zero(ciphersuite),
        )?;
        key_schedule.add_context(crypto, &serialized_group_context)?;
        let epoch_secrets = key_schedule.epoch_secrets(crypto)?;

        // The first epoch has an empty confirmed transcript
        let confirmation_tag = epoch_secrets
            .confirmation_key()
            .tag(crypto, ciphersuite, &[])
            .map_err(LibraryError::unexpected_crypto_error)?;
        let interim_transcript_hash = InterimTranscriptHashInput::from(&confirmation_tag)
            .calculate_interim_transcript_hash(crypto, ciphersuite, &[])?;

        let (group_epoch_secrets, message_secrets) =
            epoch_secrets.split_secrets(serialized_group_context, tree.size(), own_leaf_index);
        let mut resumption_psk_store = ResumptionPskStore::new(config.max_resumption_psks());
        resumption_psk_store.add(
            group_context.epoch(),
            group_epoch_secrets.resumption_psk().clone(),
        );

        Ok(GroupState {
            message_secrets_store: MessageSecretsStore::new_with_secret(
                config.max_past_epochs(),
                message_secrets,
            ),
            config,
            group_context,
            tree,
            private_tree: PrivateTree::from_leaf_key_pair(own_leaf_index, leaf_key_pair),
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

    // === Proposals ===

    /// Propose to add the owner of `key_package` to the group.
    pub fn propose_add(
        &self,
        provider: &impl CgkaProvider,
        key_package: KeyPackage,
    ) -> Result<(Self, MlsMessage), ProposeError> {
        self.ensure_active(ProposeError::GroupNotActive)?;
        key_package.validate(
            provider.crypto(),
            self.ciphersuite(),
            self.config.client_config(),
        )?;
        self.propose(provider, Proposal::Add(AddProposal { key_package }))
    }

    /// Propose to remove the member at `removed`.
    pub fn propose_remove(
        &self,
        provider: &impl CgkaProvider,
        removed: LeafNodeIndex,
    ) -> Result<(Self, MlsMessage), ProposeError> {
        self.ensure_active(ProposeError::GroupNotActive)?;
        if self.tree.leaf(removed).is_none() {
            return Err(ProposeError::UnknownMember);
        }
        self.propose(provider, Proposal::Remove(RemoveProposal { removed }))
    }

    /// Propose a fresh encryption key for the own leaf. The private key is
    /// kept until a commit covering the proposal arrives.
    pub fn propose_self_update(
        &self,
        provider: &impl CgkaProvider,
    ) -> Result<(Self, MlsMessage), ProposeError> {
        self.ensure_active(ProposeError::GroupNotActive)?;
        let ciphersuite = self.ciphersuite();
        let own_leaf_index = self.own_leaf_index();
        let own_leaf = self
            .tree
            .leaf(own_leaf_index)
            .ok_or_else(|| LibraryError::custom("Own leaf is blank"))?;

        let ikm = Secret::random(ciphersuite, provider.rand())
            .map_err(LibraryError::unexpected_crypto_error)?;
        let key_pair = provider
            .crypto()
            .derive_hpke_keypair(ciphersuite.hpke_config(), ikm.as_slice())
            .map_err(LibraryError::unexpected_crypto_error)?;
        let leaf_node = own_leaf.rekeyed(
            provider.crypto(),
            &self.signer,
            HpkePublicKey::from(key_pair.public.clone()),
            LeafNodeSource::Update,
            TreeInfoTbs::Update(TreePosition::new(self.group_id().clone(), own_leaf_index)),
        )?;

        let (mut state, message) =
            self.propose(provider, Proposal::Update(UpdateProposal { leaf_node }))?;
        state.pending_update_key_pairs.push(key_pair);
        Ok((state, message))
    }

    /// Propose to inject the pre-shared key `psk_id` into the next epoch.
    /// The key must be available to the own client.
    pub fn propose_psk(
        &self,
        provider: &impl CgkaProvider,
        psk_id: PreSharedKeyId,
    ) -> Result<(Self, MlsMessage), ProposeError> {
        self.ensure_active(ProposeError::GroupNotActive)?;
        psk_id.validate_in_proposal(self.ciphersuite())?;
        load_psks(
            provider.psk_index(),
            &self.resumption_psk_store,
            self.group_id(),
            std::slice::from_ref(&psk_id),
        )?;
        self.propose(
            provider,
            Proposal::PreSharedKey(PreSharedKeyProposal::new(psk_id)),
        )
    }

    /// Propose to close this group and restart it with new parameters.
    pub fn propose_reinit(
        &self,
        provider: &impl CgkaProvider,
        group_id: GroupId,
        ciphersuite: Ciphersuite,
        extensions: Extensions,
    ) -> Result<(Self, MlsMessage), ProposeError> {
        self.ensure_active(ProposeError::GroupNotActive)?;
        self.propose(
            provider,
            Proposal::ReInit(ReInitProposal::new(
                group_id,
                ProtocolVersion::default(),
                ciphersuite,
                extensions,
            )),
        )
    }

    /// Propose new group context extensions. All current members must
    /// support them.
    pub fn propose_group_context_extensions(
        &self,
        provider: &impl CgkaProvider,
        extensions: Extensions,
    ) -> Result<(Self, MlsMessage), ProposeError> {
        self.ensure_active(ProposeError::GroupNotActive)?;
        for (_, leaf_node) in self.tree.leaves() {
            if !leaf_node.capabilities().supports_extensions(&extensions) {
                return Err(LeafNodeValidationError::UnsupportedExtensions.into());
            }
            if let Some(required_capabilities) = extensions.required_capabilities() {
                leaf_node
                    .capabilities()
                    .supports_required_capabilities(required_capabilities)?;
            }
        }
        self.propose(
            provider,
            Proposal::GroupContextExtensions(GroupContextExtensionProposal::new(extensions)),
        )
    }

    fn propose(
        &self,
        provider: &impl CgkaProvider,
        proposal: Proposal,
    ) -> Result<(Self, MlsMessage), ProposeError> {
        log::debug!("Proposing {:?}", proposal.proposal_type());
        let content = AuthenticatedContent::member_proposal(
            self.outgoing_wire_format(),
            self.own_leaf_index(),
            &[],
            proposal,
            &self.signer,
            &self.group_context,
            provider.crypto(),
        )?;
        let queued_proposal = QueuedProposal::from_authenticated_content(
            self.ciphersuite(),
            provider.crypto(),
            &content,
        )?;
        let mut state = self.clone();
        let message = state.frame_handshake(provider, content)?;
        state.proposal_store.add(queued_proposal);
        Ok((state, message))
    }

    // === Application messages and exports ===

    /// Encrypt an application message for the current epoch.
    pub fn create_application_message(
        &self,
        provider: &impl CgkaProvider,
        authenticated_data: &[u8],
        message: &[u8],
    ) -> Result<(Self, MlsMessage), CreateMessageError> {
        self.ensure_active(CreateMessageError::GroupNotActive)?;
        let content = AuthenticatedContent::new_application(
            self.own_leaf_index(),
            authenticated_data,
            message,
            &self.signer,
            &self.group_context,
            provider.crypto(),
        )?;
        let mut state = self.clone();
        let padding_size = state.config.padding_size();
        let ciphertext = PrivateMessage::encrypt(
            provider.crypto(),
            provider.rand(),
            &content,
            self.ciphersuite(),
            state.message_secrets_store.message_secrets_mut(),
            padding_size,
        )?;
        Ok((state, ciphertext.into()))
    }

    /// Derive `key_length` bytes from the exporter secret of the epoch.
    pub fn export_secret(
        &self,
        crypto: &impl CgkaCrypto,
        label: &str,
        context: &[u8],
        key_length: usize,
    ) -> Result<Vec<u8>, ExportSecretError> {
        if key_length > u16::MAX as usize {
            log::error!("Got a key that is larger than u16::MAX");
            return Err(ExportSecretError::KeyLengthTooLong);
        }
        self.ensure_active(ExportSecretError::GroupNotActive)?;
        Ok(self
            .group_epoch_secrets
            .exporter_secret()
            .derive_exported_secret(self.ciphersuite(), crypto, label, context, key_length)
            .map_err(LibraryError::unexpected_crypto_error)?)
    }

    /// The epoch authenticator of the current epoch.
    pub fn epoch_authenticator(&self) -> &EpochAuthenticator {
        self.group_epoch_secrets.epoch_authenticator()
    }

    /// A signed group info of the current epoch carrying the external public
    /// key, and the ratchet tree if `with_ratchet_tree` is set.
    pub fn export_group_info(
        &self,
        crypto: &impl CgkaCrypto,
        with_ratchet_tree: bool,
    ) -> Result<MlsMessage, LibraryError> {
        Ok(self.group_info(crypto, with_ratchet_tree, true)?.into())
    }

    /// The nodes of the ratchet tree, for members joining without the ratchet
    /// tree extension.
    pub fn export_ratchet_tree(&self) -> Vec<Option<Node>> {
        self.tree.export_nodes()
    }

    // === Getters ===

    pub fn config(&self) -> &GroupConfig {
        &self.config
    }

    pub fn group_context(&self) -> &GroupContext {
        &self.group_context
    }

    pub fn group_id(&self) -> &GroupId {
        self.group_context.group_id()
    }

    pub fn epoch(&self) -> GroupEpoch {
        self.group_context.epoch()
    }

    pub fn ciphersuite(&self) -> Ciphersuite {
        self.group_context.ciphersuite()
    }

    pub fn own_leaf_index(&self) -> LeafNodeIndex {
        self.private_tree.own_leaf_index()
    }

    pub fn ratchet_tree(&self) -> &RatchetTree {
        &self.tree
    }

    pub fn confirmation_tag(&self) -> &ConfirmationTag {
        &self.confirmation_tag
    }

    /// The members of the current epoch, ordered by leaf index.
    pub fn members(&self) -> Vec<Member> {
        self.tree
            .leaves()
            .map(|(index, leaf_node)| Member::from_leaf(index, leaf_node))
            .collect()
    }

    pub fn member(&self, leaf_index: LeafNodeIndex) -> Option<Member> {
        self.tree
            .leaf(leaf_index)
            .map(|leaf_node| Member::from_leaf(leaf_index, leaf_node))
    }

    /// The proposals received in this epoch that are not committed yet.
    pub fn pending_proposals(&self) -> impl Iterator<Item = &QueuedProposal> {
        self.proposal_store.proposals()
    }

    pub fn lifecycle(&self) -> &GroupLifecycle {
        &self.lifecycle
    }

    pub fn is_active(&self) -> bool {
        self.lifecycle == GroupLifecycle::Active
    }

    pub fn resumption_psk_store(&self) -> &ResumptionPskStore {
        &self.resumption_psk_store
    }

    // === Helpers ===

    pub(crate) fn ensure_active<E>(&self, error: E) -> Result<(), E> {
        if self.is_active() {
            Ok(())
        } else {
            log::error!("The group is not active: {:?}", self.lifecycle);
            Err(error)
        }
    }

    pub(crate) fn outgoing_wire_format(&self) -> WireFormat {
        match self.config.wire_format_policy().outgoing() {
            OutgoingWireFormatPolicy::AlwaysPlaintext => WireFormat::PublicMessage,
            OutgoingWireFormatPolicy::AlwaysCiphertext => WireFormat::PrivateMessage,
        }
    }

    /// Frame a handshake message with the secrets of the current epoch.
    pub(crate) fn frame_handshake(
        &mut self,
        provider: &impl CgkaProvider,
        content: AuthenticatedContent,
    ) -> Result<MlsMessage, MessageEncryptionError> {
        let ciphersuite = self.ciphersuite();
        match content.wire_format() {
            WireFormat::PrivateMessage => {
                let padding_size = self.config.padding_size();
                let ciphertext = PrivateMessage::encrypt(
                    provider.crypto(),
                    provider.rand(),
                    &content,
                    ciphersuite,
                    self.message_secrets_store.message_secrets_mut(),
                    padding_size,
                )?;
                Ok(ciphertext.into())
            }
            _ => {
                let message_secrets = self.message_secrets_store.message_secrets();
                let mut plaintext = PublicMessage::from(content);
                if plaintext.sender().is_member() {
                    plaintext.set_membership_tag(
                        provider.crypto(),
                        ciphersuite,
                        message_secrets.membership_key(),
                        message_secrets.serialized_context(),
                    )?;
                }
                Ok(plaintext.into())
            }
        }
    }

    /// Sign a group info for the current epoch.
    pub(crate) fn group_info(
        &self,
        crypto: &impl CgkaCrypto,
        with_ratchet_tree: bool,
        with_external_pub: bool,
    ) -> Result<GroupInfo, LibraryError> {
        let mut extensions = Extensions::empty();
        if with_ratchet_tree {
            extensions.add_or_replace(Extension::RatchetTree(RatchetTreeExtension::new(
                self.tree.export_nodes(),
            )));
        }
        if with_external_pub {
            let external_key_pair = self
                .group_epoch_secrets
                .external_secret()
                .derive_external_keypair(crypto, self.ciphersuite())
                .map_err(LibraryError::unexpected_crypto_error)?;
            extensions.add_or_replace(Extension::ExternalPub(ExternalPubExtension::new(
                HpkePublicKey::from(external_key_pair.public),
            )));
        }
        GroupInfoTbs::new(
            self.group_context.clone(),
            extensions,
            self.confirmation_tag.clone(),
            self.own_leaf_index(),
        )
        .sign(crypto, &self.signer)
        .map_err(|_| LibraryError::custom("Signing the group info failed"))
    }

    /// Move this state into the next epoch. The message secrets of the
    /// current epoch are kept for late application messages.
    pub(crate) fn into_next_epoch(
        mut self,
        transition: EpochTransition,
    ) -> Result<Self, LibraryError> {
        let past_epoch = self.epoch();
        let past_members = self.members();
        let serialized_context = transition.group_context.serialize()?;
        let (group_epoch_secrets, message_secrets) = transition.epoch_secrets.split_secrets(
            serialized_context,
            transition.tree.size(),
            transition.private_tree.own_leaf_index(),
        );
        self.message_secrets_store
            .add(past_epoch, message_secrets, past_members);
        self.resumption_psk_store.add(
            transition.group_context.epoch(),
            group_epoch_secrets.resumption_psk().clone(),
        );
        self.group_epoch_secrets = group_epoch_secrets;
        self.group_context = transition.group_context;
        self.tree = transition.tree;
        self.private_tree = transition.private_tree;
        self.confirmation_tag = transition.confirmation_tag;
        self.interim_transcript_hash = transition.interim_transcript_hash;
        self.proposal_store.empty();
        self.pending_update_key_pairs.clear();
        if let Some(reinit) = transition.reinit {
            log::info!("Group {:x?} is suspended for a ReInit", self.group_id().as_slice());
            self.lifecycle = GroupLifecycle::SuspendedPendingReinit(reinit);
        }
        log::debug!(
            "Group {:x?} is in epoch {} now",
            self.group_id().as_slice(),
            self.epoch()
        );
        Ok(self)
    }
}
