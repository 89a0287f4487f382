//! # Group errors
//!
//! This module contains errors returned by the operations of a
//! [`GroupState`](super::GroupState).

use thiserror::Error;

use crate::{
    ciphersuite::signature::SignatureError,
    error::{ErrorCategory, ErrorKind, LibraryError},
    extensions::errors::InvalidExtensionError,
    framing::{MembershipTagError, MessageDecryptionError, MessageEncryptionError},
    key_packages::errors::{KeyPackageNewError, KeyPackageVerifyError},
    schedule::errors::PskError,
    treesync::errors::{
        ApplyUpdatePathError, LeafNodeValidationError, RatchetTreeError, TreeSyncError,
    },
};

/// Create group error
#[derive(Error, Debug, PartialEq, Clone)]
pub enum CreateGroupError {
    /// See [`LibraryError`] for more details.
    #[error(transparent)]
    LibraryError(#[from] LibraryError),
    /// The ciphersuite of the configuration does not match the signature key.
    #[error("The ciphersuite of the configuration does not match the signature key.")]
    CiphersuiteSignatureSchemeMismatch,
    /// The own capabilities don't satisfy the required capabilities of the group.
    #[error("The own capabilities don't satisfy the required capabilities of the group.")]
    UnsupportedCapability(#[from] LeafNodeValidationError),
    /// See [`InvalidExtensionError`] for more details.
    #[error(transparent)]
    InvalidExtensions(#[from] InvalidExtensionError),
}

impl ErrorCategory for CreateGroupError {
    fn kind(&self) -> ErrorKind {
        match self {
            CreateGroupError::LibraryError(e) => e.kind(),
            CreateGroupError::CiphersuiteSignatureSchemeMismatch => ErrorKind::Usage,
            CreateGroupError::UnsupportedCapability(e) => e.kind(),
            CreateGroupError::InvalidExtensions(e) => e.kind(),
        }
    }
}

/// Errors found while validating a set of proposals.
#[derive(Error, Debug, PartialEq, Clone)]
pub enum ProposalValidationError {
    /// See [`LibraryError`] for more details.
    #[error(transparent)]
    LibraryError(#[from] LibraryError),
    /// A commit references a proposal that is not known.
    #[error("A commit references a proposal that is not known.")]
    UnknownProposalReference,
    /// A commit references the same proposal twice.
    #[error("A commit references the same proposal twice.")]
    DuplicateProposalReference,
    /// More than one ExternalInit proposal.
    #[error("More than one ExternalInit proposal.")]
    MultipleExternalInit,
    /// An ExternalInit proposal in a commit of a member.
    #[error("An ExternalInit proposal in a commit of a member.")]
    ExternalInitFromMember,
    /// An external commit without an ExternalInit proposal.
    #[error("An external commit without an ExternalInit proposal.")]
    MissingExternalInit,
    /// An external commit carries a proposal type that is not allowed in it.
    #[error("An external commit carries a proposal type that is not allowed in it.")]
    InvalidExternalCommitProposal,
    /// An external commit removes more than one leaf.
    #[error("An external commit removes more than one leaf.")]
    MultipleResyncRemovals,
    /// A ReInit proposal is committed together with other proposals.
    #[error("A ReInit proposal is committed together with other proposals.")]
    ReInitNotAlone,
    /// More than one GroupContextExtensions proposal.
    #[error("More than one GroupContextExtensions proposal.")]
    MultipleGroupContextExtensions,
    /// Two Add proposals carry the same signature key or the signature key of an existing member.
    #[error("Two Add proposals carry the same signature key or the signature key of an existing member.")]
    DuplicateSignatureKey,
    /// Two Add proposals carry the same encryption or init key, or one that is already in the tree.
    #[error("Two Add proposals carry the same encryption or init key, or one that is already in the tree.")]
    DuplicateEncryptionKey,
    /// The same leaf is removed twice.
    #[error("The same leaf is removed twice.")]
    DuplicateRemove,
    /// A leaf sent more than one Update proposal.
    #[error("A leaf sent more than one Update proposal.")]
    DuplicateUpdate,
    /// A leaf is both updated and removed.
    #[error("A leaf is both updated and removed.")]
    UpdateOfRemovedLeaf,
    /// The committer included an Update proposal of its own.
    #[error("The committer included an Update proposal of its own.")]
    CommitterUpdate,
    /// The committer removes itself.
    #[error("The committer removes itself.")]
    SelfRemoval,
    /// A Remove proposal targets a blank leaf or a leaf outside of the tree.
    #[error("A Remove proposal targets a blank leaf or a leaf outside of the tree.")]
    UnknownMember,
    /// An Update proposal was not sent by a member.
    #[error("An Update proposal was not sent by a member.")]
    UpdateFromNonMember,
    /// The key package of an Add proposal is invalid.
    #[error(transparent)]
    InvalidKeyPackage(#[from] KeyPackageVerifyError),
    /// A leaf node is invalid.
    #[error(transparent)]
    InvalidLeafNode(#[from] LeafNodeValidationError),
    /// A PSK proposal is invalid.
    #[error(transparent)]
    Psk(#[from] PskError),
    /// The tree can't take the changes.
    #[error(transparent)]
    TreeSyncError(#[from] TreeSyncError),
}

impl ErrorCategory for ProposalValidationError {
    fn kind(&self) -> ErrorKind {
        match self {
            ProposalValidationError::LibraryError(e) => e.kind(),
            ProposalValidationError::InvalidKeyPackage(e) => e.kind(),
            ProposalValidationError::InvalidLeafNode(e) => e.kind(),
            ProposalValidationError::Psk(e) => e.kind(),
            ProposalValidationError::TreeSyncError(e) => e.kind(),
            _ => ErrorKind::Validation,
        }
    }
}

/// Errors when creating a proposal.
#[derive(Error, Debug, PartialEq, Clone)]
pub enum ProposeError {
    /// See [`LibraryError`] for more details.
    #[error(transparent)]
    LibraryError(#[from] LibraryError),
    /// The group is not active anymore.
    #[error("The group is not active anymore.")]
    GroupNotActive,
    /// The key package to add is invalid.
    #[error(transparent)]
    InvalidKeyPackage(#[from] KeyPackageVerifyError),
    /// The leaf to remove is not a member of the group.
    #[error("The leaf to remove is not a member of the group.")]
    UnknownMember,
    /// A fresh leaf node could not be created.
    #[error(transparent)]
    KeyPackageNewError(#[from] KeyPackageNewError),
    /// See [`PskError`] for more details.
    #[error(transparent)]
    Psk(#[from] PskError),
    /// A member does not support the proposed extensions.
    #[error(transparent)]
    UnsupportedExtensions(#[from] LeafNodeValidationError),
    /// See [`MessageEncryptionError`] for more details.
    #[error(transparent)]
    MessageEncryptionError(#[from] MessageEncryptionError),
}

impl ErrorCategory for ProposeError {
    fn kind(&self) -> ErrorKind {
        match self {
            ProposeError::LibraryError(e) => e.kind(),
            ProposeError::GroupNotActive => ErrorKind::Usage,
            ProposeError::InvalidKeyPackage(e) => e.kind(),
            ProposeError::UnknownMember => ErrorKind::Usage,
            ProposeError::KeyPackageNewError(e) => e.kind(),
            ProposeError::Psk(e) => e.kind(),
            ProposeError::UnsupportedExtensions(e) => e.kind(),
            ProposeError::MessageEncryptionError(e) => e.kind(),
        }
    }
}

/// Create commit error
#[derive(Error, Debug, PartialEq, Clone)]
pub enum CreateCommitError {
    /// See [`LibraryError`] for more details.
    #[error(transparent)]
    LibraryError(#[from] LibraryError),
    /// The group is not active anymore.
    #[error("The group is not active anymore.")]
    GroupNotActive,
    /// See [`ProposalValidationError`] for more details.
    #[error(transparent)]
    ProposalValidationError(#[from] ProposalValidationError),
    /// See [`PskError`] for more details.
    #[error(transparent)]
    Psk(#[from] PskError),
    /// See [`MessageEncryptionError`] for more details.
    #[error(transparent)]
    MessageEncryptionError(#[from] MessageEncryptionError),
}

impl ErrorCategory for CreateCommitError {
    fn kind(&self) -> ErrorKind {
        match self {
            CreateCommitError::LibraryError(e) => e.kind(),
            CreateCommitError::GroupNotActive => ErrorKind::Usage,
            CreateCommitError::ProposalValidationError(e) => e.kind(),
            CreateCommitError::Psk(e) => e.kind(),
            CreateCommitError::MessageEncryptionError(e) => e.kind(),
        }
    }
}

/// Errors when processing a received message.
#[derive(Error, Debug, PartialEq, Clone)]
pub enum ProcessMessageError {
    /// See [`LibraryError`] for more details.
    #[error(transparent)]
    LibraryError(#[from] LibraryError),
    /// The group is not active anymore.
    #[error("The group is not active anymore.")]
    GroupNotActive,
    /// Only public and private messages can be processed by a group.
    #[error("Only public and private messages can be processed by a group.")]
    UnsupportedWireFormat,
    /// The wire format is not allowed by the incoming wire format policy.
    #[error("The wire format is not allowed by the incoming wire format policy.")]
    IncompatibleWireFormat,
    /// Application messages must be sent as private messages.
    #[error("Application messages must be sent as private messages.")]
    UnencryptedApplicationMessage,
    /// The message was sent to another group.
    #[error("The message was sent to another group.")]
    WrongGroupId,
    /// The message is from a future epoch.
    #[error("The message is from a future epoch.")]
    WrongEpoch,
    /// Handshake messages of past epochs can't be processed.
    #[error("Handshake messages of past epochs can't be processed.")]
    PastEpochHandshakeMessage,
    /// No secrets are left for the epoch of the message.
    #[error("No secrets are left for the epoch of the message.")]
    NoPastEpochData,
    /// The message was sent by ourselves.
    #[error("The message was sent by ourselves.")]
    OwnMessage,
    /// The sender of the message is not a member of the epoch.
    #[error("The sender of the message is not a member of the epoch.")]
    UnknownSender,
    /// The expected content type was not found.
    #[error("The expected content type was not found.")]
    UnexpectedContentType,
    /// A new member sender sent something other than a commit with a path.
    #[error("A new member sender sent something other than a commit with a path.")]
    InvalidNewMemberMessage,
    /// See [`SignatureError`] for more details.
    #[error("The signature of the message is invalid: {0}")]
    InvalidSignature(#[from] SignatureError),
    /// See [`MembershipTagError`] for more details.
    #[error(transparent)]
    MembershipTagError(#[from] MembershipTagError),
    /// See [`MessageDecryptionError`] for more details.
    #[error(transparent)]
    MessageDecryptionError(#[from] MessageDecryptionError),
    /// See [`StageCommitError`] for more details.
    #[error(transparent)]
    StageCommitError(#[from] StageCommitError),
    /// See [`ProposalValidationError`] for more details.
    #[error(transparent)]
    InvalidProposal(#[from] ProposalValidationError),
}

impl ErrorCategory for ProcessMessageError {
    fn kind(&self) -> ErrorKind {
        match self {
            ProcessMessageError::LibraryError(e) => e.kind(),
            ProcessMessageError::GroupNotActive
            | ProcessMessageError::UnsupportedWireFormat
            | ProcessMessageError::OwnMessage => ErrorKind::Usage,
            ProcessMessageError::IncompatibleWireFormat
            | ProcessMessageError::UnencryptedApplicationMessage
            | ProcessMessageError::WrongGroupId
            | ProcessMessageError::WrongEpoch
            | ProcessMessageError::PastEpochHandshakeMessage
            | ProcessMessageError::NoPastEpochData
            | ProcessMessageError::UnknownSender
            | ProcessMessageError::UnexpectedContentType
            | ProcessMessageError::InvalidNewMemberMessage => ErrorKind::Validation,
            ProcessMessageError::InvalidSignature(e) => e.kind(),
            ProcessMessageError::MembershipTagError(e) => e.kind(),
            ProcessMessageError::MessageDecryptionError(e) => e.kind(),
            ProcessMessageError::StageCommitError(e) => e.kind(),
            ProcessMessageError::InvalidProposal(e) => e.kind(),
        }
    }
}

/// Errors when staging a received commit.
#[derive(Error, Debug, PartialEq, Clone)]
pub enum StageCommitError {
    /// See [`LibraryError`] for more details.
    #[error(transparent)]
    LibraryError(#[from] LibraryError),
    /// The commit carries no confirmation tag.
    #[error("The commit carries no confirmation tag.")]
    MissingConfirmationTag,
    /// The confirmation tag does not match the one computed from the new epoch.
    #[error("The confirmation tag does not match the one computed from the new epoch.")]
    ConfirmationTagMismatch,
    /// The proposals require an update path but the commit has none.
    #[error("The proposals require an update path but the commit has none.")]
    RequiredPathNotFound,
    /// The resync removal of an external commit targets a different client.
    #[error("The resync removal of an external commit targets a different client.")]
    InvalidResyncRemoval,
    /// See [`ProposalValidationError`] for more details.
    #[error(transparent)]
    ProposalValidationError(#[from] ProposalValidationError),
    /// See [`ApplyUpdatePathError`] for more details.
    #[error(transparent)]
    UpdatePathError(#[from] ApplyUpdatePathError),
    /// See [`TreeSyncError`] for more details.
    #[error(transparent)]
    TreeSyncError(#[from] TreeSyncError),
    /// See [`PskError`] for more details.
    #[error(transparent)]
    Psk(#[from] PskError),
}

impl ErrorCategory for StageCommitError {
    fn kind(&self) -> ErrorKind {
        match self {
            StageCommitError::LibraryError(e) => e.kind(),
            StageCommitError::MissingConfirmationTag
            | StageCommitError::RequiredPathNotFound
            | StageCommitError::InvalidResyncRemoval => ErrorKind::Validation,
            StageCommitError::ConfirmationTagMismatch => ErrorKind::CryptoVerification,
            StageCommitError::ProposalValidationError(e) => e.kind(),
            StageCommitError::UpdatePathError(e) => e.kind(),
            StageCommitError::TreeSyncError(e) => e.kind(),
            StageCommitError::Psk(e) => e.kind(),
        }
    }
}

/// Welcome error
#[derive(Error, Debug, PartialEq, Clone)]
pub enum WelcomeError {
    /// See [`LibraryError`] for more details.
    #[error(transparent)]
    LibraryError(#[from] LibraryError),
    /// The ciphersuite of the Welcome does not match the key package.
    #[error("The ciphersuite of the Welcome does not match the key package.")]
    CiphersuiteMismatch,
    /// No joiner secret was found for the key package in the Welcome.
    #[error("No joiner secret was found for the key package in the Welcome.")]
    JoinerSecretNotFound,
    /// The group secrets could not be decrypted.
    #[error("The group secrets could not be decrypted.")]
    GroupSecretsDecryptionFailure,
    /// The group info could not be decrypted.
    #[error("The group info could not be decrypted.")]
    GroupInfoDecryptionFailure,
    /// The decrypted group info could not be decoded.
    #[error("The decrypted group info could not be decoded: {0}")]
    MalformedGroupInfo(#[from] tls_codec::Error),
    /// No ratchet tree was given and the group info has no ratchet tree extension.
    #[error("No ratchet tree was given and the group info has no ratchet tree extension.")]
    MissingRatchetTree,
    /// The ratchet tree is invalid.
    #[error(transparent)]
    InvalidRatchetTree(#[from] RatchetTreeError),
    /// The group info signature is invalid.
    #[error("The group info signature is invalid.")]
    InvalidGroupInfoSignature,
    /// The signer of the group info is not in the tree.
    #[error("The signer of the group info is not in the tree.")]
    UnknownGroupInfoSigner,
    /// The own leaf was not found in the tree.
    #[error("The own leaf was not found in the tree.")]
    OwnLeafNotFound,
    /// The confirmation tag of the group info does not match the epoch.
    #[error("The confirmation tag of the group info does not match the epoch.")]
    ConfirmationTagMismatch,
    /// The key package does not support the required capabilities of the group.
    #[error("The key package does not support the required capabilities of the group.")]
    UnsupportedCapability(#[from] LeafNodeValidationError),
    /// See [`PskError`] for more details.
    #[error(transparent)]
    Psk(#[from] PskError),
    /// The path secret does not match the tree.
    #[error(transparent)]
    PathSecretMismatch(#[from] ApplyUpdatePathError),
}

impl ErrorCategory for WelcomeError {
    fn kind(&self) -> ErrorKind {
        match self {
            WelcomeError::LibraryError(e) => e.kind(),
            WelcomeError::GroupSecretsDecryptionFailure
            | WelcomeError::GroupInfoDecryptionFailure
            | WelcomeError::InvalidGroupInfoSignature
            | WelcomeError::ConfirmationTagMismatch => ErrorKind::CryptoVerification,
            WelcomeError::MalformedGroupInfo(_) => ErrorKind::Codec,
            WelcomeError::InvalidRatchetTree(e) => e.kind(),
            WelcomeError::UnsupportedCapability(e) => e.kind(),
            WelcomeError::Psk(e) => e.kind(),
            WelcomeError::PathSecretMismatch(e) => e.kind(),
            WelcomeError::CiphersuiteMismatch
            | WelcomeError::JoinerSecretNotFound
            | WelcomeError::MissingRatchetTree
            | WelcomeError::UnknownGroupInfoSigner
            | WelcomeError::OwnLeafNotFound => ErrorKind::Validation,
        }
    }
}

/// External commit error
#[derive(Error, Debug, PartialEq, Clone)]
pub enum ExternalCommitError {
    /// See [`LibraryError`] for more details.
    #[error(transparent)]
    LibraryError(#[from] LibraryError),
    /// The ciphersuite of the group info does not match the configuration.
    #[error("The ciphersuite of the group info does not match the configuration.")]
    CiphersuiteMismatch,
    /// No ratchet tree was given and the group info has no ratchet tree extension.
    #[error("No ratchet tree was given and the group info has no ratchet tree extension.")]
    MissingRatchetTree,
    /// The group info has no external public key.
    #[error("The group info has no external public key.")]
    MissingExternalPub,
    /// The group info signature is invalid.
    #[error("The group info signature is invalid.")]
    InvalidGroupInfoSignature,
    /// The signer of the group info is not in the tree.
    #[error("The signer of the group info is not in the tree.")]
    UnknownGroupInfoSigner,
    /// The ratchet tree is invalid.
    #[error(transparent)]
    InvalidRatchetTree(#[from] RatchetTreeError),
    /// The leaf to resync is not in the tree or belongs to someone else.
    #[error("The leaf to resync is not in the tree or belongs to someone else.")]
    InvalidResyncLeaf,
    /// The own leaf could not be placed in the tree.
    #[error(transparent)]
    TreeSyncError(#[from] TreeSyncError),
    /// See [`PskError`] for more details.
    #[error(transparent)]
    Psk(#[from] PskError),
    /// The own leaf does not satisfy the group.
    #[error(transparent)]
    InvalidLeafNode(#[from] LeafNodeValidationError),
}

impl ErrorCategory for ExternalCommitError {
    fn kind(&self) -> ErrorKind {
        match self {
            ExternalCommitError::LibraryError(e) => e.kind(),
            ExternalCommitError::InvalidGroupInfoSignature => ErrorKind::CryptoVerification,
            ExternalCommitError::InvalidRatchetTree(e) => e.kind(),
            ExternalCommitError::TreeSyncError(e) => e.kind(),
            ExternalCommitError::Psk(e) => e.kind(),
            ExternalCommitError::InvalidLeafNode(e) => e.kind(),
            ExternalCommitError::CiphersuiteMismatch
            | ExternalCommitError::MissingRatchetTree
            | ExternalCommitError::MissingExternalPub
            | ExternalCommitError::UnknownGroupInfoSigner
            | ExternalCommitError::InvalidResyncLeaf => ErrorKind::Validation,
        }
    }
}

/// Errors when creating an application message.
#[derive(Error, Debug, PartialEq, Clone)]
pub enum CreateMessageError {
    /// See [`LibraryError`] for more details.
    #[error(transparent)]
    LibraryError(#[from] LibraryError),
    /// The group is not active anymore.
    #[error("The group is not active anymore.")]
    GroupNotActive,
    /// See [`MessageEncryptionError`] for more details.
    #[error(transparent)]
    MessageEncryptionError(#[from] MessageEncryptionError),
}

impl ErrorCategory for CreateMessageError {
    fn kind(&self) -> ErrorKind {
        match self {
            CreateMessageError::LibraryError(e) => e.kind(),
            CreateMessageError::GroupNotActive => ErrorKind::Usage,
            CreateMessageError::MessageEncryptionError(e) => e.kind(),
        }
    }
}

/// Exporter error
#[derive(Error, Debug, PartialEq, Clone)]
pub enum ExportSecretError {
    /// See [`LibraryError`] for more details.
    #[error(transparent)]
    LibraryError(#[from] LibraryError),
    /// The requested key length is not supported (too large).
    #[error("The requested key length is not supported (too large).")]
    KeyLengthTooLong,
    /// The group is not active anymore.
    #[error("The group is not active anymore.")]
    GroupNotActive,
}

impl ErrorCategory for ExportSecretError {
    fn kind(&self) -> ErrorKind {
        match self {
            ExportSecretError::LibraryError(e) => e.kind(),
            ExportSecretError::KeyLengthTooLong | ExportSecretError::GroupNotActive => {
                ErrorKind::Usage
            }
        }
    }
}
