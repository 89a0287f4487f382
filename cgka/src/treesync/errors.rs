//! Errors of the ratchet tree and of TreeKEM.

use thiserror::Error;

use crate::{
    binary_tree::TreeMathError,
    error::{ErrorCategory, ErrorKind, LibraryError},
};

/// Errors of structural tree operations.
#[derive(Error, Debug, PartialEq, Clone)]
pub enum TreeSyncError {
    /// See [`LibraryError`] for more details.
    #[error(transparent)]
    LibraryError(#[from] LibraryError),
    /// The leaf index is outside of the tree or the leaf is blank.
    #[error("The leaf index is outside of the tree or the leaf is blank.")]
    LeafNotInTree,
    /// The tree can't grow any further.
    #[error("The tree can't grow any further.")]
    TreeFull,
    /// See [`TreeMathError`] for more details.
    #[error(transparent)]
    TreeMathError(#[from] TreeMathError),
}

impl ErrorCategory for TreeSyncError {
    fn kind(&self) -> ErrorKind {
        match self {
            TreeSyncError::LibraryError(e) => e.kind(),
            TreeSyncError::LeafNotInTree | TreeSyncError::TreeFull => ErrorKind::Validation,
            TreeSyncError::TreeMathError(e) => e.kind(),
        }
    }
}

/// Errors when importing a ratchet tree from a list of nodes.
#[derive(Error, Debug, PartialEq, Clone)]
pub enum RatchetTreeError {
    /// See [`LibraryError`] for more details.
    #[error(transparent)]
    LibraryError(#[from] LibraryError),
    /// The list of nodes does not describe a valid tree.
    #[error("The list of nodes does not describe a valid tree.")]
    MalformedTree,
    /// The tree hash does not match the one in the group context.
    #[error("The tree hash does not match the one in the group context.")]
    TreeHashMismatch,
    /// At least one parent node is not covered by exactly one parent hash chain.
    #[error("At least one parent node is not covered by exactly one parent hash chain.")]
    ParentHashMismatch,
    /// Two leaves share an encryption or a signature key.
    #[error("Two leaves share an encryption or a signature key.")]
    DuplicateKey,
    /// See [`LeafNodeValidationError`] for more details.
    #[error(transparent)]
    InvalidLeafNode(#[from] LeafNodeValidationError),
}

impl ErrorCategory for RatchetTreeError {
    fn kind(&self) -> ErrorKind {
        match self {
            RatchetTreeError::LibraryError(e) => e.kind(),
            RatchetTreeError::InvalidLeafNode(e) => e.kind(),
            RatchetTreeError::MalformedTree
            | RatchetTreeError::TreeHashMismatch
            | RatchetTreeError::ParentHashMismatch
            | RatchetTreeError::DuplicateKey => ErrorKind::Validation,
        }
    }
}

/// Leaf node validation errors.
#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum LeafNodeValidationError {
    /// The leaf node signature is not valid.
    #[error("The leaf node signature is not valid.")]
    InvalidSignature,
    /// The tree position is required to verify this leaf node.
    #[error("The tree position is required to verify this leaf node.")]
    MissingTreePosition,
    /// Extensions are not acceptable.
    #[error("Extensions are not acceptable.")]
    UnsupportedExtensions,
    /// Proposals are not acceptable.
    #[error("Proposals are not acceptable.")]
    UnsupportedProposals,
    /// Credentials are not acceptable.
    #[error("Credentials are not acceptable.")]
    UnsupportedCredentials,
    /// The group's ciphersuite is not listed in the leaf node's capabilities.
    #[error("The group's ciphersuite is not listed in the leaf node's capabilities.")]
    CiphersuiteNotInCapabilities,
    /// The leaf node's signature key is already used in the group.
    #[error("The leaf node's signature key is already used in the group.")]
    SignatureKeyAlreadyInUse,
    /// The leaf node's encryption key is already used in the group.
    #[error("The leaf node's encryption key is already used in the group.")]
    EncryptionKeyAlreadyInUse,
    /// The leaf node source is invalid in the given context.
    #[error("The leaf node source is invalid in the given context.")]
    InvalidLeafNodeSource,
    /// The leaf node credential is not supported by all members in the group.
    #[error("The leaf node credential is not supported by all members in the group.")]
    LeafNodeCredentialNotSupportedByMember,
    /// The credential used by a member is not supported by this leaf node.
    #[error("The credential used by a member is not supported by this leaf node.")]
    MemberCredentialNotSupportedByLeafNode,
    /// The authentication service rejected the credential.
    #[error("The authentication service rejected the credential.")]
    InvalidCredential,
}

impl ErrorCategory for LeafNodeValidationError {
    fn kind(&self) -> ErrorKind {
        match self {
            LeafNodeValidationError::InvalidSignature => ErrorKind::CryptoVerification,
            _ => ErrorKind::Validation,
        }
    }
}

/// Errors when deriving or decrypting path secrets.
#[derive(Error, Debug, PartialEq, Clone)]
pub enum PathSecretError {
    /// See [`LibraryError`] for more details.
    #[error(transparent)]
    LibraryError(#[from] LibraryError),
    /// The path secret could not be decrypted.
    #[error("The path secret could not be decrypted.")]
    DecryptionError,
}

impl ErrorCategory for PathSecretError {
    fn kind(&self) -> ErrorKind {
        match self {
            PathSecretError::LibraryError(e) => e.kind(),
            PathSecretError::DecryptionError => ErrorKind::CryptoVerification,
        }
    }
}

/// Errors when applying or decrypting a received update path.
#[derive(Error, Debug, PartialEq, Clone)]
pub enum ApplyUpdatePathError {
    /// See [`LibraryError`] for more details.
    #[error(transparent)]
    LibraryError(#[from] LibraryError),
    /// The update path does not have one node per node on the direct path.
    #[error("The update path does not have one node per node on the direct path.")]
    PathLengthMismatch,
    /// The sender's leaf is not part of the tree.
    #[error("The sender's leaf is not part of the tree.")]
    UnknownSender,
    /// The parent hash of the new leaf node does not match the path.
    #[error("The parent hash of the new leaf node does not match the path.")]
    ParentHashMismatch,
    /// A key derived from the path secret does not match the update path.
    #[error("A key derived from the path secret does not match the update path.")]
    PathMismatch,
    /// The update path node has no ciphertext for our position.
    #[error("The update path node has no ciphertext for our position.")]
    MissingCiphertext,
    /// None of our private keys matches the resolution the path secret was
    /// encrypted to.
    #[error("None of our private keys matches the resolution the path secret was encrypted to.")]
    NoMatchingKey,
    /// See [`LeafNodeValidationError`] for more details.
    #[error(transparent)]
    InvalidLeafNode(#[from] LeafNodeValidationError),
    /// See [`PathSecretError`] for more details.
    #[error(transparent)]
    PathSecretError(#[from] PathSecretError),
}

impl ErrorCategory for ApplyUpdatePathError {
    fn kind(&self) -> ErrorKind {
        match self {
            ApplyUpdatePathError::LibraryError(e) => e.kind(),
            ApplyUpdatePathError::InvalidLeafNode(e) => e.kind(),
            ApplyUpdatePathError::PathSecretError(e) => e.kind(),
            ApplyUpdatePathError::NoMatchingKey => ErrorKind::Internal,
            ApplyUpdatePathError::PathLengthMismatch
            | ApplyUpdatePathError::UnknownSender
            | ApplyUpdatePathError::ParentHashMismatch
            | ApplyUpdatePathError::PathMismatch
            | ApplyUpdatePathError::MissingCiphertext => ErrorKind::Validation,
        }
    }
}

impl From<TreeMathError> for ApplyUpdatePathError {
    fn from(_: TreeMathError) -> Self {
        ApplyUpdatePathError::UnknownSender
    }
}
