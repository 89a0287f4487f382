//! # Framing errors.
//!
//! Errors thrown when protecting or unprotecting messages.

use thiserror::Error;

use crate::{
    error::{ErrorCategory, ErrorKind, LibraryError},
    tree::secret_tree::SecretTreeError,
};

/// Message encryption error
#[derive(Error, Debug, PartialEq, Clone)]
pub enum MessageEncryptionError {
    /// See [`LibraryError`] for more details.
    #[error(transparent)]
    LibraryError(#[from] LibraryError),
    /// The content is not meant to be sent as a private message.
    #[error("The content is not meant to be sent as a private message.")]
    WrongWireFormat,
    /// See [`SecretTreeError`] for more details.
    #[error(transparent)]
    SecretTreeError(#[from] SecretTreeError),
}

impl ErrorCategory for MessageEncryptionError {
    fn kind(&self) -> ErrorKind {
        match self {
            MessageEncryptionError::LibraryError(_) => ErrorKind::Internal,
            MessageEncryptionError::WrongWireFormat => ErrorKind::Usage,
            MessageEncryptionError::SecretTreeError(e) => e.kind(),
        }
    }
}

/// Message decryption error
#[derive(Error, Debug, PartialEq, Clone)]
pub enum MessageDecryptionError {
    /// See [`LibraryError`] for more details.
    #[error(transparent)]
    LibraryError(#[from] LibraryError),
    /// Couldn't decrypt the sender data.
    #[error("Couldn't decrypt the sender data.")]
    SenderDataDecryptionError,
    /// Couldn't decrypt the message content.
    #[error("Couldn't decrypt the message content.")]
    AeadError,
    /// The decrypted content could not be decoded.
    #[error("The decrypted content could not be decoded.")]
    MalformedContent,
    /// The padding of the decrypted content contains non-zero bytes.
    #[error("The padding of the decrypted content contains non-zero bytes.")]
    InvalidPadding,
    /// See [`SecretTreeError`] for more details.
    #[error(transparent)]
    SecretTreeError(#[from] SecretTreeError),
}

impl ErrorCategory for MessageDecryptionError {
    fn kind(&self) -> ErrorKind {
        match self {
            MessageDecryptionError::LibraryError(_) => ErrorKind::Internal,
            MessageDecryptionError::SenderDataDecryptionError
            | MessageDecryptionError::AeadError => ErrorKind::CryptoVerification,
            MessageDecryptionError::MalformedContent | MessageDecryptionError::InvalidPadding => {
                ErrorKind::Codec
            }
            MessageDecryptionError::SecretTreeError(e) => e.kind(),
        }
    }
}

/// Membership tag error
#[derive(Error, Debug, PartialEq, Clone)]
pub enum MembershipTagError {
    /// See [`LibraryError`] for more details.
    #[error(transparent)]
    LibraryError(#[from] LibraryError),
    /// A public message of a member carries no membership tag.
    #[error("A public message of a member carries no membership tag.")]
    MissingMembershipTag,
    /// The membership tag is invalid.
    #[error("The membership tag is invalid.")]
    InvalidMembershipTag,
}

impl ErrorCategory for MembershipTagError {
    fn kind(&self) -> ErrorKind {
        match self {
            MembershipTagError::LibraryError(_) => ErrorKind::Internal,
            MembershipTagError::MissingMembershipTag => ErrorKind::Validation,
            MembershipTagError::InvalidMembershipTag => ErrorKind::CryptoVerification,
        }
    }
}
