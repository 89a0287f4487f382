//! Key package errors.

use cgka_traits::types::CryptoError;
use thiserror::Error;

use crate::{
    error::{ErrorCategory, ErrorKind, LibraryError},
    treesync::errors::LeafNodeValidationError,
};

/// Key package verify error
#[derive(Error, Debug, PartialEq, Clone)]
pub enum KeyPackageVerifyError {
    /// See [`LibraryError`] for more details.
    #[error(transparent)]
    LibraryError(#[from] LibraryError),
    /// The leaf node of the key package is not of type `key_package`.
    #[error("The leaf node of the key package is not of type `key_package`.")]
    InvalidLeafNodeSourceType,
    /// The lifetime of the leaf node is not valid.
    #[error("The lifetime of the leaf node is not valid.")]
    InvalidLifetime,
    /// The lifetime of the leaf node is longer than the client accepts.
    #[error("The lifetime of the leaf node is longer than the client accepts.")]
    LifetimeTooLong,
    /// The key package uses a different ciphersuite than expected.
    #[error("The key package uses a different ciphersuite than expected.")]
    InvalidCiphersuite,
    /// The key package uses a different protocol version than expected.
    #[error("The key package uses a different protocol version than expected.")]
    InvalidProtocolVersion,
    /// The leaf node does not list the ciphersuite or the protocol version of the key package in its capabilities.
    #[error("The leaf node does not list the ciphersuite or the protocol version of the key package in its capabilities.")]
    UnsupportedCapabilities,
    /// The key package extensions are not supported by the leaf node.
    #[error("The key package extensions are not supported by the leaf node.")]
    UnsupportedExtension,
    /// The init key and the encryption key are equal.
    #[error("The init key and the encryption key are equal.")]
    InitKeyEqualsEncryptionKey,
    /// The key package signature is not valid.
    #[error("The key package signature is not valid.")]
    InvalidSignature,
    /// The leaf node is not valid.
    #[error(transparent)]
    InvalidLeafNode(#[from] LeafNodeValidationError),
}

impl ErrorCategory for KeyPackageVerifyError {
    fn kind(&self) -> ErrorKind {
        match self {
            KeyPackageVerifyError::LibraryError(e) => e.kind(),
            KeyPackageVerifyError::InvalidSignature => ErrorKind::CryptoVerification,
            KeyPackageVerifyError::InvalidLeafNode(e) => e.kind(),
            _ => ErrorKind::Validation,
        }
    }
}

/// Key package new error
#[derive(Error, Debug, PartialEq, Clone)]
pub enum KeyPackageNewError {
    /// See [`LibraryError`] for more details.
    #[error(transparent)]
    LibraryError(#[from] LibraryError),
    /// The ciphersuite does not match the signature scheme.
    #[error("The ciphersuite does not match the signature scheme.")]
    CiphersuiteSignatureSchemeMismatch,
    /// The crypto provider failed to generate a key.
    #[error(transparent)]
    CryptoError(#[from] CryptoError),
}

impl ErrorCategory for KeyPackageNewError {
    fn kind(&self) -> ErrorKind {
        match self {
            KeyPackageNewError::LibraryError(e) => e.kind(),
            KeyPackageNewError::CiphersuiteSignatureSchemeMismatch => ErrorKind::Usage,
            KeyPackageNewError::CryptoError(_) => ErrorKind::Internal,
        }
    }
}
