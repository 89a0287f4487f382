//! Signatures.
//!
//! Wrappers for signature values and signature public keys, and the error
//! returned when signing or verifying fails.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tls_codec::{TlsDeserialize, TlsSerialize, TlsSize, VLBytes};

use crate::error::{ErrorCategory, ErrorKind, LibraryError};

/// Signature.
#[derive(
    Debug, PartialEq, Eq, Clone, Serialize, Deserialize, TlsDeserialize, TlsSerialize, TlsSize,
)]
pub struct Signature {
    value: VLBytes,
}

impl Signature {
    pub(crate) fn as_slice(&self) -> &[u8] {
        self.value.as_slice()
    }

    #[cfg(any(feature = "test-utils", test))]
    pub fn modify(&mut self, value: &[u8]) {
        self.value = value.to_vec().into();
    }
}

impl From<Vec<u8>> for Signature {
    fn from(value: Vec<u8>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

/// A public signature key.
#[derive(
    Debug,
    PartialEq,
    Eq,
    Hash,
    Clone,
    Serialize,
    Deserialize,
    TlsDeserialize,
    TlsSerialize,
    TlsSize,
)]
pub struct SignaturePublicKey {
    value: VLBytes,
}

impl SignaturePublicKey {
    /// Returns the bytes of the public key.
    pub fn as_slice(&self) -> &[u8] {
        self.value.as_slice()
    }
}

impl From<Vec<u8>> for SignaturePublicKey {
    fn from(value: Vec<u8>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

impl From<&[u8]> for SignaturePublicKey {
    fn from(value: &[u8]) -> Self {
        Self {
            value: value.into(),
        }
    }
}

/// Signature generation and verification errors.
#[derive(Error, Debug, PartialEq, Clone)]
pub enum SignatureError {
    /// See [`LibraryError`] for more details.
    #[error(transparent)]
    LibraryError(#[from] LibraryError),
    /// Signing failed.
    #[error("Signing failed.")]
    SigningError,
    /// The signature is not valid.
    #[error("The signature is not valid.")]
    VerificationError,
}

impl ErrorCategory for SignatureError {
    fn kind(&self) -> ErrorKind {
        match self {
            SignatureError::LibraryError(e) => e.kind(),
            SignatureError::SigningError => ErrorKind::Internal,
            SignatureError::VerificationError => ErrorKind::CryptoVerification,
        }
    }
}
