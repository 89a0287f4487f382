//! # Extension errors.
//!
//! An `ExtensionError` is thrown when an extension is invalid (for example when
//! decoding from raw bytes) or when a check on an extension fails.

use thiserror::Error;

use crate::error::{ErrorCategory, ErrorKind, LibraryError};

/// Extension error
#[derive(Error, Debug, PartialEq, Clone)]
pub enum ExtensionError {
    /// Unsupported proposal type in required capabilities.
    #[error("Unsupported proposal type in required capabilities.")]
    UnsupportedProposalType,
    /// Unsupported extension type in required capabilities.
    #[error("Unsupported extension type in required capabilities.")]
    UnsupportedExtensionType,
    /// See [`LibraryError`] for more details.
    #[error(transparent)]
    LibraryError(#[from] LibraryError),
    /// See [`tls_codec::Error`] for more details.
    #[error(transparent)]
    CodecError(#[from] tls_codec::Error),
    /// See [`InvalidExtensionError`] for more details.
    #[error(transparent)]
    InvalidExtension(#[from] InvalidExtensionError),
}

impl ErrorCategory for ExtensionError {
    fn kind(&self) -> ErrorKind {
        match self {
            ExtensionError::LibraryError(e) => e.kind(),
            ExtensionError::CodecError(_) => ErrorKind::Codec,
            ExtensionError::UnsupportedProposalType
            | ExtensionError::UnsupportedExtensionType
            | ExtensionError::InvalidExtension(_) => ErrorKind::Validation,
        }
    }
}

/// Invalid extension error
#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum InvalidExtensionError {
    /// The provided extension list contains duplicate extensions.
    #[error("The provided extension list contains duplicate extensions.")]
    Duplicate,
    /// The specified extension could not be found.
    #[error("The specified extension could not be found.")]
    NotFound,
    /// The extension is not allowed in this context.
    #[error("The extension is not allowed in this context.")]
    IllegalInContext,
}

impl ErrorCategory for InvalidExtensionError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}
