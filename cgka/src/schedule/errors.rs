//! Key schedule errors.

use thiserror::Error;

use crate::{
    error::{ErrorCategory, ErrorKind, LibraryError},
    schedule::psk::{PreSharedKeyId, ResumptionPskUsage},
};

/// PSK error
#[derive(Error, Debug, PartialEq, Clone)]
pub enum PskError {
    /// See [`LibraryError`] for more details.
    #[error(transparent)]
    LibraryError(#[from] LibraryError),
    /// More than 2^16 PSKs were provided.
    #[error("More than 2^16 PSKs were provided.")]
    TooManyKeys,
    /// The PSK could not be found.
    #[error("The PSK could not be found.")]
    KeyNotFound,
    /// Usage mismatch.
    #[error("Usage mismatch. Expected either of `{allowed:?}`, got `{got:?}`.")]
    UsageMismatch {
        /// Allowed PSK usages.
        allowed: Vec<ResumptionPskUsage>,
        /// Got PSK usage.
        got: ResumptionPskUsage,
    },
    /// Nonce length mismatch.
    #[error("Nonce length mismatch. Expected `{expected:?}`, got `{got:?}`.")]
    NonceLengthMismatch {
        /// Expected nonce length.
        expected: usize,
        /// Got nonce length.
        got: usize,
    },
    /// Duplicate PSK ID.
    #[error("Duplicate PSK ID. First detected duplicate is `{first:?}`.")]
    Duplicate {
        /// First detected duplicate.
        first: PreSharedKeyId,
    },
}

impl ErrorCategory for PskError {
    fn kind(&self) -> ErrorKind {
        match self {
            PskError::LibraryError(_) => ErrorKind::Internal,
            PskError::TooManyKeys
            | PskError::KeyNotFound
            | PskError::UsageMismatch { .. }
            | PskError::NonceLengthMismatch { .. }
            | PskError::Duplicate { .. } => ErrorKind::Validation,
        }
    }
}

// === Crate ===

#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub(crate) enum ErrorState {
    #[error("Expected to be in initial state.")]
    Init,
    #[error("Expected to be in epoch state.")]
    Context,
}

#[derive(Error, Debug, PartialEq, Clone)]
pub(crate) enum KeyScheduleError {
    #[error(transparent)]
    LibraryError(#[from] LibraryError),
    #[error(transparent)]
    InvalidState(#[from] ErrorState),
}

impl From<KeyScheduleError> for LibraryError {
    fn from(e: KeyScheduleError) -> Self {
        match e {
            KeyScheduleError::LibraryError(e) => e,
            KeyScheduleError::InvalidState(_) => {
                LibraryError::custom("Key schedule used in the wrong state")
            }
        }
    }
}
