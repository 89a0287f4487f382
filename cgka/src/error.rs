//! # Errors
//!
//! Each module has their own errors it is returning. This module defines the
//! [`LibraryError`] shared by all of them and the [`ErrorKind`] taxonomy every
//! public error maps to.
//!
//! | Kind | Meaning |
//! |:--|:--|
//! | [`ErrorKind::Validation`] | a protocol rule was violated by the input |
//! | [`ErrorKind::CryptoVerification`] | a signature, confirmation tag or membership tag did not verify |
//! | [`ErrorKind::Codec`] | malformed wire bytes |
//! | [`ErrorKind::Usage`] | the caller used the API in a way the current state does not allow |
//! | [`ErrorKind::Internal`] | a broken invariant inside the library |
//!
//! None of the errors is retried internally. An operation either returns a new
//! state or leaves the input state untouched.

use cgka_traits::types::CryptoError;
use thiserror::Error;
use tls_codec::Error as TlsCodecError;

/// Generic error type that indicates unrecoverable errors in the library.
///
/// This error has 3 subtypes:
///
/// **MissingBoundsCheck**
///
/// This error is returned when the library tries to serialize data that is too
/// big for the wire structs. This should not happen when all input values are
/// checked.
///
/// **CryptoError**
///
/// This error is returned if the underlying crypto provider encountered an
/// unexpected error, e.g. because it does not support a required function.
///
/// **Custom**
///
/// This error is returned in situations where the implementation would
/// otherwise use an `unwrap()`. The string gives context about where the error
/// originated.
#[derive(Error, Debug, PartialEq, Clone)]
pub enum LibraryError {
    #[error(transparent)]
    MissingBoundsCheck(#[from] TlsCodecError),
    #[error(transparent)]
    CryptoError(#[from] CryptoError),
    #[error("Custom library error: {0}")]
    Custom(&'static str),
}

impl LibraryError {
    pub(crate) fn custom(s: &'static str) -> Self {
        log::error!("Library error: {}", s);
        Self::Custom(s)
    }

    /// Used when encoding doesn't work because of missing bound checks
    pub(crate) fn missing_bound_check(e: TlsCodecError) -> Self {
        log::error!("Library error: missing bounds check ({:?})", e);
        Self::MissingBoundsCheck(e)
    }

    /// Used when the crypto provider returns an unexpected error
    pub(crate) fn unexpected_crypto_error(e: CryptoError) -> Self {
        log::error!("Library error: unexpected crypto error ({:?})", e);
        Self::CryptoError(e)
    }
}

/// The category of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    CryptoVerification,
    Codec,
    Usage,
    Internal,
}

/// Maps an error to its [`ErrorKind`].
pub trait ErrorCategory {
    fn kind(&self) -> ErrorKind;
}

impl ErrorCategory for LibraryError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Internal
    }
}

impl ErrorCategory for TlsCodecError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Codec
    }
}
