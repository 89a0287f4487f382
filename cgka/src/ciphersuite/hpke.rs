//! ### Public-Key Encryption
//!
//! A label and context are included in every HPKE operation so ciphertexts
//! produced for different purposes can never be confused:
//!
//! ```text
//! EncryptWithLabel(PublicKey, Label, Context, Plaintext) =
//!   SealBase(PublicKey, EncryptContext, "", Plaintext)
//!
//! DecryptWithLabel(PrivateKey, Label, Context, KEMOutput, Ciphertext) =
//!   OpenBase(KEMOutput, PrivateKey, EncryptContext, "", Ciphertext)
//!
//! struct {
//!   opaque label<V>;
//!   opaque context<V>;
//! } EncryptContext;
//! ```
//!
//! with `label = "MLS 1.0 " + Label`.

use cgka_traits::{
    crypto::CgkaCrypto,
    types::{Ciphersuite, CryptoError, HpkeCiphertext},
};
use thiserror::Error;
use tls_codec::{Serialize, TlsSerialize, TlsSize, VLBytes};

use super::LABEL_PREFIX;

/// HPKE labeled encryption errors.
#[derive(Error, Debug, PartialEq, Clone)]
pub enum Error {
    /// Error while serializing content. This should only happen if a bounds
    /// check was missing.
    #[error(
        "Error while serializing content. This should only happen if a bounds check was missing."
    )]
    MissingBoundCheck,

    /// Encryption failed.
    #[error("Encryption failed.")]
    EncryptionFailed,

    /// Decryption failed.
    #[error("Decryption failed.")]
    DecryptionFailed,
}

impl From<tls_codec::Error> for Error {
    fn from(_: tls_codec::Error) -> Self {
        Self::MissingBoundCheck
    }
}

/// Context for HPKE encryption
#[derive(Debug, Clone, TlsSerialize, TlsSize)]
struct EncryptContext {
    /// Prefixed with LABEL_PREFIX
    label: VLBytes,
    context: VLBytes,
}

impl EncryptContext {
    fn new(label: &str, context: &[u8]) -> Self {
        let label = format!("{LABEL_PREFIX}{label}");
        Self {
            label: label.as_bytes().into(),
            context: context.into(),
        }
    }
}

/// Encrypt to an HPKE key with a label.
pub(crate) fn encrypt_with_label(
    public_key: &[u8],
    label: &str,
    context: &[u8],
    plaintext: &[u8],
    ciphersuite: Ciphersuite,
    crypto: &impl CgkaCrypto,
) -> Result<HpkeCiphertext, Error> {
    let info = EncryptContext::new(label, context).tls_serialize_detached()?;

    log_crypto!(
        debug,
        "HPKE Encrypt with label `{label}` and ciphersuite `{ciphersuite:?}`:"
    );
    log_crypto!(debug, "* info:        {info:x?}");
    log_crypto!(debug, "* public key:  {public_key:x?}");
    log_crypto!(debug, "* plaintext:   {plaintext:x?}");

    crypto
        .hpke_seal(ciphersuite.hpke_config(), public_key, &info, &[], plaintext)
        .map_err(|e| {
            log::error!("HPKE encryption failed: {e:?}");
            Error::EncryptionFailed
        })
}

/// Decrypt with HPKE and label.
pub(crate) fn decrypt_with_label(
    private_key: &[u8],
    label: &str,
    context: &[u8],
    ciphertext: &HpkeCiphertext,
    ciphersuite: Ciphersuite,
    crypto: &impl CgkaCrypto,
) -> Result<Vec<u8>, Error> {
    let info = EncryptContext::new(label, context).tls_serialize_detached()?;

    log_crypto!(
        debug,
        "HPKE Decrypt with label `{label}` and `ciphersuite` {ciphersuite:?}:"
    );
    log_crypto!(debug, "* info:        {info:x?}");
    log_crypto!(debug, "* private key: {private_key:x?}");
    log_crypto!(debug, "* ciphertext:  {ciphertext:x?}");

    crypto
        .hpke_open(
            ciphersuite.hpke_config(),
            ciphertext,
            private_key,
            &info,
            &[],
        )
        .map_err(|_: CryptoError| Error::DecryptionFailed)
}
