//! # Ciphersuites
//!
//! The ciphersuite module holds the wrappers around the provider's crypto
//! functions: secrets and labeled key derivation, AEAD keys and nonces, MACs,
//! labeled HPKE encryption, labeled signatures and hash references.

use serde::{Deserialize, Serialize};
use tls_codec::{TlsDeserialize, TlsSerialize, TlsSize, VLBytes};

pub use cgka_traits::types::{
    AeadType, Ciphersuite, HashType, HpkeCiphertext, HpkeKeyPair, HpkePrivateKey, SignatureScheme,
};

mod aead;
mod kdf_label;
mod mac;
mod reuse_guard;
mod secret;

pub mod hash_ref;
pub mod hpke;
pub mod signable;
pub mod signature;

pub use aead::{AeadKey, AeadNonce};
pub use mac::Mac;
pub(crate) use reuse_guard::*;
pub(crate) use secret::*;

pub use signature::{Signature, SignaturePublicKey};

#[cfg(test)]
mod tests;

/// The prefix prepended to every label used in key derivation, signatures,
/// HPKE and hash references.
pub(crate) const LABEL_PREFIX: &str = "MLS 1.0 ";

/// The default NONCE size in bytes.
pub(crate) const NONCE_BYTES: usize = 12;

/// Re-use guard size.
pub(crate) const REUSE_GUARD_BYTES: usize = 4;

/// A public HPKE key, used as encryption key of tree nodes and as init key of
/// key packages.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    TlsSerialize,
    TlsDeserialize,
    TlsSize,
)]
pub struct HpkePublicKey(VLBytes);

impl HpkePublicKey {
    /// Returns the key as byte slice.
    pub fn as_slice(&self) -> &[u8] {
        self.0.as_slice()
    }
}

impl From<Vec<u8>> for HpkePublicKey {
    fn from(value: Vec<u8>) -> Self {
        Self(value.into())
    }
}

impl From<&[u8]> for HpkePublicKey {
    fn from(value: &[u8]) -> Self {
        Self(value.into())
    }
}

/// Compare two byte slices in a way that's hopefully not optimised out by the
/// compiler.
#[inline(never)]
pub(crate) fn equal_ct(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for i in 0..a.len() {
        diff |= a[i] ^ b[i];
    }
    diff == 0
}
