use cgka_traits::{crypto::CgkaCrypto, random::CgkaRand, types::CryptoError};
use tls_codec::{TlsDeserialize, TlsSerialize, TlsSize, VLBytes};

use super::{equal_ct, kdf_label::KdfLabel, Ciphersuite};

/// A struct to contain secrets. This is to provide better visibility into where
/// and how secrets are used and to avoid passing secrets in their raw
/// representation.
#[derive(Clone, TlsSerialize, TlsDeserialize, TlsSize)]
pub(crate) struct Secret {
    value: VLBytes,
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ds = f.debug_struct("Secret");

        #[cfg(feature = "crypto-debug")]
        return ds.field("value", &self.value).finish();
        #[cfg(not(feature = "crypto-debug"))]
        ds.field("value", &"***").finish()
    }
}

impl PartialEq for Secret {
    // Constant time comparison.
    fn eq(&self, other: &Secret) -> bool {
        equal_ct(self.value.as_slice(), other.value.as_slice())
    }
}

impl Eq for Secret {}

impl Secret {
    /// Randomly sample a fresh `Secret` of `hash_length` bytes.
    ///
    /// Returns a [`CryptoError`] if there is insufficient randomness.
    pub(crate) fn random(
        ciphersuite: Ciphersuite,
        rand: &impl CgkaRand,
    ) -> Result<Self, CryptoError> {
        log::trace!("Creating a new random secret for {:?}", ciphersuite);
        Ok(Secret {
            value: rand
                .random_vec(ciphersuite.hash_length())
                .map_err(|_| CryptoError::InsufficientRandomness)?
                .into(),
        })
    }

    /// Create an all zero secret of `hash_length` bytes.
    pub(crate) fn zero(ciphersuite: Ciphersuite) -> Self {
        Self {
            value: crate::utils::zero(ciphersuite.hash_length()).into(),
        }
    }

    /// Create a new secret from a byte slice.
    pub(crate) fn from_slice(bytes: &[u8]) -> Self {
        Secret {
            value: bytes.into(),
        }
    }

    /// HKDF extract where `self` is `salt`.
    pub(crate) fn hkdf_extract(
        &self,
        crypto: &impl CgkaCrypto,
        ciphersuite: Ciphersuite,
        ikm: &Secret,
    ) -> Result<Self, CryptoError> {
        log::trace!("HKDF extract with {:?}", ciphersuite);
        log_crypto!(trace, "  salt: {:x?}", self.value);
        log_crypto!(trace, "  ikm:  {:x?}", ikm.value);

        Ok(Self {
            value: crypto
                .hkdf_extract(
                    ciphersuite.hash_algorithm(),
                    self.value.as_slice(),
                    ikm.value.as_slice(),
                )?
                .into(),
        })
    }

    /// HKDF expand where `self` is `prk`.
    pub(crate) fn hkdf_expand(
        &self,
        crypto: &impl CgkaCrypto,
        ciphersuite: Ciphersuite,
        info: &[u8],
        okm_len: usize,
    ) -> Result<Self, CryptoError> {
        let key = crypto.hkdf_expand(
            ciphersuite.hash_algorithm(),
            self.value.as_slice(),
            info,
            okm_len,
        )?;
        if key.is_empty() {
            return Err(CryptoError::InvalidLength);
        }
        Ok(Self { value: key.into() })
    }

    /// Expand a `Secret` to a new `Secret` of length `length` including a
    /// `label` and a `context`.
    pub(crate) fn kdf_expand_label(
        &self,
        crypto: &impl CgkaCrypto,
        ciphersuite: Ciphersuite,
        label: &str,
        context: &[u8],
        length: usize,
    ) -> Result<Secret, CryptoError> {
        log::trace!(
            "KDF expand with label \"{}\" and {:?} with context {:x?}",
            label,
            ciphersuite,
            context
        );
        let info = KdfLabel::serialized_label(context, label, length)?;
        log::trace!("  serialized info: {:x?}", info);
        log_crypto!(trace, "  secret: {:x?}", self.value);
        self.hkdf_expand(crypto, ciphersuite, &info, length)
    }

    /// Derive a new `Secret` from the this one by expanding it with the given
    /// `label` and an empty `context`.
    pub(crate) fn derive_secret(
        &self,
        crypto: &impl CgkaCrypto,
        ciphersuite: Ciphersuite,
        label: &str,
    ) -> Result<Secret, CryptoError> {
        log_crypto!(
            trace,
            "derive secret from {:x?} with label {} and {:?}",
            self.value,
            label,
            ciphersuite
        );
        self.kdf_expand_label(crypto, ciphersuite, label, &[], ciphersuite.hash_length())
    }

    /// Returns the inner bytes of a secret
    pub(crate) fn as_slice(&self) -> &[u8] {
        self.value.as_slice()
    }
}

#[cfg(any(feature = "test-utils", test))]
impl From<&[u8]> for Secret {
    fn from(bytes: &[u8]) -> Self {
        Self::from_slice(bytes)
    }
}
