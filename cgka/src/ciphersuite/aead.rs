use cgka_traits::{crypto::CgkaCrypto, types::CryptoError};

use super::{AeadType, Ciphersuite, ReuseGuard, Secret, NONCE_BYTES, REUSE_GUARD_BYTES};

/// AEAD keys holding the plain key value and the AEAD algorithm type.
#[derive(Clone, PartialEq, Eq)]
pub struct AeadKey {
    aead_mode: AeadType,
    value: Vec<u8>,
}

impl std::fmt::Debug for AeadKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AeadKey")
            .field("aead_mode", &self.aead_mode)
            .field("value", &"***")
            .finish()
    }
}

/// AEAD Nonce
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct AeadNonce {
    value: [u8; NONCE_BYTES],
}

impl AeadKey {
    /// Create an `AeadKey` from a `Secret` of `aead_key_length` bytes.
    pub(crate) fn from_secret(secret: Secret, ciphersuite: Ciphersuite) -> Self {
        log::trace!("AeadKey::from_secret with {}", ciphersuite);
        AeadKey {
            aead_mode: ciphersuite.aead_algorithm(),
            value: secret.as_slice().to_vec(),
        }
    }

    #[cfg(test)]
    /// Get a slice to the key value.
    pub(crate) fn as_slice(&self) -> &[u8] {
        &self.value
    }

    /// Encrypt a payload under the AeadKey given a nonce.
    pub(crate) fn aead_seal(
        &self,
        crypto: &impl CgkaCrypto,
        msg: &[u8],
        aad: &[u8],
        nonce: &AeadNonce,
    ) -> Result<Vec<u8>, CryptoError> {
        crypto.aead_encrypt(
            self.aead_mode,
            self.value.as_slice(),
            msg,
            &nonce.value,
            aad,
        )
    }

    /// AEAD decrypt `ciphertext` with `key`, `aad`, and `nonce`.
    pub(crate) fn aead_open(
        &self,
        crypto: &impl CgkaCrypto,
        ciphertext: &[u8],
        aad: &[u8],
        nonce: &AeadNonce,
    ) -> Result<Vec<u8>, CryptoError> {
        crypto
            .aead_decrypt(
                self.aead_mode,
                self.value.as_slice(),
                ciphertext,
                &nonce.value,
                aad,
            )
            .map_err(|_| CryptoError::AeadDecryptionError)
    }
}

impl AeadNonce {
    /// Create an `AeadNonce` from a `Secret` of `NONCE_BYTES` bytes.
    ///
    /// Returns an error if the secret has the wrong length.
    pub(crate) fn from_secret(secret: Secret) -> Result<Self, CryptoError> {
        let value: [u8; NONCE_BYTES] = secret
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::InvalidLength)?;
        Ok(AeadNonce { value })
    }

    /// Get a slice to the nonce value.
    #[cfg(test)]
    pub(crate) fn as_slice(&self) -> &[u8] {
        &self.value
    }

    /// Xor the first bytes of the nonce with the reuse_guard.
    pub(crate) fn xor_with_reuse_guard(&mut self, reuse_guard: &ReuseGuard) {
        log_crypto!(
            trace,
            "  XOR re-use guard {:x?}^{:x?}",
            self.value,
            reuse_guard.value
        );
        for i in 0..REUSE_GUARD_BYTES {
            self.value[i] ^= reuse_guard.value[i]
        }
        log_crypto!(trace, "    = {:x?}", self.value);
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;
    use crate::test_utils::*;

    /// Make sure that xoring works by xoring a nonce with a reuse guard,
    /// testing if it has changed, xoring it again and testing that it's back
    /// in its original state.
    #[apply(providers)]
    fn test_xor(provider: &impl CgkaProvider) {
        let reuse_guard: ReuseGuard =
            ReuseGuard::try_from_random(provider.rand()).expect("An unexpected error occurred.");
        let original_nonce = AeadNonce {
            value: provider
                .rand()
                .random_array()
                .expect("Not enough entropy."),
        };
        let mut nonce = original_nonce.clone();
        nonce.xor_with_reuse_guard(&reuse_guard);
        assert_ne!(
            original_nonce, nonce,
            "xoring with reuse_guard did not change the nonce"
        );
        nonce.xor_with_reuse_guard(&reuse_guard);
        assert_eq!(
            original_nonce, nonce,
            "xoring twice changed the original value"
        );
    }
}
