//! The cryptographic primitives the group key agreement core is built on.
//!
//! Algorithms are selected per call from the ciphersuite in use. A backend
//! returns a [`CryptoError`] for an algorithm it doesn't implement.

use crate::types::{
    AeadType, CryptoError, ExporterSecret, HashType, HpkeCiphertext, HpkeConfig, HpkeKeyPair,
    KemOutput, SignatureScheme,
};

pub trait CgkaCrypto: Send + Sync {
    // Key derivation and hashing

    /// HKDF-Extract of `ikm` with `salt`.
    fn hkdf_extract(
        &self,
        hash_type: HashType,
        salt: &[u8],
        ikm: &[u8],
    ) -> Result<Vec<u8>, CryptoError>;

    /// HKDF-Expand of `prk` into `okm_len` bytes. Fails with
    /// [`CryptoError::HkdfOutputLengthInvalid`] beyond 255 hash lengths.
    fn hkdf_expand(
        &self,
        hash_type: HashType,
        prk: &[u8],
        info: &[u8],
        okm_len: usize,
    ) -> Result<Vec<u8>, CryptoError>;

    fn hash(&self, hash_type: HashType, data: &[u8]) -> Result<Vec<u8>, CryptoError>;

    fn hmac(&self, hash_type: HashType, key: &[u8], message: &[u8])
        -> Result<Vec<u8>, CryptoError>;

    // Symmetric encryption

    /// Seal `data`, returning the ciphertext with the tag appended.
    fn aead_encrypt(
        &self,
        alg: AeadType,
        key: &[u8],
        data: &[u8],
        nonce: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>, CryptoError>;

    /// Open a ciphertext with appended tag. A wrong key, nonce or aad gives
    /// [`CryptoError::AeadDecryptionError`].
    fn aead_decrypt(
        &self,
        alg: AeadType,
        key: &[u8],
        ct_tag: &[u8],
        nonce: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>, CryptoError>;

    // Signatures

    /// A fresh `(private, public)` signature key pair.
    fn signature_key_gen(&self, alg: SignatureScheme) -> Result<(Vec<u8>, Vec<u8>), CryptoError>;

    fn sign(&self, alg: SignatureScheme, data: &[u8], key: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// `Ok(())` only if `signature` over `data` verifies under `pk`.
    fn verify_signature(
        &self,
        alg: SignatureScheme,
        data: &[u8],
        pk: &[u8],
        signature: &[u8],
    ) -> Result<(), CryptoError>;

    // HPKE, base mode only

    fn hpke_seal(
        &self,
        config: HpkeConfig,
        pk_r: &[u8],
        info: &[u8],
        aad: &[u8],
        ptxt: &[u8],
    ) -> Result<HpkeCiphertext, CryptoError>;

    fn hpke_open(
        &self,
        config: HpkeConfig,
        input: &HpkeCiphertext,
        sk_r: &[u8],
        info: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>, CryptoError>;

    /// Encapsulate to `pk_r` and export `exporter_length` bytes from the
    /// sender context. Used for the init secret of external commits.
    fn hpke_setup_sender_and_export(
        &self,
        config: HpkeConfig,
        pk_r: &[u8],
        info: &[u8],
        exporter_context: &[u8],
        exporter_length: usize,
    ) -> Result<(KemOutput, ExporterSecret), CryptoError>;

    /// The receiver side of [`Self::hpke_setup_sender_and_export`].
    fn hpke_setup_receiver_and_export(
        &self,
        config: HpkeConfig,
        enc: &[u8],
        sk_r: &[u8],
        info: &[u8],
        exporter_context: &[u8],
        exporter_length: usize,
    ) -> Result<ExporterSecret, CryptoError>;

    /// Deterministically derive a KEM key pair from `ikm`.
    fn derive_hpke_keypair(&self, config: HpkeConfig, ikm: &[u8])
        -> Result<HpkeKeyPair, CryptoError>;
}
