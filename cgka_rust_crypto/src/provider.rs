use std::sync::RwLock;

use aes_gcm::{
    aead::{Aead, Payload},
    Aes128Gcm, Aes256Gcm, KeyInit,
};
use cgka_traits::{
    crypto::CgkaCrypto,
    random::CgkaRand,
    types::{
        AeadType, CryptoError, ExporterSecret, HashType, HpkeAeadType, HpkeCiphertext,
        HpkeConfig, HpkeKdfType, HpkeKemType, HpkeKeyPair, KemOutput, SignatureScheme,
    },
};
use chacha20poly1305::ChaCha20Poly1305;
use ed25519_dalek::Signer;
use hkdf::Hkdf;
use hpke::Hpke;
use hpke_rs_crypto::types as hpke_types;
use hpke_rs_rust_crypto::HpkeRustCrypto;
use p256::{
    ecdsa::{signature::Verifier, Signature, SigningKey, VerifyingKey},
    EncodedPoint,
};
use rand::{RngCore, SeedableRng};
use sha2::{Digest, Sha256, Sha384, Sha512};

/// The RustCrypto backed crypto and randomness provider.
///
/// All randomness is drawn from a single ChaCha20 RNG seeded from the
/// operating system.
#[derive(Debug)]
pub struct RustCrypto {
    rng: RwLock<rand_chacha::ChaCha20Rng>,
}

impl Default for RustCrypto {
    fn default() -> Self {
        Self {
            rng: RwLock::new(rand_chacha::ChaCha20Rng::from_entropy()),
        }
    }
}

impl RustCrypto {
    /// A provider with a deterministic RNG. Only use this for tests.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: RwLock::new(rand_chacha::ChaCha20Rng::seed_from_u64(seed)),
        }
    }
}

#[inline(always)]
fn kem_mode(kem: HpkeKemType) -> hpke_types::KemAlgorithm {
    match kem {
        HpkeKemType::DhKemP256 => hpke_types::KemAlgorithm::DhKemP256,
        HpkeKemType::DhKemP384 => hpke_types::KemAlgorithm::DhKemP384,
        HpkeKemType::DhKemP521 => hpke_types::KemAlgorithm::DhKemP521,
        HpkeKemType::DhKem25519 => hpke_types::KemAlgorithm::DhKem25519,
        HpkeKemType::DhKem448 => hpke_types::KemAlgorithm::DhKem448,
    }
}

#[inline(always)]
fn kdf_mode(kdf: HpkeKdfType) -> hpke_types::KdfAlgorithm {
    match kdf {
        HpkeKdfType::HkdfSha256 => hpke_types::KdfAlgorithm::HkdfSha256,
        HpkeKdfType::HkdfSha384 => hpke_types::KdfAlgorithm::HkdfSha384,
        HpkeKdfType::HkdfSha512 => hpke_types::KdfAlgorithm::HkdfSha512,
    }
}

#[inline(always)]
fn aead_mode(aead: HpkeAeadType) -> hpke_types::AeadAlgorithm {
    match aead {
        HpkeAeadType::AesGcm128 => hpke_types::AeadAlgorithm::Aes128Gcm,
        HpkeAeadType::AesGcm256 => hpke_types::AeadAlgorithm::Aes256Gcm,
        HpkeAeadType::ChaCha20Poly1305 => hpke_types::AeadAlgorithm::ChaCha20Poly1305,
        HpkeAeadType::Export => hpke_types::AeadAlgorithm::HpkeExport,
    }
}

macro_rules! hkdf_expand {
    ($hash_t:ty, $prk:ident, $info:ident, $okm_len:ident) => {{
        let hkdf =
            Hkdf::<$hash_t>::from_prk($prk).map_err(|_| CryptoError::HkdfOutputLengthInvalid)?;
        let mut okm = vec![0u8; $okm_len];
        hkdf.expand($info, &mut okm)
            .map_err(|_| CryptoError::HkdfOutputLengthInvalid)?;
        okm
    }};
}

macro_rules! aead_seal {
    ($aead_t:ty, $key:ident, $nonce:ident, $msg:expr, $aad:ident) => {{
        let cipher = <$aead_t>::new_from_slice($key).map_err(|_| CryptoError::InvalidLength)?;
        if $nonce.len() != 12 {
            return Err(CryptoError::InvalidLength);
        }
        cipher
            .encrypt($nonce.into(), Payload { msg: $msg, aad: $aad })
            .map_err(|_| CryptoError::CryptoLibraryError)
    }};
}

macro_rules! aead_open {
    ($aead_t:ty, $key:ident, $nonce:ident, $msg:expr, $aad:ident) => {{
        let cipher = <$aead_t>::new_from_slice($key).map_err(|_| CryptoError::InvalidLength)?;
        if $nonce.len() != 12 {
            return Err(CryptoError::InvalidLength);
        }
        cipher
            .decrypt($nonce.into(), Payload { msg: $msg, aad: $aad })
            .map_err(|_| CryptoError::AeadDecryptionError)
    }};
}

impl CgkaCrypto for RustCrypto {
    fn hkdf_extract(
        &self,
        hash_type: HashType,
        salt: &[u8],
        ikm: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        Ok(match hash_type {
            HashType::Sha2_256 => Hkdf::<Sha256>::extract(Some(salt), ikm).0.to_vec(),
            HashType::Sha2_384 => Hkdf::<Sha384>::extract(Some(salt), ikm).0.to_vec(),
            HashType::Sha2_512 => Hkdf::<Sha512>::extract(Some(salt), ikm).0.to_vec(),
        })
    }

    fn hkdf_expand(
        &self,
        hash_type: HashType,
        prk: &[u8],
        info: &[u8],
        okm_len: usize,
    ) -> Result<Vec<u8>, CryptoError> {
        Ok(match hash_type {
            HashType::Sha2_256 => hkdf_expand!(Sha256, prk, info, okm_len),
            HashType::Sha2_384 => hkdf_expand!(Sha384, prk, info, okm_len),
            HashType::Sha2_512 => hkdf_expand!(Sha512, prk, info, okm_len),
        })
    }

    fn hash(&self, hash_type: HashType, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        Ok(match hash_type {
            HashType::Sha2_256 => Sha256::digest(data).to_vec(),
            HashType::Sha2_384 => Sha384::digest(data).to_vec(),
            HashType::Sha2_512 => Sha512::digest(data).to_vec(),
        })
    }

    fn hmac(
        &self,
        hash_type: HashType,
        key: &[u8],
        message: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        crate::hmac::hmac(hash_type, key, message)
    }

    fn aead_encrypt(
        &self,
        alg: AeadType,
        key: &[u8],
        data: &[u8],
        nonce: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        match alg {
            AeadType::Aes128Gcm => aead_seal!(Aes128Gcm, key, nonce, data, aad),
            AeadType::Aes256Gcm => aead_seal!(Aes256Gcm, key, nonce, data, aad),
            AeadType::ChaCha20Poly1305 => aead_seal!(ChaCha20Poly1305, key, nonce, data, aad),
        }
    }

    fn aead_decrypt(
        &self,
        alg: AeadType,
        key: &[u8],
        ct_tag: &[u8],
        nonce: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        match alg {
            AeadType::Aes128Gcm => aead_open!(Aes128Gcm, key, nonce, ct_tag, aad),
            AeadType::Aes256Gcm => aead_open!(Aes256Gcm, key, nonce, ct_tag, aad),
            AeadType::ChaCha20Poly1305 => aead_open!(ChaCha20Poly1305, key, nonce, ct_tag, aad),
        }
    }

    fn signature_key_gen(&self, alg: SignatureScheme) -> Result<(Vec<u8>, Vec<u8>), CryptoError> {
        let mut rng = self
            .rng
            .write()
            .map_err(|_| CryptoError::InsufficientRandomness)?;
        match alg {
            SignatureScheme::ECDSA_SECP256R1_SHA256 => {
                let k = SigningKey::random(&mut *rng);
                let pk = k.verifying_key().to_encoded_point(false).as_bytes().to_vec();
                Ok((k.to_bytes().to_vec(), pk))
            }
            SignatureScheme::ED25519 => {
                let sk = ed25519_dalek::SigningKey::generate(&mut *rng);
                let pk = sk.verifying_key().to_bytes().to_vec();
                Ok((sk.to_bytes().to_vec(), pk))
            }
            _ => Err(CryptoError::UnsupportedSignatureScheme),
        }
    }

    fn verify_signature(
        &self,
        alg: SignatureScheme,
        data: &[u8],
        pk: &[u8],
        signature: &[u8],
    ) -> Result<(), CryptoError> {
        match alg {
            SignatureScheme::ECDSA_SECP256R1_SHA256 => {
                let k = VerifyingKey::from_encoded_point(
                    &EncodedPoint::from_bytes(pk).map_err(|_| CryptoError::InvalidPublicKey)?,
                )
                .map_err(|_| CryptoError::InvalidPublicKey)?;
                k.verify(
                    data,
                    &Signature::from_der(signature).map_err(|_| CryptoError::InvalidSignature)?,
                )
                .map_err(|_| CryptoError::InvalidSignature)
            }
            SignatureScheme::ED25519 => {
                let k = ed25519_dalek::VerifyingKey::try_from(pk)
                    .map_err(|_| CryptoError::InvalidPublicKey)?;
                let sig = ed25519_dalek::Signature::from_slice(signature)
                    .map_err(|_| CryptoError::InvalidSignature)?;
                k.verify_strict(data, &sig)
                    .map_err(|_| CryptoError::InvalidSignature)
            }
            _ => Err(CryptoError::UnsupportedSignatureScheme),
        }
    }

    fn sign(&self, alg: SignatureScheme, data: &[u8], key: &[u8]) -> Result<Vec<u8>, CryptoError> {
        match alg {
            SignatureScheme::ECDSA_SECP256R1_SHA256 => {
                let k = SigningKey::from_slice(key).map_err(|_| CryptoError::CryptoLibraryError)?;
                let signature: Signature = k.sign(data);
                Ok(signature.to_der().to_bytes().to_vec())
            }
            SignatureScheme::ED25519 => {
                let k = ed25519_dalek::SigningKey::try_from(key)
                    .map_err(|_| CryptoError::CryptoLibraryError)?;
                let signature = k.sign(data);
                Ok(signature.to_bytes().to_vec())
            }
            _ => Err(CryptoError::UnsupportedSignatureScheme),
        }
    }

    fn hpke_seal(
        &self,
        config: HpkeConfig,
        pk_r: &[u8],
        info: &[u8],
        aad: &[u8],
        ptxt: &[u8],
    ) -> Result<HpkeCiphertext, CryptoError> {
        let (kem_output, ciphertext) = hpke_from_config(config)
            .seal(&pk_r.into(), info, aad, ptxt, None, None, None)
            .map_err(|_| CryptoError::HpkeEncryptionError)?;
        Ok(HpkeCiphertext {
            kem_output: kem_output.into(),
            ciphertext: ciphertext.into(),
        })
    }

    fn hpke_open(
        &self,
        config: HpkeConfig,
        input: &HpkeCiphertext,
        sk_r: &[u8],
        info: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        hpke_from_config(config)
            .open(
                input.kem_output.as_slice(),
                &sk_r.into(),
                info,
                aad,
                input.ciphertext.as_slice(),
                None,
                None,
                None,
            )
            .map_err(|_| CryptoError::HpkeDecryptionError)
    }

    fn hpke_setup_sender_and_export(
        &self,
        config: HpkeConfig,
        pk_r: &[u8],
        info: &[u8],
        exporter_context: &[u8],
        exporter_length: usize,
    ) -> Result<(KemOutput, ExporterSecret), CryptoError> {
        let (kem_output, context) = hpke_from_config(config)
            .setup_sender(&pk_r.into(), info, None, None, None)
            .map_err(|_| CryptoError::SenderSetupError)?;
        let exported_secret = context
            .export(exporter_context, exporter_length)
            .map_err(|_| CryptoError::ExporterError)?;
        Ok((kem_output, exported_secret.into()))
    }

    fn hpke_setup_receiver_and_export(
        &self,
        config: HpkeConfig,
        enc: &[u8],
        sk_r: &[u8],
        info: &[u8],
        exporter_context: &[u8],
        exporter_length: usize,
    ) -> Result<ExporterSecret, CryptoError> {
        let context = hpke_from_config(config)
            .setup_receiver(enc, &sk_r.into(), info, None, None, None)
            .map_err(|_| CryptoError::ReceiverSetupError)?;
        let exported_secret = context
            .export(exporter_context, exporter_length)
            .map_err(|_| CryptoError::ExporterError)?;
        Ok(exported_secret.into())
    }

    fn derive_hpke_keypair(
        &self,
        config: HpkeConfig,
        ikm: &[u8],
    ) -> Result<HpkeKeyPair, CryptoError> {
        let (private, public) = hpke_from_config(config)
            .derive_key_pair(ikm)
            .map_err(|_| CryptoError::CryptoLibraryError)?
            .into_keys();
        Ok(HpkeKeyPair {
            private: private.as_slice().into(),
            public: public.as_slice().to_vec(),
        })
    }
}

fn hpke_from_config(config: HpkeConfig) -> Hpke<HpkeRustCrypto> {
    Hpke::<HpkeRustCrypto>::new(
        hpke::Mode::Base,
        kem_mode(config.0),
        kdf_mode(config.1),
        aead_mode(config.2),
    )
}

impl CgkaRand for RustCrypto {
    type Error = RandError;

    fn random_array<const N: usize>(&self) -> Result<[u8; N], Self::Error> {
        let mut rng = self.rng.write().map_err(|_| Self::Error::LockPoisoned)?;
        let mut out = [0u8; N];
        rng.try_fill_bytes(&mut out)
            .map_err(|_| Self::Error::NotEnoughRandomness)?;
        Ok(out)
    }

    fn random_vec(&self, len: usize) -> Result<Vec<u8>, Self::Error> {
        let mut rng = self.rng.write().map_err(|_| Self::Error::LockPoisoned)?;
        let mut out = vec![0u8; len];
        rng.try_fill_bytes(&mut out)
            .map_err(|_| Self::Error::NotEnoughRandomness)?;
        Ok(out)
    }
}

#[derive(thiserror::Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum RandError {
    #[error("Rng lock is poisoned.")]
    LockPoisoned,
    #[error("Unable to collect enough randomness.")]
    NotEnoughRandomness,
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgka_traits::types::Ciphersuite;
    use rstest::rstest;

    #[rstest]
    #[case(AeadType::Aes128Gcm)]
    #[case(AeadType::Aes256Gcm)]
    #[case(AeadType::ChaCha20Poly1305)]
    fn aead_rejects_tampered_ciphertext(#[case] alg: AeadType) {
        let crypto = RustCrypto::with_seed(7);
        let key = crypto.random_vec(alg.key_size()).unwrap();
        let nonce = crypto.random_vec(alg.nonce_size()).unwrap();
        let mut ct = crypto
            .aead_encrypt(alg, &key, b"payload", &nonce, b"aad")
            .unwrap();
        assert_eq!(ct.len(), 7 + alg.tag_size());
        ct[0] ^= 1;
        assert_eq!(
            crypto.aead_decrypt(alg, &key, &ct, &nonce, b"aad"),
            Err(CryptoError::AeadDecryptionError)
        );
    }

    #[rstest]
    #[case(SignatureScheme::ED25519)]
    #[case(SignatureScheme::ECDSA_SECP256R1_SHA256)]
    fn signatures_verify_only_over_signed_data(#[case] scheme: SignatureScheme) {
        let crypto = RustCrypto::default();
        let (sk, pk) = crypto.signature_key_gen(scheme).unwrap();
        let signature = crypto.sign(scheme, b"to be signed", &sk).unwrap();
        crypto
            .verify_signature(scheme, b"to be signed", &pk, &signature)
            .unwrap();
        assert_eq!(
            crypto.verify_signature(scheme, b"something else", &pk, &signature),
            Err(CryptoError::InvalidSignature)
        );
    }

    #[test]
    fn hpke_derived_keys_open_sealed_data() {
        let crypto = RustCrypto::default();
        let config =
            Ciphersuite::MLS_128_DHKEMX25519_AES128GCM_SHA256_Ed25519.hpke_config();
        let key_pair = crypto.derive_hpke_keypair(config, &[3u8; 32]).unwrap();
        let again = crypto.derive_hpke_keypair(config, &[3u8; 32]).unwrap();
        assert_eq!(key_pair.public, again.public);

        let ct = crypto
            .hpke_seal(config, &key_pair.public, b"info", b"", b"secret")
            .unwrap();
        let pt = crypto
            .hpke_open(config, &ct, &key_pair.private, b"info", b"")
            .unwrap();
        assert_eq!(pt, b"secret");
        assert!(crypto
            .hpke_open(config, &ct, &key_pair.private, b"other info", b"")
            .is_err());
    }

    #[test]
    fn hkdf_expand_output_limit() {
        let crypto = RustCrypto::default();
        let prk = crypto
            .hkdf_extract(HashType::Sha2_256, b"salt", b"ikm")
            .unwrap();
        assert_eq!(
            crypto
                .hkdf_expand(HashType::Sha2_256, &prk, b"info", 255 * 32)
                .unwrap()
                .len(),
            255 * 32
        );
        assert_eq!(
            crypto.hkdf_expand(HashType::Sha2_256, &prk, b"info", 255 * 32 + 1),
            Err(CryptoError::HkdfOutputLengthInvalid)
        );
    }

    #[test]
    fn hpke_exporters_agree() {
        let crypto = RustCrypto::default();
        let config =
            Ciphersuite::MLS_128_DHKEMX25519_AES128GCM_SHA256_Ed25519.hpke_config();
        let key_pair = crypto.derive_hpke_keypair(config, &[5u8; 32]).unwrap();
        let (kem_output, sender_secret) = crypto
            .hpke_setup_sender_and_export(config, &key_pair.public, b"", b"context", 32)
            .unwrap();
        let receiver_secret = crypto
            .hpke_setup_receiver_and_export(
                config,
                &kem_output,
                &key_pair.private,
                b"",
                b"context",
                32,
            )
            .unwrap();
        assert_eq!(sender_secret.len(), 32);
        assert_eq!(&*sender_secret, &*receiver_secret);
    }

    #[test]
    fn hmac_depends_on_key() {
        let crypto = RustCrypto::default();
        let a = crypto.hmac(HashType::Sha2_256, b"key a", b"msg").unwrap();
        let b = crypto.hmac(HashType::Sha2_256, b"key b", b"msg").unwrap();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }
}
