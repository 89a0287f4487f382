//! Test utilities
#![allow(dead_code)]
#![allow(unused_imports)]

pub use cgka_traits::{
    crypto::CgkaCrypto, random::CgkaRand, types::Ciphersuite, CgkaProvider,
};
pub use rstest::*;
pub use rstest_reuse::{self, *};

pub use cgka_rust_crypto::CgkaRustCrypto;

use crate::{
    credentials::{Credential, CredentialWithKey, SignatureKeyPair},
    key_packages::{KeyPackage, KeyPackageBundle},
};

/// Generate a basic credential for `identity` together with a fresh signature
/// key pair.
pub fn generate_credential_with_key(
    identity: &str,
    ciphersuite: Ciphersuite,
    provider: &impl CgkaProvider,
) -> (CredentialWithKey, SignatureKeyPair) {
    let signer = SignatureKeyPair::new(ciphersuite.signature_algorithm(), provider.crypto())
        .expect("Error generating a signature key pair.");
    let credential_with_key = CredentialWithKey {
        credential: Credential::new_basic(identity),
        signature_key: signer.to_public_key(),
    };
    (credential_with_key, signer)
}

/// Generate a key package bundle with default settings.
pub fn generate_key_package(
    ciphersuite: Ciphersuite,
    provider: &impl CgkaProvider,
    signer: &SignatureKeyPair,
    credential_with_key: CredentialWithKey,
) -> KeyPackageBundle {
    KeyPackage::builder()
        .build(ciphersuite, provider, signer, credential_with_key)
        .expect("Error generating a key package.")
}

// === Define provider per platform ===

#[template]
#[export]
#[rstest(provider,
    case::rust_crypto(&CgkaRustCrypto::default()),
  )
]
#[allow(non_snake_case)]
pub fn providers(provider: &impl CgkaProvider) {}

// === Ciphersuites and providers ===

#[template]
#[export]
#[rstest(ciphersuite, provider,
    case::rust_crypto_MLS_128_DHKEMX25519_AES128GCM_SHA256_Ed25519(Ciphersuite::MLS_128_DHKEMX25519_AES128GCM_SHA256_Ed25519, &CgkaRustCrypto::default()),
    case::rust_crypto_MLS_128_DHKEMP256_AES128GCM_SHA256_P256(Ciphersuite::MLS_128_DHKEMP256_AES128GCM_SHA256_P256, &CgkaRustCrypto::default()),
    case::rust_crypto_MLS_128_DHKEMX25519_CHACHA20POLY1305_SHA256_Ed25519(Ciphersuite::MLS_128_DHKEMX25519_CHACHA20POLY1305_SHA256_Ed25519, &CgkaRustCrypto::default()),
  )
]
#[allow(non_snake_case)]
pub fn ciphersuites_and_providers(ciphersuite: Ciphersuite, provider: &impl CgkaProvider) {}
