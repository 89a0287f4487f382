//! Unit tests for the ciphersuites.

use cgka_traits::types::CryptoError;

use super::{
    hash_ref::{make_key_package_ref, make_proposal_ref},
    hpke::{self, decrypt_with_label, encrypt_with_label},
    *,
};
use crate::{credentials::SignatureKeyPair, test_utils::*};

// Spot test to make sure hpke seal/open work.
#[apply(ciphersuites_and_providers)]
fn hpke_seal_open(ciphersuite: Ciphersuite, provider: &impl CgkaProvider) {
    let _ = pretty_env_logger::try_init();
    let plaintext = &[1, 2, 3];
    let key_pair = provider
        .crypto()
        .derive_hpke_keypair(
            ciphersuite.hpke_config(),
            Secret::random(ciphersuite, provider.rand())
                .expect("Not enough randomness.")
                .as_slice(),
        )
        .expect("error deriving hpke key pair");
    let ciphertext = provider
        .crypto()
        .hpke_seal(ciphersuite.hpke_config(), &key_pair.public, &[], &[], plaintext)
        .expect("error sealing");
    let decrypted_payload = provider
        .crypto()
        .hpke_open(
            ciphersuite.hpke_config(),
            &ciphertext,
            &key_pair.private,
            &[],
            &[],
        )
        .expect("Unexpected error while decrypting a valid ciphertext.");
    assert_eq!(decrypted_payload, plaintext);

    let mut broken_kem_output = ciphertext.kem_output.as_slice().to_vec();
    broken_kem_output.pop();
    let mut broken_ciphertext = ciphertext.ciphertext.as_slice().to_vec();
    broken_ciphertext.pop();
    let broken_ciphertext1 = HpkeCiphertext {
        kem_output: broken_kem_output.into(),
        ciphertext: ciphertext.ciphertext.clone(),
    };
    let broken_ciphertext2 = HpkeCiphertext {
        kem_output: ciphertext.kem_output.clone(),
        ciphertext: broken_ciphertext.into(),
    };
    for broken in [broken_ciphertext1, broken_ciphertext2] {
        assert!(
            provider
                .crypto()
                .hpke_open(
                    ciphersuite.hpke_config(),
                    &broken,
                    &key_pair.private,
                    &[],
                    &[]
                )
                .is_err(),
            "Erroneously correct ciphertext decryption of broken ciphertext."
        );
    }
}

#[apply(ciphersuites_and_providers)]
fn hpke_labels(ciphersuite: Ciphersuite, provider: &impl CgkaProvider) {
    let _ = pretty_env_logger::try_init();
    let key_pair = provider
        .crypto()
        .derive_hpke_keypair(
            ciphersuite.hpke_config(),
            Secret::random(ciphersuite, provider.rand())
                .expect("Not enough randomness.")
                .as_slice(),
        )
        .expect("error deriving hpke key pair");

    let ciphertext = encrypt_with_label(
        &key_pair.public,
        "UpdatePathNode",
        b"context",
        b"path secret",
        ciphersuite,
        provider.crypto(),
    )
    .expect("error encrypting");

    let plaintext = decrypt_with_label(
        &key_pair.private,
        "UpdatePathNode",
        b"context",
        &ciphertext,
        ciphersuite,
        provider.crypto(),
    )
    .expect("error decrypting");
    assert_eq!(plaintext, b"path secret");

    // Label and context are bound to the ciphertext
    assert_eq!(
        decrypt_with_label(
            &key_pair.private,
            "Welcome",
            b"context",
            &ciphertext,
            ciphersuite,
            provider.crypto(),
        ),
        Err(hpke::Error::DecryptionFailed)
    );
    assert_eq!(
        decrypt_with_label(
            &key_pair.private,
            "UpdatePathNode",
            b"other context",
            &ciphertext,
            ciphersuite,
            provider.crypto(),
        ),
        Err(hpke::Error::DecryptionFailed)
    );
}

#[apply(ciphersuites_and_providers)]
fn sign_verify(ciphersuite: Ciphersuite, provider: &impl CgkaProvider) {
    let _ = pretty_env_logger::try_init();
    let key_pair = SignatureKeyPair::new(ciphersuite.signature_algorithm(), provider.crypto())
        .expect("An unexpected error occurred.");
    let payload = &[1, 2, 3];
    let signature = key_pair
        .sign(provider.crypto(), payload)
        .expect("An unexpected error occurred.");
    assert!(provider
        .crypto()
        .verify_signature(
            ciphersuite.signature_algorithm(),
            payload,
            key_pair.public(),
            signature.as_slice(),
        )
        .is_ok());
    assert!(provider
        .crypto()
        .verify_signature(
            ciphersuite.signature_algorithm(),
            &[1, 2, 4],
            key_pair.public(),
            signature.as_slice(),
        )
        .is_err());
}

#[apply(ciphersuites_and_providers)]
fn secret_derivation(ciphersuite: Ciphersuite, provider: &impl CgkaProvider) {
    let _ = pretty_env_logger::try_init();
    let secret = Secret::random(ciphersuite, provider.rand()).expect("Not enough randomness.");
    assert_eq!(secret.as_slice().len(), ciphersuite.hash_length());

    let derived = secret
        .derive_secret(provider.crypto(), ciphersuite, "my_test_label")
        .expect("error deriving secret");
    let derived_again = secret
        .derive_secret(provider.crypto(), ciphersuite, "my_test_label")
        .expect("error deriving secret");
    let other_label = secret
        .derive_secret(provider.crypto(), ciphersuite, "my_other_label")
        .expect("error deriving secret");
    assert_eq!(derived, derived_again);
    assert_ne!(derived, other_label);
    assert_ne!(derived, secret);

    let expanded = secret
        .kdf_expand_label(provider.crypto(), ciphersuite, "label", b"context", 42)
        .expect("error expanding");
    assert_eq!(expanded.as_slice().len(), 42);
    assert_eq!(
        secret.kdf_expand_label(
            provider.crypto(),
            ciphersuite,
            "label",
            &[],
            u16::MAX as usize + 1
        ),
        Err(CryptoError::KdfLabelTooLarge)
    );

    assert_eq!(
        Secret::zero(ciphersuite).as_slice(),
        vec![0u8; ciphersuite.hash_length()].as_slice()
    );
}

#[apply(ciphersuites_and_providers)]
fn aead_seal_open(ciphersuite: Ciphersuite, provider: &impl CgkaProvider) {
    let _ = pretty_env_logger::try_init();
    let key = AeadKey::from_secret(
        Secret::from_slice(&vec![7u8; ciphersuite.aead_key_length()]),
        ciphersuite,
    );
    let nonce =
        AeadNonce::from_secret(Secret::from_slice(&[3u8; NONCE_BYTES])).expect("invalid nonce");

    let ciphertext = key
        .aead_seal(provider.crypto(), b"payload", b"aad", &nonce)
        .expect("error sealing");
    assert_eq!(
        key.aead_open(provider.crypto(), &ciphertext, b"aad", &nonce)
            .expect("error opening"),
        b"payload"
    );
    assert_eq!(
        key.aead_open(provider.crypto(), &ciphertext, b"other aad", &nonce),
        Err(CryptoError::AeadDecryptionError)
    );

    assert_eq!(
        AeadNonce::from_secret(Secret::from_slice(&[3u8; 5])),
        Err(CryptoError::InvalidLength)
    );
}

#[apply(ciphersuites_and_providers)]
fn mac_comparison(ciphersuite: Ciphersuite, provider: &impl CgkaProvider) {
    let _ = pretty_env_logger::try_init();
    let key = Secret::random(ciphersuite, provider.rand()).expect("Not enough randomness.");
    let mac = Mac::new(provider.crypto(), ciphersuite, &key, b"message").expect("error");
    let same = Mac::new(provider.crypto(), ciphersuite, &key, b"message").expect("error");
    assert_eq!(mac, same);

    let mut flipped = mac.clone();
    flipped.flip_last_byte();
    assert_ne!(mac, flipped);

    assert!(equal_ct(&[1, 2, 3], &[1, 2, 3]));
    assert!(!equal_ct(&[1, 2, 3], &[1, 2, 4]));
    assert!(!equal_ct(&[1, 2, 3], &[1, 2]));
}

#[apply(ciphersuites_and_providers)]
fn hash_references(ciphersuite: Ciphersuite, provider: &impl CgkaProvider) {
    let _ = pretty_env_logger::try_init();
    let proposal_ref =
        make_proposal_ref(b"value", ciphersuite, provider.crypto()).expect("error hashing");
    let key_package_ref =
        make_key_package_ref(b"value", ciphersuite, provider.crypto()).expect("error hashing");
    assert_eq!(proposal_ref.as_slice().len(), ciphersuite.hash_length());
    // The label separates the two kinds of references
    assert_ne!(proposal_ref, key_package_ref);
    assert_eq!(
        proposal_ref,
        make_proposal_ref(b"value", ciphersuite, provider.crypto()).expect("error hashing")
    );
}
