use cgka_traits::types::SignatureScheme;
use tls_codec::{Deserialize, Serialize};

use super::*;
use crate::{
    extensions::{Extension, ExtensionType, UnknownExtension},
    framing::MlsMessage,
    test_utils::*,
};

fn new_key_package(
    ciphersuite: Ciphersuite,
    provider: &impl CgkaProvider,
    builder: KeyPackageBuilder,
) -> (KeyPackageBundle, SignatureKeyPair) {
    let (credential_with_key, signer) =
        generate_credential_with_key("Client", ciphersuite, provider);
    let bundle = builder
        .build(ciphersuite, provider, &signer, credential_with_key)
        .expect("error building key package");
    (bundle, signer)
}

#[apply(ciphersuites_and_providers)]
fn key_package_generation(ciphersuite: Ciphersuite, provider: &impl CgkaProvider) {
    let _ = pretty_env_logger::try_init();
    let (bundle, _) = new_key_package(ciphersuite, provider, KeyPackage::builder());
    let key_package = bundle.key_package();

    assert!(key_package
        .validate(provider.crypto(), ciphersuite, &ClientConfig::default())
        .is_ok());
    assert_eq!(key_package.ciphersuite(), ciphersuite);
    assert_eq!(key_package.protocol_version(), ProtocolVersion::Mls10);
    assert_ne!(
        key_package.hpke_init_key(),
        key_package.leaf_node().encryption_key()
    );

    // Key packages travel as MLS messages
    let encoded = MlsMessage::from(key_package.clone())
        .tls_serialize_detached()
        .expect("error encoding key package");
    let decoded = MlsMessage::tls_deserialize(&mut encoded.as_slice())
        .expect("error decoding key package")
        .into_key_package()
        .expect("expected a key package");
    assert_eq!(&decoded, key_package);

    let hash_ref = key_package
        .hash_ref(provider.crypto())
        .expect("error hashing key package");
    assert_eq!(hash_ref.as_slice().len(), ciphersuite.hash_length());
    assert_eq!(
        decoded
            .hash_ref(provider.crypto())
            .expect("error hashing key package"),
        hash_ref
    );

    let (other_bundle, _) = new_key_package(ciphersuite, provider, KeyPackage::builder());
    assert_ne!(
        other_bundle
            .key_package()
            .hash_ref(provider.crypto())
            .expect("error hashing key package"),
        hash_ref
    );
}

#[apply(ciphersuites_and_providers)]
fn signature_scheme_mismatch(ciphersuite: Ciphersuite, provider: &impl CgkaProvider) {
    let _ = pretty_env_logger::try_init();
    let other_scheme = match ciphersuite.signature_algorithm() {
        SignatureScheme::ED25519 => SignatureScheme::ECDSA_SECP256R1_SHA256,
        _ => SignatureScheme::ED25519,
    };
    let (credential_with_key, _) = generate_credential_with_key("Client", ciphersuite, provider);
    let signer = SignatureKeyPair::new(other_scheme, provider.crypto())
        .expect("error generating signature keys");
    assert_eq!(
        KeyPackage::builder()
            .build(ciphersuite, provider, &signer, credential_with_key)
            .err(),
        Some(KeyPackageNewError::CiphersuiteSignatureSchemeMismatch)
    );
}

#[apply(ciphersuites_and_providers)]
fn lifetime(ciphersuite: Ciphersuite, provider: &impl CgkaProvider) {
    let _ = pretty_env_logger::try_init();
    let lifetime = Lifetime::new(60);
    assert!(lifetime.is_valid());
    assert!(lifetime.not_before() < lifetime.not_after());
    assert!(!Lifetime::from_bounds(0, 1).is_valid());

    // Expired
    let (bundle, _) = new_key_package(
        ciphersuite,
        provider,
        KeyPackage::builder().key_package_lifetime(Lifetime::from_bounds(0, 1)),
    );
    assert_eq!(
        bundle
            .key_package()
            .validate(provider.crypto(), ciphersuite, &ClientConfig::default()),
        Err(KeyPackageVerifyError::InvalidLifetime)
    );

    // Longer than the client accepts
    let (bundle, _) = new_key_package(ciphersuite, provider, KeyPackage::builder());
    let client_config = ClientConfig::builder().max_key_package_lifetime(60).build();
    assert_eq!(
        bundle
            .key_package()
            .validate(provider.crypto(), ciphersuite, &client_config),
        Err(KeyPackageVerifyError::LifetimeTooLong)
    );
    // The clock skew margin is not counted
    let (bundle, _) = new_key_package(
        ciphersuite,
        provider,
        KeyPackage::builder().key_package_lifetime(Lifetime::new(60)),
    );
    assert!(bundle
        .key_package()
        .validate(provider.crypto(), ciphersuite, &client_config)
        .is_ok());
}

#[apply(ciphersuites_and_providers)]
fn ciphersuite_and_capabilities(ciphersuite: Ciphersuite, provider: &impl CgkaProvider) {
    let _ = pretty_env_logger::try_init();
    let other_ciphersuite = if ciphersuite == Ciphersuite::MLS_128_DHKEMP256_AES128GCM_SHA256_P256
    {
        Ciphersuite::MLS_128_DHKEMX25519_AES128GCM_SHA256_Ed25519
    } else {
        Ciphersuite::MLS_128_DHKEMP256_AES128GCM_SHA256_P256
    };

    let (bundle, _) = new_key_package(ciphersuite, provider, KeyPackage::builder());
    assert_eq!(
        bundle
            .key_package()
            .validate(provider.crypto(), other_ciphersuite, &ClientConfig::default()),
        Err(KeyPackageVerifyError::InvalidCiphersuite)
    );

    // The leaf node has to list the ciphersuite of the key package
    let (bundle, _) = new_key_package(
        ciphersuite,
        provider,
        KeyPackage::builder().leaf_node_capabilities(Capabilities::new(
            None,
            Some(&[other_ciphersuite]),
            None,
            None,
            None,
        )),
    );
    assert_eq!(
        bundle
            .key_package()
            .validate(provider.crypto(), ciphersuite, &ClientConfig::default()),
        Err(KeyPackageVerifyError::UnsupportedCapabilities)
    );

    // Non-default key package extensions have to be listed as well
    let unknown_extension = Extensions::single(Extension::Unknown(
        0xff00,
        UnknownExtension(vec![1, 2, 3]),
    ));
    let (bundle, _) = new_key_package(
        ciphersuite,
        provider,
        KeyPackage::builder().key_package_extensions(unknown_extension.clone()),
    );
    assert_eq!(
        bundle
            .key_package()
            .validate(provider.crypto(), ciphersuite, &ClientConfig::default()),
        Err(KeyPackageVerifyError::UnsupportedExtension)
    );
    let (bundle, _) = new_key_package(
        ciphersuite,
        provider,
        KeyPackage::builder()
            .key_package_extensions(unknown_extension)
            .leaf_node_capabilities(Capabilities::new(
                None,
                None,
                Some(&[ExtensionType::Unknown(0xff00)]),
                None,
                None,
            )),
    );
    assert!(bundle
        .key_package()
        .validate(provider.crypto(), ciphersuite, &ClientConfig::default())
        .is_ok());
    assert!(bundle
        .key_package()
        .extensions()
        .contains(ExtensionType::Unknown(0xff00)));
}

#[apply(ciphersuites_and_providers)]
fn tampered_key_package(ciphersuite: Ciphersuite, provider: &impl CgkaProvider) {
    let _ = pretty_env_logger::try_init();
    let (bundle, signer) = new_key_package(ciphersuite, provider, KeyPackage::builder());
    let (other_bundle, _) = new_key_package(ciphersuite, provider, KeyPackage::builder());

    let mut key_package = bundle.key_package().clone();
    key_package.set_init_key_unsigned(key_package.leaf_node().encryption_key().clone());
    assert_eq!(
        key_package.validate(provider.crypto(), ciphersuite, &ClientConfig::default()),
        Err(KeyPackageVerifyError::InitKeyEqualsEncryptionKey)
    );

    let mut key_package = bundle.key_package().clone();
    key_package.set_init_key_unsigned(other_bundle.key_package().hpke_init_key().clone());
    assert_eq!(
        key_package.validate(provider.crypto(), ciphersuite, &ClientConfig::default()),
        Err(KeyPackageVerifyError::InvalidSignature)
    );

    // The key package must be signed with the key of its own leaf
    let key_package = bundle.key_package().resign_with_leaf_node(
        provider.crypto(),
        &signer,
        other_bundle.key_package().leaf_node().clone(),
    );
    assert_eq!(
        key_package.validate(provider.crypto(), ciphersuite, &ClientConfig::default()),
        Err(KeyPackageVerifyError::InvalidSignature)
    );
}
