//! # Key Packages
//!
//! A key package is the information needed to add a client to a group
//! asynchronously. It carries an HPKE init key the Welcome is encrypted to and
//! the leaf node the client will occupy in the tree, all signed with the
//! client's signature key.
//!
//! ```c
//! struct {
//!     ProtocolVersion version;
//!     CipherSuite cipher_suite;
//!     HPKEPublicKey init_key;
//!     LeafNode leaf_node;
//!     Extension extensions<V>;
//!     // SignWithLabel(., "KeyPackageTBS", KeyPackageTBS)
//!     opaque signature<V>;
//! } KeyPackage;
//! ```
//!
//! A key package is created with the [`KeyPackageBuilder`]. The private keys
//! belonging to it are returned in a [`KeyPackageBundle`] the client keeps
//! until the key package is used in a Welcome.
//!
//! ```
//! use cgka::prelude::*;
//! use cgka_rust_crypto::CgkaRustCrypto;
//! use cgka_traits::CgkaProvider;
//!
//! let provider = CgkaRustCrypto::default();
//! let ciphersuite = Ciphersuite::MLS_128_DHKEMX25519_AES128GCM_SHA256_Ed25519;
//! let signer = SignatureKeyPair::new(ciphersuite.signature_algorithm(), provider.crypto())
//!     .expect("error creating signature keys");
//! let credential_with_key = CredentialWithKey {
//!     credential: Credential::new_basic("alice"),
//!     signature_key: signer.to_public_key(),
//! };
//!
//! let bundle = KeyPackage::builder()
//!     .build(ciphersuite, &provider, &signer, credential_with_key)
//!     .expect("error creating key package");
//! bundle
//!     .key_package()
//!     .validate(provider.crypto(), ciphersuite, &ClientConfig::default())
//!     .expect("invalid key package");
//! ```

use cgka_traits::{crypto::CgkaCrypto, CgkaProvider};
use serde::{Deserialize, Serialize};
use tls_codec::{Serialize as TlsSerializeTrait, TlsDeserialize, TlsSerialize, TlsSize};

use crate::{
    ciphersuite::{
        hash_ref::{make_key_package_ref, KeyPackageRef},
        signable::{Signable, SignedStruct, Verifiable},
        Ciphersuite, HpkePrivateKey, HpkePublicKey, Secret, Signature,
    },
    config::ClientConfig,
    credentials::{CredentialWithKey, SignatureKeyPair},
    error::LibraryError,
    extensions::Extensions,
    treesync::node::leaf_node::{
        Capabilities, LeafNode, LeafNodeSource, NewLeafNodeParams, TreeInfoTbs,
    },
    versions::ProtocolVersion,
};

mod lifetime;

pub mod errors;

pub use errors::*;
pub use lifetime::*;

#[cfg(test)]
mod tests;

const SIGNATURE_KEY_PACKAGE_LABEL: &str = "KeyPackageTBS";

/// The unsigned payload of a key package.
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TlsSerialize, TlsDeserialize, TlsSize,
)]
struct KeyPackageTbs {
    protocol_version: ProtocolVersion,
    ciphersuite: Ciphersuite,
    init_key: HpkePublicKey,
    leaf_node: LeafNode,
    extensions: Extensions,
}

impl Signable for KeyPackageTbs {
    type SignedOutput = KeyPackage;

    fn unsigned_payload(&self) -> Result<Vec<u8>, tls_codec::Error> {
        self.tls_serialize_detached()
    }

    fn label(&self) -> &str {
        SIGNATURE_KEY_PACKAGE_LABEL
    }
}

/// The key package struct.
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TlsSerialize, TlsDeserialize, TlsSize,
)]
pub struct KeyPackage {
    payload: KeyPackageTbs,
    signature: Signature,
}

impl SignedStruct<KeyPackageTbs> for KeyPackage {
    fn from_payload(payload: KeyPackageTbs, signature: Signature) -> Self {
        Self { payload, signature }
    }
}

impl Verifiable for KeyPackage {
    fn unsigned_payload(&self) -> Result<Vec<u8>, tls_codec::Error> {
        self.payload.tls_serialize_detached()
    }

    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn label(&self) -> &str {
        SIGNATURE_KEY_PACKAGE_LABEL
    }
}

impl KeyPackage {
    /// Create a key package builder.
    pub fn builder() -> KeyPackageBuilder {
        KeyPackageBuilder::new()
    }

    #[allow(clippy::too_many_arguments)]
    fn create(
        ciphersuite: Ciphersuite,
        provider: &impl CgkaProvider,
        signer: &SignatureKeyPair,
        credential_with_key: CredentialWithKey,
        lifetime: Lifetime,
        extensions: Extensions,
        leaf_node_capabilities: Capabilities,
        leaf_node_extensions: Extensions,
    ) -> Result<KeyPackageBundle, KeyPackageNewError> {
        if ciphersuite.signature_algorithm() != signer.signature_scheme() {
            return Err(KeyPackageNewError::CiphersuiteSignatureSchemeMismatch);
        }

        let ikm = Secret::random(ciphersuite, provider.rand())?;
        let init_key = provider
            .crypto()
            .derive_hpke_keypair(ciphersuite.hpke_config(), ikm.as_slice())?;

        let (leaf_node, encryption_key_pair) = LeafNode::new(
            provider.crypto(),
            provider.rand(),
            signer,
            NewLeafNodeParams {
                ciphersuite,
                credential_with_key,
                leaf_node_source: LeafNodeSource::KeyPackage(lifetime),
                capabilities: leaf_node_capabilities,
                extensions: leaf_node_extensions,
                tree_info_tbs: TreeInfoTbs::KeyPackage,
            },
        )?;

        let key_package = KeyPackageTbs {
            protocol_version: ProtocolVersion::default(),
            ciphersuite,
            init_key: init_key.public.into(),
            leaf_node,
            extensions,
        }
        .sign(provider.crypto(), signer)
        .map_err(|_| LibraryError::custom("Signing the key package failed"))?;

        log::debug!("Created a new key package for {:?}", ciphersuite);

        Ok(KeyPackageBundle {
            key_package,
            init_private_key: init_key.private,
            encryption_private_key: encryption_key_pair.private,
        })
    }

    /// Validate the key package for use in a group with the given
    /// `ciphersuite`:
    /// - version and ciphersuite match and are listed in the capabilities
    /// - the leaf node is a key package leaf node with a valid lifetime that
    ///   is not longer than the client accepts
    /// - the leaf node and the key package signatures are valid
    /// - init key and encryption key differ
    /// - all key package extensions are supported by the leaf node
    pub fn validate(
        &self,
        crypto: &impl CgkaCrypto,
        ciphersuite: Ciphersuite,
        client_config: &ClientConfig,
    ) -> Result<(), KeyPackageVerifyError> {
        if self.payload.protocol_version != ProtocolVersion::default() {
            return Err(KeyPackageVerifyError::InvalidProtocolVersion);
        }
        if self.payload.ciphersuite != ciphersuite {
            return Err(KeyPackageVerifyError::InvalidCiphersuite);
        }

        let leaf_node = &self.payload.leaf_node;
        let capabilities = leaf_node.capabilities();
        if !capabilities.ciphersuites().contains(&ciphersuite)
            || !capabilities
                .versions()
                .contains(&self.payload.protocol_version)
        {
            return Err(KeyPackageVerifyError::UnsupportedCapabilities);
        }

        match leaf_node.leaf_node_source() {
            LeafNodeSource::KeyPackage(lifetime) => {
                if !lifetime.is_valid() {
                    log::debug!("Key package lifetime is not valid: {:?}", lifetime);
                    return Err(KeyPackageVerifyError::InvalidLifetime);
                }
                if !lifetime.has_acceptable_range(client_config.max_key_package_lifetime()) {
                    return Err(KeyPackageVerifyError::LifetimeTooLong);
                }
            }
            _ => return Err(KeyPackageVerifyError::InvalidLeafNodeSourceType),
        }

        leaf_node.validate_locally()?;
        leaf_node.verify(crypto, ciphersuite, None)?;

        if self.payload.init_key == *leaf_node.encryption_key() {
            return Err(KeyPackageVerifyError::InitKeyEqualsEncryptionKey);
        }

        if !capabilities.supports_extensions(&self.payload.extensions) {
            return Err(KeyPackageVerifyError::UnsupportedExtension);
        }

        self.verify_no_out(
            crypto,
            ciphersuite.signature_algorithm(),
            leaf_node.signature_key(),
        )
        .map_err(|_| {
            log::error!("Key package signature is invalid.");
            KeyPackageVerifyError::InvalidSignature
        })
    }

    /// Compute the [`KeyPackageRef`] of this [`KeyPackage`].
    pub fn hash_ref(&self, crypto: &impl CgkaCrypto) -> Result<KeyPackageRef, LibraryError> {
        make_key_package_ref(
            &self.tls_serialize_detached()?,
            self.payload.ciphersuite,
            crypto,
        )
        .map_err(LibraryError::from)
    }

    /// Get the [`Ciphersuite`].
    pub fn ciphersuite(&self) -> Ciphersuite {
        self.payload.ciphersuite
    }

    /// Get the protocol version.
    pub fn protocol_version(&self) -> ProtocolVersion {
        self.payload.protocol_version
    }

    /// Get a reference to the extensions of this key package.
    pub fn extensions(&self) -> &Extensions {
        &self.payload.extensions
    }

    /// Get a reference to the [`LeafNode`].
    pub fn leaf_node(&self) -> &LeafNode {
        &self.payload.leaf_node
    }

    /// Get a reference to the HPKE init key.
    pub fn hpke_init_key(&self) -> &HpkePublicKey {
        &self.payload.init_key
    }
}

#[cfg(any(feature = "test-utils", test))]
impl KeyPackage {
    /// Replace the leaf node and re-sign the key package.
    pub fn resign_with_leaf_node(
        &self,
        crypto: &impl CgkaCrypto,
        signer: &SignatureKeyPair,
        leaf_node: LeafNode,
    ) -> Self {
        let mut payload = self.payload.clone();
        payload.leaf_node = leaf_node;
        payload
            .sign(crypto, signer)
            .expect("error signing key package")
    }

    /// Replace the init key without re-signing.
    pub fn set_init_key_unsigned(&mut self, init_key: HpkePublicKey) {
        self.payload.init_key = init_key;
    }
}

/// Builder that helps creating (and configuring) a [`KeyPackage`].
#[derive(Default, Debug, Clone)]
pub struct KeyPackageBuilder {
    key_package_lifetime: Option<Lifetime>,
    key_package_extensions: Option<Extensions>,
    leaf_node_capabilities: Option<Capabilities>,
    leaf_node_extensions: Option<Extensions>,
}

impl KeyPackageBuilder {
    /// Create a key package builder.
    pub fn new() -> Self {
        Self {
            key_package_lifetime: None,
            key_package_extensions: None,
            leaf_node_capabilities: None,
            leaf_node_extensions: None,
        }
    }

    /// Set the key package lifetime.
    pub fn key_package_lifetime(mut self, lifetime: Lifetime) -> Self {
        self.key_package_lifetime = Some(lifetime);
        self
    }

    /// Set the key package extensions.
    pub fn key_package_extensions(mut self, extensions: Extensions) -> Self {
        self.key_package_extensions = Some(extensions);
        self
    }

    /// Set the leaf node capabilities.
    pub fn leaf_node_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.leaf_node_capabilities = Some(capabilities);
        self
    }

    /// Set the leaf node extensions.
    pub fn leaf_node_extensions(mut self, extensions: Extensions) -> Self {
        self.leaf_node_extensions = Some(extensions);
        self
    }

    /// Finalize and build the key package.
    pub fn build(
        self,
        ciphersuite: Ciphersuite,
        provider: &impl CgkaProvider,
        signer: &SignatureKeyPair,
        credential_with_key: CredentialWithKey,
    ) -> Result<KeyPackageBundle, KeyPackageNewError> {
        KeyPackage::create(
            ciphersuite,
            provider,
            signer,
            credential_with_key,
            self.key_package_lifetime.unwrap_or_default(),
            self.key_package_extensions.unwrap_or_default(),
            self.leaf_node_capabilities.unwrap_or_default(),
            self.leaf_node_extensions.unwrap_or_default(),
        )
    }
}

/// A [`KeyPackage`] together with the private keys belonging to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyPackageBundle {
    pub(crate) key_package: KeyPackage,
    pub(crate) init_private_key: HpkePrivateKey,
    pub(crate) encryption_private_key: HpkePrivateKey,
}

impl KeyPackageBundle {
    /// Get a reference to the public part of this bundle, i.e. the
    /// [`KeyPackage`].
    pub fn key_package(&self) -> &KeyPackage {
        &self.key_package
    }

    /// Get a reference to the private init key.
    pub fn init_private_key(&self) -> &HpkePrivateKey {
        &self.init_private_key
    }
}
