//! This module contains the [`LeafNode`] struct and its implementation.
use cgka_traits::{crypto::CgkaCrypto, random::CgkaRand};
use serde::{Deserialize, Serialize};
use tls_codec::{Serialize as TlsSerializeTrait, Size, TlsDeserialize, TlsSerialize, TlsSize, VLBytes};

use crate::{
    binary_tree::LeafNodeIndex,
    ciphersuite::{
        signable::{Signable, SignedStruct, Verifiable},
        Ciphersuite, HpkeKeyPair, HpkePublicKey, Secret, Signature, SignaturePublicKey,
    },
    credentials::{Credential, CredentialWithKey, SignatureKeyPair},
    error::LibraryError,
    extensions::{ExtensionType, Extensions},
    group::GroupId,
    key_packages::Lifetime,
    treesync::errors::LeafNodeValidationError,
};

mod capabilities;

pub use capabilities::*;

const LEAF_NODE_SIGNATURE_LABEL: &str = "LeafNodeTBS";

/// The parameters needed to create a fresh [`LeafNode`].
pub(crate) struct NewLeafNodeParams {
    pub(crate) ciphersuite: Ciphersuite,
    pub(crate) credential_with_key: CredentialWithKey,
    pub(crate) leaf_node_source: LeafNodeSource,
    pub(crate) capabilities: Capabilities,
    pub(crate) extensions: Extensions,
    pub(crate) tree_info_tbs: TreeInfoTbs,
}

/// This struct implements the leaf node.
///
/// ```c
/// struct {
///     HPKEPublicKey encryption_key;
///     SignaturePublicKey signature_key;
///     Credential credential;
///     Capabilities capabilities;
///
///     LeafNodeSource leaf_node_source;
///     select (LeafNode.leaf_node_source) {
///         case key_package:
///             Lifetime lifetime;
///
///         case update:
///             struct{};
///
///         case commit:
///             opaque parent_hash<V>;
///     };
///
///     Extension extensions<V>;
///     /* SignWithLabel(., "LeafNodeTBS", LeafNodeTBS) */
///     opaque signature<V>;
/// } LeafNode;
/// ```
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TlsSerialize, TlsDeserialize, TlsSize,
)]
pub struct LeafNode {
    payload: LeafNodePayload,
    signature: Signature,
}

#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TlsSerialize, TlsDeserialize, TlsSize,
)]
struct LeafNodePayload {
    encryption_key: HpkePublicKey,
    signature_key: SignaturePublicKey,
    credential: Credential,
    capabilities: Capabilities,
    leaf_node_source: LeafNodeSource,
    extensions: Extensions,
}

/// Where a [`LeafNode`] came from.
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TlsSerialize, TlsDeserialize, TlsSize,
)]
#[repr(u8)]
pub enum LeafNodeSource {
    /// The leaf node was part of a key package.
    #[tls_codec(discriminant = 1)]
    KeyPackage(Lifetime),
    /// The leaf node was sent in an Update proposal.
    Update,
    /// The leaf node was part of an update path.
    Commit(ParentHash),
}

/// The parent hash stored in a leaf node created by a commit.
pub type ParentHash = VLBytes;

/// To-be-signed leaf node.
///
/// The payload of the leaf node is followed by the position of the leaf in
/// the tree for leaf nodes from updates and commits:
///
/// ```c
/// struct {
///     // ... the LeafNode payload ...
///
///     select (LeafNodeTBS.leaf_node_source) {
///         case key_package:
///             struct{};
///
///         case update:
///             opaque group_id<V>;
///             uint32 leaf_index;
///
///         case commit:
///             opaque group_id<V>;
///             uint32 leaf_index;
///     };
/// } LeafNodeTBS;
/// ```
#[derive(Debug, TlsSerialize, TlsSize)]
pub(crate) struct LeafNodeTbs {
    payload: LeafNodePayload,
    tree_info_tbs: TreeInfoTbs,
}

/// Helper struct that holds additional information required to sign a leaf
/// node.
#[derive(Debug, Clone)]
pub(crate) enum TreeInfoTbs {
    KeyPackage,
    Update(TreePosition),
    Commit(TreePosition),
}

impl Size for TreeInfoTbs {
    fn tls_serialized_len(&self) -> usize {
        match self {
            TreeInfoTbs::KeyPackage => 0,
            TreeInfoTbs::Update(p) | TreeInfoTbs::Commit(p) => p.tls_serialized_len(),
        }
    }
}

impl TlsSerializeTrait for TreeInfoTbs {
    fn tls_serialize<W: std::io::Write>(&self, writer: &mut W) -> Result<usize, tls_codec::Error> {
        match self {
            TreeInfoTbs::KeyPackage => Ok(0),
            TreeInfoTbs::Update(p) | TreeInfoTbs::Commit(p) => p.tls_serialize(writer),
        }
    }
}

/// The position of a leaf in the tree of a group.
#[derive(Debug, Clone, PartialEq, Eq, TlsSerialize, TlsSize)]
pub(crate) struct TreePosition {
    group_id: GroupId,
    leaf_index: LeafNodeIndex,
}

impl TreePosition {
    pub(crate) fn new(group_id: GroupId, leaf_index: LeafNodeIndex) -> Self {
        Self {
            group_id,
            leaf_index,
        }
    }
}

impl Signable for LeafNodeTbs {
    type SignedOutput = LeafNode;

    fn unsigned_payload(&self) -> Result<Vec<u8>, tls_codec::Error> {
        self.tls_serialize_detached()
    }

    fn label(&self) -> &str {
        LEAF_NODE_SIGNATURE_LABEL
    }
}

impl SignedStruct<LeafNodeTbs> for LeafNode {
    fn from_payload(tbs: LeafNodeTbs, signature: Signature) -> Self {
        Self {
            payload: tbs.payload,
            signature,
        }
    }
}

/// A received leaf node together with the tree position it claims to be
/// signed for.
struct VerifiableLeafNode<'a> {
    tbs: LeafNodeTbs,
    signature: &'a Signature,
}

impl<'a> Verifiable for VerifiableLeafNode<'a> {
    fn unsigned_payload(&self) -> Result<Vec<u8>, tls_codec::Error> {
        self.tbs.tls_serialize_detached()
    }

    fn signature(&self) -> &Signature {
        self.signature
    }

    fn label(&self) -> &str {
        LEAF_NODE_SIGNATURE_LABEL
    }
}

impl LeafNode {
    /// Create a new [`LeafNode`] with a fresh HPKE encryption key pair.
    ///
    /// Returns the leaf node and its encryption key pair. The caller is
    /// responsible for keeping the private key.
    pub(crate) fn new(
        crypto: &impl CgkaCrypto,
        rand: &impl CgkaRand,
        signer: &SignatureKeyPair,
        params: NewLeafNodeParams,
    ) -> Result<(Self, HpkeKeyPair), LibraryError> {
        let ikm = Secret::random(params.ciphersuite, rand)?;
        let key_pair =
            crypto.derive_hpke_keypair(params.ciphersuite.hpke_config(), ikm.as_slice())?;

        let leaf_node = Self::new_with_key(
            crypto,
            signer,
            key_pair.public.clone().into(),
            params.credential_with_key,
            params.leaf_node_source,
            params.capabilities,
            params.extensions,
            params.tree_info_tbs,
        )?;

        Ok((leaf_node, key_pair))
    }

    /// Create and sign a new leaf node with a given HPKE encryption key.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new_with_key(
        crypto: &impl CgkaCrypto,
        signer: &SignatureKeyPair,
        encryption_key: HpkePublicKey,
        credential_with_key: CredentialWithKey,
        leaf_node_source: LeafNodeSource,
        capabilities: Capabilities,
        extensions: Extensions,
        tree_info_tbs: TreeInfoTbs,
    ) -> Result<Self, LibraryError> {
        let tbs = LeafNodeTbs {
            payload: LeafNodePayload {
                encryption_key,
                signature_key: credential_with_key.signature_key,
                credential: credential_with_key.credential,
                capabilities,
                leaf_node_source,
                extensions,
            },
            tree_info_tbs,
        };

        tbs.sign(crypto, signer)
            .map_err(|_| LibraryError::custom("Signing failed"))
    }

    /// Re-sign this leaf node for a new position in a tree with a new
    /// encryption key and source. Credential, capabilities and extensions are
    /// kept.
    pub(crate) fn rekeyed(
        &self,
        crypto: &impl CgkaCrypto,
        signer: &SignatureKeyPair,
        encryption_key: HpkePublicKey,
        leaf_node_source: LeafNodeSource,
        tree_info_tbs: TreeInfoTbs,
    ) -> Result<Self, LibraryError> {
        let mut payload = self.payload.clone();
        payload.encryption_key = encryption_key;
        payload.leaf_node_source = leaf_node_source;
        let tbs = LeafNodeTbs {
            payload,
            tree_info_tbs,
        };

        tbs.sign(crypto, signer)
            .map_err(|_| LibraryError::custom("Signing failed"))
    }

    /// Verify the signature of this leaf node. Leaf nodes from updates and
    /// commits are signed over their position in the tree, which has to be
    /// supplied as `tree_position`.
    pub(crate) fn verify(
        &self,
        crypto: &impl CgkaCrypto,
        ciphersuite: Ciphersuite,
        tree_position: Option<TreePosition>,
    ) -> Result<(), LeafNodeValidationError> {
        let tree_info_tbs = match (&self.payload.leaf_node_source, tree_position) {
            (LeafNodeSource::KeyPackage(_), _) => TreeInfoTbs::KeyPackage,
            (LeafNodeSource::Update, Some(position)) => TreeInfoTbs::Update(position),
            (LeafNodeSource::Commit(_), Some(position)) => TreeInfoTbs::Commit(position),
            (_, None) => return Err(LeafNodeValidationError::MissingTreePosition),
        };
        let verifiable = VerifiableLeafNode {
            tbs: LeafNodeTbs {
                payload: self.payload.clone(),
                tree_info_tbs,
            },
            signature: &self.signature,
        };
        verifiable
            .verify_no_out(
                crypto,
                ciphersuite.signature_algorithm(),
                &self.payload.signature_key,
            )
            .map_err(|_| {
                log::debug!("Leaf node signature is invalid.");
                LeafNodeValidationError::InvalidSignature
            })
    }

    /// Perform all checks that can be done without further context:
    /// - the used extensions are not known to be invalid in leaf nodes
    /// - the types of the used extensions are covered by the capabilities
    /// - the type of the credential is covered by the capabilities
    pub(crate) fn validate_locally(&self) -> Result<(), LeafNodeValidationError> {
        if self
            .extensions()
            .iter()
            .any(|ext| ext.extension_type().is_valid_in_leaf_node() == Some(false))
        {
            log::error!("Invalid extension used in leaf node.");
            return Err(LeafNodeValidationError::UnsupportedExtensions);
        }

        if !self.capabilities().supports_extensions(self.extensions()) {
            log::error!(
                "Leaf node does not support all extensions it uses\n
                Supported extensions: {:?}",
                self.payload.capabilities.extensions
            );
            return Err(LeafNodeValidationError::UnsupportedExtensions);
        }

        if !self
            .capabilities()
            .supports_credential(self.credential().credential_type())
        {
            return Err(LeafNodeValidationError::UnsupportedCredentials);
        }

        Ok(())
    }

    /// Returns the `encryption_key`.
    pub fn encryption_key(&self) -> &HpkePublicKey {
        &self.payload.encryption_key
    }

    /// Returns the `signature_key`.
    pub fn signature_key(&self) -> &SignaturePublicKey {
        &self.payload.signature_key
    }

    /// Returns the `credential`.
    pub fn credential(&self) -> &Credential {
        &self.payload.credential
    }

    /// Returns the `parent_hash` as byte slice or `None`.
    pub fn parent_hash(&self) -> Option<&[u8]> {
        match &self.payload.leaf_node_source {
            LeafNodeSource::Commit(ph) => Some(ph.as_slice()),
            _ => None,
        }
    }

    /// Returns the [`Lifetime`] if present.
    pub fn life_time(&self) -> Option<&Lifetime> {
        if let LeafNodeSource::KeyPackage(life_time) = &self.payload.leaf_node_source {
            Some(life_time)
        } else {
            None
        }
    }

    /// Returns a reference to the [`Signature`] of this leaf.
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Return a reference to [`Capabilities`].
    pub fn capabilities(&self) -> &Capabilities {
        &self.payload.capabilities
    }

    /// Return a reference to the leaf node source.
    pub fn leaf_node_source(&self) -> &LeafNodeSource {
        &self.payload.leaf_node_source
    }

    /// Return a reference to the leaf node extensions.
    pub fn extensions(&self) -> &Extensions {
        &self.payload.extensions
    }

    /// The credential together with the signature key.
    pub fn credential_with_key(&self) -> CredentialWithKey {
        CredentialWithKey {
            credential: self.payload.credential.clone(),
            signature_key: self.payload.signature_key.clone(),
        }
    }

    /// Returns `true` if the [`ExtensionType`] is supported by this leaf node.
    pub(crate) fn supports_extension(&self, extension_type: ExtensionType) -> bool {
        self.payload.capabilities.supports_extension(extension_type)
    }
}

#[cfg(any(feature = "test-utils", test))]
impl LeafNode {
    /// Replace the encryption key without re-signing.
    pub fn set_encryption_key_unsigned(&mut self, encryption_key: HpkePublicKey) {
        self.payload.encryption_key = encryption_key;
    }
}
