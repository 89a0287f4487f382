//! The [`GroupContext`] summarizes the state of a group in an epoch. Its
//! encoding is bound into key derivations, signatures and HPKE encryptions of
//! the epoch.

use cgka_traits::crypto::CgkaCrypto;
use serde::{Deserialize, Serialize};
use tls_codec::{Serialize as TlsSerializeTrait, TlsDeserialize, TlsSerialize, TlsSize, VLBytes};

use crate::{
    ciphersuite::Ciphersuite,
    error::LibraryError,
    extensions::{Extensions, RequiredCapabilitiesExtension},
    versions::ProtocolVersion,
};

use super::{GroupEpoch, GroupId};

/// ```c
/// struct {
///     ProtocolVersion version = mls10;
///     CipherSuite cipher_suite;
///     opaque group_id<V>;
///     uint64 epoch;
///     opaque tree_hash<V>;
///     opaque confirmed_transcript_hash<V>;
///     Extension extensions<V>;
/// } GroupContext;
/// ```
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TlsSerialize, TlsDeserialize, TlsSize,
)]
pub struct GroupContext {
    protocol_version: ProtocolVersion,
    ciphersuite: Ciphersuite,
    group_id: GroupId,
    epoch: GroupEpoch,
    tree_hash: VLBytes,
    confirmed_transcript_hash: VLBytes,
    extensions: Extensions,
}

impl GroupContext {
    /// Create a new group context
    pub fn new(
        ciphersuite: Ciphersuite,
        group_id: GroupId,
        epoch: impl Into<GroupEpoch>,
        tree_hash: Vec<u8>,
        confirmed_transcript_hash: Vec<u8>,
        extensions: Extensions,
    ) -> Self {
        GroupContext {
            ciphersuite,
            protocol_version: ProtocolVersion::Mls10,
            group_id,
            epoch: epoch.into(),
            tree_hash: tree_hash.into(),
            confirmed_transcript_hash: confirmed_transcript_hash.into(),
            extensions,
        }
    }

    /// Create the `GroupContext` needed upon creation of a new group.
    pub(crate) fn create_initial_group_context(
        ciphersuite: Ciphersuite,
        group_id: GroupId,
        tree_hash: Vec<u8>,
        extensions: Extensions,
    ) -> Self {
        Self::new(ciphersuite, group_id, 0, tree_hash, vec![], extensions)
    }

    /// The context of the next epoch before the confirmed transcript hash of
    /// the commit is known. The tree hash is set once the new tree is final.
    pub(crate) fn provisional(
        &self,
        tree_hash: Vec<u8>,
        extensions: Extensions,
    ) -> Result<Self, LibraryError> {
        let mut provisional = self.clone();
        provisional.epoch.increment()?;
        provisional.tree_hash = tree_hash.into();
        provisional.extensions = extensions;
        Ok(provisional)
    }

    pub(crate) fn set_tree_hash(&mut self, tree_hash: Vec<u8>) {
        self.tree_hash = tree_hash.into()
    }

    pub(crate) fn set_confirmed_transcript_hash(&mut self, confirmed_transcript_hash: Vec<u8>) {
        self.confirmed_transcript_hash = confirmed_transcript_hash.into()
    }

    /// The TLS encoding of this context.
    pub(crate) fn serialize(&self) -> Result<Vec<u8>, LibraryError> {
        self.tls_serialize_detached()
            .map_err(LibraryError::missing_bound_check)
    }

    /// The hash of the encoded context, used for example as context of the
    /// exporter.
    pub(crate) fn hash(&self, crypto: &impl CgkaCrypto) -> Result<Vec<u8>, LibraryError> {
        crypto
            .hash(self.ciphersuite.hash_algorithm(), &self.serialize()?)
            .map_err(LibraryError::unexpected_crypto_error)
    }

    /// Return the protocol version.
    pub fn protocol_version(&self) -> ProtocolVersion {
        self.protocol_version
    }

    /// Return the ciphersuite.
    pub fn ciphersuite(&self) -> Ciphersuite {
        self.ciphersuite
    }

    /// Return the group ID.
    pub fn group_id(&self) -> &GroupId {
        &self.group_id
    }

    /// Return the epoch.
    pub fn epoch(&self) -> GroupEpoch {
        self.epoch
    }

    /// Return the tree hash.
    pub fn tree_hash(&self) -> &[u8] {
        self.tree_hash.as_slice()
    }

    /// Return the confirmed transcript hash.
    pub fn confirmed_transcript_hash(&self) -> &[u8] {
        self.confirmed_transcript_hash.as_slice()
    }

    /// Return the extensions.
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    /// Get the required capabilities extension.
    pub fn required_capabilities(&self) -> Option<&RequiredCapabilitiesExtension> {
        self.extensions.required_capabilities()
    }
}
