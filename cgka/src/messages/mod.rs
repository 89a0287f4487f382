//! # Messages
//!
//! This module contains the types and implementations for Commit & Welcome
//! messages, as well as Proposals & the group info used for external commits.

use cgka_traits::{
    crypto::CgkaCrypto,
    types::{Ciphersuite, HpkeCiphertext},
};
use serde::{Deserialize, Serialize};
use tls_codec::{
    Deserialize as TlsDeserializeTrait, Serialize as TlsSerializeTrait, TlsDeserialize,
    TlsSerialize, TlsSize, VLBytes,
};

use crate::{
    ciphersuite::{hash_ref::KeyPackageRef, hpke, Mac},
    error::LibraryError,
    schedule::{psk::PreSharedKeyId, JoinerSecret},
    treesync::{private_tree::PathSecret, treekem::UpdatePath},
};

use proposals::ProposalOrRef;

pub mod group_info;
pub mod proposals;


const WELCOME_LABEL: &str = "Welcome";

/// Welcome message
///
/// This message is generated when new members are added to a group. Each new
/// member finds its [`GroupSecrets`] among the `secrets` and uses them to
/// decrypt the [`GroupInfo`](group_info::GroupInfo).
///
/// ```c
/// struct {
///   CipherSuite cipher_suite;
///   EncryptedGroupSecrets secrets<V>;
///   opaque encrypted_group_info<V>;
/// } Welcome;
/// ```
#[derive(
    Clone, Debug, PartialEq, Eq, Serialize, Deserialize, TlsDeserialize, TlsSerialize, TlsSize,
)]
pub struct Welcome {
    cipher_suite: Ciphersuite,
    secrets: Vec<EncryptedGroupSecrets>,
    encrypted_group_info: VLBytes,
}

impl Welcome {
    pub(crate) fn new(
        cipher_suite: Ciphersuite,
        secrets: Vec<EncryptedGroupSecrets>,
        encrypted_group_info: Vec<u8>,
    ) -> Self {
        Self {
            cipher_suite,
            secrets,
            encrypted_group_info: encrypted_group_info.into(),
        }
    }

    pub fn ciphersuite(&self) -> Ciphersuite {
        self.cipher_suite
    }

    /// The encrypted group secrets, one entry per new member.
    pub fn secrets(&self) -> &[EncryptedGroupSecrets] {
        self.secrets.as_slice()
    }

    pub(crate) fn encrypted_group_info(&self) -> &[u8] {
        self.encrypted_group_info.as_slice()
    }

    /// The entry for the key package with the given reference, if any.
    pub(crate) fn find_secrets(
        &self,
        key_package_ref: &KeyPackageRef,
    ) -> Option<&EncryptedGroupSecrets> {
        self.secrets
            .iter()
            .find(|egs| &egs.new_member == key_package_ref)
    }

    #[cfg(test)]
    pub(crate) fn set_encrypted_group_info(&mut self, encrypted_group_info: Vec<u8>) {
        self.encrypted_group_info = encrypted_group_info.into();
    }
}

/// ```c
/// struct {
///   KeyPackageRef new_member;
///   HPKECiphertext encrypted_group_secrets;
/// } EncryptedGroupSecrets;
/// ```
#[derive(
    Clone, Debug, PartialEq, Eq, Serialize, Deserialize, TlsDeserialize, TlsSerialize, TlsSize,
)]
pub struct EncryptedGroupSecrets {
    new_member: KeyPackageRef,
    encrypted_group_secrets: HpkeCiphertext,
}

impl EncryptedGroupSecrets {
    pub(crate) fn new(new_member: KeyPackageRef, encrypted_group_secrets: HpkeCiphertext) -> Self {
        Self {
            new_member,
            encrypted_group_secrets,
        }
    }

    /// The reference of the key package these secrets are encrypted to.
    pub fn new_member(&self) -> &KeyPackageRef {
        &self.new_member
    }

    pub(crate) fn encrypted_group_secrets(&self) -> &HpkeCiphertext {
        &self.encrypted_group_secrets
    }
}

/// Commit.
///
/// A Commit message initiates a new epoch for the group, based on a
/// collection of Proposals. It instructs group members to update their
/// representation of the state of the group by applying the proposals and
/// advancing the key schedule.
///
/// ```c
/// struct {
///     ProposalOrRef proposals<V>;
///     optional<UpdatePath> path;
/// } Commit;
/// ```
#[derive(
    Debug, PartialEq, Eq, Clone, Serialize, Deserialize, TlsDeserialize, TlsSerialize, TlsSize,
)]
pub struct Commit {
    pub(crate) proposals: Vec<ProposalOrRef>,
    pub(crate) path: Option<UpdatePath>,
}

impl Commit {
    pub fn proposals(&self) -> &[ProposalOrRef] {
        self.proposals.as_slice()
    }

    /// Returns the update path of the Commit if it has one.
    pub fn path(&self) -> Option<&UpdatePath> {
        self.path.as_ref()
    }

    /// Returns `true` if the commit contains an update path.
    pub fn has_path(&self) -> bool {
        self.path.is_some()
    }
}

/// Confirmation tag field of commits. For type safety this is a wrapper
/// around a `Mac`.
#[derive(
    Debug, PartialEq, Eq, Clone, Serialize, Deserialize, TlsDeserialize, TlsSerialize, TlsSize,
)]
pub struct ConfirmationTag(pub(crate) Mac);

/// The secrets a new member needs to join a group.
///
/// ```c
/// struct {
///   opaque joiner_secret<V>;
///   optional<PathSecret> path_secret;
///   PreSharedKeyID psks<V>;
/// } GroupSecrets;
/// ```
#[derive(Debug, Clone, PartialEq, TlsSerialize, TlsDeserialize, TlsSize)]
pub(crate) struct GroupSecrets {
    pub(crate) joiner_secret: JoinerSecret,
    pub(crate) path_secret: Option<PathSecret>,
    pub(crate) psks: Vec<PreSharedKeyId>,
}

impl GroupSecrets {
    /// HPKE-encrypt the group secrets to the init key of a new member. The
    /// encryption is bound to the encrypted group info of the Welcome.
    pub(crate) fn encrypt(
        &self,
        crypto: &impl CgkaCrypto,
        ciphersuite: Ciphersuite,
        init_key: &[u8],
        encrypted_group_info: &[u8],
    ) -> Result<HpkeCiphertext, LibraryError> {
        let group_secrets_bytes = self
            .tls_serialize_detached()
            .map_err(LibraryError::missing_bound_check)?;
        hpke::encrypt_with_label(
            init_key,
            WELCOME_LABEL,
            encrypted_group_info,
            &group_secrets_bytes,
            ciphersuite,
            crypto,
        )
        .map_err(|_| LibraryError::custom("Encrypting the group secrets failed"))
    }

    /// Decrypt the group secrets with the init private key of a new member.
    ///
    /// Returns `None` if decryption or decoding fails.
    pub(crate) fn decrypt(
        crypto: &impl CgkaCrypto,
        ciphersuite: Ciphersuite,
        init_private_key: &[u8],
        encrypted_group_secrets: &HpkeCiphertext,
        encrypted_group_info: &[u8],
    ) -> Option<Self> {
        let group_secrets_bytes = hpke::decrypt_with_label(
            init_private_key,
            WELCOME_LABEL,
            encrypted_group_info,
            encrypted_group_secrets,
            ciphersuite,
            crypto,
        )
        .map_err(|e| log::error!("Group secrets decryption failed: {:?}", e))
        .ok()?;
        GroupSecrets::tls_deserialize(&mut group_secrets_bytes.as_slice())
            .map_err(|e| log::error!("Malformed group secrets: {:?}", e))
            .ok()
    }
}
