//! The signed group info that new members join from.

use cgka_traits::{crypto::CgkaCrypto, types::SignatureScheme};
use serde::{Deserialize, Serialize};
use tls_codec::{Serialize as TlsSerializeTrait, TlsDeserialize, TlsSerialize, TlsSize};

use super::ConfirmationTag;
use crate::{
    binary_tree::LeafNodeIndex,
    ciphersuite::{
        signable::{Signable, SignedStruct, Verifiable},
        signature::{SignatureError, SignaturePublicKey},
        Signature,
    },
    extensions::Extensions,
    group::group_context::GroupContext,
};

const GROUP_INFO_TBS_LABEL: &str = "GroupInfoTBS";

/// ```c
/// struct {
///     GroupContext group_context;
///     Extension extensions<V>;
///     MAC confirmation_tag;
///     uint32 signer;
/// } GroupInfoTBS;
/// ```
#[derive(
    Debug, PartialEq, Clone, Serialize, Deserialize, TlsSerialize, TlsDeserialize, TlsSize,
)]
pub(crate) struct GroupInfoTbs {
    group_context: GroupContext,
    extensions: Extensions,
    confirmation_tag: ConfirmationTag,
    signer: LeafNodeIndex,
}

impl GroupInfoTbs {
    pub(crate) fn new(
        group_context: GroupContext,
        extensions: Extensions,
        confirmation_tag: ConfirmationTag,
        signer: LeafNodeIndex,
    ) -> Self {
        Self {
            group_context,
            extensions,
            confirmation_tag,
            signer,
        }
    }
}

impl Signable for GroupInfoTbs {
    type SignedOutput = GroupInfo;

    fn unsigned_payload(&self) -> Result<Vec<u8>, tls_codec::Error> {
        self.tls_serialize_detached()
    }

    fn label(&self) -> &str {
        GROUP_INFO_TBS_LABEL
    }
}

/// GroupInfo
///
/// The struct is split into the payload and the signature.
///
/// ```c
/// struct {
///     GroupContext group_context;
///     Extension extensions<V>;
///     MAC confirmation_tag;
///     uint32 signer;
///     /* SignWithLabel(., "GroupInfoTBS", GroupInfoTBS) */
///     opaque signature<V>;
/// } GroupInfo;
/// ```
#[derive(
    Debug, PartialEq, Clone, Serialize, Deserialize, TlsSerialize, TlsDeserialize, TlsSize,
)]
pub struct GroupInfo {
    payload: GroupInfoTbs,
    signature: Signature,
}

impl GroupInfo {
    /// The group context of the epoch the group info belongs to.
    pub fn group_context(&self) -> &GroupContext {
        &self.payload.group_context
    }

    /// Extensions of the group info itself, e.g. the ratchet tree or the
    /// external public key.
    pub fn extensions(&self) -> &Extensions {
        &self.payload.extensions
    }

    pub fn confirmation_tag(&self) -> &ConfirmationTag {
        &self.payload.confirmation_tag
    }

    /// The leaf of the member that signed the group info.
    pub fn signer(&self) -> LeafNodeIndex {
        self.payload.signer
    }

    /// Verify the signature with the signature key of the signer's leaf.
    pub(crate) fn verify(
        &self,
        crypto: &impl CgkaCrypto,
        signature_scheme: SignatureScheme,
        signature_key: &SignaturePublicKey,
    ) -> Result<(), SignatureError> {
        self.verify_no_out(crypto, signature_scheme, signature_key)
    }

    #[cfg(test)]
    pub(crate) fn payload_mut(&mut self) -> &mut GroupInfoTbs {
        &mut self.payload
    }
}

#[cfg(test)]
impl GroupInfoTbs {
    pub(crate) fn set_extensions(&mut self, extensions: Extensions) {
        self.extensions = extensions;
    }
}

impl Verifiable for GroupInfo {
    fn unsigned_payload(&self) -> Result<Vec<u8>, tls_codec::Error> {
        self.payload.unsigned_payload()
    }

    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn label(&self) -> &str {
        GROUP_INFO_TBS_LABEL
    }
}

impl SignedStruct<GroupInfoTbs> for GroupInfo {
    fn from_payload(payload: GroupInfoTbs, signature: Signature) -> Self {
        Self { payload, signature }
    }
}
