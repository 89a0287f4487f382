//! Framed content together with its authentication data.

use std::io::{Read, Write};

use cgka_traits::{crypto::CgkaCrypto, types::SignatureScheme};
use serde::{Deserialize, Serialize};
use tls_codec::{Deserialize as TlsDeserializeTrait, Serialize as TlsSerializeTrait, Size};

use super::{
    mls_content::{FramedContent, FramedContentBody, FramedContentTbs, FRAMED_CONTENT_TBS_LABEL},
    ContentType, Sender, WireFormat,
};
use crate::{
    binary_tree::LeafNodeIndex,
    ciphersuite::{
        signable::{Signable, Verifiable},
        signature::{SignatureError, SignaturePublicKey},
        Signature,
    },
    credentials::SignatureKeyPair,
    error::LibraryError,
    group::{group_context::GroupContext, GroupEpoch, GroupId},
    messages::{proposals::Proposal, Commit, ConfirmationTag},
};

/// ```c
/// struct {
///     /* SignWithLabel(., "FramedContentTBS", FramedContentTBS) */
///     opaque signature<V>;
///     select (FramedContent.content_type) {
///         case commit:
///             /*
///               MAC(confirmation_key,
///                   GroupContext.confirmed_transcript_hash)
///             */
///             MAC confirmation_tag;
///         case application:
///         case proposal:
///             struct{};
///     };
/// } FramedContentAuthData;
/// ```
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub(crate) struct FramedContentAuthData {
    pub(super) signature: Signature,
    pub(super) confirmation_tag: Option<ConfirmationTag>,
}

impl FramedContentAuthData {
    pub(super) fn deserialize<R: Read>(
        bytes: &mut R,
        content_type: ContentType,
    ) -> Result<Self, tls_codec::Error> {
        let signature = Signature::tls_deserialize(bytes)?;
        let confirmation_tag = if matches!(content_type, ContentType::Commit) {
            Some(ConfirmationTag::tls_deserialize(bytes)?)
        } else {
            None
        };
        Ok(Self {
            signature,
            confirmation_tag,
        })
    }
}

impl Size for FramedContentAuthData {
    fn tls_serialized_len(&self) -> usize {
        self.signature.tls_serialized_len()
            + self
                .confirmation_tag
                .as_ref()
                .map(|tag| tag.tls_serialized_len())
                .unwrap_or(0)
    }
}

impl TlsSerializeTrait for FramedContentAuthData {
    fn tls_serialize<W: Write>(&self, writer: &mut W) -> Result<usize, tls_codec::Error> {
        let mut written = self.signature.tls_serialize(writer)?;
        if let Some(confirmation_tag) = &self.confirmation_tag {
            written += confirmation_tag.tls_serialize(writer)?;
        }
        Ok(written)
    }
}

/// ```c
/// struct {
///     WireFormat wire_format;
///     FramedContent content;
///     FramedContentAuthData auth;
/// } AuthenticatedContent;
/// ```
///
/// Content of this type has been signed locally or its signature was checked
/// with [`VerifiableAuthenticatedContent::verify`].
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedContent {
    pub(super) wire_format: WireFormat,
    pub(super) content: FramedContent,
    pub(super) auth: FramedContentAuthData,
}

impl AuthenticatedContent {
    fn new_and_sign(
        wire_format: WireFormat,
        sender: Sender,
        authenticated_data: &[u8],
        body: FramedContentBody,
        signer: &SignatureKeyPair,
        context: &GroupContext,
        crypto: &impl CgkaCrypto,
    ) -> Result<Self, LibraryError> {
        let content = FramedContent {
            group_id: context.group_id().clone(),
            epoch: context.epoch(),
            sender,
            authenticated_data: authenticated_data.into(),
            body,
        };
        // Both supported sender types sign the group context.
        let serialized_context = context.serialize()?;
        let tbs = FramedContentTbs::new(wire_format, content, serialized_context);
        tbs.sign(crypto, signer).map_err(|e| match e {
            SignatureError::LibraryError(e) => e,
            _ => LibraryError::custom("Signing failed"),
        })
    }

    /// Builds signed content carrying an application message. Application
    /// messages are always sent as private messages.
    pub(crate) fn new_application(
        sender_leaf_index: LeafNodeIndex,
        authenticated_data: &[u8],
        application_message: &[u8],
        signer: &SignatureKeyPair,
        context: &GroupContext,
        crypto: &impl CgkaCrypto,
    ) -> Result<Self, LibraryError> {
        Self::new_and_sign(
            WireFormat::PrivateMessage,
            Sender::build_member(sender_leaf_index),
            authenticated_data,
            FramedContentBody::Application(application_message.into()),
            signer,
            context,
            crypto,
        )
    }

    /// Builds signed content carrying a proposal of a member.
    pub(crate) fn member_proposal(
        wire_format: WireFormat,
        sender_leaf_index: LeafNodeIndex,
        authenticated_data: &[u8],
        proposal: Proposal,
        signer: &SignatureKeyPair,
        context: &GroupContext,
        crypto: &impl CgkaCrypto,
    ) -> Result<Self, LibraryError> {
        Self::new_and_sign(
            wire_format,
            Sender::build_member(sender_leaf_index),
            authenticated_data,
            FramedContentBody::Proposal(proposal),
            signer,
            context,
            crypto,
        )
    }

    /// Builds signed content carrying a commit. The confirmation tag has to be
    /// set afterwards with [`Self::set_confirmation_tag`].
    pub(crate) fn commit(
        wire_format: WireFormat,
        sender: Sender,
        authenticated_data: &[u8],
        commit: Commit,
        signer: &SignatureKeyPair,
        context: &GroupContext,
        crypto: &impl CgkaCrypto,
    ) -> Result<Self, LibraryError> {
        Self::new_and_sign(
            wire_format,
            sender,
            authenticated_data,
            FramedContentBody::Commit(commit),
            signer,
            context,
            crypto,
        )
    }

    pub(crate) fn signature(&self) -> &Signature {
        &self.auth.signature
    }

    pub fn confirmation_tag(&self) -> Option<&ConfirmationTag> {
        self.auth.confirmation_tag.as_ref()
    }

    pub(crate) fn set_confirmation_tag(&mut self, tag: ConfirmationTag) {
        self.auth.confirmation_tag = Some(tag)
    }

    /// The framed content.
    pub fn content(&self) -> &FramedContent {
        &self.content
    }

    pub(crate) fn into_content(self) -> FramedContent {
        self.content
    }

    pub fn body(&self) -> &FramedContentBody {
        &self.content.body
    }

    pub fn content_type(&self) -> ContentType {
        self.content.body.content_type()
    }

    pub fn wire_format(&self) -> WireFormat {
        self.wire_format
    }

    pub fn authenticated_data(&self) -> &[u8] {
        self.content.authenticated_data.as_slice()
    }

    pub fn group_id(&self) -> &GroupId {
        &self.content.group_id
    }

    pub fn epoch(&self) -> GroupEpoch {
        self.content.epoch
    }

    pub fn sender(&self) -> &Sender {
        &self.content.sender
    }

    #[cfg(test)]
    pub(crate) fn signature_mut(&mut self) -> &mut Signature {
        &mut self.auth.signature
    }
}

/// Authenticated content as received from the wire. The content can only be
/// accessed after the signature was verified.
#[derive(PartialEq, Debug, Clone)]
pub struct VerifiableAuthenticatedContent {
    pub(super) tbs: FramedContentTbs,
    pub(super) auth: FramedContentAuthData,
}

impl VerifiableAuthenticatedContent {
    pub(crate) fn new(
        wire_format: WireFormat,
        content: FramedContent,
        serialized_context: impl Into<Option<Vec<u8>>>,
        auth: FramedContentAuthData,
    ) -> Self {
        Self {
            tbs: FramedContentTbs::new(wire_format, content, serialized_context),
            auth,
        }
    }

    /// The sender. Needed to look up the verification key.
    pub fn sender(&self) -> &Sender {
        &self.tbs.content.sender
    }

    pub fn epoch(&self) -> GroupEpoch {
        self.tbs.content.epoch
    }

    pub fn group_id(&self) -> &GroupId {
        &self.tbs.content.group_id
    }

    pub fn wire_format(&self) -> WireFormat {
        self.tbs.wire_format
    }

    pub fn content_type(&self) -> ContentType {
        self.tbs.content.body.content_type()
    }

    /// The commit of a new member, whose verification key is only known from
    /// the leaf node in its update path.
    pub(crate) fn commit(&self) -> Option<&Commit> {
        match &self.tbs.content.body {
            FramedContentBody::Commit(commit) => Some(commit),
            _ => None,
        }
    }

    /// Set the serialized context before verifying the signature.
    pub(crate) fn set_context(&mut self, serialized_context: Vec<u8>) {
        self.tbs.serialized_context = Some(serialized_context);
    }

    /// Verify the signature with `signature_key` and unlock the content.
    pub fn verify(
        self,
        crypto: &impl CgkaCrypto,
        signature_scheme: SignatureScheme,
        signature_key: &SignaturePublicKey,
    ) -> Result<AuthenticatedContent, SignatureError> {
        self.verify_no_out(crypto, signature_scheme, signature_key)?;
        Ok(AuthenticatedContent {
            wire_format: self.tbs.wire_format,
            content: self.tbs.content,
            auth: self.auth,
        })
    }
}

impl Verifiable for VerifiableAuthenticatedContent {
    fn unsigned_payload(&self) -> Result<Vec<u8>, tls_codec::Error> {
        self.tbs.tls_serialize_detached()
    }

    fn signature(&self) -> &Signature {
        &self.auth.signature
    }

    fn label(&self) -> &str {
        FRAMED_CONTENT_TBS_LABEL
    }
}
