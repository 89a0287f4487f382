//! The content of a message before it is authenticated, and the structures
//! the signature and the membership tag are computed over.

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};
use tls_codec::{
    Deserialize as TlsDeserializeTrait, Serialize as TlsSerializeTrait, Size, TlsDeserialize,
    TlsSerialize, TlsSize, VLBytes,
};

use super::{
    mls_auth_content::{AuthenticatedContent, FramedContentAuthData},
    ContentType, Sender, WireFormat,
};
use crate::{
    ciphersuite::signable::{Signable, SignedStruct},
    ciphersuite::Signature,
    group::{GroupEpoch, GroupId},
    messages::{proposals::Proposal, Commit},
    versions::ProtocolVersion,
};

pub(crate) const FRAMED_CONTENT_TBS_LABEL: &str = "FramedContentTBS";

/// ```c
/// struct {
///     opaque group_id<V>;
///     uint64 epoch;
///     Sender sender;
///     opaque authenticated_data<V>;
///
///     ContentType content_type;
///     select (FramedContent.content_type) {
///         case application:
///           opaque application_data<V>;
///         case proposal:
///           Proposal proposal;
///         case commit:
///           Commit commit;
///     };
/// } FramedContent;
/// ```
#[derive(
    Debug, PartialEq, Clone, Serialize, Deserialize, TlsSerialize, TlsDeserialize, TlsSize,
)]
pub struct FramedContent {
    pub(crate) group_id: GroupId,
    pub(crate) epoch: GroupEpoch,
    pub(crate) sender: Sender,
    pub(crate) authenticated_data: VLBytes,
    pub(crate) body: FramedContentBody,
}

impl FramedContent {
    /// The group the content belongs to.
    pub fn group_id(&self) -> &GroupId {
        &self.group_id
    }

    /// The epoch the content was sent in.
    pub fn epoch(&self) -> GroupEpoch {
        self.epoch
    }

    /// The sender.
    pub fn sender(&self) -> &Sender {
        &self.sender
    }

    /// Data authenticated but not encrypted.
    pub fn authenticated_data(&self) -> &[u8] {
        self.authenticated_data.as_slice()
    }

    /// The body.
    pub fn body(&self) -> &FramedContentBody {
        &self.body
    }

    /// The content type of the body.
    pub fn content_type(&self) -> ContentType {
        self.body.content_type()
    }
}

/// The body of a [`FramedContent`].
#[derive(
    Debug, PartialEq, Clone, Serialize, Deserialize, TlsSerialize, TlsDeserialize, TlsSize,
)]
#[repr(u8)]
pub enum FramedContentBody {
    /// Application data
    #[tls_codec(discriminant = 1)]
    Application(VLBytes),
    /// A proposal
    #[tls_codec(discriminant = 2)]
    Proposal(Proposal),
    /// A commit
    #[tls_codec(discriminant = 3)]
    Commit(Commit),
}

impl FramedContentBody {
    pub(crate) fn content_type(&self) -> ContentType {
        match self {
            Self::Application(_) => ContentType::Application,
            Self::Proposal(_) => ContentType::Proposal,
            Self::Commit(_) => ContentType::Commit,
        }
    }

    /// Returns the length of the serialized content without the `content_type` field.
    pub(crate) fn serialized_len_without_type(&self) -> usize {
        match self {
            FramedContentBody::Application(a) => a.tls_serialized_len(),
            FramedContentBody::Proposal(p) => p.tls_serialized_len(),
            FramedContentBody::Commit(c) => c.tls_serialized_len(),
        }
    }

    /// Serializes the content without the `content_type` field.
    pub(crate) fn serialize_without_type<W: Write>(
        &self,
        writer: &mut W,
    ) -> Result<usize, tls_codec::Error> {
        match self {
            FramedContentBody::Application(a) => a.tls_serialize(writer),
            FramedContentBody::Proposal(p) => p.tls_serialize(writer),
            FramedContentBody::Commit(c) => c.tls_serialize(writer),
        }
    }

    pub(crate) fn deserialize_without_type<R: Read>(
        bytes: &mut R,
        content_type: ContentType,
    ) -> Result<Self, tls_codec::Error> {
        Ok(match content_type {
            ContentType::Application => {
                FramedContentBody::Application(VLBytes::tls_deserialize(bytes)?)
            }
            ContentType::Proposal => FramedContentBody::Proposal(Proposal::tls_deserialize(bytes)?),
            ContentType::Commit => FramedContentBody::Commit(Commit::tls_deserialize(bytes)?),
        })
    }
}

/// ```c
/// struct {
///     ProtocolVersion version = mls10;
///     WireFormat wire_format;
///     FramedContent content;
///     select (FramedContentTBS.content.sender.sender_type) {
///         case member:
///         case new_member_commit:
///             GroupContext context;
///     };
/// } FramedContentTBS;
/// ```
///
/// The context is stored in its encoded form.
#[derive(PartialEq, Debug, Clone)]
pub(crate) struct FramedContentTbs {
    pub(super) wire_format: WireFormat,
    pub(super) content: FramedContent,
    pub(super) serialized_context: Option<Vec<u8>>,
}

impl FramedContentTbs {
    pub(crate) fn new(
        wire_format: WireFormat,
        content: FramedContent,
        serialized_context: impl Into<Option<Vec<u8>>>,
    ) -> Self {
        Self {
            wire_format,
            content,
            serialized_context: serialized_context.into(),
        }
    }

    pub(super) fn serialize_content_tbs<W: Write>(
        wire_format: WireFormat,
        content: &FramedContent,
        serialized_context: Option<&[u8]>,
        buffer: &mut W,
    ) -> Result<usize, tls_codec::Error> {
        let mut written = ProtocolVersion::default().tls_serialize(buffer)?;
        written += wire_format.tls_serialize(buffer)?;
        written += content.tls_serialize(buffer)?;
        if let Some(serialized_context) = serialized_context {
            debug_assert!(matches!(
                content.sender,
                Sender::Member(_) | Sender::NewMemberCommit
            ));
            buffer
                .write_all(serialized_context)
                .map_err(|_| tls_codec::Error::EncodingError("Failed to write context".into()))?;
            written += serialized_context.len();
        }
        Ok(written)
    }
}

impl Size for FramedContentTbs {
    #[inline]
    fn tls_serialized_len(&self) -> usize {
        ProtocolVersion::default().tls_serialized_len()
            + self.wire_format.tls_serialized_len()
            + self.content.tls_serialized_len()
            + self
                .serialized_context
                .as_ref()
                .map(|context| context.len())
                .unwrap_or(0)
    }
}

impl TlsSerializeTrait for FramedContentTbs {
    fn tls_serialize<W: Write>(&self, writer: &mut W) -> Result<usize, tls_codec::Error> {
        Self::serialize_content_tbs(
            self.wire_format,
            &self.content,
            self.serialized_context.as_deref(),
            writer,
        )
    }
}

impl Signable for FramedContentTbs {
    type SignedOutput = AuthenticatedContent;

    fn unsigned_payload(&self) -> Result<Vec<u8>, tls_codec::Error> {
        self.tls_serialize_detached()
    }

    fn label(&self) -> &str {
        FRAMED_CONTENT_TBS_LABEL
    }
}

impl SignedStruct<FramedContentTbs> for AuthenticatedContent {
    fn from_payload(tbs: FramedContentTbs, signature: Signature) -> Self {
        AuthenticatedContent {
            wire_format: tbs.wire_format,
            content: tbs.content,
            auth: FramedContentAuthData {
                signature,
                confirmation_tag: None,
            },
        }
    }
}

/// ```c
/// struct {
///     FramedContentTBS content_tbs;
///     FramedContentAuthData auth;
/// } AuthenticatedContentTBM;
/// ```
pub(crate) struct AuthenticatedContentTbm<'a> {
    tbs_payload: Vec<u8>,
    auth: &'a FramedContentAuthData,
}

impl<'a> AuthenticatedContentTbm<'a> {
    pub(crate) fn new(
        content: &FramedContent,
        auth: &'a FramedContentAuthData,
        serialized_context: &[u8],
    ) -> Result<Self, tls_codec::Error> {
        let mut tbs_payload = Vec::new();
        FramedContentTbs::serialize_content_tbs(
            WireFormat::PublicMessage,
            content,
            Some(serialized_context),
            &mut tbs_payload,
        )?;
        Ok(Self { tbs_payload, auth })
    }

    pub(crate) fn into_bytes(self) -> Result<Vec<u8>, tls_codec::Error> {
        let mut buffer = self.tbs_payload;
        self.auth.tls_serialize(&mut buffer)?;
        Ok(buffer)
    }
}
