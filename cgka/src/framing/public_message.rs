//! Unencrypted messages and the transcript hash inputs derived from commits.

use std::io::{Read, Write};

use cgka_traits::{crypto::CgkaCrypto, types::Ciphersuite};
use serde::{Deserialize, Serialize};
use tls_codec::{
    Deserialize as TlsDeserializeTrait, Serialize as TlsSerializeTrait, Size, TlsDeserialize,
    TlsSerialize, TlsSize,
};

use super::{
    mls_auth_content::{AuthenticatedContent, FramedContentAuthData},
    mls_content::{AuthenticatedContentTbm, FramedContent, FramedContentBody},
    ContentType, MembershipTagError, Sender, VerifiableAuthenticatedContent, WireFormat,
};
use crate::{
    ciphersuite::{Mac, Signature},
    error::LibraryError,
    group::{GroupEpoch, GroupId},
    messages::{Commit, ConfirmationTag},
    schedule::MembershipKey,
};

/// Membership tag of a public message.
///
/// ```c
/// MAC membership_tag;
/// ```
#[derive(
    Debug, PartialEq, Eq, Clone, Serialize, Deserialize, TlsSerialize, TlsDeserialize, TlsSize,
)]
pub struct MembershipTag(pub(crate) Mac);

/// ```c
/// struct {
///     FramedContent content;
///     FramedContentAuthData auth;
///     select (PublicMessage.content.sender.sender_type) {
///         case member:
///             MAC membership_tag;
///         case new_member_commit:
///             struct{};
///     };
/// } PublicMessage;
/// ```
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct PublicMessage {
    pub(crate) content: FramedContent,
    pub(crate) auth: FramedContentAuthData,
    pub(crate) membership_tag: Option<MembershipTag>,
}

impl PublicMessage {
    /// Frames authenticated content as a public message. The membership tag
    /// has to be added with [`Self::set_membership_tag`] for member senders.
    pub(crate) fn from_authenticated_content(authenticated_content: AuthenticatedContent) -> Self {
        PublicMessage {
            content: authenticated_content.content,
            auth: authenticated_content.auth,
            membership_tag: None,
        }
    }

    /// Compute and set the membership tag over the `AuthenticatedContentTBM`
    /// of this message.
    pub(crate) fn set_membership_tag(
        &mut self,
        crypto: &impl CgkaCrypto,
        ciphersuite: Ciphersuite,
        membership_key: &MembershipKey,
        serialized_context: &[u8],
    ) -> Result<(), LibraryError> {
        let tbm_payload =
            AuthenticatedContentTbm::new(&self.content, &self.auth, serialized_context)?
                .into_bytes()?;
        let membership_tag = membership_key
            .tag(crypto, ciphersuite, &tbm_payload)
            .map_err(LibraryError::unexpected_crypto_error)?;
        self.membership_tag = Some(membership_tag);
        Ok(())
    }

    /// Verify the membership tag of a message sent by a member. Messages of
    /// new members carry no tag and are not checked.
    pub(crate) fn verify_membership(
        &self,
        crypto: &impl CgkaCrypto,
        ciphersuite: Ciphersuite,
        membership_key: &MembershipKey,
        serialized_context: &[u8],
    ) -> Result<(), MembershipTagError> {
        if !self.content.sender.is_member() {
            return Ok(());
        }
        log::debug!("Verifying membership tag.");
        let membership_tag = self
            .membership_tag
            .as_ref()
            .ok_or(MembershipTagError::MissingMembershipTag)?;
        let tbm_payload =
            AuthenticatedContentTbm::new(&self.content, &self.auth, serialized_context)
                .map_err(LibraryError::missing_bound_check)?
                .into_bytes()
                .map_err(LibraryError::missing_bound_check)?;
        let expected_membership_tag = membership_key
            .tag(crypto, ciphersuite, &tbm_payload)
            .map_err(LibraryError::unexpected_crypto_error)?;
        if membership_tag != &expected_membership_tag {
            log::error!("Membership tag mismatch");
            return Err(MembershipTagError::InvalidMembershipTag);
        }
        Ok(())
    }

    /// Turn the message into content whose signature can be verified against
    /// the encoded group context of its epoch.
    pub(crate) fn into_verifiable_content(
        self,
        serialized_context: impl Into<Option<Vec<u8>>>,
    ) -> VerifiableAuthenticatedContent {
        VerifiableAuthenticatedContent::new(
            WireFormat::PublicMessage,
            self.content,
            serialized_context,
            self.auth,
        )
    }

    pub fn sender(&self) -> &Sender {
        &self.content.sender
    }

    pub fn group_id(&self) -> &GroupId {
        &self.content.group_id
    }

    pub fn epoch(&self) -> GroupEpoch {
        self.content.epoch
    }

    pub fn content_type(&self) -> ContentType {
        self.content.body.content_type()
    }

    /// The commit carried by this message, if any.
    pub fn commit(&self) -> Option<&Commit> {
        match &self.content.body {
            FramedContentBody::Commit(commit) => Some(commit),
            _ => None,
        }
    }

    pub fn confirmation_tag(&self) -> Option<&ConfirmationTag> {
        self.auth.confirmation_tag.as_ref()
    }

    #[cfg(test)]
    pub(crate) fn membership_tag_mut(&mut self) -> Option<&mut MembershipTag> {
        self.membership_tag.as_mut()
    }

    #[cfg(test)]
    pub(crate) fn signature_mut(&mut self) -> &mut Signature {
        &mut self.auth.signature
    }

    #[cfg(test)]
    pub(crate) fn set_epoch(&mut self, epoch: u64) {
        self.content.epoch = epoch.into();
    }
}

impl From<AuthenticatedContent> for PublicMessage {
    fn from(authenticated_content: AuthenticatedContent) -> Self {
        Self::from_authenticated_content(authenticated_content)
    }
}

impl Size for PublicMessage {
    fn tls_serialized_len(&self) -> usize {
        self.content.tls_serialized_len()
            + self.auth.tls_serialized_len()
            + self
                .membership_tag
                .as_ref()
                .map(|tag| tag.tls_serialized_len())
                .unwrap_or(0)
    }
}

impl TlsSerializeTrait for PublicMessage {
    fn tls_serialize<W: Write>(&self, writer: &mut W) -> Result<usize, tls_codec::Error> {
        let mut written = self.content.tls_serialize(writer)?;
        written += self.auth.tls_serialize(writer)?;
        if let Some(membership_tag) = &self.membership_tag {
            written += membership_tag.tls_serialize(writer)?;
        }
        Ok(written)
    }
}

impl TlsDeserializeTrait for PublicMessage {
    fn tls_deserialize<R: Read>(bytes: &mut R) -> Result<Self, tls_codec::Error> {
        let content = FramedContent::tls_deserialize(bytes)?;
        let auth = FramedContentAuthData::deserialize(bytes, content.body.content_type())?;
        let membership_tag = if content.sender.is_member() {
            Some(MembershipTag::tls_deserialize(bytes)?)
        } else {
            None
        };
        Ok(PublicMessage {
            content,
            auth,
            membership_tag,
        })
    }
}

/// ```c
/// struct {
///     WireFormat wire_format;
///     FramedContent content; /* with content_type == commit */
///     opaque signature<V>;
/// } ConfirmedTranscriptHashInput;
/// ```
pub(crate) struct ConfirmedTranscriptHashInput<'a> {
    wire_format: WireFormat,
    content: &'a FramedContent,
    signature: &'a Signature,
}

impl<'a> ConfirmedTranscriptHashInput<'a> {
    /// `confirmed_transcript_hash_[n] = Hash(interim_transcript_hash_[n-1] ||
    /// ConfirmedTranscriptHashInput_[n])`
    pub(crate) fn calculate_confirmed_transcript_hash(
        &self,
        crypto: &impl CgkaCrypto,
        ciphersuite: Ciphersuite,
        interim_transcript_hash: &[u8],
    ) -> Result<Vec<u8>, LibraryError> {
        let mut input = interim_transcript_hash.to_vec();
        self.wire_format.tls_serialize(&mut input)?;
        self.content.tls_serialize(&mut input)?;
        self.signature.tls_serialize(&mut input)?;
        crypto
            .hash(ciphersuite.hash_algorithm(), &input)
            .map_err(LibraryError::unexpected_crypto_error)
    }
}

impl<'a> TryFrom<&'a AuthenticatedContent> for ConfirmedTranscriptHashInput<'a> {
    type Error = &'static str;

    fn try_from(authenticated_content: &'a AuthenticatedContent) -> Result<Self, Self::Error> {
        if !matches!(
            authenticated_content.content().body,
            FramedContentBody::Commit(_)
        ) {
            return Err("Content is not a commit");
        }
        Ok(ConfirmedTranscriptHashInput {
            wire_format: authenticated_content.wire_format(),
            content: authenticated_content.content(),
            signature: authenticated_content.signature(),
        })
    }
}

/// ```c
/// struct {
///     MAC confirmation_tag;
/// } InterimTranscriptHashInput;
/// ```
pub(crate) struct InterimTranscriptHashInput<'a> {
    confirmation_tag: &'a ConfirmationTag,
}

impl<'a> InterimTranscriptHashInput<'a> {
    /// `interim_transcript_hash_[n] = Hash(confirmed_transcript_hash_[n] ||
    /// InterimTranscriptHashInput_[n])`
    pub(crate) fn calculate_interim_transcript_hash(
        &self,
        crypto: &impl CgkaCrypto,
        ciphersuite: Ciphersuite,
        confirmed_transcript_hash: &[u8],
    ) -> Result<Vec<u8>, LibraryError> {
        let mut input = confirmed_transcript_hash.to_vec();
        self.confirmation_tag.tls_serialize(&mut input)?;
        crypto
            .hash(ciphersuite.hash_algorithm(), &input)
            .map_err(LibraryError::unexpected_crypto_error)
    }
}

impl<'a> From<&'a ConfirmationTag> for InterimTranscriptHashInput<'a> {
    fn from(confirmation_tag: &'a ConfirmationTag) -> Self {
        InterimTranscriptHashInput { confirmation_tag }
    }
}
