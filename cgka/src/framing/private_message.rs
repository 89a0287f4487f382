//! Messages encrypted under the secret tree of an epoch.

use std::io::Write;

use cgka_traits::{crypto::CgkaCrypto, random::CgkaRand, types::Ciphersuite};
use serde::{Deserialize, Serialize};
use tls_codec::{
    Deserialize as TlsDeserializeTrait, Serialize as TlsSerializeTrait, Size, TlsDeserialize,
    TlsSerialize, TlsSize, VLBytes,
};

use super::{
    mls_auth_content::{AuthenticatedContent, FramedContentAuthData},
    mls_content::{FramedContent, FramedContentBody},
    ContentType, MessageDecryptionError, MessageEncryptionError, Sender,
    VerifiableAuthenticatedContent, WireFormat,
};
use crate::{
    binary_tree::LeafNodeIndex,
    ciphersuite::{AeadKey, AeadNonce, ReuseGuard},
    config::SenderRatchetConfiguration,
    error::LibraryError,
    group::{GroupEpoch, GroupId},
    schedule::MessageSecrets,
    tree::secret_tree::SecretType,
};

/// `PrivateMessage` is the framing struct for encrypted content.
///
/// ```c
/// struct {
///     opaque group_id<V>;
///     uint64 epoch;
///     ContentType content_type;
///     opaque authenticated_data<V>;
///     opaque encrypted_sender_data<V>;
///     opaque ciphertext<V>;
/// } PrivateMessage;
/// ```
#[derive(
    Debug, PartialEq, Eq, Clone, Serialize, Deserialize, TlsSerialize, TlsDeserialize, TlsSize,
)]
pub struct PrivateMessage {
    pub(crate) group_id: GroupId,
    pub(crate) epoch: GroupEpoch,
    pub(crate) content_type: ContentType,
    pub(crate) authenticated_data: VLBytes,
    pub(crate) encrypted_sender_data: VLBytes,
    pub(crate) ciphertext: VLBytes,
}

impl PrivateMessage {
    /// Encrypt `authenticated_content` with the next key of the sender's
    /// chain in the secret tree of `message_secrets`.
    ///
    /// The content is padded with zeros so that the ciphertext length is a
    /// multiple of `padding_size`. A `padding_size` of `0` disables padding.
    pub(crate) fn encrypt(
        crypto: &impl CgkaCrypto,
        rand: &impl CgkaRand,
        authenticated_content: &AuthenticatedContent,
        ciphersuite: Ciphersuite,
        message_secrets: &mut MessageSecrets,
        padding_size: usize,
    ) -> Result<PrivateMessage, MessageEncryptionError> {
        log::debug!("PrivateMessage::encrypt");
        log::trace!("  ciphersuite: {}", ciphersuite);
        if authenticated_content.wire_format() != WireFormat::PrivateMessage {
            return Err(MessageEncryptionError::WrongWireFormat);
        }
        let sender_index = authenticated_content
            .sender()
            .as_member()
            .ok_or_else(|| LibraryError::custom("Sender is not a member."))?;
        let group_id = authenticated_content.group_id().clone();
        let epoch = authenticated_content.epoch();
        let content_type = authenticated_content.content_type();

        let content_aad_bytes = PrivateContentAad {
            group_id: group_id.clone(),
            epoch,
            content_type,
            authenticated_data: authenticated_content.authenticated_data().into(),
        }
        .tls_serialize_detached()
        .map_err(LibraryError::missing_bound_check)?;

        let secret_type = SecretType::from(content_type);
        let (generation, (ratchet_key, mut ratchet_nonce)) = message_secrets
            .secret_tree_mut()
            .secret_for_encryption(ciphersuite, crypto, sender_index, secret_type)?;
        let reuse_guard =
            ReuseGuard::try_from_random(rand).map_err(LibraryError::unexpected_crypto_error)?;
        ratchet_nonce.xor_with_reuse_guard(&reuse_guard);

        let padded_content = encode_padded_content(
            authenticated_content,
            padding_size,
            ciphersuite.mac_length(),
        )
        .map_err(LibraryError::missing_bound_check)?;
        log_content!(trace, "  Padded content: {:x?}", padded_content);
        let ciphertext = ratchet_key
            .aead_seal(crypto, &padded_content, &content_aad_bytes, &ratchet_nonce)
            .map_err(LibraryError::unexpected_crypto_error)?;

        let sender_data_secret = message_secrets.sender_data_secret();
        let sender_data_key = sender_data_secret
            .derive_aead_key(crypto, ciphersuite, &ciphertext)
            .map_err(LibraryError::unexpected_crypto_error)?;
        let sender_data_nonce = sender_data_secret
            .derive_aead_nonce(crypto, ciphersuite, &ciphertext)
            .map_err(LibraryError::unexpected_crypto_error)?;
        let sender_data_aad_bytes = MlsSenderDataAad {
            group_id: group_id.clone(),
            epoch,
            content_type,
        }
        .tls_serialize_detached()
        .map_err(LibraryError::missing_bound_check)?;
        let sender_data_bytes = MlsSenderData {
            leaf_index: sender_index,
            generation,
            reuse_guard,
        }
        .tls_serialize_detached()
        .map_err(LibraryError::missing_bound_check)?;
        let encrypted_sender_data = sender_data_key
            .aead_seal(
                crypto,
                &sender_data_bytes,
                &sender_data_aad_bytes,
                &sender_data_nonce,
            )
            .map_err(LibraryError::unexpected_crypto_error)?;

        Ok(PrivateMessage {
            group_id,
            epoch,
            content_type,
            authenticated_data: authenticated_content.authenticated_data().into(),
            encrypted_sender_data: encrypted_sender_data.into(),
            ciphertext: ciphertext.into(),
        })
    }

    /// Decrypt the sender data of this message.
    pub(crate) fn sender_data(
        &self,
        crypto: &impl CgkaCrypto,
        ciphersuite: Ciphersuite,
        message_secrets: &MessageSecrets,
    ) -> Result<MlsSenderData, MessageDecryptionError> {
        let sender_data_secret = message_secrets.sender_data_secret();
        let sender_data_key = sender_data_secret
            .derive_aead_key(crypto, ciphersuite, self.ciphertext.as_slice())
            .map_err(LibraryError::unexpected_crypto_error)?;
        let sender_data_nonce = sender_data_secret
            .derive_aead_nonce(crypto, ciphersuite, self.ciphertext.as_slice())
            .map_err(LibraryError::unexpected_crypto_error)?;
        let sender_data_aad_bytes = MlsSenderDataAad {
            group_id: self.group_id.clone(),
            epoch: self.epoch,
            content_type: self.content_type,
        }
        .tls_serialize_detached()
        .map_err(LibraryError::missing_bound_check)?;
        let sender_data_bytes = sender_data_key
            .aead_open(
                crypto,
                self.encrypted_sender_data.as_slice(),
                &sender_data_aad_bytes,
                &sender_data_nonce,
            )
            .map_err(|_| {
                log::error!("Sender data decryption error");
                MessageDecryptionError::SenderDataDecryptionError
            })?;
        MlsSenderData::tls_deserialize(&mut sender_data_bytes.as_slice())
            .map_err(|_| MessageDecryptionError::MalformedContent)
    }

    /// Decrypt this message into content whose signature still has to be
    /// verified.
    pub(crate) fn decrypt(
        &self,
        crypto: &impl CgkaCrypto,
        ciphersuite: Ciphersuite,
        message_secrets: &mut MessageSecrets,
        sender_ratchet_configuration: &SenderRatchetConfiguration,
    ) -> Result<VerifiableAuthenticatedContent, MessageDecryptionError> {
        log::debug!("Decrypting PrivateMessage");
        let sender_data = self.sender_data(crypto, ciphersuite, message_secrets)?;
        let (ratchet_key, mut ratchet_nonce) = message_secrets
            .secret_tree_mut()
            .secret_for_decryption(
                ciphersuite,
                crypto,
                sender_data.leaf_index,
                SecretType::from(self.content_type),
                sender_data.generation,
                sender_ratchet_configuration,
            )
            .map_err(|e| {
                log::error!(
                    "  No key for generation {} of {:?}: {:?}",
                    sender_data.generation,
                    sender_data.leaf_index,
                    e
                );
                MessageDecryptionError::SecretTreeError(e)
            })?;
        ratchet_nonce.xor_with_reuse_guard(&sender_data.reuse_guard);
        let (body, auth) = self.decrypt_content(crypto, &ratchet_key, &ratchet_nonce)?;

        Ok(VerifiableAuthenticatedContent::new(
            WireFormat::PrivateMessage,
            FramedContent {
                group_id: self.group_id.clone(),
                epoch: self.epoch,
                sender: Sender::build_member(sender_data.leaf_index),
                authenticated_data: self.authenticated_data.clone(),
                body,
            },
            message_secrets.serialized_context().to_vec(),
            auth,
        ))
    }

    fn decrypt_content(
        &self,
        crypto: &impl CgkaCrypto,
        ratchet_key: &AeadKey,
        ratchet_nonce: &AeadNonce,
    ) -> Result<(FramedContentBody, FramedContentAuthData), MessageDecryptionError> {
        let content_aad_bytes = PrivateContentAad {
            group_id: self.group_id.clone(),
            epoch: self.epoch,
            content_type: self.content_type,
            authenticated_data: self.authenticated_data.clone(),
        }
        .tls_serialize_detached()
        .map_err(LibraryError::missing_bound_check)?;
        let content_bytes = ratchet_key
            .aead_open(
                crypto,
                self.ciphertext.as_slice(),
                &content_aad_bytes,
                ratchet_nonce,
            )
            .map_err(|_| {
                log::error!("  Ciphertext decryption error");
                MessageDecryptionError::AeadError
            })?;
        log_content!(trace, "  Decrypted content: {:x?}", content_bytes);

        let mut reader = content_bytes.as_slice();
        let body = FramedContentBody::deserialize_without_type(&mut reader, self.content_type)
            .map_err(|_| MessageDecryptionError::MalformedContent)?;
        let auth = FramedContentAuthData::deserialize(&mut reader, self.content_type)
            .map_err(|_| MessageDecryptionError::MalformedContent)?;
        // Everything left is padding.
        if reader.iter().any(|byte| *byte != 0x00) {
            log::error!("  Non-zero padding");
            return Err(MessageDecryptionError::InvalidPadding);
        }
        Ok((body, auth))
    }

    pub fn group_id(&self) -> &GroupId {
        &self.group_id
    }

    pub fn epoch(&self) -> GroupEpoch {
        self.epoch
    }

    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    #[cfg(test)]
    pub(crate) fn ciphertext(&self) -> &[u8] {
        self.ciphertext.as_slice()
    }

    #[cfg(test)]
    pub(crate) fn set_ciphertext(&mut self, ciphertext: Vec<u8>) {
        self.ciphertext = ciphertext.into();
    }
}

/// Encodes the `PrivateMessageContent` with padding.
///
/// ```c
/// struct {
///     select (PrivateMessage.content_type) {
///         case application:
///           opaque application_data<V>;
///         case proposal:
///           Proposal proposal;
///         case commit:
///           Commit commit;
///     };
///
///     FramedContentAuthData auth;
///     opaque padding[length_of_padding];
/// } PrivateMessageContent;
/// ```
fn encode_padded_content(
    authenticated_content: &AuthenticatedContent,
    padding_size: usize,
    mac_len: usize,
) -> Result<Vec<u8>, tls_codec::Error> {
    let plaintext_length = authenticated_content
        .body()
        .serialized_len_without_type()
        + authenticated_content.auth.tls_serialized_len();
    let padding_length = if padding_size > 0 {
        // The AEAD tag is added to the ciphertext.
        let padding_offset = plaintext_length + mac_len;
        (padding_size - (padding_offset % padding_size)) % padding_size
    } else {
        0
    };

    let mut buffer = Vec::with_capacity(plaintext_length + padding_length);
    authenticated_content
        .body()
        .serialize_without_type(&mut buffer)?;
    authenticated_content.auth.tls_serialize(&mut buffer)?;
    // Raw padding bytes without a length prefix.
    buffer
        .write_all(&vec![0u8; padding_length])
        .map_err(|_| tls_codec::Error::EncodingError("Failed to write padding.".into()))?;
    Ok(buffer)
}

// === Helper structs ===

/// ```c
/// struct {
///     uint32 leaf_index;
///     uint32 generation;
///     opaque reuse_guard[4];
/// } SenderData;
/// ```
#[derive(Clone, Debug, PartialEq, TlsSerialize, TlsDeserialize, TlsSize)]
pub(crate) struct MlsSenderData {
    pub(crate) leaf_index: LeafNodeIndex,
    pub(crate) generation: u32,
    pub(crate) reuse_guard: ReuseGuard,
}

/// ```c
/// struct {
///     opaque group_id<V>;
///     uint64 epoch;
///     ContentType content_type;
/// } SenderDataAAD;
/// ```
#[derive(TlsSerialize, TlsSize)]
struct MlsSenderDataAad {
    group_id: GroupId,
    epoch: GroupEpoch,
    content_type: ContentType,
}

/// ```c
/// struct {
///     opaque group_id<V>;
///     uint64 epoch;
///     ContentType content_type;
///     opaque authenticated_data<V>;
/// } PrivateContentAAD;
/// ```
#[derive(TlsSerialize, TlsSize)]
struct PrivateContentAad {
    group_id: GroupId,
    epoch: GroupEpoch,
    content_type: ContentType,
    authenticated_data: VLBytes,
}
