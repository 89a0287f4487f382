//! The [`MlsMessage`] envelope every message travels in.

use tls_codec::{TlsDeserialize, TlsSerialize, TlsSize};

use super::{PrivateMessage, PublicMessage, WireFormat};
use crate::{
    key_packages::KeyPackage,
    messages::{group_info::GroupInfo, Welcome},
    versions::ProtocolVersion,
};

/// ```c
/// struct {
///     ProtocolVersion version = mls10;
///
///     // ... continued in [MlsMessageBody] ...
/// } MLSMessage;
/// ```
#[derive(Debug, PartialEq, Clone, TlsSerialize, TlsDeserialize, TlsSize)]
pub struct MlsMessage {
    pub(crate) version: ProtocolVersion,
    pub(crate) body: MlsMessageBody,
}

/// ```c
/// struct {
///     // ... continued from [MlsMessage] ...
///
///     WireFormat wire_format;
///     select (MLSMessage.wire_format) {
///         case mls_public_message:
///             PublicMessage public_message;
///         case mls_private_message:
///             PrivateMessage private_message;
///         case mls_welcome:
///             Welcome welcome;
///         case mls_group_info:
///             GroupInfo group_info;
///         case mls_key_package:
///             KeyPackage key_package;
///     };
/// } MLSMessage;
/// ```
#[derive(Debug, PartialEq, Clone, TlsSerialize, TlsDeserialize, TlsSize)]
#[repr(u16)]
pub enum MlsMessageBody {
    /// Plaintext message
    #[tls_codec(discriminant = 1)]
    PublicMessage(PublicMessage),
    /// Ciphertext message
    #[tls_codec(discriminant = 2)]
    PrivateMessage(PrivateMessage),
    /// Welcome message
    #[tls_codec(discriminant = 3)]
    Welcome(Welcome),
    /// Group information
    #[tls_codec(discriminant = 4)]
    GroupInfo(GroupInfo),
    /// KeyPackage
    #[tls_codec(discriminant = 5)]
    KeyPackage(KeyPackage),
}

impl MlsMessage {
    fn new(body: MlsMessageBody) -> Self {
        Self {
            version: ProtocolVersion::default(),
            body,
        }
    }

    /// The protocol version of the message.
    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    /// The wire format of the message body.
    pub fn wire_format(&self) -> WireFormat {
        match self.body {
            MlsMessageBody::PublicMessage(_) => WireFormat::PublicMessage,
            MlsMessageBody::PrivateMessage(_) => WireFormat::PrivateMessage,
            MlsMessageBody::Welcome(_) => WireFormat::Welcome,
            MlsMessageBody::GroupInfo(_) => WireFormat::GroupInfo,
            MlsMessageBody::KeyPackage(_) => WireFormat::KeyPackage,
        }
    }

    pub fn body(&self) -> &MlsMessageBody {
        &self.body
    }

    pub fn into_body(self) -> MlsMessageBody {
        self.body
    }

    /// Returns `true` for public and private messages that carry a proposal
    /// or a commit.
    pub fn is_handshake_message(&self) -> bool {
        match &self.body {
            MlsMessageBody::PublicMessage(m) => m.content_type().is_handshake_message(),
            MlsMessageBody::PrivateMessage(m) => m.content_type().is_handshake_message(),
            _ => false,
        }
    }

    /// Returns the welcome if this message carries one.
    pub fn into_welcome(self) -> Option<Welcome> {
        match self.body {
            MlsMessageBody::Welcome(welcome) => Some(welcome),
            _ => None,
        }
    }

    /// Returns the group info if this message carries one.
    pub fn into_group_info(self) -> Option<GroupInfo> {
        match self.body {
            MlsMessageBody::GroupInfo(group_info) => Some(group_info),
            _ => None,
        }
    }

    /// Returns the key package if this message carries one.
    pub fn into_key_package(self) -> Option<KeyPackage> {
        match self.body {
            MlsMessageBody::KeyPackage(key_package) => Some(key_package),
            _ => None,
        }
    }
}

impl From<PublicMessage> for MlsMessage {
    fn from(public_message: PublicMessage) -> Self {
        Self::new(MlsMessageBody::PublicMessage(public_message))
    }
}

impl From<PrivateMessage> for MlsMessage {
    fn from(private_message: PrivateMessage) -> Self {
        Self::new(MlsMessageBody::PrivateMessage(private_message))
    }
}

impl From<Welcome> for MlsMessage {
    fn from(welcome: Welcome) -> Self {
        Self::new(MlsMessageBody::Welcome(welcome))
    }
}

impl From<GroupInfo> for MlsMessage {
    fn from(group_info: GroupInfo) -> Self {
        Self::new(MlsMessageBody::GroupInfo(group_info))
    }
}

impl From<KeyPackage> for MlsMessage {
    fn from(key_package: KeyPackage) -> Self {
        Self::new(MlsMessageBody::KeyPackage(key_package))
    }
}
