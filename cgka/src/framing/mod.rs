//! # Message framing
//!
//! Handshake and application messages are framed as [`FramedContent`] and
//! signed by their sender. They travel either as a [`PublicMessage`], which
//! additionally carries a membership tag, or encrypted under the secret tree
//! as a [`PrivateMessage`]. Both are wrapped in an [`MlsMessage`] together
//! with Welcome, GroupInfo and KeyPackage messages.
//!
//!  - [`AuthenticatedContent`]: framed content with its signature and, for
//!    commits, the confirmation tag
//!  - [`VerifiableAuthenticatedContent`]: content received from the wire whose
//!    signature has not been checked yet

use serde::{Deserialize, Serialize};
use tls_codec::{TlsDeserialize, TlsSerialize, TlsSize};

pub(crate) mod message;
pub(crate) mod mls_auth_content;
pub(crate) mod mls_content;
pub(crate) mod private_message;
pub(crate) mod public_message;
pub(crate) mod sender;

pub mod errors;

pub use errors::*;
pub use message::*;
pub use mls_auth_content::{AuthenticatedContent, VerifiableAuthenticatedContent};
pub use mls_content::{FramedContent, FramedContentBody};
pub use private_message::PrivateMessage;
pub use public_message::{MembershipTag, PublicMessage};
pub use sender::Sender;

#[cfg(test)]
mod tests;

/// Wire format of messages.
///
/// ```c
/// enum {
///     reserved(0),
///     mls_public_message(1),
///     mls_private_message(2),
///     mls_welcome(3),
///     mls_group_info(4),
///     mls_key_package(5),
///     (65535)
/// } WireFormat;
/// ```
#[derive(
    PartialEq, Eq, Clone, Copy, Debug, Serialize, Deserialize, TlsDeserialize, TlsSerialize, TlsSize,
)]
#[repr(u16)]
pub enum WireFormat {
    /// Plaintext message
    PublicMessage = 1,
    /// Encrypted message
    PrivateMessage = 2,
    /// Welcome message
    Welcome = 3,
    /// Group information
    GroupInfo = 4,
    /// KeyPackage
    KeyPackage = 5,
}

/// ```c
/// enum {
///     reserved(0),
///     application(1),
///     proposal(2),
///     commit(3),
///     (255)
/// } ContentType;
/// ```
#[derive(
    PartialEq, Eq, Clone, Copy, Debug, Serialize, Deserialize, TlsDeserialize, TlsSerialize, TlsSize,
)]
#[repr(u8)]
pub enum ContentType {
    /// Application message
    Application = 1,
    /// Proposal
    Proposal = 2,
    /// Commit
    Commit = 3,
}

impl ContentType {
    /// Returns `true` for proposals and commits.
    pub(crate) fn is_handshake_message(&self) -> bool {
        matches!(self, ContentType::Proposal | ContentType::Commit)
    }
}

impl TryFrom<u8> for ContentType {
    type Error = tls_codec::Error;

    fn try_from(value: u8) -> Result<Self, tls_codec::Error> {
        match value {
            1 => Ok(ContentType::Application),
            2 => Ok(ContentType::Proposal),
            3 => Ok(ContentType::Commit),
            _ => Err(tls_codec::Error::DecodingError(format!(
                "{value} is not a valid content type"
            ))),
        }
    }
}
