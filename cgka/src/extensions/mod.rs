//! # Extensions
//!
//! Extensions appear in the following places:
//! - In [`KeyPackages`](`crate::key_packages`) and leaf nodes, to describe
//!   client capabilities and aspects of their participation in the group.
//! - In the `GroupInfo`, to tell new members of a group what parameters are
//!   being used by the group, and to provide any additional details required
//!   to join the group.
//! - In the `GroupContext` object, to ensure that all members of the group
//!   have the same view of the parameters in use.
//!
//! The following extensions are understood:
//!
//! - [`ApplicationIdExtension`] (leaf node extension)
//! - [`RatchetTreeExtension`] (GroupInfo extension)
//! - [`RequiredCapabilitiesExtension`] (GroupContext extension)
//! - [`ExternalPubExtension`] (GroupInfo extension)
//!
//! Every other extension type is carried as [`Extension::Unknown`].

use std::{collections::BTreeSet, fmt::Debug, io::Read};

use serde::{Deserialize, Serialize};
use tls_codec::{Deserialize as TlsDeserializeTrait, Size, TlsSerialize, TlsSize};

mod application_id_extension;
mod codec;
mod external_pub_extension;
mod ratchet_tree_extension;
mod required_capabilities;

pub mod errors;

pub use application_id_extension::ApplicationIdExtension;
pub use errors::*;
pub use external_pub_extension::ExternalPubExtension;
pub use ratchet_tree_extension::RatchetTreeExtension;
pub use required_capabilities::RequiredCapabilitiesExtension;

#[cfg(test)]
mod test_extensions;

/// Extension types
///
/// | Value            | Name                     | Message(s) | Recommended | Reference |
/// |:-----------------|:-------------------------|:-----------|:------------|:----------|
/// | 0x0000           | RESERVED                 | N/A        | N/A         | RFC 9420  |
/// | 0x0001           | application_id           | LN         | Y           | RFC 9420  |
/// | 0x0002           | ratchet_tree             | GI         | Y           | RFC 9420  |
/// | 0x0003           | required_capabilities    | GC         | Y           | RFC 9420  |
/// | 0x0004           | external_pub             | GI         | Y           | RFC 9420  |
/// | 0xf000  - 0xffff | Reserved for Private Use | N/A        | N/A         | RFC 9420  |
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Ord, PartialOrd,
)]
pub enum ExtensionType {
    /// The application id extension allows applications to add an explicit,
    /// application-defined identifier to a leaf node.
    ApplicationId,

    /// The ratchet tree extensions provides the whole public state of the
    /// ratchet tree.
    RatchetTree,

    /// The required capabilities extension defines the configuration of a group
    /// that imposes certain requirements on clients in the group.
    RequiredCapabilities,

    /// To join a group via an External Commit, a new member needs a GroupInfo
    /// with an ExternalPub extension present in its extensions field.
    ExternalPub,

    /// A currently unknown extension type.
    Unknown(u16),
}

impl From<u16> for ExtensionType {
    fn from(a: u16) -> Self {
        match a {
            1 => ExtensionType::ApplicationId,
            2 => ExtensionType::RatchetTree,
            3 => ExtensionType::RequiredCapabilities,
            4 => ExtensionType::ExternalPub,
            unknown => ExtensionType::Unknown(unknown),
        }
    }
}

impl From<ExtensionType> for u16 {
    fn from(value: ExtensionType) -> Self {
        match value {
            ExtensionType::ApplicationId => 1,
            ExtensionType::RatchetTree => 2,
            ExtensionType::RequiredCapabilities => 3,
            ExtensionType::ExternalPub => 4,
            ExtensionType::Unknown(unknown) => unknown,
        }
    }
}

impl ExtensionType {
    /// Returns `true` for all extension types that every implementation
    /// supports and that therefore don't need to be listed in the
    /// capabilities of a leaf node.
    pub fn is_default(&self) -> bool {
        match self {
            ExtensionType::ApplicationId
            | ExtensionType::RatchetTree
            | ExtensionType::RequiredCapabilities
            | ExtensionType::ExternalPub => true,
            ExtensionType::Unknown(_) => false,
        }
    }

    /// Returns whether an extension type is valid when used in leaf nodes.
    /// Returns `None` if validity can not be determined.
    pub(crate) fn is_valid_in_leaf_node(self) -> Option<bool> {
        match self {
            ExtensionType::RatchetTree
            | ExtensionType::RequiredCapabilities
            | ExtensionType::ExternalPub => Some(false),
            ExtensionType::ApplicationId => Some(true),
            ExtensionType::Unknown(_) => None,
        }
    }
}

/// An extension in one of its known forms, or the raw bytes of an unknown one.
///
/// ```c
/// struct {
///     ExtensionType extension_type;
///     opaque extension_data<V>;
/// } Extension;
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Extension {
    /// An [`ApplicationIdExtension`]
    ApplicationId(ApplicationIdExtension),

    /// A [`RatchetTreeExtension`]
    RatchetTree(RatchetTreeExtension),

    /// A [`RequiredCapabilitiesExtension`]
    RequiredCapabilities(RequiredCapabilitiesExtension),

    /// An [`ExternalPubExtension`]
    ExternalPub(ExternalPubExtension),

    /// A currently unknown extension.
    Unknown(u16, UnknownExtension),
}

/// The raw data of an extension this implementation does not interpret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnknownExtension(pub Vec<u8>);

impl Extension {
    /// Returns the [`ExtensionType`]
    #[inline]
    pub const fn extension_type(&self) -> ExtensionType {
        match self {
            Extension::ApplicationId(_) => ExtensionType::ApplicationId,
            Extension::RatchetTree(_) => ExtensionType::RatchetTree,
            Extension::RequiredCapabilities(_) => ExtensionType::RequiredCapabilities,
            Extension::ExternalPub(_) => ExtensionType::ExternalPub,
            Extension::Unknown(kind, _) => ExtensionType::Unknown(*kind),
        }
    }
}

/// A list of extensions with unique extension types.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TlsSize, TlsSerialize)]
pub struct Extensions {
    unique: Vec<Extension>,
}

impl TlsDeserializeTrait for Extensions {
    fn tls_deserialize<R: Read>(bytes: &mut R) -> Result<Self, tls_codec::Error> {
        let candidate: Vec<Extension> = Vec::tls_deserialize(bytes)?;
        Extensions::try_from(candidate)
            .map_err(|_| tls_codec::Error::DecodingError("Found duplicate extensions".into()))
    }
}

impl Extensions {
    /// Create an empty extension list.
    pub fn empty() -> Self {
        Self { unique: vec![] }
    }

    /// Create an extension list with a single extension.
    pub fn single(extension: Extension) -> Self {
        Self {
            unique: vec![extension],
        }
    }

    /// Create an extension list with multiple extensions.
    ///
    /// This function will fail when the list of extensions contains duplicate
    /// extension types.
    pub fn from_vec(extensions: Vec<Extension>) -> Result<Self, InvalidExtensionError> {
        extensions.try_into()
    }

    /// Returns an iterator over the extension list.
    pub fn iter(&self) -> impl Iterator<Item = &Extension> {
        self.unique.iter()
    }

    /// Returns the number of extensions.
    pub fn len(&self) -> usize {
        self.unique.len()
    }

    /// Returns `true` if the list holds no extension.
    pub fn is_empty(&self) -> bool {
        self.unique.is_empty()
    }

    /// Add an extension to the extension list.
    ///
    /// Returns an error when there already is an extension with the same
    /// extension type.
    pub fn add(&mut self, extension: Extension) -> Result<(), InvalidExtensionError> {
        if self.contains(extension.extension_type()) {
            return Err(InvalidExtensionError::Duplicate);
        }
        self.unique.push(extension);
        Ok(())
    }

    /// Add an extension to the extension list (or replace an existing one.)
    ///
    /// Returns the replaced extension (if any).
    pub fn add_or_replace(&mut self, extension: Extension) -> Option<Extension> {
        let replaced = self.remove(extension.extension_type());
        self.unique.push(extension);
        replaced
    }

    /// Remove an extension from the extension list.
    ///
    /// Returns the removed extension or `None` when there is no extension with
    /// the given extension type.
    pub fn remove(&mut self, extension_type: ExtensionType) -> Option<Extension> {
        if let Some(pos) = self
            .unique
            .iter()
            .position(|ext| ext.extension_type() == extension_type)
        {
            Some(self.unique.remove(pos))
        } else {
            None
        }
    }

    /// Returns `true` iff the extension list contains an extension with the
    /// given extension type.
    pub fn contains(&self, extension_type: ExtensionType) -> bool {
        self.unique
            .iter()
            .any(|ext| ext.extension_type() == extension_type)
    }

    /// Get a reference to the [`ApplicationIdExtension`] if there is any.
    pub fn application_id(&self) -> Option<&ApplicationIdExtension> {
        self.unique.iter().find_map(|e| match e {
            Extension::ApplicationId(e) => Some(e),
            _ => None,
        })
    }

    /// Get a reference to the [`RatchetTreeExtension`] if there is any.
    pub fn ratchet_tree(&self) -> Option<&RatchetTreeExtension> {
        self.unique.iter().find_map(|e| match e {
            Extension::RatchetTree(e) => Some(e),
            _ => None,
        })
    }

    /// Get a reference to the [`RequiredCapabilitiesExtension`] if there is
    /// any.
    pub fn required_capabilities(&self) -> Option<&RequiredCapabilitiesExtension> {
        self.unique.iter().find_map(|e| match e {
            Extension::RequiredCapabilities(e) => Some(e),
            _ => None,
        })
    }

    /// Get a reference to the [`ExternalPubExtension`] if there is any.
    pub fn external_pub(&self) -> Option<&ExternalPubExtension> {
        self.unique.iter().find_map(|e| match e {
            Extension::ExternalPub(e) => Some(e),
            _ => None,
        })
    }
}

impl TryFrom<Vec<Extension>> for Extensions {
    type Error = InvalidExtensionError;

    fn try_from(candidate: Vec<Extension>) -> Result<Self, Self::Error> {
        let mut set = BTreeSet::new();

        for extension in candidate.iter() {
            if !set.insert(extension.extension_type()) {
                return Err(InvalidExtensionError::Duplicate);
            }
        }

        Ok(Self { unique: candidate })
    }
}

impl Size for ExtensionType {
    fn tls_serialized_len(&self) -> usize {
        2
    }
}

impl TlsDeserializeTrait for ExtensionType {
    fn tls_deserialize<R: Read>(bytes: &mut R) -> Result<Self, tls_codec::Error> {
        let mut extension_type = [0u8; 2];
        bytes.read_exact(&mut extension_type)?;

        Ok(ExtensionType::from(u16::from_be_bytes(extension_type)))
    }
}

impl tls_codec::Serialize for ExtensionType {
    fn tls_serialize<W: std::io::Write>(&self, writer: &mut W) -> Result<usize, tls_codec::Error> {
        writer.write_all(&u16::from(*self).to_be_bytes())?;

        Ok(2)
    }
}
