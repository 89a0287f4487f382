use serde::{Deserialize, Serialize};
use tls_codec::{TlsDeserialize, TlsSerialize, TlsSize, VLBytes};

/// CredentialType.
///
/// ```c
/// // See IANA registry for registered values
/// uint16 CredentialType;
/// ```
///
/// | Value            | Name                     |
/// |:-----------------|:-------------------------|
/// | 0x0000           | RESERVED                 |
/// | 0x0001           | basic                    |
/// | 0x0002           | x509                     |
/// | 0xF000  - 0xFFFF | Reserved for Private Use |
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CredentialType {
    /// A basic credential: the content is the identity.
    Basic,
    /// An X.509 certificate chain.
    X509,
    /// A currently unknown credential.
    Unknown(u16),
}

impl From<u16> for CredentialType {
    fn from(value: u16) -> Self {
        match value {
            1 => CredentialType::Basic,
            2 => CredentialType::X509,
            unknown => CredentialType::Unknown(unknown),
        }
    }
}

impl From<CredentialType> for u16 {
    fn from(value: CredentialType) -> Self {
        match value {
            CredentialType::Basic => 1,
            CredentialType::X509 => 2,
            CredentialType::Unknown(unknown) => unknown,
        }
    }
}

impl tls_codec::Size for CredentialType {
    fn tls_serialized_len(&self) -> usize {
        2
    }
}

impl tls_codec::Deserialize for CredentialType {
    fn tls_deserialize<R: std::io::Read>(bytes: &mut R) -> Result<Self, tls_codec::Error>
    where
        Self: Sized,
    {
        let mut credential_type = [0u8; 2];
        bytes.read_exact(&mut credential_type)?;

        Ok(CredentialType::from(u16::from_be_bytes(credential_type)))
    }
}

impl tls_codec::Serialize for CredentialType {
    fn tls_serialize<W: std::io::Write>(&self, writer: &mut W) -> Result<usize, tls_codec::Error> {
        writer.write_all(&u16::from(*self).to_be_bytes())?;

        Ok(2)
    }
}

/// A credential binds an identity to a member's signature key. The group core
/// treats the content as opaque and defers its validation to the
/// authentication service.
///
/// ```c
/// struct {
///     CredentialType credential_type;
///     opaque content<V>;
/// } Credential;
/// ```
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TlsSerialize, TlsDeserialize, TlsSize,
)]
pub struct Credential {
    credential_type: CredentialType,
    serialized_content: VLBytes,
}

impl Credential {
    /// Create a new credential of the given type.
    pub fn new(credential_type: CredentialType, serialized_content: Vec<u8>) -> Self {
        Self {
            credential_type,
            serialized_content: serialized_content.into(),
        }
    }

    /// Create a basic credential carrying `identity`.
    pub fn new_basic(identity: impl Into<Vec<u8>>) -> Self {
        Self::new(CredentialType::Basic, identity.into())
    }

    /// Returns the credential type.
    pub fn credential_type(&self) -> CredentialType {
        self.credential_type
    }

    /// Returns the serialized content without the type.
    pub fn serialized_content(&self) -> &[u8] {
        self.serialized_content.as_slice()
    }

    /// Returns the identity of a basic credential, or the raw content for
    /// any other type.
    pub fn identity(&self) -> &[u8] {
        self.serialized_content()
    }
}

#[cfg(test)]
mod tests {
    use tls_codec::{Deserialize, Serialize};

    use super::*;

    #[test]
    fn unknown_credential_type_survives_decoding() {
        let credential = Credential::new(CredentialType::Unknown(0xF001), vec![1, 2, 3]);
        let bytes = credential.tls_serialize_detached().unwrap();
        let decoded = Credential::tls_deserialize_exact(bytes).unwrap();
        assert_eq!(decoded.credential_type(), CredentialType::Unknown(0xF001));
        assert_eq!(decoded, credential);
    }
}
