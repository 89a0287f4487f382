use cgka_traits::{crypto::CgkaCrypto, types::CryptoError};
use serde::{Deserialize, Serialize};
use tls_codec::{TlsDeserialize, TlsSerialize, TlsSize, VLBytes};

use super::{equal_ct, Ciphersuite, Secret};

/// Content authentication
///
/// ```text
/// opaque MAC<V>;
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TlsDeserialize, TlsSerialize, TlsSize)]
pub struct Mac {
    pub(crate) mac_value: VLBytes,
}

impl PartialEq for Mac {
    // Constant time comparison.
    fn eq(&self, other: &Mac) -> bool {
        equal_ct(self.mac_value.as_slice(), other.mac_value.as_slice())
    }
}

impl Eq for Mac {}

impl Mac {
    /// Compute `MAC(key, message)` with the HMAC of the ciphersuite's hash.
    pub(crate) fn new(
        crypto: &impl CgkaCrypto,
        ciphersuite: Ciphersuite,
        key: &Secret,
        message: &[u8],
    ) -> Result<Self, CryptoError> {
        Ok(Mac {
            mac_value: crypto
                .hmac(ciphersuite.hash_algorithm(), key.as_slice(), message)?
                .into(),
        })
    }

    /// Returns the MAC value.
    pub fn as_slice(&self) -> &[u8] {
        self.mac_value.as_slice()
    }

    #[cfg(any(feature = "test-utils", test))]
    pub fn flip_last_byte(&mut self) {
        let mut value: Vec<u8> = self.mac_value.as_slice().to_vec();
        if let Some(last) = value.last_mut() {
            *last ^= 0xff;
        }
        self.mac_value = value.into();
    }
}
