use cgka_traits::{random::CgkaRand, types::CryptoError};
use tls_codec::{TlsDeserialize, TlsSerialize, TlsSize};

use super::REUSE_GUARD_BYTES;

/// Four random bytes chosen per message and xored into the nonce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TlsSerialize, TlsDeserialize, TlsSize)]
pub(crate) struct ReuseGuard {
    pub(in crate::ciphersuite) value: [u8; REUSE_GUARD_BYTES],
}

impl ReuseGuard {
    /// Samples a fresh reuse guard uniformly at random.
    pub(crate) fn try_from_random(rand: &impl CgkaRand) -> Result<Self, CryptoError> {
        Ok(Self {
            value: rand
                .random_array()
                .map_err(|_| CryptoError::InsufficientRandomness)?,
        })
    }
}
