//! # Credentials
//!
//! A [`Credential`] contains identifying information about the client that
//! created it. Every leaf of the ratchet tree and every key package carries a
//! credential together with the signature public key the member signs with.
//!
//! Whether a credential is acceptable is decided by the application's
//! [`AuthenticationService`](cgka_traits::authentication::AuthenticationService),
//! the group core only passes it the credential and the key bound to it.
//!
//! [`SignatureKeyPair`] is the private signing key a client keeps locally.

use std::fmt::Debug;

use cgka_traits::{
    crypto::CgkaCrypto,
    types::{CryptoError, SignatureScheme},
};
use serde::{Deserialize, Serialize};
use tls_codec::{TlsDeserialize, TlsSerialize, TlsSize};

pub use cgka_traits::types::credential::{Credential, CredentialType};

use crate::ciphersuite::{signature::SignatureError, Signature, SignaturePublicKey};

/// A credential together with the signature public key it is bound to.
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TlsSerialize, TlsDeserialize, TlsSize,
)]
pub struct CredentialWithKey {
    /// The [`Credential`].
    pub credential: Credential,
    /// The corresponding public key as [`SignaturePublicKey`].
    pub signature_key: SignaturePublicKey,
}

/// A signature key pair.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureKeyPair {
    private: Vec<u8>,
    public: Vec<u8>,
    signature_scheme: SignatureScheme,
}

impl Debug for SignatureKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureKeyPair")
            .field("private", &"***".to_string())
            .field("public", &self.public)
            .field("signature_scheme", &self.signature_scheme)
            .finish()
    }
}

impl SignatureKeyPair {
    /// Generates a fresh signature key pair.
    pub fn new(
        signature_scheme: SignatureScheme,
        crypto: &impl CgkaCrypto,
    ) -> Result<Self, CryptoError> {
        let (private, public) = crypto.signature_key_gen(signature_scheme)?;
        Ok(Self {
            private,
            public,
            signature_scheme,
        })
    }

    /// Create a new signature key pair from the raw keys.
    pub fn from_raw(signature_scheme: SignatureScheme, private: Vec<u8>, public: Vec<u8>) -> Self {
        Self {
            private,
            public,
            signature_scheme,
        }
    }

    /// Sign the `payload`.
    pub fn sign(
        &self,
        crypto: &impl CgkaCrypto,
        payload: &[u8],
    ) -> Result<Signature, SignatureError> {
        crypto
            .sign(self.signature_scheme, payload, &self.private)
            .map(Signature::from)
            .map_err(|e| {
                log::error!("Signing failed: {:?}", e);
                SignatureError::SigningError
            })
    }

    /// Get the public key as byte slice.
    pub fn public(&self) -> &[u8] {
        self.public.as_ref()
    }

    /// Get the public key as [`SignaturePublicKey`].
    pub fn to_public_key(&self) -> SignaturePublicKey {
        SignaturePublicKey::from(self.public.clone())
    }

    /// Get the [`SignatureScheme`] of this key pair.
    pub fn signature_scheme(&self) -> SignatureScheme {
        self.signature_scheme
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    #[apply(ciphersuites_and_providers)]
    fn sign_and_verify(ciphersuite: Ciphersuite, provider: &impl CgkaProvider) {
        let _ = pretty_env_logger::try_init();
        let signer = SignatureKeyPair::new(ciphersuite.signature_algorithm(), provider.crypto())
            .expect("error generating a signature key pair");
        let payload = b"payload";
        let signature = signer
            .sign(provider.crypto(), payload)
            .expect("error signing");
        provider
            .crypto()
            .verify_signature(
                ciphersuite.signature_algorithm(),
                payload,
                signer.public(),
                signature.as_slice(),
            )
            .expect("error verifying signature");

        // A different payload does not verify.
        assert!(provider
            .crypto()
            .verify_signature(
                ciphersuite.signature_algorithm(),
                b"other payload",
                signer.public(),
                signature.as_slice(),
            )
            .is_err());
    }

    #[test]
    fn credential_with_key_codec() {
        use tls_codec::{Deserialize, Serialize};
        let credential_with_key = CredentialWithKey {
            credential: Credential::new_basic("alice"),
            signature_key: vec![1, 2, 3].into(),
        };
        let encoded = credential_with_key
            .tls_serialize_detached()
            .expect("error encoding");
        let decoded =
            CredentialWithKey::tls_deserialize_exact(encoded).expect("error decoding");
        assert_eq!(decoded, credential_with_key);
        assert_eq!(decoded.credential.identity(), b"alice");
    }
}
