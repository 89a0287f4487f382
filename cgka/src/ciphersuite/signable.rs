//! Labeled signatures.
//!
//! Every signature is computed over a `SignContent` binding a label to the
//! serialized content:
//!
//! ```text
//! SignWithLabel(SignatureKey, Label, Content) =
//!     Signature.Sign(SignatureKey, SignContent)
//!
//! VerifyWithLabel(VerificationKey, Label, Content, SignatureValue) =
//!     Signature.Verify(VerificationKey, SignContent, SignatureValue)
//!
//! struct {
//!     opaque label<V> = "MLS 1.0 " + Label;
//!     opaque content<V> = Content;
//! } SignContent;
//! ```

use cgka_traits::{crypto::CgkaCrypto, types::SignatureScheme};
use tls_codec::{Serialize, TlsSerialize, TlsSize, VLBytes};

use super::{
    signature::{Signature, SignatureError, SignaturePublicKey},
    LABEL_PREFIX,
};
use crate::{credentials::SignatureKeyPair, error::LibraryError};

#[derive(TlsSerialize, TlsSize)]
struct SignContent {
    label: VLBytes,
    content: VLBytes,
}

impl SignContent {
    fn serialize(label: &str, content: Vec<u8>) -> Result<Vec<u8>, LibraryError> {
        let sign_content = SignContent {
            label: format!("{LABEL_PREFIX}{label}").as_bytes().into(),
            content: content.into(),
        };
        Ok(sign_content.tls_serialize_detached()?)
    }
}

/// This trait must be implemented by all structs that contain a self-signature.
pub trait SignedStruct<T> {
    /// Build a signed struct version from the payload struct.
    fn from_payload(payload: T, signature: Signature) -> Self;
}

/// The `Signable` trait is implemented by all struct that are being signed.
/// The implementation has to provide the `unsigned_payload` and `label`
/// functions.
pub trait Signable: Sized {
    type SignedOutput;

    /// Return the unsigned, serialized payload that should be signed.
    fn unsigned_payload(&self) -> Result<Vec<u8>, tls_codec::Error>;

    /// Return the label the signature is bound to.
    fn label(&self) -> &str;

    /// Sign the payload with the given `signer`.
    fn sign(
        self,
        crypto: &impl CgkaCrypto,
        signer: &SignatureKeyPair,
    ) -> Result<Self::SignedOutput, SignatureError>
    where
        Self::SignedOutput: SignedStruct<Self>,
    {
        let payload = self.unsigned_payload().map_err(LibraryError::from)?;
        let sign_content = SignContent::serialize(self.label(), payload)?;
        let signature = signer.sign(crypto, &sign_content)?;
        Ok(Self::SignedOutput::from_payload(self, signature))
    }
}

/// The verifiable trait must be implemented by any struct that is signed. The
/// actual `verify` method is provided.
///
/// Note that `Verifiable` should not be implemented on the same struct as
/// `Signable`.
pub trait Verifiable: Sized {
    /// Return the unsigned, serialized payload that should be verified.
    fn unsigned_payload(&self) -> Result<Vec<u8>, tls_codec::Error>;

    /// A reference to the signature to be verified.
    fn signature(&self) -> &Signature;

    /// Return the label the signature is bound to.
    fn label(&self) -> &str;

    /// Verifies the payload against the given `signature_key`.
    ///
    /// Returns `Ok(())` if the signature is valid and
    /// [`SignatureError::VerificationError`] otherwise.
    fn verify_no_out(
        &self,
        crypto: &impl CgkaCrypto,
        signature_scheme: SignatureScheme,
        signature_key: &SignaturePublicKey,
    ) -> Result<(), SignatureError> {
        let payload = self.unsigned_payload().map_err(LibraryError::from)?;
        let sign_content = SignContent::serialize(self.label(), payload)?;
        crypto
            .verify_signature(
                signature_scheme,
                &sign_content,
                signature_key.as_slice(),
                self.signature().as_slice(),
            )
            .map_err(|_| SignatureError::VerificationError)
    }
}
