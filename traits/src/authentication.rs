//! # Authentication service
//!
//! The protocol only interacts with the credential and the signature public
//! key bound to it. Deciding whether that binding is acceptable is up to the
//! application's authentication service.

use crate::types::credential::Credential;

pub trait AuthenticationService {
    /// Returns `true` if `credential` is acceptable for a member signing with
    /// `signature_public_key`.
    fn validate_credential(&self, credential: &Credential, signature_public_key: &[u8]) -> bool;
}
