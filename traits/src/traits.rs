//! # CGKA Traits
//!
//! This crate defines the traits the group key agreement core is generic over:
//! the cryptographic provider, the randomness source, the pre-shared key index
//! and the authentication service. A [`CgkaProvider`] bundles all of them.

pub mod authentication;
pub mod crypto;
pub mod psk;
pub mod random;
pub mod types;

/// The provider bundle handed to every group operation.
pub trait CgkaProvider {
    type CryptoProvider: crypto::CgkaCrypto;
    type RandProvider: random::CgkaRand;
    type PskIndexProvider: psk::PskIndex;
    type AuthenticationServiceProvider: authentication::AuthenticationService;

    /// Get the crypto provider.
    fn crypto(&self) -> &Self::CryptoProvider;

    /// Get the randomness provider.
    fn rand(&self) -> &Self::RandProvider;

    /// Get the index used to resolve external pre-shared keys.
    fn psk_index(&self) -> &Self::PskIndexProvider;

    /// Get the authentication service that validates credentials.
    fn authentication_service(&self) -> &Self::AuthenticationServiceProvider;
}
