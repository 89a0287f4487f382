//! # CGKA Default Provider
//!
//! This is an implementation of the [`CgkaProvider`] trait backed by
//! RustCrypto, an in-memory PSK index and an authentication service that
//! accepts basic credentials.

use std::{collections::HashMap, sync::RwLock};

use cgka_traits::{
    authentication::AuthenticationService,
    psk::PskIndex,
    types::credential::{Credential, CredentialType},
    CgkaProvider,
};

mod hmac;
mod provider;
pub use provider::*;

#[derive(Default, Debug)]
pub struct CgkaRustCrypto {
    crypto: RustCrypto,
    psk_index: MemoryPskIndex,
    authentication_service: BasicAuthenticationService,
}

impl CgkaRustCrypto {
    /// Get the in-memory PSK index to provision external PSKs.
    pub fn psks(&self) -> &MemoryPskIndex {
        &self.psk_index
    }
}

impl CgkaProvider for CgkaRustCrypto {
    type CryptoProvider = RustCrypto;
    type RandProvider = RustCrypto;
    type PskIndexProvider = MemoryPskIndex;
    type AuthenticationServiceProvider = BasicAuthenticationService;

    fn crypto(&self) -> &Self::CryptoProvider {
        &self.crypto
    }

    fn rand(&self) -> &Self::RandProvider {
        &self.crypto
    }

    fn psk_index(&self) -> &Self::PskIndexProvider {
        &self.psk_index
    }

    fn authentication_service(&self) -> &Self::AuthenticationServiceProvider {
        &self.authentication_service
    }
}

/// External PSKs held in memory, keyed by their id.
#[derive(Debug, Default)]
pub struct MemoryPskIndex {
    values: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryPskIndex {
    /// Store the secret `psk` under `psk_id`, replacing any previous value.
    pub fn store(&self, psk_id: &[u8], psk: &[u8]) -> Result<(), MemoryPskIndexError> {
        let mut values = self
            .values
            .write()
            .map_err(|_| MemoryPskIndexError::LockPoisoned)?;
        values.insert(psk_id.to_vec(), psk.to_vec());
        Ok(())
    }

    /// Forget the PSK stored under `psk_id`.
    pub fn delete(&self, psk_id: &[u8]) -> Result<(), MemoryPskIndexError> {
        let mut values = self
            .values
            .write()
            .map_err(|_| MemoryPskIndexError::LockPoisoned)?;
        values.remove(psk_id);
        Ok(())
    }
}

impl PskIndex for MemoryPskIndex {
    fn find_psk(&self, psk_id: &[u8]) -> Option<Vec<u8>> {
        let values = self.values.read().ok()?;
        values.get(psk_id).cloned()
    }
}

/// Errors thrown by the PSK index.
#[derive(thiserror::Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum MemoryPskIndexError {
    #[error("The PSK index lock is poisoned.")]
    LockPoisoned,
}

/// Accepts every basic credential with a non-empty identity and rejects all
/// other credential types.
#[derive(Debug, Default, Clone, Copy)]
pub struct BasicAuthenticationService;

impl AuthenticationService for BasicAuthenticationService {
    fn validate_credential(&self, credential: &Credential, signature_public_key: &[u8]) -> bool {
        let valid = credential.credential_type() == CredentialType::Basic
            && !credential.identity().is_empty()
            && !signature_public_key.is_empty();
        if !valid {
            log::debug!(
                "Rejecting credential of type {:?}",
                credential.credential_type()
            );
        }
        valid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn psk_index_lookup() {
        let _ = pretty_env_logger::try_init();
        let provider = CgkaRustCrypto::default();
        assert_eq!(provider.psk_index().find_psk(b"psk"), None);
        provider.psks().store(b"psk", &[1, 2, 3]).unwrap();
        assert_eq!(provider.psk_index().find_psk(b"psk"), Some(vec![1, 2, 3]));
        provider.psks().delete(b"psk").unwrap();
        assert_eq!(provider.psk_index().find_psk(b"psk"), None);
    }

    #[test]
    fn only_basic_credentials_are_accepted() {
        let service = BasicAuthenticationService;
        assert!(service.validate_credential(&Credential::new_basic("alice"), &[1]));
        assert!(!service.validate_credential(&Credential::new_basic(""), &[1]));
        assert!(!service.validate_credential(
            &Credential::new(CredentialType::X509, vec![1, 2]),
            &[1]
        ));
    }
}
