//! # Pre-shared key index
//!
//! External pre-shared keys are provisioned out of band. The group core only
//! ever looks them up by their identifier.

pub trait PskIndex {
    /// Look up the secret for the external PSK with the given `psk_id`.
    ///
    /// Returns `None` if the PSK is unknown.
    fn find_psk(&self, psk_id: &[u8]) -> Option<Vec<u8>>;
}
