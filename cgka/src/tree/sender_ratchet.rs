//! # Sender ratchets
//!
//! Every leaf of the secret tree seeds two hash chains, one for handshake and
//! one for application messages. Each step of a chain yields the AEAD key and
//! nonce for one generation.
//!
//! The member owning a leaf only ever moves its chain forward
//! ([`RatchetSecret`]). Everybody else keeps a [`DecryptionRatchet`] that can
//! jump ahead up to `maximum_forward_distance` generations and that remembers
//! the keys of the last `out_of_order_tolerance` generations so that messages
//! arriving out of order can still be decrypted. Every key is handed out at
//! most once.

use std::collections::VecDeque;

use cgka_traits::crypto::CgkaCrypto;
use serde::{Deserialize, Serialize};

use super::secret_tree::{derive_tree_secret, SecretTreeError};
use crate::ciphersuite::{AeadKey, AeadNonce, Ciphersuite, Secret};

/// The key and nonce of one generation.
pub type RatchetKeyMaterial = (AeadKey, AeadNonce);

const DEFAULT_OUT_OF_ORDER_TOLERANCE: u32 = 5;
const DEFAULT_MAXIMUM_FORWARD_DISTANCE: u32 = 1000;

/// Stores the configuration parameters for `DecryptionRatchet`s.
///
/// **Parameters**
///
/// - `out_of_order_tolerance`:
///   This parameter defines a window for which decryption secrets are kept.
///   This is useful in case the DS cannot guarantee that all application
///   messages have total order within an epoch. Use this carefully, since
///   keeping decryption secrets affects forward secrecy within an epoch.
///   The default value is 5.
/// - `maximum_forward_distance`:
///   This parameter defines how many incoming messages can be skipped. This is
///   useful if the DS drops application messages. The default value is 1000.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderRatchetConfiguration {
    out_of_order_tolerance: u32,
    maximum_forward_distance: u32,
}

impl SenderRatchetConfiguration {
    /// Create a new configuration
    pub fn new(out_of_order_tolerance: u32, maximum_forward_distance: u32) -> Self {
        Self {
            out_of_order_tolerance,
            maximum_forward_distance,
        }
    }

    /// Get a reference to the sender ratchet configuration's out of order tolerance.
    pub fn out_of_order_tolerance(&self) -> u32 {
        self.out_of_order_tolerance
    }

    /// Get a reference to the sender ratchet configuration's maximum forward distance.
    pub fn maximum_forward_distance(&self) -> u32 {
        self.maximum_forward_distance
    }
}

impl Default for SenderRatchetConfiguration {
    fn default() -> Self {
        Self::new(
            DEFAULT_OUT_OF_ORDER_TOLERANCE,
            DEFAULT_MAXIMUM_FORWARD_DISTANCE,
        )
    }
}

/// The ratchet secret of a chain and its current generation.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RatchetSecret {
    secret: Secret,
    generation: u32,
}

impl RatchetSecret {
    /// Create an initial [`RatchetSecret`] with `generation = 0` from the given
    /// [`Secret`].
    pub(crate) fn initial_ratchet_secret(secret: Secret) -> Self {
        Self {
            secret,
            generation: 0,
        }
    }

    /// Return the generation of this [`RatchetSecret`].
    pub(crate) fn generation(&self) -> u32 {
        self.generation
    }

    /// Consume the current generation: derive its key and nonce and move the
    /// chain one step forward.
    ///
    /// Returns [`SecretTreeError::RatchetTooLong`] when the generation counter
    /// would overflow.
    pub(crate) fn ratchet_forward(
        &mut self,
        crypto: &impl CgkaCrypto,
        ciphersuite: Ciphersuite,
    ) -> Result<(u32, RatchetKeyMaterial), SecretTreeError> {
        log::trace!("Ratcheting forward in generation {}.", self.generation);
        let next_generation = self
            .generation
            .checked_add(1)
            .ok_or(SecretTreeError::RatchetTooLong)?;
        let nonce = derive_tree_secret(
            ciphersuite,
            &self.secret,
            "nonce",
            self.generation,
            ciphersuite.aead_nonce_length(),
            crypto,
        )?;
        let key = derive_tree_secret(
            ciphersuite,
            &self.secret,
            "key",
            self.generation,
            ciphersuite.aead_key_length(),
            crypto,
        )?;
        self.secret = derive_tree_secret(
            ciphersuite,
            &self.secret,
            "secret",
            self.generation,
            ciphersuite.hash_length(),
            crypto,
        )?;
        let generation = self.generation;
        self.generation = next_generation;
        Ok((
            generation,
            (
                AeadKey::from_secret(key, ciphersuite),
                AeadNonce::from_secret(nonce)?,
            ),
        ))
    }
}

/// [`DecryptionRatchet`] holds the current ratchet secret and the key material
/// of a bounded window of past generations.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DecryptionRatchet {
    // The front holds the generation just below the head. A `None` entry was
    // already handed out.
    past_secrets: VecDeque<Option<RatchetKeyMaterial>>,
    ratchet_head: RatchetSecret,
}

impl DecryptionRatchet {
    /// Creates a new [`DecryptionRatchet`] from the leaf's chain secret.
    pub(crate) fn new(secret: Secret) -> Self {
        Self {
            past_secrets: VecDeque::new(),
            ratchet_head: RatchetSecret::initial_ratchet_secret(secret),
        }
    }

    /// Remove key material that fell out of the window.
    fn prune_past_secrets(&mut self, configuration: &SenderRatchetConfiguration) {
        self.past_secrets
            .truncate(configuration.out_of_order_tolerance() as usize)
    }

    /// Get the generation of the ratchet head.
    pub(crate) fn generation(&self) -> u32 {
        self.ratchet_head.generation()
    }

    /// Move the head one step, keeping the skipped generation's key material.
    fn ratchet_forward(
        &mut self,
        crypto: &impl CgkaCrypto,
        ciphersuite: Ciphersuite,
    ) -> Result<(), SecretTreeError> {
        let (_, key_material) = self.ratchet_head.ratchet_forward(crypto, ciphersuite)?;
        self.past_secrets.push_front(Some(key_material));
        Ok(())
    }

    /// Gets a secret from the SenderRatchet. Returns an error if the generation
    /// is out of bound or if the key material of the generation was already
    /// handed out.
    pub(crate) fn secret_for_decryption(
        &mut self,
        ciphersuite: Ciphersuite,
        crypto: &impl CgkaCrypto,
        generation: u32,
        configuration: &SenderRatchetConfiguration,
    ) -> Result<RatchetKeyMaterial, SecretTreeError> {
        log::debug!("secret_for_decryption");
        // If generation is too distant in the future
        if self.generation() < u32::MAX - configuration.maximum_forward_distance()
            && generation > self.generation() + configuration.maximum_forward_distance()
        {
            return Err(SecretTreeError::TooDistantInTheFuture);
        }
        // If generation id too distant in the past
        if generation < self.generation()
            && (self.generation() - generation) > configuration.out_of_order_tolerance()
        {
            log::error!(
                "Generation {generation} is beyond the out of order tolerance ({}) of {}",
                configuration.out_of_order_tolerance(),
                self.generation()
            );
            return Err(SecretTreeError::TooDistantInThePast);
        }
        // If generation is the one the ratchet is currently at or in the future
        if generation >= self.generation() {
            // Ratchet the chain forward as far as necessary
            for _ in 0..(generation - self.generation()) {
                self.ratchet_forward(crypto, ciphersuite)?;
            }
            let (_, key_material) = self.ratchet_head.ratchet_forward(crypto, ciphersuite)?;
            // Mark the consumed generation
            self.past_secrets.push_front(None);
            self.prune_past_secrets(configuration);
            Ok(key_material)
        } else {
            // generation < self.generation()
            let window_index = (self.generation() - generation - 1) as usize;
            match self.past_secrets.get_mut(window_index) {
                Some(slot) => slot.take().ok_or(SecretTreeError::SecretReuseError),
                None => Err(SecretTreeError::TooDistantInThePast),
            }
        }
    }
}

/// The two kinds of sender ratchets: the member's own chain is only used for
/// encryption, every other member's only for decryption.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SenderRatchet {
    EncryptionRatchet(RatchetSecret),
    DecryptionRatchet(DecryptionRatchet),
}

impl SenderRatchet {
    #[cfg(test)]
    pub(crate) fn generation(&self) -> u32 {
        match self {
            SenderRatchet::EncryptionRatchet(enc_ratchet) => enc_ratchet.generation(),
            SenderRatchet::DecryptionRatchet(dec_ratchet) => dec_ratchet.generation(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    fn ratchet_pair(
        ciphersuite: Ciphersuite,
        provider: &impl CgkaProvider,
    ) -> (RatchetSecret, DecryptionRatchet) {
        let secret =
            Secret::random(ciphersuite, provider.rand()).expect("not enough randomness");
        (
            RatchetSecret::initial_ratchet_secret(secret.clone()),
            DecryptionRatchet::new(secret),
        )
    }

    #[apply(ciphersuites_and_providers)]
    fn out_of_order_within_window(ciphersuite: Ciphersuite, provider: &impl CgkaProvider) {
        let _ = pretty_env_logger::try_init();
        let configuration = SenderRatchetConfiguration::default();
        let (mut sender, mut receiver) = ratchet_pair(ciphersuite, provider);

        let sent: Vec<(u32, RatchetKeyMaterial)> = (0..4)
            .map(|_| {
                sender
                    .ratchet_forward(provider.crypto(), ciphersuite)
                    .expect("error ratcheting forward")
            })
            .collect();

        // Generation 3 first, then 1, then 2.
        for index in [3usize, 1, 2, 0] {
            let (generation, expected) = &sent[index];
            let key_material = receiver
                .secret_for_decryption(
                    ciphersuite,
                    provider.crypto(),
                    *generation,
                    &configuration,
                )
                .expect("error getting decryption secret");
            assert_eq!(&key_material, expected);
        }
        assert_eq!(receiver.generation(), 4);
    }

    #[apply(ciphersuites_and_providers)]
    fn key_material_is_handed_out_once(ciphersuite: Ciphersuite, provider: &impl CgkaProvider) {
        let _ = pretty_env_logger::try_init();
        let configuration = SenderRatchetConfiguration::default();
        let (_, mut receiver) = ratchet_pair(ciphersuite, provider);

        receiver
            .secret_for_decryption(ciphersuite, provider.crypto(), 2, &configuration)
            .expect("error getting decryption secret");
        assert_eq!(
            receiver.secret_for_decryption(ciphersuite, provider.crypto(), 2, &configuration),
            Err(SecretTreeError::SecretReuseError)
        );
        receiver
            .secret_for_decryption(ciphersuite, provider.crypto(), 0, &configuration)
            .expect("skipped generation should still be available");
        assert_eq!(
            receiver.secret_for_decryption(ciphersuite, provider.crypto(), 0, &configuration),
            Err(SecretTreeError::SecretReuseError)
        );
    }

    #[apply(ciphersuites_and_providers)]
    fn window_bounds(ciphersuite: Ciphersuite, provider: &impl CgkaProvider) {
        let _ = pretty_env_logger::try_init();
        let configuration = SenderRatchetConfiguration::new(2, 10);
        let (_, mut receiver) = ratchet_pair(ciphersuite, provider);

        assert_eq!(
            receiver.secret_for_decryption(ciphersuite, provider.crypto(), 11, &configuration),
            Err(SecretTreeError::TooDistantInTheFuture)
        );
        receiver
            .secret_for_decryption(ciphersuite, provider.crypto(), 10, &configuration)
            .expect("generation at the forward bound is accepted");
        // The head is at 11 now, generation 9 is still in the window.
        receiver
            .secret_for_decryption(ciphersuite, provider.crypto(), 9, &configuration)
            .expect("generation inside the window");
        assert_eq!(
            receiver.secret_for_decryption(ciphersuite, provider.crypto(), 8, &configuration),
            Err(SecretTreeError::TooDistantInThePast)
        );
    }
}
