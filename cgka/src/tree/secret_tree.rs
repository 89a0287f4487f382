//! # Secret tree
//!
//! The secret tree has the same shape as the ratchet tree of the epoch. Its
//! root is the epoch's encryption secret and every child is derived from its
//! parent with the `"tree"` label and a `"left"`/`"right"` context. A leaf's
//! secret seeds the leaf's handshake and application [`SenderRatchet`]s.
//!
//! Nodes are derived lazily, only when a leaf's ratchets are first needed, and
//! every node secret is deleted as soon as its children have been derived.

use cgka_traits::{crypto::CgkaCrypto, types::CryptoError};
use thiserror::Error;
use tls_codec::Error as TlsCodecError;

use super::sender_ratchet::*;
use crate::{
    binary_tree::{
        treemath::{direct_path, left, right, root},
        LeafNodeIndex, NodeIndex, TreeSize,
    },
    ciphersuite::{Ciphersuite, Secret},
    error::{ErrorCategory, ErrorKind},
    framing::ContentType,
    schedule::EncryptionSecret,
};

/// Secret tree error
#[derive(Error, Debug, Eq, PartialEq, Clone)]
pub enum SecretTreeError {
    /// Generation is too old to be processed.
    #[error("Generation is too old to be processed.")]
    TooDistantInThePast,
    /// Generation is too far in the future to be processed.
    #[error("Generation is too far in the future to be processed.")]
    TooDistantInTheFuture,
    /// Index out of bounds
    #[error("Index out of bounds")]
    IndexOutOfBounds,
    /// The requested secret was deleted to preserve forward secrecy.
    #[error("The requested secret was deleted to preserve forward secrecy.")]
    SecretReuseError,
    /// Cannot create decryption secrets from own sender ratchet or encryption secrets from the sender ratchets of other members.
    #[error("Cannot create decryption secrets from own sender ratchet or encryption secrets from the sender ratchets of other members.")]
    RatchetTypeError,
    /// Ratchet generation has reached `u32::MAX`.
    #[error("Ratchet generation has reached `u32::MAX`.")]
    RatchetTooLong,
    /// An unrecoverable error has occurred due to a bug in the implementation.
    #[error("An unrecoverable error has occurred due to a bug in the implementation.")]
    LibraryError,
    /// See [`TlsCodecError`] for more details.
    #[error(transparent)]
    CodecError(#[from] TlsCodecError),
    /// See [`CryptoError`] for more details.
    #[error(transparent)]
    CryptoError(#[from] CryptoError),
}

impl ErrorCategory for SecretTreeError {
    fn kind(&self) -> ErrorKind {
        match self {
            SecretTreeError::TooDistantInThePast
            | SecretTreeError::TooDistantInTheFuture
            | SecretTreeError::IndexOutOfBounds
            | SecretTreeError::SecretReuseError
            | SecretTreeError::RatchetTypeError => ErrorKind::Validation,
            SecretTreeError::RatchetTooLong => ErrorKind::Usage,
            SecretTreeError::CodecError(_) => ErrorKind::Codec,
            SecretTreeError::LibraryError | SecretTreeError::CryptoError(_) => {
                ErrorKind::Internal
            }
        }
    }
}

/// The two chains of a leaf.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SecretType {
    HandshakeSecret,
    ApplicationSecret,
}

impl From<ContentType> for SecretType {
    fn from(content_type: ContentType) -> SecretType {
        match content_type {
            ContentType::Application => SecretType::ApplicationSecret,
            ContentType::Commit => SecretType::HandshakeSecret,
            ContentType::Proposal => SecretType::HandshakeSecret,
        }
    }
}

/// Derives a secret of a ratchet chain with the generation as context.
#[inline]
pub(crate) fn derive_tree_secret(
    ciphersuite: Ciphersuite,
    secret: &Secret,
    label: &str,
    generation: u32,
    length: usize,
    crypto: &impl CgkaCrypto,
) -> Result<Secret, SecretTreeError> {
    log::trace!(
        "Derive tree secret with label \"{}\" in generation {} of length {}",
        label,
        generation,
        length
    );
    log_crypto!(trace, "Input secret {:x?}", secret.as_slice());

    let secret = secret.kdf_expand_label(
        crypto,
        ciphersuite,
        label,
        &generation.to_be_bytes(),
        length,
    )?;
    log_crypto!(trace, "Derived secret {:x?}", secret.as_slice());
    Ok(secret)
}

/// The secret tree of one epoch.
#[derive(Debug, Clone, PartialEq)]
pub struct SecretTree {
    own_index: LeafNodeIndex,
    nodes: Vec<Option<Secret>>,
    handshake_sender_ratchets: Vec<Option<SenderRatchet>>,
    application_sender_ratchets: Vec<Option<SenderRatchet>>,
    size: TreeSize,
}

impl SecretTree {
    /// Creates a new secret tree for a ratchet tree of `size` nodes. The
    /// encryption secret is placed in the root.
    pub fn new(
        encryption_secret: EncryptionSecret,
        size: TreeSize,
        own_index: LeafNodeIndex,
    ) -> Self {
        let leaf_count = size.leaf_count() as usize;
        let mut nodes: Vec<Option<Secret>> = vec![None; size.usize()];
        // The root always lies within the tree.
        if let Some(root_node) = nodes.get_mut(root(size) as usize) {
            *root_node = Some(encryption_secret.consume_secret());
        }

        SecretTree {
            own_index,
            nodes,
            handshake_sender_ratchets: vec![None; leaf_count],
            application_sender_ratchets: vec![None; leaf_count],
            size,
        }
    }

    /// The size of the tree this secret tree was created for.
    pub fn size(&self) -> TreeSize {
        self.size
    }

    /// The current generation of a leaf's chain. Chains that were never used
    /// are at generation 0.
    #[cfg(test)]
    pub(crate) fn generation(&self, index: LeafNodeIndex, secret_type: SecretType) -> u32 {
        match self
            .ratchet_opt(index, secret_type)
            .expect("Index out of bounds.")
        {
            Some(sender_ratchet) => sender_ratchet.generation(),
            None => 0,
        }
    }

    /// Derives the secrets of `index` and its ratchets, unless that already
    /// happened.
    fn initialize_sender_ratchets(
        &mut self,
        ciphersuite: Ciphersuite,
        crypto: &impl CgkaCrypto,
        index: LeafNodeIndex,
    ) -> Result<(), SecretTreeError> {
        log::trace!("Initializing sender ratchets for {index:?} with {ciphersuite:?}");
        if !self.size.contains_leaf(index) {
            log::error!("Index is larger than the tree size.");
            return Err(SecretTreeError::IndexOutOfBounds);
        }
        // Check if SenderRatchets are already initialized
        if self
            .ratchet_opt(index, SecretType::HandshakeSecret)?
            .is_some()
            && self
                .ratchet_opt(index, SecretType::ApplicationSecret)?
                .is_some()
        {
            log::trace!("The sender ratchets are initialized already.");
            return Ok(());
        }

        // If we don't have a secret in the leaf node, we derive it
        if self.node(index.to_node_index())?.is_none() {
            // Collect empty nodes in the direct path until a non-empty node is
            // found
            let mut empty_nodes: Vec<NodeIndex> = Vec::new();
            let direct_path = direct_path(index.to_node_index(), self.size)
                .map_err(|_| SecretTreeError::LibraryError)?;
            log::trace!("Direct path for node {index:?}: {:?}", direct_path);
            for parent_node in direct_path {
                empty_nodes.push(parent_node);
                // Stop if we find a non-empty node
                if self.node(parent_node)?.is_some() {
                    break;
                }
            }

            // Invert direct path
            empty_nodes.reverse();

            // Derive the secrets down all the way to the leaf node
            for n in empty_nodes {
                log::trace!("Derive down for parent node {n}.");
                self.derive_down(ciphersuite, crypto, n)?;
            }
        }

        // Calculate node secret and initialize SenderRatchets
        let node_secret = match self.node(index.to_node_index())? {
            Some(secret) => secret,
            // We just derived all necessary nodes so this should not happen
            None => {
                log::error!("Leaf secret is missing after deriving the direct path.");
                return Err(SecretTreeError::LibraryError);
            }
        };

        log::trace!("Deriving leaf node secrets for leaf {index:?}");

        let handshake_ratchet_secret = node_secret.kdf_expand_label(
            crypto,
            ciphersuite,
            "handshake",
            b"",
            ciphersuite.hash_length(),
        )?;
        let application_ratchet_secret = node_secret.kdf_expand_label(
            crypto,
            ciphersuite,
            "application",
            b"",
            ciphersuite.hash_length(),
        )?;

        log_crypto!(
            trace,
            "handshake ratchet secret {handshake_ratchet_secret:x?}"
        );
        log_crypto!(
            trace,
            "application ratchet secret {application_ratchet_secret:x?}"
        );

        // The own chains only encrypt, the chains of other members only
        // decrypt.
        let (handshake_sender_ratchet, application_sender_ratchet) = if index == self.own_index {
            (
                SenderRatchet::EncryptionRatchet(RatchetSecret::initial_ratchet_secret(
                    handshake_ratchet_secret,
                )),
                SenderRatchet::EncryptionRatchet(RatchetSecret::initial_ratchet_secret(
                    application_ratchet_secret,
                )),
            )
        } else {
            (
                SenderRatchet::DecryptionRatchet(DecryptionRatchet::new(handshake_ratchet_secret)),
                SenderRatchet::DecryptionRatchet(DecryptionRatchet::new(
                    application_ratchet_secret,
                )),
            )
        };

        *self
            .handshake_sender_ratchets
            .get_mut(index.usize())
            .ok_or(SecretTreeError::IndexOutOfBounds)? = Some(handshake_sender_ratchet);
        *self
            .application_sender_ratchets
            .get_mut(index.usize())
            .ok_or(SecretTreeError::IndexOutOfBounds)? = Some(application_sender_ratchet);

        // Delete leaf node
        self.set_node(index.to_node_index(), None)
    }

    /// Get the key material of `generation` in the `secret_type` chain of the
    /// member at `index`, ratcheting forward if necessary.
    ///
    /// Fails if the generation lies outside the window of the configuration,
    /// if its key material was already used, or if `index` is the own leaf.
    pub fn secret_for_decryption(
        &mut self,
        ciphersuite: Ciphersuite,
        crypto: &impl CgkaCrypto,
        index: LeafNodeIndex,
        secret_type: SecretType,
        generation: u32,
        configuration: &SenderRatchetConfiguration,
    ) -> Result<RatchetKeyMaterial, SecretTreeError> {
        log::debug!(
            "Generating {:?} decryption secret for {:?} in generation {} with {:?}",
            secret_type,
            index,
            generation,
            ciphersuite,
        );
        // Check tree bounds
        if !self.size.contains_leaf(index) {
            log::error!("Sender index is not in the tree.");
            return Err(SecretTreeError::IndexOutOfBounds);
        }
        if self.ratchet_opt(index, secret_type)?.is_none() {
            log::trace!("   initialize sender ratchets");
            self.initialize_sender_ratchets(ciphersuite, crypto, index)?;
        }
        match self.ratchet_mut(index, secret_type)? {
            SenderRatchet::EncryptionRatchet(_) => {
                log::error!("This is the wrong ratchet type.");
                Err(SecretTreeError::RatchetTypeError)
            }
            SenderRatchet::DecryptionRatchet(dec_ratchet) => {
                log::trace!("   getting secret for decryption");
                dec_ratchet.secret_for_decryption(ciphersuite, crypto, generation, configuration)
            }
        }
    }

    /// Consume the current generation of the own `secret_type` chain. Returns
    /// the generation together with its key material.
    pub fn secret_for_encryption(
        &mut self,
        ciphersuite: Ciphersuite,
        crypto: &impl CgkaCrypto,
        index: LeafNodeIndex,
        secret_type: SecretType,
    ) -> Result<(u32, RatchetKeyMaterial), SecretTreeError> {
        if self.ratchet_opt(index, secret_type)?.is_none() {
            self.initialize_sender_ratchets(ciphersuite, crypto, index)?;
        }
        match self.ratchet_mut(index, secret_type)? {
            SenderRatchet::DecryptionRatchet(_) => {
                log::error!("Invalid ratchet type. Got decryption, expected encryption.");
                Err(SecretTreeError::RatchetTypeError)
            }
            SenderRatchet::EncryptionRatchet(enc_ratchet) => {
                enc_ratchet.ratchet_forward(crypto, ciphersuite)
            }
        }
    }

    fn ratchet_mut(
        &mut self,
        index: LeafNodeIndex,
        secret_type: SecretType,
    ) -> Result<&mut SenderRatchet, SecretTreeError> {
        let sender_ratchets = match secret_type {
            SecretType::HandshakeSecret => &mut self.handshake_sender_ratchets,
            SecretType::ApplicationSecret => &mut self.application_sender_ratchets,
        };
        sender_ratchets
            .get_mut(index.usize())
            .and_then(|r| r.as_mut())
            .ok_or(SecretTreeError::IndexOutOfBounds)
    }

    fn ratchet_opt(
        &self,
        index: LeafNodeIndex,
        secret_type: SecretType,
    ) -> Result<Option<&SenderRatchet>, SecretTreeError> {
        let sender_ratchets = match secret_type {
            SecretType::HandshakeSecret => &self.handshake_sender_ratchets,
            SecretType::ApplicationSecret => &self.application_sender_ratchets,
        };
        match sender_ratchets.get(index.usize()) {
            Some(sender_ratchet_option) => Ok(sender_ratchet_option.as_ref()),
            None => Err(SecretTreeError::IndexOutOfBounds),
        }
    }

    /// Derives the children of a parent node and deletes the parent.
    fn derive_down(
        &mut self,
        ciphersuite: Ciphersuite,
        crypto: &impl CgkaCrypto,
        index_in_tree: NodeIndex,
    ) -> Result<(), SecretTreeError> {
        log::debug!(
            "Deriving tree secret for parent node {} with {:?}",
            index_in_tree,
            ciphersuite
        );
        let hash_len = ciphersuite.hash_length();
        let node_secret = match self.node(index_in_tree)? {
            Some(secret) => secret,
            // This function only gets called top to bottom, so this should not happen
            None => {
                log::error!("Parent secret is missing while deriving down.");
                return Err(SecretTreeError::LibraryError);
            }
        };
        log_crypto!(trace, "Node secret: {:x?}", node_secret.as_slice());
        let left_index = left(index_in_tree).map_err(|_| SecretTreeError::LibraryError)?;
        let right_index = right(index_in_tree).map_err(|_| SecretTreeError::LibraryError)?;
        let left_secret =
            node_secret.kdf_expand_label(crypto, ciphersuite, "tree", b"left", hash_len)?;
        let right_secret =
            node_secret.kdf_expand_label(crypto, ciphersuite, "tree", b"right", hash_len)?;
        log_crypto!(
            trace,
            "Left node ({}) secret: {:x?}",
            left_index,
            left_secret.as_slice()
        );
        log_crypto!(
            trace,
            "Right node ({}) secret: {:x?}",
            right_index,
            right_secret.as_slice()
        );

        self.set_node(left_index, Some(left_secret))?;
        self.set_node(right_index, Some(right_secret))?;

        // Delete parent node
        self.set_node(index_in_tree, None)
    }

    fn node(&self, index: NodeIndex) -> Result<Option<&Secret>, SecretTreeError> {
        self.nodes
            .get(index as usize)
            .map(|node| node.as_ref())
            .ok_or(SecretTreeError::IndexOutOfBounds)
    }

    fn set_node(&mut self, index: NodeIndex, node: Option<Secret>) -> Result<(), SecretTreeError> {
        *self
            .nodes
            .get_mut(index as usize)
            .ok_or(SecretTreeError::IndexOutOfBounds)? = node;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::test_utils::*;

    fn secret_tree(
        ciphersuite: Ciphersuite,
        provider: &impl CgkaProvider,
        leaf_count: u32,
        own_index: u32,
    ) -> SecretTree {
        let encryption_secret = EncryptionSecret::random(ciphersuite, provider.rand())
            .expect("not enough randomness");
        SecretTree::new(
            encryption_secret,
            TreeSize::from_leaf_count(leaf_count),
            LeafNodeIndex::new(own_index),
        )
    }

    // This tests the boundaries of the generations from a SecretTree
    #[apply(ciphersuites_and_providers)]
    fn boundaries(ciphersuite: Ciphersuite, provider: &impl CgkaProvider) {
        let _ = pretty_env_logger::try_init();
        let configuration = &SenderRatchetConfiguration::default();
        let mut secret_tree = secret_tree(ciphersuite, provider, 3, 2);
        let secret_type = SecretType::ApplicationSecret;
        for (index, generation) in [(0u32, 0u32), (1, 0), (0, 1), (0, 1_000)] {
            assert!(secret_tree
                .secret_for_decryption(
                    ciphersuite,
                    provider.crypto(),
                    LeafNodeIndex::new(index),
                    secret_type,
                    generation,
                    configuration
                )
                .is_ok());
        }
        assert_eq!(
            secret_tree.secret_for_decryption(
                ciphersuite,
                provider.crypto(),
                LeafNodeIndex::new(1u32),
                secret_type,
                // We're at generation 1, so 1001 is still ok.
                1002,
                configuration,
            ),
            Err(SecretTreeError::TooDistantInTheFuture)
        );
        assert!(secret_tree
            .secret_for_decryption(
                ciphersuite,
                provider.crypto(),
                LeafNodeIndex::new(0u32),
                secret_type,
                996,
                configuration,
            )
            .is_ok());
        assert_eq!(
            secret_tree.secret_for_decryption(
                ciphersuite,
                provider.crypto(),
                LeafNodeIndex::new(0u32),
                secret_type,
                995,
                configuration,
            ),
            Err(SecretTreeError::TooDistantInThePast)
        );
        assert_eq!(
            secret_tree.secret_for_decryption(
                ciphersuite,
                provider.crypto(),
                LeafNodeIndex::new(4u32),
                secret_type,
                0,
                configuration,
            ),
            Err(SecretTreeError::IndexOutOfBounds)
        );

        let mut large_tree = self::secret_tree(ciphersuite, provider, 100_000, 2);
        assert!(large_tree
            .secret_for_decryption(
                ciphersuite,
                provider.crypto(),
                LeafNodeIndex::new(99_999u32),
                secret_type,
                5,
                configuration,
            )
            .is_ok());
    }

    // Sender and receiver trees seeded with the same encryption secret agree
    // on the key material.
    #[apply(ciphersuites_and_providers)]
    fn sender_and_receiver_agree(ciphersuite: Ciphersuite, provider: &impl CgkaProvider) {
        let _ = pretty_env_logger::try_init();
        let configuration = &SenderRatchetConfiguration::default();
        let encryption_secret = EncryptionSecret::random(ciphersuite, provider.rand())
            .expect("not enough randomness");
        let size = TreeSize::from_leaf_count(5);
        let mut alice = SecretTree::new(encryption_secret.clone(), size, LeafNodeIndex::new(0));
        let mut bob = SecretTree::new(encryption_secret, size, LeafNodeIndex::new(3));

        for secret_type in [SecretType::HandshakeSecret, SecretType::ApplicationSecret] {
            for expected_generation in 0..3 {
                let (generation, sender_material) = alice
                    .secret_for_encryption(
                        ciphersuite,
                        provider.crypto(),
                        LeafNodeIndex::new(0),
                        secret_type,
                    )
                    .expect("error deriving encryption secret");
                assert_eq!(generation, expected_generation);
                let receiver_material = bob
                    .secret_for_decryption(
                        ciphersuite,
                        provider.crypto(),
                        LeafNodeIndex::new(0),
                        secret_type,
                        generation,
                        configuration,
                    )
                    .expect("error deriving decryption secret");
                assert_eq!(sender_material, receiver_material);
            }
        }
        assert_eq!(
            alice.generation(LeafNodeIndex::new(0), SecretType::ApplicationSecret),
            3
        );

        // Own ratchets can't decrypt and foreign ones can't encrypt.
        assert_eq!(
            alice.secret_for_decryption(
                ciphersuite,
                provider.crypto(),
                LeafNodeIndex::new(0),
                SecretType::ApplicationSecret,
                0,
                configuration,
            ),
            Err(SecretTreeError::RatchetTypeError)
        );
        assert_eq!(
            bob.secret_for_encryption(
                ciphersuite,
                provider.crypto(),
                LeafNodeIndex::new(0),
                SecretType::ApplicationSecret,
            ),
            Err(SecretTreeError::RatchetTypeError)
        );
    }

    // Every leaf and every chain yields distinct keys.
    #[apply(ciphersuites_and_providers)]
    fn keys_are_unique(ciphersuite: Ciphersuite, provider: &impl CgkaProvider) {
        let _ = pretty_env_logger::try_init();
        let configuration = &SenderRatchetConfiguration::default();
        let leaf_count = 9u32;
        let mut secret_tree = secret_tree(ciphersuite, provider, leaf_count, leaf_count);
        let mut keys = HashSet::new();
        for index in 0..leaf_count {
            for secret_type in [SecretType::HandshakeSecret, SecretType::ApplicationSecret] {
                for generation in 0..3 {
                    let (key, nonce) = secret_tree
                        .secret_for_decryption(
                            ciphersuite,
                            provider.crypto(),
                            LeafNodeIndex::new(index),
                            secret_type,
                            generation,
                            configuration,
                        )
                        .expect("error deriving decryption secret");
                    assert!(keys.insert(key.as_slice().to_vec()));
                    assert!(keys.insert(nonce.as_slice().to_vec()));
                }
            }
        }
    }
}
