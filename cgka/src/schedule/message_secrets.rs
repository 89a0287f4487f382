//! This module defines the [`MessageSecrets`] struct that is used for message
//! encryption, decryption and verification.

use super::*;

/// The secrets of an epoch that protect messages. A copy of them is kept for
/// a few past epochs so that late application messages can be decrypted.
#[derive(Clone, PartialEq)]
pub(crate) struct MessageSecrets {
    sender_data_secret: SenderDataSecret,
    membership_key: MembershipKey,
    confirmation_key: ConfirmationKey,
    serialized_context: Vec<u8>,
    secret_tree: SecretTree,
}

#[cfg(not(feature = "crypto-debug"))]
impl core::fmt::Debug for MessageSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageSecrets")
            .field("sender_data_secret", &"***")
            .field("membership_key", &"***")
            .field("confirmation_key", &"***")
            .field("serialized_context", &"***")
            .field("secret_tree", &"***")
            .finish()
    }
}

#[cfg(feature = "crypto-debug")]
impl core::fmt::Debug for MessageSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageSecrets")
            .field("sender_data_secret", &self.sender_data_secret)
            .field("membership_key", &self.membership_key)
            .field("confirmation_key", &self.confirmation_key)
            .field("serialized_context", &self.serialized_context)
            .field("secret_tree", &self.secret_tree)
            .finish()
    }
}

impl MessageSecrets {
    pub(crate) fn new(
        sender_data_secret: SenderDataSecret,
        membership_key: MembershipKey,
        confirmation_key: ConfirmationKey,
        serialized_context: Vec<u8>,
        secret_tree: SecretTree,
    ) -> Self {
        Self {
            sender_data_secret,
            membership_key,
            confirmation_key,
            serialized_context,
            secret_tree,
        }
    }

    pub(crate) fn sender_data_secret(&self) -> &SenderDataSecret {
        &self.sender_data_secret
    }

    pub(crate) fn membership_key(&self) -> &MembershipKey {
        &self.membership_key
    }

    pub(crate) fn confirmation_key(&self) -> &ConfirmationKey {
        &self.confirmation_key
    }

    /// The encoded group context of the epoch these secrets belong to.
    pub(crate) fn serialized_context(&self) -> &[u8] {
        self.serialized_context.as_ref()
    }

    pub(crate) fn secret_tree_mut(&mut self) -> &mut SecretTree {
        &mut self.secret_tree
    }

    /// Message secrets from random secrets for a group of a single member.
    #[cfg(test)]
    pub(crate) fn random(
        ciphersuite: Ciphersuite,
        rand: &impl CgkaRand,
        own_index: LeafNodeIndex,
    ) -> Self {
        let random_secret =
            || Secret::random(ciphersuite, rand).expect("Not enough randomness.");
        let encryption_secret =
            EncryptionSecret::random(ciphersuite, rand).expect("Not enough randomness.");
        Self {
            sender_data_secret: SenderDataSecret {
                secret: random_secret(),
            },
            membership_key: MembershipKey::from_secret(random_secret()),
            confirmation_key: ConfirmationKey {
                secret: random_secret(),
            },
            serialized_context: vec![],
            secret_tree: SecretTree::new(
                encryption_secret,
                TreeSize::from_leaf_count(1),
                own_index,
            ),
        }
    }

    #[cfg(test)]
    pub(crate) fn set_membership_key(&mut self, membership_key: Secret) {
        self.membership_key = MembershipKey::from_secret(membership_key);
    }

    /// Replace the secret tree, returning the old one.
    #[cfg(test)]
    pub(crate) fn replace_secret_tree(&mut self, secret_tree: SecretTree) -> SecretTree {
        std::mem::replace(&mut self.secret_tree, secret_tree)
    }

    #[cfg(test)]
    pub(crate) fn set_serialized_context(&mut self, serialized_context: Vec<u8>) {
        self.serialized_context = serialized_context;
    }
}
