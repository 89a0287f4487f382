use std::collections::VecDeque;

use super::{GroupEpoch, Member};
use crate::schedule::message_secrets::MessageSecrets;

// Internal helper struct
#[derive(Debug, Clone)]
#[cfg_attr(test, derive(PartialEq))]
struct EpochTree {
    epoch: GroupEpoch,
    message_secrets: MessageSecrets,
    leaves: Vec<Member>,
}

/// Can store message secrets for up to `max_epochs` past epochs, together with
/// the members of each epoch so that the signatures of late application
/// messages can be checked. The secrets of the current epoch are kept
/// separately.
#[derive(Debug, Clone)]
#[cfg_attr(test, derive(PartialEq))]
pub(crate) struct MessageSecretsStore {
    // Maximum size of the `past_epoch_trees` list.
    max_epochs: usize,
    // Past message secrets, oldest first.
    past_epoch_trees: VecDeque<EpochTree>,
    // The message secrets of the current epoch.
    message_secrets: MessageSecrets,
}

impl MessageSecretsStore {
    /// Create a new store that can hold up to `max_epochs` past message
    /// secrets. If `max_epochs` is 0, only the current epoch is being stored.
    pub(crate) fn new_with_secret(max_epochs: usize, message_secrets: MessageSecrets) -> Self {
        Self {
            max_epochs,
            past_epoch_trees: VecDeque::new(),
            message_secrets,
        }
    }

    /// Make `message_secrets` the secrets of the current epoch. The secrets
    /// they replace are kept for `past_epoch` with the members `leaves` of that
    /// epoch. The oldest entry is dropped once the store is full.
    pub(crate) fn add(
        &mut self,
        past_epoch: GroupEpoch,
        message_secrets: MessageSecrets,
        leaves: Vec<Member>,
    ) {
        let past_message_secrets = std::mem::replace(&mut self.message_secrets, message_secrets);
        // Don't store the tree if it's not intended
        if self.max_epochs == 0 {
            return;
        }
        while self.past_epoch_trees.len() >= self.max_epochs {
            self.past_epoch_trees.pop_front();
        }
        self.past_epoch_trees.push_back(EpochTree {
            epoch: past_epoch,
            message_secrets: past_message_secrets,
            leaves,
        });
        log::trace!(
            "Keeping the secrets of {} past epochs.",
            self.past_epoch_trees.len()
        );
    }

    /// Get a mutable reference to the message secrets of a past epoch together
    /// with the members of that epoch. `None` if the epoch is not in the
    /// store.
    pub(crate) fn secrets_for_epoch_mut(
        &mut self,
        epoch: GroupEpoch,
    ) -> Option<(&mut MessageSecrets, &[Member])> {
        self.past_epoch_trees
            .iter_mut()
            .find(|epoch_tree| epoch_tree.epoch == epoch)
            .map(|epoch_tree| {
                (
                    &mut epoch_tree.message_secrets,
                    epoch_tree.leaves.as_slice(),
                )
            })
    }

    /// The message secrets of the current epoch.
    pub(crate) fn message_secrets(&self) -> &MessageSecrets {
        &self.message_secrets
    }

    /// A mutable reference to the message secrets of the current epoch.
    pub(crate) fn message_secrets_mut(&mut self) -> &mut MessageSecrets {
        &mut self.message_secrets
    }

    #[cfg(test)]
    pub(crate) fn past_epochs(&self) -> Vec<GroupEpoch> {
        self.past_epoch_trees
            .iter()
            .map(|epoch_tree| epoch_tree.epoch)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        binary_tree::LeafNodeIndex,
        test_utils::*,
    };

    fn random_message_secrets(
        ciphersuite: Ciphersuite,
        provider: &impl CgkaProvider,
    ) -> MessageSecrets {
        MessageSecrets::random(ciphersuite, provider.rand(), LeafNodeIndex::new(0))
    }

    #[apply(ciphersuites_and_providers)]
    fn keeps_at_most_max_epochs(ciphersuite: Ciphersuite, provider: &impl CgkaProvider) {
        let _ = pretty_env_logger::try_init();
        let mut store =
            MessageSecretsStore::new_with_secret(2, random_message_secrets(ciphersuite, provider));
        for epoch in 0..4u64 {
            store.add(
                epoch.into(),
                random_message_secrets(ciphersuite, provider),
                vec![],
            );
        }
        assert_eq!(store.past_epochs(), vec![2.into(), 3.into()]);
        assert!(store.secrets_for_epoch_mut(1.into()).is_none());
        assert!(store.secrets_for_epoch_mut(3.into()).is_some());
    }

    #[apply(ciphersuites_and_providers)]
    fn zero_past_epochs(ciphersuite: Ciphersuite, provider: &impl CgkaProvider) {
        let _ = pretty_env_logger::try_init();
        let mut store =
            MessageSecretsStore::new_with_secret(0, random_message_secrets(ciphersuite, provider));
        let next = random_message_secrets(ciphersuite, provider);
        store.add(0.into(), next.clone(), vec![]);
        assert!(store.past_epochs().is_empty());
        assert_eq!(store.message_secrets(), &next);
    }
}
