//! Proposals received between two commits.

use std::collections::HashSet;

use cgka_traits::crypto::CgkaCrypto;
use tls_codec::Serialize as TlsSerializeTrait;

use super::errors::ProposalValidationError;
use crate::{
    ciphersuite::{
        hash_ref::{make_proposal_ref, ProposalRef},
        Ciphersuite,
    },
    error::LibraryError,
    framing::{AuthenticatedContent, FramedContentBody, Sender},
    messages::proposals::{Proposal, ProposalOrRef, ProposalOrRefType},
};

/// A [`ProposalStore`] holds the standalone proposals of the current epoch,
/// keyed by their [`ProposalRef`].
#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct ProposalStore {
    queued_proposals: Vec<QueuedProposal>,
}

impl ProposalStore {
    pub(crate) fn new() -> Self {
        Self {
            queued_proposals: Vec::new(),
        }
    }

    /// Add a proposal. A proposal with a reference that is already stored is
    /// ignored.
    pub(crate) fn add(&mut self, queued_proposal: QueuedProposal) {
        if self.get(&queued_proposal.proposal_reference).is_none() {
            self.queued_proposals.push(queued_proposal);
        }
    }

    pub(crate) fn get(&self, proposal_reference: &ProposalRef) -> Option<&QueuedProposal> {
        self.queued_proposals
            .iter()
            .find(|p| &p.proposal_reference == proposal_reference)
    }

    pub(crate) fn proposals(&self) -> impl Iterator<Item = &QueuedProposal> {
        self.queued_proposals.iter()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.queued_proposals.is_empty()
    }

    pub(crate) fn empty(&mut self) {
        self.queued_proposals = Vec::new();
    }
}

/// A proposal together with its sender and reference, as it is stored in the
/// [`ProposalStore`] or was found inline in a commit.
#[derive(Clone, Debug, PartialEq)]
pub struct QueuedProposal {
    proposal: Proposal,
    proposal_reference: ProposalRef,
    sender: Sender,
    proposal_or_ref_type: ProposalOrRefType,
}

impl QueuedProposal {
    /// Creates a new [`QueuedProposal`] from authenticated content carrying a
    /// proposal. The reference is computed over the encoded framed content.
    pub(crate) fn from_authenticated_content(
        ciphersuite: Ciphersuite,
        crypto: &impl CgkaCrypto,
        authenticated_content: &AuthenticatedContent,
    ) -> Result<Self, LibraryError> {
        let proposal = match authenticated_content.body() {
            FramedContentBody::Proposal(p) => p.clone(),
            _ => return Err(LibraryError::custom("Wrong content type")),
        };
        let encoded = authenticated_content
            .content()
            .tls_serialize_detached()
            .map_err(LibraryError::missing_bound_check)?;
        let proposal_reference = make_proposal_ref(&encoded, ciphersuite, crypto)
            .map_err(LibraryError::unexpected_crypto_error)?;
        Ok(Self {
            proposal,
            proposal_reference,
            sender: *authenticated_content.sender(),
            proposal_or_ref_type: ProposalOrRefType::Reference,
        })
    }

    /// Creates a new [`QueuedProposal`] for a proposal sent inline in a
    /// commit by `sender`.
    pub(crate) fn from_proposal_and_sender(
        ciphersuite: Ciphersuite,
        crypto: &impl CgkaCrypto,
        proposal: Proposal,
        sender: &Sender,
    ) -> Result<Self, LibraryError> {
        let encoded = proposal
            .tls_serialize_detached()
            .map_err(LibraryError::missing_bound_check)?;
        let proposal_reference = make_proposal_ref(&encoded, ciphersuite, crypto)
            .map_err(LibraryError::unexpected_crypto_error)?;
        Ok(Self {
            proposal,
            proposal_reference,
            sender: *sender,
            proposal_or_ref_type: ProposalOrRefType::Proposal,
        })
    }

    /// The proposal.
    pub fn proposal(&self) -> &Proposal {
        &self.proposal
    }

    /// The reference of the proposal.
    pub fn proposal_reference(&self) -> &ProposalRef {
        &self.proposal_reference
    }

    /// Whether the proposal was sent on its own or inline in a commit.
    pub fn proposal_or_ref_type(&self) -> ProposalOrRefType {
        self.proposal_or_ref_type
    }

    /// The sender of the proposal.
    pub fn sender(&self) -> &Sender {
        &self.sender
    }

    /// How this proposal appears in a commit.
    pub(crate) fn to_proposal_or_ref(&self) -> ProposalOrRef {
        match self.proposal_or_ref_type {
            ProposalOrRefType::Proposal => ProposalOrRef::Proposal(self.proposal.clone()),
            ProposalOrRefType::Reference => {
                ProposalOrRef::Reference(self.proposal_reference.clone())
            }
        }
    }
}

/// Resolve the proposals of a received commit. References are looked up in
/// the `proposal_store`, inline proposals are attributed to the committer.
pub(crate) fn resolve_committed_proposals(
    ciphersuite: Ciphersuite,
    crypto: &impl CgkaCrypto,
    proposal_store: &ProposalStore,
    committed_proposals: &[ProposalOrRef],
    committer: &Sender,
) -> Result<Vec<QueuedProposal>, ProposalValidationError> {
    let mut seen = HashSet::new();
    let mut queued_proposals = Vec::with_capacity(committed_proposals.len());
    for proposal_or_ref in committed_proposals {
        let queued_proposal = match proposal_or_ref {
            ProposalOrRef::Proposal(proposal) => QueuedProposal::from_proposal_and_sender(
                ciphersuite,
                crypto,
                proposal.clone(),
                committer,
            )?,
            ProposalOrRef::Reference(proposal_reference) => proposal_store
                .get(proposal_reference)
                .cloned()
                .ok_or_else(|| {
                    log::debug!("Unknown proposal reference {}", proposal_reference);
                    ProposalValidationError::UnknownProposalReference
                })?,
        };
        if !seen.insert(queued_proposal.proposal_reference.clone()) {
            return Err(ProposalValidationError::DuplicateProposalReference);
        }
        queued_proposals.push(queued_proposal);
    }
    Ok(queued_proposals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        binary_tree::LeafNodeIndex, messages::proposals::RemoveProposal, test_utils::*,
    };

    fn remove(leaf: u32) -> Proposal {
        Proposal::Remove(RemoveProposal {
            removed: LeafNodeIndex::new(leaf),
        })
    }

    #[apply(ciphersuites_and_providers)]
    fn store_deduplicates(ciphersuite: Ciphersuite, provider: &impl CgkaProvider) {
        let _ = pretty_env_logger::try_init();
        let sender = Sender::build_member(LeafNodeIndex::new(0));
        let queued = QueuedProposal::from_proposal_and_sender(
            ciphersuite,
            provider.crypto(),
            remove(1),
            &sender,
        )
        .expect("proposal ref");
        let mut store = ProposalStore::new();
        store.add(queued.clone());
        store.add(queued.clone());
        assert_eq!(store.proposals().count(), 1);
        assert_eq!(store.get(queued.proposal_reference()), Some(&queued));
        store.empty();
        assert!(store.is_empty());
    }

    #[apply(ciphersuites_and_providers)]
    fn unknown_and_duplicate_references(ciphersuite: Ciphersuite, provider: &impl CgkaProvider) {
        let _ = pretty_env_logger::try_init();
        let sender = Sender::build_member(LeafNodeIndex::new(0));
        let queued = QueuedProposal::from_proposal_and_sender(
            ciphersuite,
            provider.crypto(),
            remove(1),
            &sender,
        )
        .expect("proposal ref");
        let store = ProposalStore::new();

        let unknown = resolve_committed_proposals(
            ciphersuite,
            provider.crypto(),
            &store,
            &[ProposalOrRef::Reference(queued.proposal_reference().clone())],
            &sender,
        );
        assert_eq!(
            unknown,
            Err(ProposalValidationError::UnknownProposalReference)
        );

        let duplicate = resolve_committed_proposals(
            ciphersuite,
            provider.crypto(),
            &store,
            &[
                ProposalOrRef::Proposal(remove(1)),
                ProposalOrRef::Proposal(remove(1)),
            ],
            &sender,
        );
        assert_eq!(
            duplicate,
            Err(ProposalValidationError::DuplicateProposalReference)
        );
    }
}
