//! # Pre-shared keys
//!
//! A group can mix pre-shared keys into the key schedule of an epoch. External
//! PSKs are provisioned out of band and looked up through the provider's
//! [`PskIndex`]. Resumption PSKs are the resumption secrets of earlier epochs
//! of the group, kept in a bounded [`ResumptionPskStore`].
//!
//! ```text
//! enum {
//!   reserved(0),
//!   external(1),
//!   resumption(2),
//!   (255)
//! } PSKType;
//!
//! enum {
//!   reserved(0),
//!   application(1),
//!   reinit(2),
//!   branch(3),
//!   (255)
//! } ResumptionPSKUsage;
//!
//! struct {
//!   PSKType psktype;
//!   select (PreSharedKeyID.psktype) {
//!     case external:
//!       opaque psk_id<V>;
//!
//!     case resumption:
//!       ResumptionPSKUsage usage;
//!       opaque psk_group_id<V>;
//!       uint64 psk_epoch;
//!   };
//!   opaque psk_nonce<V>;
//! } PreSharedKeyID;
//! ```

use std::collections::HashSet;

use cgka_traits::{crypto::CgkaCrypto, psk::PskIndex, random::CgkaRand, types::CryptoError};
use serde::{Deserialize, Serialize};
use tls_codec::{Serialize as TlsSerializeTrait, TlsDeserialize, TlsSerialize, TlsSize, VLBytes};

use super::{errors::PskError, ResumptionPskSecret};
use crate::{
    ciphersuite::{Ciphersuite, Secret},
    error::LibraryError,
    group::{GroupEpoch, GroupId},
};

/// Resumption PSK usage.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    TlsDeserialize,
    TlsSerialize,
    TlsSize,
)]
#[repr(u8)]
pub enum ResumptionPskUsage {
    /// Application.
    Application = 1,
    /// Resumption PSK used for group reinitialization.
    Reinit = 2,
    /// Resumption PSK used for subgroup branching.
    Branch = 3,
}

/// External PSK.
#[derive(
    Debug,
    PartialEq,
    Eq,
    Hash,
    Clone,
    Serialize,
    Deserialize,
    TlsDeserialize,
    TlsSerialize,
    TlsSize,
)]
pub struct ExternalPsk {
    psk_id: VLBytes,
}

impl ExternalPsk {
    /// Create a new `ExternalPsk` from a PSK ID
    pub fn new(psk_id: Vec<u8>) -> Self {
        Self {
            psk_id: psk_id.into(),
        }
    }

    /// Return the PSK ID
    pub fn psk_id(&self) -> &[u8] {
        self.psk_id.as_slice()
    }
}

/// Resumption PSK.
#[derive(
    Debug,
    PartialEq,
    Eq,
    Hash,
    Clone,
    Serialize,
    Deserialize,
    TlsDeserialize,
    TlsSerialize,
    TlsSize,
)]
pub struct ResumptionPsk {
    pub(crate) usage: ResumptionPskUsage,
    pub(crate) psk_group_id: GroupId,
    pub(crate) psk_epoch: GroupEpoch,
}

impl ResumptionPsk {
    /// Create a new `ResumptionPsk`
    pub fn new(usage: ResumptionPskUsage, psk_group_id: GroupId, psk_epoch: GroupEpoch) -> Self {
        Self {
            usage,
            psk_group_id,
            psk_epoch,
        }
    }

    /// Return the usage
    pub fn usage(&self) -> ResumptionPskUsage {
        self.usage
    }

    /// Return the `GroupId`
    pub fn psk_group_id(&self) -> &GroupId {
        &self.psk_group_id
    }

    /// Return the `GroupEpoch`
    pub fn psk_epoch(&self) -> GroupEpoch {
        self.psk_epoch
    }
}

/// The different PSK types.
#[derive(
    Debug,
    PartialEq,
    Eq,
    Hash,
    Clone,
    Serialize,
    Deserialize,
    TlsDeserialize,
    TlsSerialize,
    TlsSize,
)]
#[repr(u8)]
pub enum Psk {
    /// An external PSK provided by the application.
    #[tls_codec(discriminant = 1)]
    External(ExternalPsk),
    /// A resumption PSK derived from the MLS key schedule.
    #[tls_codec(discriminant = 2)]
    Resumption(ResumptionPsk),
}

/// A `PreSharedKeyID` is used to uniquely identify the PSKs that get injected
/// in the key schedule.
#[derive(
    Debug,
    PartialEq,
    Eq,
    Hash,
    Clone,
    Serialize,
    Deserialize,
    TlsDeserialize,
    TlsSerialize,
    TlsSize,
)]
pub struct PreSharedKeyId {
    pub(crate) psk: Psk,
    pub(crate) psk_nonce: VLBytes,
}

impl PreSharedKeyId {
    /// Construct a `PreSharedKeyID` with a random nonce.
    pub fn new(
        ciphersuite: Ciphersuite,
        rand: &impl CgkaRand,
        psk: Psk,
    ) -> Result<Self, CryptoError> {
        let psk_nonce = rand
            .random_vec(ciphersuite.hash_length())
            .map_err(|_| CryptoError::InsufficientRandomness)?
            .into();

        Ok(Self { psk, psk_nonce })
    }

    /// Construct an external `PreSharedKeyID` with a random nonce.
    pub fn external(
        ciphersuite: Ciphersuite,
        rand: &impl CgkaRand,
        psk_id: Vec<u8>,
    ) -> Result<Self, CryptoError> {
        Self::new(ciphersuite, rand, Psk::External(ExternalPsk::new(psk_id)))
    }

    /// Construct a resumption `PreSharedKeyID` with a random nonce.
    pub fn resumption(
        ciphersuite: Ciphersuite,
        rand: &impl CgkaRand,
        usage: ResumptionPskUsage,
        psk_group_id: GroupId,
        psk_epoch: GroupEpoch,
    ) -> Result<Self, CryptoError> {
        Self::new(
            ciphersuite,
            rand,
            Psk::Resumption(ResumptionPsk::new(usage, psk_group_id, psk_epoch)),
        )
    }

    /// Construct a `PreSharedKeyID` with a given nonce.
    #[cfg(any(feature = "test-utils", test))]
    pub fn new_with_nonce(psk: Psk, psk_nonce: Vec<u8>) -> Self {
        Self {
            psk,
            psk_nonce: psk_nonce.into(),
        }
    }

    /// Return the PSK.
    pub fn psk(&self) -> &Psk {
        &self.psk
    }

    /// Return the PSK nonce.
    pub fn psk_nonce(&self) -> &[u8] {
        self.psk_nonce.as_slice()
    }

    /// Check the rules a PSK proposal of a regular commit has to follow: the
    /// nonce has the length of the hash output and resumption PSKs are only
    /// used with the `application` usage.
    pub(crate) fn validate_in_proposal(&self, ciphersuite: Ciphersuite) -> Result<(), PskError> {
        if let Psk::Resumption(resumption_psk) = &self.psk {
            if resumption_psk.usage != ResumptionPskUsage::Application {
                return Err(PskError::UsageMismatch {
                    allowed: vec![ResumptionPskUsage::Application],
                    got: resumption_psk.usage,
                });
            }
        }
        let expected_nonce_length = ciphersuite.hash_length();
        if self.psk_nonce.as_slice().len() != expected_nonce_length {
            return Err(PskError::NonceLengthMismatch {
                expected: expected_nonce_length,
                got: self.psk_nonce.as_slice().len(),
            });
        }
        Ok(())
    }
}

/// Checks that no PSK is referenced twice.
pub(crate) fn check_for_duplicates(psk_ids: &[PreSharedKeyId]) -> Result<(), PskError> {
    let mut seen = HashSet::with_capacity(psk_ids.len());
    for psk_id in psk_ids {
        if !seen.insert(psk_id.psk()) {
            return Err(PskError::Duplicate {
                first: psk_id.clone(),
            });
        }
    }
    Ok(())
}

/// `PskLabel` is used in the final concatentation of PSKs before they are
/// injected in the key schedule.
///
/// ```text
/// struct {
///     PreSharedKeyID id;
///     uint16 index;
///     uint16 count;
/// } PSKLabel;
/// ```
#[derive(TlsSerialize, TlsSize)]
struct PskLabel<'a> {
    id: &'a PreSharedKeyId,
    index: u16,
    count: u16,
}

/// This contains the `psk-secret` calculated from the PSKs contained in a
/// Commit or a PreSharedKey proposal.
#[derive(Debug, Clone, PartialEq)]
pub struct PskSecret {
    secret: Secret,
}

impl PskSecret {
    /// Create a new `PskSecret` from PSK IDs and PSKs
    ///
    /// ```text
    /// psk_extracted_[i] = KDF.Extract(0, psk_[i])
    /// psk_input_[i] = ExpandWithLabel(psk_extracted_[i], "derived psk", PSKLabel, KDF.Nh)
    ///
    /// psk_secret_[0] = 0
    /// psk_secret_[i] = KDF.Extract(psk_input_[i-1], psk_secret_[i-1])
    /// psk_secret     = psk_secret[n]
    /// ```
    pub(crate) fn new(
        crypto: &impl CgkaCrypto,
        ciphersuite: Ciphersuite,
        psks: Vec<(&PreSharedKeyId, Secret)>,
    ) -> Result<Self, PskError> {
        let num_psks = u16::try_from(psks.len()).map_err(|_| PskError::TooManyKeys)?;

        let mut psk_secret = Secret::zero(ciphersuite);
        for (index, (psk_id, psk)) in psks.into_iter().enumerate() {
            let zero_secret = Secret::zero(ciphersuite);
            let psk_extracted = zero_secret
                .hkdf_extract(crypto, ciphersuite, &psk)
                .map_err(LibraryError::unexpected_crypto_error)?;
            let psk_label = PskLabel {
                id: psk_id,
                index: index as u16,
                count: num_psks,
            }
            .tls_serialize_detached()
            .map_err(LibraryError::missing_bound_check)?;

            let psk_input = psk_extracted
                .kdf_expand_label(
                    crypto,
                    ciphersuite,
                    "derived psk",
                    &psk_label,
                    ciphersuite.hash_length(),
                )
                .map_err(LibraryError::unexpected_crypto_error)?;
            psk_secret = psk_input
                .hkdf_extract(crypto, ciphersuite, &psk_secret)
                .map_err(LibraryError::unexpected_crypto_error)?;
        }
        Ok(Self { secret: psk_secret })
    }

    /// The PSK secret of an epoch without PSKs.
    pub(crate) fn zero(ciphersuite: Ciphersuite) -> Self {
        Self {
            secret: Secret::zero(ciphersuite),
        }
    }

    /// Return the inner secret
    pub(crate) fn secret(&self) -> &Secret {
        &self.secret
    }
}

/// Keeps the resumption secrets of the last `max_number_of_secrets` epochs of
/// a group.
#[derive(Debug, Clone, PartialEq)]
pub struct ResumptionPskStore {
    max_number_of_secrets: usize,
    resumption_psk: Vec<(GroupEpoch, ResumptionPskSecret)>,
    cursor: usize,
}

impl ResumptionPskStore {
    /// Creates a new store with a given maximum size of `number_of_secrets`.
    pub(crate) fn new(max_number_of_secrets: usize) -> Self {
        Self {
            max_number_of_secrets,
            resumption_psk: vec![],
            cursor: 0,
        }
    }

    /// Adds a new entry to the store. The oldest entry is overwritten once the
    /// store is full.
    pub(crate) fn add(&mut self, epoch: GroupEpoch, resumption_psk: ResumptionPskSecret) {
        if self.max_number_of_secrets == 0 {
            return;
        }
        let item = (epoch, resumption_psk);
        if self.resumption_psk.len() < self.max_number_of_secrets {
            self.resumption_psk.push(item);
            self.cursor += 1;
        } else {
            self.cursor += 1;
            self.cursor %= self.resumption_psk.len();
            self.resumption_psk[self.cursor] = item;
        }
    }

    /// Searches an entry for a given epoch number and if found, returns the
    /// corresponding resumption psk.
    pub(crate) fn get(&self, epoch: GroupEpoch) -> Option<&ResumptionPskSecret> {
        self.resumption_psk
            .iter()
            .find(|&(e, _s)| e == &epoch)
            .map(|(_e, s)| s)
    }

    /// The number of secrets in the store.
    pub fn len(&self) -> usize {
        self.resumption_psk.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.resumption_psk.is_empty()
    }
}

/// Resolves the secrets of the given PSKs. External PSKs are looked up in the
/// `psk_index`, resumption PSKs of `group_id` in the `resumption_psk_store`.
pub(crate) fn load_psks<'p>(
    psk_index: &impl PskIndex,
    resumption_psk_store: &ResumptionPskStore,
    group_id: &GroupId,
    psk_ids: &'p [PreSharedKeyId],
) -> Result<Vec<(&'p PreSharedKeyId, Secret)>, PskError> {
    let mut psk_bundles = Vec::with_capacity(psk_ids.len());

    for psk_id in psk_ids {
        log::trace!("PSK store {:?}", resumption_psk_store);

        match &psk_id.psk {
            Psk::Resumption(resumption) => {
                if &resumption.psk_group_id != group_id {
                    log::debug!("Resumption PSK of another group is not available.");
                    return Err(PskError::KeyNotFound);
                }
                match resumption_psk_store.get(resumption.psk_epoch) {
                    Some(secret) => psk_bundles.push((psk_id, secret.secret().clone())),
                    None => return Err(PskError::KeyNotFound),
                }
            }
            Psk::External(external) => match psk_index.find_psk(external.psk_id()) {
                Some(secret) => psk_bundles.push((psk_id, Secret::from_slice(&secret))),
                None => return Err(PskError::KeyNotFound),
            },
        }
    }

    Ok(psk_bundles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    #[apply(ciphersuites_and_providers)]
    fn psk_secret_depends_on_ids_and_order(
        ciphersuite: Ciphersuite,
        provider: &impl CgkaProvider,
    ) {
        let _ = pretty_env_logger::try_init();
        let first = PreSharedKeyId::external(ciphersuite, provider.rand(), b"first".to_vec())
            .expect("not enough randomness");
        let second = PreSharedKeyId::external(ciphersuite, provider.rand(), b"second".to_vec())
            .expect("not enough randomness");
        let first_secret = Secret::random(ciphersuite, provider.rand()).expect("randomness");
        let second_secret = Secret::random(ciphersuite, provider.rand()).expect("randomness");

        let forward = PskSecret::new(
            provider.crypto(),
            ciphersuite,
            vec![
                (&first, first_secret.clone()),
                (&second, second_secret.clone()),
            ],
        )
        .expect("error computing psk secret");
        let forward_again = PskSecret::new(
            provider.crypto(),
            ciphersuite,
            vec![
                (&first, first_secret.clone()),
                (&second, second_secret.clone()),
            ],
        )
        .expect("error computing psk secret");
        let backward = PskSecret::new(
            provider.crypto(),
            ciphersuite,
            vec![(&second, second_secret), (&first, first_secret)],
        )
        .expect("error computing psk secret");

        assert_eq!(forward, forward_again);
        assert_ne!(forward, backward);
        assert_ne!(forward, PskSecret::zero(ciphersuite));
    }

    #[apply(ciphersuites_and_providers)]
    fn load_external_and_resumption(ciphersuite: Ciphersuite, provider: &CgkaRustCrypto) {
        let _ = pretty_env_logger::try_init();
        let group_id = GroupId::from_slice(b"group");
        provider
            .psks()
            .store(b"known", &vec![7u8; ciphersuite.hash_length()])
            .expect("error storing psk");

        let mut store = ResumptionPskStore::new(2);
        for epoch in 0..3u64 {
            store.add(
                GroupEpoch::from(epoch),
                ResumptionPskSecret::random(ciphersuite, provider.rand()),
            );
        }
        // The store only keeps two epochs.
        assert_eq!(store.len(), 2);
        assert!(store.get(GroupEpoch::from(0)).is_none());

        let known = PreSharedKeyId::external(ciphersuite, provider.rand(), b"known".to_vec())
            .expect("not enough randomness");
        let resumption = PreSharedKeyId::resumption(
            ciphersuite,
            provider.rand(),
            ResumptionPskUsage::Application,
            group_id.clone(),
            GroupEpoch::from(2),
        )
        .expect("not enough randomness");
        let psk_ids = vec![known, resumption];
        let loaded = load_psks(provider.psk_index(), &store, &group_id, &psk_ids)
            .expect("error loading psks");
        assert_eq!(loaded.len(), 2);

        let unknown = vec![PreSharedKeyId::external(
            ciphersuite,
            provider.rand(),
            b"unknown".to_vec(),
        )
        .expect("not enough randomness")];
        assert_eq!(
            load_psks(provider.psk_index(), &store, &group_id, &unknown),
            Err(PskError::KeyNotFound)
        );
        let other_group = vec![PreSharedKeyId::resumption(
            ciphersuite,
            provider.rand(),
            ResumptionPskUsage::Application,
            GroupId::from_slice(b"other"),
            GroupEpoch::from(2),
        )
        .expect("not enough randomness")];
        assert_eq!(
            load_psks(provider.psk_index(), &store, &group_id, &other_group),
            Err(PskError::KeyNotFound)
        );
    }

    #[apply(ciphersuites_and_providers)]
    fn proposal_rules(ciphersuite: Ciphersuite, provider: &impl CgkaProvider) {
        let reinit = PreSharedKeyId::resumption(
            ciphersuite,
            provider.rand(),
            ResumptionPskUsage::Reinit,
            GroupId::from_slice(b"group"),
            GroupEpoch::from(1),
        )
        .expect("not enough randomness");
        assert!(matches!(
            reinit.validate_in_proposal(ciphersuite),
            Err(PskError::UsageMismatch { .. })
        ));

        let short_nonce = PreSharedKeyId::new_with_nonce(
            Psk::External(ExternalPsk::new(b"id".to_vec())),
            vec![0u8; 3],
        );
        assert!(matches!(
            short_nonce.validate_in_proposal(ciphersuite),
            Err(PskError::NonceLengthMismatch { .. })
        ));

        let duplicate = vec![short_nonce.clone(), short_nonce];
        assert!(matches!(
            check_for_duplicates(&duplicate),
            Err(PskError::Duplicate { .. })
        ));
    }
}
