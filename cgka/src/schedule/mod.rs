//! # Key schedule
//!
//! The key schedule evolves in epochs, where in each epoch new key material is
//! injected.
//!
//! ```text
//!                  init_secret_[n-1]
//!                         |
//!                         V
//!    commit_secret -> KDF.Extract
//!                         |
//!                         V
//!                   ExpandWithLabel(., "joiner", GroupContext_[n], KDF.Nh)
//!                         |
//!                         V
//!                    joiner_secret
//!                         |
//!                         V
//! psk_secret (or 0) -> KDF.Extract
//!                         |
//!                         +--> DeriveSecret(., "welcome")
//!                         |    = welcome_secret
//!                         |
//!                         V
//!                   ExpandWithLabel(., "epoch", GroupContext_[n], KDF.Nh)
//!                         |
//!                         V
//!                    epoch_secret
//!                         |
//!                         +--> DeriveSecret(., <label>)
//!                         |    = <secret>
//!                         |
//!                         V
//!                   DeriveSecret(., "init")
//!                         |
//!                         V
//!                   init_secret_[n]
//! ```
//!
//! Every secret of the schedule has its own type so that secrets can't be
//! confused with one another and the schedule can't be derived out of order.
//!
//! The `joiner_secret` is both an intermediate and an output value: new
//! members receive it in the Welcome and start their schedule from there. The
//! [`KeySchedule`] therefore starts with the `joiner_secret`, the step before
//! it is [`JoinerSecret::new`].
//!
//! | secret                  | label            |
//! |:------------------------|:-----------------|
//! | `init_secret`           | "init"           |
//! | `sender_data_secret`    | "sender data"    |
//! | `encryption_secret`     | "encryption"     |
//! | `exporter_secret`       | "exporter"       |
//! | `epoch_authenticator`   | "authentication" |
//! | `external_secret`       | "external"       |
//! | `confirmation_key`      | "confirm"        |
//! | `membership_key`        | "membership"     |
//! | `resumption_psk`        | "resumption"     |

use cgka_traits::{
    crypto::CgkaCrypto,
    random::CgkaRand,
    types::{CryptoError, HpkeKeyPair, HpkePrivateKey, KemOutput},
};
use tls_codec::{TlsDeserialize, TlsSerialize, TlsSize};

use crate::{
    binary_tree::{LeafNodeIndex, TreeSize},
    ciphersuite::{AeadKey, AeadNonce, Ciphersuite, HpkePublicKey, Mac, Secret},
    error::LibraryError,
    framing::MembershipTag,
    messages::ConfirmationTag,
    tree::secret_tree::SecretTree,
};

pub mod errors;
pub(crate) mod message_secrets;
pub mod psk;

pub(crate) use errors::*;
pub(crate) use message_secrets::MessageSecrets;
pub use psk::{PreSharedKeyId, PskSecret, ResumptionPskStore};

/// The exporter label of the HPKE context used for external commits.
const EXTERNAL_INIT_EXPORTER_LABEL: &[u8] = b"MLS 1.0 external init secret";

/// The secret that results from a TreeKEM update path. The all-zero secret is
/// used by commits without a path.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitSecret {
    secret: Secret,
}

impl CommitSecret {
    /// The commit secret derived from the last path secret of an update path.
    pub(crate) fn new(secret: Secret) -> Self {
        Self { secret }
    }

    /// The commit secret of a commit without an update path.
    pub(crate) fn zero_secret(ciphersuite: Ciphersuite) -> Self {
        CommitSecret {
            secret: Secret::zero(ciphersuite),
        }
    }

    #[cfg(any(feature = "test-utils", test))]
    pub(crate) fn random(ciphersuite: Ciphersuite, rand: &impl CgkaRand) -> Self {
        Self {
            secret: Secret::random(ciphersuite, rand).expect("Not enough randomness."),
        }
    }

}

/// The `init_secret` of an epoch.
#[derive(Debug, Clone, PartialEq)]
pub struct InitSecret {
    secret: Secret,
}

impl InitSecret {
    /// Derive an `InitSecret` from an `EpochSecret`.
    fn new(
        crypto: &impl CgkaCrypto,
        ciphersuite: Ciphersuite,
        epoch_secret: &EpochSecret,
    ) -> Result<Self, CryptoError> {
        let secret = epoch_secret.secret.derive_secret(crypto, ciphersuite, "init")?;
        log_crypto!(trace, "Init secret: {:x?}", secret);
        Ok(InitSecret { secret })
    }

    /// Sample a fresh, random `InitSecret` for the first epoch of a group.
    pub(crate) fn random(
        ciphersuite: Ciphersuite,
        rand: &impl CgkaRand,
    ) -> Result<Self, CryptoError> {
        Ok(InitSecret {
            secret: Secret::random(ciphersuite, rand)?,
        })
    }

    /// Create an `InitSecret` for an external commit: an HPKE context is set up
    /// to the group's `external_pub` key and the init secret is exported from
    /// it. Returns the KEM output the group members need to derive the same
    /// secret.
    pub(crate) fn from_group_context(
        crypto: &impl CgkaCrypto,
        ciphersuite: Ciphersuite,
        external_pub: &HpkePublicKey,
    ) -> Result<(Self, KemOutput), CryptoError> {
        let (kem_output, raw_init_secret) = crypto.hpke_setup_sender_and_export(
            ciphersuite.hpke_config(),
            external_pub.as_slice(),
            &[],
            EXTERNAL_INIT_EXPORTER_LABEL,
            ciphersuite.hash_length(),
        )?;
        Ok((
            InitSecret {
                secret: Secret::from_slice(&raw_init_secret),
            },
            kem_output,
        ))
    }

    /// Derive the `InitSecret` of an external commit on the side of an
    /// existing member from the `kem_output` and the external private key.
    pub(crate) fn from_kem_output(
        crypto: &impl CgkaCrypto,
        ciphersuite: Ciphersuite,
        external_private_key: &HpkePrivateKey,
        kem_output: &[u8],
    ) -> Result<Self, CryptoError> {
        let raw_init_secret = crypto.hpke_setup_receiver_and_export(
            ciphersuite.hpke_config(),
            kem_output,
            external_private_key,
            &[],
            EXTERNAL_INIT_EXPORTER_LABEL,
            ciphersuite.hash_length(),
        )?;
        Ok(InitSecret {
            secret: Secret::from_slice(&raw_init_secret),
        })
    }
}

/// The `joiner_secret`, sent to new members in the Welcome.
#[derive(Debug, Clone, PartialEq, TlsSerialize, TlsDeserialize, TlsSize)]
pub struct JoinerSecret {
    secret: Secret,
}

impl JoinerSecret {
    /// Derive a `JoinerSecret` from the `CommitSecret` of a commit and the
    /// `InitSecret` of the previous epoch. The `serialized_group_context` is
    /// the context of the new epoch.
    pub fn new(
        crypto: &impl CgkaCrypto,
        ciphersuite: Ciphersuite,
        commit_secret: CommitSecret,
        init_secret: &InitSecret,
        serialized_group_context: &[u8],
    ) -> Result<Self, LibraryError> {
        let intermediate_secret = init_secret
            .secret
            .hkdf_extract(crypto, ciphersuite, &commit_secret.secret)
            .map_err(LibraryError::unexpected_crypto_error)?;
        let secret = intermediate_secret
            .kdf_expand_label(
                crypto,
                ciphersuite,
                "joiner",
                serialized_group_context,
                ciphersuite.hash_length(),
            )
            .map_err(LibraryError::unexpected_crypto_error)?;
        log_crypto!(trace, "Joiner secret: {:x?}", secret);
        Ok(JoinerSecret { secret })
    }
}

// Different states of the key schedule
#[derive(Debug, PartialEq, Eq)]
enum State {
    Initial,
    Context,
    Done,
}

/// The key schedule of one epoch, starting from the joiner secret.
///
/// [`KeySchedule::init`] mixes in the PSK secret, after which the welcome
/// secret is available. [`KeySchedule::add_context`] binds the group context
/// of the epoch and [`KeySchedule::epoch_secrets`] finally yields all secrets
/// of the epoch. Every step can only be done once and in this order.
pub struct KeySchedule {
    ciphersuite: Ciphersuite,
    intermediate_secret: Option<IntermediateSecret>,
    epoch_secret: Option<EpochSecret>,
    state: State,
}

impl KeySchedule {
    /// Initialize the key schedule and return it.
    pub fn init(
        ciphersuite: Ciphersuite,
        crypto: &impl CgkaCrypto,
        joiner_secret: &JoinerSecret,
        psk: PskSecret,
    ) -> Result<Self, LibraryError> {
        log::debug!("Initializing the key schedule with {:?} ...", ciphersuite);
        log_crypto!(
            trace,
            "  joiner_secret: {:x?}",
            joiner_secret.secret.as_slice()
        );
        let intermediate_secret = IntermediateSecret::new(crypto, ciphersuite, joiner_secret, psk)
            .map_err(LibraryError::unexpected_crypto_error)?;
        Ok(Self {
            ciphersuite,
            intermediate_secret: Some(intermediate_secret),
            epoch_secret: None,
            state: State::Initial,
        })
    }

    /// Derive the welcome secret.
    /// Note that this has to be called before the context is added.
    pub fn welcome(&self, crypto: &impl CgkaCrypto) -> Result<WelcomeSecret, LibraryError> {
        if self.state != State::Initial || self.intermediate_secret.is_none() {
            log::error!("Trying to derive a welcome secret while not in the initial state.");
            return Err(KeyScheduleError::InvalidState(ErrorState::Init).into());
        }

        // We can return a library error here, because there must be a mistake in the state machine
        let intermediate_secret = self
            .intermediate_secret
            .as_ref()
            .ok_or_else(|| LibraryError::custom("state machine error"))?;

        WelcomeSecret::new(crypto, self.ciphersuite, intermediate_secret)
            .map_err(LibraryError::unexpected_crypto_error)
    }

    /// Add the group context to the key schedule.
    pub fn add_context(
        &mut self,
        crypto: &impl CgkaCrypto,
        serialized_group_context: &[u8],
    ) -> Result<(), LibraryError> {
        log::trace!(
            "Adding context to key schedule. {:?}",
            serialized_group_context
        );
        if self.state != State::Initial || self.intermediate_secret.is_none() {
            log::error!(
                "Trying to add context to the key schedule while not in the initial state."
            );
            return Err(KeyScheduleError::InvalidState(ErrorState::Init).into());
        }
        self.state = State::Context;

        // We can return a library error here, because there must be a mistake in the state machine
        let intermediate_secret = self
            .intermediate_secret
            .take()
            .ok_or_else(|| LibraryError::custom("state machine error"))?;

        log_crypto!(
            trace,
            "  intermediate_secret: {:x?}",
            intermediate_secret.secret.as_slice()
        );

        self.epoch_secret = Some(
            EpochSecret::new(
                self.ciphersuite,
                crypto,
                intermediate_secret,
                serialized_group_context,
            )
            .map_err(LibraryError::unexpected_crypto_error)?,
        );
        Ok(())
    }

    /// Derive the epoch secrets.
    pub fn epoch_secrets(
        &mut self,
        crypto: &impl CgkaCrypto,
    ) -> Result<EpochSecrets, LibraryError> {
        if self.state != State::Context || self.epoch_secret.is_none() {
            log::error!("Trying to derive the epoch secrets while not in the right state.");
            return Err(KeyScheduleError::InvalidState(ErrorState::Context).into());
        }
        self.state = State::Done;

        let epoch_secret = self
            .epoch_secret
            .take()
            .ok_or_else(|| LibraryError::custom("state machine error"))?;

        EpochSecrets::new(crypto, self.ciphersuite, epoch_secret)
            .map_err(LibraryError::unexpected_crypto_error)
    }
}

/// The intermediate secret includes the optional PSK and is used to later
/// derive the welcome secret and epoch secret
struct IntermediateSecret {
    secret: Secret,
}

impl IntermediateSecret {
    /// Derive an `IntermediateSecret` from a `JoinerSecret` and a `PskSecret`.
    fn new(
        crypto: &impl CgkaCrypto,
        ciphersuite: Ciphersuite,
        joiner_secret: &JoinerSecret,
        psk: PskSecret,
    ) -> Result<Self, CryptoError> {
        log_crypto!(trace, "PSK input: {:x?}", psk.secret());
        let secret = joiner_secret
            .secret
            .hkdf_extract(crypto, ciphersuite, psk.secret())?;
        log_crypto!(trace, "Intermediate secret: {:x?}", secret);
        Ok(Self { secret })
    }
}

/// The welcome secret, used to encrypt the group info of a Welcome.
pub struct WelcomeSecret {
    ciphersuite: Ciphersuite,
    secret: Secret,
}

impl WelcomeSecret {
    /// Derive a `WelcomeSecret` from to decrypt a `Welcome` message.
    fn new(
        crypto: &impl CgkaCrypto,
        ciphersuite: Ciphersuite,
        intermediate_secret: &IntermediateSecret,
    ) -> Result<Self, CryptoError> {
        let secret = intermediate_secret
            .secret
            .derive_secret(crypto, ciphersuite, "welcome")?;
        log_crypto!(trace, "Welcome secret: {:x?}", secret);
        Ok(WelcomeSecret {
            ciphersuite,
            secret,
        })
    }

    /// Get the welcome key and nonce.
    ///
    /// ```text
    /// welcome_nonce = ExpandWithLabel(welcome_secret, "nonce", "", AEAD.Nn)
    /// welcome_key = ExpandWithLabel(welcome_secret, "key", "", AEAD.Nk)
    /// ```
    pub(crate) fn derive_welcome_key_nonce(
        self,
        crypto: &impl CgkaCrypto,
    ) -> Result<(AeadKey, AeadNonce), CryptoError> {
        let key_secret = self.secret.kdf_expand_label(
            crypto,
            self.ciphersuite,
            "key",
            b"",
            self.ciphersuite.aead_key_length(),
        )?;
        let nonce_secret = self.secret.kdf_expand_label(
            crypto,
            self.ciphersuite,
            "nonce",
            b"",
            self.ciphersuite.aead_nonce_length(),
        )?;
        Ok((
            AeadKey::from_secret(key_secret, self.ciphersuite),
            AeadNonce::from_secret(nonce_secret)?,
        ))
    }
}

/// An intermediate secret in the key schedule, the `EpochSecret` is used to
/// create an `EpochSecrets` object and is finally consumed when creating that
/// epoch's `InitSecret`.
struct EpochSecret {
    secret: Secret,
}

impl EpochSecret {
    /// Derive an `EpochSecret` from an `IntermediateSecret`
    fn new(
        ciphersuite: Ciphersuite,
        crypto: &impl CgkaCrypto,
        intermediate_secret: IntermediateSecret,
        serialized_group_context: &[u8],
    ) -> Result<Self, CryptoError> {
        let secret = intermediate_secret.secret.kdf_expand_label(
            crypto,
            ciphersuite,
            "epoch",
            serialized_group_context,
            ciphersuite.hash_length(),
        )?;
        log_crypto!(trace, "Epoch secret: {:x?}", secret);
        Ok(EpochSecret { secret })
    }
}

/// The `EncryptionSecret` is used to create a `SecretTree`.
#[derive(Debug, Clone, PartialEq)]
pub struct EncryptionSecret {
    secret: Secret,
}

impl EncryptionSecret {
    /// Derive an encryption secret from a reference to an `EpochSecret`.
    fn new(
        crypto: &impl CgkaCrypto,
        ciphersuite: Ciphersuite,
        epoch_secret: &EpochSecret,
    ) -> Result<Self, CryptoError> {
        Ok(EncryptionSecret {
            secret: epoch_secret
                .secret
                .derive_secret(crypto, ciphersuite, "encryption")?,
        })
    }

    /// Consume the `EncryptionSecret` and return the inner `Secret` value.
    pub(crate) fn consume_secret(self) -> Secret {
        self.secret
    }

    #[cfg(any(feature = "test-utils", test))]
    pub(crate) fn random(
        ciphersuite: Ciphersuite,
        rand: &impl CgkaRand,
    ) -> Result<Self, CryptoError> {
        Ok(EncryptionSecret {
            secret: Secret::random(ciphersuite, rand)?,
        })
    }
}

/// A secret that we can derive secrets from, that are used outside of the
/// group.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ExporterSecret {
    secret: Secret,
}

impl ExporterSecret {
    /// Derive an `ExporterSecret` from an `EpochSecret`.
    fn new(
        crypto: &impl CgkaCrypto,
        ciphersuite: Ciphersuite,
        epoch_secret: &EpochSecret,
    ) -> Result<Self, CryptoError> {
        let secret = epoch_secret
            .secret
            .derive_secret(crypto, ciphersuite, "exporter")?;
        Ok(ExporterSecret { secret })
    }

    /// Derive a `Secret` from the exporter secret.
    ///
    /// ```text
    /// MLS-Exporter(Label, Context, Length) =
    ///     ExpandWithLabel(DeriveSecret(exporter_secret, Label),
    ///                       "exported", Hash(Context), Length)
    /// ```
    pub(crate) fn derive_exported_secret(
        &self,
        ciphersuite: Ciphersuite,
        crypto: &impl CgkaCrypto,
        label: &str,
        context: &[u8],
        key_length: usize,
    ) -> Result<Vec<u8>, CryptoError> {
        let context_hash = &crypto.hash(ciphersuite.hash_algorithm(), context)?;
        Ok(self
            .secret
            .derive_secret(crypto, ciphersuite, label)?
            .kdf_expand_label(crypto, ciphersuite, "exported", context_hash, key_length)?
            .as_slice()
            .to_vec())
    }
}

/// The epoch authenticator: a value all members of an epoch agree on and that
/// can be compared out of band.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpochAuthenticator {
    secret: Secret,
}

impl EpochAuthenticator {
    /// Derive an `EpochAuthenticator` from an `EpochSecret`.
    fn new(
        crypto: &impl CgkaCrypto,
        ciphersuite: Ciphersuite,
        epoch_secret: &EpochSecret,
    ) -> Result<Self, CryptoError> {
        let secret = epoch_secret
            .secret
            .derive_secret(crypto, ciphersuite, "authentication")?;
        Ok(Self { secret })
    }

    /// Returns the authenticator as byte slice.
    pub fn as_slice(&self) -> &[u8] {
        self.secret.as_slice()
    }
}

/// A secret used when joining a group with an external Commit.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ExternalSecret {
    secret: Secret,
}

impl ExternalSecret {
    /// Derive an `ExternalSecret` from an `EpochSecret`.
    fn new(
        crypto: &impl CgkaCrypto,
        ciphersuite: Ciphersuite,
        epoch_secret: &EpochSecret,
    ) -> Result<Self, CryptoError> {
        let secret = epoch_secret
            .secret
            .derive_secret(crypto, ciphersuite, "external")?;
        Ok(Self { secret })
    }

    /// Derive the external key pair for this epoch.
    pub(crate) fn derive_external_keypair(
        &self,
        crypto: &impl CgkaCrypto,
        ciphersuite: Ciphersuite,
    ) -> Result<HpkeKeyPair, CryptoError> {
        crypto.derive_hpke_keypair(ciphersuite.hpke_config(), self.secret.as_slice())
    }
}

/// The confirmation key is used to calculate the `ConfirmationTag`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ConfirmationKey {
    secret: Secret,
}

impl ConfirmationKey {
    /// Derive a `ConfirmationKey` from an `EpochSecret`.
    fn new(
        crypto: &impl CgkaCrypto,
        ciphersuite: Ciphersuite,
        epoch_secret: &EpochSecret,
    ) -> Result<Self, CryptoError> {
        log::debug!("Computing confirmation key.");
        log_crypto!(
            trace,
            "  epoch_secret {:x?}",
            epoch_secret.secret.as_slice()
        );
        let secret = epoch_secret
            .secret
            .derive_secret(crypto, ciphersuite, "confirm")?;
        Ok(Self { secret })
    }

    /// Calculate a `ConfirmationTag` from the confirmed transcript hash.
    ///
    /// ```text
    /// confirmation_tag = MAC(confirmation_key, confirmed_transcript_hash)
    /// ```
    pub(crate) fn tag(
        &self,
        crypto: &impl CgkaCrypto,
        ciphersuite: Ciphersuite,
        confirmed_transcript_hash: &[u8],
    ) -> Result<ConfirmationTag, CryptoError> {
        log::debug!("Computing confirmation tag.");
        log_crypto!(trace, "  confirmation key {:x?}", self.secret.as_slice());
        log_crypto!(trace, "  transcript hash  {:x?}", confirmed_transcript_hash);
        Ok(ConfirmationTag(Mac::new(
            crypto,
            ciphersuite,
            &self.secret,
            confirmed_transcript_hash,
        )?))
    }
}

/// The membership key is used to calculate the `MembershipTag`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MembershipKey {
    secret: Secret,
}

impl MembershipKey {
    /// Derive a `MembershipKey` from an `EpochSecret`.
    fn new(
        crypto: &impl CgkaCrypto,
        ciphersuite: Ciphersuite,
        epoch_secret: &EpochSecret,
    ) -> Result<Self, CryptoError> {
        let secret = epoch_secret
            .secret
            .derive_secret(crypto, ciphersuite, "membership")?;
        Ok(Self { secret })
    }

    /// Calculate the membership tag of a public message over the encoded
    /// `AuthenticatedContentTBM`.
    pub(crate) fn tag(
        &self,
        crypto: &impl CgkaCrypto,
        ciphersuite: Ciphersuite,
        tbm_payload: &[u8],
    ) -> Result<MembershipTag, CryptoError> {
        Ok(MembershipTag(Mac::new(
            crypto,
            ciphersuite,
            &self.secret,
            tbm_payload,
        )?))
    }

    #[cfg(any(feature = "test-utils", test))]
    pub(crate) fn from_secret(secret: Secret) -> Self {
        Self { secret }
    }
}

/// The resumption PSK secret of an epoch.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ResumptionPskSecret {
    secret: Secret,
}

impl ResumptionPskSecret {
    /// Derive a `ResumptionPskSecret` from an `EpochSecret`.
    fn new(
        crypto: &impl CgkaCrypto,
        ciphersuite: Ciphersuite,
        epoch_secret: &EpochSecret,
    ) -> Result<Self, CryptoError> {
        let secret = epoch_secret
            .secret
            .derive_secret(crypto, ciphersuite, "resumption")?;
        Ok(Self { secret })
    }

    /// Return the inner secret.
    pub(crate) fn secret(&self) -> &Secret {
        &self.secret
    }

    #[cfg(any(feature = "test-utils", test))]
    pub(crate) fn random(ciphersuite: Ciphersuite, rand: &impl CgkaRand) -> Self {
        Self {
            secret: Secret::random(ciphersuite, rand).expect("Not enough randomness."),
        }
    }
}

/// The first `min(len(ciphertext), KDF.Nh)` bytes of a private message's
/// ciphertext, the context of the sender data key and nonce.
pub(crate) fn ciphertext_sample(ciphersuite: Ciphersuite, ciphertext: &[u8]) -> &[u8] {
    let sample_length = ciphersuite.hash_length();
    log::debug!("Getting ciphertext sample of length {:?}", sample_length);
    if ciphertext.len() <= sample_length {
        ciphertext
    } else {
        &ciphertext[0..sample_length]
    }
}

/// A key that can be used to derive an `AeadKey` and an `AeadNonce`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SenderDataSecret {
    secret: Secret,
}

impl SenderDataSecret {
    /// Derive an `ExporterSecret` from an `EpochSecret`.
    fn new(
        crypto: &impl CgkaCrypto,
        ciphersuite: Ciphersuite,
        epoch_secret: &EpochSecret,
    ) -> Result<Self, CryptoError> {
        let secret = epoch_secret
            .secret
            .derive_secret(crypto, ciphersuite, "sender data")?;
        Ok(SenderDataSecret { secret })
    }

    /// Derive a new AEAD key from a `SenderDataSecret`.
    pub(crate) fn derive_aead_key(
        &self,
        crypto: &impl CgkaCrypto,
        ciphersuite: Ciphersuite,
        ciphertext: &[u8],
    ) -> Result<AeadKey, CryptoError> {
        let ciphertext_sample = ciphertext_sample(ciphersuite, ciphertext);
        log::debug!(
            "SenderDataSecret::derive_aead_key ciphertext sample: {:x?}",
            ciphertext_sample
        );
        let secret = self.secret.kdf_expand_label(
            crypto,
            ciphersuite,
            "key",
            ciphertext_sample,
            ciphersuite.aead_key_length(),
        )?;
        Ok(AeadKey::from_secret(secret, ciphersuite))
    }

    /// Derive a new AEAD nonce from a `SenderDataSecret`.
    pub(crate) fn derive_aead_nonce(
        &self,
        crypto: &impl CgkaCrypto,
        ciphersuite: Ciphersuite,
        ciphertext: &[u8],
    ) -> Result<AeadNonce, CryptoError> {
        let ciphertext_sample = ciphertext_sample(ciphersuite, ciphertext);
        log::debug!(
            "SenderDataSecret::derive_aead_nonce ciphertext sample: {:x?}",
            ciphertext_sample
        );
        let nonce_secret = self.secret.kdf_expand_label(
            crypto,
            ciphersuite,
            "nonce",
            ciphertext_sample,
            ciphersuite.aead_nonce_length(),
        )?;
        AeadNonce::from_secret(nonce_secret)
    }
}

/// The secrets of an epoch derived from the epoch secret.
pub struct EpochSecrets {
    init_secret: InitSecret,
    sender_data_secret: SenderDataSecret,
    encryption_secret: EncryptionSecret,
    exporter_secret: ExporterSecret,
    epoch_authenticator: EpochAuthenticator,
    external_secret: ExternalSecret,
    confirmation_key: ConfirmationKey,
    membership_key: MembershipKey,
    resumption_psk: ResumptionPskSecret,
}

impl std::fmt::Debug for EpochSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EpochSecrets { *** }")
    }
}

impl EpochSecrets {
    /// Derive `EpochSecrets` from an `EpochSecret`, consuming it. The
    /// `InitSecret` of the next epoch is derived last.
    fn new(
        crypto: &impl CgkaCrypto,
        ciphersuite: Ciphersuite,
        epoch_secret: EpochSecret,
    ) -> Result<Self, CryptoError> {
        log::debug!(
            "Computing EpochSecrets from epoch secret with {:?}",
            ciphersuite
        );
        log_crypto!(
            trace,
            "  epoch_secret: {:x?}",
            epoch_secret.secret.as_slice()
        );
        let sender_data_secret = SenderDataSecret::new(crypto, ciphersuite, &epoch_secret)?;
        let encryption_secret = EncryptionSecret::new(crypto, ciphersuite, &epoch_secret)?;
        let exporter_secret = ExporterSecret::new(crypto, ciphersuite, &epoch_secret)?;
        let epoch_authenticator = EpochAuthenticator::new(crypto, ciphersuite, &epoch_secret)?;
        let external_secret = ExternalSecret::new(crypto, ciphersuite, &epoch_secret)?;
        let confirmation_key = ConfirmationKey::new(crypto, ciphersuite, &epoch_secret)?;
        let membership_key = MembershipKey::new(crypto, ciphersuite, &epoch_secret)?;
        let resumption_psk = ResumptionPskSecret::new(crypto, ciphersuite, &epoch_secret)?;
        let init_secret = InitSecret::new(crypto, ciphersuite, &epoch_secret)?;

        Ok(EpochSecrets {
            init_secret,
            sender_data_secret,
            encryption_secret,
            exporter_secret,
            epoch_authenticator,
            external_secret,
            confirmation_key,
            membership_key,
            resumption_psk,
        })
    }

    /// The epoch authenticator of the epoch.
    pub fn epoch_authenticator(&self) -> &EpochAuthenticator {
        &self.epoch_authenticator
    }

    /// The confirmation key, needed before the secrets are split.
    pub(crate) fn confirmation_key(&self) -> &ConfirmationKey {
        &self.confirmation_key
    }

    /// Splits the epoch secrets into the secrets the group keeps for the whole
    /// epoch and the [`MessageSecrets`] used to protect messages. The latter
    /// include the epoch's [`SecretTree`], built for a tree of `size` nodes
    /// with the own leaf at `own_index`.
    pub(crate) fn split_secrets(
        self,
        serialized_context: Vec<u8>,
        size: TreeSize,
        own_index: LeafNodeIndex,
    ) -> (GroupEpochSecrets, MessageSecrets) {
        let secret_tree = SecretTree::new(self.encryption_secret, size, own_index);
        (
            GroupEpochSecrets {
                init_secret: self.init_secret,
                exporter_secret: self.exporter_secret,
                epoch_authenticator: self.epoch_authenticator,
                external_secret: self.external_secret,
                resumption_psk: self.resumption_psk,
            },
            MessageSecrets::new(
                self.sender_data_secret,
                self.membership_key,
                self.confirmation_key,
                serialized_context,
                secret_tree,
            ),
        )
    }
}

/// The epoch secrets a group keeps for the whole epoch.
#[derive(Clone, PartialEq)]
pub(crate) struct GroupEpochSecrets {
    init_secret: InitSecret,
    exporter_secret: ExporterSecret,
    epoch_authenticator: EpochAuthenticator,
    external_secret: ExternalSecret,
    resumption_psk: ResumptionPskSecret,
}

impl std::fmt::Debug for GroupEpochSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("GroupEpochSecrets { *** }")
    }
}

impl GroupEpochSecrets {
    /// Init secret
    pub(crate) fn init_secret(&self) -> &InitSecret {
        &self.init_secret
    }

    /// Exporter secret
    pub(crate) fn exporter_secret(&self) -> &ExporterSecret {
        &self.exporter_secret
    }

    /// Epoch authenticator
    pub(crate) fn epoch_authenticator(&self) -> &EpochAuthenticator {
        &self.epoch_authenticator
    }

    /// External secret
    pub(crate) fn external_secret(&self) -> &ExternalSecret {
        &self.external_secret
    }

    /// Resumption psk
    pub(crate) fn resumption_psk(&self) -> &ResumptionPskSecret {
        &self.resumption_psk
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    fn schedule_secrets(
        ciphersuite: Ciphersuite,
        provider: &impl CgkaProvider,
        joiner_secret: &JoinerSecret,
        psk_secret: PskSecret,
        context: &[u8],
    ) -> (EpochSecrets, WelcomeSecret) {
        let mut key_schedule =
            KeySchedule::init(ciphersuite, provider.crypto(), joiner_secret, psk_secret)
                .expect("error initializing key schedule");
        let welcome_secret = key_schedule
            .welcome(provider.crypto())
            .expect("error deriving welcome secret");
        key_schedule
            .add_context(provider.crypto(), context)
            .expect("error adding context");
        let epoch_secrets = key_schedule
            .epoch_secrets(provider.crypto())
            .expect("error deriving epoch secrets");
        (epoch_secrets, welcome_secret)
    }

    #[apply(ciphersuites_and_providers)]
    fn schedule_is_deterministic(ciphersuite: Ciphersuite, provider: &impl CgkaProvider) {
        let _ = pretty_env_logger::try_init();
        let init_secret =
            InitSecret::random(ciphersuite, provider.rand()).expect("not enough randomness");
        let commit_secret = CommitSecret::random(ciphersuite, provider.rand());
        let joiner_secret = JoinerSecret::new(
            provider.crypto(),
            ciphersuite,
            commit_secret,
            &init_secret,
            b"context",
        )
        .expect("error deriving joiner secret");

        let (first, first_welcome) = schedule_secrets(
            ciphersuite,
            provider,
            &joiner_secret,
            PskSecret::zero(ciphersuite),
            b"context",
        );
        let (second, second_welcome) = schedule_secrets(
            ciphersuite,
            provider,
            &joiner_secret,
            PskSecret::zero(ciphersuite),
            b"context",
        );
        assert_eq!(first.epoch_authenticator(), second.epoch_authenticator());
        assert_eq!(first.init_secret, second.init_secret);
        assert_eq!(
            first_welcome
                .derive_welcome_key_nonce(provider.crypto())
                .expect("error deriving welcome key"),
            second_welcome
                .derive_welcome_key_nonce(provider.crypto())
                .expect("error deriving welcome key")
        );

        // A different context leads to a different epoch.
        let (other, _) = schedule_secrets(
            ciphersuite,
            provider,
            &joiner_secret,
            PskSecret::zero(ciphersuite),
            b"other context",
        );
        assert_ne!(first.epoch_authenticator(), other.epoch_authenticator());
        assert_ne!(first.init_secret, other.init_secret);
    }

    #[apply(ciphersuites_and_providers)]
    fn state_machine_order(ciphersuite: Ciphersuite, provider: &impl CgkaProvider) {
        let _ = pretty_env_logger::try_init();
        let init_secret =
            InitSecret::random(ciphersuite, provider.rand()).expect("not enough randomness");
        let joiner_secret = JoinerSecret::new(
            provider.crypto(),
            ciphersuite,
            CommitSecret::zero_secret(ciphersuite),
            &init_secret,
            b"context",
        )
        .expect("error deriving joiner secret");
        let mut key_schedule = KeySchedule::init(
            ciphersuite,
            provider.crypto(),
            &joiner_secret,
            PskSecret::zero(ciphersuite),
        )
        .expect("error initializing key schedule");

        // No epoch secrets before the context was added.
        assert!(key_schedule.epoch_secrets(provider.crypto()).is_err());
        key_schedule
            .add_context(provider.crypto(), b"context")
            .expect("error adding context");
        // The welcome secret and the context are only available once.
        assert!(key_schedule.welcome(provider.crypto()).is_err());
        assert!(key_schedule
            .add_context(provider.crypto(), b"context")
            .is_err());
        assert!(key_schedule.epoch_secrets(provider.crypto()).is_ok());
        assert!(key_schedule.epoch_secrets(provider.crypto()).is_err());
    }

    #[apply(ciphersuites_and_providers)]
    fn exporter_and_external_init(ciphersuite: Ciphersuite, provider: &impl CgkaProvider) {
        let _ = pretty_env_logger::try_init();
        let init_secret =
            InitSecret::random(ciphersuite, provider.rand()).expect("not enough randomness");
        let joiner_secret = JoinerSecret::new(
            provider.crypto(),
            ciphersuite,
            CommitSecret::random(ciphersuite, provider.rand()),
            &init_secret,
            b"context",
        )
        .expect("error deriving joiner secret");
        let (epoch_secrets, _) = schedule_secrets(
            ciphersuite,
            provider,
            &joiner_secret,
            PskSecret::zero(ciphersuite),
            b"context",
        );
        let exported = epoch_secrets
            .exporter_secret
            .derive_exported_secret(ciphersuite, provider.crypto(), "label", b"ctx", 42)
            .expect("error exporting");
        assert_eq!(exported.len(), 42);
        let other = epoch_secrets
            .exporter_secret
            .derive_exported_secret(ciphersuite, provider.crypto(), "label", b"other", 42)
            .expect("error exporting");
        assert_ne!(exported, other);

        // A joiner and the group derive the same init secret.
        let external_key_pair = epoch_secrets
            .external_secret
            .derive_external_keypair(provider.crypto(), ciphersuite)
            .expect("error deriving external key pair");
        let (joiner_init_secret, kem_output) = InitSecret::from_group_context(
            provider.crypto(),
            ciphersuite,
            &HpkePublicKey::from(external_key_pair.public.clone()),
        )
        .expect("error setting up sender");
        let member_init_secret = InitSecret::from_kem_output(
            provider.crypto(),
            ciphersuite,
            &external_key_pair.private,
            &kem_output,
        )
        .expect("error setting up receiver");
        assert_eq!(joiner_init_secret, member_init_secret);
    }
}
