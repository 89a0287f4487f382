//! Prelude for the CGKA crate.
//! Include this to get access to all the public functions of the crate.

pub use crate::group::{
    apply_proposals, ApplyProposalsResult, CommitOutcome, CommitParams, CreateCommitResult,
    GroupContext, GroupEpoch, GroupId, GroupLifecycle, GroupState, Member, ProcessedMessage,
    ProcessedMessageContent, QueuedProposal,
};
// Errors
pub use crate::group::errors::{
    CreateCommitError, CreateGroupError, CreateMessageError, ExportSecretError,
    ExternalCommitError, ProcessMessageError, ProposalValidationError, ProposeError,
    StageCommitError, WelcomeError,
};
pub use crate::error::{ErrorCategory, ErrorKind, LibraryError};

// Indexes
pub use crate::binary_tree::LeafNodeIndex;

// PSKs
pub use crate::schedule::psk::{
    ExternalPsk, PreSharedKeyId, Psk, ResumptionPsk, ResumptionPskUsage,
};
pub use crate::schedule::{errors::PskError, EpochAuthenticator};

pub use crate::ciphersuite::{Ciphersuite, HpkePublicKey, SignatureScheme};
pub use crate::config::{
    ClientConfig, GroupConfig, SenderRatchetConfiguration, WireFormatPolicy,
    MIXED_PLAINTEXT_WIRE_FORMAT_POLICY, PURE_CIPHERTEXT_WIRE_FORMAT_POLICY,
    PURE_PLAINTEXT_WIRE_FORMAT_POLICY,
};
pub use crate::credentials::{Credential, CredentialType, CredentialWithKey, SignatureKeyPair};
pub use crate::extensions::{
    ApplicationIdExtension, Extension, ExtensionType, Extensions, ExternalPubExtension,
    RatchetTreeExtension, RequiredCapabilitiesExtension, UnknownExtension,
};
pub use crate::framing::{
    errors::*, ContentType, MlsMessage, MlsMessageBody, PrivateMessage, PublicMessage, Sender,
    WireFormat,
};
pub use crate::key_packages::{
    KeyPackage, KeyPackageBuilder, KeyPackageBundle, KeyPackageNewError, KeyPackageVerifyError,
    Lifetime,
};
pub use crate::messages::{
    group_info::GroupInfo,
    proposals::{
        AddProposal, ExternalInitProposal, GroupContextExtensionProposal, PreSharedKeyProposal,
        Proposal, ProposalType, ReInitProposal, RemoveProposal, UpdateProposal,
    },
    Commit, Welcome,
};
pub use crate::treesync::{
    node::{leaf_node::Capabilities, LeafNode, Node, ParentNode},
    RatchetTree,
};
pub use crate::versions::ProtocolVersion;

// TLS codec traits
pub use tls_codec::{
    Deserialize as TlsDeserializeTrait, Serialize as TlsSerializeTrait, Size as TlsSizeTrait,
};
