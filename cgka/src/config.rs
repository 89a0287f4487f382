//! # Configuration
//!
//! [`GroupConfig`] holds the per-group policy a member applies to its own
//! state: ciphersuite, wire format policy, padding, how many past epochs can
//! still be decrypted, whether the ratchet tree and the external public key
//! are published in the `GroupInfo`, and the sender ratchet window.
//!
//! [`ClientConfig`] holds the policy of a client independent of a group: the
//! longest key package lifetime it accepts, how it compares key packages and
//! the capabilities it advertises.
//!
//! Both are serde-serialisable and built with builders:
//!
//! ```
//! use cgka::config::*;
//!
//! let config = GroupConfig::builder()
//!     .padding_size(64)
//!     .max_past_epochs(5)
//!     .wire_format_policy(PURE_CIPHERTEXT_WIRE_FORMAT_POLICY)
//!     .build();
//! assert_eq!(config.max_past_epochs(), 5);
//! ```

use serde::{Deserialize, Serialize};

use crate::{
    ciphersuite::Ciphersuite,
    extensions::RequiredCapabilitiesExtension,
    framing::WireFormat,
    key_packages::{KeyPackage, DEFAULT_KEY_PACKAGE_LIFETIME_SECONDS},
    treesync::node::leaf_node::Capabilities,
};

pub use crate::tree::sender_ratchet::SenderRatchetConfiguration;

/// Default number of past epochs for which application messages can still be
/// decrypted.
pub const DEFAULT_MAX_PAST_EPOCHS: usize = 3;

/// Default number of resumption secrets a group keeps.
pub const DEFAULT_MAX_RESUMPTION_PSKS: usize = 10;

/// Decides whether outgoing handshake messages are sent as public or as
/// private messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutgoingWireFormatPolicy {
    /// Handshake messages are always sent as `PublicMessage`.
    AlwaysPlaintext,
    /// Handshake messages are always sent as `PrivateMessage`.
    AlwaysCiphertext,
}

/// Decides which wire formats are accepted for incoming handshake messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IncomingWireFormatPolicy {
    /// Only `PublicMessage` handshake messages are accepted.
    AlwaysPlaintext,
    /// Only `PrivateMessage` handshake messages are accepted.
    AlwaysCiphertext,
    /// Both wire formats are accepted.
    Mixed,
}

impl IncomingWireFormatPolicy {
    pub(crate) fn is_compatible(&self, wire_format: WireFormat) -> bool {
        match self {
            IncomingWireFormatPolicy::AlwaysPlaintext => wire_format == WireFormat::PublicMessage,
            IncomingWireFormatPolicy::AlwaysCiphertext => {
                wire_format == WireFormat::PrivateMessage
            }
            IncomingWireFormatPolicy::Mixed => matches!(
                wire_format,
                WireFormat::PublicMessage | WireFormat::PrivateMessage
            ),
        }
    }
}

/// Wire format policy for handshake messages. Application messages are always
/// sent as `PrivateMessage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireFormatPolicy {
    outgoing: OutgoingWireFormatPolicy,
    incoming: IncomingWireFormatPolicy,
}

impl WireFormatPolicy {
    /// Create a new wire format policy.
    pub const fn new(
        outgoing: OutgoingWireFormatPolicy,
        incoming: IncomingWireFormatPolicy,
    ) -> Self {
        Self { outgoing, incoming }
    }

    /// The policy for outgoing handshake messages.
    pub fn outgoing(&self) -> OutgoingWireFormatPolicy {
        self.outgoing
    }

    /// The policy for incoming handshake messages.
    pub fn incoming(&self) -> IncomingWireFormatPolicy {
        self.incoming
    }
}

impl Default for WireFormatPolicy {
    fn default() -> Self {
        MIXED_PLAINTEXT_WIRE_FORMAT_POLICY
    }
}

/// Send and accept only public handshake messages.
pub const PURE_PLAINTEXT_WIRE_FORMAT_POLICY: WireFormatPolicy = WireFormatPolicy::new(
    OutgoingWireFormatPolicy::AlwaysPlaintext,
    IncomingWireFormatPolicy::AlwaysPlaintext,
);

/// Send and accept only private handshake messages.
pub const PURE_CIPHERTEXT_WIRE_FORMAT_POLICY: WireFormatPolicy = WireFormatPolicy::new(
    OutgoingWireFormatPolicy::AlwaysCiphertext,
    IncomingWireFormatPolicy::AlwaysCiphertext,
);

/// Send public handshake messages and accept both.
pub const MIXED_PLAINTEXT_WIRE_FORMAT_POLICY: WireFormatPolicy = WireFormatPolicy::new(
    OutgoingWireFormatPolicy::AlwaysPlaintext,
    IncomingWireFormatPolicy::Mixed,
);

/// Send private handshake messages and accept both.
pub const MIXED_CIPHERTEXT_WIRE_FORMAT_POLICY: WireFormatPolicy = WireFormatPolicy::new(
    OutgoingWireFormatPolicy::AlwaysCiphertext,
    IncomingWireFormatPolicy::Mixed,
);

/// Compares two key packages. Used to detect an Add of a client that is
/// already being added.
pub type KeyPackageEqualityFn = fn(&KeyPackage, &KeyPackage) -> bool;

/// The key package comparator of a [`ClientConfig`].
///
/// Function pointers can't be serialized. A deserialized config always
/// carries the default comparator.
#[derive(Clone, Copy)]
pub struct KeyPackageEquality(KeyPackageEqualityFn);

impl KeyPackageEquality {
    pub fn new(f: KeyPackageEqualityFn) -> Self {
        Self(f)
    }

    pub(crate) fn equal(&self, a: &KeyPackage, b: &KeyPackage) -> bool {
        (self.0)(a, b)
    }
}

impl std::fmt::Debug for KeyPackageEquality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("KeyPackageEquality")
    }
}

fn same_signature_key(a: &KeyPackage, b: &KeyPackage) -> bool {
    a.leaf_node().signature_key() == b.leaf_node().signature_key()
}

impl Default for KeyPackageEquality {
    fn default() -> Self {
        Self(same_signature_key)
    }
}

/// Client wide policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub(crate) max_key_package_lifetime: u64,
    #[serde(skip)]
    pub(crate) key_package_equality: KeyPackageEquality,
    pub(crate) capabilities: Capabilities,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_key_package_lifetime: DEFAULT_KEY_PACKAGE_LIFETIME_SECONDS,
            key_package_equality: KeyPackageEquality::default(),
            capabilities: Capabilities::default(),
        }
    }
}

impl ClientConfig {
    /// Returns a builder for [`ClientConfig`].
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    /// The longest key package lifetime (in seconds) this client accepts.
    pub fn max_key_package_lifetime(&self) -> u64 {
        self.max_key_package_lifetime
    }

    /// The capabilities put into this client's leaf nodes.
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Compare two key packages with the configured comparator.
    pub fn key_packages_equal(&self, a: &KeyPackage, b: &KeyPackage) -> bool {
        self.key_package_equality.equal(a, b)
    }
}

/// Builder for a [`ClientConfig`].
#[derive(Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
        }
    }

    pub fn max_key_package_lifetime(mut self, seconds: u64) -> Self {
        self.config.max_key_package_lifetime = seconds;
        self
    }

    pub fn key_package_equality(mut self, f: KeyPackageEqualityFn) -> Self {
        self.config.key_package_equality = KeyPackageEquality::new(f);
        self
    }

    pub fn capabilities(mut self, capabilities: Capabilities) -> Self {
        self.config.capabilities = capabilities;
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}

/// Per-group policy of a member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupConfig {
    pub(crate) ciphersuite: Ciphersuite,
    pub(crate) wire_format_policy: WireFormatPolicy,
    pub(crate) padding_size: usize,
    pub(crate) max_past_epochs: usize,
    pub(crate) use_ratchet_tree_extension: bool,
    pub(crate) publish_external_pub: bool,
    pub(crate) sender_ratchet_configuration: SenderRatchetConfiguration,
    pub(crate) max_resumption_psks: usize,
    pub(crate) required_capabilities: RequiredCapabilitiesExtension,
    pub(crate) client_config: ClientConfig,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            ciphersuite: Ciphersuite::MLS_128_DHKEMX25519_AES128GCM_SHA256_Ed25519,
            wire_format_policy: WireFormatPolicy::default(),
            padding_size: 0,
            max_past_epochs: DEFAULT_MAX_PAST_EPOCHS,
            use_ratchet_tree_extension: false,
            publish_external_pub: true,
            sender_ratchet_configuration: SenderRatchetConfiguration::default(),
            max_resumption_psks: DEFAULT_MAX_RESUMPTION_PSKS,
            required_capabilities: RequiredCapabilitiesExtension::default(),
            client_config: ClientConfig::default(),
        }
    }
}

impl GroupConfig {
    /// Returns a builder for [`GroupConfig`].
    pub fn builder() -> GroupConfigBuilder {
        GroupConfigBuilder::new()
    }

    pub fn ciphersuite(&self) -> Ciphersuite {
        self.ciphersuite
    }

    pub fn wire_format_policy(&self) -> WireFormatPolicy {
        self.wire_format_policy
    }

    /// Private message content is padded to a multiple of this many bytes.
    /// `0` disables padding.
    pub fn padding_size(&self) -> usize {
        self.padding_size
    }

    pub fn max_past_epochs(&self) -> usize {
        self.max_past_epochs
    }

    pub fn use_ratchet_tree_extension(&self) -> bool {
        self.use_ratchet_tree_extension
    }

    pub fn publish_external_pub(&self) -> bool {
        self.publish_external_pub
    }

    pub fn sender_ratchet_configuration(&self) -> &SenderRatchetConfiguration {
        &self.sender_ratchet_configuration
    }

    pub fn max_resumption_psks(&self) -> usize {
        self.max_resumption_psks
    }

    /// Required capabilities put into the group context of a new group.
    pub fn required_capabilities(&self) -> &RequiredCapabilitiesExtension {
        &self.required_capabilities
    }

    pub fn client_config(&self) -> &ClientConfig {
        &self.client_config
    }
}

/// Builder for a [`GroupConfig`].
#[derive(Default)]
pub struct GroupConfigBuilder {
    config: GroupConfig,
}

impl GroupConfigBuilder {
    pub fn new() -> Self {
        GroupConfigBuilder {
            config: GroupConfig::default(),
        }
    }

    pub fn ciphersuite(mut self, ciphersuite: Ciphersuite) -> Self {
        self.config.ciphersuite = ciphersuite;
        self
    }

    pub fn wire_format_policy(mut self, wire_format_policy: WireFormatPolicy) -> Self {
        self.config.wire_format_policy = wire_format_policy;
        self
    }

    pub fn padding_size(mut self, padding_size: usize) -> Self {
        self.config.padding_size = padding_size;
        self
    }

    pub fn max_past_epochs(mut self, max_past_epochs: usize) -> Self {
        self.config.max_past_epochs = max_past_epochs;
        self
    }

    pub fn use_ratchet_tree_extension(mut self, use_ratchet_tree_extension: bool) -> Self {
        self.config.use_ratchet_tree_extension = use_ratchet_tree_extension;
        self
    }

    pub fn publish_external_pub(mut self, publish_external_pub: bool) -> Self {
        self.config.publish_external_pub = publish_external_pub;
        self
    }

    pub fn sender_ratchet_configuration(
        mut self,
        sender_ratchet_configuration: SenderRatchetConfiguration,
    ) -> Self {
        self.config.sender_ratchet_configuration = sender_ratchet_configuration;
        self
    }

    pub fn max_resumption_psks(mut self, max_resumption_psks: usize) -> Self {
        self.config.max_resumption_psks = max_resumption_psks;
        self
    }

    pub fn required_capabilities(
        mut self,
        required_capabilities: RequiredCapabilitiesExtension,
    ) -> Self {
        self.config.required_capabilities = required_capabilities;
        self
    }

    pub fn client_config(mut self, client_config: ClientConfig) -> Self {
        self.config.client_config = client_config;
        self
    }

    pub fn build(self) -> GroupConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_config_serde_round_trip() {
        let config = GroupConfig::builder()
            .ciphersuite(Ciphersuite::MLS_128_DHKEMX25519_CHACHA20POLY1305_SHA256_Ed25519)
            .padding_size(32)
            .max_past_epochs(7)
            .use_ratchet_tree_extension(true)
            .sender_ratchet_configuration(SenderRatchetConfiguration::new(10, 2000))
            .wire_format_policy(PURE_CIPHERTEXT_WIRE_FORMAT_POLICY)
            .build();

        let serialized = serde_json::to_string(&config).expect("error serializing config");
        let decoded: GroupConfig =
            serde_json::from_str(&serialized).expect("error deserializing config");

        assert_eq!(decoded.ciphersuite(), config.ciphersuite());
        assert_eq!(decoded.padding_size(), 32);
        assert_eq!(decoded.max_past_epochs(), 7);
        assert!(decoded.use_ratchet_tree_extension());
        assert_eq!(
            decoded.sender_ratchet_configuration(),
            &SenderRatchetConfiguration::new(10, 2000)
        );
        assert_eq!(
            decoded.wire_format_policy(),
            PURE_CIPHERTEXT_WIRE_FORMAT_POLICY
        );
    }

    #[test]
    fn defaults() {
        let config = GroupConfig::default();
        assert_eq!(config.max_past_epochs(), DEFAULT_MAX_PAST_EPOCHS);
        assert_eq!(
            config.sender_ratchet_configuration().out_of_order_tolerance(),
            5
        );
        assert_eq!(
            config
                .sender_ratchet_configuration()
                .maximum_forward_distance(),
            1000
        );
        assert_eq!(
            config.client_config().max_key_package_lifetime(),
            DEFAULT_KEY_PACKAGE_LIFETIME_SECONDS
        );
        assert!(IncomingWireFormatPolicy::Mixed.is_compatible(WireFormat::PrivateMessage));
        assert!(!IncomingWireFormatPolicy::AlwaysPlaintext.is_compatible(WireFormat::Welcome));
    }
}
