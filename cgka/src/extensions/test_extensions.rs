//! # Extensions Unit tests
//! Some basic unit tests for extensions
//! Proper testing is done through the public APIs.

use tls_codec::{Deserialize, Serialize};

use super::*;
use crate::{
    config::GroupConfig,
    credentials::CredentialType,
    group::{CommitParams, GroupId, GroupState},
    messages::proposals::{AddProposal, Proposal, ProposalType},
    test_utils::*,
};

#[test]
fn application_id() {
    let data = &[6u8, 1, 2, 3, 4, 5, 6];
    let application_id = ApplicationIdExtension::new(&data[1..]);

    let application_id_from_bytes = ApplicationIdExtension::tls_deserialize(&mut (data as &[u8]))
        .expect("An unexpected error occurred.");
    assert_eq!(application_id, application_id_from_bytes);
    assert_eq!(application_id.as_slice(), &data[1..]);

    let serialized_extension_struct = application_id
        .tls_serialize_detached()
        .expect("An unexpected error occurred.");
    assert_eq!(&data[..], &serialized_extension_struct);
}

#[test]
fn extension_encoding() {
    let extensions = Extensions::from_vec(vec![
        Extension::ApplicationId(ApplicationIdExtension::new(b"app")),
        Extension::RequiredCapabilities(RequiredCapabilitiesExtension::new(
            &[ExtensionType::Unknown(0xff00)],
            &[ProposalType::Add],
            &[CredentialType::Basic],
        )),
        Extension::Unknown(0xff01, UnknownExtension(vec![1, 2, 3])),
    ])
    .expect("duplicate extensions");

    let encoded = extensions
        .tls_serialize_detached()
        .expect("error encoding extensions");
    let decoded =
        Extensions::tls_deserialize(&mut encoded.as_slice()).expect("error decoding extensions");
    assert_eq!(extensions, decoded);
    assert_eq!(
        decoded
            .required_capabilities()
            .expect("missing required capabilities")
            .extension_types(),
        &[ExtensionType::Unknown(0xff00)]
    );
    assert!(decoded.contains(ExtensionType::Unknown(0xff01)));
    assert_eq!(
        decoded.application_id().map(|e| e.as_slice()),
        Some(&b"app"[..])
    );
}

#[test]
fn duplicate_extensions() {
    let app_id = Extension::ApplicationId(ApplicationIdExtension::new(b"app"));
    assert_eq!(
        Extensions::from_vec(vec![app_id.clone(), app_id.clone()]),
        Err(InvalidExtensionError::Duplicate)
    );

    let mut extensions = Extensions::single(app_id.clone());
    assert_eq!(
        extensions.add(app_id.clone()),
        Err(InvalidExtensionError::Duplicate)
    );
    let replaced = extensions.add_or_replace(Extension::ApplicationId(
        ApplicationIdExtension::new(b"other app"),
    ));
    assert_eq!(replaced, Some(app_id));
    assert_eq!(extensions.len(), 1);

    // Duplicates are rejected on the wire as well
    let mut encoded = Vec::new();
    vec![
        Extension::ApplicationId(ApplicationIdExtension::new(b"a")),
        Extension::ApplicationId(ApplicationIdExtension::new(b"b")),
    ]
    .tls_serialize(&mut encoded)
    .expect("error encoding extensions");
    assert!(Extensions::tls_deserialize(&mut encoded.as_slice()).is_err());
}

#[test]
fn extension_types() {
    for extension_type in [
        ExtensionType::ApplicationId,
        ExtensionType::RatchetTree,
        ExtensionType::RequiredCapabilities,
        ExtensionType::ExternalPub,
        ExtensionType::Unknown(0xf0f0),
    ] {
        assert_eq!(ExtensionType::from(u16::from(extension_type)), extension_type);
    }
    assert!(!ExtensionType::Unknown(0xf0f0).is_default());
    assert_eq!(
        ExtensionType::RatchetTree.is_valid_in_leaf_node(),
        Some(false)
    );
    assert_eq!(
        ExtensionType::ApplicationId.is_valid_in_leaf_node(),
        Some(true)
    );
    assert_eq!(ExtensionType::Unknown(7).is_valid_in_leaf_node(), None);
}

// This tests the ratchet tree extension to deliver the public ratcheting tree
// in-band
#[apply(ciphersuites_and_providers)]
fn ratchet_tree_extension(ciphersuite: Ciphersuite, provider: &impl CgkaProvider) {
    let _ = pretty_env_logger::try_init();
    let config = GroupConfig::builder()
        .ciphersuite(ciphersuite)
        .use_ratchet_tree_extension(true)
        .build();

    let (alice_credential, alice_signer) =
        generate_credential_with_key("Alice", ciphersuite, provider);
    let (bob_credential, bob_signer) = generate_credential_with_key("Bob", ciphersuite, provider);
    let bob_key_package_bundle =
        generate_key_package(ciphersuite, provider, &bob_signer, bob_credential);

    // === Alice creates a group with the ratchet tree extension ===
    let alice_group = GroupState::create_group(
        provider,
        config.clone(),
        GroupId::random(provider.rand()).expect("not enough randomness"),
        alice_credential,
        alice_signer,
    )
    .expect("Error creating group.");

    // === Alice adds Bob ===
    let params = CommitParams::builder()
        .inline_proposals(vec![Proposal::Add(AddProposal {
            key_package: bob_key_package_bundle.key_package().clone(),
        })])
        .build();
    let result = alice_group
        .create_commit(provider, params)
        .expect("Error creating commit");
    let group_info = result
        .group_info
        .clone()
        .expect("missing group info")
        .into_group_info()
        .expect("expected a group info");
    let ratchet_tree = group_info
        .extensions()
        .ratchet_tree()
        .expect("missing ratchet tree extension");
    assert_eq!(ratchet_tree.nodes(), result.state.export_ratchet_tree());
    assert!(group_info.extensions().external_pub().is_some());

    let welcome = result
        .welcome
        .expect("An unexpected error occurred.")
        .into_welcome()
        .expect("expected a welcome");
    let bob_group = GroupState::join_group(
        provider,
        config,
        welcome,
        None,
        bob_key_package_bundle,
        bob_signer,
    )
    .expect("Error joining group.");

    // Make sure the group state is the same
    assert_eq!(
        result.state.export_ratchet_tree(),
        bob_group.export_ratchet_tree()
    );
    assert_eq!(
        result.state.epoch_authenticator(),
        bob_group.epoch_authenticator()
    );
}
