use cgka::{prelude::*, test_utils::*};

fn transport(message: &MlsMessage) -> MlsMessage {
    let bytes = message
        .tls_serialize_detached()
        .expect("error encoding message");
    MlsMessage::tls_deserialize(&mut bytes.as_slice()).expect("error decoding message")
}

fn exported_tree(state: &GroupState) -> RatchetTree {
    let bytes = state
        .export_ratchet_tree()
        .tls_serialize_detached()
        .expect("error encoding tree");
    let nodes = Vec::<Option<Node>>::tls_deserialize(&mut bytes.as_slice())
        .expect("error decoding tree");
    RatchetTree::from_nodes(nodes).expect("invalid tree")
}

fn exported_group_info(
    provider: &impl CgkaProvider,
    state: &GroupState,
    with_ratchet_tree: bool,
) -> GroupInfo {
    let message = state
        .export_group_info(provider.crypto(), with_ratchet_tree)
        .expect("error exporting group info");
    transport(&message)
        .into_group_info()
        .expect("expected a group info")
}

fn process(provider: &impl CgkaProvider, state: GroupState, message: &MlsMessage) -> GroupState {
    let (state, processed) = state
        .process_message(provider, transport(message))
        .expect("error processing message");
    assert!(matches!(
        processed.into_content(),
        ProcessedMessageContent::Commit { .. }
    ));
    state
}

fn assert_same_epoch(provider: &impl CgkaProvider, states: &[&GroupState]) {
    let secret = |state: &GroupState| {
        state
            .export_secret(provider.crypto(), "external", &[], 16)
            .expect("error exporting secret")
    };
    for state in &states[1..] {
        assert_eq!(state.epoch(), states[0].epoch());
        assert_eq!(state.epoch_authenticator(), states[0].epoch_authenticator());
        assert_eq!(state.export_ratchet_tree(), states[0].export_ratchet_tree());
        assert_eq!(secret(state), secret(states[0]));
    }
}

// Charlie joins a group of Alice and Bob without a Welcome. The group info
// and the ratchet tree travel separately.
#[apply(ciphersuites_and_providers)]
fn external_join(ciphersuite: Ciphersuite, provider: &impl CgkaProvider) {
    let _ = pretty_env_logger::try_init();
    let config = GroupConfig::builder().ciphersuite(ciphersuite).build();
    let (alice_credential, alice_signer) =
        generate_credential_with_key("Alice", ciphersuite, provider);
    let (bob_credential, bob_signer) = generate_credential_with_key("Bob", ciphersuite, provider);
    let bob_key_package = generate_key_package(ciphersuite, provider, &bob_signer, bob_credential);

    let alice = GroupState::create_group(
        provider,
        config.clone(),
        GroupId::from_slice(b"external commit group"),
        alice_credential,
        alice_signer,
    )
    .expect("Error creating group.");
    let result = alice
        .create_commit(
            provider,
            CommitParams::builder()
                .inline_proposals(vec![Proposal::Add(AddProposal::new(
                    bob_key_package.key_package().clone(),
                ))])
                .build(),
        )
        .expect("error creating commit");
    let alice = result.state;
    let bob = GroupState::join_group(
        provider,
        config.clone(),
        transport(&result.welcome.expect("missing welcome"))
            .into_welcome()
            .expect("expected a welcome"),
        Some(exported_tree(&alice)),
        bob_key_package,
        bob_signer,
    )
    .expect("Error joining group.");

    // Without the tree the group info alone is not enough
    let group_info = exported_group_info(provider, &bob, false);
    let (charlie_credential, charlie_signer) =
        generate_credential_with_key("Charlie", ciphersuite, provider);
    assert_eq!(
        GroupState::join_group_external(
            provider,
            config.clone(),
            group_info.clone(),
            None,
            charlie_credential.clone(),
            charlie_signer.clone(),
            None,
            &[],
        )
        .err(),
        Some(ExternalCommitError::MissingRatchetTree)
    );

    let (charlie, commit) = GroupState::join_group_external(
        provider,
        config,
        group_info,
        Some(exported_tree(&bob)),
        charlie_credential,
        charlie_signer,
        None,
        b"Charlie's external commit",
    )
    .expect("error joining externally");
    // External commits are never encrypted
    assert!(commit.is_handshake_message());
    assert!(matches!(commit.body(), MlsMessageBody::PublicMessage(_)));
    let (alice, processed) = alice
        .process_message(provider, transport(&commit))
        .expect("error processing external commit");
    assert_eq!(processed.sender(), &Sender::NewMemberCommit);
    assert_eq!(processed.authenticated_data(), b"Charlie's external commit");
    let bob = process(provider, bob, &commit);

    assert_same_epoch(provider, &[&alice, &bob, &charlie]);
    assert_eq!(charlie.members().len(), 3);
    assert_eq!(charlie.epoch(), GroupEpoch::from(2));

    // The new member takes part in the group like everyone else
    let (charlie, message) = charlie
        .create_application_message(provider, &[], b"Hi, I'm new")
        .expect("error creating application message");
    let (_, processed) = alice
        .process_message(provider, transport(&message))
        .expect("error processing application message");
    assert_eq!(
        processed.into_content(),
        ProcessedMessageContent::ApplicationMessage(b"Hi, I'm new".to_vec())
    );
    let result = charlie
        .create_commit(provider, CommitParams::default())
        .expect("error creating commit");
    let alice = process(provider, alice, &result.commit);
    let bob = process(provider, bob, &result.commit);
    assert_same_epoch(provider, &[&alice, &bob, &result.state]);
}

// Bob lost his state and rejoins at his old position with an external
// commit that removes his old leaf.
#[apply(ciphersuites_and_providers)]
fn external_resync(ciphersuite: Ciphersuite, provider: &impl CgkaProvider) {
    let _ = pretty_env_logger::try_init();
    let config = GroupConfig::builder()
        .ciphersuite(ciphersuite)
        .use_ratchet_tree_extension(true)
        .build();
    let (alice_credential, alice_signer) =
        generate_credential_with_key("Alice", ciphersuite, provider);
    let (bob_credential, bob_signer) = generate_credential_with_key("Bob", ciphersuite, provider);
    let bob_key_package =
        generate_key_package(ciphersuite, provider, &bob_signer, bob_credential.clone());

    let alice = GroupState::create_group(
        provider,
        config.clone(),
        GroupId::random(provider.rand()).expect("not enough randomness"),
        alice_credential,
        alice_signer,
    )
    .expect("Error creating group.");
    let result = alice
        .create_commit(
            provider,
            CommitParams::builder()
                .inline_proposals(vec![Proposal::Add(AddProposal::new(
                    bob_key_package.key_package().clone(),
                ))])
                .build(),
        )
        .expect("error creating commit");
    let alice = result.state;
    let old_bob = GroupState::join_group(
        provider,
        config.clone(),
        transport(&result.welcome.expect("missing welcome"))
            .into_welcome()
            .expect("expected a welcome"),
        None,
        bob_key_package,
        bob_signer.clone(),
    )
    .expect("Error joining group.");
    let old_leaf = old_bob.own_leaf_index();
    drop(old_bob);

    // Only the owner of the old leaf can resync it
    let (eve_credential, eve_signer) = generate_credential_with_key("Eve", ciphersuite, provider);
    assert_eq!(
        GroupState::join_group_external(
            provider,
            config.clone(),
            exported_group_info(provider, &alice, true),
            None,
            eve_credential,
            eve_signer,
            Some(old_leaf),
            &[],
        )
        .err(),
        Some(ExternalCommitError::InvalidResyncLeaf)
    );

    let (bob, commit) = GroupState::join_group_external(
        provider,
        config,
        exported_group_info(provider, &alice, true),
        None,
        bob_credential,
        bob_signer,
        Some(old_leaf),
        &[],
    )
    .expect("error resyncing");
    let alice = process(provider, alice, &commit);

    assert_same_epoch(provider, &[&alice, &bob]);
    assert_eq!(alice.members().len(), 2);
    assert_eq!(bob.own_leaf_index(), old_leaf);
    assert_eq!(
        alice
            .member(old_leaf)
            .expect("missing Bob")
            .credential
            .identity(),
        b"Bob"
    );
}
