use cgka::{prelude::*, test_utils::*};

// Scenarios in the style of the MLS interop test scenarios. All messages are
// encoded and decoded on their way between the clients.

/// A client taking part in a test scenario.
struct Client {
    identity: &'static str,
    state: GroupState,
}

fn transport(message: &MlsMessage) -> MlsMessage {
    let bytes = message
        .tls_serialize_detached()
        .expect("error encoding message");
    MlsMessage::tls_deserialize(&mut bytes.as_slice()).expect("error decoding message")
}

fn transport_tree(state: &GroupState) -> RatchetTree {
    let bytes = state
        .export_ratchet_tree()
        .tls_serialize_detached()
        .expect("error encoding tree");
    let nodes = Vec::<Option<Node>>::tls_deserialize(&mut bytes.as_slice())
        .expect("error decoding tree");
    RatchetTree::from_nodes(nodes).expect("invalid tree")
}

fn new_member(
    identity: &str,
    ciphersuite: Ciphersuite,
    provider: &impl CgkaProvider,
) -> (KeyPackageBundle, SignatureKeyPair) {
    let (credential_with_key, signer) =
        generate_credential_with_key(identity, ciphersuite, provider);
    let bundle = generate_key_package(ciphersuite, provider, &signer, credential_with_key);
    (bundle, signer)
}

fn create_group(
    identity: &'static str,
    config: &GroupConfig,
    provider: &impl CgkaProvider,
) -> Client {
    let (credential_with_key, signer) =
        generate_credential_with_key(identity, config.ciphersuite(), provider);
    let state = GroupState::create_group(
        provider,
        config.clone(),
        GroupId::random(provider.rand()).expect("not enough randomness"),
        credential_with_key,
        signer,
    )
    .expect("Error creating group.");
    Client { identity, state }
}

/// Every client except `skip` processes `message`.
fn distribute(
    provider: &impl CgkaProvider,
    clients: &mut [Client],
    skip: usize,
    message: &MlsMessage,
) {
    for (i, client) in clients.iter_mut().enumerate() {
        if i == skip {
            continue;
        }
        let (state, _) = client
            .state
            .process_message(provider, transport(message))
            .unwrap_or_else(|e| panic!("{} failed to process message: {e:?}", client.identity));
        client.state = state;
    }
}

/// Client `committer` adds `identities` in one commit. The new clients join
/// from the Welcome and are appended to `clients`.
fn add_clients(
    provider: &impl CgkaProvider,
    config: &GroupConfig,
    clients: &mut Vec<Client>,
    committer: usize,
    identities: &[&'static str],
) {
    let ciphersuite = config.ciphersuite();
    let mut joiners = Vec::new();
    let mut proposals = Vec::new();
    for identity in identities {
        let (bundle, signer) = new_member(identity, ciphersuite, provider);
        proposals.push(Proposal::Add(AddProposal::new(bundle.key_package().clone())));
        joiners.push((*identity, bundle, signer));
    }

    let result = clients[committer]
        .state
        .create_commit(
            provider,
            CommitParams::builder().inline_proposals(proposals).build(),
        )
        .expect("error creating commit");
    distribute(provider, clients, committer, &result.commit);
    clients[committer].state = result.state;

    let welcome = transport(&result.welcome.expect("missing welcome"))
        .into_welcome()
        .expect("expected a welcome");
    let ratchet_tree = transport_tree(&clients[committer].state);
    for (identity, bundle, signer) in joiners {
        let state = GroupState::join_group(
            provider,
            config.clone(),
            welcome.clone(),
            Some(ratchet_tree.clone()),
            bundle,
            signer,
        )
        .expect("Error joining group.");
        clients.push(Client { identity, state });
    }
}

/// Client `committer` commits all pending proposals with an update path.
fn commit_pending(provider: &impl CgkaProvider, clients: &mut [Client], committer: usize) {
    let result = clients[committer]
        .state
        .create_commit(provider, CommitParams::default())
        .expect("error creating commit");
    assert!(result.welcome.is_none());
    distribute(provider, clients, committer, &result.commit);
    clients[committer].state = result.state;
}

/// Check that all clients agree on the state of the group.
fn check_group_states(provider: &impl CgkaProvider, clients: &[Client]) {
    let reference = &clients[0].state;
    let exported = reference
        .export_secret(provider.crypto(), "test", b"context", 32)
        .expect("error exporting secret");
    for client in clients {
        let state = &client.state;
        assert!(state.is_active(), "{} is not active", client.identity);
        assert_eq!(state.epoch(), reference.epoch());
        assert_eq!(state.group_context(), reference.group_context());
        assert_eq!(state.epoch_authenticator(), reference.epoch_authenticator());
        assert_eq!(state.confirmation_tag(), reference.confirmation_tag());
        assert_eq!(state.export_ratchet_tree(), reference.export_ratchet_tree());
        assert_eq!(
            state
                .export_secret(provider.crypto(), "test", b"context", 32)
                .expect("error exporting secret"),
            exported
        );
        let own_leaf = state
            .member(state.own_leaf_index())
            .expect("own leaf is blank");
        assert_eq!(own_leaf.credential.identity(), client.identity.as_bytes());
    }
    assert_eq!(reference.members().len(), clients.len());
}

/// Client `sender` sends an application message that everyone else reads.
fn send_message(provider: &impl CgkaProvider, clients: &mut [Client], sender: usize) {
    let text = format!("Hello from {}", clients[sender].identity);
    let (state, message) = clients[sender]
        .state
        .create_application_message(provider, &[], text.as_bytes())
        .expect("error creating application message");
    clients[sender].state = state;
    let sender_index = clients[sender].state.own_leaf_index();
    for (i, client) in clients.iter_mut().enumerate() {
        if i == sender {
            continue;
        }
        let (state, processed) = client
            .state
            .process_message(provider, transport(&message))
            .expect("error processing application message");
        client.state = state;
        assert_eq!(processed.sender(), &Sender::Member(sender_index));
        assert_eq!(
            processed.into_content(),
            ProcessedMessageContent::ApplicationMessage(text.as_bytes().to_vec())
        );
    }
}

// # 1:1 join
// A:    Create group
// B->A: KeyPackage
// A->B: Welcome
// ***:  Verify group state
#[apply(ciphersuites_and_providers)]
fn one_to_one_join(ciphersuite: Ciphersuite, provider: &impl CgkaProvider) {
    let _ = pretty_env_logger::try_init();
    let config = GroupConfig::builder().ciphersuite(ciphersuite).build();
    let mut clients = vec![create_group("Alice", &config, provider)];

    add_clients(provider, &config, &mut clients, 0, &["Bob"]);
    check_group_states(provider, &clients);
    send_message(provider, &mut clients, 0);
    send_message(provider, &mut clients, 1);
}

// # 3-party join
// A: Create group
// B->A: KeyPackage
// A->B: Welcome
// C->A: KeyPackage
// A->B: Add(C), Commit
// A->C: Welcome
// ***:  Verify group state
#[apply(ciphersuites_and_providers)]
fn three_party_join(ciphersuite: Ciphersuite, provider: &impl CgkaProvider) {
    let _ = pretty_env_logger::try_init();
    let config = GroupConfig::builder().ciphersuite(ciphersuite).build();
    let mut clients = vec![create_group("Alice", &config, provider)];

    add_clients(provider, &config, &mut clients, 0, &["Bob"]);
    add_clients(provider, &config, &mut clients, 0, &["Charlie"]);
    check_group_states(provider, &clients);
    assert_eq!(clients[0].state.epoch(), GroupEpoch::from(2));
}

// # Multiple joins at once
// A:    Create group
// B->A: KeyPackage
// C->A: KeyPackage
// A->B: Welcome
// A->C: Welcome
// ***:  Verify group state
#[apply(ciphersuites_and_providers)]
fn multiple_joins(ciphersuite: Ciphersuite, provider: &impl CgkaProvider) {
    let _ = pretty_env_logger::try_init();
    let config = GroupConfig::builder().ciphersuite(ciphersuite).build();
    let mut clients = vec![create_group("Alice", &config, provider)];

    add_clients(provider, &config, &mut clients, 0, &["Bob", "Charlie"]);
    check_group_states(provider, &clients);
    assert_eq!(clients[0].state.epoch(), GroupEpoch::from(1));
    send_message(provider, &mut clients, 2);
}

// # Update
// A: Create group
// B->A: KeyPackage
// A->B: Welcome
// A->B: Update, Commit
// ***:  Verify group state
#[apply(ciphersuites_and_providers)]
fn update(ciphersuite: Ciphersuite, provider: &impl CgkaProvider) {
    let _ = pretty_env_logger::try_init();
    let config = GroupConfig::builder().ciphersuite(ciphersuite).build();
    let mut clients = vec![create_group("Alice", &config, provider)];
    add_clients(provider, &config, &mut clients, 0, &["Bob"]);

    // Bob proposes to update, Alice commits
    let (state, proposal) = clients[1]
        .state
        .propose_self_update(provider)
        .expect("error proposing update");
    clients[1].state = state;
    distribute(provider, &mut clients, 1, &proposal);
    let old_key = clients[0]
        .state
        .member(LeafNodeIndex::new(1))
        .expect("missing Bob")
        .encryption_key;
    commit_pending(provider, &mut clients, 0);
    check_group_states(provider, &clients);
    assert_ne!(
        clients[0]
            .state
            .member(LeafNodeIndex::new(1))
            .expect("missing Bob")
            .encryption_key,
        old_key
    );

    // Bob updates with a commit of his own
    commit_pending(provider, &mut clients, 1);
    check_group_states(provider, &clients);
    send_message(provider, &mut clients, 1);
}

// # Remove
// A:   Create group
// B->A: KeyPackage
// C->A: KeyPackage
// A->B: Welcome
// A->C: Welcome
// A->B: Remove(B), Commit
// A->C: Remove(B), Commit
// ***:  Verify group state
#[apply(ciphersuites_and_providers)]
fn remove(ciphersuite: Ciphersuite, provider: &impl CgkaProvider) {
    let _ = pretty_env_logger::try_init();
    let config = GroupConfig::builder().ciphersuite(ciphersuite).build();
    let mut clients = vec![create_group("Alice", &config, provider)];
    add_clients(provider, &config, &mut clients, 0, &["Bob", "Charlie"]);

    let result = clients[0]
        .state
        .create_commit(
            provider,
            CommitParams::builder()
                .inline_proposals(vec![Proposal::Remove(RemoveProposal::new(
                    LeafNodeIndex::new(1),
                ))])
                .build(),
        )
        .expect("error creating commit");
    distribute(provider, &mut clients, 0, &result.commit);
    clients[0].state = result.state;

    let bob = clients.remove(1);
    assert_eq!(bob.state.lifecycle(), &GroupLifecycle::RemovedFromGroup);
    assert!(bob
        .state
        .create_application_message(provider, &[], b"still here?")
        .is_err());
    check_group_states(provider, &clients);
    assert!(clients[0].state.member(LeafNodeIndex::new(1)).is_none());
    send_message(provider, &mut clients, 1);
}

// # Large Group, Full Lifecycle
// * Create group
// * Group creator adds the first M members
// * Until group size reaches N members, a randomly-chosen group member adds a
//   new member
// * All members update
// * While the group size is >1, a randomly-chosen group member removes a
//   randomly-chosen other group member
#[apply(ciphersuites_and_providers)]
fn large_group_lifecycle(ciphersuite: Ciphersuite, provider: &impl CgkaProvider) {
    let _ = pretty_env_logger::try_init();
    const NAMES: [&str; 7] = ["Bob", "Charlie", "Dave", "Eve", "Frank", "Grace", "Heidi"];
    let config = GroupConfig::builder()
        .ciphersuite(ciphersuite)
        .wire_format_policy(PURE_CIPHERTEXT_WIRE_FORMAT_POLICY)
        .build();
    let mut clients = vec![create_group("Alice", &config, provider)];

    // The first two members are added by the creator, the rest by the member
    // that joined last.
    add_clients(provider, &config, &mut clients, 0, &NAMES[..2]);
    for name in &NAMES[2..] {
        let committer = clients.len() - 1;
        add_clients(provider, &config, &mut clients, committer, &[name]);
    }
    check_group_states(provider, &clients);
    assert_eq!(clients.len(), 8);

    // All members update
    for committer in 0..clients.len() {
        commit_pending(provider, &mut clients, committer);
    }
    check_group_states(provider, &clients);
    send_message(provider, &mut clients, 3);

    // The last member removes the first until one is left
    while clients.len() > 1 {
        let committer = clients.len() - 1;
        let removed = clients[0].state.own_leaf_index();
        let result = clients[committer]
            .state
            .create_commit(
                provider,
                CommitParams::builder()
                    .inline_proposals(vec![Proposal::Remove(RemoveProposal::new(removed))])
                    .build(),
            )
            .expect("error creating commit");
        distribute(provider, &mut clients, committer, &result.commit);
        clients[committer].state = result.state;
        let removed_client = clients.remove(0);
        assert!(!removed_client.state.is_active());
        check_group_states(provider, &clients);
    }
    assert_eq!(clients[0].identity, "Heidi");
    assert_eq!(clients[0].state.members().len(), 1);
}

// Proposals of several members are committed by reference in one commit.
#[apply(ciphersuites_and_providers)]
fn proposals_by_reference(ciphersuite: Ciphersuite, provider: &impl CgkaProvider) {
    let _ = pretty_env_logger::try_init();
    let config = GroupConfig::builder().ciphersuite(ciphersuite).build();
    let mut clients = vec![create_group("Alice", &config, provider)];
    add_clients(provider, &config, &mut clients, 0, &["Bob", "Charlie"]);

    // Bob proposes to add Dave, Charlie proposes to update
    let (dave_bundle, dave_signer) = new_member("Dave", ciphersuite, provider);
    let (state, add_proposal) = clients[1]
        .state
        .propose_add(provider, dave_bundle.key_package().clone())
        .expect("error proposing add");
    clients[1].state = state;
    distribute(provider, &mut clients, 1, &add_proposal);

    let (state, update_proposal) = clients[2]
        .state
        .propose_self_update(provider)
        .expect("error proposing update");
    clients[2].state = state;
    distribute(provider, &mut clients, 2, &update_proposal);
    assert_eq!(clients[0].state.pending_proposals().count(), 2);

    let result = clients[0]
        .state
        .create_commit(provider, CommitParams::default())
        .expect("error creating commit");
    distribute(provider, &mut clients, 0, &result.commit);
    clients[0].state = result.state;
    assert_eq!(clients[0].state.pending_proposals().count(), 0);

    let welcome = transport(&result.welcome.expect("missing welcome"))
        .into_welcome()
        .expect("expected a welcome");
    let dave = GroupState::join_group(
        provider,
        config,
        welcome,
        Some(transport_tree(&clients[0].state)),
        dave_bundle,
        dave_signer,
    )
    .expect("Error joining group.");
    clients.push(Client {
        identity: "Dave",
        state: dave,
    });
    check_group_states(provider, &clients);
    send_message(provider, &mut clients, 3);
}
