use tls_codec::{Deserialize, Serialize};

use super::*;
use crate::{
    binary_tree::{LeafNodeIndex, TreeSize},
    ciphersuite::{signature::SignatureError, Secret},
    config::SenderRatchetConfiguration,
    credentials::SignatureKeyPair,
    extensions::Extensions,
    group::{GroupContext, GroupId},
    messages::proposals::{Proposal, RemoveProposal},
    schedule::{EncryptionSecret, MessageSecrets},
    test_utils::*,
    tree::secret_tree::{SecretTree, SecretTreeError},
};

fn group_context(ciphersuite: Ciphersuite) -> GroupContext {
    GroupContext::new(
        ciphersuite,
        GroupId::from_slice(b"group id"),
        1,
        vec![1, 2, 3],
        vec![4, 5, 6],
        Extensions::empty(),
    )
}

/// Message secrets of a sender at leaf 0 and a receiver at leaf 1 that share
/// the secrets of one epoch.
fn sender_and_receiver_secrets(
    ciphersuite: Ciphersuite,
    provider: &impl CgkaProvider,
    serialized_context: Vec<u8>,
) -> (MessageSecrets, MessageSecrets) {
    let mut sender_secrets =
        MessageSecrets::random(ciphersuite, provider.rand(), LeafNodeIndex::new(0));
    sender_secrets.set_serialized_context(serialized_context);
    let mut receiver_secrets = sender_secrets.clone();

    let encryption_secret =
        EncryptionSecret::random(ciphersuite, provider.rand()).expect("Not enough randomness.");
    sender_secrets.replace_secret_tree(SecretTree::new(
        encryption_secret.clone(),
        TreeSize::from_leaf_count(2),
        LeafNodeIndex::new(0),
    ));
    receiver_secrets.replace_secret_tree(SecretTree::new(
        encryption_secret,
        TreeSize::from_leaf_count(2),
        LeafNodeIndex::new(1),
    ));
    (sender_secrets, receiver_secrets)
}

#[apply(ciphersuites_and_providers)]
fn private_message_roundtrip(ciphersuite: Ciphersuite, provider: &impl CgkaProvider) {
    let _ = pretty_env_logger::try_init();
    let context = group_context(ciphersuite);
    let serialized_context = context.serialize().expect("error serializing context");
    let signer = SignatureKeyPair::new(ciphersuite.signature_algorithm(), provider.crypto())
        .expect("error generating signature keys");
    let (mut sender_secrets, mut receiver_secrets) =
        sender_and_receiver_secrets(ciphersuite, provider, serialized_context);

    let content = AuthenticatedContent::new_application(
        LeafNodeIndex::new(0),
        b"authenticated data",
        b"message",
        &signer,
        &context,
        provider.crypto(),
    )
    .expect("error creating content");

    for padding in [0, 10, 32] {
        let message = PrivateMessage::encrypt(
            provider.crypto(),
            provider.rand(),
            &content,
            ciphersuite,
            &mut sender_secrets,
            padding,
        )
        .expect("error encrypting");
        if padding > 0 {
            assert_eq!(message.ciphertext().len() % padding, 0);
        }
        assert_eq!(message.group_id(), context.group_id());
        assert_eq!(message.epoch(), context.epoch());
        assert_eq!(message.content_type(), ContentType::Application);

        // The message survives the wire
        let encoded = MlsMessage::from(message)
            .tls_serialize_detached()
            .expect("error encoding");
        let message = match MlsMessage::tls_deserialize(&mut encoded.as_slice())
            .expect("error decoding")
            .into_body()
        {
            MlsMessageBody::PrivateMessage(message) => message,
            _ => panic!("expected a private message"),
        };

        let verifiable = message
            .decrypt(
                provider.crypto(),
                ciphersuite,
                &mut receiver_secrets,
                &SenderRatchetConfiguration::default(),
            )
            .expect("error decrypting");
        assert_eq!(verifiable.sender(), &Sender::Member(LeafNodeIndex::new(0)));
        assert_eq!(verifiable.wire_format(), WireFormat::PrivateMessage);
        let verified = verifiable
            .verify(
                provider.crypto(),
                ciphersuite.signature_algorithm(),
                &signer.to_public_key(),
            )
            .expect("invalid signature");
        assert_eq!(verified.content(), content.content());
        assert_eq!(verified.authenticated_data(), b"authenticated data");
    }
}

#[apply(ciphersuites_and_providers)]
fn private_message_tampering(ciphersuite: Ciphersuite, provider: &impl CgkaProvider) {
    let _ = pretty_env_logger::try_init();
    let context = group_context(ciphersuite);
    let serialized_context = context.serialize().expect("error serializing context");
    let signer = SignatureKeyPair::new(ciphersuite.signature_algorithm(), provider.crypto())
        .expect("error generating signature keys");
    let (mut sender_secrets, mut receiver_secrets) =
        sender_and_receiver_secrets(ciphersuite, provider, serialized_context);

    let content = AuthenticatedContent::new_application(
        LeafNodeIndex::new(0),
        &[],
        b"message",
        &signer,
        &context,
        provider.crypto(),
    )
    .expect("error creating content");
    let message = PrivateMessage::encrypt(
        provider.crypto(),
        provider.rand(),
        &content,
        ciphersuite,
        &mut sender_secrets,
        0,
    )
    .expect("error encrypting");

    // A flipped bit in the tag of the content ciphertext
    let mut tampered = message.clone();
    let mut ciphertext = tampered.ciphertext().to_vec();
    if let Some(last) = ciphertext.last_mut() {
        *last ^= 0x01;
    }
    tampered.set_ciphertext(ciphertext);
    assert_eq!(
        tampered.decrypt(
            provider.crypto(),
            ciphersuite,
            &mut receiver_secrets.clone(),
            &SenderRatchetConfiguration::default(),
        ),
        Err(MessageDecryptionError::AeadError)
    );

    // Keys are deleted after use
    message
        .decrypt(
            provider.crypto(),
            ciphersuite,
            &mut receiver_secrets,
            &SenderRatchetConfiguration::default(),
        )
        .expect("error decrypting");
    assert_eq!(
        message.decrypt(
            provider.crypto(),
            ciphersuite,
            &mut receiver_secrets,
            &SenderRatchetConfiguration::default(),
        ),
        Err(MessageDecryptionError::SecretTreeError(
            SecretTreeError::SecretReuseError
        ))
    );

    // Only private content can be encrypted
    let proposal = AuthenticatedContent::member_proposal(
        WireFormat::PublicMessage,
        LeafNodeIndex::new(0),
        &[],
        Proposal::Remove(RemoveProposal {
            removed: LeafNodeIndex::new(1),
        }),
        &signer,
        &context,
        provider.crypto(),
    )
    .expect("error creating content");
    assert_eq!(
        PrivateMessage::encrypt(
            provider.crypto(),
            provider.rand(),
            &proposal,
            ciphersuite,
            &mut sender_secrets,
            0,
        ),
        Err(MessageEncryptionError::WrongWireFormat)
    );
}

#[apply(ciphersuites_and_providers)]
fn membership_tag(ciphersuite: Ciphersuite, provider: &impl CgkaProvider) {
    let _ = pretty_env_logger::try_init();
    let context = group_context(ciphersuite);
    let serialized_context = context.serialize().expect("error serializing context");
    let signer = SignatureKeyPair::new(ciphersuite.signature_algorithm(), provider.crypto())
        .expect("error generating signature keys");
    let mut message_secrets =
        MessageSecrets::random(ciphersuite, provider.rand(), LeafNodeIndex::new(0));

    let content = AuthenticatedContent::member_proposal(
        WireFormat::PublicMessage,
        LeafNodeIndex::new(0),
        b"aad",
        Proposal::Remove(RemoveProposal {
            removed: LeafNodeIndex::new(1),
        }),
        &signer,
        &context,
        provider.crypto(),
    )
    .expect("error creating content");
    let mut message = PublicMessage::from(content);
    assert_eq!(
        message.verify_membership(
            provider.crypto(),
            ciphersuite,
            message_secrets.membership_key(),
            &serialized_context,
        ),
        Err(MembershipTagError::MissingMembershipTag)
    );

    message
        .set_membership_tag(
            provider.crypto(),
            ciphersuite,
            message_secrets.membership_key(),
            &serialized_context,
        )
        .expect("error computing the membership tag");
    message
        .verify_membership(
            provider.crypto(),
            ciphersuite,
            message_secrets.membership_key(),
            &serialized_context,
        )
        .expect("invalid membership tag");

    // The tag is bound to the group context
    assert_eq!(
        message.verify_membership(
            provider.crypto(),
            ciphersuite,
            message_secrets.membership_key(),
            b"other context",
        ),
        Err(MembershipTagError::InvalidMembershipTag)
    );

    let mut tampered = message.clone();
    if let Some(tag) = tampered.membership_tag_mut() {
        tag.0.flip_last_byte();
    }
    assert_eq!(
        tampered.verify_membership(
            provider.crypto(),
            ciphersuite,
            message_secrets.membership_key(),
            &serialized_context,
        ),
        Err(MembershipTagError::InvalidMembershipTag)
    );

    // A different membership key
    message_secrets.set_membership_key(
        Secret::random(ciphersuite, provider.rand()).expect("Not enough randomness."),
    );
    assert_eq!(
        message.verify_membership(
            provider.crypto(),
            ciphersuite,
            message_secrets.membership_key(),
            &serialized_context,
        ),
        Err(MembershipTagError::InvalidMembershipTag)
    );
}

#[apply(ciphersuites_and_providers)]
fn public_message_signature(ciphersuite: Ciphersuite, provider: &impl CgkaProvider) {
    let _ = pretty_env_logger::try_init();
    let context = group_context(ciphersuite);
    let serialized_context = context.serialize().expect("error serializing context");
    let signer = SignatureKeyPair::new(ciphersuite.signature_algorithm(), provider.crypto())
        .expect("error generating signature keys");

    let content = AuthenticatedContent::member_proposal(
        WireFormat::PublicMessage,
        LeafNodeIndex::new(3),
        &[],
        Proposal::Remove(RemoveProposal {
            removed: LeafNodeIndex::new(1),
        }),
        &signer,
        &context,
        provider.crypto(),
    )
    .expect("error creating content");
    let message = PublicMessage::from(content);
    assert_eq!(message.sender(), &Sender::Member(LeafNodeIndex::new(3)));
    assert_eq!(message.content_type(), ContentType::Proposal);
    assert_eq!(message.epoch(), context.epoch());

    let encoded = MlsMessage::from(message.clone())
        .tls_serialize_detached()
        .expect("error encoding");
    let decoded = MlsMessage::tls_deserialize(&mut encoded.as_slice()).expect("error decoding");
    assert_eq!(decoded.wire_format(), WireFormat::PublicMessage);
    assert!(decoded.is_handshake_message());

    message
        .clone()
        .into_verifiable_content(serialized_context.clone())
        .verify(
            provider.crypto(),
            ciphersuite.signature_algorithm(),
            &signer.to_public_key(),
        )
        .expect("invalid signature");

    // The signature covers the group context
    assert_eq!(
        message
            .clone()
            .into_verifiable_content(b"other context".to_vec())
            .verify(
                provider.crypto(),
                ciphersuite.signature_algorithm(),
                &signer.to_public_key(),
            )
            .err(),
        Some(SignatureError::VerificationError)
    );

    let mut tampered = message.clone();
    let mut signature = tampered.signature_mut().as_slice().to_vec();
    signature[0] ^= 0xff;
    tampered.signature_mut().modify(&signature);
    assert_eq!(
        tampered
            .into_verifiable_content(serialized_context.clone())
            .verify(
                provider.crypto(),
                ciphersuite.signature_algorithm(),
                &signer.to_public_key(),
            )
            .err(),
        Some(SignatureError::VerificationError)
    );

    let mut tampered = message;
    tampered.set_epoch(2);
    assert_eq!(
        tampered
            .into_verifiable_content(serialized_context)
            .verify(
                provider.crypto(),
                ciphersuite.signature_algorithm(),
                &signer.to_public_key(),
            )
            .err(),
        Some(SignatureError::VerificationError)
    );
}

#[test]
fn wire_format_and_content_type() {
    for (wire_format, value) in [
        (WireFormat::PublicMessage, 1u16),
        (WireFormat::PrivateMessage, 2),
        (WireFormat::Welcome, 3),
        (WireFormat::GroupInfo, 4),
        (WireFormat::KeyPackage, 5),
    ] {
        let encoded = wire_format
            .tls_serialize_detached()
            .expect("error encoding");
        assert_eq!(encoded, value.to_be_bytes());
    }
    assert!(WireFormat::tls_deserialize(&mut [0u8, 0].as_slice()).is_err());

    assert!(!ContentType::Application.is_handshake_message());
    assert!(ContentType::Proposal.is_handshake_message());
    assert!(ContentType::Commit.is_handshake_message());
}
