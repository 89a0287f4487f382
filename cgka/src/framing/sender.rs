//! # The sender of a message
//!
//! ```c
//! enum {
//!     reserved(0),
//!     member(1),
//!     external(2),
//!     new_member_proposal(3),
//!     new_member_commit(4),
//!     (255)
//! } SenderType;
//!
//! struct {
//!     SenderType sender_type;
//!     select (Sender.sender_type) {
//!         case member:
//!             uint32 leaf_index;
//!         case new_member_commit:
//!             struct{};
//!     };
//! } Sender;
//! ```
//!
//! External senders and new member proposals are not supported.

use serde::{Deserialize, Serialize};
use tls_codec::{TlsDeserialize, TlsSerialize, TlsSize};

use crate::binary_tree::LeafNodeIndex;

/// The sender of a [`FramedContent`](super::FramedContent).
#[derive(
    Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize, TlsSerialize, TlsDeserialize, TlsSize,
)]
#[repr(u8)]
pub enum Sender {
    /// A member of the group, identified by its leaf.
    #[tls_codec(discriminant = 1)]
    Member(LeafNodeIndex),
    /// A client joining through an external commit.
    #[tls_codec(discriminant = 4)]
    NewMemberCommit,
}

impl Sender {
    /// Build a member sender.
    pub(crate) fn build_member(leaf_index: LeafNodeIndex) -> Self {
        Sender::Member(leaf_index)
    }

    /// Returns `true` if the sender is a member of the group.
    pub fn is_member(&self) -> bool {
        matches!(self, Sender::Member(_))
    }

    /// The leaf of a member sender.
    pub fn as_member(&self) -> Option<LeafNodeIndex> {
        match self {
            Sender::Member(leaf_index) => Some(*leaf_index),
            Sender::NewMemberCommit => None,
        }
    }
}
