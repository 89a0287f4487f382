//! # CGKA
//!
//! The cryptographic core of a continuous group key agreement protocol in the
//! style of MLS: a ratchet tree holding one public key per member, TreeKEM
//! update paths that refresh the tree in one message, the per-epoch key
//! schedule, the forward-secret secret tree deriving per-message keys, and the
//! proposal/commit state machine that advances a group from one epoch to the
//! next.
//!
//! The main entry point is [`GroupState`](group::GroupState). Every group
//! operation consumes a `&GroupState` and returns a new one. A state value is
//! never mutated after it has been handed out.
//!
//! ## Error handling
//!
//! All functions that can fail return a [Result]. Each module has an
//! `errors.rs` (or an error section) with module specific errors. Every public
//! error implements [`ErrorCategory`](error::ErrorCategory), mapping it to one
//! of the [`ErrorKind`](error::ErrorKind)s `Validation`, `CryptoVerification`,
//! `Codec`, `Usage` and `Internal`.
//!
//! See the [mod@error] module for more details.
#![forbid(unsafe_code)]

#[cfg(any(feature = "test-utils", test))]
pub use rstest_reuse;

#[macro_use]
mod utils;

pub mod error;

#[cfg(any(feature = "test-utils", test))]
#[macro_use]
pub mod test_utils;

pub mod binary_tree;
pub mod ciphersuite;
pub mod config;
pub mod credentials;
pub mod extensions;
pub mod framing;
pub mod group;
pub mod key_packages;
pub mod messages;
pub mod schedule;
pub mod tree;
pub mod treesync;
pub mod versions;

/// Single place, re-exporting the most used public types.
pub mod prelude;
