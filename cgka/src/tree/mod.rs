//! # Message key derivation
//!
//! The [`secret_tree`] derives per-leaf chains from the epoch's encryption
//! secret, the [`sender_ratchet`]s turn every chain into one AEAD key and nonce
//! per generation.

pub mod secret_tree;
pub mod sender_ratchet;
