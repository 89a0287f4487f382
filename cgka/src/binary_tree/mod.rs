//! # Binary tree
//!
//! Index arithmetic over complete binary trees in array representation. Leaves
//! sit at even indices, parents at odd indices, and a tree with `n` leaves
//! (`n` a power of two) has `2n - 1` nodes.

pub mod treemath;

pub use treemath::{LeafNodeIndex, NodeIndex, TreeMathError, TreeSize};

#[cfg(test)]
mod test_treemath;
