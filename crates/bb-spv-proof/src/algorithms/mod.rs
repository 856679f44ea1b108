//! # Algorithms Module
//!
//! Pure, I/O-free building blocks: the Merkle tree and the wire codec.

pub mod codec;
pub mod merkle_tree;

pub use codec::{WireReader, WireWriter};
pub use merkle_tree::{compute_merkle_root, verify_proof, MerkleTree};
