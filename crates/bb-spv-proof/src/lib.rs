//! # BitBridge SPV Proof Engine
//!
//! Builds and checks SPV (Simplified Payment Verification) proofs for the
//! bridge gateway: a transaction's Merkle inclusion path, the header of the
//! block that commits to it, and its confirmation depth.
//!
//! **Architecture:** Hexagonal (DDD + Ports/Adapters)
//!
//! ## Pipeline
//!
//! | Step | Component |
//! |------|-----------|
//! | Locate block, rebuild Merkle tree, extract path | `ProofGenerator` |
//! | Confirmation depth and consistency checks | `ProofGenerator` |
//! | TTL + LRU cache keyed by `tx_hash:output_index` | `ProofCache` |
//! | Cache-first requests, bounded concurrent batches | `ProofService` |
//!
//! ## Module Structure
//!
//! ```text
//! bb-spv-proof/
//! ├── domain/          # Digest, SpvProof, requests/responses, errors, invariants
//! ├── algorithms/      # Merkle tree, wire codec
//! ├── ports/           # ProofApi (inbound) + ChainDataProvider (outbound)
//! ├── adapters/        # InMemoryChain provider
//! ├── application/     # ProofGenerator, ProofCache, ProofService
//! └── config.rs        # ProofServiceConfig
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod algorithms;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

// Re-exports
pub use adapters::{coinbase_transaction, synthetic_transaction, InMemoryChain};
pub use algorithms::{compute_merkle_root, verify_proof, MerkleTree, WireReader, WireWriter};
pub use application::{ProofCache, ProofGenerator, ProofService};
pub use config::ProofServiceConfig;
pub use domain::{
    cache_key, confirmations_at, double_sha256, hash_pair, invariant_min_confirmations,
    BatchProofResponse, Block, BlockHeader, CacheStats, CachedProof, ContractProof, Digest,
    MerkleProof, ProofError, ProofRequest, ProofResponse, RawTransaction, SpvProof, TxInput,
    TxLocation, TxOutput, BLOCK_HEADER_SIZE, DEFAULT_BATCH_CONCURRENCY, DEFAULT_CACHE_TTL,
    DEFAULT_CLEANUP_INTERVAL, DEFAULT_MAX_CACHE_SIZE, DEFAULT_MIN_CONFIRMATIONS,
    DEFAULT_PROVIDER_TIMEOUT, DIGEST_LEN,
};
pub use ports::{ChainDataProvider, ProofApi};

/// Re-exported so callers can build the tokens the API takes.
pub use tokio_util::sync::CancellationToken;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    #[test]
    fn test_version() {
        assert!(!super::VERSION.is_empty());
    }
}
