//! # Outbound Ports
//!
//! The chain-data provider the proof engine depends on. Network clients
//! (node RPC, indexers) live outside this crate and implement this trait.

use async_trait::async_trait;

use crate::domain::{Block, BlockHeader, Digest, ProofError, RawTransaction, TxLocation};

/// Chain-data provider - outbound port.
///
/// Implementations report network failures and timeouts as
/// `ProofError::ProviderUnavailable`.
#[async_trait]
pub trait ChainDataProvider: Send + Sync {
    /// Resolve a transaction to its containing block.
    async fn locate_transaction(&self, txid: &Digest) -> Result<TxLocation, ProofError>;

    /// Fetch a block's header, height and ordered transactions.
    async fn get_block(&self, block_hash: &Digest) -> Result<Block, ProofError>;

    /// Current best (tip) block height.
    async fn get_best_height(&self) -> Result<u64, ProofError>;

    /// Provider identifier (for logging/debugging).
    fn provider_id(&self) -> &str;

    /// Canonical byte form of a transaction.
    fn serialize_transaction(&self, tx: &RawTransaction) -> Vec<u8> {
        tx.to_bytes()
    }

    /// Canonical byte form of a block header.
    fn serialize_header(&self, header: &BlockHeader) -> Vec<u8> {
        header.to_bytes()
    }
}
