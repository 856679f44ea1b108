//! In-Memory Chain Adapter
//!
//! Implements `ChainDataProvider` over blocks held in memory.
//! Used by tests and by the CLI demo in place of a node RPC client.

use crate::algorithms::compute_merkle_root;
use crate::domain::{
    Block, BlockHeader, Digest, ProofError, RawTransaction, TxInput, TxLocation, TxOutput,
};
use crate::ports::outbound::ChainDataProvider;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

/// Timestamp of the first block.
const GENESIS_TIME: u32 = 1_700_000_000;

/// Seconds between consecutive blocks.
const BLOCK_INTERVAL_SECS: u32 = 600;

#[derive(Default)]
struct ChainState {
    /// Blocks indexed by hash.
    blocks: HashMap<Digest, Block>,
    /// Block hash indexed by height.
    by_height: Vec<Digest>,
    /// txid -> containing block.
    tx_index: HashMap<Digest, Digest>,
    /// Known but unmined transactions.
    mempool: HashSet<Digest>,
}

/// Chain-data provider backed by in-memory blocks.
pub struct InMemoryChain {
    id: String,
    state: RwLock<ChainState>,
    unavailable: AtomicBool,
    latency_ms: AtomicU64,
}

impl InMemoryChain {
    /// Empty chain. The first pushed block has height 0.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: RwLock::new(ChainState::default()),
            unavailable: AtomicBool::new(false),
            latency_ms: AtomicU64::new(0),
        }
    }

    /// Append a block holding `transactions` (in order). Returns its hash.
    ///
    /// Transactions waiting in the mempool are confirmed by this block.
    pub fn push_block(&self, transactions: Vec<RawTransaction>) -> Digest {
        let mut state = self.state.write();

        let height = state.by_height.len() as u64;
        let prev_block = state.by_height.last().copied().unwrap_or(Digest::ZERO);
        let txids: Vec<Digest> = transactions.iter().map(RawTransaction::txid).collect();

        let header = BlockHeader {
            version: 0x2000_0000,
            prev_block,
            merkle_root: compute_merkle_root(&txids).unwrap_or(Digest::ZERO),
            time: GENESIS_TIME + BLOCK_INTERVAL_SECS * height as u32,
            bits: 0x207f_ffff,
            nonce: height as u32,
        };
        let hash = header.block_hash();

        for txid in txids {
            state.mempool.remove(&txid);
            state.tx_index.insert(txid, hash);
        }
        state.by_height.push(hash);
        state.blocks.insert(
            hash,
            Block {
                header,
                height,
                transactions,
            },
        );

        debug!("[bb-spv] in-memory chain {} mined block {} at {}", self.id, hash, height);
        hash
    }

    /// Append `count` blocks holding only a coinbase each.
    pub fn mine_empty_blocks(&self, count: usize) {
        for _ in 0..count {
            let height = self.state.read().by_height.len() as u64;
            self.push_block(vec![coinbase_transaction(height)]);
        }
    }

    /// Register a transaction that is known but not yet mined.
    pub fn add_unconfirmed(&self, tx: &RawTransaction) -> Digest {
        let txid = tx.txid();
        self.state.write().mempool.insert(txid);
        txid
    }

    /// Point a txid at an arbitrary block, as a misbehaving node might.
    pub fn set_location_override(&self, txid: Digest, block_hash: Digest) {
        self.state.write().tx_index.insert(txid, block_hash);
    }

    /// Make every call fail with `ProviderUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Height of the newest block, `None` for an empty chain.
    pub fn tip_height(&self) -> Option<u64> {
        let len = self.state.read().by_height.len() as u64;
        len.checked_sub(1)
    }

    /// Block at `height`.
    pub fn block_at(&self, height: u64) -> Option<Block> {
        let state = self.state.read();
        let hash = state.by_height.get(height as usize)?;
        state.blocks.get(hash).cloned()
    }

    async fn simulate_network(&self) -> Result<(), ProofError> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ProofError::ProviderUnavailable(format!(
                "{} is unreachable",
                self.id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainDataProvider for InMemoryChain {
    async fn locate_transaction(&self, txid: &Digest) -> Result<TxLocation, ProofError> {
        self.simulate_network().await?;

        let state = self.state.read();
        if let Some(block_hash) = state.tx_index.get(txid) {
            let confirmations = state
                .blocks
                .get(block_hash)
                .map(|b| state.by_height.len() as u64 - b.height)
                .unwrap_or(0);
            return Ok(TxLocation::in_block(*block_hash, confirmations));
        }
        if state.mempool.contains(txid) {
            return Ok(TxLocation::unconfirmed());
        }
        Err(ProofError::TransactionNotFound(txid.to_hex()))
    }

    async fn get_block(&self, block_hash: &Digest) -> Result<Block, ProofError> {
        self.simulate_network().await?;

        self.state
            .read()
            .blocks
            .get(block_hash)
            .cloned()
            .ok_or_else(|| {
                ProofError::ProviderUnavailable(format!("block {} not found on {}", block_hash, self.id))
            })
    }

    async fn get_best_height(&self) -> Result<u64, ProofError> {
        self.simulate_network().await?;

        self.tip_height()
            .ok_or_else(|| ProofError::ProviderUnavailable(format!("{} has no blocks", self.id)))
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}

/// Coinbase-shaped transaction unique to `height`.
pub fn coinbase_transaction(height: u64) -> RawTransaction {
    RawTransaction {
        version: 1,
        inputs: vec![TxInput {
            prev_txid: Digest::ZERO,
            prev_vout: u32::MAX,
            script_sig: height.to_le_bytes().to_vec(),
            sequence: u32::MAX,
        }],
        outputs: vec![TxOutput {
            value: 5_000_000_000,
            script_pubkey: vec![0x51],
        }],
        lock_time: 0,
    }
}

/// Deterministic payment transaction with `outputs` outputs, unique per `seed`.
pub fn synthetic_transaction(seed: u64, outputs: usize) -> RawTransaction {
    let mut prev = [0u8; 32];
    prev[..8].copy_from_slice(&seed.to_le_bytes());
    prev[31] = 0xee;

    RawTransaction {
        version: 2,
        inputs: vec![TxInput {
            prev_txid: Digest::new(prev),
            prev_vout: 0,
            script_sig: vec![0x00; 4],
            sequence: 0xffff_fffd,
        }],
        outputs: (0..outputs)
            .map(|i| TxOutput {
                value: 1_000 * (i as u64 + 1),
                script_pubkey: vec![0x00, 0x14, i as u8],
            })
            .collect(),
        lock_time: 0,
    }
}
