//! # Proof Generator
//!
//! Turns a transaction id into a complete SPV proof by asking the chain-data
//! provider for the containing block, rebuilding the block's Merkle tree and
//! extracting the inclusion path.
//!
//! Every provider call is raced against the caller's cancellation token and
//! a per-call deadline. Nothing is retried here.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::algorithms::{verify_proof, MerkleTree};
use crate::domain::{
    confirmations_at, double_sha256, invariant_min_confirmations, Block, ContractProof, Digest,
    ProofError, SpvProof, BLOCK_HEADER_SIZE, DIGEST_LEN,
};
use crate::ports::ChainDataProvider;

/// Builds and checks SPV proofs against a chain-data provider.
pub struct ProofGenerator {
    provider: Arc<dyn ChainDataProvider>,
    call_timeout: Duration,
}

impl ProofGenerator {
    /// Create a generator whose provider calls fail after `call_timeout`.
    pub fn new(provider: Arc<dyn ChainDataProvider>, call_timeout: Duration) -> Self {
        Self {
            provider,
            call_timeout,
        }
    }

    /// Identifier of the underlying provider.
    pub fn provider_id(&self) -> &str {
        self.provider.provider_id()
    }

    /// Run one provider call under cancellation and the per-call deadline.
    async fn call<T, F>(
        &self,
        operation: &'static str,
        cancel: &CancellationToken,
        fut: F,
    ) -> Result<T, ProofError>
    where
        F: Future<Output = Result<T, ProofError>>,
    {
        debug!(
            "[bb-spv] {} via provider {}",
            operation,
            self.provider.provider_id()
        );
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ProofError::CancellationRequested),
            result = tokio::time::timeout(self.call_timeout, fut) => match result {
                Ok(inner) => inner,
                Err(_) => Err(ProofError::ProviderUnavailable(format!(
                    "{} on {} timed out after {:?}",
                    operation,
                    self.provider.provider_id(),
                    self.call_timeout
                ))),
            },
        }
    }

    /// Generate an inclusion proof for `tx_hash`.
    ///
    /// # Errors
    /// - `InvalidDigest` if `tx_hash` is not a 32-byte hex digest
    /// - `TransactionUnconfirmed` if the provider knows no containing block
    /// - `TransactionNotFound` if the block does not list the transaction
    /// - `ProviderUnavailable` / `CancellationRequested` from provider calls
    pub async fn generate_proof(
        &self,
        tx_hash: &str,
        cancel: &CancellationToken,
    ) -> Result<SpvProof, ProofError> {
        let txid = Digest::from_hex(tx_hash)?;

        let location = self
            .call(
                "locate_transaction",
                cancel,
                self.provider.locate_transaction(&txid),
            )
            .await?;
        let block_hash = location
            .block_hash
            .ok_or_else(|| ProofError::TransactionUnconfirmed(txid.to_hex()))?;

        let Block {
            header,
            height,
            mut transactions,
        } = self
            .call("get_block", cancel, self.provider.get_block(&block_hash))
            .await?;

        let txids: Vec<Digest> = transactions.iter().map(|tx| tx.txid()).collect();
        let index = txids
            .iter()
            .position(|id| *id == txid)
            .ok_or_else(|| ProofError::TransactionNotFound(txid.to_hex()))?;

        let tree = MerkleTree::from_digests(txids)?;
        let merkle_proof = tree.generate_proof(index)?;

        let tip = self
            .call("get_best_height", cancel, self.provider.get_best_height())
            .await?;
        let confirmations = confirmations_at(tip, height);

        let transaction = transactions.swap_remove(index);
        let transaction_hex = hex::encode(self.provider.serialize_transaction(&transaction));

        info!(
            "[bb-spv] Generated proof for {} at height {} ({} confirmations, {} siblings)",
            txid,
            height,
            confirmations,
            merkle_proof.proof.len()
        );

        Ok(SpvProof {
            block_header: header,
            merkle_proof,
            transaction,
            block_height: height,
            confirmations,
            block_hash: block_hash.to_hex(),
            transaction_hex,
        })
    }

    /// Generate a proof for one output of `tx_hash`.
    ///
    /// # Errors
    /// As [`generate_proof`](Self::generate_proof), plus
    /// `OutputIndexOutOfRange` if the transaction has no such output.
    pub async fn get_proof_for_utxo(
        &self,
        tx_hash: &str,
        output_index: u32,
        cancel: &CancellationToken,
    ) -> Result<SpvProof, ProofError> {
        let proof = self.generate_proof(tx_hash, cancel).await?;

        let count = proof.transaction.outputs.len();
        if output_index as usize >= count {
            return Err(ProofError::OutputIndexOutOfRange {
                index: output_index,
                count,
            });
        }
        Ok(proof)
    }

    /// Internal consistency check of a proof.
    ///
    /// Checks, in order: the header hashes to `block_hash`, the header's
    /// Merkle root is the proof's root, the transaction hashes to the proof's
    /// leaf, and the sibling path leads from leaf to root.
    pub fn verify_proof(&self, proof: &SpvProof) -> Result<(), ProofError> {
        let computed = double_sha256(&self.provider.serialize_header(&proof.block_header)).to_hex();
        if !computed.eq_ignore_ascii_case(&proof.block_hash) {
            return Err(ProofError::BlockHashMismatch {
                computed,
                expected: proof.block_hash.clone(),
            });
        }

        let header_root = proof.block_header.merkle_root.to_hex();
        if !header_root.eq_ignore_ascii_case(&proof.merkle_proof.merkle_root) {
            return Err(ProofError::MerkleRootMismatch {
                header: header_root,
                proof: proof.merkle_proof.merkle_root.clone(),
            });
        }

        let tx_hash =
            double_sha256(&self.provider.serialize_transaction(&proof.transaction)).to_hex();
        if !tx_hash.eq_ignore_ascii_case(&proof.merkle_proof.tx_hash) {
            return Err(ProofError::TxHashMismatch {
                computed: tx_hash,
                expected: proof.merkle_proof.tx_hash.clone(),
            });
        }

        // A lone transaction is its own root and has no siblings to check.
        let path = &proof.merkle_proof;
        let valid = if path.total_txs == 1 {
            path.index == 0 && path.proof.is_empty() && tx_hash.eq_ignore_ascii_case(&header_root)
        } else {
            verify_proof(path)
        };
        if !valid {
            return Err(ProofError::InvalidMerkleProof);
        }
        Ok(())
    }

    /// Reject proofs buried less than `minimum` blocks deep.
    pub fn validate_minimum_confirmations(
        &self,
        proof: &SpvProof,
        minimum: u64,
    ) -> Result<(), ProofError> {
        invariant_min_confirmations(proof.confirmations, minimum)
    }

    /// Project a proof into the verifier contract's field layout.
    pub fn format_for_external_consumer(proof: &SpvProof) -> ContractProof {
        ContractProof {
            block_header: proof.block_header.to_hex(),
            merkle_proof: proof.merkle_proof.proof.clone(),
            tx_hash: proof.merkle_proof.tx_hash.clone(),
            tx_index: proof.merkle_proof.index,
            merkle_root: proof.merkle_proof.merkle_root.clone(),
            block_height: proof.block_height,
            confirmations: proof.confirmations,
        }
    }

    /// Estimated on-chain size: header, sibling hashes and raw transaction.
    pub fn proof_size(proof: &SpvProof) -> usize {
        BLOCK_HEADER_SIZE
            + DIGEST_LEN * proof.merkle_proof.proof.len()
            + proof.transaction_hex.len() / 2
    }

    /// Serialized header of `block_hash`, as hex.
    pub async fn block_header_hex(
        &self,
        block_hash: &str,
        cancel: &CancellationToken,
    ) -> Result<String, ProofError> {
        let hash = Digest::from_hex(block_hash)?;
        let block = self
            .call("get_block", cancel, self.provider.get_block(&hash))
            .await?;
        Ok(hex::encode(self.provider.serialize_header(&block.header)))
    }
}
