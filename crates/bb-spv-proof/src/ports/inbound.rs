//! # Inbound Ports
//!
//! API trait defining what the proof engine offers the gateway.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::domain::{
    BatchProofResponse, CacheStats, ContractProof, ProofError, ProofRequest, ProofResponse,
    SpvProof,
};

/// SPV proof API - inbound port.
#[async_trait]
pub trait ProofApi: Send + Sync {
    /// Return a cached proof or generate, validate and cache a new one.
    async fn generate_proof(
        &self,
        request: &ProofRequest,
        cancel: &CancellationToken,
    ) -> Result<ProofResponse, ProofError>;

    /// Generate proofs concurrently. `responses[i]` answers `requests[i]`.
    async fn batch_generate_proofs(
        &self,
        requests: Vec<ProofRequest>,
        cancel: &CancellationToken,
    ) -> BatchProofResponse;

    /// Consistency and Merkle check of an existing proof.
    fn verify_proof(&self, proof: &SpvProof) -> Result<(), ProofError>;

    /// Proof in the verifier contract's field layout.
    async fn get_proof_for_contract(
        &self,
        request: &ProofRequest,
        cancel: &CancellationToken,
    ) -> Result<ContractProof, ProofError>;

    /// Cache statistics.
    fn cache_stats(&self) -> CacheStats;

    /// Drop every cached proof.
    fn clear_cache(&self);

    /// Drop the cached proof for one output. Returns true if one was present.
    fn invalidate(&self, tx_hash: &str, output_index: u32) -> bool;

    /// Default confirmation requirement.
    fn min_confirmations(&self) -> u32;

    /// Change the default confirmation requirement.
    fn set_min_confirmations(&self, confirmations: u32);
}
