//! # Domain Entities
//!
//! Chain data as handed over by the provider, and the proof records built
//! from it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::errors::ProofError;
use super::value_objects::{double_sha256, Digest, MerkleProof};

/// Block header in its 80-byte wire layout.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockHeader {
    /// Block version.
    pub version: i32,
    /// Hash of the previous block.
    pub prev_block: Digest,
    /// Merkle root of the block's transactions.
    pub merkle_root: Digest,
    /// Unix timestamp.
    pub time: u32,
    /// Compact difficulty target.
    pub bits: u32,
    /// Nonce.
    pub nonce: u32,
}

impl BlockHeader {
    /// Double hash of the serialized header.
    pub fn block_hash(&self) -> Digest {
        double_sha256(&self.to_bytes())
    }

    /// Header as lowercase hex.
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }
}

/// Transaction input. Scripts are opaque.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TxInput {
    /// Transaction holding the spent output.
    pub prev_txid: Digest,
    /// Index of the spent output.
    pub prev_vout: u32,
    /// Unlocking script.
    #[serde(with = "hex::serde")]
    pub script_sig: Vec<u8>,
    /// Sequence number.
    pub sequence: u32,
}

/// Transaction output.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TxOutput {
    /// Amount in base units.
    pub value: u64,
    /// Locking script.
    #[serde(with = "hex::serde")]
    pub script_pubkey: Vec<u8>,
}

/// Raw transaction in legacy wire layout.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawTransaction {
    /// Transaction version.
    pub version: i32,
    /// Inputs, in order.
    pub inputs: Vec<TxInput>,
    /// Outputs, in order.
    pub outputs: Vec<TxOutput>,
    /// Lock time.
    pub lock_time: u32,
}

impl RawTransaction {
    /// Transaction id: double hash of the serialized transaction.
    pub fn txid(&self) -> Digest {
        double_sha256(&self.to_bytes())
    }

    /// Serialized transaction as lowercase hex.
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }
}

/// Full block as fetched from the provider.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Block {
    /// Block header.
    pub header: BlockHeader,
    /// Height in the chain.
    pub height: u64,
    /// Transactions in block order.
    pub transactions: Vec<RawTransaction>,
}

impl Block {
    /// Transaction ids in block order.
    pub fn txids(&self) -> Vec<Digest> {
        self.transactions.iter().map(RawTransaction::txid).collect()
    }
}

/// Complete SPV proof for one transaction.
///
/// `confirmations` is a snapshot taken at generation time.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpvProof {
    /// Header of the containing block.
    pub block_header: BlockHeader,
    /// Inclusion proof against the header's Merkle root.
    pub merkle_proof: MerkleProof,
    /// The proven transaction.
    pub transaction: RawTransaction,
    /// Height of the containing block.
    pub block_height: u64,
    /// Tip height - block height + 1, at generation time.
    pub confirmations: u64,
    /// Hash of the containing block (hex).
    pub block_hash: String,
    /// Serialized transaction (hex).
    pub transaction_hex: String,
}

/// A cached proof with access metadata.
///
/// Returned by the cache as a snapshot; the wrapped proof is shared and
/// never mutated.
#[derive(Clone, Debug)]
pub struct CachedProof {
    /// The cached proof.
    pub proof: Arc<SpvProof>,
    /// When the entry was inserted.
    pub created_at: DateTime<Utc>,
    /// Last hit (or insertion).
    pub accessed_at: DateTime<Utc>,
    /// Insertion counts as one use; every hit adds one.
    pub use_count: u64,
}

/// Proof request as received from the gateway.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProofRequest {
    /// Transaction id (hex).
    pub tx_hash: String,
    /// Output being proven.
    #[serde(default)]
    pub output_index: u32,
    /// Minimum depth. Absent or zero means the service default.
    #[serde(default)]
    pub required_confirmations: Option<u32>,
}

impl ProofRequest {
    /// Request with the service default confirmation depth.
    pub fn new(tx_hash: impl Into<String>, output_index: u32) -> Self {
        Self {
            tx_hash: tx_hash.into(),
            output_index,
            required_confirmations: None,
        }
    }

    /// Set an explicit confirmation requirement.
    pub fn with_confirmations(mut self, required: u32) -> Self {
        self.required_confirmations = Some(required);
        self
    }

    /// Explicit requirement, treating zero as unset.
    pub fn explicit_confirmations(&self) -> Option<u64> {
        self.required_confirmations
            .filter(|&n| n > 0)
            .map(u64::from)
    }

    /// Cache key: `tx_hash:output_index`.
    pub fn cache_key(&self) -> String {
        cache_key(&self.tx_hash, self.output_index)
    }
}

/// Cache key for a transaction output.
pub fn cache_key(tx_hash: &str, output_index: u32) -> String {
    format!("{}:{}", tx_hash, output_index)
}

/// Proof plus delivery metadata.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProofResponse {
    /// The proof.
    pub proof: SpvProof,
    /// Passed the consistency check.
    pub verified: bool,
    /// Estimated on-chain size in bytes.
    pub proof_size: usize,
    /// Served from cache.
    pub cached: bool,
    /// Generation time (cache insertion time for hits).
    pub generated_at: DateTime<Utc>,
}

/// Cache statistics.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheStats {
    /// Live entries.
    pub cache_size: usize,
    /// Configured capacity.
    pub max_cache_size: usize,
    /// Sum of use counts over live entries.
    pub total_hits: u64,
    /// Least recent access among live entries.
    pub oldest_access: Option<DateTime<Utc>>,
    /// Most recent access among live entries.
    pub newest_access: Option<DateTime<Utc>>,
    /// TTL, e.g. `"86400s"`.
    pub expiry_duration: String,
}

/// Proof projected for the on-chain verifier contract.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ContractProof {
    /// Serialized header (hex).
    pub block_header: String,
    /// Sibling hashes, leaf to root.
    pub merkle_proof: Vec<String>,
    /// Leaf hash.
    pub tx_hash: String,
    /// Leaf index.
    pub tx_index: u32,
    /// Merkle root.
    pub merkle_root: String,
    /// Block height.
    pub block_height: u64,
    /// Confirmations at generation time.
    pub confirmations: u64,
}

/// Outcome of a batch request.
///
/// `responses[i]` answers `requests[i]`; failed slots are `None`.
#[derive(Clone, Debug)]
pub struct BatchProofResponse {
    /// One slot per request, in request order.
    pub responses: Vec<Option<ProofResponse>>,
    /// First failure (listing every failing index), if any.
    pub error: Option<ProofError>,
}

impl BatchProofResponse {
    /// Number of populated slots.
    pub fn succeeded(&self) -> usize {
        self.responses.iter().filter(|r| r.is_some()).count()
    }

    /// Indices of empty slots.
    pub fn failed_indices(&self) -> Vec<usize> {
        self.responses
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.is_none().then_some(i))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tx() -> RawTransaction {
        RawTransaction {
            version: 1,
            inputs: vec![TxInput {
                prev_txid: Digest::ZERO,
                prev_vout: u32::MAX,
                script_sig: vec![0x51],
                sequence: u32::MAX,
            }],
            outputs: vec![TxOutput {
                value: 50,
                script_pubkey: vec![0x76, 0xa9],
            }],
            lock_time: 0,
        }
    }

    #[test]
    fn test_cache_key_format() {
        let req = ProofRequest::new("abcd", 2);
        assert_eq!(req.cache_key(), "abcd:2");
    }

    #[test]
    fn test_zero_confirmations_means_unset() {
        assert_eq!(ProofRequest::new("a", 0).explicit_confirmations(), None);
        assert_eq!(
            ProofRequest::new("a", 0)
                .with_confirmations(0)
                .explicit_confirmations(),
            None
        );
        assert_eq!(
            ProofRequest::new("a", 0)
                .with_confirmations(3)
                .explicit_confirmations(),
            Some(3)
        );
    }

    #[test]
    fn test_request_json_defaults() {
        let req: ProofRequest = serde_json::from_str(r#"{"tx_hash":"ff"}"#).unwrap();
        assert_eq!(req.output_index, 0);
        assert_eq!(req.required_confirmations, None);
    }

    #[test]
    fn test_txid_changes_with_content() {
        let tx = sample_tx();
        let mut other = tx.clone();
        other.lock_time = 1;
        assert_ne!(tx.txid(), other.txid());
    }

    #[test]
    fn test_scripts_serialize_as_hex() {
        let json = serde_json::to_value(sample_tx()).unwrap();
        assert_eq!(json["outputs"][0]["script_pubkey"], "76a9");
    }

    #[test]
    fn test_batch_failed_indices() {
        let batch = BatchProofResponse {
            responses: vec![None, None, None],
            error: None,
        };
        assert_eq!(batch.succeeded(), 0);
        assert_eq!(batch.failed_indices(), vec![0, 1, 2]);
    }
}
