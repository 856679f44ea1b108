//! # Domain Errors
//!
//! Error types for the SPV proof engine.
//!
//! The Merkle layer only reports structural/input errors. The generator adds
//! provider and consistency errors. The service wraps them with context.

use thiserror::Error;

/// SPV proof error types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProofError {
    /// A transaction id or hash field is not a well-formed 32-byte hex digest.
    #[error("Invalid digest: {0}")]
    InvalidDigest(String),

    /// Tried to build a Merkle tree over zero transactions.
    #[error("Cannot build a Merkle tree from an empty transaction list")]
    EmptyInput,

    /// Leaf index outside the tree.
    #[error("Transaction index {index} out of range (tree has {count} leaves)")]
    IndexOutOfRange {
        /// Requested index
        index: usize,
        /// Number of leaves
        count: usize,
    },

    /// Output index outside the transaction's outputs.
    #[error("Output index {index} out of range (transaction has {count} outputs)")]
    OutputIndexOutOfRange {
        /// Requested output index
        index: u32,
        /// Number of outputs
        count: usize,
    },

    /// Transaction is known but not yet included in a block.
    #[error("Transaction {0} not yet included in a block")]
    TransactionUnconfirmed(String),

    /// Transaction missing from the block it was resolved to.
    #[error("Transaction {0} not found in block")]
    TransactionNotFound(String),

    /// Recomputed header hash differs from the stored block hash.
    #[error("Block hash mismatch: header hashes to {computed}, proof says {expected}")]
    BlockHashMismatch {
        /// Hash recomputed from the header
        computed: String,
        /// Hash stored in the proof
        expected: String,
    },

    /// Header Merkle root differs from the Merkle proof root.
    #[error("Merkle root mismatch: header has {header}, proof has {proof}")]
    MerkleRootMismatch {
        /// Root embedded in the header
        header: String,
        /// Root carried by the Merkle proof
        proof: String,
    },

    /// Transaction hash differs from the Merkle proof leaf.
    #[error("Transaction hash mismatch: transaction hashes to {computed}, proof says {expected}")]
    TxHashMismatch {
        /// Hash recomputed from the transaction
        computed: String,
        /// Leaf hash carried by the Merkle proof
        expected: String,
    },

    /// Merkle path does not lead to the stated root.
    #[error("Invalid Merkle proof")]
    InvalidMerkleProof,

    /// Not buried deep enough yet.
    #[error("Insufficient confirmations: {actual} < {required}")]
    InsufficientConfirmations {
        /// Confirmations at generation time
        actual: u64,
        /// Required minimum
        required: u64,
    },

    /// Chain-data provider failed or timed out.
    #[error("Chain data provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// The caller cancelled the operation.
    #[error("Operation cancelled")]
    CancellationRequested,

    /// Raw transaction or header bytes could not be decoded.
    #[error("Codec error: {0}")]
    Codec(String),

    /// Invalid service configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A batch worker task panicked or was aborted.
    #[error("Proof worker failed: {0}")]
    WorkerFailed(String),

    /// Proof generation failed.
    #[error("failed to generate proof: {0}")]
    GenerationFailed(Box<ProofError>),

    /// Generated proof does not meet the confirmation requirement.
    #[error("confirmation validation failed: {0}")]
    ConfirmationValidationFailed(Box<ProofError>),

    /// Generated proof failed the consistency check.
    #[error("proof verification failed: {0}")]
    VerificationFailed(Box<ProofError>),

    /// At least one request in a batch failed.
    #[error("batch error at index {index} ({} of batch failed): {source}", .failed_indices.len())]
    BatchFailed {
        /// First failing index
        index: usize,
        /// Every failing index, ascending
        failed_indices: Vec<usize>,
        /// Error of the first failing request
        source: Box<ProofError>,
    },
}

impl ProofError {
    /// Strip context wrappers down to the underlying error kind.
    pub fn root_cause(&self) -> &ProofError {
        match self {
            ProofError::GenerationFailed(inner)
            | ProofError::ConfirmationValidationFailed(inner)
            | ProofError::VerificationFailed(inner) => inner.root_cause(),
            ProofError::BatchFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// True if the caller may simply ask again later.
    ///
    /// Confirmation shortfall, unconfirmed transactions and provider outages
    /// are transient. Everything else will fail the same way on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.root_cause(),
            ProofError::InsufficientConfirmations { .. }
                | ProofError::TransactionUnconfirmed(_)
                | ProofError::ProviderUnavailable(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_confirmations_error() {
        let err = ProofError::InsufficientConfirmations {
            actual: 2,
            required: 6,
        };
        assert!(err.to_string().contains("2 < 6"));
    }

    #[test]
    fn test_context_wrappers_keep_message() {
        let err = ProofError::GenerationFailed(Box::new(ProofError::TransactionUnconfirmed(
            "abcd".to_string(),
        )));
        let msg = err.to_string();
        assert!(msg.starts_with("failed to generate proof"));
        assert!(msg.contains("abcd"));
    }

    #[test]
    fn test_root_cause_unwraps_nested() {
        let err = ProofError::BatchFailed {
            index: 3,
            failed_indices: vec![3, 5],
            source: Box::new(ProofError::ConfirmationValidationFailed(Box::new(
                ProofError::InsufficientConfirmations {
                    actual: 1,
                    required: 6,
                },
            ))),
        };
        assert!(matches!(
            err.root_cause(),
            ProofError::InsufficientConfirmations { actual: 1, required: 6 }
        ));
        assert!(err.to_string().contains("index 3"));
        assert!(err.to_string().contains("2 of batch failed"));
    }

    #[test]
    fn test_retryable() {
        assert!(ProofError::ProviderUnavailable("timeout".into()).is_retryable());
        assert!(!ProofError::InvalidMerkleProof.is_retryable());
        assert!(!ProofError::CancellationRequested.is_retryable());
    }
}
