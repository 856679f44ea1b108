//! # Domain Invariants
//!
//! Business rules that must always hold true.

use std::time::Duration;

use super::errors::ProofError;

/// Default minimum confirmation depth.
pub const DEFAULT_MIN_CONFIRMATIONS: u32 = 6;

/// Default proof cache capacity.
pub const DEFAULT_MAX_CACHE_SIZE: usize = 1000;

/// Default proof cache TTL.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default interval between background cache sweeps.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Default number of proofs generated concurrently in a batch.
pub const DEFAULT_BATCH_CONCURRENCY: usize = 10;

/// Default deadline for a single provider call.
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);

/// Serialized block header size.
pub const BLOCK_HEADER_SIZE: usize = 80;

/// Confirmation depth of a block: inclusive count from block to tip.
///
/// A block above the reported tip (provider raced a reorg or a new block)
/// counts as zero confirmations rather than wrapping.
pub fn confirmations_at(tip_height: u64, block_height: u64) -> u64 {
    if block_height > tip_height {
        return 0;
    }
    tip_height - block_height + 1
}

/// Invariant: a proof is only handed out once it is buried deep enough.
pub fn invariant_min_confirmations(actual: u64, required: u64) -> Result<(), ProofError> {
    if actual < required {
        return Err(ProofError::InsufficientConfirmations { actual, required });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirmations_inclusive() {
        assert_eq!(confirmations_at(100, 100), 1);
        assert_eq!(confirmations_at(105, 100), 6);
    }

    #[test]
    fn test_confirmations_block_above_tip() {
        assert_eq!(confirmations_at(99, 100), 0);
    }

    #[test]
    fn test_invariant_min_confirmations() {
        assert!(invariant_min_confirmations(6, 6).is_ok());
        assert!(invariant_min_confirmations(10, 6).is_ok());
        assert!(matches!(
            invariant_min_confirmations(5, 6),
            Err(ProofError::InsufficientConfirmations { actual: 5, required: 6 })
        ));
    }
}
