//! # Merkle Tree
//!
//! Binary double-SHA-256 hash tree over a block's transaction ids, with
//! inclusion proof extraction and verification.
//!
//! The tree is stored level by level (`levels[0]` = leaves, last level =
//! root). When a level has an odd number of nodes the last node is paired
//! with itself, so the sibling of position `p` is `p ^ 1`, or `p` itself when
//! `p ^ 1` falls off the end. Proof extraction is pure index arithmetic.

use crate::domain::{hash_pair, Digest, MerkleProof, ProofError};

/// Merkle tree over an ordered list of transaction ids.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MerkleTree {
    /// `levels[0]` holds the leaves in input order; each following level
    /// holds the parents of the previous one. The last level has one node.
    levels: Vec<Vec<Digest>>,
}

impl MerkleTree {
    /// Build a tree from hex transaction ids.
    ///
    /// # Errors
    /// - `EmptyInput` if `tx_ids` is empty
    /// - `InvalidDigest` if any id is not 64 hex characters
    pub fn build<S: AsRef<str>>(tx_ids: &[S]) -> Result<Self, ProofError> {
        let leaves = tx_ids
            .iter()
            .map(|id| Digest::from_hex(id.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_digests(leaves)
    }

    /// Build a tree from already-parsed digests.
    pub fn from_digests(leaves: Vec<Digest>) -> Result<Self, ProofError> {
        if leaves.is_empty() {
            return Err(ProofError::EmptyInput);
        }

        let mut levels = Vec::new();
        let mut current = leaves;
        while current.len() > 1 {
            let next: Vec<Digest> = current
                .chunks(2)
                .map(|pair| {
                    let left = &pair[0];
                    let right = pair.get(1).unwrap_or(left); // Duplicate last if odd
                    hash_pair(left, right)
                })
                .collect();
            levels.push(std::mem::replace(&mut current, next));
        }
        levels.push(current);

        Ok(Self { levels })
    }

    /// Root hash. For a single transaction this is the transaction id itself.
    pub fn root(&self) -> Digest {
        // levels is never empty and the top level always has one node
        self.levels[self.levels.len() - 1][0]
    }

    /// Root as hex.
    pub fn root_hex(&self) -> String {
        self.root().to_hex()
    }

    /// Number of leaves.
    pub fn leaf_count(&self) -> usize {
        self.levels[0].len()
    }

    /// Leaves in input order.
    pub fn leaves(&self) -> &[Digest] {
        &self.levels[0]
    }

    /// Number of hashing rounds from leaf to root.
    pub fn depth(&self) -> usize {
        self.levels.len() - 1
    }

    /// Inclusion proof for the leaf at `index`.
    ///
    /// # Errors
    /// - `IndexOutOfRange` if `index >= leaf_count()`
    pub fn generate_proof(&self, index: usize) -> Result<MerkleProof, ProofError> {
        let count = self.leaf_count();
        if index >= count {
            return Err(ProofError::IndexOutOfRange { index, count });
        }

        let mut siblings = Vec::with_capacity(self.depth());
        let mut pos = index;
        for level in &self.levels[..self.depth()] {
            let sibling = level.get(pos ^ 1).unwrap_or(&level[pos]);
            siblings.push(sibling.to_hex());
            pos /= 2;
        }

        let (wire_index, wire_count) = wire_position(index, count)?;
        Ok(MerkleProof {
            tx_hash: self.levels[0][index].to_hex(),
            merkle_root: self.root_hex(),
            proof: siblings,
            index: wire_index,
            total_txs: wire_count,
        })
    }

    /// Verify a proof against this tree.
    ///
    /// Unlike [`verify_proof`], the position must name one of this tree's
    /// leaves: high index bits beyond the tree depth never reach the hash.
    pub fn verify(&self, proof: &MerkleProof) -> bool {
        (proof.index as usize) < self.leaf_count()
            && proof.merkle_root == self.root_hex()
            && verify_proof(proof)
    }
}

/// Leaf position and count as carried on the wire.
fn wire_position(index: usize, count: usize) -> Result<(u32, u32), ProofError> {
    let out_of_range = || ProofError::IndexOutOfRange { index, count };
    Ok((
        u32::try_from(index).map_err(|_| out_of_range())?,
        u32::try_from(count).map_err(|_| out_of_range())?,
    ))
}

/// Verify a Merkle proof without a tree.
///
/// # Algorithm
///
/// 1. Start with the transaction hash
/// 2. For each sibling, leaf to root:
///    - even running index: hash = H(current || sibling)
///    - odd running index: hash = H(sibling || current)
///    - index /= 2
/// 3. Result must equal the Merkle root byte-for-byte
///
/// Malformed hex, an empty root or an empty sibling list yield `false`.
/// `total_txs` is informational and not consulted.
pub fn verify_proof(proof: &MerkleProof) -> bool {
    if proof.proof.is_empty() {
        return false;
    }
    let (Ok(tx_hash), Ok(root)) = (
        Digest::from_hex(&proof.tx_hash),
        Digest::from_hex(&proof.merkle_root),
    ) else {
        return false;
    };

    let mut current = tx_hash;
    let mut index = proof.index;
    for sibling_hex in &proof.proof {
        let Ok(sibling) = Digest::from_hex(sibling_hex) else {
            return false;
        };
        current = if index % 2 == 0 {
            hash_pair(&current, &sibling)
        } else {
            hash_pair(&sibling, &current)
        };
        index /= 2;
    }

    current == root
}

/// Merkle root of a list of digests, `None` when empty.
pub fn compute_merkle_root(tx_ids: &[Digest]) -> Option<Digest> {
    MerkleTree::from_digests(tx_ids.to_vec())
        .ok()
        .map(|tree| tree.root())
}
