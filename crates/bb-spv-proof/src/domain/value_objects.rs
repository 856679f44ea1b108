//! # Domain Value Objects
//!
//! Immutable value types for the SPV proof engine.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest as _, Sha256};
use std::fmt;
use std::str::FromStr;

use super::errors::ProofError;

/// Length of a digest in bytes.
pub const DIGEST_LEN: usize = 32;

/// 32-byte double-SHA-256 digest.
///
/// Hex form is the raw bytes in order, lowercase. Transaction ids, block
/// hashes and Merkle roots all use this form.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Digest([u8; DIGEST_LEN]);

impl Digest {
    /// All-zero digest.
    pub const ZERO: Digest = Digest([0u8; DIGEST_LEN]);

    /// Wrap raw bytes.
    pub const fn new(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse a 64-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, ProofError> {
        let mut out = [0u8; DIGEST_LEN];
        hex::decode_to_slice(s, &mut out)
            .map_err(|e| ProofError::InvalidDigest(format!("{s:?}: {e}")))?;
        Ok(Self(out))
    }

    /// Lowercase hex of the raw bytes.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }
}

impl From<[u8; DIGEST_LEN]> for Digest {
    fn from(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Digest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl FromStr for Digest {
    type Err = ProofError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Two chained rounds of SHA-256.
pub fn double_sha256(data: &[u8]) -> Digest {
    let first = Sha256::digest(data);
    Digest(Sha256::digest(first).into())
}

/// Parent hash: `double_sha256(left || right)`.
pub fn hash_pair(left: &Digest, right: &Digest) -> Digest {
    let mut buf = [0u8; DIGEST_LEN * 2];
    buf[..DIGEST_LEN].copy_from_slice(&left.0);
    buf[DIGEST_LEN..].copy_from_slice(&right.0);
    double_sha256(&buf)
}

/// Merkle inclusion proof in wire form.
///
/// All hashes are hex strings so that a proof received over the wire can be
/// checked without first being validated; malformed fields just fail
/// verification.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MerkleProof {
    /// Leaf being proven.
    pub tx_hash: String,
    /// Root the path must reach.
    pub merkle_root: String,
    /// Sibling hashes, leaf to root.
    pub proof: Vec<String>,
    /// Leaf position in block order.
    pub index: u32,
    /// Number of leaves in the tree.
    pub total_txs: u32,
}

/// Where the provider says a transaction lives.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxLocation {
    /// Containing block, `None` while unconfirmed.
    pub block_hash: Option<Digest>,
    /// Confirmations as reported by the node.
    pub confirmations: u64,
}

impl TxLocation {
    /// Location of a transaction still in the mempool.
    pub fn unconfirmed() -> Self {
        Self {
            block_hash: None,
            confirmations: 0,
        }
    }

    /// Location of a mined transaction.
    pub fn in_block(block_hash: Digest, confirmations: u64) -> Self {
        Self {
            block_hash: Some(block_hash),
            confirmations,
        }
    }
}
