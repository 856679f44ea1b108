//! # Proof Cache
//!
//! Bounded, TTL-limited proof cache keyed by `tx_hash:output_index`.
//!
//! One reader/writer lock guards the map: `get` and `stats` share it,
//! `set`, `cleanup`, `clear` and `invalidate` take it exclusively. Access
//! recency lives inside each entry so a hit only needs the shared lock.
//! Eviction removes the least recently *accessed* entry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::debug;

use crate::domain::{CacheStats, CachedProof, SpvProof};

#[derive(Clone, Copy)]
struct AccessStamp {
    /// Position in the cache-wide access order.
    seq: u64,
    at: DateTime<Utc>,
}

struct CacheEntry {
    proof: Arc<SpvProof>,
    /// Monotonic insertion time, for TTL.
    inserted: Instant,
    created_at: DateTime<Utc>,
    access: Mutex<AccessStamp>,
    use_count: AtomicU64,
}

impl CacheEntry {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.inserted.elapsed() > ttl
    }

    fn snapshot(&self) -> CachedProof {
        CachedProof {
            proof: Arc::clone(&self.proof),
            created_at: self.created_at,
            accessed_at: self.access.lock().at,
            use_count: self.use_count.load(Ordering::Relaxed),
        }
    }
}

/// In-memory proof cache.
pub struct ProofCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    max_size: usize,
    ttl: Duration,
    access_seq: AtomicU64,
}

impl ProofCache {
    /// Create a cache holding at most `max_size` proofs for `ttl` each.
    ///
    /// A zero `max_size` is treated as one.
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_size: max_size.max(1),
            ttl,
            access_seq: AtomicU64::new(0),
        }
    }

    fn next_stamp(&self) -> AccessStamp {
        AccessStamp {
            seq: self.access_seq.fetch_add(1, Ordering::Relaxed) + 1,
            at: Utc::now(),
        }
    }

    /// Look up a proof. Expired entries are misses even before cleanup.
    ///
    /// A hit refreshes the access time and bumps the use count.
    pub fn get(&self, key: &str) -> Option<CachedProof> {
        let entries = self.entries.read();
        let entry = entries.get(key)?;
        if entry.is_expired(self.ttl) {
            debug!("[bb-spv] Cache entry {} expired", key);
            return None;
        }

        *entry.access.lock() = self.next_stamp();
        entry.use_count.fetch_add(1, Ordering::Relaxed);
        Some(entry.snapshot())
    }

    /// Insert or replace a proof.
    ///
    /// Inserting a new key into a full cache first evicts the least recently
    /// accessed entry. Replacing an existing key evicts nothing.
    pub fn set(&self, key: impl Into<String>, proof: SpvProof) {
        let key = key.into();
        let mut entries = self.entries.write();

        if !entries.contains_key(&key) && entries.len() >= self.max_size {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.access.lock().seq)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
                debug!("[bb-spv] Evicted least recently used proof {}", oldest);
            }
        }

        let stamp = self.next_stamp();
        entries.insert(
            key,
            CacheEntry {
                proof: Arc::new(proof),
                inserted: Instant::now(),
                created_at: stamp.at,
                access: Mutex::new(stamp),
                use_count: AtomicU64::new(1),
            },
        );
    }

    /// Remove one entry. Returns true if it was present.
    pub fn invalidate(&self, key: &str) -> bool {
        self.entries.write().remove(key).is_some()
    }

    /// Physically remove expired entries. Returns how many were dropped.
    pub fn cleanup(&self) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        let ttl = self.ttl;
        entries.retain(|_, entry| !entry.is_expired(ttl));
        before - entries.len()
    }

    /// Remove every entry.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// True if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Configured capacity.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Configured TTL.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Statistics over live (unexpired) entries.
    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.read();
        let mut stats = CacheStats {
            cache_size: 0,
            max_cache_size: self.max_size,
            total_hits: 0,
            oldest_access: None,
            newest_access: None,
            expiry_duration: format!("{}s", self.ttl.as_secs()),
        };

        for entry in entries.values().filter(|e| !e.is_expired(self.ttl)) {
            let accessed = entry.access.lock().at;
            stats.cache_size += 1;
            stats.total_hits += entry.use_count.load(Ordering::Relaxed);
            stats.oldest_access = Some(stats.oldest_access.map_or(accessed, |t| t.min(accessed)));
            stats.newest_access = Some(stats.newest_access.map_or(accessed, |t| t.max(accessed)));
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::synthetic_transaction;
    use crate::algorithms::MerkleTree;
    use crate::domain::{BlockHeader, Digest};

    fn sample_proof(seed: u64) -> SpvProof {
        let transaction = synthetic_transaction(seed, 1);
        let tree = MerkleTree::from_digests(vec![transaction.txid()]).unwrap();
        let block_header = BlockHeader {
            version: 1,
            prev_block: Digest::ZERO,
            merkle_root: tree.root(),
            time: 0,
            bits: 0,
            nonce: seed as u32,
        };
        SpvProof {
            block_hash: block_header.block_hash().to_hex(),
            block_header,
            merkle_proof: tree.generate_proof(0).unwrap(),
            transaction_hex: transaction.to_hex(),
            transaction,
            block_height: seed,
            confirmations: 6,
        }
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let cache = ProofCache::new(10, Duration::from_secs(60));
        cache.set("a:0", sample_proof(1));

        let hit = cache.get("a:0").unwrap();
        assert_eq!(hit.proof.block_height, 1);
        assert_eq!(hit.use_count, 2);
        assert!(hit.accessed_at >= hit.created_at);
        assert!(cache.get("b:0").is_none());
    }

    #[tokio::test]
    async fn test_evicts_least_recently_accessed() {
        let cache = ProofCache::new(2, Duration::from_secs(60));
        cache.set("a:0", sample_proof(1));
        cache.set("b:0", sample_proof(2));

        // "a" was inserted first but touched last
        assert!(cache.get("a:0").is_some());
        cache.set("c:0", sample_proof(3));

        assert_eq!(cache.len(), 2);
        assert!(cache.get("a:0").is_some());
        assert!(cache.get("b:0").is_none());
        assert!(cache.get("c:0").is_some());
    }

    #[tokio::test]
    async fn test_replace_does_not_evict() {
        let cache = ProofCache::new(2, Duration::from_secs(60));
        cache.set("a:0", sample_proof(1));
        cache.set("b:0", sample_proof(2));
        cache.set("a:0", sample_proof(3));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a:0").unwrap().proof.block_height, 3);
        assert!(cache.get("b:0").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_a_miss_before_cleanup() {
        let cache = ProofCache::new(10, Duration::from_secs(60));
        cache.set("a:0", sample_proof(1));

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(cache.get("a:0").is_some());

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(cache.get("a:0").is_none());
        // Still physically present until swept
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().cache_size, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_counts_from_creation_not_access() {
        let cache = ProofCache::new(10, Duration::from_secs(60));
        cache.set("a:0", sample_proof(1));

        for _ in 0..5 {
            tokio::time::advance(Duration::from_secs(15)).await;
            let _ = cache.get("a:0");
        }
        assert!(cache.get("a:0").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_removes_only_expired() {
        let cache = ProofCache::new(10, Duration::from_secs(60));
        cache.set("old:0", sample_proof(1));
        tokio::time::advance(Duration::from_secs(45)).await;
        cache.set("new:0", sample_proof(2));
        tokio::time::advance(Duration::from_secs(30)).await;

        assert_eq!(cache.cleanup(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("new:0").is_some());
    }

    #[tokio::test]
    async fn test_clear_and_invalidate() {
        let cache = ProofCache::new(10, Duration::from_secs(60));
        cache.set("a:0", sample_proof(1));
        cache.set("a:1", sample_proof(1));
        cache.set("b:0", sample_proof(2));

        assert!(cache.invalidate("a:1"));
        assert!(!cache.invalidate("a:1"));
        assert_eq!(cache.len(), 2);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_stats() {
        let cache = ProofCache::new(5, Duration::from_secs(86_400));
        let empty = cache.stats();
        assert_eq!(empty.cache_size, 0);
        assert!(empty.oldest_access.is_none());

        cache.set("a:0", sample_proof(1));
        cache.set("b:0", sample_proof(2));
        cache.get("a:0");
        cache.get("a:0");

        let stats = cache.stats();
        assert_eq!(stats.cache_size, 2);
        assert_eq!(stats.max_cache_size, 5);
        assert_eq!(stats.total_hits, 4);
        assert_eq!(stats.expiry_duration, "86400s");
        assert!(stats.oldest_access <= stats.newest_access);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_access() {
        let cache = Arc::new(ProofCache::new(8, Duration::from_secs(60)));
        let mut handles = Vec::new();
        for worker in 0..8u64 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move {
                for i in 0..50u64 {
                    let key = format!("{}:{}", worker, i % 4);
                    if cache.get(&key).is_none() {
                        cache.set(key, sample_proof(i));
                    }
                    if i % 10 == 0 {
                        cache.cleanup();
                    }
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert!(cache.len() <= 8);
    }
}
