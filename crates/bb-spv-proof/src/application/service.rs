//! # Proof Service
//!
//! Application service in front of the generator and the cache.
//!
//! - Single requests are served from cache when the cached proof is deep
//!   enough, otherwise generated, validated, verified and cached.
//! - Batches fan out one task per request behind a semaphore and join every
//!   task before returning. Failures stay in their own slot. Dropping the
//!   batch future aborts the workers still in flight.
//! - The expiry sweeper is an explicit task owned by the caller.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::cache::ProofCache;
use super::generator::ProofGenerator;
use crate::config::ProofServiceConfig;
use crate::domain::{
    cache_key, BatchProofResponse, CacheStats, ContractProof, ProofError, ProofRequest,
    ProofResponse, SpvProof,
};
use crate::ports::{ChainDataProvider, ProofApi};

/// Wrap `err` with context, leaving cancellation untouched.
fn with_context(err: ProofError, wrap: fn(Box<ProofError>) -> ProofError) -> ProofError {
    if err == ProofError::CancellationRequested {
        return err;
    }
    wrap(Box::new(err))
}

/// SPV proof service.
///
/// Cheap to clone; clones share the generator, the cache and the default
/// confirmation requirement.
#[derive(Clone)]
pub struct ProofService {
    config: ProofServiceConfig,
    generator: Arc<ProofGenerator>,
    cache: Arc<ProofCache>,
    min_confirmations: Arc<AtomicU32>,
}

impl ProofService {
    /// Create a service over `provider`.
    ///
    /// # Errors
    /// - `InvalidConfig` if `config` fails validation
    pub fn new(
        provider: Arc<dyn ChainDataProvider>,
        config: ProofServiceConfig,
    ) -> Result<Self, ProofError> {
        config.validate()?;

        info!(
            "[bb-spv] Proof service on provider {} (min confirmations {}, cache {} x {}s)",
            provider.provider_id(),
            config.min_confirmations,
            config.max_cache_size,
            config.cache_ttl_secs
        );

        Ok(Self {
            generator: Arc::new(ProofGenerator::new(provider, config.provider_timeout())),
            cache: Arc::new(ProofCache::new(config.max_cache_size, config.cache_ttl())),
            min_confirmations: Arc::new(AtomicU32::new(config.min_confirmations)),
            config,
        })
    }

    /// Configuration the service was built with.
    pub fn config(&self) -> &ProofServiceConfig {
        &self.config
    }

    /// Underlying generator.
    pub fn generator(&self) -> &ProofGenerator {
        &self.generator
    }

    /// Underlying cache.
    pub fn cache(&self) -> &ProofCache {
        &self.cache
    }

    /// Start the periodic expiry sweep. It stops when `cancel` fires.
    pub fn spawn_cleanup(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let cache = Arc::clone(&self.cache);
        let period = self.config.cleanup_interval();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("[bb-spv] Cache sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let removed = cache.cleanup();
                        if removed > 0 {
                            info!("[bb-spv] Swept {} expired proofs from cache", removed);
                        }
                    }
                }
            }
        })
    }

    async fn generate(
        &self,
        request: &ProofRequest,
        cancel: &CancellationToken,
    ) -> Result<ProofResponse, ProofError> {
        let key = request.cache_key();
        let explicit = request.explicit_confirmations();

        if let Some(hit) = self.cache.get(&key) {
            if explicit.map_or(true, |required| hit.proof.confirmations >= required) {
                debug!("[bb-spv] Cache hit for {}", key);
                return Ok(ProofResponse {
                    proof_size: ProofGenerator::proof_size(&hit.proof),
                    proof: SpvProof::clone(&hit.proof),
                    verified: true,
                    cached: true,
                    generated_at: hit.created_at,
                });
            }
            debug!(
                "[bb-spv] Cached proof for {} too shallow ({} confirmations), regenerating",
                key, hit.proof.confirmations
            );
        } else {
            debug!("[bb-spv] Cache miss for {}", key);
        }

        let proof = self
            .generator
            .get_proof_for_utxo(&request.tx_hash, request.output_index, cancel)
            .await
            .map_err(|e| with_context(e, ProofError::GenerationFailed))?;

        let required = explicit.unwrap_or_else(|| u64::from(self.min_confirmations()));
        self.generator
            .validate_minimum_confirmations(&proof, required)
            .map_err(|e| with_context(e, ProofError::ConfirmationValidationFailed))?;

        self.generator
            .verify_proof(&proof)
            .map_err(|e| with_context(e, ProofError::VerificationFailed))?;

        let proof_size = ProofGenerator::proof_size(&proof);
        self.cache.set(key, proof.clone());

        Ok(ProofResponse {
            proof,
            verified: true,
            proof_size,
            cached: false,
            generated_at: Utc::now(),
        })
    }

    async fn generate_bounded(
        &self,
        request: &ProofRequest,
        limiter: &Semaphore,
        cancel: &CancellationToken,
    ) -> Result<ProofResponse, ProofError> {
        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ProofError::CancellationRequested),
            permit = limiter.acquire() => permit
                .map_err(|_| ProofError::WorkerFailed("batch limiter closed".to_string()))?,
        };
        self.generate(request, cancel).await
    }
}

#[async_trait]
impl ProofApi for ProofService {
    async fn generate_proof(
        &self,
        request: &ProofRequest,
        cancel: &CancellationToken,
    ) -> Result<ProofResponse, ProofError> {
        self.generate(request, cancel).await
    }

    async fn batch_generate_proofs(
        &self,
        requests: Vec<ProofRequest>,
        cancel: &CancellationToken,
    ) -> BatchProofResponse {
        let batch_id = Uuid::new_v4();
        let total = requests.len();
        let limiter = Arc::new(Semaphore::new(self.config.batch_concurrency));

        debug!(
            "[bb-spv] Batch {} started: {} requests, {} at a time",
            batch_id, total, self.config.batch_concurrency
        );

        // Dropping the set aborts every worker still running
        let mut workers = JoinSet::new();
        for (index, request) in requests.into_iter().enumerate() {
            let service = self.clone();
            let limiter = Arc::clone(&limiter);
            let cancel = cancel.clone();
            workers.spawn(async move {
                let result = service
                    .generate_bounded(&request, &limiter, &cancel)
                    .await;
                (index, result)
            });
        }

        let mut slots: Vec<Option<Result<ProofResponse, ProofError>>> =
            (0..total).map(|_| None).collect();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(join_err) => {
                    warn!("[bb-spv] Batch {} worker died: {}", batch_id, join_err);
                }
            }
        }

        let mut responses = Vec::with_capacity(total);
        let mut failures = Vec::new();
        for (index, slot) in slots.into_iter().enumerate() {
            let outcome = slot.unwrap_or_else(|| {
                Err(ProofError::WorkerFailed(format!(
                    "worker for request {} did not complete",
                    index
                )))
            });
            match outcome {
                Ok(response) => responses.push(Some(response)),
                Err(err) => {
                    warn!("[bb-spv] Batch {} request {} failed: {}", batch_id, index, err);
                    responses.push(None);
                    failures.push((index, err));
                }
            }
        }

        let failed_indices: Vec<usize> = failures.iter().map(|(index, _)| *index).collect();
        let error = failures
            .into_iter()
            .next()
            .map(|(index, source)| ProofError::BatchFailed {
                index,
                failed_indices: failed_indices.clone(),
                source: Box::new(source),
            });

        info!(
            "[bb-spv] Batch {} finished: {}/{} proofs",
            batch_id,
            total - failed_indices.len(),
            total
        );

        BatchProofResponse { responses, error }
    }

    fn verify_proof(&self, proof: &SpvProof) -> Result<(), ProofError> {
        self.generator.verify_proof(proof)
    }

    async fn get_proof_for_contract(
        &self,
        request: &ProofRequest,
        cancel: &CancellationToken,
    ) -> Result<ContractProof, ProofError> {
        let response = self.generate(request, cancel).await?;
        Ok(ProofGenerator::format_for_external_consumer(
            &response.proof,
        ))
    }

    fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    fn clear_cache(&self) {
        self.cache.clear();
        info!("[bb-spv] Proof cache cleared");
    }

    fn invalidate(&self, tx_hash: &str, output_index: u32) -> bool {
        self.cache.invalidate(&cache_key(tx_hash, output_index))
    }

    fn min_confirmations(&self) -> u32 {
        self.min_confirmations.load(Ordering::Relaxed)
    }

    fn set_min_confirmations(&self, confirmations: u32) {
        self.min_confirmations
            .store(confirmations, Ordering::Relaxed);
        info!("[bb-spv] Minimum confirmations set to {}", confirmations);
    }
}
