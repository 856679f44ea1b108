//! # Proof Service Configuration
//!
//! Configuration for the proof service, with environment overrides.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::domain::{
    ProofError, DEFAULT_BATCH_CONCURRENCY, DEFAULT_CACHE_TTL, DEFAULT_CLEANUP_INTERVAL,
    DEFAULT_MAX_CACHE_SIZE, DEFAULT_MIN_CONFIRMATIONS, DEFAULT_PROVIDER_TIMEOUT,
};

/// Proof service configuration.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProofServiceConfig {
    /// Confirmations required when a request does not say.
    pub min_confirmations: u32,

    /// Proof cache capacity (number of proofs).
    pub max_cache_size: usize,

    /// Proof cache TTL in seconds, measured from insertion.
    pub cache_ttl_secs: u64,

    /// Interval between background cache sweeps in seconds.
    pub cleanup_interval_secs: u64,

    /// Maximum proofs generated at once in a batch.
    pub batch_concurrency: usize,

    /// Deadline for a single chain-data provider call in seconds.
    pub provider_timeout_secs: u64,
}

impl Default for ProofServiceConfig {
    fn default() -> Self {
        Self {
            min_confirmations: DEFAULT_MIN_CONFIRMATIONS,
            max_cache_size: DEFAULT_MAX_CACHE_SIZE,
            cache_ttl_secs: DEFAULT_CACHE_TTL.as_secs(),
            cleanup_interval_secs: DEFAULT_CLEANUP_INTERVAL.as_secs(),
            batch_concurrency: DEFAULT_BATCH_CONCURRENCY,
            provider_timeout_secs: DEFAULT_PROVIDER_TIMEOUT.as_secs(),
        }
    }
}

impl ProofServiceConfig {
    /// Create a config for testing (smaller values).
    pub fn for_testing() -> Self {
        Self {
            min_confirmations: 1,
            max_cache_size: 16,
            cache_ttl_secs: 60,
            cleanup_interval_secs: 5,
            batch_concurrency: 4,
            provider_timeout_secs: 5,
        }
    }

    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `BB_MIN_CONFIRMATIONS` (default: 6)
    /// - `BB_PROOF_CACHE_SIZE` (default: 1000)
    /// - `BB_PROOF_CACHE_TTL_SECS` (default: 86400)
    /// - `BB_CACHE_CLEANUP_SECS` (default: 3600)
    /// - `BB_BATCH_CONCURRENCY` (default: 10)
    /// - `BB_PROVIDER_TIMEOUT_SECS` (default: 30)
    ///
    /// Missing, unparsable or zero values fall back to the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            min_confirmations: env_nonzero("BB_MIN_CONFIRMATIONS")
                .unwrap_or(defaults.min_confirmations),
            max_cache_size: env_nonzero("BB_PROOF_CACHE_SIZE").unwrap_or(defaults.max_cache_size),
            cache_ttl_secs: env_nonzero("BB_PROOF_CACHE_TTL_SECS")
                .unwrap_or(defaults.cache_ttl_secs),
            cleanup_interval_secs: env_nonzero("BB_CACHE_CLEANUP_SECS")
                .unwrap_or(defaults.cleanup_interval_secs),
            batch_concurrency: env_nonzero("BB_BATCH_CONCURRENCY")
                .unwrap_or(defaults.batch_concurrency),
            provider_timeout_secs: env_nonzero("BB_PROVIDER_TIMEOUT_SECS")
                .unwrap_or(defaults.provider_timeout_secs),
        }
    }

    /// Reject values the service cannot run with.
    pub fn validate(&self) -> Result<(), ProofError> {
        if self.max_cache_size == 0 {
            return Err(ProofError::InvalidConfig(
                "max_cache_size must be at least 1".to_string(),
            ));
        }
        if self.batch_concurrency == 0 {
            return Err(ProofError::InvalidConfig(
                "batch_concurrency must be at least 1".to_string(),
            ));
        }
        if self.cache_ttl_secs == 0 {
            return Err(ProofError::InvalidConfig(
                "cache_ttl_secs must be at least 1".to_string(),
            ));
        }
        if self.cleanup_interval_secs == 0 || self.provider_timeout_secs == 0 {
            return Err(ProofError::InvalidConfig(
                "cleanup and provider timeouts must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Cache TTL.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Background sweep interval.
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    /// Per-call provider deadline.
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }
}

fn env_nonzero<T>(key: &str) -> Option<T>
where
    T: std::str::FromStr + PartialEq + Default,
{
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .filter(|v| *v != T::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ProofServiceConfig::default();
        assert_eq!(config.min_confirmations, 6);
        assert_eq!(config.max_cache_size, 1000);
        assert_eq!(config.cache_ttl(), Duration::from_secs(86_400));
        assert_eq!(config.batch_concurrency, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_testing_config() {
        let config = ProofServiceConfig::for_testing();
        assert_eq!(config.min_confirmations, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let config = ProofServiceConfig {
            max_cache_size: 0,
            ..ProofServiceConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ProofError::InvalidConfig(_))
        ));

        let config = ProofServiceConfig {
            batch_concurrency: 0,
            ..ProofServiceConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_override_and_fallback() {
        env::set_var("BB_PROOF_CACHE_SIZE", "42");
        env::set_var("BB_BATCH_CONCURRENCY", "0");
        env::set_var("BB_MIN_CONFIRMATIONS", "many");
        let config = ProofServiceConfig::from_env();
        env::remove_var("BB_PROOF_CACHE_SIZE");
        env::remove_var("BB_BATCH_CONCURRENCY");
        env::remove_var("BB_MIN_CONFIRMATIONS");

        assert_eq!(config.max_cache_size, 42);
        assert_eq!(config.batch_concurrency, DEFAULT_BATCH_CONCURRENCY);
        assert_eq!(config.min_confirmations, DEFAULT_MIN_CONFIRMATIONS);
    }

    #[test]
    fn test_config_json() {
        let config = ProofServiceConfig::for_testing();
        let json = serde_json::to_string(&config).unwrap();
        let back: ProofServiceConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
