//! # Application Module
//!
//! Proof generation, caching and the service combining them.

pub mod cache;
pub mod generator;
pub mod service;

pub use cache::ProofCache;
pub use generator::ProofGenerator;
pub use service::ProofService;
