//! # Adapters Layer (Hexagonal Architecture)
//!
//! Implements outbound port traits for the proof engine.

mod in_memory;

pub use in_memory::{coinbase_transaction, synthetic_transaction, InMemoryChain};
