//! bb-proof: BitBridge proof tool
//!
//! - `merkle`: build a tree over transaction ids and print every proof
//! - `verify`: check a serialized Merkle proof
//! - `demo`: run a batch through the proof service on an in-memory chain

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use bb_spv_proof::{
    coinbase_transaction, synthetic_transaction, verify_proof, BatchProofResponse, CacheStats,
    CancellationToken, InMemoryChain, MerkleProof, MerkleTree, ProofApi, ProofRequest,
    ProofResponse, ProofService, ProofServiceConfig, RawTransaction,
};

/// BitBridge proof tool
#[derive(Parser, Debug)]
#[command(name = "bb-proof")]
#[command(about = "Build, verify and serve SPV Merkle proofs", version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build a Merkle tree and print the root and every inclusion proof
    Merkle {
        /// Transaction ids (64 hex characters each), in block order
        #[arg(required = true)]
        txids: Vec<String>,
    },

    /// Verify a Merkle proof stored as JSON
    Verify {
        /// Path to the proof file
        file: PathBuf,
    },

    /// Generate proofs on a synthetic in-memory chain
    Demo {
        /// Blocks to mine
        #[arg(long, default_value = "8")]
        blocks: usize,

        /// Payment transactions per block (besides the coinbase)
        #[arg(long, default_value = "5")]
        txs_per_block: usize,
    },
}

#[derive(Serialize)]
struct ProofCheck {
    proof: MerkleProof,
    valid: bool,
}

#[derive(Serialize)]
struct MerkleReport {
    root: String,
    leaves: usize,
    depth: usize,
    proofs: Vec<ProofCheck>,
}

#[derive(Serialize)]
struct DemoReport {
    tip_height: Option<u64>,
    responses: Vec<Option<ProofResponse>>,
    failed_indices: Vec<usize>,
    error: Option<String>,
    repeat_was_cached: bool,
    cache: CacheStats,
    finished_at: chrono::DateTime<chrono::Utc>,
}

fn init_tracing() -> Result<()> {
    let filter = std::env::var("BB_LOG_LEVEL")
        .ok()
        .map(EnvFilter::new)
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));

    let json = std::env::var("BB_JSON_LOGS")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    // Logs go to stderr so stdout stays machine-readable
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);
    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| anyhow::anyhow!("failed to initialise logging: {}", e))
}

/// Whether `proof` holds. A lone transaction is its own root and carries
/// no siblings, which the path check alone would reject.
fn proof_holds(proof: &MerkleProof) -> bool {
    if proof.proof.is_empty() {
        return proof.index == 0
            && !proof.tx_hash.is_empty()
            && proof.tx_hash.eq_ignore_ascii_case(&proof.merkle_root);
    }
    verify_proof(proof)
}

fn merkle_report(txids: &[String]) -> Result<MerkleReport> {
    let tree = MerkleTree::build(txids).context("failed to build Merkle tree")?;

    let proofs = (0..tree.leaf_count())
        .map(|i| {
            let proof = tree.generate_proof(i)?;
            let valid = proof_holds(&proof);
            Ok(ProofCheck { proof, valid })
        })
        .collect::<Result<Vec<_>, bb_spv_proof::ProofError>>()?;

    Ok(MerkleReport {
        root: tree.root_hex(),
        leaves: tree.leaf_count(),
        depth: tree.depth(),
        proofs,
    })
}

fn read_proof(path: &Path) -> Result<MerkleProof> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("{} is not a Merkle proof", path.display()))
}

/// Chain of `blocks` blocks, each a coinbase plus `txs_per_block` payments.
fn build_chain(blocks: usize, txs_per_block: usize) -> (Arc<InMemoryChain>, Vec<RawTransaction>) {
    let chain = Arc::new(InMemoryChain::new("demo-chain"));
    let mut payments = Vec::new();

    for height in 0..blocks as u64 {
        let mut txs = vec![coinbase_transaction(height)];
        for i in 0..txs_per_block as u64 {
            let tx = synthetic_transaction(height * 10_000 + i, 2);
            payments.push(tx.clone());
            txs.push(tx);
        }
        chain.push_block(txs);
    }
    (chain, payments)
}

async fn run_demo(blocks: usize, txs_per_block: usize) -> Result<DemoReport> {
    if blocks == 0 {
        bail!("--blocks must be at least 1");
    }

    let (chain, payments) = build_chain(blocks, txs_per_block);
    let pending = synthetic_transaction(u64::MAX, 1);
    chain.add_unconfirmed(&pending);

    let service = ProofService::new(chain.clone(), ProofServiceConfig::from_env())?;
    let shutdown = CancellationToken::new();
    let sweeper = service.spawn_cleanup(shutdown.clone());

    let mut requests: Vec<ProofRequest> = payments
        .iter()
        .map(|tx| ProofRequest::new(tx.txid().to_hex(), 0))
        .collect();
    requests.push(ProofRequest::new(pending.txid().to_hex(), 0));

    info!(
        "Requesting {} proofs from a {}-block chain",
        requests.len(),
        blocks
    );
    let BatchProofResponse { responses, error } = service
        .batch_generate_proofs(requests.clone(), &shutdown)
        .await;
    let failed_indices = responses
        .iter()
        .enumerate()
        .filter_map(|(i, r)| r.is_none().then_some(i))
        .collect();

    // Ask again for the first proof that succeeded
    let mut repeat_was_cached = false;
    if let Some(index) = responses.iter().position(Option::is_some) {
        if let Ok(again) = service.generate_proof(&requests[index], &shutdown).await {
            repeat_was_cached = again.cached;
        }
    }

    let cache = service.cache_stats();
    shutdown.cancel();
    sweeper.await.context("cache sweeper panicked")?;

    Ok(DemoReport {
        tip_height: chain.tip_height(),
        responses,
        failed_indices,
        error: error.map(|e| e.to_string()),
        repeat_was_cached,
        cache,
        finished_at: chrono::Utc::now(),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;
    let args = Args::parse();

    match args.command {
        Command::Merkle { txids } => {
            let report = merkle_report(&txids)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Verify { file } => {
            let proof = read_proof(&file)?;
            let valid = proof_holds(&proof);
            println!("{}", serde_json::json!({ "valid": valid, "tx_hash": proof.tx_hash }));
            if !valid {
                bail!("proof in {} does not verify", file.display());
            }
        }
        Command::Demo {
            blocks,
            txs_per_block,
        } => {
            let report = run_demo(blocks, txs_per_block).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const TXIDS: [&str; 3] = [
        "a1b2c3d4e5f6789012345678901234567890123456789012345678901234abcd",
        "b2c3d4e5f67890123456789012345678901234567890123456789012345bcde0",
        "c3d4e5f6789012345678901234567890123456789012345678901234567cdef1",
    ];

    #[test]
    fn test_args_parse() {
        let args = Args::parse_from(["bb-proof", "demo", "--blocks", "3"]);
        assert!(matches!(
            args.command,
            Command::Demo {
                blocks: 3,
                txs_per_block: 5
            }
        ));
        assert!(Args::try_parse_from(["bb-proof", "merkle"]).is_err());
    }

    #[test]
    fn test_merkle_report() {
        let txids: Vec<String> = TXIDS.iter().map(|s| s.to_string()).collect();
        let report = merkle_report(&txids).unwrap();
        assert_eq!(report.leaves, 3);
        assert_eq!(report.depth, 2);
        assert!(report.proofs.iter().all(|p| p.valid));
        assert!(report.proofs.iter().all(|p| p.proof.merkle_root == report.root));
    }

    #[test]
    fn test_merkle_report_rejects_bad_input() {
        assert!(merkle_report(&["nope".to_string()]).is_err());
    }

    #[test]
    fn test_read_proof_file() {
        let txids: Vec<String> = TXIDS.iter().map(|s| s.to_string()).collect();
        let proof = merkle_report(&txids).unwrap().proofs.remove(1).proof;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", serde_json::to_string(&proof).unwrap()).unwrap();
        let loaded = read_proof(file.path()).unwrap();
        assert_eq!(loaded, proof);
        assert!(verify_proof(&loaded));

        let mut garbage = tempfile::NamedTempFile::new().unwrap();
        write!(garbage, "not json").unwrap();
        assert!(read_proof(garbage.path()).is_err());
    }

    #[test]
    fn test_single_leaf_agrees_between_merkle_and_verify() {
        let report = merkle_report(&[TXIDS[0].to_string()]).unwrap();
        assert_eq!(report.root, TXIDS[0]);
        let check = &report.proofs[0];
        assert!(check.valid);

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", serde_json::to_string(&check.proof).unwrap()).unwrap();
        let loaded = read_proof(file.path()).unwrap();
        assert!(proof_holds(&loaded));

        let mut wrong_root = loaded;
        wrong_root.merkle_root = TXIDS[1].to_string();
        assert!(!proof_holds(&wrong_root));
    }

    #[tokio::test]
    async fn test_demo_run() {
        let report = run_demo(8, 3).await.unwrap();
        assert_eq!(report.tip_height, Some(7));
        // Block heights 0..=2 reach the default depth of 6; the pending tx never does
        assert_eq!(report.responses.len(), 25);
        assert!(report.failed_indices.contains(&24));
        assert!(report.error.is_some());
        assert!(report.repeat_was_cached);
        assert_eq!(report.cache.cache_size, 25 - report.failed_indices.len());
    }
}
