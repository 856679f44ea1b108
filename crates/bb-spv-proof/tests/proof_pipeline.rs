//! End-to-end proof pipeline tests through the public API.

use std::sync::Arc;

use bb_spv_proof::{
    coinbase_transaction, synthetic_transaction, verify_proof, BlockHeader, CancellationToken,
    InMemoryChain, MerkleTree, ProofApi, ProofError, ProofRequest, ProofService,
    ProofServiceConfig, RawTransaction, SpvProof,
};
use tokio_test::{assert_err, assert_ok};

const SAMPLE_TXIDS: [&str; 4] = [
    "a1b2c3d4e5f6789012345678901234567890123456789012345678901234abcd",
    "b2c3d4e5f67890123456789012345678901234567890123456789012345bcde0",
    "c3d4e5f6789012345678901234567890123456789012345678901234567cdef1",
    "d4e5f6789012345678901234567890123456789012345678901234567890def2",
];

/// Ten blocks; block `h` holds a coinbase and `h + 1` payments.
fn ten_block_chain() -> (Arc<InMemoryChain>, Vec<Vec<RawTransaction>>) {
    let chain = Arc::new(InMemoryChain::new("pipeline"));
    let mut blocks = Vec::new();
    for height in 0..10u64 {
        let mut txs = vec![coinbase_transaction(height)];
        txs.extend((0..=height).map(|i| synthetic_transaction(height * 100 + i, 3)));
        chain.push_block(txs.clone());
        blocks.push(txs);
    }
    (chain, blocks)
}

#[test]
fn sample_root_is_reproducible() {
    let a = MerkleTree::build(&SAMPLE_TXIDS).unwrap();
    let owned: Vec<String> = SAMPLE_TXIDS.iter().map(|s| s.to_uppercase()).collect();
    let b = MerkleTree::build(owned.as_slice()).unwrap();
    assert_eq!(a.root(), b.root());

    for i in 0..SAMPLE_TXIDS.len() {
        let proof = a.generate_proof(i).unwrap();
        assert_eq!(proof.proof.len(), 2);
        assert!(verify_proof(&proof));
    }
}

#[tokio::test]
async fn proofs_verify_at_every_depth() {
    let (chain, blocks) = ten_block_chain();
    let service = ProofService::new(chain.clone(), ProofServiceConfig::for_testing()).unwrap();
    let cancel = CancellationToken::new();

    for (height, txs) in blocks.iter().enumerate() {
        for tx in txs {
            let response = assert_ok!(
                service
                    .generate_proof(&ProofRequest::new(tx.txid().to_hex(), 0), &cancel)
                    .await
            );
            let proof = &response.proof;
            assert_eq!(proof.block_height, height as u64);
            assert_eq!(proof.confirmations, 10 - height as u64);
            assert_ok!(service.verify_proof(proof));

            // The carried header hex decodes back to the same header
            let contract = service
                .get_proof_for_contract(&ProofRequest::new(tx.txid().to_hex(), 0), &cancel)
                .await
                .unwrap();
            let header = BlockHeader::from_hex(&contract.block_header).unwrap();
            assert_eq!(header, proof.block_header);
            assert_eq!(
                RawTransaction::from_hex(&proof.transaction_hex).unwrap(),
                *tx
            );
        }
    }
}

#[tokio::test]
async fn proof_survives_json_transport() {
    let (chain, blocks) = ten_block_chain();
    let service = ProofService::new(chain, ProofServiceConfig::for_testing()).unwrap();
    let tx = &blocks[4][2];

    let response = service
        .generate_proof(
            &ProofRequest::new(tx.txid().to_hex(), 1),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let wire = serde_json::to_string(&response).unwrap();
    let value: serde_json::Value = serde_json::from_str(&wire).unwrap();
    for field in ["proof", "verified", "proof_size", "cached", "generated_at"] {
        assert!(value.get(field).is_some(), "missing {}", field);
    }

    let proof: SpvProof = serde_json::from_value(value["proof"].clone()).unwrap();
    assert_eq!(proof, response.proof);
    assert_ok!(service.verify_proof(&proof));
}

#[tokio::test]
async fn deep_and_shallow_requests_in_one_batch() {
    let (chain, blocks) = ten_block_chain();
    let service = ProofService::new(chain, ProofServiceConfig::default()).unwrap();

    // Heights 0..=4 have at least 6 confirmations, 5..=9 do not
    let requests: Vec<ProofRequest> = blocks
        .iter()
        .map(|txs| ProofRequest::new(txs[1].txid().to_hex(), 0))
        .collect();
    let batch = service
        .batch_generate_proofs(requests, &CancellationToken::new())
        .await;

    assert_eq!(batch.responses.len(), 10);
    assert_eq!(batch.succeeded(), 5);
    assert_eq!(batch.failed_indices(), vec![5, 6, 7, 8, 9]);

    let err = batch.error.unwrap();
    assert!(err.to_string().contains("batch error at index 5"));
    assert!(matches!(
        err.root_cause(),
        ProofError::InsufficientConfirmations { required: 6, .. }
    ));
}

#[tokio::test]
async fn outage_then_recovery() {
    let (chain, blocks) = ten_block_chain();
    let service = ProofService::new(chain.clone(), ProofServiceConfig::for_testing()).unwrap();
    let request = ProofRequest::new(blocks[0][0].txid().to_hex(), 0);
    let cancel = CancellationToken::new();

    chain.set_unavailable(true);
    let err = assert_err!(service.generate_proof(&request, &cancel).await);
    assert!(err.is_retryable());

    chain.set_unavailable(false);
    let response = assert_ok!(service.generate_proof(&request, &cancel).await);
    assert!(!response.cached);
}
