//! End-to-end anchoring against mocked REST services.

use bitcoin::consensus::encode;
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::SecretKey;
use bitcoin::{
    absolute, transaction, Amount, OutPoint, PrivateKey, ScriptBuf, Sequence, Transaction, TxIn,
    TxOut, Txid, Witness,
};
use rollstamp_bitcoin::{
    parse_op_return_script, verify_input, AnchorConfig, AnchorError, AnchorPipeline, ApiKind,
    Commitment, Network, OwnerKey, Stage,
};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

fn wif() -> String {
    let secret = SecretKey::from_slice(&[0x42; 32]).unwrap();
    PrivateKey::new(secret, bitcoin::Network::Testnet).to_wif()
}

fn funding_tx(script: ScriptBuf, value: u64) -> Transaction {
    Transaction {
        version: transaction::Version::ONE,
        lock_time: absolute::LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint::new(Txid::from_byte_array([0xab; 32]), 0),
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        }],
        output: vec![TxOut {
            value: Amount::from_sat(value),
            script_pubkey: script,
        }],
    }
}

fn config(server: &MockServer) -> AnchorConfig {
    AnchorConfig::testnet(wif())
        .with_utxo_api(ApiKind::BlockCypher, server.uri())
        .with_tx_api(ApiKind::Esplora, server.uri())
        .with_broadcast_api(ApiKind::BlockCypher, server.uri())
        .with_fee(1000)
        .with_timeout(5)
}

/// Mount the UTXO and raw transaction endpoints for a single funding output.
async fn mount_funding(server: &MockServer, owner: &OwnerKey, value: u64) -> Transaction {
    let prev = funding_tx(owner.script_pubkey(), value);
    let txid = prev.compute_txid();

    Mock::given(method("GET"))
        .and(path(format!("/addrs/{}", owner.address())))
        .and(query_param("unspentOnly", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "address": owner.address().to_string(),
            "txrefs": [
                { "tx_hash": txid.to_string(), "tx_output_n": 0, "value": value }
            ]
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/tx/{txid}/hex")))
        .respond_with(ResponseTemplate::new(200).set_body_string(encode::serialize_hex(&prev)))
        .mount(server)
        .await;

    prev
}

#[tokio::test]
async fn test_anchor_end_to_end() {
    let server = MockServer::start().await;
    let owner = OwnerKey::from_wif(&wif(), Network::Testnet).unwrap();
    let prev = mount_funding(&server, &owner, 5000).await;

    Mock::given(method("POST"))
        .and(path("/txs/push"))
        .respond_with(|req: &Request| {
            let body: serde_json::Value = req.body_json().unwrap();
            let bytes = hex::decode(body["tx"].as_str().unwrap()).unwrap();
            let tx: Transaction = encode::deserialize(&bytes).unwrap();
            ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "tx": { "hash": tx.compute_txid().to_string() }
            }))
        })
        .expect(1)
        .mount(&server)
        .await;

    let commitment = Commitment::new([0x5a; 32].to_vec()).unwrap();
    let pipeline = AnchorPipeline::from_config(&config(&server)).unwrap();
    let receipt = pipeline.run(&commitment).await.unwrap();

    assert!(receipt.broadcast);
    assert_eq!(receipt.fee_sat, 1000);
    assert_eq!(receipt.change_sat, 4000);
    assert_eq!(receipt.commitment_digest, commitment.digest());

    // The pushed bytes are the ones reported in the receipt.
    let requests = server.received_requests().await.unwrap();
    let push = requests
        .iter()
        .find(|r| r.url.path() == "/txs/push")
        .unwrap();
    let body: serde_json::Value = push.body_json().unwrap();
    assert_eq!(body["tx"].as_str().unwrap(), receipt.tx_hex);

    let tx: Transaction = encode::deserialize(&hex::decode(&receipt.tx_hex).unwrap()).unwrap();
    assert_eq!(tx.compute_txid(), receipt.txid);
    assert_eq!(tx.input[0].previous_output, OutPoint::new(prev.compute_txid(), 0));
    assert!(verify_input(&tx, 0, &owner.script_pubkey()));
    assert_eq!(
        parse_op_return_script(&tx.output[0].script_pubkey).unwrap(),
        vec![0x5a; 32]
    );
    assert_eq!(tx.output[1].value, Amount::from_sat(4000));
}

#[tokio::test]
async fn test_rejected_broadcast_end_to_end() {
    let server = MockServer::start().await;
    let owner = OwnerKey::from_wif(&wif(), Network::Testnet).unwrap();
    mount_funding(&server, &owner, 5000).await;

    Mock::given(method("POST"))
        .and(path("/txs/push"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "Transaction with hash abc already exists."
        })))
        .expect(1)
        .mount(&server)
        .await;

    let commitment = Commitment::new(b"state-root".to_vec()).unwrap();
    let err = AnchorPipeline::from_config(&config(&server))
        .unwrap()
        .run(&commitment)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AnchorError::Rejected { stage: Stage::Broadcast, ref reason } if reason.contains("already exists")
    ));
}

#[tokio::test]
async fn test_insufficient_funds_end_to_end() {
    let server = MockServer::start().await;
    let owner = OwnerKey::from_wif(&wif(), Network::Testnet).unwrap();
    mount_funding(&server, &owner, 500).await;

    let commitment = Commitment::new([1u8; 32].to_vec()).unwrap();
    let err = AnchorPipeline::from_config(&config(&server))
        .unwrap()
        .run(&commitment)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AnchorError::InsufficientFunds { need: 1000, have: 500 }
    ));

    // Nothing past the UTXO lookup ran.
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
}

#[tokio::test]
async fn test_dry_run_end_to_end() {
    let server = MockServer::start().await;
    let owner = OwnerKey::from_wif(&wif(), Network::Testnet).unwrap();
    mount_funding(&server, &owner, 5000).await;

    let commitment = Commitment::new([9u8; 20].to_vec()).unwrap();
    let receipt = AnchorPipeline::from_config(&config(&server).with_dry_run(true))
        .unwrap()
        .run(&commitment)
        .await
        .unwrap();

    assert!(!receipt.broadcast);
    let requests = server.received_requests().await.unwrap();
    assert!(requests.iter().all(|r| r.url.path() != "/txs/push"));
}
