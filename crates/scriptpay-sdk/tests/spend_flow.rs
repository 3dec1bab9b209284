use std::time::Duration;

use scriptpay_sdk::bitcoin::{Amount, TxOut};
use scriptpay_sdk::testing::{FakeChain, faucet_address, funding_utxo, verify_p2wsh_input};
use scriptpay_sdk::{
    AdditionContract, Error, HashLockContract, Network, ScriptSpender, SigningContext,
    TransactionBuilder, WatchConfig, WitnessContract, build_addition_spend, build_hash_lock_spend,
};

fn prevout<W: WitnessContract>(contract: &W, value: u64) -> TxOut {
    TxOut {
        value: Amount::from_sat(value),
        script_pubkey: contract.script_pubkey(),
    }
}

fn fast_watch() -> WatchConfig {
    WatchConfig::default().with_poll_interval(Duration::from_millis(10))
}

// ---------------------------------------------------------------------------
// Addition script
// ---------------------------------------------------------------------------

#[test]
fn addition_spend_satisfies_script() {
    let contract = AdditionContract::new(5).unwrap();
    let funding = funding_utxo(10_000, 0);
    let extracted = build_addition_spend(
        &contract,
        &funding,
        &[1, 4],
        &faucet_address(),
        Amount::from_sat(200),
    )
    .unwrap();

    verify_p2wsh_input(&extracted.tx, 0, &prevout(&contract, 10_000))
        .expect("operands 1 and 4 should satisfy OP_ADD 5 OP_EQUAL");
    assert_eq!(extracted.tx.output[0].value, Amount::from_sat(9_800));
}

#[test]
fn wrong_operands_build_but_fail_verification() {
    let contract = AdditionContract::new(5).unwrap();
    let extracted = build_addition_spend(
        &contract,
        &funding_utxo(10_000, 0),
        &[2, 4],
        &faucet_address(),
        Amount::from_sat(200),
    )
    .unwrap();

    let err = verify_p2wsh_input(&extracted.tx, 0, &prevout(&contract, 10_000)).unwrap_err();
    assert!(err.contains("false"), "unexpected failure: {err}");
}

#[test]
fn negative_operands_are_minimally_encoded() {
    let contract = AdditionContract::new(5).unwrap();
    let extracted = build_addition_spend(
        &contract,
        &funding_utxo(10_000, 0),
        &[-3, 8],
        &faucet_address(),
        Amount::from_sat(200),
    )
    .unwrap();
    assert_eq!(extracted.tx.input[0].witness.nth(0), Some(&[0x83][..]));
    verify_p2wsh_input(&extracted.tx, 0, &prevout(&contract, 10_000)).unwrap();
}

#[test]
fn witness_from_other_script_fails_commitment() {
    let contract = AdditionContract::new(5).unwrap();
    let other = AdditionContract::new(6).unwrap();
    let extracted = build_addition_spend(
        &contract,
        &funding_utxo(10_000, 0),
        &[1, 4],
        &faucet_address(),
        Amount::from_sat(200),
    )
    .unwrap();
    assert!(verify_p2wsh_input(&extracted.tx, 0, &prevout(&other, 10_000)).is_err());
}

#[test]
fn fee_not_below_funding_value_rejected() {
    let contract = AdditionContract::new(5).unwrap();
    for fee in [10_000, 20_000] {
        let err = build_addition_spend(
            &contract,
            &funding_utxo(10_000, 0),
            &[1, 4],
            &faucet_address(),
            Amount::from_sat(fee),
        )
        .unwrap_err();
        assert!(matches!(err, Error::NegativeFee { .. }));
    }
}

#[test]
fn partially_finalized_multi_input_is_incomplete() {
    let contract = AdditionContract::new(5).unwrap();
    let mut builder = TransactionBuilder::new();
    for vout in 0..2 {
        builder
            .add_input(
                &funding_utxo(5_000, vout),
                contract.script_pubkey(),
                Amount::from_sat(5_000),
                contract.witness_script().to_owned(),
                contract.spending_path([1, 4]),
            )
            .unwrap();
    }
    builder
        .add_output(&faucet_address(), Amount::from_sat(9_800))
        .unwrap();

    builder.finalize_input(1).unwrap();
    assert!(matches!(
        builder.extract_transaction(),
        Err(Error::IncompleteTransaction { index: 0 })
    ));

    builder.finalize_input(0).unwrap();
    let extracted = builder.extract_transaction().unwrap();
    let prevouts = [prevout(&contract, 5_000), prevout(&contract, 5_000)];
    scriptpay_sdk::testing::verify_transaction(&extracted.tx, &prevouts).unwrap();
}

// ---------------------------------------------------------------------------
// Hash lock with signature
// ---------------------------------------------------------------------------

#[test]
fn hash_lock_spend_satisfies_script() {
    let signing = SigningContext::new();
    let keypair = signing.generate_keypair();
    let contract = HashLockContract::new(b"secret", &signing.public_key(&keypair)).unwrap();

    let extracted = build_hash_lock_spend(
        &signing,
        &contract,
        &funding_utxo(50_000, 2),
        b"secret",
        &keypair,
        &faucet_address(),
        Amount::from_sat(200),
    )
    .unwrap();

    verify_p2wsh_input(&extracted.tx, 0, &prevout(&contract, 50_000))
        .expect("signed hash-lock spend should verify");
}

#[test]
fn wrong_preimage_fails_verification() {
    let signing = SigningContext::new();
    let keypair = signing.generate_keypair();
    let contract = HashLockContract::new(b"secret", &signing.public_key(&keypair)).unwrap();

    let extracted = build_hash_lock_spend(
        &signing,
        &contract,
        &funding_utxo(50_000, 0),
        b"not the secret",
        &keypair,
        &faucet_address(),
        Amount::from_sat(200),
    )
    .unwrap();

    let err = verify_p2wsh_input(&extracted.tx, 0, &prevout(&contract, 50_000)).unwrap_err();
    assert!(err.contains("OP_EQUALVERIFY"), "unexpected failure: {err}");
}

#[test]
fn wrong_key_fails_verification() {
    let signing = SigningContext::new();
    let owner = signing.generate_keypair();
    let intruder = signing.generate_keypair();
    let contract = HashLockContract::new(b"secret", &signing.public_key(&owner)).unwrap();

    let extracted = build_hash_lock_spend(
        &signing,
        &contract,
        &funding_utxo(50_000, 0),
        b"secret",
        &intruder,
        &faucet_address(),
        Amount::from_sat(200),
    )
    .unwrap();

    assert!(verify_p2wsh_input(&extracted.tx, 0, &prevout(&contract, 50_000)).is_err());
}

#[test]
fn mutation_after_signing_invalidates_signature() {
    let signing = SigningContext::new();
    let keypair = signing.generate_keypair();
    let contract = HashLockContract::new(b"secret", &signing.public_key(&keypair)).unwrap();

    let extracted = build_hash_lock_spend(
        &signing,
        &contract,
        &funding_utxo(50_000, 0),
        b"secret",
        &keypair,
        &faucet_address(),
        Amount::from_sat(200),
    )
    .unwrap();

    let mut mutated = extracted.tx.clone();
    mutated.output[0].value = Amount::from_sat(49_000);
    let err = verify_p2wsh_input(&mutated, 0, &prevout(&contract, 50_000)).unwrap_err();
    assert!(err.contains("false"), "unexpected failure: {err}");
}

#[test]
fn signature_commits_to_spent_value() {
    let signing = SigningContext::new();
    let keypair = signing.generate_keypair();
    let contract = HashLockContract::new(b"secret", &signing.public_key(&keypair)).unwrap();

    let extracted = build_hash_lock_spend(
        &signing,
        &contract,
        &funding_utxo(50_000, 0),
        b"secret",
        &keypair,
        &faucet_address(),
        Amount::from_sat(200),
    )
    .unwrap();

    assert!(verify_p2wsh_input(&extracted.tx, 0, &prevout(&contract, 60_000)).is_err());
}

// ---------------------------------------------------------------------------
// End to end over a fake chain
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn addition_flow_funds_spends_and_broadcasts() {
    let contract = AdditionContract::new(5).unwrap();
    let funding = funding_utxo(100_000, 1);
    let chain = FakeChain::funded_after(3, funding.clone());
    let spender = ScriptSpender::new(chain, Network::Testnet).with_watch_config(fast_watch());

    let result = spender
        .spend_addition(
            &contract,
            &[1, 4],
            &faucet_address(),
            Amount::from_sat(200),
            None,
        )
        .await
        .unwrap();

    assert_eq!(result.funding, funding);
    assert_eq!(result.fee, Amount::from_sat(200));
    assert_eq!(spender.chain().lookups(), 4);

    let submitted = spender.chain().submitted();
    assert_eq!(submitted, vec![result.tx_hex.clone()]);

    let raw = hex::decode(&result.tx_hex).unwrap();
    let tx: scriptpay_sdk::bitcoin::Transaction =
        scriptpay_sdk::bitcoin::consensus::deserialize(&raw).unwrap();
    assert_eq!(tx.compute_txid(), result.txid);
    verify_p2wsh_input(&tx, 0, &prevout(&contract, 100_000)).unwrap();
}

#[tokio::test(start_paused = true)]
async fn hash_lock_flow_funds_spends_and_broadcasts() {
    let chain = FakeChain::funded_after(0, funding_utxo(75_000, 0));
    let spender = ScriptSpender::new(chain, Network::Testnet).with_watch_config(fast_watch());
    let (keypair, public_key) = spender.generate_keypair();
    let contract = HashLockContract::new(b"secret", &public_key).unwrap();

    let result = spender
        .spend_hash_lock(
            &contract,
            b"secret",
            &keypair,
            &faucet_address(),
            Amount::from_sat(200),
            None,
        )
        .await
        .unwrap();

    assert_eq!(spender.chain().lookups(), 1);
    let raw = hex::decode(&result.tx_hex).unwrap();
    let tx: scriptpay_sdk::bitcoin::Transaction =
        scriptpay_sdk::bitcoin::consensus::deserialize(&raw).unwrap();
    verify_p2wsh_input(&tx, 0, &prevout(&contract, 75_000)).unwrap();
}

#[tokio::test(start_paused = true)]
async fn rejected_broadcast_surfaces_reason() {
    let chain = FakeChain::funded_after(0, funding_utxo(10_000, 0));
    chain.reject_with("min relay fee not met");
    let spender = ScriptSpender::new(chain, Network::Testnet).with_watch_config(fast_watch());

    let err = spender
        .spend_addition(
            &AdditionContract::new(5).unwrap(),
            &[1, 4],
            &faucet_address(),
            Amount::from_sat(1),
            None,
        )
        .await
        .unwrap_err();

    match err {
        Error::BroadcastRejected(reason) => assert_eq!(reason, "min relay fee not met"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(spender.chain().submitted().len(), 1);
}
