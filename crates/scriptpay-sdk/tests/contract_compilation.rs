use scriptpay_sdk::bitcoin::opcodes::all::{OP_ADD, OP_EQUAL};
use scriptpay_sdk::script::{Token, compile, parse_asm};
use scriptpay_sdk::witness::WitnessStack;
use scriptpay_sdk::{AdditionContract, HashLockContract, Network, WitnessContract, hash160};

const ADDITION_PROGRAM: &str = "0afd85470f76425c9f81a91d37f9ee8ac0289d479a091af64787e0930eef3b5a";

#[test]
fn addition_contract_known_address() {
    let contract = AdditionContract::new(5).expect("contract should compile");
    assert_eq!(hex::encode(contract.witness_program()), ADDITION_PROGRAM);
    assert_eq!(
        contract.address(Network::Testnet).unwrap().to_string(),
        "tb1qpt7c23c0wep9e8up4ywn070w3tqz3828ngy34aj8slsfxrh08ddq85q83x"
    );
    assert_eq!(
        contract.address(Network::Mainnet).unwrap().to_string(),
        "bc1qpt7c23c0wep9e8up4ywn070w3tqz3828ngy34aj8slsfxrh08ddqsukgtf"
    );
}

#[test]
fn asm_and_tokens_compile_identically() {
    let from_tokens = compile(&[Token::Op(OP_ADD), Token::Int(5), Token::Op(OP_EQUAL)]).unwrap();
    let from_asm = compile(&parse_asm("OP_ADD 5 OP_EQUAL").unwrap()).unwrap();
    assert_eq!(from_tokens, from_asm);
    assert_eq!(
        from_asm.as_bytes(),
        AdditionContract::new(5).unwrap().witness_script().as_bytes()
    );
}

#[test]
fn hash_lock_from_asm_matches_template() {
    let secret_hash = hash160(b"secret");
    let pubkey_hash = [0x11; 20];
    let asm = format!(
        "OP_HASH160 0x{} OP_EQUALVERIFY OP_DUP OP_HASH160 0x{} OP_EQUALVERIFY OP_CHECKSIG",
        hex::encode(secret_hash),
        hex::encode(pubkey_hash)
    );
    let compiled = compile(&parse_asm(&asm).unwrap()).unwrap();
    let contract = HashLockContract::from_hashes(secret_hash, pubkey_hash).unwrap();
    assert_eq!(compiled.as_bytes(), contract.witness_script().as_bytes());
}

#[test]
fn every_template_address_is_distinct() {
    let contracts: Vec<Box<dyn WitnessContract>> = vec![
        Box::new(AdditionContract::new(5).unwrap()),
        Box::new(AdditionContract::new(-5).unwrap()),
        Box::new(AdditionContract::new(0).unwrap()),
        Box::new(HashLockContract::from_hashes([0x01; 20], [0x02; 20]).unwrap()),
        Box::new(HashLockContract::from_hashes([0x02; 20], [0x01; 20]).unwrap()),
    ];
    let addresses: Vec<String> = contracts
        .iter()
        .map(|c| c.address(Network::Regtest).unwrap().to_string())
        .collect();

    for i in 0..addresses.len() {
        assert!(addresses[i].starts_with("bcrt1q"));
        for j in (i + 1)..addresses.len() {
            assert_ne!(addresses[i], addresses[j], "contracts {i} and {j} collide");
        }
    }
}

#[test]
fn witness_for_addition_decodes_back() {
    let contract = AdditionContract::new(5).unwrap();
    let mut stack = WitnessStack::new();
    stack.push(vec![0x01]);
    stack.push(vec![0x04]);
    stack.push(contract.witness_script().as_bytes());

    let encoded = stack.encode();
    assert_eq!(
        encoded,
        [0x03, 0x01, 0x01, 0x01, 0x04, 0x03, 0x93, 0x55, 0x87]
    );
    assert_eq!(WitnessStack::decode(&encoded).unwrap(), stack);
}
