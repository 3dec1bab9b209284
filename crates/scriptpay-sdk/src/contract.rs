use bitcoin::hashes::{Hash, hash160};
use bitcoin::opcodes::all::{
    OP_ADD, OP_CHECKSIG, OP_DUP, OP_EQUAL, OP_EQUALVERIFY, OP_HASH160,
};
use bitcoin::{Address, PublicKey, Script, ScriptBuf};

use crate::address;
use crate::error::Result;
use crate::finalizer::SpendingPath;
use crate::network::Network;
use crate::script::{Token, compile};

/// HASH160 (RIPEMD160 of SHA256) of arbitrary bytes.
pub fn hash160(data: &[u8]) -> [u8; 20] {
    hash160::Hash::hash(data).to_byte_array()
}

/// A compiled witness script together with its P2WSH commitment.
pub trait WitnessContract {
    fn witness_script(&self) -> &Script;

    fn witness_program(&self) -> [u8; 32] {
        address::witness_program(self.witness_script())
    }

    fn script_pubkey(&self) -> ScriptBuf {
        address::p2wsh_script_pubkey(self.witness_script())
    }

    fn address(&self, network: Network) -> Result<Address> {
        address::p2wsh_address(self.witness_script(), network)
    }
}

/// `OP_ADD <target> OP_EQUAL`: spendable by any two numbers summing to `target`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdditionContract {
    target: i64,
    witness_script: ScriptBuf,
}

impl AdditionContract {
    pub fn new(target: i64) -> Result<Self> {
        let witness_script = compile(&[Token::Op(OP_ADD), Token::Int(target), Token::Op(OP_EQUAL)])?;
        Ok(Self {
            target,
            witness_script,
        })
    }

    pub fn target(&self) -> i64 {
        self.target
    }

    /// Spending path pushing `operands` in order.
    pub fn spending_path(&self, operands: impl Into<Vec<i64>>) -> SpendingPath {
        SpendingPath::addition(operands)
    }
}

impl WitnessContract for AdditionContract {
    fn witness_script(&self) -> &Script {
        &self.witness_script
    }
}

/// Requires the HASH160 preimage of a secret plus a signature from one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashLockContract {
    secret_hash: [u8; 20],
    pubkey_hash: [u8; 20],
    witness_script: ScriptBuf,
}

impl HashLockContract {
    /// Lock to `hash160(preimage)` and `hash160(public_key)`.
    pub fn new(preimage: &[u8], public_key: &PublicKey) -> Result<Self> {
        Self::from_hashes(hash160(preimage), hash160(&public_key.to_bytes()))
    }

    pub fn from_hashes(secret_hash: [u8; 20], pubkey_hash: [u8; 20]) -> Result<Self> {
        let witness_script = compile(&[
            Token::Op(OP_HASH160),
            Token::Data(secret_hash.to_vec()),
            Token::Op(OP_EQUALVERIFY),
            Token::Op(OP_DUP),
            Token::Op(OP_HASH160),
            Token::Data(pubkey_hash.to_vec()),
            Token::Op(OP_EQUALVERIFY),
            Token::Op(OP_CHECKSIG),
        ])?;
        Ok(Self {
            secret_hash,
            pubkey_hash,
            witness_script,
        })
    }

    pub fn secret_hash(&self) -> &[u8; 20] {
        &self.secret_hash
    }

    pub fn pubkey_hash(&self) -> &[u8; 20] {
        &self.pubkey_hash
    }

    pub fn spending_path(&self, preimage: impl Into<Vec<u8>>, public_key: PublicKey) -> SpendingPath {
        SpendingPath::hash_lock(preimage, public_key)
    }
}

impl WitnessContract for HashLockContract {
    fn witness_script(&self) -> &Script {
        &self.witness_script
    }
}
