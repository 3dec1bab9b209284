//! Test utilities: a witness-v0 script interpreter and an in-memory chain.
//!
//! The interpreter covers the opcode subset the bundled contracts use, which
//! is enough to check that finalized transactions actually satisfy their
//! witness scripts without a node.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use bitcoin::hashes::{Hash, hash160, sha256};
use bitcoin::opcodes::all::*;
use bitcoin::script::Instruction;
use bitcoin::secp256k1::{Message, Secp256k1};
use bitcoin::sighash::SighashCache;
use bitcoin::{Address, Amount, PublicKey, Script, Transaction, TxOut, Txid, ecdsa};

use crate::address::p2wsh_script_pubkey;
use crate::chain::{ChainSource, Utxo};
use crate::error::{Error, Result};
use crate::network::Network;
use crate::script::{MAX_ELEMENT_SIZE, decode_script_num, encode_script_num};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub const FUNDING_TXID: &str = "f3cb85076bc17986fd4abd7db6c3ef8c9c1c50fbd086c32d1c26ada04c26fc4b";

/// Testnet faucet return address used by the demo flows.
pub const FAUCET_ADDRESS: &str = "mohjSavDdQYHRYXcS3uS6ttaHP8amyvX78";

pub fn funding_utxo(value: u64, vout: u32) -> Utxo {
    Utxo {
        txid: FUNDING_TXID.parse().expect("valid txid"),
        vout,
        value: Amount::from_sat(value),
        confirmed: true,
    }
}

pub fn faucet_address() -> Address {
    crate::address::parse_address(FAUCET_ADDRESS, Network::Testnet).expect("valid faucet address")
}

// ---------------------------------------------------------------------------
// Interpreter
// ---------------------------------------------------------------------------

fn cast_to_bool(item: &[u8]) -> bool {
    match item.split_last() {
        None => false,
        Some((&last, rest)) => rest.iter().any(|b| *b != 0) || (last != 0 && last != 0x80),
    }
}

fn bool_item(value: bool) -> Vec<u8> {
    if value { vec![0x01] } else { Vec::new() }
}

struct Machine<'a> {
    tx: &'a Transaction,
    index: usize,
    value: Amount,
    script: &'a Script,
    stack: Vec<Vec<u8>>,
}

impl Machine<'_> {
    fn pop(&mut self) -> std::result::Result<Vec<u8>, String> {
        self.stack
            .pop()
            .ok_or_else(|| "stack underflow".to_string())
    }

    fn pop_num(&mut self) -> std::result::Result<i64, String> {
        let item = self.pop()?;
        decode_script_num(&item, 4).map_err(|e| e.to_string())
    }

    fn push_num(&mut self, n: i64) -> std::result::Result<(), String> {
        let item = encode_script_num(n).map_err(|e| e.to_string())?;
        self.stack.push(item);
        Ok(())
    }

    fn verify(&mut self, op: &str) -> std::result::Result<(), String> {
        let top = self.pop()?;
        if cast_to_bool(&top) {
            Ok(())
        } else {
            Err(format!("{op} failed"))
        }
    }

    fn check_sig(&self, sig: &[u8], pubkey: &[u8]) -> std::result::Result<bool, String> {
        if sig.is_empty() {
            return Ok(false);
        }
        let sig = ecdsa::Signature::from_slice(sig).map_err(|e| format!("bad signature: {e}"))?;
        let pubkey = PublicKey::from_slice(pubkey).map_err(|e| format!("bad pubkey: {e}"))?;
        let sighash = SighashCache::new(self.tx)
            .p2wsh_signature_hash(self.index, self.script, self.value, sig.sighash_type)
            .map_err(|e| e.to_string())?;
        let msg = Message::from_digest(sighash.to_byte_array());
        Ok(Secp256k1::verification_only()
            .verify_ecdsa(&msg, &sig.signature, &pubkey.inner)
            .is_ok())
    }

    fn step(&mut self, op: bitcoin::Opcode) -> std::result::Result<(), String> {
        let code = op.to_u8();
        if (OP_PUSHNUM_1.to_u8()..=OP_PUSHNUM_16.to_u8()).contains(&code) {
            return self.push_num(i64::from(code - OP_PUSHNUM_1.to_u8()) + 1);
        }

        match op {
            OP_PUSHNUM_NEG1 => self.push_num(-1)?,
            OP_NOP => {}
            OP_VERIFY => self.verify("OP_VERIFY")?,
            OP_DUP => {
                let top = self.stack.last().cloned().ok_or("stack underflow")?;
                self.stack.push(top);
            }
            OP_DROP => {
                self.pop()?;
            }
            OP_SWAP => {
                let a = self.pop()?;
                let b = self.pop()?;
                self.stack.push(a);
                self.stack.push(b);
            }
            OP_ADD | OP_SUB | OP_NUMEQUAL | OP_NUMEQUALVERIFY => {
                let b = self.pop_num()?;
                let a = self.pop_num()?;
                match op {
                    OP_ADD => self.push_num(a + b)?,
                    OP_SUB => self.push_num(a - b)?,
                    OP_NUMEQUAL => self.stack.push(bool_item(a == b)),
                    _ => {
                        if a != b {
                            return Err("OP_NUMEQUALVERIFY failed".into());
                        }
                    }
                }
            }
            OP_EQUAL | OP_EQUALVERIFY => {
                let b = self.pop()?;
                let a = self.pop()?;
                if op == OP_EQUAL {
                    self.stack.push(bool_item(a == b));
                } else if a != b {
                    return Err("OP_EQUALVERIFY failed".into());
                }
            }
            OP_HASH160 => {
                let item = self.pop()?;
                self.stack
                    .push(hash160::Hash::hash(&item).to_byte_array().to_vec());
            }
            OP_SHA256 => {
                let item = self.pop()?;
                self.stack
                    .push(sha256::Hash::hash(&item).to_byte_array().to_vec());
            }
            OP_CHECKSIG | OP_CHECKSIGVERIFY => {
                let pubkey = self.pop()?;
                let sig = self.pop()?;
                let ok = self.check_sig(&sig, &pubkey)?;
                if op == OP_CHECKSIG {
                    self.stack.push(bool_item(ok));
                } else if !ok {
                    return Err("OP_CHECKSIGVERIFY failed".into());
                }
            }
            other => return Err(format!("unsupported opcode {other}")),
        }
        Ok(())
    }
}

/// Execute the witness of input `index` against its P2WSH `prevout`.
///
/// Checks the script commitment, runs the witness script over the remaining
/// witness items, and requires a clean stack holding a single true value.
pub fn verify_p2wsh_input(
    tx: &Transaction,
    index: usize,
    prevout: &TxOut,
) -> std::result::Result<(), String> {
    let input = tx
        .input
        .get(index)
        .ok_or_else(|| format!("no input {index}"))?;
    let items: Vec<Vec<u8>> = input.witness.iter().map(<[u8]>::to_vec).collect();
    let Some((script_bytes, initial)) = items.split_last() else {
        return Err("empty witness".into());
    };

    let script = Script::from_bytes(script_bytes);
    if p2wsh_script_pubkey(script) != prevout.script_pubkey {
        return Err("witness script does not match the spent output".into());
    }
    if let Some(item) = initial.iter().find(|i| i.len() > MAX_ELEMENT_SIZE) {
        return Err(format!("witness item of {} bytes", item.len()));
    }

    let mut machine = Machine {
        tx,
        index,
        value: prevout.value,
        script,
        stack: initial.to_vec(),
    };
    for instruction in script.instructions() {
        match instruction.map_err(|e| format!("malformed script: {e}"))? {
            Instruction::PushBytes(bytes) => machine.stack.push(bytes.as_bytes().to_vec()),
            Instruction::Op(op) => machine.step(op)?,
        }
    }

    match machine.stack.as_slice() {
        [top] if cast_to_bool(top) => Ok(()),
        [_] => Err("script evaluated to false".into()),
        stack => Err(format!("unclean stack ({} items)", stack.len())),
    }
}

/// Run [`verify_p2wsh_input`] over every input.
pub fn verify_transaction(tx: &Transaction, prevouts: &[TxOut]) -> std::result::Result<(), String> {
    if prevouts.len() != tx.input.len() {
        return Err(format!(
            "{} prevouts for {} inputs",
            prevouts.len(),
            tx.input.len()
        ));
    }
    prevouts
        .iter()
        .enumerate()
        .try_for_each(|(i, prevout)| verify_p2wsh_input(tx, i, prevout).map_err(|e| format!("input {i}: {e}")))
}

// ---------------------------------------------------------------------------
// FakeChain
// ---------------------------------------------------------------------------

/// Scripted in-memory [`ChainSource`].
///
/// Lookups pop queued responses in order; once the queue is empty every
/// lookup returns `fallback`. A stalled chain counts lookups but never
/// answers them. Submissions are recorded and answered with the
/// transaction's own txid unless a rejection is configured.
#[derive(Default)]
pub struct FakeChain {
    responses: Mutex<VecDeque<Result<Vec<Utxo>>>>,
    fallback: Mutex<Vec<Utxo>>,
    lookups: AtomicU32,
    submitted: Mutex<Vec<String>>,
    reject: Mutex<Option<String>>,
    stalled: AtomicBool,
}

impl FakeChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer the first `empty_polls` lookups with nothing, then `utxo`.
    pub fn funded_after(empty_polls: usize, utxo: Utxo) -> Self {
        let chain = Self::new();
        for _ in 0..empty_polls {
            chain.push_response(Ok(Vec::new()));
        }
        chain.set_fallback(vec![utxo]);
        chain
    }

    pub fn push_response(&self, response: Result<Vec<Utxo>>) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn set_fallback(&self, utxos: Vec<Utxo>) {
        *self.fallback.lock().unwrap() = utxos;
    }

    /// A chain whose lookups hang forever.
    pub fn stalled() -> Self {
        let chain = Self::new();
        chain.stalled.store(true, Ordering::SeqCst);
        chain
    }

    pub fn reject_with(&self, reason: &str) {
        *self.reject.lock().unwrap() = Some(reason.to_string());
    }

    pub fn lookups(&self) -> u32 {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn submitted(&self) -> Vec<String> {
        self.submitted.lock().unwrap().clone()
    }
}

impl ChainSource for FakeChain {
    async fn lookup_utxos(&self, _address: &Address) -> Result<Vec<Utxo>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.stalled.load(Ordering::SeqCst) {
            return std::future::pending().await;
        }
        let queued = self.responses.lock().unwrap().pop_front();
        match queued {
            Some(response) => response,
            None => Ok(self.fallback.lock().unwrap().clone()),
        }
    }

    async fn submit(&self, tx_hex: &str) -> Result<Txid> {
        self.submitted.lock().unwrap().push(tx_hex.to_string());
        if let Some(reason) = self.reject.lock().unwrap().clone() {
            return Err(Error::BroadcastRejected(reason));
        }
        let raw = hex::decode(tx_hex).map_err(|e| Error::Chain(e.to_string()))?;
        let tx: Transaction =
            bitcoin::consensus::deserialize(&raw).map_err(|e| Error::Chain(e.to_string()))?;
        Ok(tx.compute_txid())
    }
}
