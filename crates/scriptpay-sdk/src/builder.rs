//! Partially signed transaction builder for P2WSH inputs.
//!
//! Lifecycle of an input: registered → (signed) → finalized. Inputs and
//! outputs can only be added while no input has been signed or finalized,
//! since either step commits to the current transaction shape.

use bitcoin::absolute::LockTime;
use bitcoin::consensus::encode::serialize_hex;
use bitcoin::secp256k1::Keypair;
use bitcoin::transaction::Version;
use bitcoin::{
    Address, Amount, OutPoint, PublicKey, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid,
    Witness, ecdsa,
};

use crate::address::p2wsh_script_pubkey;
use crate::chain::Utxo;
use crate::error::{Error, Result};
use crate::finalizer::{FinalizeContext, Finalizer, SpendingPath};
use crate::signer::SigningContext;

/// One input being assembled.
#[derive(Debug, Clone)]
pub struct InputDraft {
    pub outpoint: OutPoint,
    /// The spent output (script pubkey and value), needed for BIP143 hashing.
    pub witness_utxo: TxOut,
    /// The full witness script; only its hash is on chain.
    pub witness_script: ScriptBuf,
    pub spending_path: SpendingPath,
    pub sequence: Sequence,
    pub partial_sigs: Vec<(PublicKey, ecdsa::Signature)>,
    /// Serialized witness field, set once the input is finalized.
    pub final_script_witness: Option<Vec<u8>>,
}

impl InputDraft {
    pub fn is_finalized(&self) -> bool {
        self.final_script_witness.is_some()
    }
}

/// A finished transaction ready for broadcast.
#[derive(Debug, Clone)]
pub struct ExtractedTransaction {
    pub tx: Transaction,
    pub hex: String,
    pub txid: Txid,
    pub fee: Amount,
}

/// Assembles a transaction spending P2WSH outputs.
#[derive(Debug, Clone)]
pub struct TransactionBuilder {
    version: Version,
    lock_time: LockTime,
    inputs: Vec<InputDraft>,
    outputs: Vec<TxOut>,
}

fn checked_total(side: &'static str, mut values: impl Iterator<Item = Amount>) -> Result<Amount> {
    values.try_fold(Amount::ZERO, |total, value| {
        total.checked_add(value).ok_or(Error::AmountOverflow(side))
    })
}

impl Default for TransactionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionBuilder {
    pub fn new() -> Self {
        Self {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn with_lock_time(mut self, lock_time: LockTime) -> Self {
        self.lock_time = lock_time;
        self
    }

    pub fn inputs(&self) -> &[InputDraft] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[TxOut] {
        &self.outputs
    }

    /// True once any input has been signed or finalized.
    pub fn is_sealed(&self) -> bool {
        self.inputs
            .iter()
            .any(|i| i.is_finalized() || !i.partial_sigs.is_empty())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_sealed() {
            return Err(Error::TransactionSealed);
        }
        Ok(())
    }

    fn input_mut(&mut self, index: usize) -> Result<&mut InputDraft> {
        let count = self.inputs.len();
        self.inputs
            .get_mut(index)
            .ok_or(Error::InputIndex { index, count })
    }

    /// Register an input spending `utxo`, which is locked by `previous_output_script`.
    ///
    /// `previous_output_script` must be the P2WSH commitment to `redeem_script`.
    /// Returns the input index.
    pub fn add_input(
        &mut self,
        utxo: &Utxo,
        previous_output_script: ScriptBuf,
        previous_output_value: Amount,
        redeem_script: ScriptBuf,
        spending_path: SpendingPath,
    ) -> Result<usize> {
        self.ensure_open()?;
        let index = self.inputs.len();
        if p2wsh_script_pubkey(&redeem_script) != previous_output_script {
            return Err(Error::ScriptMismatch {
                index,
                script_hex: hex::encode(redeem_script.as_bytes()),
            });
        }

        self.inputs.push(InputDraft {
            outpoint: utxo.outpoint(),
            witness_utxo: TxOut {
                value: previous_output_value,
                script_pubkey: previous_output_script,
            },
            witness_script: redeem_script,
            spending_path,
            sequence: Sequence::MAX,
            partial_sigs: Vec::new(),
            final_script_witness: None,
        });
        Ok(index)
    }

    /// Pay `value` to `address`. Returns the output index.
    pub fn add_output(&mut self, address: &Address, value: Amount) -> Result<usize> {
        self.add_output_script(address.script_pubkey(), value)
    }

    pub fn add_output_script(&mut self, script_pubkey: ScriptBuf, value: Amount) -> Result<usize> {
        self.ensure_open()?;
        self.outputs.push(TxOut {
            value,
            script_pubkey,
        });
        Ok(self.outputs.len() - 1)
    }

    pub fn input_value(&self) -> Result<Amount> {
        checked_total("input", self.inputs.iter().map(|i| i.witness_utxo.value))
    }

    pub fn output_value(&self) -> Result<Amount> {
        checked_total("output", self.outputs.iter().map(|o| o.value))
    }

    /// Inputs minus outputs. Fails unless strictly positive.
    pub fn fee(&self) -> Result<Amount> {
        let inputs = self.input_value()?;
        let outputs = self.output_value()?;
        if outputs >= inputs {
            return Err(Error::NegativeFee {
                inputs: inputs.to_sat(),
                outputs: outputs.to_sat(),
            });
        }
        Ok(inputs - outputs)
    }

    /// The transaction with empty script sigs and witnesses, as signed.
    pub fn unsigned_tx(&self) -> Transaction {
        Transaction {
            version: self.version,
            lock_time: self.lock_time,
            input: self
                .inputs
                .iter()
                .map(|i| TxIn {
                    previous_output: i.outpoint,
                    script_sig: ScriptBuf::new(),
                    sequence: i.sequence,
                    witness: Witness::new(),
                })
                .collect(),
            output: self.outputs.clone(),
        }
    }

    /// Sign input `index` with `keypair` over the current transaction.
    ///
    /// Call only after every input and output is in place; the builder refuses
    /// structural changes afterwards.
    pub fn sign_input(
        &mut self,
        index: usize,
        signing: &SigningContext,
        keypair: &Keypair,
    ) -> Result<()> {
        let tx = self.unsigned_tx();
        let input = self.input_mut(index)?;
        if input.is_finalized() {
            return Err(Error::AlreadyFinalized { index });
        }

        let signature = signing.sign_p2wsh_input(
            &tx,
            index,
            &input.witness_script,
            input.witness_utxo.value,
            keypair,
        )?;
        let public_key = signing.public_key(keypair);
        input.partial_sigs.retain(|(pk, _)| *pk != public_key);
        input.partial_sigs.push((public_key, signature));
        log::debug!("builder: signed input {index} with {public_key}");
        Ok(())
    }

    /// Finalize input `index` with the spending path it was registered with.
    pub fn finalize_input(&mut self, index: usize) -> Result<()> {
        let path = self.input_mut(index)?.spending_path.clone();
        self.finalize_input_with(index, &path)
    }

    /// Finalize input `index` with a caller-supplied finalizer.
    pub fn finalize_input_with<F: Finalizer + ?Sized>(
        &mut self,
        index: usize,
        finalizer: &F,
    ) -> Result<()> {
        let input = self.input_mut(index)?;
        if input.is_finalized() {
            return Err(Error::AlreadyFinalized { index });
        }

        let ctx = FinalizeContext {
            input_index: index,
            partial_sigs: &input.partial_sigs,
        };
        let stack = finalizer.finalize(&input.witness_script, &ctx)?;
        log::debug!("builder: finalized input {index} with {} witness items", stack.len());

        input.final_script_witness = Some(stack.encode());
        input.partial_sigs.clear();
        Ok(())
    }

    /// Produce the final transaction. Every input must be finalized.
    pub fn extract_transaction(&self) -> Result<ExtractedTransaction> {
        if let Some(index) = self.inputs.iter().position(|i| !i.is_finalized()) {
            return Err(Error::IncompleteTransaction { index });
        }
        let fee = self.fee()?;

        let mut tx = self.unsigned_tx();
        for (index, (txin, draft)) in tx.input.iter_mut().zip(&self.inputs).enumerate() {
            let Some(field) = draft.final_script_witness.as_deref() else {
                return Err(Error::IncompleteTransaction { index });
            };
            txin.witness = bitcoin::consensus::deserialize::<Witness>(field)
                .map_err(|e| Error::Decode(format!("input {index}: {e}")))?;
        }

        let txid = tx.compute_txid();
        Ok(ExtractedTransaction {
            hex: serialize_hex(&tx),
            txid,
            fee,
            tx,
        })
    }
}
