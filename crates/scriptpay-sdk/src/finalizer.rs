//! Witness construction for custom witness scripts.
//!
//! Each supported script class has one finalizer. The caller picks the class
//! when registering an input; nothing here inspects script bytes to guess it.

use bitcoin::{PublicKey, Script, ecdsa};

use crate::error::{Error, Result};
use crate::script::encode_script_num;
use crate::witness::WitnessStack;

/// Everything a finalizer may draw on besides the witness script.
#[derive(Debug, Clone, Copy)]
pub struct FinalizeContext<'a> {
    pub input_index: usize,
    /// Signatures collected for this input, in signing order.
    pub partial_sigs: &'a [(PublicKey, ecdsa::Signature)],
}

/// Produces the witness stack that satisfies one class of script.
///
/// The returned stack ends with the witness script itself, which a
/// script-hash spend must reveal.
pub trait Finalizer {
    fn finalize(&self, witness_script: &Script, ctx: &FinalizeContext<'_>) -> Result<WitnessStack>;
}

fn unsatisfiable(index: usize, witness_script: &Script, reason: impl Into<String>) -> Error {
    Error::UnsatisfiableScript {
        index,
        script_hex: hex::encode(witness_script.as_bytes()),
        reason: reason.into(),
    }
}

/// Unlocks `<a> <b> OP_ADD <n> OP_EQUAL`-style scripts with explicit operands.
///
/// Operands are pushed in the given order, each minimally encoded. Whether
/// they actually sum to the script's constant is left to the verifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdditionFinalizer {
    pub operands: Vec<i64>,
}

impl AdditionFinalizer {
    pub fn new(operands: impl Into<Vec<i64>>) -> Self {
        Self {
            operands: operands.into(),
        }
    }
}

impl Finalizer for AdditionFinalizer {
    fn finalize(&self, witness_script: &Script, ctx: &FinalizeContext<'_>) -> Result<WitnessStack> {
        if self.operands.is_empty() {
            return Err(unsatisfiable(ctx.input_index, witness_script, "no operands"));
        }
        let mut stack = WitnessStack::new();
        for operand in &self.operands {
            let item = encode_script_num(*operand).map_err(|e| {
                unsatisfiable(ctx.input_index, witness_script, format!("operand {operand}: {e}"))
            })?;
            stack.push(item);
        }
        stack.push(witness_script.as_bytes());
        Ok(stack)
    }
}

/// Unlocks the hash-lock-with-signature script:
///
/// ```text
/// OP_HASH160 <secret_hash> OP_EQUALVERIFY
/// OP_DUP OP_HASH160 <pubkey_hash> OP_EQUALVERIFY OP_CHECKSIG
/// ```
///
/// Witness: `[signature, public_key, preimage, witness_script]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashLockFinalizer {
    pub preimage: Vec<u8>,
    pub public_key: PublicKey,
}

impl HashLockFinalizer {
    pub fn new(preimage: impl Into<Vec<u8>>, public_key: PublicKey) -> Self {
        Self {
            preimage: preimage.into(),
            public_key,
        }
    }
}

impl Finalizer for HashLockFinalizer {
    fn finalize(&self, witness_script: &Script, ctx: &FinalizeContext<'_>) -> Result<WitnessStack> {
        let signature = ctx
            .partial_sigs
            .iter()
            .find(|(pk, _)| *pk == self.public_key)
            .map(|(_, sig)| sig)
            .ok_or_else(|| {
                unsatisfiable(
                    ctx.input_index,
                    witness_script,
                    format!("missing signature for {}", self.public_key),
                )
            })?;

        let mut stack = WitnessStack::new();
        stack.push(signature.to_vec());
        stack.push(self.public_key.to_bytes());
        stack.push(self.preimage.clone());
        stack.push(witness_script.as_bytes());
        Ok(stack)
    }
}

/// The spending path registered with an input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpendingPath {
    Addition(AdditionFinalizer),
    HashLock(HashLockFinalizer),
}

impl SpendingPath {
    pub fn addition(operands: impl Into<Vec<i64>>) -> Self {
        SpendingPath::Addition(AdditionFinalizer::new(operands))
    }

    pub fn hash_lock(preimage: impl Into<Vec<u8>>, public_key: PublicKey) -> Self {
        SpendingPath::HashLock(HashLockFinalizer::new(preimage, public_key))
    }

    /// Whether the input must be signed before it can be finalized.
    pub fn requires_signature(&self) -> bool {
        matches!(self, SpendingPath::HashLock(_))
    }
}

impl Finalizer for SpendingPath {
    fn finalize(&self, witness_script: &Script, ctx: &FinalizeContext<'_>) -> Result<WitnessStack> {
        match self {
            SpendingPath::Addition(f) => f.finalize(witness_script, ctx),
            SpendingPath::HashLock(f) => f.finalize(witness_script, ctx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::ScriptBuf;
    use bitcoin::secp256k1::{Secp256k1, SecretKey};
    use bitcoin::sighash::EcdsaSighashType;

    fn addition_script() -> ScriptBuf {
        ScriptBuf::from_bytes(vec![0x93, 0x55, 0x87])
    }

    fn test_pubkey(byte: u8) -> PublicKey {
        let secp = Secp256k1::new();
        let sk = SecretKey::from_slice(&[byte; 32]).unwrap();
        PublicKey::new(sk.public_key(&secp))
    }

    fn test_signature(byte: u8) -> ecdsa::Signature {
        let secp = Secp256k1::new();
        let sk = SecretKey::from_slice(&[byte; 32]).unwrap();
        let msg = bitcoin::secp256k1::Message::from_digest([0x5a; 32]);
        ecdsa::Signature {
            signature: secp.sign_ecdsa(&msg, &sk),
            sighash_type: EcdsaSighashType::All,
        }
    }

    fn ctx(sigs: &[(PublicKey, ecdsa::Signature)]) -> FinalizeContext<'_> {
        FinalizeContext {
            input_index: 0,
            partial_sigs: sigs,
        }
    }

    #[test]
    fn addition_witness_layout() {
        let script = addition_script();
        let stack = AdditionFinalizer::new([1, 4]).finalize(&script, &ctx(&[])).unwrap();
        assert_eq!(
            stack.items(),
            &[vec![0x01], vec![0x04], script.as_bytes().to_vec()]
        );
    }

    #[test]
    fn addition_zero_operand_is_empty_item() {
        let script = addition_script();
        let stack = AdditionFinalizer::new([0, 5]).finalize(&script, &ctx(&[])).unwrap();
        assert!(stack.items()[0].is_empty());
        assert_eq!(stack.items()[1], vec![0x05]);
    }

    #[test]
    fn addition_without_operands_is_unsatisfiable() {
        let err = AdditionFinalizer::new(Vec::<i64>::new())
            .finalize(&addition_script(), &ctx(&[]))
            .unwrap_err();
        assert!(matches!(err, Error::UnsatisfiableScript { index: 0, .. }));
    }

    #[test]
    fn addition_operand_out_of_range() {
        let err = AdditionFinalizer::new([1i64 << 40])
            .finalize(&addition_script(), &ctx(&[]))
            .unwrap_err();
        assert!(matches!(err, Error::UnsatisfiableScript { .. }));
    }

    #[test]
    fn hash_lock_witness_layout() {
        let script = ScriptBuf::from_bytes(vec![0xa9]);
        let pk = test_pubkey(0x01);
        let sig = test_signature(0x01);
        let sigs = [(pk, sig)];
        let stack = HashLockFinalizer::new(b"secret".to_vec(), pk)
            .finalize(&script, &ctx(&sigs))
            .unwrap();

        assert_eq!(stack.len(), 4);
        assert_eq!(stack.items()[0], sig.to_vec());
        assert_eq!(stack.items()[1], pk.to_bytes());
        assert_eq!(stack.items()[2], b"secret".to_vec());
        assert_eq!(stack.last(), Some(script.as_bytes()));
    }

    #[test]
    fn hash_lock_missing_signature() {
        let script = ScriptBuf::from_bytes(vec![0xa9]);
        let err = HashLockFinalizer::new(b"secret".to_vec(), test_pubkey(0x01))
            .finalize(&script, &ctx(&[]))
            .unwrap_err();
        match err {
            Error::UnsatisfiableScript { script_hex, .. } => assert_eq!(script_hex, "a9"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn hash_lock_ignores_other_keys() {
        let script = ScriptBuf::from_bytes(vec![0xa9]);
        let sigs = [(test_pubkey(0x02), test_signature(0x02))];
        let err = HashLockFinalizer::new(b"secret".to_vec(), test_pubkey(0x01))
            .finalize(&script, &ctx(&sigs))
            .unwrap_err();
        assert!(matches!(err, Error::UnsatisfiableScript { .. }));
    }

    #[test]
    fn spending_path_dispatch() {
        let script = addition_script();
        let path = SpendingPath::addition([2, 3]);
        assert!(!path.requires_signature());
        let stack = path.finalize(&script, &ctx(&[])).unwrap();
        assert_eq!(stack.items()[..2], [vec![0x02u8], vec![0x03u8]]);

        assert!(SpendingPath::hash_lock(b"x".to_vec(), test_pubkey(0x01)).requires_signature());
    }
}
