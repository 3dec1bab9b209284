use bitcoin::ecdsa;
use bitcoin::hashes::Hash as _;
use bitcoin::secp256k1::{All, Keypair, Message, Secp256k1, SecretKey};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::{Amount, PublicKey, Script, Transaction};
use rand::thread_rng;

use crate::error::{Error, Result};

/// Owns the secp256k1 context used for key generation and signing.
///
/// Built explicitly and passed by reference; independent contexts can live
/// side by side in one process.
pub struct SigningContext {
    secp: Secp256k1<All>,
}

impl Default for SigningContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SigningContext {
    pub fn new() -> Self {
        Self {
            secp: Secp256k1::new(),
        }
    }

    pub fn secp(&self) -> &Secp256k1<All> {
        &self.secp
    }

    pub fn generate_keypair(&self) -> Keypair {
        Keypair::new(&self.secp, &mut thread_rng())
    }

    pub fn keypair_from_secret(&self, secret: &[u8; 32]) -> Result<Keypair> {
        let sk = SecretKey::from_slice(secret).map_err(|e| Error::Signer(e.to_string()))?;
        Ok(Keypair::from_secret_key(&self.secp, &sk))
    }

    /// Compressed public key of a key pair.
    pub fn public_key(&self, keypair: &Keypair) -> PublicKey {
        PublicKey::new(keypair.public_key())
    }

    /// Sign input `index` of `tx` as a witness-v0 script-hash spend (BIP143,
    /// SIGHASH_ALL).
    ///
    /// The digest covers every input and output of `tx`, so any change to the
    /// transaction afterwards invalidates the signature.
    pub fn sign_p2wsh_input(
        &self,
        tx: &Transaction,
        index: usize,
        witness_script: &Script,
        value: Amount,
        keypair: &Keypair,
    ) -> Result<ecdsa::Signature> {
        let sighash_type = EcdsaSighashType::All;
        let sighash = SighashCache::new(tx)
            .p2wsh_signature_hash(index, witness_script, value, sighash_type)
            .map_err(|e| Error::Signer(format!("sighash for input {index}: {e}")))?;

        let msg = Message::from_digest(sighash.to_byte_array());
        let signature = self.secp.sign_ecdsa(&msg, &keypair.secret_key());
        Ok(ecdsa::Signature {
            signature,
            sighash_type,
        })
    }

    /// Check a signature produced by [`Self::sign_p2wsh_input`].
    pub fn verify_p2wsh_input(
        &self,
        tx: &Transaction,
        index: usize,
        witness_script: &Script,
        value: Amount,
        public_key: &PublicKey,
        signature: &ecdsa::Signature,
    ) -> Result<bool> {
        let sighash = SighashCache::new(tx)
            .p2wsh_signature_hash(index, witness_script, value, signature.sighash_type)
            .map_err(|e| Error::Signer(format!("sighash for input {index}: {e}")))?;
        let msg = Message::from_digest(sighash.to_byte_array());
        Ok(self
            .secp
            .verify_ecdsa(&msg, &signature.signature, &public_key.inner)
            .is_ok())
    }
}
