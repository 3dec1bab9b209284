use bitcoin::secp256k1::Keypair;
use bitcoin::{Address, Amount, PublicKey, Txid};

use crate::builder::{ExtractedTransaction, TransactionBuilder};
use crate::chain::{self, ChainSource, Utxo};
use crate::contract::{AdditionContract, HashLockContract, WitnessContract};
use crate::error::{Error, Result};
use crate::network::Network;
use crate::signer::SigningContext;
use crate::watcher::{CancelToken, FundingWatcher, WatchConfig};

/// Result of a broadcast spend.
#[derive(Debug, Clone)]
pub struct SpendResult {
    pub funding: Utxo,
    pub txid: Txid,
    pub tx_hex: String,
    pub fee: Amount,
}

/// Value left for the destination after `fee`.
fn spend_value(funding: &Utxo, fee: Amount) -> Result<Amount> {
    match funding.value.checked_sub(fee) {
        Some(value) if value > Amount::ZERO => Ok(value),
        _ => Err(Error::NegativeFee {
            inputs: funding.value.to_sat(),
            outputs: fee.to_sat(),
        }),
    }
}

/// Build and finalize a spend of a funded addition contract.
pub fn build_addition_spend(
    contract: &AdditionContract,
    funding: &Utxo,
    operands: &[i64],
    destination: &Address,
    fee: Amount,
) -> Result<ExtractedTransaction> {
    let mut builder = TransactionBuilder::new();
    let index = builder.add_input(
        funding,
        contract.script_pubkey(),
        funding.value,
        contract.witness_script().to_owned(),
        contract.spending_path(operands),
    )?;
    builder.add_output(destination, spend_value(funding, fee)?)?;
    builder.finalize_input(index)?;
    builder.extract_transaction()
}

/// Build, sign and finalize a spend of a funded hash-lock contract.
pub fn build_hash_lock_spend(
    signing: &SigningContext,
    contract: &HashLockContract,
    funding: &Utxo,
    preimage: &[u8],
    keypair: &Keypair,
    destination: &Address,
    fee: Amount,
) -> Result<ExtractedTransaction> {
    let public_key = signing.public_key(keypair);
    let mut builder = TransactionBuilder::new();
    let index = builder.add_input(
        funding,
        contract.script_pubkey(),
        funding.value,
        contract.witness_script().to_owned(),
        contract.spending_path(preimage, public_key),
    )?;
    builder.add_output(destination, spend_value(funding, fee)?)?;
    // Sign only once the transaction shape is final, then freeze the input.
    builder.sign_input(index, signing, keypair)?;
    builder.finalize_input(index)?;
    builder.extract_transaction()
}

/// End-to-end flows over one chain source: wait for funding, spend, broadcast.
pub struct ScriptSpender<C> {
    chain: C,
    network: Network,
    signing: SigningContext,
    watch_config: WatchConfig,
}

impl<C: ChainSource> ScriptSpender<C> {
    pub fn new(chain: C, network: Network) -> Self {
        Self {
            chain,
            network,
            signing: SigningContext::new(),
            watch_config: WatchConfig::default(),
        }
    }

    pub fn with_watch_config(mut self, watch_config: WatchConfig) -> Self {
        self.watch_config = watch_config;
        self
    }

    pub fn chain(&self) -> &C {
        &self.chain
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn signing(&self) -> &SigningContext {
        &self.signing
    }

    /// Fresh key pair for a hash-lock contract.
    pub fn generate_keypair(&self) -> (Keypair, PublicKey) {
        let keypair = self.signing.generate_keypair();
        let public_key = self.signing.public_key(&keypair);
        (keypair, public_key)
    }

    /// Block until `contract`'s address holds an output.
    pub async fn await_funding<W: WitnessContract>(
        &self,
        contract: &W,
        cancel: Option<CancelToken>,
    ) -> Result<Utxo> {
        let address = contract.address(self.network)?;
        FundingWatcher::new(&self.chain, address, self.watch_config.clone())
            .await_funding(cancel)
            .await
    }

    async fn broadcast(&self, funding: Utxo, extracted: ExtractedTransaction) -> Result<SpendResult> {
        let txid = chain::broadcast(&self.chain, &extracted.tx).await?;
        log::info!(
            "sdk: spent {funding} to {txid} (fee {} sat)",
            extracted.fee.to_sat()
        );
        Ok(SpendResult {
            funding,
            txid,
            tx_hex: extracted.hex,
            fee: extracted.fee,
        })
    }

    /// Pay-to-addition-script flow: fund, unlock with `operands`, broadcast.
    pub async fn spend_addition(
        &self,
        contract: &AdditionContract,
        operands: &[i64],
        destination: &Address,
        fee: Amount,
        cancel: Option<CancelToken>,
    ) -> Result<SpendResult> {
        let funding = self.await_funding(contract, cancel).await?;
        let extracted = build_addition_spend(contract, &funding, operands, destination, fee)?;
        self.broadcast(funding, extracted).await
    }

    /// Hash-lock flow: fund, sign with `keypair`, reveal `preimage`, broadcast.
    pub async fn spend_hash_lock(
        &self,
        contract: &HashLockContract,
        preimage: &[u8],
        keypair: &Keypair,
        destination: &Address,
        fee: Amount,
        cancel: Option<CancelToken>,
    ) -> Result<SpendResult> {
        let funding = self.await_funding(contract, cancel).await?;
        let extracted = build_hash_lock_spend(
            &self.signing,
            contract,
            &funding,
            preimage,
            keypair,
            destination,
            fee,
        )?;
        self.broadcast(funding, extracted).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{faucet_address, funding_utxo};

    #[test]
    fn fee_must_leave_an_output() {
        let funding = funding_utxo(1_000, 0);
        assert_eq!(
            spend_value(&funding, Amount::from_sat(200)).unwrap(),
            Amount::from_sat(800)
        );
        assert!(spend_value(&funding, Amount::from_sat(1_000)).is_err());
        assert!(spend_value(&funding, Amount::from_sat(5_000)).is_err());
    }

    #[test]
    fn addition_spend_pays_destination() {
        let contract = AdditionContract::new(5).unwrap();
        let extracted = build_addition_spend(
            &contract,
            &funding_utxo(10_000, 1),
            &[1, 4],
            &faucet_address(),
            Amount::from_sat(200),
        )
        .unwrap();
        assert_eq!(extracted.fee, Amount::from_sat(200));
        assert_eq!(extracted.tx.output[0].script_pubkey, faucet_address().script_pubkey());
        assert_eq!(extracted.tx.input[0].previous_output.vout, 1);
    }
}
