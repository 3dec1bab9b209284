//! The two demonstration flows: derive an address, wait for it to be funded,
//! spend the output to the configured destination and broadcast.

use scriptpay_sdk::bitcoin::Txid;
use scriptpay_sdk::{
    AdditionContract, CancelToken, ChainSource, ElectrumBackend, EsploraBackend,
    HashLockContract, ScriptSpender, SpendResult, WitnessContract, cancel_pair,
};

use crate::config::{BackendKind, Result, SpendConfig};

/// Outcome reported back to the CLI.
#[derive(Debug, Clone)]
pub struct FlowReport {
    pub address: String,
    pub witness_script_hex: String,
    pub result: SpendResult,
}

impl FlowReport {
    pub fn txid(&self) -> Txid {
        self.result.txid
    }
}

/// Cancel the funding wait on Ctrl-C.
fn ctrl_c_token() -> CancelToken {
    let (handle, token) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("commands: interrupted, cancelling funding watch");
            handle.cancel();
        }
    });
    token
}

fn announce<W: WitnessContract>(contract: &W, config: &SpendConfig) -> Result<String> {
    let address = contract.address(config.network)?.to_string();
    println!("Send {} coins to: {address}", config.network);
    println!(
        "Witness script: {}",
        hex::encode(contract.witness_script().as_bytes())
    );
    Ok(address)
}

// ── Pay to addition script ──────────────────────────────────────────

pub async fn run_addition(config: &SpendConfig, target: i64, operands: &[i64]) -> Result<FlowReport> {
    match config.chain.backend {
        BackendKind::Esplora => {
            addition_flow(EsploraBackend::new(&config.chain_url())?, config, target, operands).await
        }
        BackendKind::Electrum => {
            addition_flow(ElectrumBackend::new(&config.chain_url()), config, target, operands).await
        }
    }
}

pub async fn addition_flow<C: ChainSource>(
    chain: C,
    config: &SpendConfig,
    target: i64,
    operands: &[i64],
) -> Result<FlowReport> {
    let contract = AdditionContract::new(target)?;
    let address = announce(&contract, config)?;
    let spender = ScriptSpender::new(chain, config.network).with_watch_config(config.watch_config());

    let result = spender
        .spend_addition(
            &contract,
            operands,
            &config.destination()?,
            config.fee(),
            Some(ctrl_c_token()),
        )
        .await?;

    Ok(FlowReport {
        address,
        witness_script_hex: hex::encode(contract.witness_script().as_bytes()),
        result,
    })
}

// ── Pay to address with secret ──────────────────────────────────────

pub async fn run_hash_lock(config: &SpendConfig, secret: &[u8]) -> Result<FlowReport> {
    match config.chain.backend {
        BackendKind::Esplora => {
            hash_lock_flow(EsploraBackend::new(&config.chain_url())?, config, secret).await
        }
        BackendKind::Electrum => {
            hash_lock_flow(ElectrumBackend::new(&config.chain_url()), config, secret).await
        }
    }
}

pub async fn hash_lock_flow<C: ChainSource>(
    chain: C,
    config: &SpendConfig,
    secret: &[u8],
) -> Result<FlowReport> {
    let spender = ScriptSpender::new(chain, config.network).with_watch_config(config.watch_config());
    let (keypair, public_key) = spender.generate_keypair();
    let contract = HashLockContract::new(secret, &public_key)?;
    let address = announce(&contract, config)?;
    log::info!("commands: locking to {public_key}");

    let result = spender
        .spend_hash_lock(
            &contract,
            secret,
            &keypair,
            &config.destination()?,
            config.fee(),
            Some(ctrl_c_token()),
        )
        .await?;

    Ok(FlowReport {
        address,
        witness_script_hex: hex::encode(contract.witness_script().as_bytes()),
        result,
    })
}
