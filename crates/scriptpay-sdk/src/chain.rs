use std::future::Future;
use std::time::Duration;

use bitcoin::consensus::encode::serialize_hex;
use bitcoin::{Address, Amount, OutPoint, Transaction, Txid};
use serde::Deserialize;

use crate::error::{Error, Result};

/// An unspent output reported by a chain source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utxo {
    pub txid: Txid,
    pub vout: u32,
    pub value: Amount,
    pub confirmed: bool,
}

impl Utxo {
    pub fn outpoint(&self) -> OutPoint {
        OutPoint::new(self.txid, self.vout)
    }
}

impl std::fmt::Display for Utxo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.txid, self.vout)
    }
}

/// Source of chain data: funding lookups and transaction submission.
///
/// `lookup_utxos` returns outputs in the source's own order, and callers
/// rely on that order being stable for a given response.
pub trait ChainSource: Send + Sync {
    /// List unspent outputs paying `address`. Empty when nothing has arrived.
    fn lookup_utxos(&self, address: &Address) -> impl Future<Output = Result<Vec<Utxo>>> + Send;

    /// Submit a raw transaction (hex) and return the txid the source reports.
    ///
    /// A refusal by the service must surface as [`Error::BroadcastRejected`].
    fn submit(&self, tx_hex: &str) -> impl Future<Output = Result<Txid>> + Send;
}

/// Submit a finalized transaction and return its txid.
pub async fn broadcast<C: ChainSource>(chain: &C, tx: &Transaction) -> Result<Txid> {
    let local_txid = tx.compute_txid();
    let tx_hex = serialize_hex(tx);
    log::info!("broadcast: submitting {local_txid} ({} bytes)", tx_hex.len() / 2);

    let txid = chain.submit(&tx_hex).await?;
    if txid != local_txid {
        log::warn!("broadcast: source reported txid {txid}, expected {local_txid}");
    }
    Ok(txid)
}

/// Per-request limit for chain source calls.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

// ── Esplora ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct EsploraUtxo {
    txid: String,
    vout: u32,
    value: u64,
    status: EsploraStatus,
}

#[derive(Debug, Deserialize)]
struct EsploraStatus {
    confirmed: bool,
}

/// Esplora REST backend (blockstream.info, mempool.space, electrs-esplora).
pub struct EsploraBackend {
    base_url: String,
    client: reqwest::Client,
}

impl EsploraBackend {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Chain(format!("cannot build http client: {e}")))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Client errors will not go away by asking again; server errors and rate
/// limiting might.
fn lookup_status_error(url: &str, status: reqwest::StatusCode, body: &str) -> Error {
    let message = format!("GET {url}: {status}: {body}");
    if status.is_client_error() && status != reqwest::StatusCode::TOO_MANY_REQUESTS {
        Error::ChainRequest(message)
    } else {
        Error::Chain(message)
    }
}

impl ChainSource for EsploraBackend {
    async fn lookup_utxos(&self, address: &Address) -> Result<Vec<Utxo>> {
        let url = format!("{}/address/{}/utxo", self.base_url, address);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Chain(format!("GET {url}: {e}")))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(lookup_status_error(&url, status, body.trim()));
        }

        let entries: Vec<EsploraUtxo> = resp
            .json()
            .await
            .map_err(|e| Error::Chain(format!("bad utxo response: {e}")))?;

        entries
            .into_iter()
            .map(|entry| {
                let txid: Txid = entry
                    .txid
                    .parse()
                    .map_err(|e| Error::Chain(format!("bad txid {}: {e}", entry.txid)))?;
                Ok(Utxo {
                    txid,
                    vout: entry.vout,
                    value: Amount::from_sat(entry.value),
                    confirmed: entry.status.confirmed,
                })
            })
            .collect()
    }

    async fn submit(&self, tx_hex: &str) -> Result<Txid> {
        let url = format!("{}/tx", self.base_url);
        let resp = self
            .client
            .post(&url)
            .body(tx_hex.to_string())
            .send()
            .await
            .map_err(|e| Error::Chain(format!("POST {url}: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| Error::Chain(format!("POST {url}: {e}")))?;
        if !status.is_success() {
            return Err(Error::BroadcastRejected(format!("{status}: {}", body.trim())));
        }

        body.trim()
            .parse()
            .map_err(|e| Error::Chain(format!("bad txid in broadcast response {body:?}: {e}")))
    }
}

// ── Electrum ────────────────────────────────────────────────────────

/// Electrum-based chain backend.
///
/// `electrum_client::Client` is blocking, so each call opens a connection on
/// a `spawn_blocking` thread. Socket reads and writes time out after
/// [`REQUEST_TIMEOUT`].
pub struct ElectrumBackend {
    electrum_url: String,
}

impl ElectrumBackend {
    pub fn new(electrum_url: &str) -> Self {
        Self {
            electrum_url: electrum_url.to_string(),
        }
    }

    pub fn electrum_url(&self) -> &str {
        &self.electrum_url
    }
}

fn electrum_connect(url: &str) -> Result<electrum_client::Client> {
    let config = electrum_client::ConfigBuilder::new()
        .timeout(Some(REQUEST_TIMEOUT.as_secs() as u8))
        .build();
    electrum_client::Client::from_config(url, config).map_err(|e| Error::Chain(e.to_string()))
}

impl ChainSource for ElectrumBackend {
    async fn lookup_utxos(&self, address: &Address) -> Result<Vec<Utxo>> {
        use electrum_client::ElectrumApi;

        let url = self.electrum_url.clone();
        let script_pubkey = address.script_pubkey();

        let entries = tokio::task::spawn_blocking(move || {
            let client = electrum_connect(&url)?;
            client
                .script_list_unspent(&script_pubkey)
                .map_err(|e| Error::Chain(e.to_string()))
        })
        .await
        .map_err(|e| Error::Task(e.to_string()))??;

        Ok(entries
            .into_iter()
            .map(|entry| Utxo {
                txid: entry.tx_hash,
                vout: entry.tx_pos as u32,
                value: Amount::from_sat(entry.value),
                // Electrum reports mempool entries with height 0.
                confirmed: entry.height > 0,
            })
            .collect())
    }

    async fn submit(&self, tx_hex: &str) -> Result<Txid> {
        use electrum_client::ElectrumApi;

        let raw = hex::decode(tx_hex).map_err(|e| Error::Chain(format!("bad tx hex: {e}")))?;
        let url = self.electrum_url.clone();

        tokio::task::spawn_blocking(move || {
            let client = electrum_connect(&url)?;
            client.transaction_broadcast_raw(&raw).map_err(|e| match e {
                electrum_client::Error::Protocol(reason) => {
                    Error::BroadcastRejected(reason.to_string())
                }
                other => Error::Chain(other.to_string()),
            })
        })
        .await
        .map_err(|e| Error::Task(e.to_string()))?
    }
}
