//! `FundingWatcher`: polls a chain source until an address is funded.
//!
//! The watcher is a small state machine (`Polling` → `Found` | `TimedOut` |
//! `Cancelled`). [`FundingWatcher::poll_once`] advances it by one lookup;
//! [`FundingWatcher::await_funding`] drives it on the tokio timer with
//! optional timeout and cancellation. Once a terminal state is reached no
//! further lookups are made.

use std::sync::Arc;
use std::time::Duration;

use bitcoin::Address;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::chain::{ChainSource, Utxo};
use crate::error::{Error, Result};

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a funding watch.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Delay between lookups (default: 5s).
    pub poll_interval: Duration,
    /// Give up after this long. `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// Ignore mempool outputs and wait for a confirmed one.
    pub require_confirmed: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            timeout: None,
            require_confirmed: false,
        }
    }
}

impl WatchConfig {
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

// ── State ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchState {
    Polling { attempts: u32 },
    Found(Utxo),
    TimedOut { attempts: u32 },
    Cancelled,
}

impl WatchState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, WatchState::Polling { .. })
    }
}

// ── Cancellation ────────────────────────────────────────────────────

/// Requests cancellation of a running watch.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Observes a [`CancelHandle`].
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested. Never resolves if the handle
    /// is dropped without cancelling.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Create a linked cancel handle and token.
pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx: Arc::new(tx) }, CancelToken { rx })
}

async fn wait_cancelled(token: &mut Option<CancelToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

async fn wait_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

// ── Watcher ─────────────────────────────────────────────────────────

enum Tick {
    Polled(Result<Option<Utxo>>),
    Slept,
    Deadline,
    Cancelled,
}

pub struct FundingWatcher<'a, C> {
    chain: &'a C,
    address: Address,
    config: WatchConfig,
    state: WatchState,
}

impl<'a, C: ChainSource> FundingWatcher<'a, C> {
    pub fn new(chain: &'a C, address: Address, config: WatchConfig) -> Self {
        Self {
            chain,
            address,
            config,
            state: WatchState::Polling { attempts: 0 },
        }
    }

    pub fn state(&self) -> &WatchState {
        &self.state
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn attempts(&self) -> u32 {
        match self.state {
            WatchState::Polling { attempts } | WatchState::TimedOut { attempts } => attempts,
            _ => 0,
        }
    }

    /// Perform one lookup.
    ///
    /// Returns the funding output once found. In a terminal state this
    /// returns the recorded result without querying the chain source.
    pub async fn poll_once(&mut self) -> Result<Option<Utxo>> {
        let attempts = match &self.state {
            WatchState::Polling { attempts } => *attempts + 1,
            WatchState::Found(utxo) => return Ok(Some(utxo.clone())),
            WatchState::TimedOut { attempts } => {
                return Err(Error::FundingTimeout {
                    address: self.address.to_string(),
                    attempts: *attempts,
                });
            }
            WatchState::Cancelled => {
                return Err(Error::WatchCancelled {
                    address: self.address.to_string(),
                });
            }
        };
        self.state = WatchState::Polling { attempts };

        let utxos = self.chain.lookup_utxos(&self.address).await?;
        let found = utxos
            .into_iter()
            .find(|u| u.confirmed || !self.config.require_confirmed);

        match found {
            Some(utxo) => {
                log::info!(
                    "watcher: {} funded by {utxo} ({} sat) after {attempts} lookups",
                    self.address,
                    utxo.value.to_sat()
                );
                self.state = WatchState::Found(utxo.clone());
                Ok(Some(utxo))
            }
            None => {
                log::debug!("watcher: no funding at {} (attempt {attempts})", self.address);
                Ok(None)
            }
        }
    }

    /// Poll until funded, timed out, or cancelled.
    ///
    /// The deadline and the cancel token are watched during lookups as well
    /// as between them, so a stalled chain source cannot hold the watch open.
    /// Transient chain errors are logged and retried on the next tick.
    pub async fn await_funding(mut self, mut cancel: Option<CancelToken>) -> Result<Utxo> {
        let deadline = self.config.timeout.map(|t| Instant::now() + t);
        log::info!(
            "watcher: waiting for funding at {} (every {:?})",
            self.address,
            self.config.poll_interval
        );

        loop {
            if cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
                return Err(self.cancel());
            }

            let tick = tokio::select! {
                biased;
                _ = wait_cancelled(&mut cancel) => Tick::Cancelled,
                _ = wait_deadline(deadline) => Tick::Deadline,
                polled = self.poll_once() => Tick::Polled(polled),
            };
            match tick {
                Tick::Polled(Ok(Some(utxo))) => return Ok(utxo),
                Tick::Polled(Ok(None)) | Tick::Slept => {}
                Tick::Polled(Err(e)) if e.is_transient() => {
                    log::warn!("watcher: lookup for {} failed: {e}", self.address);
                }
                Tick::Polled(Err(e)) => return Err(e),
                Tick::Deadline => return Err(self.time_out()),
                Tick::Cancelled => return Err(self.cancel()),
            }

            let tick = tokio::select! {
                biased;
                _ = wait_cancelled(&mut cancel) => Tick::Cancelled,
                _ = wait_deadline(deadline) => Tick::Deadline,
                _ = tokio::time::sleep(self.config.poll_interval) => Tick::Slept,
            };
            match tick {
                Tick::Deadline => return Err(self.time_out()),
                Tick::Cancelled => return Err(self.cancel()),
                Tick::Slept | Tick::Polled(_) => {}
            }
        }
    }

    fn time_out(&mut self) -> Error {
        let attempts = self.attempts();
        log::warn!(
            "watcher: giving up on {} after {attempts} lookups",
            self.address
        );
        self.state = WatchState::TimedOut { attempts };
        Error::FundingTimeout {
            address: self.address.to_string(),
            attempts,
        }
    }

    fn cancel(&mut self) -> Error {
        log::info!("watcher: watch for {} cancelled", self.address);
        self.state = WatchState::Cancelled;
        Error::WatchCancelled {
            address: self.address.to_string(),
        }
    }
}

/// Run a funding watch on the tokio runtime.
///
/// The returned handle cancels the watch; the task then resolves to
/// [`Error::WatchCancelled`].
pub fn spawn_watch<C>(
    chain: Arc<C>,
    address: Address,
    config: WatchConfig,
) -> (JoinHandle<Result<Utxo>>, CancelHandle)
where
    C: ChainSource + 'static,
{
    let (handle, token) = cancel_pair();
    let task = tokio::spawn(async move {
        FundingWatcher::new(chain.as_ref(), address, config)
            .await_funding(Some(token))
            .await
    });
    (task, handle)
}
