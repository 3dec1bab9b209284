use std::fs;
use std::path::Path;
use std::time::Duration;

use scriptpay_sdk::bitcoin::{Address, Amount};
use scriptpay_sdk::{Network, WatchConfig};
use serde::Deserialize;

pub const DEFAULT_DESTINATION: &str = "mohjSavDdQYHRYXcS3uS6ttaHP8amyvX78";
pub const DEFAULT_FEE_SATS: u64 = 200;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Config(String),

    #[error(transparent)]
    Sdk(#[from] scriptpay_sdk::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Esplora,
    Electrum,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub backend: BackendKind,
    /// Overrides the network's default endpoint.
    pub url: Option<String>,
}

/// Settings shared by both demonstration flows.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SpendConfig {
    pub network: Network,
    pub destination_address: String,
    pub fee_sats: u64,
    pub chain: ChainConfig,
    pub poll_interval_secs: u64,
    pub funding_timeout_secs: Option<u64>,
}

impl Default for SpendConfig {
    fn default() -> Self {
        Self {
            network: Network::Testnet,
            destination_address: DEFAULT_DESTINATION.to_string(),
            fee_sats: DEFAULT_FEE_SATS,
            chain: ChainConfig::default(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            funding_timeout_secs: None,
        }
    }
}

impl SpendConfig {
    /// Load and validate a JSON config file. Missing fields take defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|source| AppError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: SpendConfig = serde_json::from_str(&contents)
            .map_err(|e| AppError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// `load` when a path is given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.fee_sats == 0 {
            return Err(AppError::Config("fee_sats must be > 0".to_string()));
        }
        if self.poll_interval_secs == 0 {
            return Err(AppError::Config("poll_interval_secs must be > 0".to_string()));
        }
        if self.funding_timeout_secs == Some(0) {
            return Err(AppError::Config("funding_timeout_secs must be > 0".to_string()));
        }
        self.destination()?;
        Ok(())
    }

    pub fn destination(&self) -> Result<Address> {
        Ok(scriptpay_sdk::parse_address(&self.destination_address, self.network)?)
    }

    pub fn fee(&self) -> Amount {
        Amount::from_sat(self.fee_sats)
    }

    pub fn chain_url(&self) -> String {
        match (&self.chain.url, self.chain.backend) {
            (Some(url), _) => url.clone(),
            (None, BackendKind::Esplora) => self.network.esplora_url().to_string(),
            (None, BackendKind::Electrum) => self.network.default_electrum_url().to_string(),
        }
    }

    pub fn watch_config(&self) -> WatchConfig {
        let mut watch = WatchConfig::default()
            .with_poll_interval(Duration::from_secs(self.poll_interval_secs));
        if let Some(secs) = self.funding_timeout_secs {
            watch = watch.with_timeout(Duration::from_secs(secs));
        }
        watch
    }
}
