use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("script encoding failed: {0}")]
    Encoding(String),

    #[error("unsupported network: {0}")]
    UnsupportedNetwork(String),

    #[error("no funding seen at {address} after {attempts} lookups")]
    FundingTimeout { address: String, attempts: u32 },

    #[error("funding watch for {address} was cancelled")]
    WatchCancelled { address: String },

    #[error("input {index} is not finalized")]
    IncompleteTransaction { index: usize },

    #[error("outputs ({outputs} sat) leave no fee from inputs ({inputs} sat)")]
    NegativeFee { inputs: u64, outputs: u64 },

    #[error("cannot satisfy script {script_hex} for input {index}: {reason}")]
    UnsatisfiableScript {
        index: usize,
        script_hex: String,
        reason: String,
    },

    #[error("broadcast rejected: {0}")]
    BroadcastRejected(String),

    #[error("chain source error: {0}")]
    Chain(String),

    #[error("chain source refused request: {0}")]
    ChainRequest(String),

    #[error("{0} value total overflows")]
    AmountOverflow(&'static str),

    #[error("witness decode error: {0}")]
    Decode(String),

    #[error("input index {index} out of range ({count} inputs)")]
    InputIndex { index: usize, count: usize },

    #[error("input {index} is already finalized")]
    AlreadyFinalized { index: usize },

    #[error("transaction structure is sealed once an input is signed or finalized")]
    TransactionSealed,

    #[error("previous output script of input {index} does not commit to redeem script {script_hex}")]
    ScriptMismatch { index: usize, script_hex: String },

    #[error("address error: {0}")]
    Address(String),

    #[error("signer error: {0}")]
    Signer(String),

    #[error("task join error: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether a watcher should keep polling after this error.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Chain(_))
    }
}
