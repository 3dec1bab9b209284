pub use bitcoin;

pub mod address;
pub mod builder;
pub mod chain;
pub mod contract;
pub mod error;
pub mod finalizer;
pub mod network;
pub mod script;
pub mod sdk;
pub mod signer;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod watcher;
pub mod witness;

pub use address::{p2wsh_address, p2wsh_address_for, p2wsh_script_pubkey, parse_address};
pub use builder::{ExtractedTransaction, InputDraft, TransactionBuilder};
pub use chain::{ChainSource, ElectrumBackend, EsploraBackend, Utxo, broadcast};
pub use contract::{AdditionContract, HashLockContract, WitnessContract, hash160};
pub use error::{Error, Result};
pub use finalizer::{
    AdditionFinalizer, FinalizeContext, Finalizer, HashLockFinalizer, SpendingPath,
};
pub use network::Network;
pub use script::{Token, compile, parse_asm};
pub use sdk::{ScriptSpender, SpendResult, build_addition_spend, build_hash_lock_spend};
pub use signer::SigningContext;
pub use watcher::{
    CancelHandle, CancelToken, FundingWatcher, WatchConfig, WatchState, cancel_pair, spawn_watch,
};
pub use witness::WitnessStack;
