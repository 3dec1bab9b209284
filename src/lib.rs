pub mod commands;
pub mod config;

pub use commands::{FlowReport, run_addition, run_hash_lock};
pub use config::{AppError, BackendKind, ChainConfig, SpendConfig};
