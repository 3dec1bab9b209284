use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use scriptpay_lib::{FlowReport, SpendConfig, run_addition, run_hash_lock};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path of a JSON spend config (defaults to testnet demo settings)
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Lock to `OP_ADD <target> OP_EQUAL` and spend with two operands
    Addition {
        #[arg(long, default_value_t = 5)]
        target: i64,
        #[arg(long, num_args = 2, default_values_t = [1, 4], allow_negative_numbers = true)]
        operands: Vec<i64>,
    },
    /// Lock to a secret's HASH160 and a fresh key, then spend revealing both
    HashLock {
        #[arg(long, default_value = "secret")]
        secret: String,
    },
}

async fn run(args: Args) -> Result<FlowReport, scriptpay_lib::AppError> {
    let config = SpendConfig::load_or_default(args.config.as_deref())?;
    log::info!(
        "scriptpay: {} via {:?} at {}",
        config.network,
        config.chain.backend,
        config.chain_url()
    );
    match args.command {
        Command::Addition { target, operands } => run_addition(&config, target, &operands).await,
        Command::HashLock { secret } => run_hash_lock(&config, secret.as_bytes()).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(Args::parse()).await {
        Ok(report) => {
            println!("Funded by {}", report.result.funding);
            println!("Broadcast transaction: {}", report.txid());
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("scriptpay: {e}");
            ExitCode::FAILURE
        }
    }
}
