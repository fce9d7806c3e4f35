//! Test harness: creates one task on the task contract.

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use task_guard_operator::config::{signer_from_lookup, ContractsConfig, CREATOR_KEY_VAR};
use task_guard_operator::ledger::EvmLedger;

#[derive(Parser)]
#[command(about = "Create a task for the operator to classify")]
struct Cli {
    /// Text the operator should classify.
    #[arg(long, default_value = "hello world")]
    contents: String,

    /// Seconds to wait for the transaction receipt.
    #[arg(long, default_value_t = 120)]
    receipt_timeout_seconds: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let lookup = |name: &str| std::env::var(name).ok();
    let signer = signer_from_lookup(&lookup, CREATOR_KEY_VAR).context("task creator key")?;
    let contracts = ContractsConfig::from_env().context("contract configuration")?;

    let ledger = EvmLedger::connect(
        &contracts.rpc_url,
        contracts.task_contract_address,
        signer,
        Duration::from_secs(cli.receipt_timeout_seconds),
    )?;
    info!(account = %ledger.account(), "Creating task");

    let (task, receipt) = ledger
        .create_task(&cli.contents)
        .await
        .context("createNewTask")?;

    info!(
        contents = %task.contents,
        task_created_block = task.task_created_block,
        tx_hash = %receipt.tx_hash,
        block = ?receipt.block_number,
        success = receipt.success,
        "Task created"
    );
    println!("transaction hash: {}", receipt.tx_hash);
    println!("transaction receipt: {receipt:?}");

    Ok(())
}
