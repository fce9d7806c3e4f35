//! Task-guard operator
//!
//! Long-running process: watches the task contract, answers every new task
//! with a signed safe/unsafe verdict, and serves `/health` and `/status`.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::{mpsc, watch};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use task_guard_operator::app_state::AppState;
use task_guard_operator::config::OperatorConfig;
use task_guard_operator::ledger::EvmLedger;
use task_guard_operator::routes::status_routes;
use task_guard_operator::services::{
    AttestationSigner, OllamaClassifier, ResponseSubmitter, TaskPipeline, TaskWatcher,
};

const TASK_CHANNEL_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = OperatorConfig::from_env().context("operator configuration")?;

    let ledger = Arc::new(
        EvmLedger::connect(
            &config.contracts.rpc_url,
            config.contracts.task_contract_address,
            config.operator_signer.clone(),
            config.submitter.receipt_timeout,
        )
        .context("ledger client")?,
    );
    let state = AppState::new(ledger.account(), ledger.contract_address());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (task_tx, task_rx) = mpsc::channel(TASK_CHANNEL_CAPACITY);

    let watcher = TaskWatcher::new(ledger.clone(), config.watcher.clone(), state.clone())
        .await
        .context("task watcher")?;
    let signer = AttestationSigner::new(config.operator_signer.clone());
    info!(operator = %signer.address(), "Attestations will be signed by operator key");

    let pipeline = TaskPipeline::new(
        Arc::new(OllamaClassifier::new(&config.oracle)),
        signer,
        ResponseSubmitter::new(ledger.clone(), config.submitter.clone()),
        config.seen_task_capacity,
        state.clone(),
    )
    .with_checkpoint(watcher.checkpoint());

    let addr = SocketAddr::from(([127, 0, 0, 1], config.status_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding status endpoint on {addr}"))?;
    info!("Status endpoint listening on {}", addr);

    let mut status_shutdown = shutdown_rx.clone();
    let status_handle = tokio::spawn(async move {
        axum::serve(listener, status_routes(state))
            .with_graceful_shutdown(async move {
                let _ = status_shutdown.wait_for(|stop| *stop).await;
            })
            .await
    });
    let pipeline_handle = tokio::spawn(pipeline.run(task_rx, shutdown_rx.clone()));
    let mut watcher_handle = tokio::spawn(watcher.run(task_tx, shutdown_rx));

    info!("Starting to watch for new tasks...");

    let joined = tokio::select! {
        _ = tokio::signal::ctrl_c() => None,
        joined = &mut watcher_handle => Some(joined),
    };
    if joined.is_none() {
        info!("Stopping task watcher...");
    }
    let _ = shutdown_tx.send(true);

    let watcher_result = match joined {
        Some(joined) => joined,
        None => watcher_handle.await,
    };

    pipeline_handle.await.context("task pipeline panicked")?;
    if let Err(err) = status_handle.await.context("status endpoint panicked")? {
        error!(error = %err, "Status endpoint failed");
    }

    watcher_result
        .context("task watcher panicked")?
        .context("task watcher stopped")?;

    info!("Operator stopped");
    Ok(())
}
