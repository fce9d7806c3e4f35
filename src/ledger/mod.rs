//! Ledger access, split into the narrow capabilities each component needs.
//!
//! The watcher only reads logs ([`TaskLogSource`]); the submitter only
//! simulates, broadcasts and waits ([`ResponseLedger`]). [`EvmLedger`]
//! implements both over HTTP JSON-RPC; tests provide their own doubles.

use std::future::Future;
use std::time::Duration;

use alloy::primitives::TxHash;
use alloy::rpc::types::{Log, TransactionRequest};
use async_trait::async_trait;

use crate::error::LedgerError;
use crate::models::{ResponseReceipt, TaskResponse};

mod evm;

pub use evm::EvmLedger;

/// Read access to `NewTaskCreated` logs.
#[async_trait]
pub trait TaskLogSource: Send + Sync {
    /// Current chain head.
    async fn latest_block(&self) -> Result<u64, LedgerError>;

    /// `NewTaskCreated` logs emitted by the task contract in `[from_block, to_block]`.
    async fn task_logs(&self, from_block: u64, to_block: u64) -> Result<Vec<Log>, LedgerError>;
}

/// Write access for `respondToTask`.
#[async_trait]
pub trait ResponseLedger: Send + Sync {
    /// Dry-run the response from the operator account. Returns the request
    /// to broadcast if the call would succeed.
    async fn simulate_response(
        &self,
        response: &TaskResponse,
    ) -> Result<TransactionRequest, LedgerError>;

    /// Sign and broadcast a simulated request.
    async fn send_transaction(&self, request: TransactionRequest) -> Result<TxHash, LedgerError>;

    /// Block until the transaction is included.
    async fn wait_for_receipt(&self, tx_hash: TxHash) -> Result<ResponseReceipt, LedgerError>;
}

/// Bound a ledger call by `limit`.
pub async fn with_timeout<T, F>(
    operation: &'static str,
    limit: Duration,
    call: F,
) -> Result<T, LedgerError>
where
    F: Future<Output = Result<T, LedgerError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| LedgerError::Timeout {
            operation,
            timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        })?
}
