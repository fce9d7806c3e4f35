//! Operator status shared between the pipeline and the status endpoint

use std::sync::Arc;

use alloy::primitives::{Address, TxHash};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::models::ResponseReceipt;

/// Counters and cursors updated as tasks flow through the operator.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OperatorStatus {
    pub chain_head: Option<u64>,
    pub last_scanned_block: Option<u64>,
    pub tasks_seen: u64,
    pub duplicates_skipped: u64,
    pub responses_submitted: u64,
    pub tasks_failed: u64,
    pub last_response: Option<LastResponse>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LastResponse {
    pub task_index: u32,
    pub is_safe: bool,
    pub tx_hash: TxHash,
    pub block_number: Option<u64>,
    pub at: DateTime<Utc>,
}

/// Body of `GET /status`
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub operator: Address,
    pub contract: Address,
    pub started_at: DateTime<Utc>,
    #[serde(flatten)]
    pub status: OperatorStatus,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    operator: Address,
    contract: Address,
    started_at: DateTime<Utc>,
    status: Arc<RwLock<OperatorStatus>>,
}

impl AppState {
    pub fn new(operator: Address, contract: Address) -> Self {
        Self {
            operator,
            contract,
            started_at: Utc::now(),
            status: Arc::new(RwLock::new(OperatorStatus::default())),
        }
    }

    pub async fn record_scan(&self, chain_head: u64, scanned_to: Option<u64>) {
        let mut status = self.status.write().await;
        status.chain_head = Some(chain_head);
        if scanned_to.is_some() {
            status.last_scanned_block = scanned_to;
        }
    }

    pub async fn record_task_seen(&self) {
        self.status.write().await.tasks_seen += 1;
    }

    pub async fn record_duplicate(&self) {
        self.status.write().await.duplicates_skipped += 1;
    }

    pub async fn record_failure(&self) {
        self.status.write().await.tasks_failed += 1;
    }

    pub async fn record_response(&self, task_index: u32, is_safe: bool, receipt: &ResponseReceipt) {
        let mut status = self.status.write().await;
        status.responses_submitted += 1;
        status.last_response = Some(LastResponse {
            task_index,
            is_safe,
            tx_hash: receipt.tx_hash,
            block_number: receipt.block_number,
            at: Utc::now(),
        });
    }

    pub async fn snapshot(&self) -> StatusReport {
        StatusReport {
            operator: self.operator,
            contract: self.contract,
            started_at: self.started_at,
            status: self.status.read().await.clone(),
        }
    }
}
