//! Two-phase `respondToTask` submission: dry-run, then broadcast and confirm.

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::SubmitterConfig;
use crate::error::SubmissionError;
use crate::ledger::{with_timeout, ResponseLedger};
use crate::models::{ResponseReceipt, TaskResponse};

pub struct ResponseSubmitter<L: ?Sized> {
    ledger: Arc<L>,
    config: SubmitterConfig,
}

impl<L: ResponseLedger + ?Sized> ResponseSubmitter<L> {
    pub fn new(ledger: Arc<L>, config: SubmitterConfig) -> Self {
        Self { ledger, config }
    }

    /// Simulate the response and, only if that succeeds, broadcast the
    /// simulated request and wait for its receipt. Never retries.
    pub async fn submit(&self, response: &TaskResponse) -> Result<ResponseReceipt, SubmissionError> {
        let request = with_timeout(
            "simulate",
            self.config.rpc_timeout,
            self.ledger.simulate_response(response),
        )
        .await
        .map_err(SubmissionError::Simulation)?;

        debug!(task_index = response.task_index, "respondToTask simulation passed");

        let tx_hash = with_timeout(
            "broadcast",
            self.config.rpc_timeout,
            self.ledger.send_transaction(request),
        )
        .await
        .map_err(SubmissionError::Broadcast)?;

        info!(
            task_index = response.task_index,
            tx_hash = %tx_hash,
            "respondToTask broadcast, waiting for receipt"
        );

        let receipt = with_timeout(
            "receipt",
            self.config.receipt_timeout,
            self.ledger.wait_for_receipt(tx_hash),
        )
        .await
        .map_err(|source| SubmissionError::Confirmation {
            tx_hash: tx_hash.to_string(),
            source,
        })?;

        if !receipt.success {
            return Err(SubmissionError::Reverted {
                tx_hash: tx_hash.to_string(),
            });
        }

        Ok(receipt)
    }
}
