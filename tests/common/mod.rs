//! Test doubles for the ledger and the classifier.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::{Address, TxHash, B256};
use alloy::rpc::types::{Log, TransactionRequest};
use alloy::sol_types::SolEvent;
use async_trait::async_trait;

use task_guard_operator::app_state::AppState;
use task_guard_operator::config::{SubmitterConfig, WatcherConfig};
use task_guard_operator::contract::TaskManager;
use task_guard_operator::error::{LedgerError, OracleError};
use task_guard_operator::ledger::{ResponseLedger, TaskLogSource};
use task_guard_operator::models::{ResponseReceipt, TaskResponse};
use task_guard_operator::services::{
    AttestationSigner, Classifier, ResponseSubmitter, TaskPipeline,
};

pub const ANVIL_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

pub fn task_log(task_index: u32, contents: &str, block: u64, log_index: u64) -> Log {
    let event = TaskManager::NewTaskCreated {
        taskIndex: task_index,
        task: TaskManager::Task {
            contents: contents.to_string(),
            taskCreatedBlock: block as u32,
        },
    };
    Log {
        inner: alloy::primitives::Log {
            address: Address::ZERO,
            data: event.encode_log_data(),
        },
        block_number: Some(block),
        log_index: Some(log_index),
        ..Default::default()
    }
}

/// In-memory chain: a head, a log list, and injectable transport failures.
#[derive(Default)]
pub struct MockChain {
    head: AtomicU64,
    logs: Mutex<Vec<Log>>,
    fail_log_fetches: AtomicU32,
    fetches: AtomicU32,
    answered: Mutex<HashSet<u32>>,
    simulated: Mutex<Vec<u32>>,
    sent: Mutex<Vec<u32>>,
}

impl MockChain {
    pub fn new(head: u64) -> Arc<Self> {
        let chain = Self::default();
        chain.head.store(head, Ordering::SeqCst);
        Arc::new(chain)
    }

    /// Append a log and move the head up to its block.
    pub fn push_log(&self, log: Log) {
        if let Some(block) = log.block_number {
            self.head.fetch_max(block, Ordering::SeqCst);
        }
        self.logs.lock().unwrap().push(log);
    }

    pub fn fail_next_log_fetches(&self, count: u32) {
        self.fail_log_fetches.store(count, Ordering::SeqCst);
    }

    pub fn mark_answered(&self, task_index: u32) {
        self.answered.lock().unwrap().insert(task_index);
    }

    pub fn log_fetches(&self) -> u32 {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn simulated(&self) -> Vec<u32> {
        self.simulated.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<u32> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskLogSource for MockChain {
    async fn latest_block(&self) -> Result<u64, LedgerError> {
        Ok(self.head.load(Ordering::SeqCst))
    }

    async fn task_logs(&self, from_block: u64, to_block: u64) -> Result<Vec<Log>, LedgerError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        let pending_failures = self.fail_log_fetches.load(Ordering::SeqCst);
        if pending_failures > 0 {
            self.fail_log_fetches.store(pending_failures - 1, Ordering::SeqCst);
            return Err(LedgerError::Transport("connection reset by peer".into()));
        }

        // Hand logs back newest first so ordering is the watcher's job.
        let mut logs: Vec<Log> = self
            .logs
            .lock()
            .unwrap()
            .iter()
            .filter(|log| {
                log.block_number
                    .map(|block| (from_block..=to_block).contains(&block))
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        logs.reverse();
        Ok(logs)
    }
}

#[async_trait]
impl ResponseLedger for MockChain {
    async fn simulate_response(
        &self,
        response: &TaskResponse,
    ) -> Result<TransactionRequest, LedgerError> {
        self.simulated.lock().unwrap().push(response.task_index);

        if self.answered.lock().unwrap().contains(&response.task_index) {
            return Err(LedgerError::Reverted(
                "Task has already been responded to".into(),
            ));
        }

        Ok(TransactionRequest {
            nonce: Some(u64::from(response.task_index)),
            ..Default::default()
        })
    }

    async fn send_transaction(&self, request: TransactionRequest) -> Result<TxHash, LedgerError> {
        let task_index = request.nonce.unwrap_or_default() as u32;
        self.sent.lock().unwrap().push(task_index);
        self.answered.lock().unwrap().insert(task_index);
        Ok(B256::with_last_byte(task_index as u8))
    }

    async fn wait_for_receipt(&self, tx_hash: TxHash) -> Result<ResponseReceipt, LedgerError> {
        Ok(ResponseReceipt {
            tx_hash,
            block_number: Some(self.head.load(Ordering::SeqCst)),
            success: true,
        })
    }
}

/// Answers "unsafe" for contents containing "attack", fails for contents
/// containing "oracle-down", and "safe" otherwise.
pub struct ScriptedClassifier;

#[async_trait]
impl Classifier for ScriptedClassifier {
    async fn classify(&self, contents: &str) -> Result<String, OracleError> {
        if contents.contains("oracle-down") {
            return Err(OracleError::Request("connection refused".into()));
        }
        if contents.contains("attack") {
            return Ok("unsafe\nS1".to_string());
        }
        Ok("safe".to_string())
    }
}

pub fn watcher_config() -> WatcherConfig {
    WatcherConfig {
        poll_interval: Duration::from_millis(10),
        max_block_range: 100,
        confirmations: 0,
        resubscribe_overlap_blocks: 2,
        max_resubscribe_attempts: 5,
        rpc_timeout: Duration::from_secs(1),
        state_file: None,
    }
}

pub fn status() -> AppState {
    AppState::new(Address::ZERO, Address::ZERO)
}

pub fn pipeline(
    chain: Arc<MockChain>,
    status: AppState,
) -> TaskPipeline<ScriptedClassifier, MockChain> {
    TaskPipeline::new(
        Arc::new(ScriptedClassifier),
        AttestationSigner::new(ANVIL_KEY.parse().unwrap()),
        ResponseSubmitter::new(
            chain,
            SubmitterConfig {
                rpc_timeout: Duration::from_secs(1),
                receipt_timeout: Duration::from_secs(1),
            },
        ),
        64,
        status,
    )
}
