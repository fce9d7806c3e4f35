//! Data models for the task-guard operator

use alloy::primitives::{Bytes, TxHash, B256};
use serde::{Deserialize, Serialize};

use crate::contract::TaskManager;

pub mod oracle;

/// Task as emitted by the contract. Read verbatim, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub contents: String,
    pub task_created_block: u32,
}

impl From<TaskManager::Task> for Task {
    fn from(task: TaskManager::Task) -> Self {
        Self {
            contents: task.contents,
            task_created_block: task.taskCreatedBlock,
        }
    }
}

impl From<&Task> for TaskManager::Task {
    fn from(task: &Task) -> Self {
        Self {
            contents: task.contents.clone(),
            taskCreatedBlock: task.task_created_block,
        }
    }
}

/// A decoded `NewTaskCreated` event and its position in the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRecord {
    pub task_index: u32,
    pub task: Task,
    pub block_number: Option<u64>,
    pub log_index: Option<u64>,
}

/// Binary classification result for a task's contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub is_safe: bool,
}

impl Verdict {
    pub const SAFE: Verdict = Verdict { is_safe: true };
    pub const UNSAFE: Verdict = Verdict { is_safe: false };
}

/// Signed verdict over a task's contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attestation {
    pub verdict: Verdict,
    /// `keccak256(byte(is_safe) ++ contents)`
    pub digest: B256,
    /// 65-byte `r || s || v` signature.
    pub signature: Bytes,
}

/// Argument set for `respondToTask`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskResponse {
    pub task: Task,
    pub task_index: u32,
    pub is_safe: bool,
    pub signature: Bytes,
}

impl TaskResponse {
    pub fn new(record: &TaskRecord, attestation: &Attestation) -> Self {
        Self {
            task: record.task.clone(),
            task_index: record.task_index,
            is_safe: attestation.verdict.is_safe,
            signature: attestation.signature.clone(),
        }
    }
}

/// Summary of a mined response transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResponseReceipt {
    pub tx_hash: TxHash,
    pub block_number: Option<u64>,
    pub success: bool,
}

/// Standard JSON envelope for the status endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_round_trips_through_abi_type() {
        let task = Task {
            contents: "hello world".to_string(),
            task_created_block: 17,
        };
        let abi: TaskManager::Task = (&task).into();
        assert_eq!(abi.taskCreatedBlock, 17);
        assert_eq!(Task::from(abi), task);
    }

    #[test]
    fn test_response_copies_record_and_attestation() {
        let record = TaskRecord {
            task_index: 3,
            task: Task {
                contents: "x".to_string(),
                task_created_block: 9,
            },
            block_number: Some(10),
            log_index: Some(0),
        };
        let attestation = Attestation {
            verdict: Verdict::UNSAFE,
            digest: B256::ZERO,
            signature: Bytes::from(vec![1u8; 65]),
        };

        let response = TaskResponse::new(&record, &attestation);
        assert_eq!(response.task_index, 3);
        assert!(!response.is_safe);
        assert_eq!(response.signature.len(), 65);
        assert_eq!(response.task, record.task);
    }
}
