//! Per-task orchestration: classify, sign, submit.
//!
//! Tasks are handled one at a time in delivery order. That keeps the
//! operator account's nonces in order without a write lock and makes every
//! failure local to its task.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

use crate::app_state::AppState;
use crate::error::PipelineError;
use crate::ledger::ResponseLedger;
use crate::models::{ResponseReceipt, TaskRecord, TaskResponse, Verdict};
use crate::services::attestation::AttestationSigner;
use crate::services::checkpoint::Checkpoint;
use crate::services::oracle_service::{self, Classifier};
use crate::services::response_submitter::ResponseSubmitter;

/// Bounded set of task indices already attempted. Oldest entries are
/// evicted first.
#[derive(Debug)]
pub(crate) struct SeenTasks {
    capacity: usize,
    order: VecDeque<u32>,
    members: HashSet<u32>,
}

impl SeenTasks {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            members: HashSet::with_capacity(capacity),
        }
    }

    /// Returns `false` if `task_index` was already claimed.
    pub fn claim(&mut self, task_index: u32) -> bool {
        if !self.members.insert(task_index) {
            return false;
        }

        self.order.push_back(task_index);
        if self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.members.remove(&evicted);
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }
}

/// Result of a successfully answered task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutcome {
    pub task_index: u32,
    pub verdict: Verdict,
    pub receipt: ResponseReceipt,
}

pub struct TaskPipeline<C: ?Sized, L: ?Sized> {
    classifier: Arc<C>,
    signer: AttestationSigner,
    submitter: ResponseSubmitter<L>,
    seen: SeenTasks,
    status: AppState,
    checkpoint: Option<Checkpoint>,
}

impl<C, L> TaskPipeline<C, L>
where
    C: Classifier + ?Sized,
    L: ResponseLedger + ?Sized,
{
    pub fn new(
        classifier: Arc<C>,
        signer: AttestationSigner,
        submitter: ResponseSubmitter<L>,
        seen_capacity: usize,
        status: AppState,
    ) -> Self {
        Self {
            classifier,
            signer,
            submitter,
            seen: SeenTasks::new(seen_capacity),
            status,
            checkpoint: None,
        }
    }

    /// Report every handled record to the watcher's checkpoint so the
    /// persisted cursor never passes an unhandled task.
    pub fn with_checkpoint(mut self, checkpoint: Checkpoint) -> Self {
        self.checkpoint = Some(checkpoint);
        self
    }

    /// Run the three stages for one task.
    pub async fn process(&self, record: &TaskRecord) -> Result<TaskOutcome, PipelineError> {
        let contents = &record.task.contents;

        let verdict = oracle_service::evaluate(self.classifier.as_ref(), contents).await?;
        debug!(task_index = record.task_index, is_safe = verdict.is_safe, "Task classified");

        let attestation = self.signer.sign(verdict, contents)?;
        let response = TaskResponse::new(record, &attestation);

        let receipt = self.submitter.submit(&response).await?;

        Ok(TaskOutcome {
            task_index: record.task_index,
            verdict,
            receipt,
        })
    }

    /// Dedupe, process and report one delivered task. Failures are logged
    /// and swallowed.
    pub async fn handle(&mut self, record: TaskRecord) -> Option<TaskOutcome> {
        let block = record.block_number;
        let outcome = self.dispatch(record).await;

        if let (Some(checkpoint), Some(block)) = (&self.checkpoint, block) {
            checkpoint.complete(block);
        }
        outcome
    }

    async fn dispatch(&mut self, record: TaskRecord) -> Option<TaskOutcome> {
        if !self.seen.claim(record.task_index) {
            debug!(task_index = record.task_index, "Skipping already attempted task");
            self.status.record_duplicate().await;
            return None;
        }

        self.status.record_task_seen().await;
        info!(
            task_index = record.task_index,
            task_created_block = record.task.task_created_block,
            contents = %record.task.contents,
            "New task detected"
        );

        match self.process(&record).await {
            Ok(outcome) => {
                info!(
                    task_index = outcome.task_index,
                    is_safe = outcome.verdict.is_safe,
                    tx_hash = %outcome.receipt.tx_hash,
                    block = ?outcome.receipt.block_number,
                    "Responded to task"
                );
                self.status
                    .record_response(
                        outcome.task_index,
                        outcome.verdict.is_safe,
                        &outcome.receipt,
                    )
                    .await;
                Some(outcome)
            }
            Err(err) => {
                error!(
                    task_index = record.task_index,
                    stage = %err.stage(),
                    error = %err,
                    "Error responding to task"
                );
                self.status.record_failure().await;
                None
            }
        }
    }

    /// Consume task records until shutdown or until the watcher hangs up.
    /// An in-flight task is finished before checking for shutdown again.
    pub async fn run(
        mut self,
        mut rx: mpsc::Receiver<TaskRecord>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("Task pipeline started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                record = rx.recv() => match record {
                    Some(record) => {
                        self.handle(record).await;
                    }
                    None => break,
                },
            }
        }

        let unhandled = self.checkpoint.as_ref().map(Checkpoint::pending);
        info!(
            attempted = self.seen.len(),
            unhandled = ?unhandled,
            "Task pipeline stopped"
        );
    }
}
