//! `NewTaskCreated` event watcher.
//!
//! Polls the task contract's logs block range by block range, decodes them
//! into [`TaskRecord`]s and forwards them in emission order. Every poll
//! rescans the last few blocks so logs that appear in an already scanned
//! block after a reorg are still picked up; logs already forwarded from that
//! window are not sent again. After a restart, tasks in the last partially
//! handled block are sent again, so delivery is at-least-once and the
//! consumer must dedupe by task index.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::B256;
use alloy::rpc::types::Log;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::app_state::AppState;
use crate::config::WatcherConfig;
use crate::contract::TaskManager;
use crate::error::WatchError;
use crate::ledger::{with_timeout, TaskLogSource};
use crate::models::TaskRecord;
use crate::services::checkpoint::Checkpoint;

const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Default, Serialize, Deserialize)]
struct WatcherState {
    last_processed_block: u64,
}

/// Position of a log inside its block.
type LogKey = (Option<u64>, Option<B256>);

pub struct TaskWatcher<S: ?Sized> {
    source: Arc<S>,
    config: WatcherConfig,
    status: AppState,
    checkpoint: Checkpoint,
    next_block: Option<u64>,
    /// Lowest block this instance may rescan.
    floor: Option<u64>,
    /// Logs forwarded from the trailing window, by block.
    forwarded: BTreeMap<u64, HashSet<LogKey>>,
    persisted: Option<u64>,
}

impl<S: TaskLogSource + ?Sized> TaskWatcher<S> {
    /// Create a watcher, resuming from the cursor file if one is configured
    /// and present. Without a cursor the first poll starts at the chain head.
    ///
    /// The cursor only advances past blocks whose records were all marked
    /// complete on [`Self::checkpoint`], so the consumer must report back.
    pub async fn new(
        source: Arc<S>,
        config: WatcherConfig,
        status: AppState,
    ) -> Result<Self, WatchError> {
        let saved = match &config.state_file {
            Some(path) => read_watcher_state(path).await?,
            None => None,
        };
        let persisted = saved.as_ref().map(|state| state.last_processed_block);
        let next_block = persisted.map(|block| block.saturating_add(1));

        if let Some(block) = next_block {
            info!(from_block = block, "Resuming task watcher from saved cursor");
        }

        Ok(Self {
            source,
            config,
            status,
            checkpoint: Checkpoint::new(),
            next_block,
            floor: next_block,
            forwarded: BTreeMap::new(),
            persisted,
        })
    }

    /// Next block past the scanned range, if known.
    pub fn next_block(&self) -> Option<u64> {
        self.next_block
    }

    /// Handle the consumer uses to mark delivered records as handled.
    pub fn checkpoint(&self) -> Checkpoint {
        self.checkpoint.clone()
    }

    /// Watch until `shutdown` flips or is dropped.
    ///
    /// Returns an error if resubscription fails `max_resubscribe_attempts`
    /// times in a row or the task channel closes while still running.
    pub async fn run(
        mut self,
        tx: mpsc::Sender<TaskRecord>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), WatchError> {
        info!("Task watcher started");

        let mut failures: u32 = 0;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let outcome = tokio::select! {
                outcome = self.poll_once(&tx) => outcome,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            };

            let wait = match outcome {
                Ok(_) => {
                    if failures > 0 {
                        info!(failures, "Task log subscription re-established");
                    }
                    failures = 0;
                    self.config.poll_interval
                }
                Err(WatchError::PipelineClosed) => {
                    if *shutdown.borrow() {
                        break;
                    }
                    error!("Task channel closed while watcher running");
                    return Err(WatchError::PipelineClosed);
                }
                Err(err) => {
                    failures = failures.saturating_add(1);
                    if failures >= self.config.max_resubscribe_attempts {
                        error!(failures, error = %err, "Giving up on task log subscription");
                        return Err(WatchError::SubscriptionLost {
                            attempts: failures,
                            last_error: err.to_string(),
                        });
                    }

                    let backoff = self.backoff(failures);
                    warn!(
                        failures,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "Task log subscription dropped, resubscribing"
                    );
                    backoff
                }
            };

            tokio::select! {
                _ = sleep(wait) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Task watcher stopped");
        Ok(())
    }

    /// Scan one block range, including the trailing rescan window, and
    /// forward tasks not yet sent. Returns how many task records were
    /// delivered.
    pub async fn poll_once(&mut self, tx: &mpsc::Sender<TaskRecord>) -> Result<usize, WatchError> {
        let head = with_timeout(
            "eth_blockNumber",
            self.config.rpc_timeout,
            self.source.latest_block(),
        )
        .await?;
        let safe_head = head.saturating_sub(self.config.confirmations);

        // New blocks start at `fresh_from`; the rescan window sits below it
        // and does not count against the block range.
        let fresh_from = self.next_block.unwrap_or(safe_head);
        let floor = *self.floor.get_or_insert(fresh_from);
        let from_block = fresh_from
            .saturating_sub(self.config.resubscribe_overlap_blocks)
            .max(floor);

        if from_block > safe_head {
            self.status.record_scan(head, None).await;
            self.save_cursor().await?;
            return Ok(0);
        }

        let span = self.config.max_block_range.saturating_sub(1);
        let to_block = safe_head.min(fresh_from.saturating_add(span));
        let mut logs = with_timeout(
            "eth_getLogs",
            self.config.rpc_timeout,
            self.source.task_logs(from_block, to_block),
        )
        .await?;
        sort_logs(&mut logs);

        let mut delivered = 0;
        for log in &logs {
            if log.removed {
                debug!(block = ?log.block_number, log_index = ?log.log_index, "Ignoring removed log");
                continue;
            }

            if let Some(block) = log.block_number {
                let key = (log.log_index, log.block_hash);
                if !self.forwarded.entry(block).or_default().insert(key) {
                    continue;
                }
            }

            match decode_task_log(log) {
                Ok(record) => {
                    debug!(
                        task_index = record.task_index,
                        block = ?record.block_number,
                        log_index = ?record.log_index,
                        "New task detected"
                    );
                    if let Some(block) = log.block_number {
                        self.checkpoint.enqueue(block);
                    }
                    tx.send(record)
                        .await
                        .map_err(|_| WatchError::PipelineClosed)?;
                    delivered += 1;
                }
                Err(err) => {
                    warn!(
                        block = ?log.block_number,
                        log_index = ?log.log_index,
                        error = %err,
                        "Skipping undecodable task log"
                    );
                }
            }
        }

        let next_block = fresh_from.max(to_block.saturating_add(1));
        self.next_block = Some(next_block);
        let window_start = next_block.saturating_sub(self.config.resubscribe_overlap_blocks);
        self.forwarded = self.forwarded.split_off(&window_start);

        self.checkpoint.scanned(to_block);
        self.status.record_scan(head, Some(to_block)).await;
        self.save_cursor().await?;

        if delivered > 0 {
            info!(from_block, to_block, delivered, "Watcher cycle complete");
        } else {
            debug!(from_block, to_block, "Watcher cycle complete");
        }

        Ok(delivered)
    }

    /// Write the checkpoint's safe block to the cursor file when it moved.
    async fn save_cursor(&mut self) -> Result<(), WatchError> {
        let Some(path) = &self.config.state_file else {
            return Ok(());
        };
        let Some(block) = self.checkpoint.safe_block() else {
            return Ok(());
        };
        if self.persisted == Some(block) {
            return Ok(());
        }

        persist_watcher_state(
            path,
            &WatcherState {
                last_processed_block: block,
            },
        )
        .await?;
        self.persisted = Some(block);
        Ok(())
    }

    fn backoff(&self, failures: u32) -> Duration {
        self.config
            .poll_interval
            .saturating_mul(2u32.saturating_pow(failures.min(5)))
            .min(MAX_BACKOFF)
    }
}

/// Emission order: block number, then log index. Pending logs go last.
pub fn sort_logs(logs: &mut [Log]) {
    logs.sort_by_key(|log| {
        (
            log.block_number.unwrap_or(u64::MAX),
            log.log_index.unwrap_or(u64::MAX),
        )
    });
}

pub fn decode_task_log(log: &Log) -> Result<TaskRecord, WatchError> {
    let decoded = log
        .log_decode::<TaskManager::NewTaskCreated>()
        .map_err(|e| WatchError::Decode(e.to_string()))?;
    let event = decoded.inner.data;

    Ok(TaskRecord {
        task_index: event.taskIndex,
        task: event.task.into(),
        block_number: log.block_number,
        log_index: log.log_index,
    })
}

async fn read_watcher_state(path: &Path) -> Result<Option<WatcherState>, WatchError> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(WatchError::State(format!("{}: {err}", path.display()))),
    };

    serde_json::from_str(&content)
        .map(Some)
        .map_err(|err| WatchError::State(format!("{}: {err}", path.display())))
}

async fn persist_watcher_state(path: &PathBuf, state: &WatcherState) -> Result<(), WatchError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|err| WatchError::State(err.to_string()))?;
    }

    let payload =
        serde_json::to_string_pretty(state).map_err(|err| WatchError::State(err.to_string()))?;
    tokio::fs::write(path, payload)
        .await
        .map_err(|err| WatchError::State(err.to_string()))
}
