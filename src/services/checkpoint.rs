//! Delivery watermark shared by the watcher and the pipeline.
//!
//! The watcher reports what it scanned and what it handed over; the
//! pipeline reports what it finished. The persisted cursor only ever moves
//! up to the last block whose tasks have all been handled.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct CheckpointState {
    scanned_to: Option<u64>,
    /// Block number → records delivered but not yet handled.
    pending: BTreeMap<u64, usize>,
}

#[derive(Clone, Debug, Default)]
pub struct Checkpoint {
    state: Arc<Mutex<CheckpointState>>,
}

impl Checkpoint {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CheckpointState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// A record from `block` is about to be sent to the pipeline.
    pub fn enqueue(&self, block: u64) {
        *self.lock().pending.entry(block).or_insert(0) += 1;
    }

    /// The pipeline is done with one record from `block`, whatever the outcome.
    pub fn complete(&self, block: u64) {
        let mut state = self.lock();
        if let Some(count) = state.pending.get_mut(&block) {
            *count -= 1;
            if *count == 0 {
                state.pending.remove(&block);
            }
        }
    }

    /// Every block up to `block` has been scanned.
    pub fn scanned(&self, block: u64) {
        let mut state = self.lock();
        state.scanned_to = Some(state.scanned_to.map_or(block, |prev| prev.max(block)));
    }

    /// Highest block that is scanned and has no unhandled records at or
    /// below it.
    pub fn safe_block(&self) -> Option<u64> {
        let state = self.lock();
        let scanned_to = state.scanned_to?;
        match state.pending.keys().next() {
            Some(&lowest) => lowest.checked_sub(1).map(|below| below.min(scanned_to)),
            None => Some(scanned_to),
        }
    }

    pub fn pending(&self) -> usize {
        self.lock().pending.values().sum()
    }
}
