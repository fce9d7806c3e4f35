//! End-to-end tests for the watcher → pipeline → submitter path.

mod common;

use std::time::Duration;

use alloy::primitives::{Bytes, LogData};
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, timeout, Instant};

use common::{pipeline, status, task_log, watcher_config, MockChain};
use task_guard_operator::error::WatchError;
use task_guard_operator::models::{Task, TaskRecord, Verdict};
use task_guard_operator::services::TaskWatcher;

fn record(task_index: u32, contents: &str) -> TaskRecord {
    TaskRecord {
        task_index,
        task: Task {
            contents: contents.to_string(),
            task_created_block: 1,
        },
        block_number: Some(1),
        log_index: Some(u64::from(task_index)),
    }
}

/// Poll `condition` until it holds or two seconds pass.
async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    condition()
}

#[tokio::test]
async fn test_safe_and_unsafe_verdicts_are_submitted() {
    let chain = MockChain::new(1);
    let mut pipeline = pipeline(chain.clone(), status());

    let safe = pipeline.handle(record(0, "hello world")).await.unwrap();
    assert_eq!(safe.verdict, Verdict::SAFE);

    let flagged = pipeline.handle(record(1, "plan an attack")).await.unwrap();
    assert_eq!(flagged.verdict, Verdict::UNSAFE);

    assert_eq!(chain.sent(), vec![0, 1]);
}

#[tokio::test]
async fn test_oracle_failure_does_not_block_next_task() {
    let chain = MockChain::new(1);
    let state = status();
    let mut pipeline = pipeline(chain.clone(), state.clone());

    assert!(pipeline.handle(record(0, "oracle-down")).await.is_none());
    assert!(pipeline.handle(record(1, "hello world")).await.is_some());

    // Task 0 never reached the ledger; task 1 went all the way through.
    assert_eq!(chain.simulated(), vec![1]);
    assert_eq!(chain.sent(), vec![1]);

    let report = state.snapshot().await;
    assert_eq!(report.status.tasks_failed, 1);
    assert_eq!(report.status.responses_submitted, 1);
}

#[tokio::test]
async fn test_already_answered_task_stops_at_simulation() {
    let chain = MockChain::new(1);
    chain.mark_answered(7);
    let mut pipeline = pipeline(chain.clone(), status());

    assert!(pipeline.handle(record(7, "hello world")).await.is_none());

    assert_eq!(chain.simulated(), vec![7]);
    assert!(chain.sent().is_empty());
}

#[tokio::test]
async fn test_duplicate_delivery_is_skipped() {
    let chain = MockChain::new(1);
    let state = status();
    let mut pipeline = pipeline(chain.clone(), state.clone());

    assert!(pipeline.handle(record(3, "hello world")).await.is_some());
    assert!(pipeline.handle(record(3, "hello world")).await.is_none());

    assert_eq!(chain.simulated(), vec![3]);
    assert_eq!(state.snapshot().await.status.duplicates_skipped, 1);
}

#[tokio::test]
async fn test_batch_is_delivered_in_emission_order() {
    let chain = MockChain::new(9);
    let mut watcher = TaskWatcher::new(chain.clone(), watcher_config(), status())
        .await
        .unwrap();
    let (tx, mut rx) = mpsc::channel(8);

    assert_eq!(watcher.poll_once(&tx).await.unwrap(), 0);
    assert_eq!(watcher.next_block(), Some(10));

    chain.push_log(task_log(0, "first", 10, 0));
    chain.push_log(task_log(1, "second", 10, 4));
    chain.push_log(task_log(2, "third", 11, 1));

    let delivered = watcher.poll_once(&tx).await.unwrap();
    assert_eq!(delivered, 3);
    assert_eq!(watcher.next_block(), Some(12));

    let mut order = Vec::new();
    while let Ok(record) = rx.try_recv() {
        order.push((record.task_index, record.task.contents));
    }
    assert_eq!(
        order,
        vec![
            (0, "first".to_string()),
            (1, "second".to_string()),
            (2, "third".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_malformed_log_is_skipped() {
    let chain = MockChain::new(5);
    let mut broken = task_log(0, "broken", 5, 0);
    broken.inner.data = LogData::new_unchecked(vec![], Bytes::new());
    chain.push_log(broken);
    chain.push_log(task_log(1, "fine", 5, 1));

    let mut watcher = TaskWatcher::new(chain.clone(), watcher_config(), status())
        .await
        .unwrap();
    let (tx, mut rx) = mpsc::channel(8);

    assert_eq!(watcher.poll_once(&tx).await.unwrap(), 1);
    assert_eq!(rx.try_recv().unwrap().task_index, 1);
}

#[tokio::test]
async fn test_watcher_resubscribes_after_drop() {
    let chain = MockChain::new(1);
    let state = status();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (tx, rx) = mpsc::channel(8);

    let watcher = TaskWatcher::new(chain.clone(), watcher_config(), state.clone())
        .await
        .unwrap();
    let watcher_handle = tokio::spawn(watcher.run(tx, shutdown_rx.clone()));
    let pipeline_handle = tokio::spawn(pipeline(chain.clone(), state).run(rx, shutdown_rx));

    chain.push_log(task_log(0, "before drop", 2, 0));
    assert!(eventually(|| chain.sent() == vec![0]).await);

    // Two fetches fail, then the stream comes back with a new task.
    chain.fail_next_log_fetches(2);
    let fetches_before = chain.log_fetches();
    assert!(eventually(|| chain.log_fetches() >= fetches_before + 2).await);
    chain.push_log(task_log(1, "after drop", 3, 0));

    assert!(eventually(|| chain.sent() == vec![0, 1]).await);
    assert!(!watcher_handle.is_finished());

    shutdown_tx.send(true).unwrap();
    timeout(Duration::from_secs(2), watcher_handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    timeout(Duration::from_secs(2), pipeline_handle)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_rescan_window_does_not_redeliver() {
    let chain = MockChain::new(4);
    chain.push_log(task_log(0, "hello world", 4, 0));

    let mut watcher = TaskWatcher::new(chain.clone(), watcher_config(), status())
        .await
        .unwrap();
    let (tx, mut rx) = mpsc::channel(8);

    assert_eq!(watcher.poll_once(&tx).await.unwrap(), 1);
    chain.push_log(task_log(1, "next", 5, 0));
    assert_eq!(watcher.poll_once(&tx).await.unwrap(), 1);
    assert_eq!(watcher.poll_once(&tx).await.unwrap(), 0);

    let delivered: Vec<u32> = std::iter::from_fn(|| rx.try_recv().ok())
        .map(|record| record.task_index)
        .collect();
    assert_eq!(delivered, vec![0, 1]);
}

#[tokio::test]
async fn test_log_appearing_in_scanned_block_is_delivered() {
    let chain = MockChain::new(10);
    let mut watcher = TaskWatcher::new(chain.clone(), watcher_config(), status())
        .await
        .unwrap();
    let (tx, mut rx) = mpsc::channel(8);

    assert_eq!(watcher.poll_once(&tx).await.unwrap(), 0);
    assert_eq!(watcher.next_block(), Some(11));

    // Block 10 was replaced and now carries a task.
    chain.push_log(task_log(3, "reorged in", 10, 0));

    assert_eq!(watcher.poll_once(&tx).await.unwrap(), 1);
    assert_eq!(rx.try_recv().unwrap().task_index, 3);
    assert_eq!(watcher.poll_once(&tx).await.unwrap(), 0);
}

#[tokio::test]
async fn test_repeated_failures_are_fatal() {
    let chain = MockChain::new(1);
    chain.fail_next_log_fetches(u32::MAX);

    let mut config = watcher_config();
    config.poll_interval = Duration::from_millis(1);
    config.max_resubscribe_attempts = 3;

    let watcher = TaskWatcher::new(chain.clone(), config, status()).await.unwrap();
    let (tx, _rx) = mpsc::channel(8);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    let err = timeout(Duration::from_secs(2), watcher.run(tx, shutdown_rx))
        .await
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, WatchError::SubscriptionLost { attempts: 3, .. }));
}

#[tokio::test]
async fn test_shutdown_while_idle() {
    let chain = MockChain::new(1);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (tx, rx) = mpsc::channel(8);

    let watcher = TaskWatcher::new(chain.clone(), watcher_config(), status())
        .await
        .unwrap();
    let watcher_handle = tokio::spawn(watcher.run(tx, shutdown_rx.clone()));
    let pipeline_handle = tokio::spawn(pipeline(chain, status()).run(rx, shutdown_rx));

    sleep(Duration::from_millis(50)).await;
    shutdown_tx.send(true).unwrap();

    timeout(Duration::from_secs(1), watcher_handle)
        .await
        .expect("watcher did not stop")
        .unwrap()
        .unwrap();
    timeout(Duration::from_secs(1), pipeline_handle)
        .await
        .expect("pipeline did not stop")
        .unwrap();
}

#[tokio::test]
async fn test_cursor_file_resumes_after_restart() {
    let path = std::env::temp_dir().join(format!(
        "task-guard-resume-{}.json",
        std::process::id()
    ));
    let _ = tokio::fs::remove_file(&path).await;

    let mut config = watcher_config();
    config.state_file = Some(path.clone());

    let chain = MockChain::new(20);
    let (tx, mut rx) = mpsc::channel(8);

    let mut first = TaskWatcher::new(chain.clone(), config.clone(), status())
        .await
        .unwrap();
    first.poll_once(&tx).await.unwrap();
    assert_eq!(first.next_block(), Some(21));
    drop(first);

    // Tasks created while the operator was down are still picked up.
    chain.push_log(task_log(5, "while offline", 22, 0));

    let mut second = TaskWatcher::new(chain.clone(), config, status())
        .await
        .unwrap();
    assert_eq!(second.next_block(), Some(21));
    assert_eq!(second.poll_once(&tx).await.unwrap(), 1);
    assert_eq!(rx.try_recv().unwrap().task_index, 5);

    tokio::fs::remove_file(&path).await.unwrap();
}

#[tokio::test]
async fn test_cursor_waits_for_queued_tasks() {
    let path = std::env::temp_dir().join(format!(
        "task-guard-queued-{}.json",
        std::process::id()
    ));
    let _ = tokio::fs::remove_file(&path).await;

    let mut config = watcher_config();
    config.state_file = Some(path.clone());

    let chain = MockChain::new(9);
    let (tx, rx) = mpsc::channel(8);
    let mut first = TaskWatcher::new(chain.clone(), config.clone(), status())
        .await
        .unwrap();
    first.poll_once(&tx).await.unwrap();

    chain.push_log(task_log(0, "hello world", 10, 0));
    chain.push_log(task_log(1, "plan an attack", 10, 1));
    assert_eq!(first.poll_once(&tx).await.unwrap(), 2);

    // Shutdown arrives before the pipeline picks anything up.
    let (shutdown_tx, shutdown_rx) = watch::channel(true);
    pipeline(chain.clone(), status())
        .with_checkpoint(first.checkpoint())
        .run(rx, shutdown_rx)
        .await;
    drop(shutdown_tx);
    assert!(chain.sent().is_empty());
    drop(first);

    // Restart: both queued tasks come round again and get answered.
    let mut second = TaskWatcher::new(chain.clone(), config.clone(), status())
        .await
        .unwrap();
    assert_eq!(second.next_block(), Some(10));

    let (tx, mut rx) = mpsc::channel(8);
    assert_eq!(second.poll_once(&tx).await.unwrap(), 2);

    let mut pipeline = pipeline(chain.clone(), status()).with_checkpoint(second.checkpoint());
    while let Ok(record) = rx.try_recv() {
        pipeline.handle(record).await;
    }
    assert_eq!(chain.sent(), vec![0, 1]);

    // Once handled, the cursor moves past block 10.
    second.poll_once(&tx).await.unwrap();
    let third = TaskWatcher::new(chain.clone(), config, status())
        .await
        .unwrap();
    assert_eq!(third.next_block(), Some(11));

    tokio::fs::remove_file(&path).await.unwrap();
}
