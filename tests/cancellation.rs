//! Cancellation and deadline tests.
//!
//! Every stage must unwind promptly from a single root token, and the
//! handler and queuer deadlines must terminate the pipeline.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{key_for, wait_for, within_second, RecordingQueue, StalledQueue, RAW};
use ipfs_sniffer::datastore::{Datastore, MemoryDatastore};
use ipfs_sniffer::queue::JsonlQueue;
use ipfs_sniffer::sniffer::{Sniffer, SnifferConfig, SnifferError};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_cancel_idle_pipeline() {
    let sniffer = Sniffer::new(SnifferConfig::default());
    let (queue, mut published) = RecordingQueue::new();
    let cancel = CancellationToken::new();
    let running = sniffer.spawn(Arc::new(queue), &cancel);

    cancel.cancel();

    let result = within_second(running.wait()).await;
    assert!(matches!(result, Err(SnifferError::Cancelled)));
    assert!(published.try_recv().is_err());
}

#[tokio::test]
async fn test_cancel_while_publish_is_blocked() {
    let sniffer = Sniffer::new(SnifferConfig::default());
    let store = sniffer.batching(MemoryDatastore::new());
    let cancel = CancellationToken::new();
    let running = sniffer.spawn(Arc::new(StalledQueue), &cancel);

    let (key, _) = key_for(RAW, b"stuck");
    store.put(&key, b"").unwrap();

    let diagnostics = Arc::clone(sniffer.diagnostics());
    assert!(wait_for(Duration::from_secs(1), || diagnostics.snapshot().handled == 1).await);

    cancel.cancel();

    let result = within_second(running.wait()).await;
    assert!(result.unwrap_err().is_cancelled());
    assert_eq!(sniffer.diagnostics().snapshot().published, 0);
}

#[tokio::test]
async fn test_root_token_is_not_cancelled_by_stage_failure() {
    let config = SnifferConfig {
        max_wait_secs: 0,
        ..Default::default()
    };
    let sniffer = Sniffer::new(config);
    let (queue, _published) = RecordingQueue::new();
    let root = CancellationToken::new();

    let result = within_second(sniffer.run(Arc::new(queue), &root)).await;

    assert!(matches!(result, Err(SnifferError::QueuerTimeout(_))));
    assert!(!root.is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn test_queuer_gives_up_after_max_wait() {
    let config = SnifferConfig {
        max_wait_secs: 60,
        ..Default::default()
    };
    let sniffer = Sniffer::new(config);
    let (queue, _published) = RecordingQueue::new();
    let started = tokio::time::Instant::now();

    let result = sniffer.run(Arc::new(queue), &CancellationToken::new()).await;

    assert!(matches!(result, Err(SnifferError::QueuerTimeout(d)) if d == Duration::from_secs(60)));
    assert!(started.elapsed() >= Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn test_stalled_queue_trips_handler_timeout() {
    let config = SnifferConfig {
        channel_capacity: 1,
        handler_timeout_ms: 100,
        ..Default::default()
    };
    let sniffer = Sniffer::new(config);
    let store = sniffer.batching(MemoryDatastore::new());
    let running = sniffer.spawn(Arc::new(StalledQueue), &CancellationToken::new());

    // One in publish, one per channel, one held by the filter: the next
    // forward cannot complete
    for n in 0..8u8 {
        let (key, _) = key_for(RAW, &[n]);
        store.put(&key, b"").unwrap();
    }

    let result = running.wait().await;
    assert!(matches!(result, Err(SnifferError::HandlerTimeout { .. })));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_mid_spool_keeps_counter_and_spool_in_step() {
    let temp = TempDir::new().unwrap();
    let queue = Arc::new(
        JsonlQueue::open(temp.path().join("queue.jsonl"))
            .await
            .unwrap(),
    );
    let sniffer = Sniffer::new(SnifferConfig::default());
    let store = sniffer.batching(MemoryDatastore::new());
    let cancel = CancellationToken::new();
    let running = sniffer.spawn(queue.clone(), &cancel);

    for n in 0..200u32 {
        let (key, _) = key_for(RAW, &n.to_be_bytes());
        store.put(&key, b"").unwrap();
    }

    let diagnostics = Arc::clone(sniffer.diagnostics());
    assert!(wait_for(Duration::from_secs(1), || diagnostics.snapshot().published > 0).await);
    cancel.cancel();
    assert!(within_second(running.wait()).await.unwrap_err().is_cancelled());

    let spooled = queue.replay().await.unwrap().len() as u64;
    assert_eq!(spooled, sniffer.diagnostics().snapshot().published);
}

#[tokio::test]
async fn test_cancel_while_handler_and_filter_are_blocked() {
    let config = SnifferConfig {
        channel_capacity: 1,
        handler_timeout_ms: 60_000,
        ..Default::default()
    };
    let sniffer = Sniffer::new(config);
    let store = sniffer.batching(MemoryDatastore::new());
    let cancel = CancellationToken::new();
    let running = sniffer.spawn(Arc::new(StalledQueue), &cancel);

    for n in 0..8u8 {
        let (key, _) = key_for(RAW, &[n]);
        store.put(&key, b"").unwrap();
    }

    // Queuer holds one in publish, each channel holds one, the filter holds
    // one on its output send; the handler then waits on a full channel
    let diagnostics = Arc::clone(sniffer.diagnostics());
    assert!(wait_for(Duration::from_secs(1), || diagnostics.snapshot().handled == 4).await);

    cancel.cancel();

    let result = within_second(running.wait()).await;
    assert!(matches!(result, Err(SnifferError::Cancelled)));
    assert_eq!(sniffer.diagnostics().snapshot().published, 0);
}
