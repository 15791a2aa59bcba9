//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use cid::Cid;
use ipfs_sniffer::datastore::Key;
use ipfs_sniffer::queue::{Queue, QueueError};
use ipfs_sniffer::sniffer::provider_key;
use ipfs_sniffer::Resource;
use libp2p_identity::PeerId;
use multihash::Multihash;
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;

pub const RAW: u64 = 0x55;
pub const DAG_CBOR: u64 = 0x71;

/// sha2-256 CIDv1 of `data` with the given codec
pub fn cid_of(codec: u64, data: &[u8]) -> Cid {
    let digest = Sha256::digest(data);
    let mh = Multihash::<64>::wrap(0x12, &digest).unwrap();
    Cid::new_v1(codec, mh)
}

/// Provider key for `data` announced by a fresh peer
pub fn key_for(codec: u64, data: &[u8]) -> (Key, Cid) {
    let cid = cid_of(codec, data);
    (provider_key(&cid, &PeerId::random()), cid)
}

/// Queue that forwards every publish to a channel
pub struct RecordingQueue {
    tx: mpsc::UnboundedSender<(Resource, u8)>,
}

impl RecordingQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(Resource, u8)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Queue for RecordingQueue {
    async fn publish(&self, resource: &Resource, priority: u8) -> Result<(), QueueError> {
        self.tx
            .send((resource.clone(), priority))
            .map_err(|_| QueueError::Rejected("recorder dropped".to_string()))
    }
}

/// Queue that rejects everything
pub struct FailingQueue;

#[async_trait]
impl Queue for FailingQueue {
    async fn publish(&self, _: &Resource, _: u8) -> Result<(), QueueError> {
        Err(QueueError::Rejected("queue unavailable".to_string()))
    }
}

/// Queue whose publish never completes
pub struct StalledQueue;

#[async_trait]
impl Queue for StalledQueue {
    async fn publish(&self, _: &Resource, _: u8) -> Result<(), QueueError> {
        std::future::pending().await
    }
}

/// Poll `condition` until it holds or `timeout` passes
pub async fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Await `future`, failing the test if it takes longer than a second
pub async fn within_second<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(1), future)
        .await
        .expect("timed out")
}
