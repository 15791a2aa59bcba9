//! Crawl work queue seam.
//!
//! The sniffer publishes each surviving resource to a [`Queue`] with a
//! priority; crawl workers on the other side receive the payload
//! `{"protocol": "ipfs", "identifier": "<cid>"}`.
//!
//! [`JsonlQueue`] is a file-backed spool in the same append-only JSONL
//! style as the rest of the project's logs.

pub mod jsonl;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::Resource;

pub use jsonl::{JsonlQueue, QueueEntry, QueueStatus};

/// Payload handed to crawl workers: `{"protocol", "identifier"}`
pub type QueueMessage = Resource;

/// Highest priority; used for everything the sniffer finds
pub const SNIFFER_PRIORITY: u8 = 9;

/// Errors publishing to a queue
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Publish rejected: {0}")]
    Rejected(String),
}

/// An ordered, priority-aware work queue.
///
/// `publish` must be cancel-safe: once its future is dropped without
/// resolving, the message must not appear in the queue later.
#[async_trait]
pub trait Queue: Send + Sync {
    /// Publish `resource`; higher `priority` is delivered sooner
    async fn publish(&self, resource: &QueueMessage, priority: u8) -> Result<(), QueueError>;
}
