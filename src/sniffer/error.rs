//! Terminal pipeline errors.

use std::time::Duration;

use thiserror::Error;

use crate::queue::QueueError;

/// Errors that terminate a pipeline stage
#[derive(Debug, Error)]
pub enum SnifferError {
    #[error("Pipeline cancelled")]
    Cancelled,

    #[error("Timed out after {timeout:?} forwarding provider {id}")]
    HandlerTimeout { timeout: Duration, id: String },

    #[error("No provider to queue within {0:?}")]
    QueuerTimeout(Duration),

    #[error("Event bus closed: event source terminated")]
    BusClosed,

    #[error("Channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("Publish failed: {0}")]
    Publish(#[from] QueueError),

    #[error("Stage task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl SnifferError {
    /// Whether this error is the result of cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
