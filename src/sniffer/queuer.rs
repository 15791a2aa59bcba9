//! Final stage: publishes surviving providers to the crawl queue.
//!
//! Waiting for the next provider is bounded by `max_wait`. A queuer that
//! hears nothing for that long gives up with [`SnifferError::QueuerTimeout`]
//! so a wedged upstream surfaces instead of idling forever.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, Instrument};

use super::diagnostics::Diagnostics;
use super::error::SnifferError;
use crate::domain::Provider;
use crate::queue::{Queue, SNIFFER_PRIORITY};

/// Drains filtered providers into a [`Queue`]
pub struct Queuer {
    queue: Arc<dyn Queue>,
    input: mpsc::Receiver<Provider>,
    max_wait: Duration,
    diagnostics: Arc<Diagnostics>,
}

impl Queuer {
    pub fn new(
        queue: Arc<dyn Queue>,
        input: mpsc::Receiver<Provider>,
        max_wait: Duration,
        diagnostics: Arc<Diagnostics>,
    ) -> Self {
        Self {
            queue,
            input,
            max_wait,
            diagnostics,
        }
    }

    /// Run until cancelled, timed out, or a publish fails
    #[instrument(name = "queuer", skip_all)]
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), SnifferError> {
        loop {
            let provider = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SnifferError::Cancelled),
                received = tokio::time::timeout(self.max_wait, self.input.recv()) => match received {
                    Ok(Some(provider)) => provider,
                    Ok(None) => return Err(SnifferError::ChannelClosed("filtered")),
                    Err(_) => return Err(SnifferError::QueuerTimeout(self.max_wait)),
                },
            };

            self.publish(provider, &cancel).await?;
        }
    }

    async fn publish(
        &self,
        provider: Provider,
        cancel: &CancellationToken,
    ) -> Result<(), SnifferError> {
        let span = provider.trace.stage_span("queuer");
        let resource = provider.resource;

        async {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(SnifferError::Cancelled),
                published = self.queue.publish(&resource, SNIFFER_PRIORITY) => match published {
                    Ok(()) => {
                        debug!(id = %resource.id, priority = SNIFFER_PRIORITY, "Resource queued");
                        self.diagnostics.record_published();
                        Ok(())
                    }
                    Err(e) => {
                        error!(id = %resource.id, error = %e, "Publish failed");
                        Err(SnifferError::Publish(e))
                    }
                },
            }
        }
        .instrument(span)
        .await
    }
}
