//! Lifts bus events into provider records.
//!
//! One handler drains one bus subscription into one bounded channel. Each
//! forward is bounded by a per-item timeout: a downstream that stops
//! draining is reported as [`SnifferError::HandlerTimeout`] instead of
//! silently backing up the bus.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn, Instrument};

use super::bus::{ProviderEvent, RecvError, Subscription};
use super::diagnostics::Diagnostics;
use super::error::SnifferError;
use crate::domain::{Protocol, Provider, Resource};

/// Bridges a bus subscription into a provider channel
pub struct Handler {
    subscription: Subscription,
    providers: mpsc::Sender<Provider>,
    timeout: Duration,
    diagnostics: Arc<Diagnostics>,
}

impl Handler {
    pub fn new(
        subscription: Subscription,
        providers: mpsc::Sender<Provider>,
        timeout: Duration,
        diagnostics: Arc<Diagnostics>,
    ) -> Self {
        Self {
            subscription,
            providers,
            timeout,
            diagnostics,
        }
    }

    /// Run until cancelled or a forward fails
    #[instrument(name = "handler", skip_all)]
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), SnifferError> {
        debug!("Handler started");

        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SnifferError::Cancelled),
                received = self.subscription.recv() => match received {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Handler lagged behind the bus, events dropped");
                        self.diagnostics.record_lagged(skipped);
                        continue;
                    }
                    Err(RecvError::Closed) => return Err(SnifferError::BusClosed),
                },
            };

            self.dispatch(event, &cancel).await?;
        }
    }

    async fn dispatch(
        &self,
        event: ProviderEvent,
        cancel: &CancellationToken,
    ) -> Result<(), SnifferError> {
        let provider = to_provider(event);
        let id = provider.resource.id.clone();
        let span = provider.trace.stage_span("handler");

        async {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(SnifferError::Cancelled),
                sent = tokio::time::timeout(self.timeout, self.providers.send(provider)) => match sent {
                    Ok(Ok(())) => {
                        debug!(%id, "Provider forwarded");
                        self.diagnostics.record_handled();
                        Ok(())
                    }
                    Ok(Err(_)) => Err(SnifferError::ChannelClosed("providers")),
                    Err(_) => Err(SnifferError::HandlerTimeout {
                        timeout: self.timeout,
                        id,
                    }),
                },
            }
        }
        .instrument(span)
        .await
    }
}

/// Build the provider record for an event, observed now
pub fn to_provider(event: ProviderEvent) -> Provider {
    Provider::new(
        Resource::new(Protocol::Ipfs, event.cid.to_string()),
        event.peer_id.to_string(),
        event.trace,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TraceContext;
    use crate::sniffer::bus::EventBus;
    use cid::Cid;
    use libp2p_identity::PeerId;
    use multihash::Multihash;

    fn event() -> ProviderEvent {
        let mh = Multihash::<64>::wrap(0x00, b"handler").unwrap();
        ProviderEvent {
            cid: Cid::new_v1(0x55, mh),
            peer_id: PeerId::random(),
            trace: TraceContext::new(),
        }
    }

    #[test]
    fn test_to_provider() {
        let event = event();
        let cid = event.cid.to_string();
        let peer = event.peer_id.to_string();
        let trace_id = event.trace.trace_id;

        let provider = to_provider(event);

        assert_eq!(provider.resource, Resource::new(Protocol::Ipfs, cid));
        assert_eq!(provider.provider, peer);
        assert_eq!(provider.trace.trace_id, trace_id);
    }

    #[tokio::test]
    async fn test_forwards_events() {
        let bus = EventBus::new(8);
        let (tx, mut rx) = mpsc::channel(8);
        let diagnostics = Arc::new(Diagnostics::new());
        let handler = Handler::new(bus.subscribe(), tx, Duration::from_secs(1), diagnostics.clone());
        let cancel = CancellationToken::new();
        let task = tokio::spawn(handler.run(cancel.clone()));

        let sent = event();
        let cid = sent.cid.to_string();
        bus.emit(sent).unwrap();

        let provider = rx.recv().await.unwrap();
        assert_eq!(provider.resource.id, cid);

        cancel.cancel();
        assert!(task.await.unwrap().unwrap_err().is_cancelled());
        assert_eq!(diagnostics.snapshot().handled, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_downstream_times_out() {
        let bus = EventBus::new(8);
        let (tx, _rx) = mpsc::channel(1);
        let handler = Handler::new(
            bus.subscribe(),
            tx,
            Duration::from_millis(50),
            Arc::new(Diagnostics::new()),
        );
        let task = tokio::spawn(handler.run(CancellationToken::new()));

        // First fills the channel, second cannot be forwarded
        bus.emit(event()).unwrap();
        bus.emit(event()).unwrap();

        let result = task.await.unwrap();
        assert!(matches!(result, Err(SnifferError::HandlerTimeout { .. })));
    }

    #[tokio::test]
    async fn test_bus_closed_is_fatal() {
        let bus = EventBus::new(8);
        let (tx, _rx) = mpsc::channel(1);
        let handler = Handler::new(
            bus.subscribe(),
            tx,
            Duration::from_secs(1),
            Arc::new(Diagnostics::new()),
        );
        drop(bus);

        let result = handler.run(CancellationToken::new()).await;
        assert!(matches!(result, Err(SnifferError::BusClosed)));
    }

    #[tokio::test]
    async fn test_cancel_while_waiting_for_events() {
        let bus = EventBus::new(8);
        let (tx, _rx) = mpsc::channel(1);
        let handler = Handler::new(
            bus.subscribe(),
            tx,
            Duration::from_secs(1),
            Arc::new(Diagnostics::new()),
        );
        let cancel = CancellationToken::new();
        let task = tokio::spawn(handler.run(cancel.clone()));

        cancel.cancel();
        let result = tokio::time::timeout(Duration::from_secs(1), task).await.unwrap();
        assert!(result.unwrap().unwrap_err().is_cancelled());
    }
}
