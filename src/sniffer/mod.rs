//! Discovery-to-queue pipeline.
//!
//! ```text
//! Datastore::put --> BatchingProxy --> EventSource --> EventBus
//!                                                         |
//!        Queue <-- Queuer <-- Filterer <-- Handler <------+
//! ```
//!
//! The proxy callback runs on the writer's thread and never blocks. The
//! remaining stages each run as a tokio task joined by bounded channels,
//! and all of them share one cancellation token.

pub mod bus;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod filter;
pub mod handler;
pub mod queuer;
pub mod source;

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::datastore::{BatchingProxy, Datastore};
use crate::queue::Queue;

pub use bus::{BusError, EventBus, ProviderEvent, RecvError, Subscription};
pub use config::SnifferConfig;
pub use diagnostics::{Diagnostics, DiagnosticsSnapshot};
pub use error::SnifferError;
pub use filter::{
    default_filter, CidFilter, CodecFilter, Filter, FilterChain, FilterError, Filterer,
    ProtocolFilter, ResourceFilter,
};
pub use handler::Handler;
pub use queuer::Queuer;
pub use source::{decode_provider_key, provider_key, EventSource, KeyError};

/// Owns the event source and the stage settings
pub struct Sniffer {
    config: SnifferConfig,
    source: Arc<EventSource>,
    filter: Arc<dyn Filter>,
    diagnostics: Arc<Diagnostics>,
}

impl Sniffer {
    /// Create a sniffer with the default filter chain
    pub fn new(config: SnifferConfig) -> Self {
        let diagnostics = Arc::new(Diagnostics::new());
        let bus = EventBus::new(config.bus_capacity);

        Self {
            source: Arc::new(EventSource::new(bus, Arc::clone(&diagnostics))),
            filter: Arc::new(default_filter()),
            config,
            diagnostics,
        }
    }

    /// Replace the filter chain
    pub fn with_filter(mut self, filter: impl Filter + 'static) -> Self {
        self.filter = Arc::new(filter);
        self
    }

    /// Wrap `store` so its provider writes feed this sniffer
    pub fn batching<S: Datastore>(&self, store: S) -> BatchingProxy<S> {
        self.source.batching(store)
    }

    pub fn source(&self) -> &Arc<EventSource> {
        &self.source
    }

    pub fn diagnostics(&self) -> &Arc<Diagnostics> {
        &self.diagnostics
    }

    pub fn config(&self) -> &SnifferConfig {
        &self.config
    }

    /// Start the handler, filter and queuer stages.
    ///
    /// The bus subscription is taken before this returns, so every write
    /// made afterwards is seen. Stages stop when `cancel` fires or when
    /// any one of them fails.
    pub fn spawn(&self, queue: Arc<dyn Queue>, cancel: &CancellationToken) -> RunningSniffer {
        let cancel = cancel.child_token();
        let capacity = self.config.channel_capacity.max(1);
        let (providers_tx, providers_rx) = mpsc::channel(capacity);
        let (filtered_tx, filtered_rx) = mpsc::channel(capacity);

        let handler = Handler::new(
            self.source.subscribe(),
            providers_tx,
            self.config.handler_timeout(),
            Arc::clone(&self.diagnostics),
        );
        let filterer = Filterer::new(
            Arc::clone(&self.filter),
            providers_rx,
            filtered_tx,
            Arc::clone(&self.diagnostics),
        );
        let queuer = Queuer::new(
            queue,
            filtered_rx,
            self.config.max_wait(),
            Arc::clone(&self.diagnostics),
        );

        let mut tasks = JoinSet::new();
        tasks.spawn(handler.run(cancel.clone()));
        tasks.spawn(filterer.run(cancel.clone()));
        tasks.spawn(queuer.run(cancel.clone()));

        info!(
            bus_capacity = self.config.bus_capacity,
            channel_capacity = capacity,
            "Sniffer started"
        );

        RunningSniffer { tasks, cancel }
    }

    /// Run the pipeline until it terminates
    pub async fn run(
        &self,
        queue: Arc<dyn Queue>,
        cancel: &CancellationToken,
    ) -> Result<(), SnifferError> {
        self.spawn(queue, cancel).wait().await
    }
}

/// Handle to the spawned stages
pub struct RunningSniffer {
    tasks: JoinSet<Result<(), SnifferError>>,
    cancel: CancellationToken,
}

impl RunningSniffer {
    /// Stop every stage
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for all stages and return the error that stopped the pipeline.
    ///
    /// The first stage to fail cancels the rest. Errors that are only a
    /// consequence of another stage stopping (cancellation, a closed
    /// channel) never mask the root cause.
    pub async fn wait(mut self) -> Result<(), SnifferError> {
        let mut cause: Option<SnifferError> = None;

        while let Some(joined) = self.tasks.join_next().await {
            let err = match joined {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e,
                Err(e) => SnifferError::Join(e),
            };

            self.cancel.cancel();

            let replace = match &cause {
                None => true,
                Some(current) => is_consequence(current) && !is_consequence(&err),
            };
            if replace {
                cause = Some(err);
            }
        }

        match cause {
            Some(e) if e.is_cancelled() => {
                info!("Sniffer cancelled");
                Err(e)
            }
            Some(e) => {
                error!(error = %e, "Sniffer stopped");
                Err(e)
            }
            None => Ok(()),
        }
    }
}

fn is_consequence(err: &SnifferError) -> bool {
    matches!(err, SnifferError::Cancelled | SnifferError::ChannelClosed(_))
}
