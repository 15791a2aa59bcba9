//! Provider filters and the filter stage.
//!
//! A [`Filter`] decides whether a provider record is worth queuing:
//! - `Ok(true)`: keep it
//! - `Ok(false)`: drop it quietly
//! - `Err(e)`: drop it; `e` says why
//!
//! Rejections are routine. Unsupported codecs and protocols show up
//! constantly on a public DHT, so filter errors are logged and counted by
//! the stage, never propagated.

use std::sync::Arc;

use cid::Cid;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::diagnostics::Diagnostics;
use super::error::SnifferError;
use crate::domain::{Protocol, Provider, Resource};

/// Multicodec for raw binary blocks
pub const RAW: u64 = 0x55;

/// Multicodec for dag-pb (UnixFS) blocks
pub const DAG_PROTOBUF: u64 = 0x70;

/// Why a provider was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("Invalid CID {id:?}: {reason}")]
    InvalidCid { id: String, reason: String },

    #[error("Unsupported codec 0x{codec:x} for {id}")]
    UnsupportedCodec { id: String, codec: u64 },

    #[error("Unsupported protocol {0}")]
    UnsupportedProtocol(Protocol),

    #[error("Invalid resource {0}")]
    InvalidResource(Resource),
}

/// A predicate over provider records
pub trait Filter: Send + Sync {
    /// Decide whether to keep `provider`
    fn filter(&self, provider: &Provider) -> Result<bool, FilterError>;
}

fn parse_cid(id: &str) -> Result<Cid, FilterError> {
    Cid::try_from(id).map_err(|e| FilterError::InvalidCid {
        id: id.to_string(),
        reason: e.to_string(),
    })
}

/// Accepts providers whose identifier parses as a CID
#[derive(Debug, Clone, Copy, Default)]
pub struct CidFilter;

impl Filter for CidFilter {
    fn filter(&self, provider: &Provider) -> Result<bool, FilterError> {
        parse_cid(&provider.resource.id).map(|_| true)
    }
}

/// Accepts only raw and dag-pb CIDs
#[derive(Debug, Clone, Copy, Default)]
pub struct CodecFilter;

impl Filter for CodecFilter {
    fn filter(&self, provider: &Provider) -> Result<bool, FilterError> {
        let cid = parse_cid(&provider.resource.id)?;

        match cid.codec() {
            RAW | DAG_PROTOBUF => Ok(true),
            codec => Err(FilterError::UnsupportedCodec {
                id: provider.resource.id.clone(),
                codec,
            }),
        }
    }
}

/// Accepts only resources with a known protocol and a non-empty id
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceFilter;

impl Filter for ResourceFilter {
    fn filter(&self, provider: &Provider) -> Result<bool, FilterError> {
        if provider.resource.is_valid() {
            Ok(true)
        } else {
            Err(FilterError::InvalidResource(provider.resource.clone()))
        }
    }
}

/// Accepts only IPFS resources
#[derive(Debug, Clone, Copy, Default)]
pub struct ProtocolFilter;

impl Filter for ProtocolFilter {
    fn filter(&self, provider: &Provider) -> Result<bool, FilterError> {
        match provider.resource.protocol {
            Protocol::Ipfs => Ok(true),
            other => Err(FilterError::UnsupportedProtocol(other)),
        }
    }
}

/// Ordered filters; the first rejection wins
#[derive(Default)]
pub struct FilterChain {
    filters: Vec<Box<dyn Filter>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a filter to the chain
    pub fn with(mut self, filter: impl Filter + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl Filter for FilterChain {
    fn filter(&self, provider: &Provider) -> Result<bool, FilterError> {
        for filter in &self.filters {
            if !filter.filter(provider)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// The chain used by the sniffer: protocol, resource, CID, codec
pub fn default_filter() -> FilterChain {
    FilterChain::new()
        .with(ProtocolFilter)
        .with(ResourceFilter)
        .with(CidFilter)
        .with(CodecFilter)
}

/// Pipeline stage applying a filter between two channels
pub struct Filterer {
    filter: Arc<dyn Filter>,
    input: mpsc::Receiver<Provider>,
    output: mpsc::Sender<Provider>,
    diagnostics: Arc<Diagnostics>,
}

impl Filterer {
    pub fn new(
        filter: Arc<dyn Filter>,
        input: mpsc::Receiver<Provider>,
        output: mpsc::Sender<Provider>,
        diagnostics: Arc<Diagnostics>,
    ) -> Self {
        Self {
            filter,
            input,
            output,
            diagnostics,
        }
    }

    /// Run until cancelled or a channel closes
    #[instrument(name = "filter", skip_all)]
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), SnifferError> {
        loop {
            let provider = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SnifferError::Cancelled),
                received = self.input.recv() => match received {
                    Some(provider) => provider,
                    None => return Err(SnifferError::ChannelClosed("providers")),
                },
            };

            let span = provider.trace.stage_span("filter");
            let keep = span.in_scope(|| match self.filter.filter(&provider) {
                Ok(true) => true,
                Ok(false) => {
                    debug!(id = %provider.resource.id, "Provider filtered out");
                    self.diagnostics.record_filtered_out();
                    false
                }
                Err(e) => {
                    debug!(id = %provider.resource.id, error = %e, "Provider rejected");
                    self.diagnostics.record_filter_error();
                    false
                }
            });

            if !keep {
                continue;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SnifferError::Cancelled),
                sent = self.output.send(provider) => {
                    if sent.is_err() {
                        return Err(SnifferError::ChannelClosed("filtered"));
                    }
                }
            }
        }
    }
}
