//! Discovery records.
//!
//! A provider record says that a peer announced a resource at a given time.
//! Records carry a [`TraceContext`] so log lines from every pipeline stage
//! touching the same write can be correlated.

use chrono::{DateTime, Utc};
use tracing::Span;
use uuid::Uuid;

use super::resource::Resource;

/// Correlation token carried from the datastore write to the queue
#[derive(Debug, Clone)]
pub struct TraceContext {
    /// Identifier shared by every span derived from this context
    pub trace_id: Uuid,

    /// Span opened when the write was observed
    span: Span,
}

impl TraceContext {
    /// Open a new root context for an observed write
    pub fn new() -> Self {
        let trace_id = Uuid::new_v4();
        let span = tracing::debug_span!("sniffer.write", %trace_id);
        Self { trace_id, span }
    }

    /// Open a child span for a pipeline stage
    pub fn stage_span(&self, stage: &'static str) -> Span {
        tracing::debug_span!(parent: &self.span, "sniffer.stage", stage, trace_id = %self.trace_id)
    }

    /// The span opened when the write was observed
    pub fn span(&self) -> &Span {
        &self.span
    }
}

impl Default for TraceContext {
    fn default() -> Self {
        Self::new()
    }
}

/// A peer providing a resource, as discovered by the sniffer
#[derive(Debug, Clone)]
pub struct Provider {
    /// The announced resource
    pub resource: Resource,

    /// When the announcement was observed
    pub date: DateTime<Utc>,

    /// Peer id of the announcing node
    pub provider: String,

    /// Trace correlation for this record
    pub trace: TraceContext,
}

impl Provider {
    /// Create a provider record observed now
    pub fn new(resource: Resource, provider: impl Into<String>, trace: TraceContext) -> Self {
        Self {
            resource,
            date: Utc::now(),
            provider: provider.into(),
            trace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Protocol;

    #[test]
    fn test_trace_ids_are_unique() {
        let a = TraceContext::new();
        let b = TraceContext::new();
        assert_ne!(a.trace_id, b.trace_id);
    }

    #[test]
    fn test_provider_clone_keeps_trace() {
        let provider = Provider::new(
            Resource::new(Protocol::Ipfs, "bafkqaaa"),
            "12D3KooW",
            TraceContext::new(),
        );
        let copy = provider.clone();

        assert_eq!(copy.trace.trace_id, provider.trace.trace_id);
        assert_eq!(copy.resource, provider.resource);
        assert_eq!(copy.date, provider.date);
    }
}
