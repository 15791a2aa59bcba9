//! Counters for routine, non-fatal pipeline outcomes.
//!
//! Malformed keys, rejected codecs and similar are expected in normal
//! operation. They never stop a stage; they are counted here so operators
//! can still see them.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Shared pipeline counters
#[derive(Debug, Default)]
pub struct Diagnostics {
    failed_writes: AtomicU64,
    decode_errors: AtomicU64,
    emitted: AtomicU64,
    emit_failures: AtomicU64,
    lagged_events: AtomicU64,
    handled: AtomicU64,
    filtered_out: AtomicU64,
    filter_errors: AtomicU64,
    published: AtomicU64,
}

/// Point-in-time copy of [`Diagnostics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiagnosticsSnapshot {
    /// Upstream writes that failed and were skipped
    pub failed_writes: u64,

    /// Provider keys whose segments could not be decoded
    pub decode_errors: u64,

    /// Events put on the bus
    pub emitted: u64,

    /// Events that no subscriber was listening for
    pub emit_failures: u64,

    /// Events a slow subscriber lost to buffer overrun
    pub lagged_events: u64,

    /// Events turned into provider records
    pub handled: u64,

    /// Records dropped by a filter without a diagnostic
    pub filtered_out: u64,

    /// Records dropped by a filter with a diagnostic
    pub filter_errors: u64,

    /// Records published to the queue
    pub published: u64,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_failed_write(&self) {
        self.failed_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_emitted(&self) {
        self.emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_emit_failure(&self) {
        self.emit_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lagged(&self, skipped: u64) {
        self.lagged_events.fetch_add(skipped, Ordering::Relaxed);
    }

    pub fn record_handled(&self) {
        self.handled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_filtered_out(&self) {
        self.filtered_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_filter_error(&self) {
        self.filter_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the current counter values
    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            failed_writes: self.failed_writes.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            emitted: self.emitted.load(Ordering::Relaxed),
            emit_failures: self.emit_failures.load(Ordering::Relaxed),
            lagged_events: self.lagged_events.load(Ordering::Relaxed),
            handled: self.handled.load(Ordering::Relaxed),
            filtered_out: self.filtered_out.load(Ordering::Relaxed),
            filter_errors: self.filter_errors.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
        }
    }
}
