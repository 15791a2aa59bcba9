//! ipfs-sniffer - DHT provider record sniffer
//!
//! Watches the writes a DHT node makes to its local record store and turns
//! provider announcements into crawl work.
//!
//! # Architecture
//!
//! The pipeline is a chain of cancellable tokio tasks:
//! - A proxy around the datastore observes every write
//! - Provider record keys are decoded into (CID, peer) events on a bus
//! - Events become provider records, are filtered, and are queued
//!
//! # Modules
//!
//! - `datastore`: Key-value storage seam and the write-interception proxy
//! - `domain`: Data structures (Resource, Provider)
//! - `sniffer`: Pipeline stages and wiring
//! - `queue`: Crawl queue seam and the JSONL spool
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Replay recorded writes
//! sniffer ingest --input writes.jsonl
//!
//! # Check the queue
//! sniffer queue
//! ```

pub mod cli;
pub mod config;
pub mod datastore;
pub mod domain;
pub mod queue;
pub mod sniffer;

// Re-export main types at crate root for convenience
pub use datastore::{BatchingProxy, Datastore, Key, MemoryDatastore};
pub use domain::{Protocol, Provider, Resource, TraceContext};
pub use queue::{JsonlQueue, Queue, QueueError, SNIFFER_PRIORITY};
pub use sniffer::{Sniffer, SnifferConfig, SnifferError};
