//! Command-line interface for the sniffer.
//!
//! `ingest` replays recorded datastore writes through the pipeline; the
//! other commands inspect local state.

use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config;
use crate::datastore::{Datastore, Key, MemoryDatastore};
use crate::queue::JsonlQueue;
use crate::sniffer::{DiagnosticsSnapshot, Sniffer, SnifferError};

/// How long `ingest` waits for in-flight providers after the last write
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// sniffer - DHT provider record sniffer
#[derive(Parser, Debug)]
#[command(name = "sniffer")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replay recorded datastore writes through the pipeline
    Ingest {
        /// JSONL write records (reads from stdin if not provided)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Apply writes in batches of this size instead of one by one
        #[arg(short, long)]
        batch: Option<usize>,

        /// Queue spool to publish to (defaults to the configured queue)
        #[arg(short, long, env = "SNIFFER_QUEUE")]
        queue: Option<PathBuf>,
    },

    /// Show queue spool status
    Queue,

    /// Show resolved configuration (debug)
    Config,
}

/// One recorded datastore write
#[derive(Debug, Clone, Deserialize)]
pub struct WriteRecord {
    /// Datastore key, e.g. `/providers/<cid>/<peer>`
    pub key: String,

    /// Hex-encoded value
    #[serde(default)]
    pub value: String,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Ingest {
                input,
                batch,
                queue,
            } => ingest(input, batch, queue).await,
            Commands::Queue => show_queue().await,
            Commands::Config => show_config(),
        }
    }
}

/// Parse JSONL write records, skipping blank lines
pub fn parse_records(content: &str) -> Result<Vec<(Key, Vec<u8>)>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            let record: WriteRecord = serde_json::from_str(line)
                .with_context(|| format!("Invalid write record on line {}", n + 1))?;
            let value = hex::decode(&record.value)
                .with_context(|| format!("Invalid hex value on line {}", n + 1))?;
            Ok((Key::new(record.key), value))
        })
        .collect()
}

fn read_input(input: Option<PathBuf>) -> Result<String> {
    match input {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read input file: {}", path.display())),
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read from stdin")?;
            Ok(buffer)
        }
    }
}

/// Whether every emitted event has reached a final outcome
fn drained(snapshot: &DiagnosticsSnapshot) -> bool {
    let settled = snapshot.published
        + snapshot.filtered_out
        + snapshot.filter_errors
        + snapshot.lagged_events;
    settled >= snapshot.emitted
}

async fn ingest(input: Option<PathBuf>, batch: Option<usize>, queue: Option<PathBuf>) -> Result<()> {
    let cfg = config::config()?;
    let records = parse_records(&read_input(input)?)?;
    let queue_path = queue.unwrap_or_else(|| cfg.queue_path.clone());
    let queue = Arc::new(JsonlQueue::open(queue_path.clone()).await?);

    let sniffer = Sniffer::new(cfg.pipeline.clone());
    let store = sniffer.batching(MemoryDatastore::new());
    let cancel = CancellationToken::new();
    let running = sniffer.spawn(queue, &cancel);

    info!(records = records.len(), queue = %queue_path.display(), "Replaying writes");

    let mut failed = 0usize;
    match batch {
        Some(size) if size > 0 => {
            for chunk in records.chunks(size) {
                let mut writes = store.batch()?;
                for (key, value) in chunk {
                    writes.put(key.clone(), value.clone())?;
                }
                if let Err(e) = writes.commit() {
                    warn!(error = %e, "Batch commit failed");
                    failed += chunk.len();
                }
            }
        }
        _ => {
            for (key, value) in &records {
                if let Err(e) = store.put(key, value) {
                    warn!(%key, error = %e, "Write failed");
                    failed += 1;
                }
            }
        }
    }

    let deadline = tokio::time::Instant::now() + DRAIN_TIMEOUT;
    while !drained(&sniffer.diagnostics().snapshot()) && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    debug!("Drain finished, stopping pipeline");

    running.cancel();
    match running.wait().await {
        Ok(()) | Err(SnifferError::Cancelled) => {}
        Err(e) => return Err(e).context("Sniffer pipeline failed"),
    }

    let snapshot = sniffer.diagnostics().snapshot();
    println!();
    println!("Ingest Results");
    println!("══════════════════════════════════════════════════════════════");
    println!("  Writes applied:    {}", records.len() - failed);
    println!("  Writes failed:     {}", failed);
    println!("  Events emitted:    {}", snapshot.emitted);
    println!("  Decode errors:     {}", snapshot.decode_errors);
    println!("  Filtered out:      {}", snapshot.filtered_out + snapshot.filter_errors);
    println!("  Lagged (dropped):  {}", snapshot.lagged_events);
    println!("  Published:         {}", snapshot.published);
    println!();
    println!("Queue: {}", queue_path.display());

    Ok(())
}

async fn show_queue() -> Result<()> {
    let queue = JsonlQueue::open_default().await?;
    let status = queue.status().await?;

    println!();
    println!("Crawl Queue Status");
    println!("══════════════════════════════════════════════════════════════");
    println!();
    println!("Spool: {}", queue.path().display());
    println!("Total: {}", status.total);
    println!();

    if !status.by_priority.is_empty() {
        println!("By priority:");
        for (priority, count) in status.by_priority.iter().rev() {
            println!("  {:>2}: {}", priority, count);
        }
        println!();
    }

    if !status.recent.is_empty() {
        println!("Recent:");
        for entry in &status.recent {
            println!(
                "  {} [{}] {}",
                entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                entry.priority,
                entry.resource
            );
        }
        println!();
    }

    Ok(())
}

fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!("Sniffer Configuration");
    println!("══════════════════════════════════════════════════════════════");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home:  {}", cfg.home.display());
    println!("  Queue: {}", cfg.queue_path.display());
    println!();
    println!("Pipeline:");
    println!("  Bus capacity:     {}", cfg.pipeline.bus_capacity);
    println!("  Channel capacity: {}", cfg.pipeline.channel_capacity);
    println!("  Handler timeout:  {}ms", cfg.pipeline.handler_timeout_ms);
    println!("  Max wait:         {}s", cfg.pipeline.max_wait_secs);

    Ok(())
}
