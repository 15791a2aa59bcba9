//! JSONL-backed crawl queue.
//!
//! Follows the EventStore pattern: append-only JSONL, one published
//! resource per line. Readers replay the file and order entries by
//! priority (highest first), then by arrival.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tokio::fs::{self, File};
use tokio::io::{AsyncBufReadExt, BufReader};

use super::{Queue, QueueError};
use crate::domain::Resource;

/// One published resource as stored in the spool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// When the resource was published
    pub timestamp: DateTime<Utc>,

    /// Delivery priority (higher is sooner)
    pub priority: u8,

    /// The payload crawl workers receive
    #[serde(flatten)]
    pub resource: Resource,
}

/// File-based queue spool
pub struct JsonlQueue {
    /// Path to the queue JSONL file
    path: PathBuf,
}

impl JsonlQueue {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Open a queue at `path`, creating its parent directory
    pub async fn open(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        Ok(Self::new(path))
    }

    /// Open the queue at the configured location
    pub async fn open_default() -> Result<Self> {
        Self::open(crate::config::queue_path()?).await
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry under an exclusive file lock
    fn append_entry(path: &Path, entry: &QueueEntry) -> Result<(), QueueError> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;

        file.lock_exclusive()?;
        let json = serde_json::to_string(entry)?;
        writeln!(file, "{}", json)?;
        file.flush()?;

        // Lock is released when file is dropped
        Ok(())
    }

    /// All entries in delivery order
    pub async fn replay(&self) -> Result<Vec<QueueEntry>, QueueError> {
        let mut entries = Vec::new();

        if !self.path.exists() {
            return Ok(entries);
        }

        let file = File::open(&self.path).await?;
        let mut lines = BufReader::new(file).lines();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            entries.push(serde_json::from_str::<QueueEntry>(&line)?);
        }

        // Stable: equal priorities keep arrival order
        entries.sort_by(|a, b| b.priority.cmp(&a.priority));

        Ok(entries)
    }

    /// Get queue status summary
    pub async fn status(&self) -> Result<QueueStatus, QueueError> {
        let entries = self.replay().await?;

        let mut status = QueueStatus {
            total: entries.len(),
            ..Default::default()
        };
        for entry in &entries {
            *status.by_priority.entry(entry.priority).or_default() += 1;
        }

        // Most recent first
        let mut recent = entries;
        recent.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        status.recent = recent.into_iter().take(5).collect();

        Ok(status)
    }
}

#[async_trait]
impl Queue for JsonlQueue {
    async fn publish(&self, resource: &Resource, priority: u8) -> Result<(), QueueError> {
        let entry = QueueEntry {
            timestamp: Utc::now(),
            priority,
            resource: resource.clone(),
        };

        // No await point: a dropped publish either never wrote or already
        // returned, so the spool and the caller always agree
        Self::append_entry(&self.path, &entry)
    }
}

/// Queue status summary
#[derive(Debug, Clone, Default)]
pub struct QueueStatus {
    pub total: usize,
    pub by_priority: BTreeMap<u8, usize>,
    pub recent: Vec<QueueEntry>,
}
