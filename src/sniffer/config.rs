//! Pipeline tuning knobs.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::bus::DEFAULT_BUS_CAPACITY;

/// Sizes and deadlines for the sniffer pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnifferConfig {
    /// Events buffered per bus subscriber before the oldest are dropped
    #[serde(default = "default_bus_capacity")]
    pub bus_capacity: usize,

    /// Capacity of each channel between stages
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Deadline for the handler to forward one provider
    #[serde(default = "default_handler_timeout_ms")]
    pub handler_timeout_ms: u64,

    /// Longest the queuer waits for the next provider
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,
}

fn default_bus_capacity() -> usize {
    DEFAULT_BUS_CAPACITY
}

fn default_channel_capacity() -> usize {
    512
}

fn default_handler_timeout_ms() -> u64 {
    1000
}

fn default_max_wait_secs() -> u64 {
    300
}

impl Default for SnifferConfig {
    fn default() -> Self {
        Self {
            bus_capacity: default_bus_capacity(),
            channel_capacity: default_channel_capacity(),
            handler_timeout_ms: default_handler_timeout_ms(),
            max_wait_secs: default_max_wait_secs(),
        }
    }
}

impl SnifferConfig {
    pub fn handler_timeout(&self) -> Duration {
        Duration::from_millis(self.handler_timeout_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }
}
