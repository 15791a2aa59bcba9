//! Domain types for the sniffer.
//!
//! This module contains the core data structures:
//! - Resource: Protocol plus content identifier
//! - Provider: A discovery record with its trace context

pub mod provider;
pub mod resource;

// Re-export commonly used types
pub use provider::{Provider, TraceContext};
pub use resource::{Protocol, Resource};
