//! Content-addressed resources.
//!
//! A resource is the pair (protocol, identifier) that crawl workers
//! receive in their queue payload.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Network protocol a resource is addressed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Unrecognized or unset protocol
    Invalid,

    /// IPFS content identifiers
    Ipfs,
}

impl Default for Protocol {
    fn default() -> Self {
        Self::Invalid
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Invalid => write!(f, "invalid"),
            Protocol::Ipfs => write!(f, "ipfs"),
        }
    }
}

/// A resource on the network, identified by protocol and id
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resource {
    /// Protocol the identifier belongs to
    pub protocol: Protocol,

    /// Protocol-specific identifier (a CID string for IPFS)
    #[serde(rename = "identifier")]
    pub id: String,
}

impl Resource {
    /// Create a new resource
    pub fn new(protocol: Protocol, id: impl Into<String>) -> Self {
        Self {
            protocol,
            id: id.into(),
        }
    }

    /// A resource is valid when its protocol is known and its id is non-empty
    pub fn is_valid(&self) -> bool {
        self.protocol != Protocol::Invalid && !self.id.is_empty()
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.protocol, self.id)
    }
}
