//! Turns datastore writes into provider events.
//!
//! The DHT stores provider records under
//! `/providers/<base32 content id>/<base32 peer id>`. The event source is
//! the proxy's write callback: for every successful write to such a key it
//! decodes both segments and emits a [`ProviderEvent`] on the bus.
//!
//! Nothing here can fail the caller's write. Failed writes, unrelated keys,
//! undecodable segments and emission without listeners are all counted and
//! otherwise ignored.

use std::sync::Arc;

use cid::Cid;
use libp2p_identity::PeerId;
use multibase::Base;
use multihash::Multihash;
use thiserror::Error;
use tracing::{debug, trace};

use super::bus::{EventBus, ProviderEvent, Subscription};
use super::diagnostics::Diagnostics;
use super::filter::RAW;
use crate::datastore::{BatchingProxy, Datastore, DatastoreError, Key, WriteCallback};
use crate::domain::TraceContext;

/// Namespace the DHT keeps provider records under
pub const PROVIDERS_NAMESPACE: &str = "/providers";

/// Key segment encoding: RFC 4648 base32, upper case, unpadded
const KEY_BASE: Base = Base::Base32Upper;

/// Errors decoding a provider key
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("Provider key {0} has no segment {1}")]
    MissingSegment(Key, usize),

    #[error("Segment {segment:?} is not base32: {source}")]
    Base32 {
        segment: String,
        #[source]
        source: multibase::Error,
    },

    #[error("Not a CID or multihash: {0}")]
    InvalidCid(#[from] cid::Error),

    #[error("Content id followed by {0} trailing bytes")]
    TrailingBytes(usize),

    #[error("Invalid peer id: {0}")]
    InvalidPeerId(#[from] libp2p_identity::ParseError),
}

/// Whether `key` is a provider record key below `root`
pub fn is_provider_key(root: &Key, key: &Key) -> bool {
    root.is_ancestor_of(key) && key.namespaces().len() >= 2
}

/// Build the datastore key the DHT uses for a provider record
pub fn provider_key(cid: &Cid, peer_id: &PeerId) -> Key {
    Key::new(PROVIDERS_NAMESPACE)
        .child(KEY_BASE.encode(cid.to_bytes()))
        .child(KEY_BASE.encode(peer_id.to_bytes()))
}

/// Decode content id and peer id from a provider key
pub fn decode_provider_key(key: &Key) -> Result<(Cid, PeerId), KeyError> {
    let segments = key.namespaces();
    let segment = |i: usize| {
        segments
            .get(i)
            .copied()
            .ok_or_else(|| KeyError::MissingSegment(key.clone(), i))
    };

    let (cid_segment, peer_segment) = (segment(1)?, segment(2)?);

    let cid = decode_cid(&decode_segment(cid_segment)?)?;
    let peer_id = PeerId::from_bytes(&decode_segment(peer_segment)?)?;

    Ok((cid, peer_id))
}

fn decode_segment(segment: &str) -> Result<Vec<u8>, KeyError> {
    KEY_BASE.decode(segment).map_err(|source| KeyError::Base32 {
        segment: segment.to_string(),
        source,
    })
}

/// Read binary CID bytes, falling back to a bare multihash wrapped as raw
fn decode_cid(bytes: &[u8]) -> Result<Cid, KeyError> {
    let mut reader = bytes;
    let err = match Cid::read_bytes(&mut reader) {
        Ok(cid) if reader.is_empty() => return Ok(cid),
        Ok(_) => KeyError::TrailingBytes(reader.len()),
        Err(e) => KeyError::InvalidCid(e),
    };

    Multihash::<64>::from_bytes(bytes)
        .map(|mh| Cid::new_v1(RAW, mh))
        .map_err(|_| err)
}

/// Classifies datastore writes and emits provider events
#[derive(Debug)]
pub struct EventSource {
    bus: EventBus,
    providers_root: Key,
    diagnostics: Arc<Diagnostics>,
}

impl EventSource {
    /// Create a source emitting on `bus`
    pub fn new(bus: EventBus, diagnostics: Arc<Diagnostics>) -> Self {
        Self {
            bus,
            providers_root: Key::new(PROVIDERS_NAMESPACE),
            diagnostics,
        }
    }

    /// Open an independent subscription to emitted events
    pub fn subscribe(&self) -> Subscription {
        self.bus.subscribe()
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.bus.subscriber_count()
    }

    /// Observe one write attempt.
    ///
    /// Called synchronously from the write path; never blocks.
    pub fn after_write(&self, key: &Key, _value: &[u8], result: &Result<(), DatastoreError>) {
        if let Err(e) = result {
            trace!(%key, error = %e, "Skipping failed write");
            self.diagnostics.record_failed_write();
            return;
        }

        if !is_provider_key(&self.providers_root, key) {
            return;
        }

        let (cid, peer_id) = match decode_provider_key(key) {
            Ok(decoded) => decoded,
            Err(e) => {
                debug!(%key, error = %e, "Undecodable provider key");
                self.diagnostics.record_decode_error();
                return;
            }
        };

        let trace = TraceContext::new();
        trace.span().in_scope(|| trace!(%cid, peer = %peer_id, "Provider record written"));

        match self.bus.emit(ProviderEvent {
            cid,
            peer_id,
            trace,
        }) {
            Ok(_) => self.diagnostics.record_emitted(),
            Err(e) => {
                debug!(error = %e, "Provider event not delivered");
                self.diagnostics.record_emit_failure();
            }
        }
    }

    /// This source as a proxy callback
    pub fn write_callback(self: &Arc<Self>) -> WriteCallback {
        let source = Arc::clone(self);
        Arc::new(move |key: &Key, value: &[u8], result: &Result<(), DatastoreError>| {
            source.after_write(key, value, result)
        })
    }

    /// Wrap `store` so its writes feed this source
    pub fn batching<S: Datastore>(self: &Arc<Self>, store: S) -> BatchingProxy<S> {
        BatchingProxy::new(store, self.write_callback())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_cid(data: &[u8]) -> Cid {
        Cid::new_v1(RAW, Multihash::<64>::wrap(0x00, data).unwrap())
    }

    fn source() -> (Arc<EventSource>, Arc<Diagnostics>) {
        let diagnostics = Arc::new(Diagnostics::new());
        let source = Arc::new(EventSource::new(EventBus::new(16), Arc::clone(&diagnostics)));
        (source, diagnostics)
    }

    #[test]
    fn test_provider_key_predicate() {
        let root = Key::new(PROVIDERS_NAMESPACE);

        assert!(!is_provider_key(&root, &Key::new("/providers")));
        assert!(!is_provider_key(&root, &Key::new("/")));
        assert!(!is_provider_key(&root, &Key::new("/other/AAAA/BBBB")));
        assert!(!is_provider_key(&root, &Key::new("/providersX/AAAA/BBBB")));
        assert!(is_provider_key(&root, &Key::new("/providers/AAAA")));
        assert!(is_provider_key(&root, &Key::new("/providers/AAAA/BBBB")));
    }

    #[test]
    fn test_key_roundtrip() {
        let cid = raw_cid(b"hello");
        let peer = PeerId::random();

        let key = provider_key(&cid, &peer);
        assert!(key.as_str().starts_with("/providers/"));

        let (decoded_cid, decoded_peer) = decode_provider_key(&key).unwrap();
        assert_eq!(decoded_cid, cid);
        assert_eq!(decoded_peer, peer);
    }

    #[test]
    fn test_bare_multihash_segment_is_wrapped_as_raw() {
        let mh = Multihash::<64>::wrap(0x00, b"abc").unwrap();
        let peer = PeerId::random();
        let key = Key::new(PROVIDERS_NAMESPACE)
            .child(KEY_BASE.encode(mh.to_bytes()))
            .child(KEY_BASE.encode(peer.to_bytes()));

        let (cid, _) = decode_provider_key(&key).unwrap();
        assert_eq!(cid.codec(), RAW);
        assert_eq!(cid.hash(), &mh);
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(
            decode_provider_key(&Key::new("/providers/AAAA")),
            Err(KeyError::MissingSegment(_, 2))
        ));
        assert!(matches!(
            decode_provider_key(&Key::new("/providers/not-base32!/AAAA")),
            Err(KeyError::Base32 { .. })
        ));

        let cid = raw_cid(b"x");
        let bad_peer = Key::new(PROVIDERS_NAMESPACE)
            .child(KEY_BASE.encode(cid.to_bytes()))
            .child(KEY_BASE.encode(b"nope"));
        assert!(matches!(
            decode_provider_key(&bad_peer),
            Err(KeyError::InvalidPeerId(_))
        ));
    }

    #[tokio::test]
    async fn test_emits_exactly_one_event() {
        let (source, diagnostics) = source();
        let mut sub = source.subscribe();
        let cid = raw_cid(b"content");
        let peer = PeerId::random();

        source.after_write(&provider_key(&cid, &peer), b"", &Ok(()));

        let event = sub.recv().await.unwrap();
        assert_eq!(event.cid, cid);
        assert_eq!(event.peer_id, peer);
        assert_eq!(diagnostics.snapshot().emitted, 1);
    }

    #[test]
    fn test_ignored_writes_emit_nothing() {
        let (source, diagnostics) = source();
        let _sub = source.subscribe();
        let key = provider_key(&raw_cid(b"content"), &PeerId::random());

        source.after_write(&key, b"", &Err(DatastoreError::ReadOnly));
        source.after_write(&Key::new("/providers"), b"", &Ok(()));
        source.after_write(&Key::new("/peers/AAAA/BBBB"), b"", &Ok(()));
        source.after_write(&Key::new("/providers/AAAA"), b"", &Ok(()));

        let snapshot = diagnostics.snapshot();
        assert_eq!(snapshot.emitted, 0);
        assert_eq!(snapshot.failed_writes, 1);
        assert_eq!(snapshot.decode_errors, 1);
    }

    #[test]
    fn test_emit_without_subscriber_is_recorded() {
        let (source, diagnostics) = source();
        let key = provider_key(&raw_cid(b"content"), &PeerId::random());

        source.after_write(&key, b"", &Ok(()));

        assert_eq!(diagnostics.snapshot().emit_failures, 1);
    }
}
