//! Key-value storage seam.
//!
//! The sniffer never owns its storage: the DHT's record store is handed in
//! as a [`Datastore`] and wrapped by [`BatchingProxy`] so every write can be
//! observed. [`MemoryDatastore`] is an ordered in-memory implementation used
//! by the CLI and by tests.

pub mod key;
pub mod proxy;

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use thiserror::Error;

pub use key::Key;
pub use proxy::{BatchingProxy, WriteCallback};

/// Errors returned by datastores
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DatastoreError {
    #[error("Key not found: {0}")]
    NotFound(Key),

    #[error("Datastore is read-only")]
    ReadOnly,

    #[error("Datastore backend error: {0}")]
    Backend(String),
}

/// A batching key-value store with ordered keys
pub trait Datastore: Send + Sync {
    /// Fetch the value stored under `key`
    fn get(&self, key: &Key) -> Result<Vec<u8>, DatastoreError>;

    /// Whether `key` has a value
    fn has(&self, key: &Key) -> Result<bool, DatastoreError>;

    /// Store `value` under `key`
    fn put(&self, key: &Key, value: &[u8]) -> Result<(), DatastoreError>;

    /// Remove `key`; removing a missing key is not an error
    fn delete(&self, key: &Key) -> Result<(), DatastoreError>;

    /// All entries strictly below `prefix`, in key order
    fn query(&self, prefix: &Key) -> Result<Vec<(Key, Vec<u8>)>, DatastoreError>;

    /// Start a batch of writes applied atomically on commit
    fn batch(&self) -> Result<Box<dyn Batch + '_>, DatastoreError>;
}

/// A group of writes applied together
pub trait Batch: Send {
    /// Buffer a put
    fn put(&mut self, key: Key, value: Vec<u8>) -> Result<(), DatastoreError>;

    /// Buffer a delete
    fn delete(&mut self, key: Key) -> Result<(), DatastoreError>;

    /// Apply every buffered operation
    fn commit(self: Box<Self>) -> Result<(), DatastoreError>;
}

impl<T: Datastore + ?Sized> Datastore for Arc<T> {
    fn get(&self, key: &Key) -> Result<Vec<u8>, DatastoreError> {
        (**self).get(key)
    }

    fn has(&self, key: &Key) -> Result<bool, DatastoreError> {
        (**self).has(key)
    }

    fn put(&self, key: &Key, value: &[u8]) -> Result<(), DatastoreError> {
        (**self).put(key, value)
    }

    fn delete(&self, key: &Key) -> Result<(), DatastoreError> {
        (**self).delete(key)
    }

    fn query(&self, prefix: &Key) -> Result<Vec<(Key, Vec<u8>)>, DatastoreError> {
        (**self).query(prefix)
    }

    fn batch(&self) -> Result<Box<dyn Batch + '_>, DatastoreError> {
        (**self).batch()
    }
}

/// In-memory datastore backed by a `BTreeMap`
#[derive(Debug, Default)]
pub struct MemoryDatastore {
    entries: RwLock<BTreeMap<Key, Vec<u8>>>,
}

impl MemoryDatastore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> DatastoreError {
    DatastoreError::Backend("lock poisoned".to_string())
}

impl Datastore for MemoryDatastore {
    fn get(&self, key: &Key) -> Result<Vec<u8>, DatastoreError> {
        self.entries
            .read()
            .map_err(poisoned)?
            .get(key)
            .cloned()
            .ok_or_else(|| DatastoreError::NotFound(key.clone()))
    }

    fn has(&self, key: &Key) -> Result<bool, DatastoreError> {
        Ok(self.entries.read().map_err(poisoned)?.contains_key(key))
    }

    fn put(&self, key: &Key, value: &[u8]) -> Result<(), DatastoreError> {
        self.entries
            .write()
            .map_err(poisoned)?
            .insert(key.clone(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &Key) -> Result<(), DatastoreError> {
        self.entries.write().map_err(poisoned)?.remove(key);
        Ok(())
    }

    fn query(&self, prefix: &Key) -> Result<Vec<(Key, Vec<u8>)>, DatastoreError> {
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(entries
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.as_str().starts_with(prefix.as_str()))
            .filter(|(k, _)| prefix.is_ancestor_of(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn batch(&self) -> Result<Box<dyn Batch + '_>, DatastoreError> {
        Ok(Box::new(MemoryBatch {
            store: self,
            ops: Vec::new(),
        }))
    }
}

enum BatchOp {
    Put(Key, Vec<u8>),
    Delete(Key),
}

struct MemoryBatch<'a> {
    store: &'a MemoryDatastore,
    ops: Vec<BatchOp>,
}

impl Batch for MemoryBatch<'_> {
    fn put(&mut self, key: Key, value: Vec<u8>) -> Result<(), DatastoreError> {
        self.ops.push(BatchOp::Put(key, value));
        Ok(())
    }

    fn delete(&mut self, key: Key) -> Result<(), DatastoreError> {
        self.ops.push(BatchOp::Delete(key));
        Ok(())
    }

    fn commit(self: Box<Self>) -> Result<(), DatastoreError> {
        let mut entries = self.store.entries.write().map_err(poisoned)?;
        for op in self.ops {
            match op {
                BatchOp::Put(key, value) => {
                    entries.insert(key, value);
                }
                BatchOp::Delete(key) => {
                    entries.remove(&key);
                }
            }
        }
        Ok(())
    }
}
