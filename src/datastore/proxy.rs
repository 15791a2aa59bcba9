//! Write-observing datastore decorator.
//!
//! [`BatchingProxy`] wraps any [`Datastore`] and calls a callback after
//! every put, including puts that failed. The callback cannot change the
//! outcome: the proxy returns exactly what the wrapped store returned.
//!
//! Batched puts are reported when the batch commits, once per put, in the
//! order they were added, each with the commit outcome.

use std::sync::Arc;

use super::{Batch, Datastore, DatastoreError, Key};

/// Callback invoked after each write attempt with its outcome
pub type WriteCallback = Arc<dyn Fn(&Key, &[u8], &Result<(), DatastoreError>) + Send + Sync>;

/// Datastore decorator reporting every write to a callback
pub struct BatchingProxy<S> {
    inner: S,
    after_write: WriteCallback,
}

impl<S: Datastore> BatchingProxy<S> {
    /// Wrap `inner`, reporting writes to `after_write`
    pub fn new(inner: S, after_write: WriteCallback) -> Self {
        Self { inner, after_write }
    }

    /// The wrapped store
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Unwrap, dropping the callback
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: Datastore> Datastore for BatchingProxy<S> {
    fn get(&self, key: &Key) -> Result<Vec<u8>, DatastoreError> {
        self.inner.get(key)
    }

    fn has(&self, key: &Key) -> Result<bool, DatastoreError> {
        self.inner.has(key)
    }

    fn put(&self, key: &Key, value: &[u8]) -> Result<(), DatastoreError> {
        let result = self.inner.put(key, value);
        (self.after_write)(key, value, &result);
        result
    }

    fn delete(&self, key: &Key) -> Result<(), DatastoreError> {
        self.inner.delete(key)
    }

    fn query(&self, prefix: &Key) -> Result<Vec<(Key, Vec<u8>)>, DatastoreError> {
        self.inner.query(prefix)
    }

    fn batch(&self) -> Result<Box<dyn Batch + '_>, DatastoreError> {
        Ok(Box::new(ProxyBatch {
            inner: self.inner.batch()?,
            puts: Vec::new(),
            after_write: Arc::clone(&self.after_write),
        }))
    }
}

struct ProxyBatch<'a> {
    inner: Box<dyn Batch + 'a>,
    puts: Vec<(Key, Vec<u8>)>,
    after_write: WriteCallback,
}

impl Batch for ProxyBatch<'_> {
    fn put(&mut self, key: Key, value: Vec<u8>) -> Result<(), DatastoreError> {
        match self.inner.put(key.clone(), value.clone()) {
            Ok(()) => {
                self.puts.push((key, value));
                Ok(())
            }
            Err(e) => {
                // Never reaches the store, so it is reported now
                let result = Err(e);
                (self.after_write)(&key, &value, &result);
                result
            }
        }
    }

    fn delete(&mut self, key: Key) -> Result<(), DatastoreError> {
        self.inner.delete(key)
    }

    fn commit(self: Box<Self>) -> Result<(), DatastoreError> {
        let ProxyBatch {
            inner,
            puts,
            after_write,
        } = *self;

        let result = inner.commit();
        for (key, value) in &puts {
            after_write(key, value, &result);
        }
        result
    }
}
