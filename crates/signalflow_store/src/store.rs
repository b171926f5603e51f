// SPDX-License-Identifier: MIT OR Apache-2.0
//! Store handle: backend plus write-behind worker.

use crate::backend::{Backend, DirBackend, MemoryBackend};
use crate::collection::Collection;
use crate::config::StoreConfig;
use crate::error::Result;
use crate::writer::{StoreNotice, Writer};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

/// Entry point to persistence.
///
/// Owns the background writer; dropping the store waits for queued
/// operations to finish.
pub struct Store {
    backend: Arc<dyn Backend>,
    writer: Writer,
    pretty: bool,
}

impl Store {
    /// Open a store from configuration
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let backend: Arc<dyn Backend> = match &config.root {
            Some(root) => {
                tracing::info!("Opening store at {:?}", root);
                Arc::new(DirBackend::new(root))
            }
            None => {
                tracing::info!("Opening in-memory store");
                Arc::new(MemoryBackend::new())
            }
        };
        Self::with_backend(backend, config.pretty)
    }

    /// In-memory store
    pub fn memory() -> Result<Self> {
        Self::with_backend(Arc::new(MemoryBackend::new()), false)
    }

    /// Store over a custom backend
    pub fn with_backend(backend: Arc<dyn Backend>, pretty: bool) -> Result<Self> {
        let writer = Writer::spawn(Arc::clone(&backend))?;
        Ok(Self {
            backend,
            writer,
            pretty,
        })
    }

    /// Open a typed collection. The cache starts empty; call
    /// [`Collection::sync`] to load it.
    pub fn collection<T>(&self, name: &str) -> Collection<T>
    where
        T: Serialize + DeserializeOwned,
    {
        Collection::new(name, Arc::clone(&self.backend), self.writer.handle(), self.pretty)
    }

    /// Block until every queued write has reached the backend
    pub fn flush(&self) -> Result<()> {
        self.writer.handle().flush()
    }

    /// Take background failures recorded since the last call
    pub fn drain_notices(&self) -> Vec<StoreNotice> {
        self.writer.drain_notices()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Record {
        value: f64,
    }

    #[test]
    fn test_put_then_sync() {
        let backend = Arc::new(MemoryBackend::new());
        let store = Store::with_backend(backend.clone(), false).unwrap();

        let mut records = store.collection::<Record>("records");
        records.put("a", Record { value: 1.0 });
        records.put("b", Record { value: 2.0 });
        assert_eq!(records.get("a"), Some(&Record { value: 1.0 }));

        store.flush().unwrap();
        assert_eq!(backend.len(), 2);

        let mut reopened = store.collection::<Record>("records");
        assert!(reopened.is_empty());
        let report = reopened.sync().unwrap();
        assert_eq!(report.loaded, 2);
        assert_eq!(reopened.get("b"), Some(&Record { value: 2.0 }));
    }

    #[test]
    fn test_delete() {
        let store = Store::memory().unwrap();
        let mut records = store.collection::<Record>("records");
        records.put("a", Record { value: 1.0 });
        assert!(records.delete("a").is_some());
        assert!(records.delete("a").is_none());
        store.flush().unwrap();

        let mut reopened = store.collection::<Record>("records");
        reopened.sync().unwrap();
        assert!(!reopened.contains("a"));
    }

    #[test]
    fn test_sync_skips_bad_records() {
        let backend = Arc::new(MemoryBackend::new());
        backend.write("records", "good", "{\"value\":3.0}").unwrap();
        backend.write("records", "bad", "not json").unwrap();
        let store = Store::with_backend(backend, false).unwrap();

        let mut records = store.collection::<Record>("records");
        let report = records.sync().unwrap();
        assert_eq!(report.loaded, 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(records.keys().collect::<Vec<_>>(), vec!["good"]);
    }
}
