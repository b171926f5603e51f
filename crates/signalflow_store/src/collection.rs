// SPDX-License-Identifier: MIT OR Apache-2.0
//! Typed keyed collections backed by an in-memory cache.

use crate::backend::Backend;
use crate::error::{Result, StoreError};
use crate::writer::WriterHandle;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

/// A named collection of records of one type.
///
/// Reads are served from the cache only. `put`/`delete` update the cache
/// immediately and persist in the background; the `_durable` variants wait
/// for the backend and only touch the cache when it succeeds.
pub struct Collection<T> {
    name: String,
    cache: IndexMap<String, T>,
    backend: Arc<dyn Backend>,
    writer: WriterHandle,
    pretty: bool,
}

impl<T> Collection<T>
where
    T: Serialize + DeserializeOwned,
{
    pub(crate) fn new(
        name: impl Into<String>,
        backend: Arc<dyn Backend>,
        writer: WriterHandle,
        pretty: bool,
    ) -> Self {
        Self {
            name: name.into(),
            cache: IndexMap::new(),
            backend,
            writer,
            pretty,
        }
    }

    /// Collection name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Replace the cache with the backend's contents.
    ///
    /// Records that fail to decode are skipped and reported in the result.
    pub fn sync(&mut self) -> Result<SyncReport> {
        let records = self.backend.read_all(&self.name)?;
        let mut report = SyncReport::default();
        self.cache.clear();

        for (key, payload) in records {
            match serde_json::from_str::<T>(&payload) {
                Ok(record) => {
                    self.cache.insert(key, record);
                    report.loaded += 1;
                }
                Err(e) => {
                    tracing::warn!("Skipping unreadable record {}/{}: {}", self.name, key, e);
                    report.skipped.push(StoreError::Decode {
                        collection: self.name.clone(),
                        key,
                        message: e.to_string(),
                    });
                }
            }
        }

        tracing::debug!("Synced collection {}: {} records", self.name, report.loaded);
        Ok(report)
    }

    /// Get a cached record
    pub fn get(&self, key: &str) -> Option<&T> {
        self.cache.get(key)
    }

    /// Whether a key is cached
    pub fn contains(&self, key: &str) -> bool {
        self.cache.contains_key(key)
    }

    /// Cached keys in insertion order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.cache.keys().map(String::as_str)
    }

    /// Cached records in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.cache.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of cached records
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Whether the collection is empty
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Insert or replace a record, persisting in the background
    pub fn put(&mut self, key: impl Into<String>, record: T) {
        let key = key.into();
        match self.encode(&key, &record) {
            Ok(payload) => self.writer.write(&self.name, &key, payload),
            Err(e) => tracing::error!("Record {}/{} kept in memory only: {}", self.name, key, e),
        }
        self.cache.insert(key, record);
    }

    /// Insert or replace a record, waiting for the backend
    pub fn put_durable(&mut self, key: impl Into<String>, record: T) -> Result<()> {
        let key = key.into();
        let payload = self.encode(&key, &record)?;
        self.writer.write_now(&self.name, &key, payload)?;
        self.cache.insert(key, record);
        Ok(())
    }

    /// Remove a record, deleting it in the background
    pub fn delete(&mut self, key: &str) -> Option<T> {
        let removed = self.cache.shift_remove(key);
        if removed.is_some() {
            self.writer.delete(&self.name, key);
        }
        removed
    }

    /// Remove a record, waiting for the backend
    pub fn delete_durable(&mut self, key: &str) -> Result<Option<T>> {
        self.writer.delete_now(&self.name, key)?;
        Ok(self.cache.shift_remove(key))
    }

    fn encode(&self, key: &str, record: &T) -> Result<String> {
        let encoded = if self.pretty {
            serde_json::to_string_pretty(record)
        } else {
            serde_json::to_string(record)
        };
        encoded.map_err(|e| StoreError::Encode {
            collection: self.name.clone(),
            key: key.to_string(),
            message: e.to_string(),
        })
    }
}

/// Outcome of [`Collection::sync`]
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Records loaded into the cache
    pub loaded: usize,
    /// Records that could not be decoded
    pub skipped: Vec<StoreError>,
}
