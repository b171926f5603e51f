// SPDX-License-Identifier: MIT OR Apache-2.0
//! Durable storage backends.
//!
//! A backend stores opaque text payloads addressed by `(collection, key)`.
//! Encoding is done by [`crate::Collection`], so backends never see typed
//! records.

use crate::error::{Result, StoreError};
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};

/// Extension used for records in [`DirBackend`]
pub const RECORD_EXTENSION: &str = "json";

/// Durable storage for encoded records
pub trait Backend: Send + Sync {
    /// Read every record in a collection, in a stable order
    fn read_all(&self, collection: &str) -> Result<Vec<(String, String)>>;

    /// Create or overwrite a record
    fn write(&self, collection: &str, key: &str, payload: &str) -> Result<()>;

    /// Delete a record. Deleting a missing key is not an error.
    fn delete(&self, collection: &str, key: &str) -> Result<()>;
}

/// Ephemeral backend for tests and sessions without a project directory
#[derive(Default)]
pub struct MemoryBackend {
    records: RwLock<IndexMap<(String, String), String>>,
}

impl MemoryBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records across all collections
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether the backend holds no records
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Raw payload of a record
    pub fn payload(&self, collection: &str, key: &str) -> Option<String> {
        self.records
            .read()
            .get(&(collection.to_string(), key.to_string()))
            .cloned()
    }
}

impl Backend for MemoryBackend {
    fn read_all(&self, collection: &str) -> Result<Vec<(String, String)>> {
        Ok(self
            .records
            .read()
            .iter()
            .filter(|((c, _), _)| c == collection)
            .map(|((_, k), v)| (k.clone(), v.clone()))
            .collect())
    }

    fn write(&self, collection: &str, key: &str, payload: &str) -> Result<()> {
        self.records
            .write()
            .insert((collection.to_string(), key.to_string()), payload.to_string());
        Ok(())
    }

    fn delete(&self, collection: &str, key: &str) -> Result<()> {
        self.records
            .write()
            .shift_remove(&(collection.to_string(), key.to_string()));
        Ok(())
    }
}

/// Directory backend: one JSON file per record.
///
/// ```text
/// root/
///   <collection>/
///     <encoded-key>.json
/// ```
pub struct DirBackend {
    root: PathBuf,
}

impl DirBackend {
    /// Create a backend rooted at `root`. Directories are created on first write.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, collection: &str, key: &str) -> PathBuf {
        self.root
            .join(collection)
            .join(format!("{}.{RECORD_EXTENSION}", encode_key(key)))
    }
}

impl Backend for DirBackend {
    fn read_all(&self, collection: &str) -> Result<Vec<(String, String)>> {
        let dir = self.root.join(collection);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            let Some(key) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(decode_key)
            else {
                tracing::warn!("Skipping record with undecodable name: {:?}", path);
                continue;
            };
            records.push((key, std::fs::read_to_string(&path)?));
        }
        records.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(records)
    }

    fn write(&self, collection: &str, key: &str, payload: &str) -> Result<()> {
        let path = self.record_path(collection, key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // Write then rename so a crash never leaves a truncated record
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, payload)?;
        std::fs::rename(&tmp, &path).map_err(StoreError::from)
    }

    fn delete(&self, collection: &str, key: &str) -> Result<()> {
        match std::fs::remove_file(self.record_path(collection, key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Encode a key into a filesystem-safe file stem
fn encode_key(key: &str) -> String {
    let mut encoded = String::with_capacity(key.len());
    for byte in key.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' => encoded.push(byte as char),
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }
    encoded
}

/// Decode a file stem produced by [`encode_key`]
fn decode_key(stem: &str) -> Option<String> {
    let bytes = stem.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = std::str::from_utf8(bytes.get(i + 1..i + 3)?).ok()?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_encoding() {
        for key in ["plain", "Clock Pulse", "a/b\\c", "émoji ✓", "%41"] {
            assert_eq!(decode_key(&encode_key(key)).as_deref(), Some(key));
        }
        assert_eq!(encode_key("My Node"), "My%20Node");
    }

    #[test]
    fn test_memory_backend() {
        let backend = MemoryBackend::new();
        backend.write("graphs", "a", "{}").unwrap();
        backend.write("graphs", "b", "[]").unwrap();
        backend.write("types", "a", "null").unwrap();

        let graphs = backend.read_all("graphs").unwrap();
        assert_eq!(graphs.len(), 2);
        assert_eq!(graphs[0], ("a".to_string(), "{}".to_string()));

        backend.delete("graphs", "a").unwrap();
        backend.delete("graphs", "missing").unwrap();
        assert_eq!(backend.read_all("graphs").unwrap().len(), 1);
        assert_eq!(backend.len(), 2);
    }

    #[test]
    fn test_dir_backend() {
        let dir = tempfile::tempdir().unwrap();
        let backend = DirBackend::new(dir.path());

        assert!(backend.read_all("graphs").unwrap().is_empty());

        backend.write("graphs", "Flow One", "{\"a\":1}").unwrap();
        backend.write("graphs", "Flow One", "{\"a\":2}").unwrap();
        backend.write("graphs", "other", "{}").unwrap();

        let records = backend.read_all("graphs").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], ("Flow One".to_string(), "{\"a\":2}".to_string()));

        backend.delete("graphs", "Flow One").unwrap();
        backend.delete("graphs", "Flow One").unwrap();
        assert_eq!(backend.read_all("graphs").unwrap().len(), 1);
    }
}
