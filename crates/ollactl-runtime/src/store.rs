//! Atomic JSON record store for durable single-document state.
//!
//! The supervisor and task runner keep their state in small durable records
//! (`server.json`, `task.json`) so identity survives across stateless calls.
//! Writes go through temp file + rename, which is atomic on Unix/macOS.
//! Near-simultaneous writers resolve by last-successful-write-wins.

use std::fs;
use std::io;
use std::marker::PhantomData;
use std::path::PathBuf;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

/// Store for one JSON document at a fixed path.
#[derive(Debug, Clone)]
pub struct RecordStore<T> {
    path: PathBuf,
    _record: PhantomData<T>,
}

impl<T: Serialize + DeserializeOwned> RecordStore<T> {
    /// Create a store over an explicit file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _record: PhantomData,
        }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Load the record.
    ///
    /// An absent or malformed file reads as `None` - a first run and a
    /// corrupt record recover the same way, by writing a fresh record.
    #[must_use]
    pub fn load(&self) -> Option<T> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "Failed to read record");
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(record) => Some(record),
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "Discarding malformed record");
                None
            }
        }
    }

    /// Write the record atomically using temp file + rename.
    pub fn save(&self, record: &T) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let temp = self.path.with_extension("json.tmp");
        fs::write(&temp, serde_json::to_string_pretty(record)?)?;
        fs::rename(&temp, &self.path)
    }

    /// Delete the record (idempotent - no error if missing).
    pub fn purge(&self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ollactl_core::ServerHandle;
    use tempfile::tempdir;

    #[test]
    fn roundtrip_record() {
        let dir = tempdir().expect("tempdir failed");
        let store: RecordStore<ServerHandle> = RecordStore::new(dir.path().join("server.json"));

        assert!(store.load().is_none());

        let handle = ServerHandle::new(4242);
        store.save(&handle).expect("save failed");
        assert_eq!(store.load(), Some(handle));

        store.purge().expect("purge failed");
        assert!(store.load().is_none());

        // Second purge is idempotent
        store.purge().expect("second purge failed");
    }

    #[test]
    fn malformed_record_reads_as_absent() {
        let dir = tempdir().expect("tempdir failed");
        let path = dir.path().join("server.json");
        fs::write(&path, "{definitely not json").expect("write failed");

        let store: RecordStore<ServerHandle> = RecordStore::new(&path);
        assert!(store.load().is_none());
    }
}
