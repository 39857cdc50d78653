//! Backends for the live affinity document.
//!
//! A backend only moves raw JSON text in and out; decoding and the
//! fallback-on-corruption policy live in [`super::AffinityStore`].

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

/// Durable storage for the single affinity document.
pub trait DocumentStore: Send + Sync + std::fmt::Debug {
    /// Read the whole document. `Ok(None)` means nothing has been written yet.
    fn read(&self) -> Result<Option<String>, anyhow::Error>;

    /// Replace the whole document.
    fn write(&self, contents: &str) -> Result<(), anyhow::Error>;

    /// Human-readable location, used in log lines.
    fn location(&self) -> String;
}

// ---------------------------------------------------------------------------
// JSON file
// ---------------------------------------------------------------------------

/// Stores the document as a pretty-printed JSON file.
///
/// Writes go to a sibling `.tmp` file first and are renamed into place, so a
/// crash mid-write leaves the previous document intact.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl DocumentStore for JsonFileStore {
    fn read(&self) -> Result<Option<String>, anyhow::Error> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)?;
        Ok(Some(content))
    }

    fn write(&self, contents: &str) -> Result<(), anyhow::Error> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.temp_path();
        fs::write(&tmp, contents)?;
        fs::rename(&tmp, &self.path)?;
        log::debug!("JsonFileStore::write: path={}", self.path.display());
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Keeps the document in memory. Clones share the same buffer, which lets a
/// test hand one clone to the store and inspect or corrupt it through another.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    contents: Arc<Mutex<Option<String>>>,
    fail_writes: Arc<Mutex<bool>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from the given raw contents.
    pub fn with_contents(contents: impl Into<String>) -> Self {
        let store = Self::default();
        *store.contents.lock() = Some(contents.into());
        store
    }

    /// Current raw contents.
    pub fn contents(&self) -> Option<String> {
        self.contents.lock().clone()
    }

    /// Make every subsequent write fail.
    pub fn set_fail_writes(&self, fail: bool) {
        *self.fail_writes.lock() = fail;
    }
}

impl DocumentStore for InMemoryStore {
    fn read(&self) -> Result<Option<String>, anyhow::Error> {
        Ok(self.contents.lock().clone())
    }

    fn write(&self, contents: &str) -> Result<(), anyhow::Error> {
        if *self.fail_writes.lock() {
            anyhow::bail!("in-memory store configured to reject writes");
        }
        *self.contents.lock() = Some(contents.to_string());
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_file_store_missing_reads_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("affinity.json"));
        assert!(store.read().unwrap().is_none());
    }

    #[test]
    fn test_json_file_store_write_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("affinity.json");
        let store = JsonFileStore::new(&path);

        store.write("{\"affinity\": {}}").unwrap();
        assert_eq!(store.read().unwrap().as_deref(), Some("{\"affinity\": {}}"));
        assert!(!dir.path().join("nested").join("affinity.json.tmp").exists());
    }

    #[test]
    fn test_in_memory_store_shares_buffer() {
        let store = InMemoryStore::new();
        let shared = store.clone();
        store.write("abc").unwrap();
        assert_eq!(shared.contents().as_deref(), Some("abc"));
    }

    #[test]
    fn test_in_memory_store_fail_writes() {
        let store = InMemoryStore::with_contents("old");
        store.set_fail_writes(true);
        assert!(store.write("new").is_err());
        assert_eq!(store.contents().as_deref(), Some("old"));
    }
}
