//! Write-once archive of period snapshots.
//!
//! One document per reward period, kept apart from the live store. An archive
//! is never overwritten once written.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::StoreError;

/// Storage for archived period snapshots.
pub trait ArchiveStore: Send + Sync + std::fmt::Debug {
    /// Write the snapshot for `period`. Fails with `ArchiveExists` if already written.
    fn write_period(&self, period: &str, contents: &str) -> Result<(), StoreError>;

    /// Read the snapshot for `period`, if any.
    fn read_period(&self, period: &str) -> Result<Option<String>, StoreError>;

    /// All archived period keys, ascending.
    fn periods(&self) -> Result<Vec<String>, StoreError>;
}

// ---------------------------------------------------------------------------
// Directory of JSON files
// ---------------------------------------------------------------------------

/// Archives each period as `affinity_<period>.json` inside a directory.
#[derive(Debug, Clone)]
pub struct JsonArchive {
    directory: PathBuf,
}

const FILE_PREFIX: &str = "affinity_";
const FILE_SUFFIX: &str = ".json";

impl JsonArchive {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn file_for(&self, period: &str) -> Result<PathBuf, StoreError> {
        check_period(period)?;
        Ok(self
            .directory
            .join(format!("{}{}{}", FILE_PREFIX, period, FILE_SUFFIX)))
    }
}

/// Whether `period` is a `YYYY_MM` key with a month in 01..=12.
pub fn is_period_key(period: &str) -> bool {
    let bytes = period.as_bytes();
    if bytes.len() != 7 || bytes[4] != b'_' {
        return false;
    }
    if !bytes[..4].iter().chain(&bytes[5..]).all(u8::is_ascii_digit) {
        return false;
    }
    matches!(period[5..].parse::<u32>(), Ok(1..=12))
}

pub(crate) fn check_period(period: &str) -> Result<(), StoreError> {
    if is_period_key(period) {
        Ok(())
    } else {
        Err(StoreError::InvalidPeriod {
            period: period.to_string(),
        })
    }
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

impl ArchiveStore for JsonArchive {
    fn write_period(&self, period: &str, contents: &str) -> Result<(), StoreError> {
        if !self.directory.exists() {
            fs::create_dir_all(&self.directory).map_err(|e| io_error(&self.directory, e))?;
        }
        let path = self.file_for(period)?;
        if path.exists() {
            return Err(StoreError::ArchiveExists {
                period: period.to_string(),
            });
        }
        fs::write(&path, contents).map_err(|e| io_error(&path, e))?;
        log::info!("Archived period {} to {}", period, path.display());
        Ok(())
    }

    fn read_period(&self, period: &str) -> Result<Option<String>, StoreError> {
        let path = self.file_for(period)?;
        if !path.exists() {
            return Ok(None);
        }
        fs::read_to_string(&path)
            .map(Some)
            .map_err(|e| io_error(&path, e))
    }

    fn periods(&self) -> Result<Vec<String>, StoreError> {
        if !self.directory.exists() {
            return Ok(Vec::new());
        }
        let entries =
            fs::read_dir(&self.directory).map_err(|e| io_error(&self.directory, e))?;
        let mut periods: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().to_string();
                name.strip_prefix(FILE_PREFIX)
                    .and_then(|rest| rest.strip_suffix(FILE_SUFFIX))
                    .filter(|p| is_period_key(p))
                    .map(|p| p.to_string())
            })
            .collect();
        periods.sort();
        Ok(periods)
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct InMemoryArchive {
    periods: Arc<Mutex<BTreeMap<String, String>>>,
}

impl InMemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ArchiveStore for InMemoryArchive {
    fn write_period(&self, period: &str, contents: &str) -> Result<(), StoreError> {
        let mut periods = self.periods.lock();
        if periods.contains_key(period) {
            return Err(StoreError::ArchiveExists {
                period: period.to_string(),
            });
        }
        periods.insert(period.to_string(), contents.to_string());
        Ok(())
    }

    fn read_period(&self, period: &str) -> Result<Option<String>, StoreError> {
        Ok(self.periods.lock().get(period).cloned())
    }

    fn periods(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.periods.lock().keys().cloned().collect())
    }
}
