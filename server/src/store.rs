//! Whole-collection record stores.
//!
//! Each entity type lives in one collection that is read and written as a
//! unit. [`JsonFileStore`] keeps the collection in a single JSON file;
//! [`InMemoryStore`] keeps it in a vector for tests and throwaway runs.
//!
//! # Durability
//!
//! File writes use the write-rename pattern:
//! 1. Write the full collection to a sibling temporary file
//! 2. Sync the file to disk (`fsync`)
//! 3. Rename over the live file (atomic on POSIX)
//!
//! A crash mid-write therefore leaves the previous collection intact.
//! Concurrent writers are not coordinated here; callers serialize their own
//! read-modify-write cycles.

use raven_rush_types::{migrate_legacy_referrals, LegacyReferral, ReferralRecord, UserPointsRecord};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::Write as IoWrite;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tracing::warn;

/// Errors that can occur while reading or writing a record store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Records could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Storage backend for one collection of records.
pub trait RecordStore<T>: Send + Sync {
    /// Load every record, in store order.
    fn load_all(&self) -> Result<Vec<T>, StorageError>;

    /// Replace the whole collection.
    fn save_all(&self, records: &[T]) -> Result<(), StorageError>;
}

/// A record type that can live in a [`JsonFileStore`].
pub trait StoredRecord: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Decode a non-list store document written by an earlier deployment.
    /// `None` means the shape is not recognized.
    fn decode_legacy(_document: Value) -> Option<Vec<Self>> {
        None
    }
}

impl StoredRecord for UserPointsRecord {}

impl StoredRecord for ReferralRecord {
    fn decode_legacy(document: Value) -> Option<Vec<Self>> {
        // Earlier deployments keyed the referral file by address.
        serde_json::from_value::<BTreeMap<String, LegacyReferral>>(document)
            .ok()
            .map(migrate_legacy_referrals)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// JSON file store
// ─────────────────────────────────────────────────────────────────────────────

/// Collection stored as a pretty-printed JSON array in a single file.
///
/// A missing, blank, or unparseable file reads as an empty collection and the
/// next write replaces it. Inside a list, only the rows that fail to decode
/// are dropped.
pub struct JsonFileStore<T> {
    path: PathBuf,
    _record: PhantomData<fn() -> T>,
}

impl<T: StoredRecord> JsonFileStore<T> {
    /// Open a store backed by `path`, creating parent directories as needed.
    /// The file itself is created on first write.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(Self {
            path,
            _record: PhantomData,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn atomic_write(&self, data: &[u8]) -> Result<(), StorageError> {
        let temp_path = self.temp_path();
        {
            let mut file = std::fs::File::create(&temp_path)?;
            file.write_all(data)?;
            file.sync_all()?;
        }
        std::fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

impl<T: StoredRecord> RecordStore<T> for JsonFileStore<T> {
    fn load_all(&self) -> Result<Vec<T>, StorageError> {
        let data = match std::fs::read(&self.path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(StorageError::Io(err)),
        };
        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }

        let document: Value = match serde_json::from_slice(&data) {
            Ok(document) => document,
            Err(err) => {
                warn!(
                    path = %self.path.display(),
                    %err,
                    "record store is not valid JSON; treating as empty"
                );
                return Ok(Vec::new());
            }
        };
        let elements = match document {
            Value::Array(elements) => elements,
            document => match T::decode_legacy(document) {
                Some(records) => return Ok(records),
                None => {
                    warn!(
                        path = %self.path.display(),
                        "record store has an unrecognized shape; treating as empty"
                    );
                    return Ok(Vec::new());
                }
            },
        };

        // Undecodable rows are skipped; the rest of the collection still loads.
        let mut records = Vec::with_capacity(elements.len());
        for (index, element) in elements.into_iter().enumerate() {
            match serde_json::from_value(element) {
                Ok(record) => records.push(record),
                Err(err) => warn!(
                    path = %self.path.display(),
                    index,
                    %err,
                    "skipping undecodable record"
                ),
            }
        }
        Ok(records)
    }

    fn save_all(&self, records: &[T]) -> Result<(), StorageError> {
        let encoded = serde_json::to_vec_pretty(records)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.atomic_write(&encoded)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory store
// ─────────────────────────────────────────────────────────────────────────────

/// Collection held in memory; lost when the process exits.
#[derive(Debug)]
pub struct InMemoryStore<T> {
    records: Mutex<Vec<T>>,
}

impl<T> Default for InMemoryStore<T> {
    fn default() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
        }
    }
}

impl<T> InMemoryStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with `records`.
    pub fn with_records(records: Vec<T>) -> Self {
        Self {
            records: Mutex::new(records),
        }
    }
}

impl<T: Clone + Send> RecordStore<T> for InMemoryStore<T> {
    fn load_all(&self) -> Result<Vec<T>, StorageError> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(records.clone())
    }

    fn save_all(&self, records: &[T]) -> Result<(), StorageError> {
        let mut stored = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        *stored = records.to_vec();
        Ok(())
    }
}
